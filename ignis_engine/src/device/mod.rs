/// Device module - GPU resources, command recording and the device hub

// Module declarations
pub mod types;
pub mod config;
pub mod backend;
pub mod context;
pub mod sync;
pub mod buffer;
pub mod image;
pub mod shader;
pub mod pipeline;
pub mod command;
pub mod swapchain;
pub mod device;

// Re-export everything from device.rs
pub use device::*;

// Re-export from other modules
pub use types::*;
pub use config::*;
pub use backend::*;
pub use context::*;
pub use sync::*;
pub use buffer::*;
pub use image::*;
pub use shader::*;
pub use pipeline::*;
pub use command::*;
pub use swapchain::*;

// Mock backend for tests (no GPU required)
#[cfg(test)]
pub mod mock_backend;
