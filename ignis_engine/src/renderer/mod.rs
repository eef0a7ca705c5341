/// Renderer module - frame pacing, render targets and presentation

// Module declarations
pub mod renderer;
pub mod render_target;
pub mod push_constants;
pub mod presenter;

// Re-export everything from renderer.rs
pub use renderer::*;

// Re-export from other modules
pub use render_target::*;
pub use push_constants::*;
pub use presenter::*;
