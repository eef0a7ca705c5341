/*!
# Ignis Engine

GPU resource, command recording and frame synchronization core.

This crate provides the platform-agnostic part of the engine: a `Device` hub
that owns handle tables for buffers and images, a `Command` wrapper with a
typed recording state machine, fences and semaphores, a `Swapchain`, and a
`Renderer` that paces frames in flight. GPU access goes through the object-safe
traits in [`device::backend`]; the Vulkan implementation lives in the
`ignis_engine_vulkan` crate.

## Architecture

- **Device**: factories for buffers, images, shaders, pipelines, sync objects
- **HandleTable**: generation-tagged 32-bit IDs for buffers and images
- **Command / Recording**: begin/end state machine, staging buffer ownership
- **Renderer / Frame**: frames in flight, one fence and one command per slot
- **Presenter**: blits a render target into the swapchain and presents
*/

pub mod error;
pub mod log;
pub mod utils;
pub mod device;
pub mod renderer;

// Main ignis namespace module
pub mod ignis {
    // Error types
    pub use crate::error::{Error, Result};

    // Device hub
    pub use crate::device::Device;

    // Logging sub-module (types and configuration, macros are exported at the crate root)
    pub mod log {
        pub use crate::log::{
            Logger, LogEntry, LogSeverity, DefaultLogger,
            set_logger, reset_logger, set_min_severity, min_severity,
        };
    }

    // Device sub-module with all resource types
    pub mod device {
        pub use crate::device::*;
    }

    // Frame layer
    pub mod render {
        pub use crate::renderer::*;
    }

    // Handle tables
    pub mod utils {
        pub use crate::utils::*;
    }
}

// Re-export math library at crate root
pub use glam;
pub use bytemuck;
