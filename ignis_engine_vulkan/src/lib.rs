/*!
# Ignis Engine - Vulkan Backend

Vulkan 1.3 implementation of the ignis_engine backend traits.

This crate uses the Ash library for Vulkan bindings and gpu-allocator for
memory management. Rendering uses dynamic rendering and synchronization2;
every shader sees one global descriptor set (storage buffers, uniform
buffers and combined image samplers) and a per-pipeline push constant block.

## Example

```no_run
use ignis_engine::ignis::Device;
use ignis_engine::ignis::device::DeviceConfig;
use ignis_engine_vulkan::VulkanBackend;
# fn run(window: &winit::window::Window) -> ignis_engine::ignis::Result<()> {
let config = DeviceConfig::default();
let backend = VulkanBackend::new(window, &config)?;
let size = window.inner_size();
let surface = backend.create_surface(window, size.width, size.height)?;
let device = Device::new(Box::new(backend), config)?;
# let _ = (surface, device);
# Ok(())
# }
```
*/

// Vulkan implementation modules
mod vulkan;
mod vulkan_context;
mod vulkan_features;
mod vulkan_format;
mod vulkan_descriptor;
mod vulkan_buffer;
mod vulkan_image;
mod vulkan_sync;
mod vulkan_shader;
mod vulkan_pipeline;
mod vulkan_command;
mod vulkan_swapchain;
mod debug;

pub use vulkan::VulkanBackend;
pub use vulkan_swapchain::VulkanSurface;

// Re-export debug utilities
pub use debug::{get_validation_stats, print_validation_stats_report, ValidationStats};
