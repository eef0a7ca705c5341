/// VulkanContext - shared Vulkan state for every backend object
///
/// Contains everything needed for GPU operations:
/// - Instance and logical device for Vulkan API calls
/// - Allocator for memory management
/// - Graphics queues for submission and presentation
/// - The global bindless descriptor set and its pipeline layouts
///
/// Every buffer, image, command pool, pipeline and swapchain holds an
/// `Arc` of it, so the device outlives all objects created from it and is
/// destroyed by whoever drops the last reference.

use std::any::Any;
use std::mem::ManuallyDrop;
use std::sync::{Mutex, MutexGuard};

use ash::vk;
use gpu_allocator::vulkan::Allocator;
use ignis_engine::ignis::{Error, Result};
use ignis_engine::{ignis_err, ignis_error};
use rustc_hash::FxHashMap;

use crate::vulkan_descriptor::BindlessDescriptors;

pub struct VulkanContext {
    /// Vulkan entry (kept loaded for the instance lifetime)
    pub(crate) _entry: ash::Entry,
    pub(crate) instance: ash::Instance,
    pub(crate) physical_device: vk::PhysicalDevice,
    pub(crate) device: ash::Device,

    /// GPU memory allocator; dropped before the device is destroyed
    pub(crate) allocator: ManuallyDrop<Mutex<Allocator>>,

    /// Graphics queue family index
    pub(crate) queue_family: u32,
    /// Graphics queues of the family; `vkQueueSubmit` needs external synchronization
    pub(crate) queues: Vec<Mutex<vk::Queue>>,

    pub(crate) surface_loader: ash::khr::surface::Instance,
    pub(crate) swapchain_loader: ash::khr::swapchain::Device,

    /// Global storage buffer / uniform buffer / image sampler arrays
    pub(crate) descriptors: ManuallyDrop<BindlessDescriptors>,
    /// Pipeline layouts shared per push constant block size
    pipeline_layouts: Mutex<FxHashMap<u32, vk::PipelineLayout>>,

    /// Debug utils loader and messenger (validation only)
    pub(crate) debug_messenger: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
}

impl VulkanContext {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        entry: ash::Entry,
        instance: ash::Instance,
        physical_device: vk::PhysicalDevice,
        device: ash::Device,
        allocator: Allocator,
        queue_family: u32,
        queues: Vec<vk::Queue>,
        descriptors: BindlessDescriptors,
        debug_messenger: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
    ) -> Self {
        let surface_loader = ash::khr::surface::Instance::new(&entry, &instance);
        let swapchain_loader = ash::khr::swapchain::Device::new(&instance, &device);
        Self {
            _entry: entry,
            instance,
            physical_device,
            device,
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
            queue_family,
            queues: queues.into_iter().map(Mutex::new).collect(),
            surface_loader,
            swapchain_loader,
            descriptors: ManuallyDrop::new(descriptors),
            pipeline_layouts: Mutex::new(FxHashMap::default()),
            debug_messenger,
        }
    }

    pub(crate) fn allocator(&self) -> Result<MutexGuard<'_, Allocator>> {
        self.allocator
            .lock()
            .map_err(|_| ignis_err!("ignis::vulkan", "GPU allocator mutex poisoned"))
    }

    /// Lock queue `index` for submission or presentation
    pub(crate) fn queue(&self, index: u32) -> Result<MutexGuard<'_, vk::Queue>> {
        let queue = self.queues.get(index as usize).ok_or_else(|| {
            Error::InvalidResource(format!(
                "queue {} out of range ({} graphics queues)",
                index,
                self.queues.len()
            ))
        })?;
        queue
            .lock()
            .map_err(|_| ignis_err!("ignis::vulkan", "queue {} mutex poisoned", index))
    }

    /// Pipeline layout with the global descriptor set and a push constant
    /// block of `push_constant_size` bytes (none when 0), created on first use
    pub(crate) fn pipeline_layout(&self, push_constant_size: u32) -> Result<vk::PipelineLayout> {
        let mut layouts = self
            .pipeline_layouts
            .lock()
            .map_err(|_| ignis_err!("ignis::vulkan", "pipeline layout cache poisoned"))?;
        if let Some(&layout) = layouts.get(&push_constant_size) {
            return Ok(layout);
        }

        let set_layouts = [self.descriptors.set_layout];
        let ranges = [vk::PushConstantRange {
            stage_flags: vk::ShaderStageFlags::ALL_GRAPHICS,
            offset: 0,
            size: push_constant_size,
        }];
        let mut info = vk::PipelineLayoutCreateInfo::default().set_layouts(&set_layouts);
        if push_constant_size > 0 {
            info = info.push_constant_ranges(&ranges);
        }

        let layout = unsafe { self.device.create_pipeline_layout(&info, None) }
            .map_err(|e| ignis_err!("ignis::vulkan", "Failed to create pipeline layout: {:?}", e))?;
        layouts.insert(push_constant_size, layout);
        Ok(layout)
    }
}

/// Downcast a backend object received through a core trait.
///
/// Objects created by another backend yield `InvalidResource` and an error log.
pub(crate) fn require<'a, T: 'static>(object: &'a dyn Any, kind: &str) -> Result<&'a T> {
    object.downcast_ref::<T>().ok_or_else(|| {
        ignis_error!("ignis::vulkan", "{} was not created by the Vulkan backend", kind);
        Error::InvalidResource(format!("{} was not created by the Vulkan backend", kind))
    })
}

/// Downcast for infallible calls (recording, descriptor writes), where an
/// object from another backend is a contract violation.
///
/// # Panics
///
/// If `object` is not a `T`.
pub(crate) fn native<'a, T: 'static>(object: &'a dyn Any, kind: &str) -> &'a T {
    match object.downcast_ref::<T>() {
        Some(concrete) => concrete,
        None => panic!("{} was not created by the Vulkan backend", kind),
    }
}

impl Drop for VulkanContext {
    fn drop(&mut self) {
        unsafe {
            self.device.device_wait_idle().ok();

            if let Ok(layouts) = self.pipeline_layouts.get_mut() {
                for (_, layout) in layouts.drain() {
                    self.device.destroy_pipeline_layout(layout, None);
                }
            }
            self.descriptors.destroy(&self.device);
            ManuallyDrop::drop(&mut self.descriptors);

            // Free VkDeviceMemory pages BEFORE destroying the device
            ManuallyDrop::drop(&mut self.allocator);

            self.device.destroy_device(None);

            crate::debug::cleanup_debug_config();
            if let Some((debug_utils, messenger)) = self.debug_messenger.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }

            self.instance.destroy_instance(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_rejects_foreign_object() {
        let foreign = 7u32;
        let result = require::<String>(&foreign, "buffer");
        assert!(matches!(result, Err(Error::InvalidResource(ref msg)) if msg.starts_with("buffer")));
        assert_eq!(require::<u32>(&foreign, "buffer"), Ok(&7));
    }

    #[test]
    #[should_panic(expected = "image was not created by the Vulkan backend")]
    fn test_native_panics_on_foreign_object() {
        let foreign = 7u32;
        let _ = native::<String>(&foreign, "image");
    }
}
