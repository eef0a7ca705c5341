/// VulkanImage - Vulkan implementation of the BackendImage trait
///
/// Allocated images own their memory and default view. Swapchain images are
/// wrapped without ownership: the swapchain destroys both image and view.

use std::any::Any;
use std::sync::Arc;

use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;
use ignis_engine::ignis::device::{BackendImage, ImageDesc};
use ignis_engine::ignis::{Error, Result};
use ignis_engine::{ignis_err, ignis_error};

use crate::vulkan_context::VulkanContext;
use crate::vulkan_format::{aspect_to_vk, format_to_vk, image_usage_to_vk, sample_count_to_vk};

pub struct VulkanImage {
    /// None for wrapped swapchain images
    context: Option<Arc<VulkanContext>>,
    pub(crate) image: vk::Image,
    pub(crate) view: vk::ImageView,
    allocation: Option<Allocation>,
}

impl VulkanImage {
    pub(crate) fn new(context: Arc<VulkanContext>, desc: &ImageDesc) -> Result<Self> {
        let device = &context.device;
        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format_to_vk(desc.format))
            .extent(vk::Extent3D {
                width: desc.extent.width,
                height: desc.extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(sample_count_to_vk(desc.samples))
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(image_usage_to_vk(desc.usage))
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { device.create_image(&image_info, None) }.map_err(|e| {
            ignis_error!(
                "ignis::vulkan",
                "Failed to create {}x{} {:?} image: {:?}",
                desc.extent.width,
                desc.extent.height,
                desc.format,
                e
            );
            match e {
                vk::Result::ERROR_OUT_OF_DEVICE_MEMORY | vk::Result::ERROR_OUT_OF_HOST_MEMORY => {
                    Error::OutOfMemory
                }
                other => Error::BackendError(format!("Failed to create image: {:?}", other)),
            }
        })?;

        let requirements = unsafe { device.get_image_memory_requirements(image) };
        let allocation = context.allocator().and_then(|mut allocator| {
            allocator
                .allocate(&AllocationCreateDesc {
                    name: "ignis image",
                    requirements,
                    location: MemoryLocation::GpuOnly,
                    linear: false,
                    allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                })
                .map_err(|e| {
                    ignis_error!("ignis::vulkan", "Image allocation failed: {:?}", e);
                    Error::OutOfMemory
                })
        });
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.destroy_image(image, None) };
                return Err(e);
            }
        };

        let free = |allocation: Allocation| {
            if let Ok(mut allocator) = context.allocator() {
                allocator.free(allocation).ok();
            }
            unsafe { device.destroy_image(image, None) };
        };

        if let Err(e) = unsafe { device.bind_image_memory(image, allocation.memory(), allocation.offset()) } {
            free(allocation);
            return Err(ignis_err!("ignis::vulkan", "Failed to bind image memory: {:?}", e));
        }

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(image_info.format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: aspect_to_vk(desc.aspect),
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });
        let view = match unsafe { device.create_image_view(&view_info, None) } {
            Ok(view) => view,
            Err(e) => {
                free(allocation);
                return Err(ignis_err!("ignis::vulkan", "Failed to create image view: {:?}", e));
            }
        };

        Ok(Self {
            context: Some(context),
            image,
            view,
            allocation: Some(allocation),
        })
    }

    /// Wrap an image owned by someone else (swapchain)
    pub(crate) fn wrap(image: vk::Image, view: vk::ImageView) -> Self {
        Self {
            context: None,
            image,
            view,
            allocation: None,
        }
    }
}

impl BackendImage for VulkanImage {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for VulkanImage {
    fn drop(&mut self) {
        let Some(context) = self.context.take() else {
            return;
        };
        unsafe {
            context.device.destroy_image_view(self.view, None);
            if let Some(allocation) = self.allocation.take() {
                if let Ok(mut allocator) = context.allocator() {
                    allocator.free(allocation).ok();
                }
            }
            context.device.destroy_image(self.image, None);
        }
    }
}
