/// VulkanSurface / VulkanSwapchain - window presentation
///
/// The swapchain keeps the surface alive and owns its image views; the
/// images it hands to the core are non-owning wrappers.

use std::any::Any;
use std::sync::Arc;

use ash::vk;
use ignis_engine::ignis::device::{
    BackendImage, BackendSemaphore, BackendSurface, BackendSwapchain, ColorFormat, Extent2D,
    Format, PresentMode, SwapchainCreateInfo,
};
use ignis_engine::ignis::{Error, Result};
use ignis_engine::{ignis_err, ignis_error, ignis_info, ignis_warn};

use crate::vulkan_context::{require, VulkanContext};
use crate::vulkan_format::{format_from_vk, format_to_vk, present_mode_to_vk};
use crate::vulkan_image::VulkanImage;
use crate::vulkan_sync::VulkanSemaphore;

/// Minimum number of swapchain images requested
const PREFERRED_IMAGE_COUNT: u32 = 3;

struct SurfaceHandle {
    context: Arc<VulkanContext>,
    surface: vk::SurfaceKHR,
}

impl Drop for SurfaceHandle {
    fn drop(&mut self) {
        unsafe { self.context.surface_loader.destroy_surface(self.surface, None) };
    }
}

/// Presentation surface of a window
pub struct VulkanSurface {
    handle: Arc<SurfaceHandle>,
    /// Window size, used when the surface leaves the extent to the swapchain
    window_extent: Extent2D,
}

impl VulkanSurface {
    pub(crate) fn new(context: Arc<VulkanContext>, surface: vk::SurfaceKHR, window_extent: Extent2D) -> Self {
        Self {
            handle: Arc::new(SurfaceHandle { context, surface }),
            window_extent,
        }
    }

    fn capabilities(&self) -> Result<vk::SurfaceCapabilitiesKHR> {
        let context = &self.handle.context;
        unsafe {
            context
                .surface_loader
                .get_physical_device_surface_capabilities(context.physical_device, self.handle.surface)
        }
        .map_err(|e| {
            ignis_error!("ignis::vulkan", "Failed to get surface capabilities: {:?}", e);
            Error::InitializationFailed(format!("Failed to get surface capabilities: {:?}", e))
        })
    }
}

impl BackendSurface for VulkanSurface {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn extent(&self) -> Extent2D {
        match self.capabilities() {
            Ok(caps) if caps.current_extent.width != u32::MAX => {
                Extent2D::new(caps.current_extent.width, caps.current_extent.height)
            }
            _ => self.window_extent,
        }
    }
}

/// Preferred surface formats for each engine color format, in order
fn preferred_formats(format: ColorFormat) -> [vk::Format; 2] {
    match format {
        ColorFormat::Rgba8 => [vk::Format::R8G8B8A8_UNORM, vk::Format::B8G8R8A8_UNORM],
        ColorFormat::Rgba16 | ColorFormat::Hdr => {
            [format_to_vk(format.format()), vk::Format::R8G8B8A8_UNORM]
        }
    }
}

fn choose_surface_format(
    available: &[vk::SurfaceFormatKHR],
    requested: ColorFormat,
) -> Option<vk::SurfaceFormatKHR> {
    preferred_formats(requested)
        .iter()
        .find_map(|&wanted| available.iter().find(|f| f.format == wanted).copied())
        .or_else(|| available.first().copied())
}

fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, requested: Extent2D, surface: Extent2D) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        return caps.current_extent;
    }
    let wanted = if requested.area() == 0 { surface } else { requested };
    vk::Extent2D {
        width: wanted
            .width
            .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
        height: wanted
            .height
            .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
    }
}

fn choose_present_mode(available: &[vk::PresentModeKHR], requested: PresentMode) -> vk::PresentModeKHR {
    let wanted = present_mode_to_vk(requested);
    if available.contains(&wanted) {
        wanted
    } else {
        ignis_warn!(
            "ignis::vulkan",
            "Present mode {:?} not supported, falling back to FIFO",
            requested
        );
        vk::PresentModeKHR::FIFO
    }
}

fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = PREFERRED_IMAGE_COUNT.max(caps.min_image_count);
    // max_image_count == 0 means no upper limit
    if caps.max_image_count > 0 {
        count.min(caps.max_image_count)
    } else {
        count
    }
}

pub struct VulkanSwapchain {
    surface: Arc<SurfaceHandle>,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    views: Vec<vk::ImageView>,
    format: Format,
    extent: Extent2D,
}

impl VulkanSwapchain {
    pub(crate) fn new(surface: &VulkanSurface, info: &SwapchainCreateInfo) -> Result<Self> {
        let handle = Arc::clone(&surface.handle);
        let context = &handle.context;
        let caps = surface.capabilities()?;

        let can_present = unsafe {
            context.surface_loader.get_physical_device_surface_support(
                context.physical_device,
                context.queue_family,
                handle.surface,
            )
        }
        .unwrap_or(false);
        if !can_present {
            ignis_error!("ignis::vulkan", "Graphics queue family cannot present to this surface");
            return Err(Error::InitializationFailed(
                "Graphics queue family cannot present to this surface".to_string(),
            ));
        }

        let formats = unsafe {
            context
                .surface_loader
                .get_physical_device_surface_formats(context.physical_device, handle.surface)
        }
        .map_err(|e| ignis_err!("ignis::vulkan", "Failed to query surface formats: {:?}", e))?;
        let surface_format = choose_surface_format(&formats, info.format)
            .ok_or_else(|| ignis_err!("ignis::vulkan", "Surface reports no formats"))?;

        let present_modes = unsafe {
            context
                .surface_loader
                .get_physical_device_surface_present_modes(context.physical_device, handle.surface)
        }
        .map_err(|e| ignis_err!("ignis::vulkan", "Failed to query present modes: {:?}", e))?;
        let present_mode = choose_present_mode(&present_modes, info.present_mode);

        let extent = choose_extent(&caps, info.extent, surface.window_extent);

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(handle.surface)
            .min_image_count(choose_image_count(&caps))
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(caps.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true);

        let swapchain = unsafe { context.swapchain_loader.create_swapchain(&create_info, None) }
            .map_err(|e| {
                ignis_error!("ignis::vulkan", "Failed to create swapchain: {:?}", e);
                Error::InitializationFailed(format!("Failed to create swapchain: {:?}", e))
            })?;

        // From here on, partial state is released by Drop
        let mut result = Self {
            surface: Arc::clone(&handle),
            swapchain,
            images: Vec::new(),
            views: Vec::new(),
            format: format_from_vk(surface_format.format),
            extent: Extent2D::new(extent.width, extent.height),
        };

        result.images = unsafe { context.swapchain_loader.get_swapchain_images(swapchain) }
            .map_err(|e| ignis_err!("ignis::vulkan", "Failed to get swapchain images: {:?}", e))?;

        for &image in &result.images {
            let view_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(surface_format.format)
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });
            let view = unsafe { context.device.create_image_view(&view_info, None) }
                .map_err(|e| ignis_err!("ignis::vulkan", "Failed to create swapchain image view: {:?}", e))?;
            result.views.push(view);
        }

        ignis_info!(
            "ignis::vulkan",
            "Swapchain {}x{} {:?} {:?}, {} images",
            extent.width,
            extent.height,
            surface_format.format,
            present_mode,
            result.images.len()
        );

        Ok(result)
    }
}

impl BackendSwapchain for VulkanSwapchain {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn images(&self) -> Result<Vec<Box<dyn BackendImage>>> {
        Ok(self
            .images
            .iter()
            .zip(&self.views)
            .map(|(&image, &view)| Box::new(VulkanImage::wrap(image, view)) as Box<dyn BackendImage>)
            .collect())
    }

    fn format(&self) -> Format {
        self.format
    }

    fn extent(&self) -> Extent2D {
        self.extent
    }

    fn acquire_next_image(&mut self, signal: &dyn BackendSemaphore) -> Result<u32> {
        let semaphore = require::<VulkanSemaphore>(signal.as_any(), "semaphore")?;
        let context = &self.surface.context;
        let acquired = unsafe {
            context.swapchain_loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                semaphore.semaphore,
                vk::Fence::null(),
            )
        };
        match acquired {
            Ok((index, _suboptimal)) => Ok(index),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                ignis_warn!("ignis::vulkan", "Swapchain out of date during acquire");
                Err(Error::SwapchainOutOfDate)
            }
            Err(e) => Err(ignis_err!("ignis::vulkan", "Failed to acquire next swapchain image: {:?}", e)),
        }
    }

    fn present(&self, queue: u32, image_index: u32, waits: &[&dyn BackendSemaphore]) -> Result<()> {
        let wait_semaphores = waits
            .iter()
            .map(|s| require::<VulkanSemaphore>(s.as_any(), "semaphore").map(|s| s.semaphore))
            .collect::<Result<Vec<_>>>()?;
        let swapchains = [self.swapchain];
        let indices = [image_index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&indices);

        let context = &self.surface.context;
        let queue = context.queue(queue)?;
        match unsafe { context.swapchain_loader.queue_present(*queue, &present_info) } {
            Ok(_suboptimal) => Ok(()),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                ignis_warn!("ignis::vulkan", "Swapchain out of date during present");
                Err(Error::SwapchainOutOfDate)
            }
            Err(e) => Err(ignis_err!("ignis::vulkan", "Failed to present: {:?}", e)),
        }
    }
}

impl Drop for VulkanSwapchain {
    fn drop(&mut self) {
        let context = &self.surface.context;
        unsafe {
            // Presentation may still read the images
            context.device.device_wait_idle().ok();
            for &view in &self.views {
                context.device.destroy_image_view(view, None);
            }
            context.swapchain_loader.destroy_swapchain(self.swapchain, None);
        }
    }
}
