/// Swapchain - presentable images of one surface
///
/// Out-of-date and resize conditions are not handled: they surface as
/// `Error::SwapchainOutOfDate` and the swapchain has to be rebuilt by the
/// caller.

use crate::error::{Error, Result};
use crate::device::backend::{BackendSemaphore, BackendSurface, BackendSwapchain};
use crate::device::context::GpuContext;
use crate::device::image::{Image, ImageCreateInfo};
use crate::device::sync::Semaphore;
use crate::device::types::{
    ColorFormat, Extent2D, Format, ImageAspect, ImageLayout, ImageUsage, PresentMode, Queue,
    SampleCount,
};
use crate::ignis_info;

/// Swapchain creation parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainCreateInfo {
    /// Requested size; a zero area means "use the surface size"
    pub extent: Extent2D,
    pub format: ColorFormat,
    pub present_mode: PresentMode,
}

impl Default for SwapchainCreateInfo {
    fn default() -> Self {
        Self {
            extent: Extent2D::default(),
            format: ColorFormat::Rgba8,
            present_mode: PresentMode::Fifo,
        }
    }
}

/// Swapchain with its wrapped images
pub struct Swapchain {
    backend: Box<dyn BackendSwapchain>,
    images: Vec<Image>,
    current_index: Option<u32>,
}

impl Swapchain {
    pub fn new(
        context: &GpuContext,
        surface: &dyn BackendSurface,
        info: &SwapchainCreateInfo,
    ) -> Result<Self> {
        let backend = context.backend().create_swapchain(surface, info)?;
        let image_info = ImageCreateInfo {
            usage: ImageUsage::COLOR_ATTACHMENT | ImageUsage::TRANSFER_DST,
            aspect: ImageAspect::COLOR,
            extent: backend.extent(),
            format: backend.format(),
            optimal_layout: ImageLayout::PresentSrc,
            samples: SampleCount::X1,
        };
        let images: Vec<Image> = backend
            .images()?
            .into_iter()
            .map(|image| Image::wrap(image, image_info))
            .collect();

        ignis_info!(
            "ignis::Swapchain",
            "Created swapchain {}x{} ({:?}, {} images)",
            image_info.extent.width,
            image_info.extent.height,
            image_info.format,
            images.len()
        );

        Ok(Self {
            backend,
            images,
            current_index: None,
        })
    }

    /// Block until an image is available and make it current.
    ///
    /// `signal` is signaled once the image may be written.
    pub fn acquire_next_image(&mut self, signal: &Semaphore) -> Result<&mut Image> {
        let index = self.backend.acquire_next_image(signal.backend())?;
        self.current_index = Some(index);
        self.images
            .get_mut(index as usize)
            .ok_or_else(|| Error::BackendError(format!("acquired unknown swapchain image {}", index)))
    }

    /// Present the current image once `waits` are signaled
    pub fn present_current(&self, queue: Queue, waits: &[&Semaphore]) -> Result<()> {
        let index = self.current_index.ok_or_else(|| {
            Error::InvalidResource("present without an acquired swapchain image".to_string())
        })?;
        let waits: Vec<&dyn BackendSemaphore> = waits.iter().map(|s| s.backend()).collect();
        self.backend.present(queue.index(), index, &waits)
    }

    /// Image returned by the last acquisition
    pub fn current_image(&self) -> Option<&Image> {
        self.current_index.map(|index| &self.images[index as usize])
    }

    pub fn current_image_mut(&mut self) -> Option<&mut Image> {
        self.current_index.map(|index| &mut self.images[index as usize])
    }

    pub fn current_index(&self) -> Option<u32> {
        self.current_index
    }

    pub fn images(&self) -> &[Image] {
        &self.images
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn extent(&self) -> Extent2D {
        self.backend.extent()
    }

    pub fn format(&self) -> Format {
        self.backend.format()
    }

    pub fn backend(&self) -> &dyn BackendSwapchain {
        self.backend.as_ref()
    }
}

#[cfg(test)]
#[path = "swapchain_tests.rs"]
mod tests;
