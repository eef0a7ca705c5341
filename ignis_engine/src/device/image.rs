/// Image - wrapped or device-allocated image with layout tracking
///
/// The current layout is only changed by the transition operations of a
/// recording command (see `Recording::transition_image_layout`).

use crate::error::Result;
use crate::device::backend::{BackendImage, ImageDesc};
use crate::device::context::GpuContext;
use crate::device::types::{
    clamp_sample_count, ColorFormat, DepthFormat, Extent2D, Format, ImageAspect, ImageLayout,
    ImageUsage, SampleCount, COLOR_FORMAT, DEPTH_FORMAT,
};

/// Full description of an image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageCreateInfo {
    pub usage: ImageUsage,
    pub aspect: ImageAspect,
    pub extent: Extent2D,
    pub format: Format,
    /// Layout the image rests in when not being written
    pub optimal_layout: ImageLayout,
    pub samples: SampleCount,
}

impl Default for ImageCreateInfo {
    fn default() -> Self {
        Self {
            usage: ImageUsage::empty(),
            aspect: ImageAspect::COLOR,
            extent: Extent2D::default(),
            format: Format::Undefined,
            optimal_layout: ImageLayout::Undefined,
            samples: SampleCount::X1,
        }
    }
}

/// Color attachment request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawImageCreateInfo {
    pub extent: Extent2D,
    pub format: ColorFormat,
    /// Requested sample count, clamped to what the device supports
    pub samples: u32,
}

impl Default for DrawImageCreateInfo {
    fn default() -> Self {
        Self {
            extent: Extent2D::default(),
            format: COLOR_FORMAT,
            samples: 1,
        }
    }
}

/// Depth attachment request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthImageCreateInfo {
    pub extent: Extent2D,
    pub format: DepthFormat,
    /// Requested sample count, clamped to what the device supports
    pub samples: u32,
}

impl Default for DepthImageCreateInfo {
    fn default() -> Self {
        Self {
            extent: Extent2D::default(),
            format: DEPTH_FORMAT,
            samples: 1,
        }
    }
}

/// Who owns the image memory
pub enum ImageMemory {
    /// Externally created image (swapchain), memory not owned
    Wrapped(Box<dyn BackendImage>),
    /// Image with its own device allocation, freed on drop
    Allocated(Box<dyn BackendImage>),
}

/// GPU image
pub struct Image {
    memory: ImageMemory,
    info: ImageCreateInfo,
    current_layout: ImageLayout,
}

impl Image {
    /// Wrap an image owned elsewhere
    pub fn wrap(backend: Box<dyn BackendImage>, info: ImageCreateInfo) -> Self {
        Self {
            memory: ImageMemory::Wrapped(backend),
            info,
            current_layout: ImageLayout::Undefined,
        }
    }

    /// Allocate a device image
    pub fn allocate(context: &GpuContext, info: ImageCreateInfo) -> Result<Self> {
        let backend = context.backend().create_image(&ImageDesc {
            extent: info.extent,
            format: info.format,
            usage: info.usage,
            aspect: info.aspect,
            samples: info.samples,
        })?;

        Ok(Self {
            memory: ImageMemory::Allocated(backend),
            info,
            current_layout: ImageLayout::Undefined,
        })
    }

    /// Color attachment resting in `ColorAttachment` layout
    pub fn allocate_draw_image(context: &GpuContext, info: &DrawImageCreateInfo) -> Result<Self> {
        let samples = clamp_sample_count(info.samples, context.properties().sample_counts);
        Self::allocate(
            context,
            ImageCreateInfo {
                usage: ImageUsage::COLOR_ATTACHMENT
                    | ImageUsage::TRANSFER_SRC
                    | ImageUsage::TRANSFER_DST
                    | ImageUsage::SAMPLED,
                aspect: ImageAspect::COLOR,
                extent: info.extent,
                format: info.format.format(),
                optimal_layout: ImageLayout::ColorAttachment,
                samples,
            },
        )
    }

    /// Depth attachment resting in `DepthAttachment` layout
    pub fn allocate_depth_image(context: &GpuContext, info: &DepthImageCreateInfo) -> Result<Self> {
        let samples = clamp_sample_count(info.samples, context.properties().sample_counts);
        let format = info.format.format();
        Self::allocate(
            context,
            ImageCreateInfo {
                usage: ImageUsage::DEPTH_STENCIL_ATTACHMENT | ImageUsage::SAMPLED,
                aspect: format.aspect(),
                extent: info.extent,
                format,
                optimal_layout: ImageLayout::DepthAttachment,
                samples,
            },
        )
    }

    pub fn backend(&self) -> &dyn BackendImage {
        match &self.memory {
            ImageMemory::Wrapped(image) | ImageMemory::Allocated(image) => image.as_ref(),
        }
    }

    pub fn memory(&self) -> &ImageMemory {
        &self.memory
    }

    pub fn is_wrapped(&self) -> bool {
        matches!(self.memory, ImageMemory::Wrapped(_))
    }

    pub fn info(&self) -> &ImageCreateInfo {
        &self.info
    }

    pub fn usage(&self) -> ImageUsage {
        self.info.usage
    }

    pub fn aspect(&self) -> ImageAspect {
        self.info.aspect
    }

    pub fn extent(&self) -> Extent2D {
        self.info.extent
    }

    pub fn format(&self) -> Format {
        self.info.format
    }

    pub fn sample_count(&self) -> SampleCount {
        self.info.samples
    }

    pub fn optimal_layout(&self) -> ImageLayout {
        self.info.optimal_layout
    }

    /// Layout after the last recorded transition
    pub fn current_layout(&self) -> ImageLayout {
        self.current_layout
    }

    /// Bytes per pixel
    pub fn pixel_size(&self) -> u64 {
        self.info.format.pixel_size()
    }

    /// Bytes of one full single-sampled copy of the image
    pub fn size(&self) -> u64 {
        self.info.extent.area() * self.pixel_size()
    }

    pub(crate) fn set_current_layout(&mut self, layout: ImageLayout) {
        self.current_layout = layout;
    }
}

#[cfg(test)]
#[path = "image_tests.rs"]
mod tests;
