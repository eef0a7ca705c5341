/// RenderTarget - draw image with optional resolve and depth images
///
/// The target is multisampled when its (clamped) sample count is above one;
/// it then owns a single-sampled resolve image that receives the result at
/// the end of each frame. Images are never recreated.

use crate::error::Result;
use crate::device::{
    ColorFormat, DepthFormat, DepthImageCreateInfo, Device, DrawImageCreateInfo, Extent2D, Image,
    SampleCount, COLOR_FORMAT, DEPTH_FORMAT,
};

/// Render target parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTargetCreateInfo {
    pub extent: Extent2D,
    /// Requested MSAA sample count, clamped to the device
    pub samples: u32,
    pub with_depth: bool,
    pub color_format: ColorFormat,
    pub depth_format: DepthFormat,
}

impl Default for RenderTargetCreateInfo {
    fn default() -> Self {
        Self {
            extent: Extent2D::default(),
            samples: 1,
            with_depth: true,
            color_format: COLOR_FORMAT,
            depth_format: DEPTH_FORMAT,
        }
    }
}

/// Attachments of a frame
pub struct RenderTarget {
    draw: Image,
    resolve: Option<Image>,
    depth: Option<Image>,
    extent: Extent2D,
    samples: SampleCount,
}

impl RenderTarget {
    pub fn new(device: &Device, info: &RenderTargetCreateInfo) -> Result<Self> {
        let context = device.context();
        let samples = device.clamp_sample_count(info.samples);

        let draw = Image::allocate_draw_image(
            context,
            &DrawImageCreateInfo {
                extent: info.extent,
                format: info.color_format,
                samples: samples.as_u32(),
            },
        )?;

        let resolve = if samples.is_multisampled() {
            Some(Image::allocate_draw_image(
                context,
                &DrawImageCreateInfo {
                    extent: info.extent,
                    format: info.color_format,
                    samples: 1,
                },
            )?)
        } else {
            None
        };

        let depth = if info.with_depth {
            Some(Image::allocate_depth_image(
                context,
                &DepthImageCreateInfo {
                    extent: info.extent,
                    format: info.depth_format,
                    samples: samples.as_u32(),
                },
            )?)
        } else {
            None
        };

        Ok(Self {
            draw,
            resolve,
            depth,
            extent: info.extent,
            samples,
        })
    }

    pub fn extent(&self) -> Extent2D {
        self.extent
    }

    pub fn sample_count(&self) -> SampleCount {
        self.samples
    }

    pub fn is_multisampled(&self) -> bool {
        self.samples.is_multisampled()
    }

    pub fn draw_image(&self) -> &Image {
        &self.draw
    }

    pub fn draw_image_mut(&mut self) -> &mut Image {
        &mut self.draw
    }

    pub fn resolve_image(&self) -> Option<&Image> {
        self.resolve.as_ref()
    }

    pub fn resolve_image_mut(&mut self) -> Option<&mut Image> {
        self.resolve.as_mut()
    }

    pub fn depth_image(&self) -> Option<&Image> {
        self.depth.as_ref()
    }

    pub fn depth_image_mut(&mut self) -> Option<&mut Image> {
        self.depth.as_mut()
    }

    /// Image holding the finished frame: the resolve image when multisampled
    pub fn final_image(&self) -> &Image {
        self.resolve.as_ref().unwrap_or(&self.draw)
    }

    pub fn final_image_mut(&mut self) -> &mut Image {
        match self.resolve.as_mut() {
            Some(resolve) => resolve,
            None => &mut self.draw,
        }
    }
}

#[cfg(test)]
#[path = "render_target_tests.rs"]
mod tests;
