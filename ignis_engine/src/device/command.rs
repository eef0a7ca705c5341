/// Command - one primary command buffer with a recording state machine
///
/// `Initial -> Recording -> Executable`, and back to `Recording` on the next
/// `begin()`. Recording operations only exist on the [`Recording`] handle
/// returned by `begin()`, so they cannot be issued outside a recording.
///
/// Rules that remain runtime contracts (and panic when broken):
/// - `begin()` while already recording
/// - drawing without a bound pipeline or index buffer
/// - pushing constants without a bound pipeline
/// - nested or unbalanced rendering scopes
/// - copies from/to images not in a transfer layout
///
/// Every draw is indexed. One color and one depth attachment per rendering
/// scope.

use std::sync::Arc;

use bytemuck::Pod;

use crate::error::{Error, Result};
use crate::device::backend::{
    BackendCommandBuffer, ColorAttachmentInfo, DepthAttachmentInfo, ImageRegion, RenderingInfo,
};
use crate::device::buffer::Buffer;
use crate::device::context::GpuContext;
use crate::device::image::Image;
use crate::device::pipeline::Pipeline;
use crate::device::types::{
    BufferUsage, Extent2D, ImageLayout, LoadOp, Offset2D, Queue, Rect2D, SampleCount, StoreOp,
    Viewport,
};

/// Recording state of a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandState {
    /// Allocated, never recorded
    Initial,
    /// Between `begin()` and `end()`
    Recording,
    /// Recorded, ready for submission
    Executable,
}

/// Color attachment of a rendering scope
#[derive(Clone, Copy)]
pub struct DrawAttachment<'a> {
    pub image: &'a Image,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
    pub clear_color: [f32; 4],
}

impl<'a> DrawAttachment<'a> {
    /// Clear to opaque black, store the result
    pub fn new(image: &'a Image) -> Self {
        Self {
            image,
            load_op: LoadOp::Clear,
            store_op: StoreOp::Store,
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

/// Depth attachment of a rendering scope
#[derive(Clone, Copy)]
pub struct DepthAttachment<'a> {
    pub image: &'a Image,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
    pub clear_depth: f32,
}

impl<'a> DepthAttachment<'a> {
    /// Clear to 1.0, discard the result
    pub fn new(image: &'a Image) -> Self {
        Self {
            image,
            load_op: LoadOp::Clear,
            store_op: StoreOp::DontCare,
            clear_depth: 1.0,
        }
    }
}

/// Recording unit wrapping one command buffer.
///
/// Owns the staging buffers created by uploads recorded into it; they are
/// released on the next `begin()` or when the command is dropped.
pub struct Command {
    context: Arc<GpuContext>,
    queue: Queue,
    command_buffer: Box<dyn BackendCommandBuffer>,
    state: CommandState,
    pipeline_bound: bool,
    push_constant_size: u32,
    index_buffer_bound: bool,
    rendering: bool,
    staging_buffers: Vec<Buffer>,
}

impl Command {
    /// Allocate a command buffer from the pool of `queue`
    pub fn new(context: Arc<GpuContext>, queue: Queue) -> Result<Self> {
        let command_buffer = context.command_pool(queue)?.allocate()?;
        Ok(Self {
            context,
            queue,
            command_buffer,
            state: CommandState::Initial,
            pipeline_bound: false,
            push_constant_size: 0,
            index_buffer_bound: false,
            rendering: false,
            staging_buffers: Vec::new(),
        })
    }

    /// Start recording, dropping the staging buffers of the previous recording.
    ///
    /// # Panics
    ///
    /// If the command is already recording.
    pub fn begin(&mut self) -> Result<Recording<'_>> {
        assert!(
            self.state != CommandState::Recording,
            "command is already recording"
        );

        self.staging_buffers.clear();
        self.command_buffer.begin()?;
        self.state = CommandState::Recording;
        self.pipeline_bound = false;
        self.push_constant_size = 0;
        self.index_buffer_bound = false;
        self.rendering = false;

        Ok(Recording { command: self })
    }

    /// Recording handle of a command that is already recording
    ///
    /// # Panics
    ///
    /// If the command is not recording.
    pub fn resume(&mut self) -> Recording<'_> {
        assert!(
            self.state == CommandState::Recording,
            "command is not recording"
        );
        Recording { command: self }
    }

    pub fn state(&self) -> CommandState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        self.state == CommandState::Recording
    }

    pub fn queue(&self) -> Queue {
        self.queue
    }

    /// Staging buffers kept alive for the current recording
    pub fn staging_buffer_count(&self) -> usize {
        self.staging_buffers.len()
    }

    pub fn backend(&self) -> &dyn BackendCommandBuffer {
        self.command_buffer.as_ref()
    }
}

/// Recording handle returned by [`Command::begin`]
pub struct Recording<'a> {
    command: &'a mut Command,
}

impl<'a> Recording<'a> {
    pub fn command(&self) -> &Command {
        self.command
    }

    /// Finish recording; the command becomes executable
    ///
    /// # Panics
    ///
    /// If a rendering scope is still open.
    pub fn end(self) -> Result<()> {
        assert!(
            !self.command.rendering,
            "end() called inside a rendering scope"
        );
        self.command.command_buffer.end()?;
        self.command.state = CommandState::Executable;
        Ok(())
    }

    pub fn bind_pipeline(&mut self, pipeline: &Pipeline) {
        self.command.command_buffer.bind_pipeline(pipeline.backend());
        self.command.pipeline_bound = true;
        self.command.push_constant_size = pipeline.push_constant_size();
    }

    /// Open a dynamic rendering scope over the attachments.
    ///
    /// The render area is the full extent of the draw image (or of the depth
    /// image when there is no draw image).
    ///
    /// # Panics
    ///
    /// If a scope is already open or both attachments are missing.
    pub fn begin_render(
        &mut self,
        draw: Option<&DrawAttachment<'_>>,
        depth: Option<&DepthAttachment<'_>>,
    ) {
        assert!(!self.command.rendering, "begin_render called while already rendering");

        let extent = match (draw, depth) {
            (Some(draw), _) => draw.image.extent(),
            (None, Some(depth)) => depth.image.extent(),
            (None, None) => panic!("begin_render needs a draw or a depth attachment"),
        };
        if let (Some(draw), Some(depth)) = (draw, depth) {
            assert_eq!(
                draw.image.extent(),
                depth.image.extent(),
                "draw and depth attachments must have the same extent"
            );
        }

        let info = RenderingInfo {
            area: Rect2D::from_extent(extent),
            color: draw.map(|draw| ColorAttachmentInfo {
                image: draw.image.backend(),
                layout: draw.image.current_layout(),
                load_op: draw.load_op,
                store_op: draw.store_op,
                clear_color: draw.clear_color,
            }),
            depth: depth.map(|depth| DepthAttachmentInfo {
                image: depth.image.backend(),
                layout: depth.image.current_layout(),
                load_op: depth.load_op,
                store_op: depth.store_op,
                clear_depth: depth.clear_depth,
            }),
        };

        self.command.command_buffer.begin_rendering(&info);
        self.command.rendering = true;
    }

    /// # Panics
    ///
    /// If no rendering scope is open.
    pub fn end_rendering(&mut self) {
        assert!(self.command.rendering, "end_rendering called outside a rendering scope");
        self.command.command_buffer.end_rendering();
        self.command.rendering = false;
    }

    pub fn is_rendering(&self) -> bool {
        self.command.rendering
    }

    /// Push `data` at `offset` of the bound pipeline's push constant block
    ///
    /// # Panics
    ///
    /// If no pipeline is bound or the data does not fit the block.
    pub fn push_constants<T: Pod>(&mut self, data: &T, offset: u32) {
        assert!(self.command.pipeline_bound, "pipeline is not bound");
        let bytes = bytemuck::bytes_of(data);
        assert!(
            offset as usize + bytes.len() <= self.command.push_constant_size as usize,
            "push constants ({} bytes at offset {}) exceed the pipeline block of {} bytes",
            bytes.len(),
            offset,
            self.command.push_constant_size
        );
        self.command.command_buffer.push_constants(offset, bytes);
    }

    /// Record a layout transition barrier and update the image's current layout
    pub fn transition_image_layout(&mut self, image: &mut Image, layout: ImageLayout) {
        self.command.command_buffer.image_barrier(
            image.backend(),
            image.aspect(),
            image.current_layout(),
            layout,
        );
        image.set_current_layout(layout);
    }

    /// Transition to the image's optimal layout; records nothing if it is already there
    pub fn transition_to_optimal_layout(&mut self, image: &mut Image) {
        let optimal = image.optimal_layout();
        if image.current_layout() == optimal {
            return;
        }
        self.transition_image_layout(image, optimal);
    }

    /// Copy the overlapping region of `src` (from `src_offset`) into `dst` (at `dst_offset`)
    ///
    /// Records nothing when an offset lies on or past the image edge.
    ///
    /// # Panics
    ///
    /// If either offset is negative.
    pub fn copy_image(&mut self, src: &Image, dst: &Image, src_offset: Offset2D, dst_offset: Offset2D) {
        assert_transfer_layout(src, ImageLayout::TransferSrc, "copy_image");
        assert_transfer_layout(dst, ImageLayout::TransferDst, "copy_image");
        assert_offset(src_offset, "copy_image");
        assert_offset(dst_offset, "copy_image");

        let src_extent = remaining_extent(src.extent(), src_offset);
        let dst_extent = remaining_extent(dst.extent(), dst_offset);
        let extent = Extent2D::new(
            src_extent.width.min(dst_extent.width),
            src_extent.height.min(dst_extent.height),
        );
        if extent.area() == 0 {
            return;
        }

        self.command.command_buffer.copy_image(
            &region(src, src_offset, extent),
            &region(dst, dst_offset, extent),
        );
    }

    /// Scaled copy of `src` (from `src_offset` to its end) onto `dst` (from `dst_offset` to its end)
    ///
    /// Records nothing when either side has no area left past its offset.
    ///
    /// # Panics
    ///
    /// If either offset is negative.
    pub fn blit_image(&mut self, src: &Image, dst: &Image, src_offset: Offset2D, dst_offset: Offset2D) {
        assert_transfer_layout(src, ImageLayout::TransferSrc, "blit_image");
        assert_transfer_layout(dst, ImageLayout::TransferDst, "blit_image");
        assert_offset(src_offset, "blit_image");
        assert_offset(dst_offset, "blit_image");

        let src_extent = remaining_extent(src.extent(), src_offset);
        let dst_extent = remaining_extent(dst.extent(), dst_offset);
        if src_extent.area() == 0 || dst_extent.area() == 0 {
            return;
        }

        self.command.command_buffer.blit_image(
            &region(src, src_offset, src_extent),
            &region(dst, dst_offset, dst_extent),
        );
    }

    /// Resolve a multisampled image into a single-sampled one
    pub fn resolve_image(&mut self, src: &Image, dst: &Image) {
        assert_transfer_layout(src, ImageLayout::TransferSrc, "resolve_image");
        assert_transfer_layout(dst, ImageLayout::TransferDst, "resolve_image");
        assert_eq!(
            dst.sample_count(),
            SampleCount::X1,
            "resolve destination must be single-sampled"
        );

        let extent = src.extent();
        self.command.command_buffer.resolve_image(
            &region(src, Offset2D::default(), extent),
            &region(dst, Offset2D::default(), extent),
        );
    }

    /// Upload `pixels` into `extent` (whole image when `None`) at `offset`
    /// through a staging buffer owned by this command.
    ///
    /// The image must be in `TransferDst` (or `General`) layout.
    pub fn update_image(
        &mut self,
        image: &Image,
        pixels: &[u8],
        offset: Offset2D,
        extent: Option<Extent2D>,
    ) -> Result<()> {
        assert_transfer_layout(image, ImageLayout::TransferDst, "update_image");

        let extent = extent.unwrap_or_else(|| remaining_extent(image.extent(), offset));
        let size = extent.area() * image.pixel_size();
        if size == 0 {
            return Ok(());
        }
        if (pixels.len() as u64) < size {
            return Err(Error::InvalidResource(format!(
                "update_image needs {} bytes, got {}",
                size,
                pixels.len()
            )));
        }

        let staging = Buffer::allocate_staging(&self.command.context, size)?;
        staging.write_data(&pixels[..size as usize], 0)?;
        self.command
            .command_buffer
            .copy_buffer_to_image(staging.backend(), &region(image, offset, extent));
        self.command.staging_buffers.push(staging);
        Ok(())
    }

    /// Write `data` into `buffer` at `offset`.
    ///
    /// Host-visible buffers are written immediately; otherwise the data goes
    /// through a staging buffer owned by this command and a recorded copy.
    pub fn update_buffer(&mut self, buffer: &Buffer, data: &[u8], offset: u64) -> Result<()> {
        buffer.check_range(offset, data.len() as u64)?;
        if data.is_empty() {
            return Ok(());
        }
        if buffer.is_host_visible() {
            return buffer.write_data(data, offset);
        }

        let staging = Buffer::allocate_staging(&self.command.context, data.len() as u64)?;
        staging.write_data(data, 0)?;
        self.copy_buffer(&staging, buffer, 0, offset, data.len() as u64);
        self.command.staging_buffers.push(staging);
        Ok(())
    }

    /// Record a buffer-to-buffer copy
    ///
    /// # Panics
    ///
    /// If either range is out of bounds.
    pub fn copy_buffer(&mut self, src: &Buffer, dst: &Buffer, src_offset: u64, dst_offset: u64, size: u64) {
        assert!(
            src.check_range(src_offset, size).is_ok() && dst.check_range(dst_offset, size).is_ok(),
            "copy_buffer range out of bounds"
        );
        self.command.command_buffer.copy_buffer(
            src.backend(),
            dst.backend(),
            src_offset,
            dst_offset,
            size,
        );
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.command.command_buffer.set_viewport(viewport);
    }

    pub fn set_scissor(&mut self, scissor: Rect2D) {
        self.command.command_buffer.set_scissor(scissor);
    }

    /// Clear `rect` of the current color attachment to `color`
    ///
    /// # Panics
    ///
    /// If no rendering scope is open.
    pub fn clear_viewport(&mut self, rect: Rect2D, color: [f32; 4]) {
        assert!(self.command.rendering, "clear_viewport called outside a rendering scope");
        self.command.command_buffer.clear_color_attachment(rect, color);
    }

    /// Bind a 32-bit index buffer
    ///
    /// # Panics
    ///
    /// If the buffer was not created as an index buffer.
    pub fn bind_index_buffer(&mut self, buffer: &Buffer, offset: u64) {
        assert!(
            buffer.usage().contains(BufferUsage::INDEX),
            "buffer is not an index buffer"
        );
        self.command.command_buffer.bind_index_buffer(buffer.backend(), offset);
        self.command.index_buffer_bound = true;
    }

    /// Indexed draw of a single instance
    pub fn draw(&mut self, index_count: u32, first_index: u32) {
        self.draw_instanced(index_count, 1, first_index, 0);
    }

    /// Indexed instanced draw
    ///
    /// # Panics
    ///
    /// If no pipeline or no index buffer is bound.
    pub fn draw_instanced(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        first_instance: u32,
    ) {
        assert!(self.command.pipeline_bound, "pipeline is not bound");
        assert!(self.command.index_buffer_bound, "index buffer is not bound");
        self.command.command_buffer.draw_indexed(
            index_count,
            instance_count,
            first_index,
            first_instance,
        );
    }
}

fn assert_offset(offset: Offset2D, op: &str) {
    assert!(
        offset.x >= 0 && offset.y >= 0,
        "{}: negative offset ({}, {})",
        op,
        offset.x,
        offset.y
    );
}

fn remaining_extent(extent: Extent2D, offset: Offset2D) -> Extent2D {
    Extent2D::new(
        extent.width.saturating_sub(offset.x as u32),
        extent.height.saturating_sub(offset.y as u32),
    )
}

fn region(image: &Image, offset: Offset2D, extent: Extent2D) -> ImageRegion<'_> {
    ImageRegion {
        image: image.backend(),
        layout: image.current_layout(),
        aspect: image.aspect(),
        offset,
        extent,
    }
}

fn assert_transfer_layout(image: &Image, expected: ImageLayout, operation: &str) {
    let layout = image.current_layout();
    assert!(
        layout == expected || layout == ImageLayout::General,
        "{}: image is in {:?} layout, expected {:?}",
        operation,
        layout,
        expected
    );
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
