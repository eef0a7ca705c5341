/// Renderer - frames in flight over a render target
///
/// Each frame slot owns one fence and one command. `begin_frame` blocks on
/// the slot's fence, so the CPU never runs more than `frames_in_flight`
/// frames ahead of the GPU. Slots are used round-robin, advancing at
/// `Frame::end`.
///
/// A `Frame` borrows the renderer mutably, so at most one frame is open at
/// a time.

use std::sync::Arc;

use glam::Mat4;

use crate::error::{Error, Result};
use crate::device::{
    BufferId, Buffer, Command, DepthAttachment, Device, DrawAttachment, Fence, GpuContext,
    ImageLayout, LoadOp, Pipeline, Queue, Rect2D, Recording, StoreOp, SubmitInfo, Viewport,
};
use crate::renderer::push_constants::PushConstants;
use crate::renderer::render_target::RenderTarget;
use crate::{ignis_debug, ignis_error};

/// Renderer parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RendererCreateInfo {
    pub frames_in_flight: u32,
    /// Graphics queue the frames are submitted to
    pub queue_index: u32,
}

impl Default for RendererCreateInfo {
    fn default() -> Self {
        Self {
            frames_in_flight: 2,
            queue_index: 0,
        }
    }
}

/// Load/store behavior of a frame's attachments
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderFrameSettings {
    pub clear_color: [f32; 4],
    pub color_load_op: LoadOp,
    pub color_store_op: StoreOp,
    pub clear_depth: f32,
    pub depth_load_op: LoadOp,
    pub depth_store_op: StoreOp,
    /// Attach the target's depth image (when it has one)
    pub render_depth: bool,
}

impl Default for RenderFrameSettings {
    fn default() -> Self {
        Self {
            clear_color: [0.02, 0.02, 0.02, 1.0],
            color_load_op: LoadOp::Clear,
            color_store_op: StoreOp::Store,
            clear_depth: 1.0,
            depth_load_op: LoadOp::Clear,
            depth_store_op: StoreOp::DontCare,
            render_depth: true,
        }
    }
}

impl RenderFrameSettings {
    /// Keep the previous contents of color and depth
    pub fn load_previous() -> Self {
        Self {
            color_load_op: LoadOp::Load,
            depth_load_op: LoadOp::Load,
            depth_store_op: StoreOp::Store,
            ..Self::default()
        }
    }
}

/// One indexed draw
#[derive(Clone, Copy)]
pub struct DrawSettings<'a> {
    /// Pipeline declaring a push constant block of at least `PushConstants::SIZE` bytes
    pub pipeline: &'a Pipeline,
    pub index_buffer: &'a Buffer,
    pub index_count: u32,
    pub first_index: u32,
    pub instance_count: u32,
    pub vertex_buffer: BufferId,
    pub material_buffer: BufferId,
    pub instance_buffer: BufferId,
    pub aux_buffers: [BufferId; 3],
    pub transform: Mat4,
    /// Viewport and scissor; the whole target when `None`
    pub viewport: Option<Rect2D>,
}

impl<'a> DrawSettings<'a> {
    pub fn new(pipeline: &'a Pipeline, index_buffer: &'a Buffer, index_count: u32) -> Self {
        Self {
            pipeline,
            index_buffer,
            index_count,
            first_index: 0,
            instance_count: 1,
            vertex_buffer: BufferId::INVALID,
            material_buffer: BufferId::INVALID,
            instance_buffer: BufferId::INVALID,
            aux_buffers: [BufferId::INVALID; 3],
            transform: Mat4::IDENTITY,
            viewport: None,
        }
    }

    pub fn push_constants(&self) -> PushConstants {
        PushConstants::new(
            self.transform,
            self.vertex_buffer,
            self.material_buffer,
            self.instance_buffer,
            self.aux_buffers,
        )
    }
}

struct FrameSlot {
    fence: Fence,
    command: Command,
}

/// Frame pacing over `frames_in_flight` slots
pub struct Renderer {
    context: Arc<GpuContext>,
    slots: Vec<FrameSlot>,
    current_frame: usize,
    frame_count: u64,
}

impl Renderer {
    pub fn new(device: &Device, info: &RendererCreateInfo) -> Result<Self> {
        if info.frames_in_flight == 0 {
            return Err(Error::InvalidResource(
                "renderer needs at least one frame in flight".to_string(),
            ));
        }

        let queue = device.queue(info.queue_index);
        let slots = (0..info.frames_in_flight)
            .map(|_| {
                Ok(FrameSlot {
                    fence: device.create_fence(true)?,
                    command: device.create_command(queue)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        ignis_debug!(
            "ignis::Renderer",
            "Created renderer with {} frames in flight on queue {}",
            info.frames_in_flight,
            queue.index()
        );

        Ok(Self {
            context: Arc::clone(device.context()),
            slots,
            current_frame: 0,
            frame_count: 0,
        })
    }

    pub fn frames_in_flight(&self) -> usize {
        self.slots.len()
    }

    /// Slot used by the next `begin_frame`
    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    /// Number of frames ended so far
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn queue(&self) -> Queue {
        self.slots[0].command.queue()
    }

    /// Start a frame on `target`.
    ///
    /// Blocks until the GPU has finished the previous frame of the same
    /// slot, then starts recording: the draw image moves to
    /// `ColorAttachment`, the depth image to `DepthAttachment`, and a
    /// rendering scope covering the whole target is opened.
    ///
    /// # Panics
    ///
    /// If the previous frame of this slot was dropped without `end()`.
    pub fn begin_frame<'a>(
        &'a mut self,
        target: &'a mut RenderTarget,
        settings: &RenderFrameSettings,
    ) -> Result<Frame<'a>> {
        let index = self.current_frame;
        let slot = &mut self.slots[index];
        assert!(
            !slot.command.is_recording(),
            "frame {} was dropped without end()",
            index
        );

        slot.fence.wait()?;
        let mut recording = slot.command.begin()?;

        let render_depth = settings.render_depth && target.depth_image().is_some();
        recording.transition_image_layout(target.draw_image_mut(), ImageLayout::ColorAttachment);
        if render_depth {
            if let Some(depth) = target.depth_image_mut() {
                recording.transition_image_layout(depth, ImageLayout::DepthAttachment);
            }
        }

        let draw = DrawAttachment {
            image: target.draw_image(),
            load_op: settings.color_load_op,
            store_op: settings.color_store_op,
            clear_color: settings.clear_color,
        };
        let depth = target
            .depth_image()
            .filter(|_| render_depth)
            .map(|image| DepthAttachment {
                image,
                load_op: settings.depth_load_op,
                store_op: settings.depth_store_op,
                clear_depth: settings.clear_depth,
            });
        recording.begin_render(Some(&draw), depth.as_ref());

        let area = Rect2D::from_extent(target.extent());
        recording.set_viewport(Viewport::from_rect(area));
        recording.set_scissor(area);

        Ok(Frame {
            renderer: self,
            target,
            index,
        })
    }
}

/// An open frame, ended with [`Frame::end`]
pub struct Frame<'a> {
    renderer: &'a mut Renderer,
    target: &'a mut RenderTarget,
    index: usize,
}

impl<'a> Frame<'a> {
    /// Frame slot of this frame
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn target(&self) -> &RenderTarget {
        self.target
    }

    /// Recording handle for custom commands inside the frame's rendering scope
    pub fn command(&mut self) -> Recording<'_> {
        self.renderer.slots[self.index].command.resume()
    }

    /// Record one indexed, instanced draw with its push constants
    pub fn draw(&mut self, settings: &DrawSettings<'_>) {
        let area = settings
            .viewport
            .unwrap_or_else(|| Rect2D::from_extent(self.target.extent()));

        let mut recording = self.command();
        recording.bind_pipeline(settings.pipeline);
        recording.set_viewport(Viewport::from_rect(area));
        recording.set_scissor(area);
        recording.bind_index_buffer(settings.index_buffer, 0);
        recording.push_constants(&settings.push_constants(), 0);
        recording.draw_instanced(
            settings.index_count,
            settings.instance_count,
            settings.first_index,
            0,
        );
    }

    /// Clear `rect` of the draw image
    pub fn clear_viewport(&mut self, rect: Rect2D, color: [f32; 4]) {
        self.command().clear_viewport(rect, color);
    }

    /// Close rendering, resolve a multisampled target, submit with the
    /// slot's fence and advance to the next slot.
    ///
    /// The final image is left in `TransferSrc` layout. A failed submission
    /// does not advance; the slot is left usable by the next `begin_frame`.
    pub fn end(self) -> Result<()> {
        let Frame {
            renderer,
            target,
            index,
        } = self;
        let slot = &mut renderer.slots[index];

        let mut recording = slot.command.resume();
        recording.end_rendering();
        recording.transition_image_layout(target.draw_image_mut(), ImageLayout::TransferSrc);
        if target.is_multisampled() {
            if let Some(resolve) = target.resolve_image_mut() {
                recording.transition_image_layout(resolve, ImageLayout::TransferDst);
            }
            if let Some(resolve) = target.resolve_image() {
                recording.resolve_image(target.draw_image(), resolve);
            }
            if let Some(resolve) = target.resolve_image_mut() {
                recording.transition_image_layout(resolve, ImageLayout::TransferSrc);
            }
        }
        recording.end()?;

        // The fence stays signaled until a submission is about to use it
        slot.fence.reset()?;
        let submitted = renderer
            .context
            .submit(&[SubmitInfo::new(&slot.command)], Some(&slot.fence));
        if let Err(err) = submitted {
            if let Err(e) = slot.fence.recreate_signaled(&renderer.context) {
                ignis_error!("ignis::Renderer", "Cannot replace fence of frame slot {}: {}", index, e);
            }
            // The recorded barriers never ran
            target.draw_image_mut().set_current_layout(ImageLayout::Undefined);
            if let Some(resolve) = target.resolve_image_mut() {
                resolve.set_current_layout(ImageLayout::Undefined);
            }
            if let Some(depth) = target.depth_image_mut() {
                depth.set_current_layout(ImageLayout::Undefined);
            }
            return Err(err);
        }

        renderer.current_frame = (index + 1) % renderer.slots.len();
        renderer.frame_count += 1;
        Ok(())
    }
}

#[cfg(test)]
#[path = "renderer_tests.rs"]
mod tests;
