/// Presenter - copies finished frames into the swapchain and presents them
///
/// `present(target)`:
/// 1. waits for the previous blit
/// 2. acquires a swapchain image (signals `image_available`)
/// 3. blits the target's final image into it and moves it to `PresentSrc`
/// 4. submits, waiting on `image_available` and signaling `blit_finished`
/// 5. presents once `blit_finished` is signaled
///
/// The blit is submitted to the presenter's queue; frames rendered on the
/// same queue are ordered before it.

use std::sync::Arc;

use crate::error::Result;
use crate::device::{
    BackendSurface, Command, Device, Extent2D, Fence, GpuContext, Image, ImageLayout, Offset2D,
    Queue, Semaphore, SubmitInfo, Swapchain, SwapchainCreateInfo,
};
use crate::renderer::render_target::RenderTarget;
use crate::ignis_error;

pub struct Presenter {
    context: Arc<GpuContext>,
    queue: Queue,
    swapchain: Swapchain,
    command: Command,
    image_available: Semaphore,
    blit_finished: Semaphore,
    fence: Fence,
}

impl Presenter {
    /// Swapchain for `surface` with a blit command on queue 0
    pub fn new(
        device: &Device,
        surface: &dyn BackendSurface,
        info: &SwapchainCreateInfo,
    ) -> Result<Self> {
        let queue = device.queue(0);
        Ok(Self {
            context: Arc::clone(device.context()),
            queue,
            swapchain: device.create_swapchain(surface, info)?,
            command: device.create_command(queue)?,
            image_available: device.create_semaphore()?,
            blit_finished: device.create_semaphore()?,
            fence: device.create_fence(true)?,
        })
    }

    pub fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }

    pub fn extent(&self) -> Extent2D {
        self.swapchain.extent()
    }

    pub fn queue(&self) -> Queue {
        self.queue
    }

    /// Show the target's final image (the resolve image when multisampled)
    ///
    /// If recording or submitting the blit fails, the acquired image is
    /// abandoned: `image_available` and the fence are replaced so the next
    /// `present` neither blocks nor signals a semaphore that is still pending.
    pub fn present(&mut self, target: &mut RenderTarget) -> Result<()> {
        self.fence.wait()?;
        let image = self.swapchain.acquire_next_image(&self.image_available)?;

        let submitted = record_blit(&mut self.command, target, image).and_then(|()| {
            self.fence.reset()?;
            self.context.submit(
                &[SubmitInfo {
                    command: &self.command,
                    waits: &[&self.image_available],
                    signals: &[&self.blit_finished],
                }],
                Some(&self.fence),
            )
        });
        if let Err(err) = submitted {
            self.discard_acquired_image();
            return Err(err);
        }

        self.swapchain
            .present_current(self.queue, &[&self.blit_finished])
    }

    fn discard_acquired_image(&mut self) {
        // Its recorded barriers never ran; Undefined is a valid source for the next blit
        if let Some(image) = self.swapchain.current_image_mut() {
            image.set_current_layout(ImageLayout::Undefined);
        }
        if let Err(e) = self.image_available.recreate(&self.context) {
            ignis_error!("ignis::Presenter", "Cannot replace image-available semaphore: {}", e);
        }
        if !matches!(self.fence.is_signaled(), Ok(true)) {
            if let Err(e) = self.fence.recreate_signaled(&self.context) {
                ignis_error!("ignis::Presenter", "Cannot replace blit fence: {}", e);
            }
        }
    }
}

fn record_blit(command: &mut Command, target: &mut RenderTarget, image: &mut Image) -> Result<()> {
    let mut recording = command.begin()?;
    let source = target.final_image_mut();
    if source.current_layout() != ImageLayout::TransferSrc {
        recording.transition_image_layout(source, ImageLayout::TransferSrc);
    }
    recording.transition_image_layout(image, ImageLayout::TransferDst);
    recording.blit_image(source, image, Offset2D::default(), Offset2D::default());
    recording.transition_image_layout(image, ImageLayout::PresentSrc);
    recording.end()
}

#[cfg(test)]
#[path = "presenter_tests.rs"]
mod tests;
