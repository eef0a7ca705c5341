use super::*;
use crate::error::Error;
use crate::device::mock_backend::{
    image_id, semaphore_id, MockBackend, MockFence, MockState, MockSurface, MOCK_SWAPCHAIN_IMAGES,
};
use crate::device::{DeviceConfig, ImageLayout};
use crate::renderer::render_target::RenderTargetCreateInfo;
use crate::renderer::renderer::{RenderFrameSettings, Renderer, RendererCreateInfo};

struct Setup {
    presenter: Presenter,
    target: RenderTarget,
    device: Device,
    state: Arc<MockState>,
}

fn setup() -> Setup {
    let backend = MockBackend::new();
    let state = backend.state();
    let device = Device::new(Box::new(backend), DeviceConfig::default()).unwrap();
    let target = RenderTarget::new(&device, &RenderTargetCreateInfo {
        extent: Extent2D::new(640, 480),
        ..Default::default()
    })
    .unwrap();
    let presenter = Presenter::new(
        &device,
        &MockSurface::new(800, 600),
        &SwapchainCreateInfo::default(),
    )
    .unwrap();
    Setup { presenter, target, device, state }
}

fn render_frame(device: &Device, target: &mut RenderTarget) {
    let mut renderer = Renderer::new(device, &RendererCreateInfo::default()).unwrap();
    renderer
        .begin_frame(target, &RenderFrameSettings::default())
        .unwrap()
        .end()
        .unwrap();
}

fn fence_id(fence: &Fence) -> u32 {
    fence.backend().as_any().downcast_ref::<MockFence>().unwrap().id
}

#[test]
fn test_swapchain_uses_surface_extent() {
    let s = setup();
    assert_eq!(s.presenter.extent(), Extent2D::new(800, 600));
    assert_eq!(s.presenter.swapchain().image_count(), MOCK_SWAPCHAIN_IMAGES as usize);
    assert_eq!(s.presenter.queue().index(), 0);
}

#[test]
fn test_present_acquires_blits_then_presents() {
    let mut s = setup();
    render_frame(&s.device, &mut s.target);
    s.state.clear_log();

    s.presenter.present(&mut s.target).unwrap();

    let blit_finished = semaphore_id(s.presenter.blit_finished.backend());
    assert_eq!(
        s.state.log(),
        vec![
            "acquire 0".to_string(),
            "submit queue=0 batches=1".to_string(),
            format!("present 0 queue=0 waits=[{}]", blit_finished),
        ]
    );
}

#[test]
fn test_blit_submission_contents() {
    let mut s = setup();
    render_frame(&s.device, &mut s.target);

    s.presenter.present(&mut s.target).unwrap();

    let source = image_id(s.target.final_image().backend());
    let swapchain_image = image_id(s.presenter.swapchain().images()[0].backend());
    let submission = s.state.submissions().pop().unwrap();
    assert_eq!(
        submission.commands,
        vec![
            "begin".to_string(),
            format!("barrier {} Undefined->TransferDst", swapchain_image),
            format!("blit_image {}->{}", source, swapchain_image),
            format!("barrier {} TransferDst->PresentSrc", swapchain_image),
            "end".to_string(),
        ]
    );
    assert_eq!(
        submission.waits,
        vec![semaphore_id(s.presenter.image_available.backend())]
    );
    assert_eq!(
        submission.signals,
        vec![semaphore_id(s.presenter.blit_finished.backend())]
    );
    assert_eq!(submission.fence, Some(fence_id(&s.presenter.fence)));
    assert_eq!(
        s.presenter.swapchain().images()[0].current_layout(),
        ImageLayout::PresentSrc
    );
}

#[test]
fn test_source_is_moved_to_transfer_layout_when_needed() {
    let mut s = setup();

    // Never rendered: the draw image is still undefined
    s.presenter.present(&mut s.target).unwrap();

    let source = image_id(s.target.final_image().backend());
    let commands = s.state.submissions().pop().unwrap().commands;
    assert_eq!(commands[1], format!("barrier {} Undefined->TransferSrc", source));
    assert_eq!(s.target.final_image().current_layout(), ImageLayout::TransferSrc);
}

#[test]
fn test_presents_cycle_swapchain_images() {
    let mut s = setup();
    render_frame(&s.device, &mut s.target);
    s.state.clear_log();

    for _ in 0..4 {
        s.presenter.present(&mut s.target).unwrap();
    }

    let acquired: Vec<String> = s
        .state
        .log()
        .into_iter()
        .filter(|entry| entry.starts_with("acquire"))
        .collect();
    assert_eq!(acquired, vec!["acquire 0", "acquire 1", "acquire 2", "acquire 0"]);

    // Each present first waits for the previous blit
    let fence = fence_id(&s.presenter.fence);
    let waits = s.state.fence_waits();
    assert_eq!(waits.iter().filter(|&&id| id == fence).count(), 4);
}

#[test]
fn test_out_of_date_swapchain_is_reported() {
    let mut s = setup();
    s.state.set_out_of_date(true);

    let result = s.presenter.present(&mut s.target);

    assert_eq!(result, Err(Error::SwapchainOutOfDate));
    assert!(s.state.log().iter().all(|entry| !entry.starts_with("present")));
}

#[test]
fn test_failed_blit_submission_leaves_presenter_usable() {
    let mut s = setup();
    render_frame(&s.device, &mut s.target);
    let old_fence = fence_id(&s.presenter.fence);
    let old_semaphore = semaphore_id(s.presenter.image_available.backend());

    s.state.set_fail_submits(true);
    assert!(s.presenter.present(&mut s.target).is_err());
    s.state.set_fail_submits(false);

    // The reset fence and the signaled semaphore were replaced
    assert!(s.presenter.fence.is_signaled().unwrap());
    assert_ne!(fence_id(&s.presenter.fence), old_fence);
    let new_semaphore = semaphore_id(s.presenter.image_available.backend());
    assert_ne!(new_semaphore, old_semaphore);
    assert_eq!(
        s.presenter.swapchain().images()[0].current_layout(),
        ImageLayout::Undefined
    );
    assert!(s.state.log().iter().all(|entry| !entry.starts_with("present")));

    s.presenter.present(&mut s.target).unwrap();
    let submission = s.state.submissions().pop().unwrap();
    assert_eq!(submission.waits, vec![new_semaphore]);
    assert_eq!(submission.fence, Some(fence_id(&s.presenter.fence)));
}
