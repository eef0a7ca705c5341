use super::*;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use crate::device::mock_backend::{pushed_constants, MockBackend, MockState};
use crate::device::{DeviceConfig, Extent2D, PipelineCreateInfo, SampleCounts, ShaderStage};
use crate::renderer::render_target::RenderTargetCreateInfo;

fn create_device() -> (Device, Arc<MockState>) {
    let backend = MockBackend::new().with_sample_counts(SampleCounts::X1 | SampleCounts::X4);
    let state = backend.state();
    (Device::new(Box::new(backend), DeviceConfig::default()).unwrap(), state)
}

fn create_target(device: &Device, samples: u32) -> RenderTarget {
    RenderTarget::new(device, &RenderTargetCreateInfo {
        extent: Extent2D::new(64, 32),
        samples,
        ..Default::default()
    })
    .unwrap()
}

fn create_renderer(device: &Device, frames_in_flight: u32) -> Renderer {
    Renderer::new(device, &RendererCreateInfo {
        frames_in_flight,
        ..Default::default()
    })
    .unwrap()
}

/// Pipeline whose shader declares the frame push constant block
fn create_pipeline(device: &Device) -> Pipeline {
    let shader = device
        .create_shader(&PushConstants::SIZE.to_le_bytes(), ShaderStage::Vertex, None)
        .unwrap();
    device
        .create_pipeline(&PipelineCreateInfo {
            shaders: vec![&shader],
            ..Default::default()
        })
        .unwrap()
}

fn last_submission(state: &MockState) -> Vec<String> {
    state.submissions().pop().unwrap().commands
}

// ============================================================================
// Frame pacing
// ============================================================================

#[test]
fn test_slots_advance_round_robin() {
    let (device, _) = create_device();
    let mut target = create_target(&device, 1);
    let mut renderer = create_renderer(&device, 3);

    let mut slots = Vec::new();
    for _ in 0..7 {
        let frame = renderer.begin_frame(&mut target, &RenderFrameSettings::default()).unwrap();
        slots.push(frame.index());
        frame.end().unwrap();
    }

    assert_eq!(slots, vec![0, 1, 2, 0, 1, 2, 0]);
    assert_eq!(renderer.current_frame(), 1);
    assert_eq!(renderer.frame_count(), 7);
}

#[test]
fn test_begin_frame_waits_on_slot_fence() {
    let (device, state) = create_device();
    let mut target = create_target(&device, 1);
    let mut renderer = create_renderer(&device, 2);

    for _ in 0..3 {
        renderer
            .begin_frame(&mut target, &RenderFrameSettings::default())
            .unwrap()
            .end()
            .unwrap();
    }

    // Frame 2 reuses slot 0 and must wait on the fence of frame 0
    let waits = state.fence_waits();
    assert_eq!(waits.len(), 3);
    assert_ne!(waits[0], waits[1]);
    assert_eq!(waits[0], waits[2]);

    // Each submission is fenced by its slot
    let fences: Vec<Option<u32>> = state.submissions().iter().map(|s| s.fence).collect();
    assert_eq!(fences, vec![Some(waits[0]), Some(waits[1]), Some(waits[0])]);
}

#[test]
fn test_stalled_gpu_blocks_frame_in_flight_limit() {
    let backend = MockBackend::new();
    let state = backend.state();
    state.set_stalled(true);

    let (sender, receiver) = mpsc::channel();
    let worker = thread::spawn(move || {
        let device = Device::new(Box::new(backend), DeviceConfig::default()).unwrap();
        let mut target = create_target(&device, 1);
        let mut renderer = create_renderer(&device, 2);

        for frame in 0..4 {
            let open = renderer
                .begin_frame(&mut target, &RenderFrameSettings::default())
                .unwrap();
            sender.send(frame).unwrap();
            open.end().unwrap();
        }
    });

    let timeout = Duration::from_secs(5);
    assert_eq!(receiver.recv_timeout(timeout), Ok(0));
    assert_eq!(receiver.recv_timeout(timeout), Ok(1));

    // Frame 2 needs slot 0, whose submission never completed
    assert_eq!(
        receiver.recv_timeout(Duration::from_millis(200)),
        Err(mpsc::RecvTimeoutError::Timeout)
    );

    state.complete_pending();
    assert_eq!(receiver.recv_timeout(timeout), Ok(2));
    assert_eq!(receiver.recv_timeout(timeout), Ok(3));
    worker.join().unwrap();
}

#[test]
fn test_failed_submission_does_not_block_the_slot() {
    let backend = MockBackend::new();
    let state = backend.state();

    let (sender, receiver) = mpsc::channel();
    let worker = thread::spawn(move || {
        let device = Device::new(Box::new(backend), DeviceConfig::default()).unwrap();
        let mut target = create_target(&device, 1);
        let mut renderer = create_renderer(&device, 1);

        state.set_fail_submits(true);
        let failed = renderer
            .begin_frame(&mut target, &RenderFrameSettings::default())
            .unwrap()
            .end();
        state.set_fail_submits(false);
        sender
            .send((failed.is_err(), renderer.current_frame(), target.draw_image().current_layout()))
            .unwrap();

        // Same slot again: its fence must not be waiting on the lost submission
        renderer
            .begin_frame(&mut target, &RenderFrameSettings::default())
            .unwrap()
            .end()
            .unwrap();
        sender
            .send((false, renderer.current_frame(), target.draw_image().current_layout()))
            .unwrap();
        assert_eq!(renderer.frame_count(), 1);
    });

    let timeout = Duration::from_secs(5);
    assert_eq!(
        receiver.recv_timeout(timeout),
        Ok((true, 0, ImageLayout::Undefined))
    );
    assert_eq!(
        receiver.recv_timeout(timeout),
        Ok((false, 0, ImageLayout::TransferSrc))
    );
    worker.join().unwrap();
}

#[test]
#[should_panic(expected = "dropped without end()")]
fn test_dropped_frame_panics_on_slot_reuse() {
    let (device, _) = create_device();
    let mut target = create_target(&device, 1);
    let mut renderer = create_renderer(&device, 1);

    let frame = renderer.begin_frame(&mut target, &RenderFrameSettings::default()).unwrap();
    drop(frame);
    let _ = renderer.begin_frame(&mut target, &RenderFrameSettings::default());
}

#[test]
fn test_zero_frames_in_flight_is_rejected() {
    let (device, _) = create_device();
    let result = Renderer::new(&device, &RendererCreateInfo {
        frames_in_flight: 0,
        ..Default::default()
    });
    assert!(result.is_err());
}

// ============================================================================
// Recorded frame contents
// ============================================================================

#[test]
fn test_frame_opens_rendering_with_settings() {
    let (device, state) = create_device();
    let mut target = create_target(&device, 1);
    let mut renderer = create_renderer(&device, 2);

    renderer
        .begin_frame(&mut target, &RenderFrameSettings::default())
        .unwrap()
        .end()
        .unwrap();
    let cleared = last_submission(&state);
    assert!(cleared.iter().any(|c| c.starts_with("begin_rendering 64x32") && c.contains(":Clear depth=")));
    assert!(cleared.contains(&"set_viewport 0,0 64x32".to_string()));

    renderer
        .begin_frame(&mut target, &RenderFrameSettings::load_previous())
        .unwrap()
        .end()
        .unwrap();
    let loaded = last_submission(&state);
    let begin = loaded.iter().find(|c| c.starts_with("begin_rendering")).unwrap();
    assert!(begin.contains(":Load depth="));
    assert!(begin.ends_with(":Load"));
    // Previous frame left the draw image readable by transfers
    assert!(loaded.iter().any(|c| c.ends_with("TransferSrc->ColorAttachment")));
}

#[test]
fn test_frame_without_depth() {
    let (device, state) = create_device();
    let mut target = create_target(&device, 1);
    let mut renderer = create_renderer(&device, 2);
    let settings = RenderFrameSettings {
        render_depth: false,
        ..Default::default()
    };

    renderer.begin_frame(&mut target, &settings).unwrap().end().unwrap();

    let commands = last_submission(&state);
    assert!(commands.iter().any(|c| c.starts_with("begin_rendering") && c.ends_with("depth=none")));
    assert_eq!(
        target.depth_image().unwrap().current_layout(),
        ImageLayout::Undefined
    );
}

#[test]
fn test_draw_pushes_constants_and_draws() {
    let (mut device, state) = create_device();
    let mut target = create_target(&device, 1);
    let mut renderer = create_renderer(&device, 2);
    let pipeline = create_pipeline(&device);
    let index_buffer = device.create_index_buffer32(&[0, 1, 2, 2, 3, 0]).unwrap();
    let vertices = device.create_ssbo(64, None).unwrap();
    let material = device.create_ubo(64, None).unwrap();

    let settings = DrawSettings {
        vertex_buffer: vertices,
        material_buffer: material,
        instance_count: 4,
        transform: Mat4::from_translation(glam::Vec3::new(1.0, 2.0, 3.0)),
        ..DrawSettings::new(&pipeline, &index_buffer, 6)
    };

    let mut frame = renderer.begin_frame(&mut target, &RenderFrameSettings::default()).unwrap();
    frame.draw(&settings);
    frame.clear_viewport(Rect2D { x: 8, y: 8, width: 16, height: 16 }, [1.0, 0.0, 0.0, 1.0]);
    let pushed = pushed_constants(frame.command().command().backend());
    frame.end().unwrap();

    let expected = PushConstants {
        model: settings.transform,
        vertices: vertices.slot(),
        material: material.slot(),
        instances: u32::MAX,
        buff1: u32::MAX,
        buff2: u32::MAX,
        buff3: u32::MAX,
        _pad: [0; 2],
    };
    assert_eq!(pushed, vec![bytemuck::bytes_of(&expected).to_vec()]);

    let commands = last_submission(&state);
    assert!(commands.contains(&"draw_indexed 6 4 0 0".to_string()));
    assert!(commands.contains(&"clear 8,8 16x16".to_string()));
}

#[test]
fn test_draw_viewport_override() {
    let (device, state) = create_device();
    let mut target = create_target(&device, 1);
    let mut renderer = create_renderer(&device, 2);
    let pipeline = create_pipeline(&device);
    let index_buffer = device.create_index_buffer32(&[0, 1, 2]).unwrap();

    let settings = DrawSettings {
        viewport: Some(Rect2D { x: 0, y: 16, width: 32, height: 16 }),
        ..DrawSettings::new(&pipeline, &index_buffer, 3)
    };
    let mut frame = renderer.begin_frame(&mut target, &RenderFrameSettings::default()).unwrap();
    frame.draw(&settings);
    frame.end().unwrap();

    let commands = last_submission(&state);
    assert!(commands.contains(&"set_viewport 0,16 32x16".to_string()));
    assert!(commands.contains(&"set_scissor 0,16 32x16".to_string()));
}

#[test]
fn test_end_leaves_final_image_ready_for_transfer() {
    let (device, _) = create_device();
    let mut target = create_target(&device, 1);
    let mut renderer = create_renderer(&device, 2);

    renderer
        .begin_frame(&mut target, &RenderFrameSettings::default())
        .unwrap()
        .end()
        .unwrap();

    assert_eq!(target.final_image().current_layout(), ImageLayout::TransferSrc);
    assert_eq!(
        target.depth_image().unwrap().current_layout(),
        ImageLayout::DepthAttachment
    );
}

#[test]
fn test_multisampled_frame_is_resolved() {
    let (device, state) = create_device();
    let mut target = create_target(&device, 4);
    let mut renderer = create_renderer(&device, 2);

    renderer
        .begin_frame(&mut target, &RenderFrameSettings::default())
        .unwrap()
        .end()
        .unwrap();

    let commands = last_submission(&state);
    let end_rendering = commands.iter().position(|c| c == "end_rendering").unwrap();
    let resolve = commands.iter().position(|c| c.starts_with("resolve_image")).unwrap();
    assert!(resolve > end_rendering);
    assert_eq!(target.draw_image().current_layout(), ImageLayout::TransferSrc);
    assert_eq!(
        target.resolve_image().unwrap().current_layout(),
        ImageLayout::TransferSrc
    );
}

#[test]
fn test_frame_command_records_inside_scope() {
    let (device, state) = create_device();
    let mut target = create_target(&device, 1);
    let mut renderer = create_renderer(&device, 2);

    let mut frame = renderer.begin_frame(&mut target, &RenderFrameSettings::default()).unwrap();
    assert!(frame.command().is_rendering());
    frame.command().set_scissor(Rect2D { x: 1, y: 2, width: 3, height: 4 });
    frame.end().unwrap();

    assert!(last_submission(&state).contains(&"set_scissor 1,2 3x4".to_string()));
}
