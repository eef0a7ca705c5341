use super::*;
use crate::device::mock_backend::MockBackend;
use crate::device::{DeviceConfig, Format, ImageAspect, SampleCounts};

fn create_device(sample_counts: SampleCounts) -> Device {
    let backend = MockBackend::new().with_sample_counts(sample_counts);
    Device::new(Box::new(backend), DeviceConfig::default()).unwrap()
}

#[test]
fn test_single_sampled_target() {
    let device = create_device(SampleCounts::X1 | SampleCounts::X4);
    let target = RenderTarget::new(&device, &RenderTargetCreateInfo {
        extent: Extent2D::new(320, 240),
        ..Default::default()
    })
    .unwrap();

    assert!(!target.is_multisampled());
    assert!(target.resolve_image().is_none());
    assert_eq!(target.draw_image().format(), Format::R16G16B16A16_SFLOAT);
    assert_eq!(target.depth_image().unwrap().format(), Format::D32_SFLOAT);
    assert_eq!(target.depth_image().unwrap().aspect(), ImageAspect::DEPTH);
    // Final image is the draw image itself
    assert!(std::ptr::eq(target.final_image(), target.draw_image()));
}

#[test]
fn test_multisampled_target_has_resolve_image() {
    let device = create_device(SampleCounts::X1 | SampleCounts::X4);
    let target = RenderTarget::new(&device, &RenderTargetCreateInfo {
        extent: Extent2D::new(320, 240),
        samples: 4,
        ..Default::default()
    })
    .unwrap();

    assert!(target.is_multisampled());
    assert_eq!(target.draw_image().sample_count(), SampleCount::X4);
    assert_eq!(target.depth_image().unwrap().sample_count(), SampleCount::X4);

    let resolve = target.resolve_image().unwrap();
    assert_eq!(resolve.sample_count(), SampleCount::X1);
    assert_eq!(resolve.extent(), Extent2D::new(320, 240));
    assert!(std::ptr::eq(target.final_image(), resolve));
}

#[test]
fn test_unsupported_sample_count_is_clamped() {
    let device = create_device(SampleCounts::X1 | SampleCounts::X2);
    let target = RenderTarget::new(&device, &RenderTargetCreateInfo {
        extent: Extent2D::new(16, 16),
        samples: 8,
        ..Default::default()
    })
    .unwrap();
    assert_eq!(target.sample_count(), SampleCount::X2);
}

#[test]
fn test_target_without_depth() {
    let device = create_device(SampleCounts::X1);
    let target = RenderTarget::new(&device, &RenderTargetCreateInfo {
        extent: Extent2D::new(16, 16),
        with_depth: false,
        color_format: ColorFormat::Rgba8,
        ..Default::default()
    })
    .unwrap();

    assert!(target.depth_image().is_none());
    assert_eq!(target.draw_image().format(), Format::R8G8B8A8_UNORM);
}
