use super::*;
use std::sync::Arc;
use crate::device::mock_backend::{MockBackend, MockImage};
use crate::device::types::{Format, SampleCounts};

fn mock_context() -> Arc<GpuContext> {
    GpuContext::new(Box::new(MockBackend::new()))
}

#[test]
fn test_draw_image_defaults() {
    let context = mock_context();
    let image = Image::allocate_draw_image(
        &context,
        &DrawImageCreateInfo {
            extent: Extent2D::new(640, 480),
            ..Default::default()
        },
    )
    .unwrap();

    assert!(!image.is_wrapped());
    assert_eq!(image.format(), Format::R16G16B16A16_SFLOAT);
    assert_eq!(image.aspect(), ImageAspect::COLOR);
    assert_eq!(image.optimal_layout(), ImageLayout::ColorAttachment);
    assert_eq!(image.current_layout(), ImageLayout::Undefined);
    assert!(image.usage().contains(ImageUsage::COLOR_ATTACHMENT | ImageUsage::TRANSFER_SRC));
    assert_eq!(image.sample_count(), SampleCount::X1);
}

#[test]
fn test_depth_image_aspect_follows_format() {
    let context = mock_context();

    let depth = Image::allocate_depth_image(&context, &DepthImageCreateInfo {
        extent: Extent2D::new(64, 64),
        ..Default::default()
    })
    .unwrap();
    assert_eq!(depth.format(), Format::D32_SFLOAT);
    assert_eq!(depth.aspect(), ImageAspect::DEPTH);
    assert_eq!(depth.optimal_layout(), ImageLayout::DepthAttachment);

    let stencil = Image::allocate_depth_image(&context, &DepthImageCreateInfo {
        extent: Extent2D::new(64, 64),
        format: DepthFormat::D24UnormS8Uint,
        samples: 1,
    })
    .unwrap();
    assert_eq!(stencil.aspect(), ImageAspect::DEPTH | ImageAspect::STENCIL);
}

#[test]
fn test_sample_count_is_clamped() {
    let backend = MockBackend::new().with_sample_counts(SampleCounts::X1 | SampleCounts::X4);
    let context = GpuContext::new(Box::new(backend));

    let image = Image::allocate_draw_image(&context, &DrawImageCreateInfo {
        extent: Extent2D::new(32, 32),
        samples: 8,
        ..Default::default()
    })
    .unwrap();
    assert_eq!(image.sample_count(), SampleCount::X4);

    let image = Image::allocate_draw_image(&context, &DrawImageCreateInfo {
        extent: Extent2D::new(32, 32),
        samples: 2,
        ..Default::default()
    })
    .unwrap();
    assert_eq!(image.sample_count(), SampleCount::X1);
}

#[test]
fn test_pixel_size_and_size() {
    let context = mock_context();
    let image = Image::allocate_draw_image(&context, &DrawImageCreateInfo {
        extent: Extent2D::new(4, 2),
        format: ColorFormat::Rgba8,
        samples: 1,
    })
    .unwrap();

    assert_eq!(image.pixel_size(), 4);
    assert_eq!(image.size(), 32);
}

#[test]
fn test_wrapped_image() {
    let info = ImageCreateInfo {
        usage: ImageUsage::TRANSFER_DST,
        extent: Extent2D::new(800, 600),
        format: Format::B8G8R8A8_UNORM,
        optimal_layout: ImageLayout::PresentSrc,
        ..Default::default()
    };
    let image = Image::wrap(Box::new(MockImage { id: 42 }), info);

    assert!(image.is_wrapped());
    assert!(matches!(image.memory(), ImageMemory::Wrapped(_)));
    assert_eq!(image.info(), &info);
    assert_eq!(image.current_layout(), ImageLayout::Undefined);
}

#[test]
fn test_allocation_failure() {
    let backend = MockBackend::new();
    let state = backend.state();
    let context = GpuContext::new(Box::new(backend));
    state.set_fail_allocations(true);

    let result = Image::allocate_draw_image(&context, &DrawImageCreateInfo {
        extent: Extent2D::new(32, 32),
        ..Default::default()
    });
    assert!(matches!(result, Err(crate::error::Error::OutOfMemory)));
}
