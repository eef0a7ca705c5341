//! Unit tests for types.rs
//!
//! Tests format helpers, sample count clamping and handle sentinels.

use crate::device::types::*;

// ============================================================================
// FORMAT TESTS
// ============================================================================

#[test]
fn test_pixel_sizes() {
    assert_eq!(Format::R8G8B8A8_UNORM.pixel_size(), 4);
    assert_eq!(Format::B8G8R8A8_SRGB.pixel_size(), 4);
    assert_eq!(Format::R16G16B16A16_SFLOAT.pixel_size(), 8);
    assert_eq!(Format::R32G32B32A32_SFLOAT.pixel_size(), 16);
    assert_eq!(Format::D16_UNORM.pixel_size(), 2);
    assert_eq!(Format::D32_SFLOAT.pixel_size(), 4);
    assert_eq!(Format::Undefined.pixel_size(), 0);
}

#[test]
fn test_format_aspects() {
    assert_eq!(Format::R8G8B8A8_UNORM.aspect(), ImageAspect::COLOR);
    assert_eq!(Format::D32_SFLOAT.aspect(), ImageAspect::DEPTH);
    assert_eq!(
        Format::D24_UNORM_S8_UINT.aspect(),
        ImageAspect::DEPTH | ImageAspect::STENCIL
    );
}

#[test]
fn test_engine_formats() {
    assert_eq!(COLOR_FORMAT.format(), Format::R16G16B16A16_SFLOAT);
    assert_eq!(DEPTH_FORMAT.format(), Format::D32_SFLOAT);
    assert_eq!(ColorFormat::Hdr.format(), Format::R32G32B32A32_SFLOAT);
    assert_eq!(DepthFormat::D24UnormS8Uint.format(), Format::D24_UNORM_S8_UINT);
}

// ============================================================================
// SAMPLE COUNT TESTS
// ============================================================================

fn all_counts() -> SampleCounts {
    SampleCounts::X1 | SampleCounts::X2 | SampleCounts::X4 | SampleCounts::X8 | SampleCounts::X16
}

#[test]
fn test_clamp_rounds_down_to_supported() {
    let supported = SampleCounts::X1 | SampleCounts::X4;
    assert_eq!(clamp_sample_count(1, supported), SampleCount::X1);
    assert_eq!(clamp_sample_count(2, supported), SampleCount::X1);
    assert_eq!(clamp_sample_count(3, supported), SampleCount::X1);
    assert_eq!(clamp_sample_count(4, supported), SampleCount::X4);
    assert_eq!(clamp_sample_count(7, supported), SampleCount::X4);
    assert_eq!(clamp_sample_count(64, supported), SampleCount::X4);
}

#[test]
fn test_clamp_never_exceeds_max() {
    assert_eq!(clamp_sample_count(16, all_counts()), SampleCount::X8);
    assert_eq!(clamp_sample_count(u32::MAX, all_counts()), SampleCount::X8);
}

#[test]
fn test_clamp_zero_is_single_sample() {
    assert_eq!(clamp_sample_count(0, all_counts()), SampleCount::X1);
}

#[test]
fn test_clamp_properties_hold_for_all_inputs() {
    let device_sets = [
        SampleCounts::X1,
        SampleCounts::X1 | SampleCounts::X2,
        SampleCounts::X1 | SampleCounts::X2 | SampleCounts::X4,
        SampleCounts::X1 | SampleCounts::X8,
        all_counts(),
    ];

    for supported in device_sets {
        let device_max = max_sample_count(supported);
        for n in 0..=70u32 {
            let clamped = clamp_sample_count(n, supported);
            // Idempotent
            assert_eq!(clamp_sample_count(clamped.as_u32(), supported), clamped);
            // Bounded by the request and the engine maximum
            assert!(clamped.as_u32() <= n.max(1).min(MAX_SAMPLE_COUNT));
            // Bounded by the device
            assert!(clamped <= device_max);
            assert!(supported.contains(clamped.flag()));
        }
    }
}

#[test]
fn test_sample_count_conversions() {
    assert_eq!(SampleCount::from_u32(4), Some(SampleCount::X4));
    assert_eq!(SampleCount::from_u32(3), None);
    assert_eq!(SampleCount::X8.as_u32(), 8);
    assert_eq!(SampleCount::X2.flag(), SampleCounts::X2);
    assert!(!SampleCount::X1.is_multisampled());
    assert!(SampleCount::X4.is_multisampled());
}

// ============================================================================
// HANDLE AND GEOMETRY TESTS
// ============================================================================

#[test]
fn test_handle_sentinels() {
    assert!(!BufferId::INVALID.is_valid());
    assert!(!ImageId::default().is_valid());
    assert_eq!(BufferId::default(), BufferId::INVALID);
}

#[test]
fn test_rect_and_viewport() {
    let rect = Rect2D { x: 10, y: 20, width: 300, height: 200 };
    assert_eq!(rect.offset(), Offset2D::new(10, 20));
    assert_eq!(rect.extent(), Extent2D::new(300, 200));

    let viewport = Viewport::from_rect(rect);
    assert_eq!(viewport.x, 10.0);
    assert_eq!(viewport.height, 200.0);
    assert_eq!(viewport.max_depth, 1.0);

    assert_eq!(Rect2D::from_extent(Extent2D::new(8, 4)).extent().area(), 32);
}

#[test]
fn test_required_features() {
    assert_eq!(REQUIRED_FEATURES.len(), 8);
    assert!(REQUIRED_FEATURES.contains(&"BufferDeviceAddress"));
    assert!(REQUIRED_FEATURES.contains(&"Synchronization2"));
}
