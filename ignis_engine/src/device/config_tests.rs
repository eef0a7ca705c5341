//! Unit tests for config.rs
//!
//! Tests device configuration defaults and sampler settings.

use crate::device::config::*;
use crate::device::types::{Filter, SamplerAddressMode};

#[test]
fn test_default_sampler_is_linear_repeat() {
    let config = DeviceConfig::default();
    assert_eq!(config.sampler, SamplerConfig::uniform(Filter::Linear, SamplerAddressMode::Repeat));
    assert_eq!(config.sampler.mipmap_filter, Filter::Linear);
    assert_eq!(config.sampler.max_anisotropy, None);
    assert_eq!(config.sampler.lod_range(), (0.0, None));
}

#[test]
fn test_uniform_sampler_sets_every_axis() {
    let sampler = SamplerConfig::uniform(Filter::Nearest, SamplerAddressMode::ClampToEdge);
    assert_eq!(sampler.mag_filter, Filter::Nearest);
    assert_eq!(sampler.min_filter, Filter::Nearest);
    assert_eq!(sampler.address_mode_u, SamplerAddressMode::ClampToEdge);
    assert_eq!(sampler.address_mode_v, SamplerAddressMode::ClampToEdge);
    assert_eq!(sampler.address_mode_w, SamplerAddressMode::ClampToEdge);
}

#[test]
fn test_anisotropy_needs_the_feature_and_is_clamped() {
    let sampler = SamplerConfig { max_anisotropy: Some(16.0), ..Default::default() };
    assert_eq!(sampler.effective_anisotropy(false, 16.0), None);
    assert_eq!(sampler.effective_anisotropy(true, 8.0), Some(8.0));
    assert_eq!(sampler.effective_anisotropy(true, 16.0), Some(16.0));

    let off = SamplerConfig { max_anisotropy: Some(1.0), ..Default::default() };
    assert_eq!(off.effective_anisotropy(true, 16.0), None);
}

#[test]
fn test_lod_range_never_inverts() {
    let sampler = SamplerConfig { min_lod: 2.0, max_lod: Some(1.0), ..Default::default() };
    assert_eq!(sampler.lod_range(), (2.0, Some(2.0)));

    let negative = SamplerConfig { min_lod: -1.0, max_lod: Some(4.0), ..Default::default() };
    assert_eq!(negative.lod_range(), (0.0, Some(4.0)));
}
