/// Device configuration

use std::path::PathBuf;

use crate::device::types::{Filter, SamplerAddressMode, REQUIRED_FEATURES};

/// Configuration for device creation
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Application name reported to the driver
    pub app_name: String,

    /// Folder that relative shader paths are resolved against
    pub shaders_folder: PathBuf,

    /// Enable validation layers (when the backend was built with them)
    pub enable_validation: bool,

    /// Features that must be enabled, device creation fails otherwise
    pub required_features: Vec<String>,

    /// Features enabled when available
    pub optional_features: Vec<String>,

    /// Extra device extensions
    pub extensions: Vec<String>,

    /// Extra instance extensions
    pub instance_extensions: Vec<String>,

    /// Sampler bound next to every image of the global descriptor set
    pub sampler: SamplerConfig,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            app_name: "Ignis App".to_string(),
            shaders_folder: PathBuf::from("shaders"),
            enable_validation: cfg!(debug_assertions),
            required_features: REQUIRED_FEATURES.iter().map(|f| f.to_string()).collect(),
            optional_features: Vec::new(),
            extensions: Vec::new(),
            instance_extensions: Vec::new(),
            sampler: SamplerConfig::default(),
        }
    }
}

/// Global sampler settings
///
/// Defaults to trilinear filtering with repeat addressing over the whole mip chain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerConfig {
    pub mag_filter: Filter,
    pub min_filter: Filter,
    pub mipmap_filter: Filter,
    pub address_mode_u: SamplerAddressMode,
    pub address_mode_v: SamplerAddressMode,
    pub address_mode_w: SamplerAddressMode,

    /// Requested anisotropy level, used only when the `SamplerAnisotropy`
    /// feature is enabled; clamped to the device limit
    pub max_anisotropy: Option<f32>,

    pub min_lod: f32,
    /// `None` keeps every mip level
    pub max_lod: Option<f32>,
}

impl SamplerConfig {
    /// Same filter and address mode on every axis
    pub fn uniform(filter: Filter, address_mode: SamplerAddressMode) -> Self {
        Self {
            mag_filter: filter,
            min_filter: filter,
            mipmap_filter: filter,
            address_mode_u: address_mode,
            address_mode_v: address_mode,
            address_mode_w: address_mode,
            max_anisotropy: None,
            min_lod: 0.0,
            max_lod: None,
        }
    }

    /// Anisotropy level to program, if any: at least 1, at most `device_limit`
    pub fn effective_anisotropy(&self, feature_enabled: bool, device_limit: f32) -> Option<f32> {
        match self.max_anisotropy {
            Some(requested) if feature_enabled && requested > 1.0 => Some(requested.min(device_limit.max(1.0))),
            _ => None,
        }
    }

    /// Mip range to program; a `max_lod` below `min_lod` collapses onto `min_lod`
    pub fn lod_range(&self) -> (f32, Option<f32>) {
        let min_lod = self.min_lod.max(0.0);
        (min_lod, self.max_lod.map(|max_lod| max_lod.max(min_lod)))
    }
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self::uniform(Filter::Linear, SamplerAddressMode::Repeat)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
