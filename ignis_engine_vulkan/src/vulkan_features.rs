/// Named device features
///
/// Features are requested by name in `DeviceConfig`. Each name maps to one
/// `VkBool32` of the core, Vulkan 1.2 or Vulkan 1.3 feature structs.

use ash::vk;
use ignis_engine::ignis::{Error, Result};
use ignis_engine::{ignis_debug, ignis_error, ignis_warn};
use rustc_hash::FxHashSet;

/// Feature structs of one physical device (no `p_next` chain attached)
#[derive(Clone, Copy, Default)]
pub(crate) struct DeviceFeatures {
    pub(crate) core: vk::PhysicalDeviceFeatures,
    pub(crate) v12: vk::PhysicalDeviceVulkan12Features<'static>,
    pub(crate) v13: vk::PhysicalDeviceVulkan13Features<'static>,
}

// Only null `p_next` pointers are ever stored
unsafe impl Send for DeviceFeatures {}
unsafe impl Sync for DeviceFeatures {}

impl DeviceFeatures {
    /// Query what `physical_device` supports
    pub(crate) fn query(instance: &ash::Instance, physical_device: vk::PhysicalDevice) -> Self {
        let mut v12 = vk::PhysicalDeviceVulkan12Features::default();
        let mut v13 = vk::PhysicalDeviceVulkan13Features::default();
        let core = {
            let mut features2 = vk::PhysicalDeviceFeatures2::default()
                .push_next(&mut v12)
                .push_next(&mut v13);
            unsafe { instance.get_physical_device_features2(physical_device, &mut features2) };
            features2.features
        };
        v12.p_next = std::ptr::null_mut();
        v13.p_next = std::ptr::null_mut();
        Self { core, v12, v13 }
    }

    /// Flag of a named feature, `None` for unknown names
    pub(crate) fn flag_mut(&mut self, name: &str) -> Option<&mut vk::Bool32> {
        let flag = match name {
            // Vulkan 1.0
            "SampleRateShading" => &mut self.core.sample_rate_shading,
            "FillModeNonSolid" => &mut self.core.fill_mode_non_solid,
            "WideLines" => &mut self.core.wide_lines,
            "SamplerAnisotropy" => &mut self.core.sampler_anisotropy,
            "ShaderInt64" => &mut self.core.shader_int64,
            // Vulkan 1.2
            "BufferDeviceAddress" => &mut self.v12.buffer_device_address,
            "DescriptorIndexing" => &mut self.v12.descriptor_indexing,
            "DescriptorBindingUniformBufferUpdateAfterBind" => {
                &mut self.v12.descriptor_binding_uniform_buffer_update_after_bind
            }
            "DescriptorBindingSampledImageUpdateAfterBind" => {
                &mut self.v12.descriptor_binding_sampled_image_update_after_bind
            }
            "DescriptorBindingStorageBufferUpdateAfterBind" => {
                &mut self.v12.descriptor_binding_storage_buffer_update_after_bind
            }
            "DescriptorBindingPartiallyBound" => &mut self.v12.descriptor_binding_partially_bound,
            "RuntimeDescriptorArray" => &mut self.v12.runtime_descriptor_array,
            "ScalarBlockLayout" => &mut self.v12.scalar_block_layout,
            "TimelineSemaphore" => &mut self.v12.timeline_semaphore,
            // Vulkan 1.3
            "DynamicRendering" => &mut self.v13.dynamic_rendering,
            "Synchronization2" => &mut self.v13.synchronization2,
            "Maintenance4" => &mut self.v13.maintenance4,
            _ => return None,
        };
        Some(flag)
    }

    pub(crate) fn is_supported(&self, name: &str) -> bool {
        let mut copy = *self;
        copy.flag_mut(name).is_some_and(|flag| *flag == vk::TRUE)
    }
}

/// Features to enable at device creation and their names
pub(crate) struct FeatureSelection {
    pub(crate) enabled: DeviceFeatures,
    pub(crate) names: FxHashSet<String>,
}

/// Enable every required feature (failing on the first unsupported one)
/// and every supported optional feature.
pub(crate) fn select_features(
    supported: &DeviceFeatures,
    required: &[String],
    optional: &[String],
) -> Result<FeatureSelection> {
    let mut selection = FeatureSelection {
        enabled: DeviceFeatures::default(),
        names: FxHashSet::default(),
    };

    for name in required {
        if !supported.is_supported(name) {
            ignis_error!("ignis::vulkan", "Required device feature {} is not available", name);
            return Err(Error::MissingFeature(name.clone()));
        }
        enable(&mut selection, name);
    }

    for name in optional {
        if supported.is_supported(name) {
            enable(&mut selection, name);
        } else {
            ignis_warn!("ignis::vulkan", "Optional device feature {} is not available", name);
        }
    }

    Ok(selection)
}

fn enable(selection: &mut FeatureSelection, name: &str) {
    if let Some(flag) = selection.enabled.flag_mut(name) {
        *flag = vk::TRUE;
        if selection.names.insert(name.to_string()) {
            ignis_debug!("ignis::vulkan", "Enabled device feature {}", name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn supporting(list: &[&str]) -> DeviceFeatures {
        let mut features = DeviceFeatures::default();
        for name in list {
            *features.flag_mut(name).unwrap() = vk::TRUE;
        }
        features
    }

    #[test]
    fn test_engine_required_features_are_known() {
        let mut features = DeviceFeatures::default();
        for name in ignis_engine::ignis::device::REQUIRED_FEATURES {
            assert!(features.flag_mut(name).is_some(), "{} has no Vulkan flag", name);
        }
    }

    #[test]
    fn test_unknown_feature_is_unsupported() {
        let features = supporting(&["DynamicRendering"]);
        assert!(features.is_supported("DynamicRendering"));
        assert!(!features.is_supported("TeleportRays"));
    }

    #[test]
    fn test_required_features_are_enabled() {
        let supported = supporting(&["DynamicRendering", "Synchronization2", "WideLines"]);
        let selection = select_features(
            &supported,
            &names(&["DynamicRendering", "Synchronization2"]),
            &[],
        )
        .unwrap();

        assert_eq!(selection.enabled.v13.dynamic_rendering, vk::TRUE);
        assert_eq!(selection.enabled.v13.synchronization2, vk::TRUE);
        // Supported but not requested
        assert_eq!(selection.enabled.core.wide_lines, vk::FALSE);
        assert_eq!(selection.names.len(), 2);
    }

    #[test]
    fn test_missing_required_feature_fails() {
        let supported = supporting(&["DynamicRendering"]);
        let result = select_features(&supported, &names(&["DynamicRendering", "BufferDeviceAddress"]), &[]);
        assert!(matches!(result, Err(Error::MissingFeature(name)) if name == "BufferDeviceAddress"));
    }

    #[test]
    fn test_missing_optional_feature_is_skipped() {
        let supported = supporting(&["FillModeNonSolid"]);
        let selection =
            select_features(&supported, &[], &names(&["FillModeNonSolid", "WideLines"])).unwrap();

        assert!(selection.names.contains("FillModeNonSolid"));
        assert!(!selection.names.contains("WideLines"));
        assert_eq!(selection.enabled.core.fill_mode_non_solid, vk::TRUE);
    }
}
