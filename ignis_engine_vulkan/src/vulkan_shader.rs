/// VulkanShader - shader module with its reflected push constant block

use std::any::Any;
use std::sync::Arc;

use ash::vk;
use ignis_engine::ignis::device::{BackendShader, ShaderDesc};
use ignis_engine::ignis::Result;
use ignis_engine::{ignis_bail, ignis_err, ignis_warn};

use crate::vulkan_context::VulkanContext;
use crate::vulkan_format::shader_stage_to_vk;

/// Entry point every engine shader exports
pub(crate) const SHADER_ENTRY_POINT: &std::ffi::CStr = c"main";

pub struct VulkanShader {
    context: Arc<VulkanContext>,
    pub(crate) module: vk::ShaderModule,
    pub(crate) stage: vk::ShaderStageFlags,
    push_constant_size: Option<u32>,
}

impl VulkanShader {
    pub(crate) fn new(context: Arc<VulkanContext>, desc: &ShaderDesc<'_>) -> Result<Self> {
        if desc.code.is_empty() || desc.code.len() % 4 != 0 {
            ignis_bail!(
                "ignis::vulkan",
                "Shader code not 4-byte aligned (size: {} bytes)",
                desc.code.len()
            );
        }

        // Copy into u32 words: the byte slice carries no alignment guarantee
        let words: Vec<u32> = desc
            .code
            .chunks_exact(4)
            .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();

        let push_constant_size = reflect_push_constant_size(&words);

        let create_info = vk::ShaderModuleCreateInfo::default().code(&words);
        let module = unsafe { context.device.create_shader_module(&create_info, None) }
            .map_err(|e| ignis_err!("ignis::vulkan", "Failed to create shader module: {:?}", e))?;

        Ok(Self {
            context,
            module,
            stage: shader_stage_to_vk(desc.stage),
            push_constant_size,
        })
    }
}

/// Largest push constant block declared by any entry point.
///
/// Reflection failures are not fatal: the pipeline then relies on the
/// engine-side push constant size.
fn reflect_push_constant_size(words: &[u32]) -> Option<u32> {
    let entry_points = match spirq::ReflectConfig::new().spv(words).ref_all_rscs(true).reflect() {
        Ok(entry_points) => entry_points,
        Err(e) => {
            ignis_warn!("ignis::vulkan", "SPIR-V reflection failed: {:?}", e);
            return None;
        }
    };

    entry_points
        .iter()
        .flat_map(|entry_point| entry_point.vars.iter())
        .filter_map(|var| match var {
            spirq::var::Variable::PushConstant { ty, .. } => ty.nbyte().map(|size| size as u32),
            _ => None,
        })
        .max()
}

impl BackendShader for VulkanShader {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn reflected_push_constant_size(&self) -> Option<u32> {
        self.push_constant_size
    }
}

impl Drop for VulkanShader {
    fn drop(&mut self) {
        unsafe { self.context.device.destroy_shader_module(self.module, None) };
    }
}
