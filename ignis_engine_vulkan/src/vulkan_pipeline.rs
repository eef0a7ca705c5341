/// VulkanPipeline - graphics pipeline for dynamic rendering
///
/// No vertex input: geometry is fetched from storage buffers through device
/// addresses or the global descriptor set. Viewport and scissor are dynamic.

use std::any::Any;
use std::sync::Arc;

use ash::vk;
use ignis_engine::ignis::device::{BackendPipeline, PipelineCreateInfo};
use ignis_engine::ignis::{Error, Result};
use ignis_engine::{ignis_debug, ignis_err};

use crate::vulkan_context::VulkanContext;
use crate::vulkan_format::{
    blend_factor_to_vk, blend_op_to_vk, compare_op_to_vk, cull_mode_to_vk, format_to_vk,
    front_face_to_vk, polygon_mode_to_vk, sample_count_to_vk,
};
use crate::vulkan_shader::{VulkanShader, SHADER_ENTRY_POINT};

pub struct VulkanPipeline {
    context: Arc<VulkanContext>,
    pub(crate) pipeline: vk::Pipeline,
    /// Shared layout owned by the context cache
    pub(crate) layout: vk::PipelineLayout,
}

impl VulkanPipeline {
    pub(crate) fn new(
        context: Arc<VulkanContext>,
        info: &PipelineCreateInfo<'_>,
        push_constant_size: u32,
    ) -> Result<Self> {
        let layout = context.pipeline_layout(push_constant_size)?;

        let mut stages = Vec::with_capacity(info.shaders.len());
        for shader in &info.shaders {
            let vk_shader = shader
                .backend()
                .as_any()
                .downcast_ref::<VulkanShader>()
                .ok_or_else(|| Error::InvalidResource("shader is not a Vulkan shader".to_string()))?;
            stages.push(
                vk::PipelineShaderStageCreateInfo::default()
                    .stage(vk_shader.stage)
                    .module(vk_shader.module)
                    .name(SHADER_ENTRY_POINT),
            );
        }

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default();
        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        // Counts only; the values come from vkCmdSetViewport / vkCmdSetScissor
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let rasterizer = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(polygon_mode_to_vk(info.polygon_mode))
            .line_width(info.line_width)
            .cull_mode(cull_mode_to_vk(info.cull_mode))
            .front_face(front_face_to_vk(info.front_face))
            .depth_bias_enable(false);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(sample_count_to_vk(info.sample_count))
            .sample_shading_enable(info.sample_shading)
            .min_sample_shading(info.min_sample_shading);

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(info.depth_test)
            .depth_write_enable(info.depth_write)
            .depth_compare_op(compare_op_to_vk(info.depth_compare_op))
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false)
            .min_depth_bounds(0.0)
            .max_depth_bounds(1.0);

        let blend = &info.blend;
        let color_blend_attachments = [vk::PipelineColorBlendAttachmentState::default()
            .blend_enable(blend.enable)
            .src_color_blend_factor(blend_factor_to_vk(blend.src_color_factor))
            .dst_color_blend_factor(blend_factor_to_vk(blend.dst_color_factor))
            .color_blend_op(blend_op_to_vk(blend.color_op))
            .src_alpha_blend_factor(blend_factor_to_vk(blend.src_alpha_factor))
            .dst_alpha_blend_factor(blend_factor_to_vk(blend.dst_alpha_factor))
            .alpha_blend_op(blend_op_to_vk(blend.alpha_op))
            .color_write_mask(vk::ColorComponentFlags::RGBA)];
        let attachment_count = usize::from(info.render_color);
        let color_blending = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(&color_blend_attachments[..attachment_count]);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let color_formats = [format_to_vk(info.color_format.format())];
        let mut rendering_info = vk::PipelineRenderingCreateInfo::default()
            .color_attachment_formats(&color_formats[..attachment_count])
            .depth_attachment_format(format_to_vk(info.depth_format.format()));

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .push_next(&mut rendering_info);

        let pipeline = unsafe {
            context
                .device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
        }
        .map_err(|(_, e)| ignis_err!("ignis::vulkan", "Failed to create graphics pipeline: {:?}", e))?
        .into_iter()
        .next()
        .ok_or_else(|| ignis_err!("ignis::vulkan", "vkCreateGraphicsPipelines returned no pipeline"))?;

        ignis_debug!(
            "ignis::vulkan",
            "Created pipeline ({} stages, {} push constant bytes, {:?})",
            stages.len(),
            push_constant_size,
            info.sample_count
        );

        Ok(Self { context, pipeline, layout })
    }
}

impl BackendPipeline for VulkanPipeline {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for VulkanPipeline {
    fn drop(&mut self) {
        unsafe { self.context.device.destroy_pipeline(self.pipeline, None) };
    }
}
