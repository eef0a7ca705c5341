/// VulkanCommandPool / VulkanCommandBuffer - command recording
///
/// Barriers, copies, blits and resolves use the synchronization2 / copy2
/// entry points; rendering scopes use dynamic rendering.

use std::any::Any;
use std::sync::{Arc, Mutex};

use ash::vk;
use ignis_engine::ignis::device::{
    BackendBuffer, BackendCommandBuffer, BackendCommandPool, BackendImage, BackendPipeline,
    Extent2D, ImageAspect, ImageLayout, ImageRegion, Offset2D, Rect2D, RenderingInfo, Viewport,
};
use ignis_engine::ignis::Result;
use ignis_engine::ignis_err;

use crate::vulkan_buffer::VulkanBuffer;
use crate::vulkan_context::{native, VulkanContext};
use crate::vulkan_format::{
    aspect_to_vk, image_layout_to_vk, layout_scope, load_op_to_vk, store_op_to_vk,
};
use crate::vulkan_image::VulkanImage;
use crate::vulkan_pipeline::VulkanPipeline;

/// Pool handle shared by the pool and every buffer allocated from it
struct PoolHandle {
    context: Arc<VulkanContext>,
    /// Allocation and freeing need the pool externally synchronized
    pool: Mutex<vk::CommandPool>,
}

impl Drop for PoolHandle {
    fn drop(&mut self) {
        if let Ok(pool) = self.pool.get_mut() {
            unsafe { self.context.device.destroy_command_pool(*pool, None) };
        }
    }
}

/// Command pool of one graphics queue
pub struct VulkanCommandPool {
    handle: Arc<PoolHandle>,
}

impl VulkanCommandPool {
    pub(crate) fn new(context: Arc<VulkanContext>) -> Result<Self> {
        let info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(context.queue_family)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        let pool = unsafe { context.device.create_command_pool(&info, None) }
            .map_err(|e| ignis_err!("ignis::vulkan", "Failed to create command pool: {:?}", e))?;
        Ok(Self {
            handle: Arc::new(PoolHandle {
                context,
                pool: Mutex::new(pool),
            }),
        })
    }
}

impl BackendCommandPool for VulkanCommandPool {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn allocate(&self) -> Result<Box<dyn BackendCommandBuffer>> {
        let pool = self
            .handle
            .pool
            .lock()
            .map_err(|_| ignis_err!("ignis::vulkan", "command pool mutex poisoned"))?;
        let info = vk::CommandBufferAllocateInfo::default()
            .command_pool(*pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let buffers = unsafe { self.handle.context.device.allocate_command_buffers(&info) }
            .map_err(|e| ignis_err!("ignis::vulkan", "Failed to allocate command buffer: {:?}", e))?;
        let command_buffer = buffers
            .into_iter()
            .next()
            .ok_or_else(|| ignis_err!("ignis::vulkan", "vkAllocateCommandBuffers returned nothing"))?;

        Ok(Box::new(VulkanCommandBuffer {
            pool: Arc::clone(&self.handle),
            command_buffer,
            bound_layout: None,
        }))
    }
}

/// Primary command buffer
pub struct VulkanCommandBuffer {
    pool: Arc<PoolHandle>,
    pub(crate) command_buffer: vk::CommandBuffer,
    /// Layout of the bound pipeline (for push constants)
    bound_layout: Option<vk::PipelineLayout>,
}

fn offset_3d(offset: Offset2D) -> vk::Offset3D {
    vk::Offset3D { x: offset.x, y: offset.y, z: 0 }
}

fn extent_3d(extent: Extent2D) -> vk::Extent3D {
    vk::Extent3D { width: extent.width, height: extent.height, depth: 1 }
}

fn far_corner(offset: Offset2D, extent: Extent2D) -> vk::Offset3D {
    vk::Offset3D {
        x: offset.x + extent.width as i32,
        y: offset.y + extent.height as i32,
        z: 1,
    }
}

fn subresource_layers(aspect: ImageAspect) -> vk::ImageSubresourceLayers {
    vk::ImageSubresourceLayers {
        aspect_mask: aspect_to_vk(aspect),
        mip_level: 0,
        base_array_layer: 0,
        layer_count: 1,
    }
}

fn rect_to_vk(rect: Rect2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: rect.x, y: rect.y },
        extent: vk::Extent2D { width: rect.width, height: rect.height },
    }
}

fn vk_image(image: &dyn BackendImage) -> &VulkanImage {
    native::<VulkanImage>(image.as_any(), "image")
}

fn vk_buffer(buffer: &dyn BackendBuffer) -> &VulkanBuffer {
    native::<VulkanBuffer>(buffer.as_any(), "buffer")
}

impl VulkanCommandBuffer {
    fn device(&self) -> &ash::Device {
        &self.pool.context.device
    }
}

impl BackendCommandBuffer for VulkanCommandBuffer {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn begin(&mut self) -> Result<()> {
        self.bound_layout = None;
        unsafe {
            self.device()
                .reset_command_buffer(self.command_buffer, vk::CommandBufferResetFlags::empty())
                .map_err(|e| ignis_err!("ignis::vulkan", "Failed to reset command buffer: {:?}", e))?;

            let begin_info = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            self.device()
                .begin_command_buffer(self.command_buffer, &begin_info)
                .map_err(|e| ignis_err!("ignis::vulkan", "Failed to begin command buffer: {:?}", e))
        }
    }

    fn end(&mut self) -> Result<()> {
        unsafe { self.device().end_command_buffer(self.command_buffer) }
            .map_err(|e| ignis_err!("ignis::vulkan", "Failed to end command buffer: {:?}", e))
    }

    fn image_barrier(
        &mut self,
        image: &dyn BackendImage,
        aspect: ImageAspect,
        old_layout: ImageLayout,
        new_layout: ImageLayout,
    ) {
        let image = vk_image(image);
        let (src_stage, src_access) = layout_scope(old_layout);
        let (dst_stage, dst_access) = layout_scope(new_layout);

        let barrier = vk::ImageMemoryBarrier2::default()
            .src_stage_mask(src_stage)
            .src_access_mask(src_access)
            .dst_stage_mask(dst_stage)
            .dst_access_mask(dst_access)
            .old_layout(image_layout_to_vk(old_layout))
            .new_layout(image_layout_to_vk(new_layout))
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image.image)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: aspect_to_vk(aspect),
                base_mip_level: 0,
                level_count: vk::REMAINING_MIP_LEVELS,
                base_array_layer: 0,
                layer_count: vk::REMAINING_ARRAY_LAYERS,
            });
        let barriers = [barrier];
        let dependency = vk::DependencyInfo::default().image_memory_barriers(&barriers);
        unsafe { self.device().cmd_pipeline_barrier2(self.command_buffer, &dependency) };
    }

    fn begin_rendering(&mut self, info: &RenderingInfo<'_>) {
        let mut color_attachments = Vec::with_capacity(1);
        if let Some(color) = &info.color {
            let image = vk_image(color.image);
            color_attachments.push(
                vk::RenderingAttachmentInfo::default()
                    .image_view(image.view)
                    .image_layout(image_layout_to_vk(color.layout))
                    .load_op(load_op_to_vk(color.load_op))
                    .store_op(store_op_to_vk(color.store_op))
                    .clear_value(vk::ClearValue {
                        color: vk::ClearColorValue { float32: color.clear_color },
                    }),
            );
        }

        let depth_attachment = match &info.depth {
            Some(depth) => {
                let image = vk_image(depth.image);
                Some(
                    vk::RenderingAttachmentInfo::default()
                        .image_view(image.view)
                        .image_layout(image_layout_to_vk(depth.layout))
                        .load_op(load_op_to_vk(depth.load_op))
                        .store_op(store_op_to_vk(depth.store_op))
                        .clear_value(vk::ClearValue {
                            depth_stencil: vk::ClearDepthStencilValue {
                                depth: depth.clear_depth,
                                stencil: 0,
                            },
                        }),
                )
            }
            None => None,
        };

        let mut rendering_info = vk::RenderingInfo::default()
            .render_area(rect_to_vk(info.area))
            .layer_count(1)
            .color_attachments(&color_attachments);
        if let Some(depth) = depth_attachment.as_ref() {
            rendering_info = rendering_info.depth_attachment(depth);
        }

        unsafe { self.device().cmd_begin_rendering(self.command_buffer, &rendering_info) };
    }

    fn end_rendering(&mut self) {
        unsafe { self.device().cmd_end_rendering(self.command_buffer) };
    }

    fn bind_pipeline(&mut self, pipeline: &dyn BackendPipeline) {
        let pipeline = native::<VulkanPipeline>(pipeline.as_any(), "pipeline");
        let context = &self.pool.context;
        unsafe {
            context.device.cmd_bind_pipeline(
                self.command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                pipeline.pipeline,
            );
            context.device.cmd_bind_descriptor_sets(
                self.command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                pipeline.layout,
                0,
                &[context.descriptors.set],
                &[],
            );
        }
        self.bound_layout = Some(pipeline.layout);
    }

    fn push_constants(&mut self, offset: u32, data: &[u8]) {
        let Some(layout) = self.bound_layout else {
            panic!("push_constants without a bound pipeline");
        };
        unsafe {
            self.device().cmd_push_constants(
                self.command_buffer,
                layout,
                vk::ShaderStageFlags::ALL_GRAPHICS,
                offset,
                data,
            )
        };
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        let viewports = [vk::Viewport {
            x: viewport.x,
            y: viewport.y,
            width: viewport.width,
            height: viewport.height,
            min_depth: viewport.min_depth,
            max_depth: viewport.max_depth,
        }];
        unsafe { self.device().cmd_set_viewport(self.command_buffer, 0, &viewports) };
    }

    fn set_scissor(&mut self, scissor: Rect2D) {
        unsafe { self.device().cmd_set_scissor(self.command_buffer, 0, &[rect_to_vk(scissor)]) };
    }

    fn clear_color_attachment(&mut self, rect: Rect2D, color: [f32; 4]) {
        let attachment = vk::ClearAttachment {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            color_attachment: 0,
            clear_value: vk::ClearValue {
                color: vk::ClearColorValue { float32: color },
            },
        };
        let clear_rect = vk::ClearRect {
            rect: rect_to_vk(rect),
            base_array_layer: 0,
            layer_count: 1,
        };
        unsafe {
            self.device()
                .cmd_clear_attachments(self.command_buffer, &[attachment], &[clear_rect])
        };
    }

    fn bind_index_buffer(&mut self, buffer: &dyn BackendBuffer, offset: u64) {
        let buffer = vk_buffer(buffer);
        unsafe {
            self.device().cmd_bind_index_buffer(
                self.command_buffer,
                buffer.buffer,
                offset,
                vk::IndexType::UINT32,
            )
        };
    }

    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        first_instance: u32,
    ) {
        unsafe {
            self.device().cmd_draw_indexed(
                self.command_buffer,
                index_count,
                instance_count,
                first_index,
                0,
                first_instance,
            )
        };
    }

    fn copy_buffer(
        &mut self,
        src: &dyn BackendBuffer,
        dst: &dyn BackendBuffer,
        src_offset: u64,
        dst_offset: u64,
        size: u64,
    ) {
        let (src, dst) = (vk_buffer(src), vk_buffer(dst));
        let region = vk::BufferCopy { src_offset, dst_offset, size };
        unsafe {
            self.device()
                .cmd_copy_buffer(self.command_buffer, src.buffer, dst.buffer, &[region])
        };
    }

    fn copy_buffer_to_image(&mut self, src: &dyn BackendBuffer, dst: &ImageRegion<'_>) {
        let (buffer, image) = (vk_buffer(src), vk_image(dst.image));
        let region = vk::BufferImageCopy {
            buffer_offset: 0,
            buffer_row_length: 0,
            buffer_image_height: 0,
            image_subresource: subresource_layers(dst.aspect),
            image_offset: offset_3d(dst.offset),
            image_extent: extent_3d(dst.extent),
        };
        unsafe {
            self.device().cmd_copy_buffer_to_image(
                self.command_buffer,
                buffer.buffer,
                image.image,
                image_layout_to_vk(dst.layout),
                &[region],
            )
        };
    }

    fn copy_image(&mut self, src: &ImageRegion<'_>, dst: &ImageRegion<'_>) {
        let (src_image, dst_image) = (vk_image(src.image), vk_image(dst.image));
        let region = vk::ImageCopy {
            src_subresource: subresource_layers(src.aspect),
            src_offset: offset_3d(src.offset),
            dst_subresource: subresource_layers(dst.aspect),
            dst_offset: offset_3d(dst.offset),
            extent: extent_3d(src.extent),
        };
        unsafe {
            self.device().cmd_copy_image(
                self.command_buffer,
                src_image.image,
                image_layout_to_vk(src.layout),
                dst_image.image,
                image_layout_to_vk(dst.layout),
                &[region],
            )
        };
    }

    fn blit_image(&mut self, src: &ImageRegion<'_>, dst: &ImageRegion<'_>) {
        let (src_image, dst_image) = (vk_image(src.image), vk_image(dst.image));
        let regions = [vk::ImageBlit2::default()
            .src_subresource(subresource_layers(src.aspect))
            .src_offsets([offset_3d(src.offset), far_corner(src.offset, src.extent)])
            .dst_subresource(subresource_layers(dst.aspect))
            .dst_offsets([offset_3d(dst.offset), far_corner(dst.offset, dst.extent)])];
        let blit_info = vk::BlitImageInfo2::default()
            .src_image(src_image.image)
            .src_image_layout(image_layout_to_vk(src.layout))
            .dst_image(dst_image.image)
            .dst_image_layout(image_layout_to_vk(dst.layout))
            .filter(vk::Filter::LINEAR)
            .regions(&regions);
        unsafe { self.device().cmd_blit_image2(self.command_buffer, &blit_info) };
    }

    fn resolve_image(&mut self, src: &ImageRegion<'_>, dst: &ImageRegion<'_>) {
        let (src_image, dst_image) = (vk_image(src.image), vk_image(dst.image));
        let regions = [vk::ImageResolve2::default()
            .src_subresource(subresource_layers(src.aspect))
            .src_offset(offset_3d(src.offset))
            .dst_subresource(subresource_layers(dst.aspect))
            .dst_offset(offset_3d(dst.offset))
            .extent(extent_3d(src.extent))];
        let resolve_info = vk::ResolveImageInfo2::default()
            .src_image(src_image.image)
            .src_image_layout(image_layout_to_vk(src.layout))
            .dst_image(dst_image.image)
            .dst_image_layout(image_layout_to_vk(dst.layout))
            .regions(&regions);
        unsafe { self.device().cmd_resolve_image2(self.command_buffer, &resolve_info) };
    }
}

impl Drop for VulkanCommandBuffer {
    fn drop(&mut self) {
        if let Ok(pool) = self.pool.pool.lock() {
            unsafe {
                self.pool
                    .context
                    .device
                    .free_command_buffers(*pool, &[self.command_buffer])
            };
        }
    }
}
