/// Backend traits - the seam between the engine core and a graphics API
///
/// Every GPU object the core owns holds a boxed backend object. Backends
/// downcast the trait objects they receive through `as_any()`; passing an
/// object created by another backend is a programming error.

use std::any::Any;
use std::sync::Arc;

use crate::error::Result;
use crate::device::types::{
    Extent2D, Format, ImageAspect, ImageLayout, ImageUsage, BufferUsage, LoadOp,
    MemoryProperties, Offset2D, Rect2D, SampleCount, SampleCounts, StoreOp, Viewport,
};
use crate::device::pipeline::PipelineCreateInfo;
use crate::device::shader::ShaderStage;
use crate::device::swapchain::SwapchainCreateInfo;

/// Physical device properties the core needs
#[derive(Debug, Clone)]
pub struct DeviceProperties {
    /// Human-readable adapter name
    pub device_name: String,
    /// Minimum alignment of uniform buffer sizes and offsets
    pub min_uniform_buffer_alignment: u64,
    /// Minimum alignment of storage buffer sizes and offsets
    pub min_storage_buffer_alignment: u64,
    /// Sample counts supported by both color and depth framebuffers
    pub sample_counts: SampleCounts,
    /// Maximum push constant block size in bytes
    pub max_push_constants_size: u32,
    /// Capacity of each array of the global descriptor set
    pub max_bindless_resources: u32,
}

/// Buffer allocation request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferDesc {
    /// Size in bytes (already aligned)
    pub size: u64,
    pub usage: BufferUsage,
    pub memory: MemoryProperties,
}

/// Image allocation request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageDesc {
    pub extent: Extent2D,
    pub format: Format,
    pub usage: ImageUsage,
    pub aspect: ImageAspect,
    pub samples: SampleCount,
}

/// Shader module creation request
#[derive(Debug, Clone, Copy)]
pub struct ShaderDesc<'a> {
    /// SPIR-V bytecode
    pub code: &'a [u8],
    pub stage: ShaderStage,
}

/// Color attachment of a dynamic rendering scope
pub struct ColorAttachmentInfo<'a> {
    pub image: &'a dyn BackendImage,
    pub layout: ImageLayout,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
    pub clear_color: [f32; 4],
}

/// Depth attachment of a dynamic rendering scope
pub struct DepthAttachmentInfo<'a> {
    pub image: &'a dyn BackendImage,
    pub layout: ImageLayout,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
    pub clear_depth: f32,
}

/// Everything `begin_rendering` needs
pub struct RenderingInfo<'a> {
    pub area: Rect2D,
    pub color: Option<ColorAttachmentInfo<'a>>,
    pub depth: Option<DepthAttachmentInfo<'a>>,
}

/// Image side of a copy, blit or resolve
#[derive(Clone, Copy)]
pub struct ImageRegion<'a> {
    pub image: &'a dyn BackendImage,
    pub layout: ImageLayout,
    pub aspect: ImageAspect,
    pub offset: Offset2D,
    pub extent: Extent2D,
}

/// One command buffer of a queue submission with its semaphores
pub struct SubmitBatch<'a> {
    pub command: &'a dyn BackendCommandBuffer,
    pub waits: Vec<&'a dyn BackendSemaphore>,
    pub signals: Vec<&'a dyn BackendSemaphore>,
}

/// Logical device of a graphics API
pub trait Backend: Send + Sync {
    fn as_any(&self) -> &dyn Any;

    fn properties(&self) -> &DeviceProperties;

    /// Whether a named device feature was enabled at creation
    fn is_feature_enabled(&self, name: &str) -> bool;

    /// Number of graphics queues
    fn queue_count(&self) -> u32;

    fn create_buffer(&self, desc: &BufferDesc) -> Result<Box<dyn BackendBuffer>>;

    fn create_image(&self, desc: &ImageDesc) -> Result<Box<dyn BackendImage>>;

    fn create_shader(&self, desc: &ShaderDesc<'_>) -> Result<Box<dyn BackendShader>>;

    fn create_pipeline(
        &self,
        info: &PipelineCreateInfo<'_>,
        push_constant_size: u32,
    ) -> Result<Box<dyn BackendPipeline>>;

    fn create_fence(&self, signaled: bool) -> Result<Box<dyn BackendFence>>;

    fn create_semaphore(&self) -> Result<Box<dyn BackendSemaphore>>;

    /// Create the command pool of one queue
    fn create_command_pool(&self, queue: u32) -> Result<Arc<dyn BackendCommandPool>>;

    fn create_swapchain(
        &self,
        surface: &dyn BackendSurface,
        info: &SwapchainCreateInfo,
    ) -> Result<Box<dyn BackendSwapchain>>;

    /// Write `buffer` into the global descriptor set at `binding[slot]`
    fn write_buffer_descriptor(&self, binding: u32, slot: u32, buffer: &dyn BackendBuffer, size: u64);

    /// Write `image` into the global descriptor set at `binding[slot]`
    fn write_image_descriptor(&self, binding: u32, slot: u32, image: &dyn BackendImage, layout: ImageLayout);

    /// Submit batches to a queue. `fence` is signaled once all of them complete.
    fn submit(
        &self,
        queue: u32,
        batches: &[SubmitBatch<'_>],
        fence: Option<&dyn BackendFence>,
    ) -> Result<()>;

    /// Block until every queue is idle
    fn wait_idle(&self) -> Result<()>;
}

/// Buffer allocation. Freed on drop.
pub trait BackendBuffer: Send + Sync {
    fn as_any(&self) -> &dyn Any;

    /// Copy `data` into mapped memory at `offset` (host-visible only)
    fn write(&self, offset: u64, data: &[u8]) -> Result<()>;

    /// Copy mapped memory at `offset` into `out` (host-visible only)
    fn read(&self, offset: u64, out: &mut [u8]) -> Result<()>;

    /// GPU virtual address, if the buffer was created address-capable
    fn device_address(&self) -> Option<u64>;
}

/// Image (allocated or wrapped) with its default view
pub trait BackendImage: Send + Sync {
    fn as_any(&self) -> &dyn Any;
}

/// Per-queue command pool
pub trait BackendCommandPool: Send + Sync {
    fn as_any(&self) -> &dyn Any;

    fn allocate(&self) -> Result<Box<dyn BackendCommandBuffer>>;
}

/// Primary command buffer.
///
/// Recording calls cannot fail at the API level; state checks happen in
/// the core before they are issued.
pub trait BackendCommandBuffer: Send {
    fn as_any(&self) -> &dyn Any;

    /// Reset and start recording (one-time submit)
    fn begin(&mut self) -> Result<()>;

    fn end(&mut self) -> Result<()>;

    fn image_barrier(
        &mut self,
        image: &dyn BackendImage,
        aspect: ImageAspect,
        old_layout: ImageLayout,
        new_layout: ImageLayout,
    );

    fn begin_rendering(&mut self, info: &RenderingInfo<'_>);

    fn end_rendering(&mut self);

    /// Bind a graphics pipeline and the global descriptor set
    fn bind_pipeline(&mut self, pipeline: &dyn BackendPipeline);

    /// Push constants through the layout of the bound pipeline
    fn push_constants(&mut self, offset: u32, data: &[u8]);

    fn set_viewport(&mut self, viewport: Viewport);

    fn set_scissor(&mut self, scissor: Rect2D);

    /// Clear `rect` of the current color attachment
    fn clear_color_attachment(&mut self, rect: Rect2D, color: [f32; 4]);

    /// Bind a 32-bit index buffer
    fn bind_index_buffer(&mut self, buffer: &dyn BackendBuffer, offset: u64);

    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        first_instance: u32,
    );

    fn copy_buffer(
        &mut self,
        src: &dyn BackendBuffer,
        dst: &dyn BackendBuffer,
        src_offset: u64,
        dst_offset: u64,
        size: u64,
    );

    fn copy_buffer_to_image(&mut self, src: &dyn BackendBuffer, dst: &ImageRegion<'_>);

    fn copy_image(&mut self, src: &ImageRegion<'_>, dst: &ImageRegion<'_>);

    /// Scaled copy with linear filtering
    fn blit_image(&mut self, src: &ImageRegion<'_>, dst: &ImageRegion<'_>);

    fn resolve_image(&mut self, src: &ImageRegion<'_>, dst: &ImageRegion<'_>);
}

/// Host-waitable fence
pub trait BackendFence: Send + Sync {
    fn as_any(&self) -> &dyn Any;

    /// Block until signaled (no timeout)
    fn wait(&self) -> Result<()>;

    fn reset(&self) -> Result<()>;

    fn is_signaled(&self) -> Result<bool>;
}

/// GPU-side semaphore
pub trait BackendSemaphore: Send + Sync {
    fn as_any(&self) -> &dyn Any;
}

/// Compiled shader module
pub trait BackendShader: Send + Sync {
    fn as_any(&self) -> &dyn Any;

    /// Push constant block size found in the bytecode, if any
    fn reflected_push_constant_size(&self) -> Option<u32>;
}

/// Graphics pipeline
pub trait BackendPipeline: Send + Sync {
    fn as_any(&self) -> &dyn Any;
}

/// Presentation surface of a window
pub trait BackendSurface: Send + Sync {
    fn as_any(&self) -> &dyn Any;

    /// Current size of the surface
    fn extent(&self) -> Extent2D;
}

/// Presentable image chain of one surface
pub trait BackendSwapchain: Send + Sync {
    fn as_any(&self) -> &dyn Any;

    /// Non-owning wrappers of the presentable images, in index order
    fn images(&self) -> Result<Vec<Box<dyn BackendImage>>>;

    fn format(&self) -> Format;

    fn extent(&self) -> Extent2D;

    /// Block until an image is available; `signal` is signaled when it can be written
    fn acquire_next_image(&mut self, signal: &dyn BackendSemaphore) -> Result<u32>;

    /// Queue `image_index` for presentation once `waits` are signaled
    fn present(&self, queue: u32, image_index: u32, waits: &[&dyn BackendSemaphore]) -> Result<()>;
}
