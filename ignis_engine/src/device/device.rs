/// Device - hub owning the GPU context and the buffer/image handle tables
///
/// Buffers and images created through the device live in generation-tagged
/// handle tables. The slot of each id is the index of the resource in the
/// global descriptor set, so shaders can reach it from push constants.
///
/// Index buffers, shaders, pipelines and sync objects are returned by value
/// and owned by the caller.

use std::path::Path;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::device::backend::{Backend, BackendCommandPool, BackendSurface, DeviceProperties};
use crate::device::buffer::Buffer;
use crate::device::command::{Command, Recording};
use crate::device::config::DeviceConfig;
use crate::device::context::{GpuContext, SubmitInfo};
use crate::device::image::{DepthImageCreateInfo, DrawImageCreateInfo, Image, ImageCreateInfo};
use crate::device::pipeline::{Pipeline, PipelineCreateInfo};
use crate::device::shader::{Shader, ShaderStage};
use crate::device::swapchain::{Swapchain, SwapchainCreateInfo};
use crate::device::sync::{Fence, Semaphore};
use crate::device::types::{
    clamp_sample_count, max_sample_count, BufferId, ImageId, ImageLayout, ImageUsage, Queue,
    SampleCount, IMAGE_SAMPLER_BINDING, STORAGE_BUFFER_BINDING, UNIFORM_BUFFER_BINDING,
};
use crate::utils::HandleTable;
use crate::{ignis_debug, ignis_error, ignis_info};

/// Logical device hub
pub struct Device {
    buffers: HandleTable<BufferId, Buffer>,
    images: HandleTable<ImageId, Image>,
    config: DeviceConfig,
    context: Arc<GpuContext>,
}

impl Device {
    /// Wrap a backend after checking that every required feature is enabled
    pub fn new(backend: Box<dyn Backend>, config: DeviceConfig) -> Result<Self> {
        if let Some(missing) = config
            .required_features
            .iter()
            .find(|feature| !backend.is_feature_enabled(feature))
        {
            ignis_error!("ignis::Device", "Required device feature '{}' is not enabled", missing);
            return Err(Error::MissingFeature(missing.clone()));
        }

        let context = GpuContext::new(backend);
        ignis_info!(
            "ignis::Device",
            "Device '{}' ready ({} graphics queues, up to {}x MSAA)",
            context.properties().device_name,
            context.backend().queue_count(),
            max_sample_count(context.properties().sample_counts).as_u32()
        );

        Ok(Self {
            buffers: HandleTable::new(),
            images: HandleTable::new(),
            config,
            context,
        })
    }

    // ===== QUERIES =====

    pub fn context(&self) -> &Arc<GpuContext> {
        &self.context
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn properties(&self) -> &DeviceProperties {
        self.context.properties()
    }

    pub fn is_feature_enabled(&self, name: &str) -> bool {
        self.context.backend().is_feature_enabled(name)
    }

    pub fn queue_count(&self) -> u32 {
        self.context.backend().queue_count()
    }

    /// Graphics queue `index`
    ///
    /// # Panics
    ///
    /// If the device has no such queue.
    pub fn queue(&self, index: u32) -> Queue {
        assert!(
            index < self.queue_count(),
            "queue {} out of range ({} queues)",
            index,
            self.queue_count()
        );
        Queue::new(index)
    }

    /// Highest sample count usable for both color and depth
    pub fn max_sample_count(&self) -> SampleCount {
        max_sample_count(self.properties().sample_counts)
    }

    /// Round `requested` down to a supported sample count
    pub fn clamp_sample_count(&self, requested: u32) -> SampleCount {
        clamp_sample_count(requested, self.properties().sample_counts)
    }

    /// Command pool of `queue`, created lazily and bound to the calling thread
    pub fn command_pool(&self, queue: Queue) -> Result<Arc<dyn BackendCommandPool>> {
        self.context.command_pool(queue)
    }

    // ===== BUFFERS =====

    /// Uniform buffer of `size` bytes, optionally filled with `data`
    pub fn create_ubo(&mut self, size: u64, data: Option<&[u8]>) -> Result<BufferId> {
        let buffer = Buffer::allocate_ubo(&self.context, size)?;
        self.register_buffer(buffer, Some(UNIFORM_BUFFER_BINDING), data)
    }

    /// Storage buffer of `size` bytes, optionally filled with `data`
    pub fn create_ssbo(&mut self, size: u64, data: Option<&[u8]>) -> Result<BufferId> {
        let buffer = Buffer::allocate_ssbo(&self.context, size)?;
        self.register_buffer(buffer, Some(STORAGE_BUFFER_BINDING), data)
    }

    /// Host-visible buffer, not visible to shaders
    pub fn create_staging_buffer(&mut self, size: u64, data: Option<&[u8]>) -> Result<BufferId> {
        let buffer = Buffer::allocate_staging(&self.context, size)?;
        self.register_buffer(buffer, None, data)
    }

    /// Index buffer holding `indices`, owned by the caller
    pub fn create_index_buffer32(&self, indices: &[u32]) -> Result<Buffer> {
        let buffer = Buffer::allocate_index_buffer32(&self.context, indices.len() as u32)?;
        self.upload(&buffer, bytemuck::cast_slice(indices), 0)?;
        Ok(buffer)
    }

    fn register_buffer(
        &mut self,
        buffer: Buffer,
        binding: Option<u32>,
        data: Option<&[u8]>,
    ) -> Result<BufferId> {
        if let Some(data) = data {
            self.upload(&buffer, data, 0)?;
        }

        let id = self.buffers.insert(buffer);
        let max_resources = self.properties().max_bindless_resources;
        if binding.is_some() && id.slot() >= max_resources {
            self.buffers.remove(id);
            return Err(Error::InvalidResource(format!(
                "buffer table full ({} descriptors)",
                max_resources
            )));
        }

        let buffer = self.buffers.get(id);
        if let Some(binding) = binding {
            self.context
                .backend()
                .write_buffer_descriptor(binding, id.slot(), buffer.backend(), buffer.size());
        }
        ignis_debug!("ignis::Device", "Created buffer {:?} ({} bytes)", id, buffer.size());
        Ok(id)
    }

    /// # Panics
    ///
    /// If `id` is invalid or was destroyed.
    pub fn get_buffer(&self, id: BufferId) -> &Buffer {
        self.buffers.get(id)
    }

    pub fn try_get_buffer(&self, id: BufferId) -> Option<&Buffer> {
        self.buffers.try_get(id)
    }

    /// Release the buffer. The caller must make sure no pending GPU work uses it.
    ///
    /// # Panics
    ///
    /// If `id` is invalid or was already destroyed.
    pub fn destroy_buffer(&mut self, id: BufferId) {
        drop(self.buffers.remove(id));
        ignis_debug!("ignis::Device", "Destroyed buffer {:?}", id);
    }

    pub fn buffer_count(&self) -> u32 {
        self.buffers.len()
    }

    /// Write `data` at `offset`.
    ///
    /// Device-local buffers are staged and copied on an immediate submission,
    /// so the call blocks until the copy has completed.
    pub fn update_buffer(&self, id: BufferId, data: &[u8], offset: u64) -> Result<()> {
        self.upload(self.buffers.get(id), data, offset)
    }

    /// Read `out.len()` bytes at `offset`, through a staging copy for device-local memory
    pub fn read_buffer(&self, id: BufferId, out: &mut [u8], offset: u64) -> Result<()> {
        let buffer = self.buffers.get(id);
        let len = out.len() as u64;
        buffer.check_range(offset, len)?;
        if len == 0 {
            return Ok(());
        }
        if buffer.is_host_visible() {
            return buffer.read_data(out, offset);
        }

        let staging = Buffer::allocate_staging(&self.context, len)?;
        self.immediate_submit(|recording| {
            recording.copy_buffer(buffer, &staging, offset, 0, len);
            Ok(())
        })?;
        staging.read_data(out, 0)
    }

    fn upload(&self, buffer: &Buffer, data: &[u8], offset: u64) -> Result<()> {
        buffer.check_range(offset, data.len() as u64)?;
        if data.is_empty() {
            return Ok(());
        }
        if buffer.is_host_visible() {
            return buffer.write_data(data, offset);
        }
        self.immediate_submit(|recording| recording.update_buffer(buffer, data, offset))
    }

    // ===== IMAGES =====

    /// Image usable as a storage and sampled image, written at the image sampler binding
    pub fn create_storage_image(&mut self, info: &ImageCreateInfo) -> Result<ImageId> {
        let mut info = *info;
        info.usage |= ImageUsage::STORAGE | ImageUsage::SAMPLED;
        if info.optimal_layout == ImageLayout::Undefined {
            info.optimal_layout = ImageLayout::General;
        }
        let image = Image::allocate(&self.context, info)?;
        self.register_image(image, Some(info.optimal_layout))
    }

    /// Sampled image that can be filled by transfers
    pub fn create_sampled_image(&mut self, info: &ImageCreateInfo) -> Result<ImageId> {
        let mut info = *info;
        info.usage |= ImageUsage::SAMPLED | ImageUsage::TRANSFER_DST;
        if info.optimal_layout == ImageLayout::Undefined {
            info.optimal_layout = ImageLayout::ShaderReadOnly;
        }
        let image = Image::allocate(&self.context, info)?;
        self.register_image(image, Some(info.optimal_layout))
    }

    /// Color attachment, sampled as `ShaderReadOnly`
    pub fn create_draw_attachment_image(&mut self, info: &DrawImageCreateInfo) -> Result<ImageId> {
        let image = Image::allocate_draw_image(&self.context, info)?;
        self.register_image(image, Some(ImageLayout::ShaderReadOnly))
    }

    /// Depth attachment, sampled as `DepthReadOnly`
    pub fn create_depth_attachment_image(&mut self, info: &DepthImageCreateInfo) -> Result<ImageId> {
        let image = Image::allocate_depth_image(&self.context, info)?;
        self.register_image(image, Some(ImageLayout::DepthReadOnly))
    }

    fn register_image(&mut self, image: Image, sampled_layout: Option<ImageLayout>) -> Result<ImageId> {
        let id = self.images.insert(image);
        let max_resources = self.properties().max_bindless_resources;
        if id.slot() >= max_resources {
            self.images.remove(id);
            return Err(Error::InvalidResource(format!(
                "image table full ({} descriptors)",
                max_resources
            )));
        }

        let image = self.images.get(id);
        if let Some(layout) = sampled_layout {
            self.context
                .backend()
                .write_image_descriptor(IMAGE_SAMPLER_BINDING, id.slot(), image.backend(), layout);
        }
        ignis_debug!(
            "ignis::Device",
            "Created image {:?} ({}x{} {:?})",
            id,
            image.extent().width,
            image.extent().height,
            image.format()
        );
        Ok(id)
    }

    /// # Panics
    ///
    /// If `id` is invalid or was destroyed.
    pub fn get_image(&self, id: ImageId) -> &Image {
        self.images.get(id)
    }

    /// Mutable access, needed to record layout transitions
    ///
    /// # Panics
    ///
    /// If `id` is invalid or was destroyed.
    pub fn get_image_mut(&mut self, id: ImageId) -> &mut Image {
        self.images.get_mut(id)
    }

    pub fn try_get_image(&self, id: ImageId) -> Option<&Image> {
        self.images.try_get(id)
    }

    /// Release the image. The caller must make sure no pending GPU work uses it.
    ///
    /// # Panics
    ///
    /// If `id` is invalid or was already destroyed.
    pub fn destroy_image(&mut self, id: ImageId) {
        drop(self.images.remove(id));
        ignis_debug!("ignis::Device", "Destroyed image {:?}", id);
    }

    pub fn image_count(&self) -> u32 {
        self.images.len()
    }

    // ===== SHADERS AND PIPELINES =====

    pub fn create_shader(
        &self,
        code: &[u8],
        stage: ShaderStage,
        push_constant_size: Option<u32>,
    ) -> Result<Shader> {
        Shader::new(&self.context, code, stage, push_constant_size)
    }

    /// Load a SPIR-V file; relative paths are resolved in the shaders folder
    pub fn create_shader_from_file(
        &self,
        path: impl AsRef<Path>,
        stage: ShaderStage,
        push_constant_size: Option<u32>,
    ) -> Result<Shader> {
        let path = path.as_ref();
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.config.shaders_folder.join(path)
        };
        Shader::from_file(&self.context, &path, stage, push_constant_size)
    }

    pub fn create_pipeline(&self, info: &PipelineCreateInfo<'_>) -> Result<Pipeline> {
        Pipeline::new(&self.context, info)
    }

    // ===== SYNCHRONIZATION AND COMMANDS =====

    pub fn create_fence(&self, signaled: bool) -> Result<Fence> {
        Fence::new(&self.context, signaled)
    }

    pub fn create_semaphore(&self) -> Result<Semaphore> {
        Semaphore::new(&self.context)
    }

    pub fn create_command(&self, queue: Queue) -> Result<Command> {
        Command::new(Arc::clone(&self.context), queue)
    }

    pub fn create_swapchain(
        &self,
        surface: &dyn BackendSurface,
        info: &SwapchainCreateInfo,
    ) -> Result<Swapchain> {
        Swapchain::new(&self.context, surface, info)
    }

    /// Submit ended commands as one batch; `fence` is signaled after all complete
    pub fn submit_commands(&self, submits: &[SubmitInfo<'_>], fence: Option<&Fence>) -> Result<()> {
        self.context.submit(submits, fence)
    }

    /// Record with `record` on a transient command of queue 0, submit and
    /// wait for completion
    pub fn immediate_submit<F>(&self, record: F) -> Result<()>
    where
        F: FnOnce(&mut Recording<'_>) -> Result<()>,
    {
        let mut command = self.create_command(Queue::new(0))?;
        {
            let mut recording = command.begin()?;
            record(&mut recording)?;
            recording.end()?;
        }

        let fence = self.create_fence(false)?;
        self.context.submit(&[SubmitInfo::new(&command)], Some(&fence))?;
        fence.wait()
    }

    /// Block until every queue is idle
    pub fn wait_idle(&self) -> Result<()> {
        self.context.backend().wait_idle()
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        if let Err(e) = self.wait_idle() {
            ignis_error!("ignis::Device", "wait_idle failed during teardown: {}", e);
        }
    }
}

#[cfg(test)]
#[path = "device_tests.rs"]
mod tests;
