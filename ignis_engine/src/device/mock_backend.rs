/// Mock backend for unit tests (no GPU required)
///
/// Buffers hold real bytes and recorded buffer copies run at submit time, so
/// uploads and readbacks can be checked end to end. Command buffers record
/// their calls as strings; every submission snapshots them into the shared
/// [`MockState`]. Fences are signaled at submit unless the state is stalled.
///
/// Mock shader reflection: the first little-endian word of the code is the
/// push constant size (0 means no push constants).

use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use rustc_hash::FxHashMap;

use crate::error::{Error, Result};
use crate::device::backend::{
    Backend, BackendBuffer, BackendCommandBuffer, BackendCommandPool, BackendFence, BackendImage,
    BackendPipeline, BackendSemaphore, BackendShader, BackendSurface, BackendSwapchain,
    BufferDesc, DeviceProperties, ImageDesc, ImageRegion, RenderingInfo, ShaderDesc, SubmitBatch,
};
use crate::device::pipeline::PipelineCreateInfo;
use crate::device::swapchain::SwapchainCreateInfo;
use crate::device::types::{
    BufferUsage, Extent2D, Format, ImageAspect, ImageLayout, MemoryProperties, Rect2D,
    SampleCounts, Viewport, REQUIRED_FEATURES,
};

// ============================================================================
// Shared state
// ============================================================================

/// One command buffer as it was when submitted
#[derive(Debug, Clone)]
pub struct MockSubmission {
    pub queue: u32,
    pub commands: Vec<String>,
    pub waits: Vec<u32>,
    pub signals: Vec<u32>,
    pub fence: Option<u32>,
}

/// State shared by the mock backend and every object it creates
#[derive(Default)]
pub struct MockState {
    next_id: AtomicU32,
    log: Mutex<Vec<String>>,
    fences: Mutex<FxHashMap<u32, bool>>,
    fence_signaled: Condvar,
    fence_waits: Mutex<Vec<u32>>,
    pending_fences: Mutex<Vec<u32>>,
    stalled: AtomicBool,
    fail_allocations: AtomicBool,
    fail_submits: AtomicBool,
    out_of_date: AtomicBool,
    descriptor_writes: Mutex<Vec<(u32, u32)>>,
    submissions: Mutex<Vec<MockSubmission>>,
}

impl MockState {
    fn next_id(&self) -> u32 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn push_log(&self, entry: String) {
        self.log.lock().unwrap().push(entry);
    }

    /// Backend-level calls (creation, submission, presentation)
    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn clear_log(&self) {
        self.log.lock().unwrap().clear();
    }

    /// Ids of the fences waited on, in order
    pub fn fence_waits(&self) -> Vec<u32> {
        self.fence_waits.lock().unwrap().clone()
    }

    /// `(binding, slot)` of every descriptor write
    pub fn descriptor_writes(&self) -> Vec<(u32, u32)> {
        self.descriptor_writes.lock().unwrap().clone()
    }

    pub fn submissions(&self) -> Vec<MockSubmission> {
        self.submissions.lock().unwrap().clone()
    }

    /// While stalled, submitted fences stay unsignaled
    pub fn set_stalled(&self, stalled: bool) {
        self.stalled.store(stalled, Ordering::SeqCst);
    }

    /// Leave the stalled mode and signal every fence submitted meanwhile
    pub fn complete_pending(&self) {
        self.stalled.store(false, Ordering::SeqCst);
        let pending: Vec<u32> = self.pending_fences.lock().unwrap().drain(..).collect();
        for fence in pending {
            self.signal_fence(fence);
        }
    }

    /// Make every buffer and image creation fail with `OutOfMemory`
    pub fn set_fail_allocations(&self, fail: bool) {
        self.fail_allocations.store(fail, Ordering::SeqCst);
    }

    /// Make every queue submission fail before reaching the queue
    pub fn set_fail_submits(&self, fail: bool) {
        self.fail_submits.store(fail, Ordering::SeqCst);
    }

    /// Make swapchain acquisition report an out-of-date swapchain
    pub fn set_out_of_date(&self, out_of_date: bool) {
        self.out_of_date.store(out_of_date, Ordering::SeqCst);
    }

    fn signal_fence(&self, fence: u32) {
        self.fences.lock().unwrap().insert(fence, true);
        self.fence_signaled.notify_all();
    }

    fn check_allocation(&self) -> Result<()> {
        if self.fail_allocations.load(Ordering::SeqCst) {
            Err(Error::OutOfMemory)
        } else {
            Ok(())
        }
    }
}

// ============================================================================
// Mock Backend
// ============================================================================

pub struct MockBackend {
    state: Arc<MockState>,
    properties: DeviceProperties,
    features: Vec<String>,
}

impl MockBackend {
    /// Backend with every required feature and sample counts 1 to 8
    pub fn new() -> Self {
        Self {
            state: Arc::new(MockState::default()),
            properties: DeviceProperties {
                device_name: "Mock Device".to_string(),
                min_uniform_buffer_alignment: 256,
                min_storage_buffer_alignment: 64,
                sample_counts: SampleCounts::X1
                    | SampleCounts::X2
                    | SampleCounts::X4
                    | SampleCounts::X8,
                max_push_constants_size: 128,
                max_bindless_resources: 1024,
            },
            features: REQUIRED_FEATURES.iter().map(|f| f.to_string()).collect(),
        }
    }

    pub fn with_sample_counts(mut self, sample_counts: SampleCounts) -> Self {
        self.properties.sample_counts = sample_counts;
        self
    }

    pub fn without_feature(mut self, name: &str) -> Self {
        self.features.retain(|feature| feature != name);
        self
    }

    pub fn state(&self) -> Arc<MockState> {
        Arc::clone(&self.state)
    }
}

impl Backend for MockBackend {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn properties(&self) -> &DeviceProperties {
        &self.properties
    }

    fn is_feature_enabled(&self, name: &str) -> bool {
        self.features.iter().any(|feature| feature == name)
    }

    fn queue_count(&self) -> u32 {
        2
    }

    fn create_buffer(&self, desc: &BufferDesc) -> Result<Box<dyn BackendBuffer>> {
        self.state.check_allocation()?;
        let id = self.state.next_id();
        self.state.push_log(format!("create_buffer {} size={}", id, desc.size));
        Ok(Box::new(MockBuffer {
            id,
            data: Arc::new(Mutex::new(vec![0; desc.size as usize])),
            host_visible: desc.memory.contains(MemoryProperties::HOST_VISIBLE),
            device_address: desc
                .usage
                .contains(BufferUsage::DEVICE_ADDRESS)
                .then(|| 0x1000_0000 + id as u64 * 0x1_0000),
        }))
    }

    fn create_image(&self, desc: &ImageDesc) -> Result<Box<dyn BackendImage>> {
        self.state.check_allocation()?;
        let id = self.state.next_id();
        self.state.push_log(format!(
            "create_image {} {}x{} samples={}",
            id,
            desc.extent.width,
            desc.extent.height,
            desc.samples.as_u32()
        ));
        Ok(Box::new(MockImage { id }))
    }

    fn create_shader(&self, desc: &ShaderDesc<'_>) -> Result<Box<dyn BackendShader>> {
        let word = u32::from_le_bytes([desc.code[0], desc.code[1], desc.code[2], desc.code[3]]);
        Ok(Box::new(MockShader {
            push_constant_size: (word != 0).then_some(word),
        }))
    }

    fn create_pipeline(
        &self,
        info: &PipelineCreateInfo<'_>,
        push_constant_size: u32,
    ) -> Result<Box<dyn BackendPipeline>> {
        let id = self.state.next_id();
        self.state.push_log(format!(
            "create_pipeline {} push={} samples={}",
            id,
            push_constant_size,
            info.sample_count.as_u32()
        ));
        Ok(Box::new(MockPipeline { id }))
    }

    fn create_fence(&self, signaled: bool) -> Result<Box<dyn BackendFence>> {
        let id = self.state.next_id();
        self.state.fences.lock().unwrap().insert(id, signaled);
        Ok(Box::new(MockFence {
            id,
            state: Arc::clone(&self.state),
        }))
    }

    fn create_semaphore(&self) -> Result<Box<dyn BackendSemaphore>> {
        Ok(Box::new(MockSemaphore {
            id: self.state.next_id(),
        }))
    }

    fn create_command_pool(&self, queue: u32) -> Result<Arc<dyn BackendCommandPool>> {
        self.state.push_log(format!("create_command_pool queue={}", queue));
        Ok(Arc::new(MockCommandPool))
    }

    fn create_swapchain(
        &self,
        surface: &dyn BackendSurface,
        info: &SwapchainCreateInfo,
    ) -> Result<Box<dyn BackendSwapchain>> {
        let extent = if info.extent.area() == 0 {
            surface.extent()
        } else {
            info.extent
        };
        self.state.push_log(format!(
            "create_swapchain {}x{}",
            extent.width, extent.height
        ));
        let images = (0..MOCK_SWAPCHAIN_IMAGES)
            .map(|_| self.state.next_id())
            .collect();
        Ok(Box::new(MockSwapchain {
            state: Arc::clone(&self.state),
            images,
            format: info.format.format(),
            extent,
            next: 0,
        }))
    }

    fn write_buffer_descriptor(&self, binding: u32, slot: u32, _buffer: &dyn BackendBuffer, _size: u64) {
        self.state.descriptor_writes.lock().unwrap().push((binding, slot));
    }

    fn write_image_descriptor(&self, binding: u32, slot: u32, _image: &dyn BackendImage, _layout: ImageLayout) {
        self.state.descriptor_writes.lock().unwrap().push((binding, slot));
    }

    fn submit(
        &self,
        queue: u32,
        batches: &[SubmitBatch<'_>],
        fence: Option<&dyn BackendFence>,
    ) -> Result<()> {
        if self.state.fail_submits.load(Ordering::SeqCst) {
            self.state.push_log(format!("submit queue={} failed", queue));
            return Err(Error::BackendError("mock submission failure".to_string()));
        }
        let fence_id = fence.map(|f| f.as_any().downcast_ref::<MockFence>().unwrap().id);

        for batch in batches {
            let command = batch
                .command
                .as_any()
                .downcast_ref::<MockCommandBuffer>()
                .unwrap();
            command.execute_copies();
            self.state.submissions.lock().unwrap().push(MockSubmission {
                queue,
                commands: command.commands.clone(),
                waits: batch.waits.iter().map(|s| semaphore_id(*s)).collect(),
                signals: batch.signals.iter().map(|s| semaphore_id(*s)).collect(),
                fence: fence_id,
            });
        }
        self.state.push_log(format!("submit queue={} batches={}", queue, batches.len()));

        if let Some(id) = fence_id {
            if self.state.stalled.load(Ordering::SeqCst) {
                self.state.pending_fences.lock().unwrap().push(id);
            } else {
                self.state.signal_fence(id);
            }
        }
        Ok(())
    }

    fn wait_idle(&self) -> Result<()> {
        self.state.push_log("wait_idle".to_string());
        Ok(())
    }
}

// ============================================================================
// Mock resources
// ============================================================================

pub struct MockBuffer {
    pub id: u32,
    pub data: Arc<Mutex<Vec<u8>>>,
    pub host_visible: bool,
    pub device_address: Option<u64>,
}

impl BackendBuffer for MockBuffer {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn write(&self, offset: u64, data: &[u8]) -> Result<()> {
        if !self.host_visible {
            return Err(Error::BackendError("mock buffer is not mapped".to_string()));
        }
        let offset = offset as usize;
        self.data.lock().unwrap()[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn read(&self, offset: u64, out: &mut [u8]) -> Result<()> {
        if !self.host_visible {
            return Err(Error::BackendError("mock buffer is not mapped".to_string()));
        }
        let offset = offset as usize;
        out.copy_from_slice(&self.data.lock().unwrap()[offset..offset + out.len()]);
        Ok(())
    }

    fn device_address(&self) -> Option<u64> {
        self.device_address
    }
}

pub struct MockImage {
    pub id: u32,
}

impl BackendImage for MockImage {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct MockShader {
    push_constant_size: Option<u32>,
}

impl BackendShader for MockShader {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn reflected_push_constant_size(&self) -> Option<u32> {
        self.push_constant_size
    }
}

pub struct MockPipeline {
    pub id: u32,
}

impl BackendPipeline for MockPipeline {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct MockFence {
    pub id: u32,
    state: Arc<MockState>,
}

impl BackendFence for MockFence {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn wait(&self) -> Result<()> {
        self.state.fence_waits.lock().unwrap().push(self.id);
        let mut fences = self.state.fences.lock().unwrap();
        while !fences.get(&self.id).copied().unwrap_or(false) {
            fences = self.state.fence_signaled.wait(fences).unwrap();
        }
        Ok(())
    }

    fn reset(&self) -> Result<()> {
        self.state.fences.lock().unwrap().insert(self.id, false);
        Ok(())
    }

    fn is_signaled(&self) -> Result<bool> {
        Ok(self.state.fences.lock().unwrap().get(&self.id).copied().unwrap_or(false))
    }
}

pub struct MockSemaphore {
    pub id: u32,
}

impl BackendSemaphore for MockSemaphore {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct MockSurface {
    pub extent: Extent2D,
}

impl MockSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self { extent: Extent2D::new(width, height) }
    }
}

impl BackendSurface for MockSurface {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn extent(&self) -> Extent2D {
        self.extent
    }
}

// ============================================================================
// Mock commands
// ============================================================================

pub struct MockCommandPool;

impl BackendCommandPool for MockCommandPool {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn allocate(&self) -> Result<Box<dyn BackendCommandBuffer>> {
        Ok(Box::new(MockCommandBuffer::default()))
    }
}

struct PendingCopy {
    src: Arc<Mutex<Vec<u8>>>,
    dst: Arc<Mutex<Vec<u8>>>,
    src_offset: usize,
    dst_offset: usize,
    size: usize,
}

#[derive(Default)]
pub struct MockCommandBuffer {
    /// Calls since the last `begin`
    pub commands: Vec<String>,
    /// Bytes of every `push_constants` call since the last `begin`
    pub pushed: Vec<Vec<u8>>,
    copies: Vec<PendingCopy>,
}

impl MockCommandBuffer {
    fn execute_copies(&self) {
        for copy in &self.copies {
            let bytes = copy.src.lock().unwrap()[copy.src_offset..copy.src_offset + copy.size].to_vec();
            copy.dst.lock().unwrap()[copy.dst_offset..copy.dst_offset + copy.size]
                .copy_from_slice(&bytes);
        }
    }
}

impl BackendCommandBuffer for MockCommandBuffer {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn begin(&mut self) -> Result<()> {
        self.commands.clear();
        self.pushed.clear();
        self.copies.clear();
        self.commands.push("begin".to_string());
        Ok(())
    }

    fn end(&mut self) -> Result<()> {
        self.commands.push("end".to_string());
        Ok(())
    }

    fn image_barrier(
        &mut self,
        image: &dyn BackendImage,
        _aspect: ImageAspect,
        old_layout: ImageLayout,
        new_layout: ImageLayout,
    ) {
        self.commands.push(format!(
            "barrier {} {:?}->{:?}",
            image_id(image),
            old_layout,
            new_layout
        ));
    }

    fn begin_rendering(&mut self, info: &RenderingInfo<'_>) {
        let color = info
            .color
            .as_ref()
            .map(|c| format!("{}:{:?}", image_id(c.image), c.load_op))
            .unwrap_or_else(|| "none".to_string());
        let depth = info
            .depth
            .as_ref()
            .map(|d| format!("{}:{:?}", image_id(d.image), d.load_op))
            .unwrap_or_else(|| "none".to_string());
        self.commands.push(format!(
            "begin_rendering {}x{} color={} depth={}",
            info.area.width, info.area.height, color, depth
        ));
    }

    fn end_rendering(&mut self) {
        self.commands.push("end_rendering".to_string());
    }

    fn bind_pipeline(&mut self, pipeline: &dyn BackendPipeline) {
        let id = pipeline.as_any().downcast_ref::<MockPipeline>().unwrap().id;
        self.commands.push(format!("bind_pipeline {}", id));
    }

    fn push_constants(&mut self, offset: u32, data: &[u8]) {
        self.commands.push(format!("push_constants offset={} size={}", offset, data.len()));
        self.pushed.push(data.to_vec());
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.commands.push(format!(
            "set_viewport {},{} {}x{}",
            viewport.x, viewport.y, viewport.width, viewport.height
        ));
    }

    fn set_scissor(&mut self, scissor: Rect2D) {
        self.commands.push(format!(
            "set_scissor {},{} {}x{}",
            scissor.x, scissor.y, scissor.width, scissor.height
        ));
    }

    fn clear_color_attachment(&mut self, rect: Rect2D, _color: [f32; 4]) {
        self.commands.push(format!(
            "clear {},{} {}x{}",
            rect.x, rect.y, rect.width, rect.height
        ));
    }

    fn bind_index_buffer(&mut self, buffer: &dyn BackendBuffer, offset: u64) {
        self.commands.push(format!(
            "bind_index_buffer {} offset={}",
            buffer_of(buffer).id,
            offset
        ));
    }

    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        first_instance: u32,
    ) {
        self.commands.push(format!(
            "draw_indexed {} {} {} {}",
            index_count, instance_count, first_index, first_instance
        ));
    }

    fn copy_buffer(
        &mut self,
        src: &dyn BackendBuffer,
        dst: &dyn BackendBuffer,
        src_offset: u64,
        dst_offset: u64,
        size: u64,
    ) {
        let (src, dst) = (buffer_of(src), buffer_of(dst));
        self.commands.push(format!("copy_buffer {}->{} size={}", src.id, dst.id, size));
        self.copies.push(PendingCopy {
            src: Arc::clone(&src.data),
            dst: Arc::clone(&dst.data),
            src_offset: src_offset as usize,
            dst_offset: dst_offset as usize,
            size: size as usize,
        });
    }

    fn copy_buffer_to_image(&mut self, src: &dyn BackendBuffer, dst: &ImageRegion<'_>) {
        self.commands.push(format!(
            "copy_buffer_to_image {}->{} {}x{}",
            buffer_of(src).id,
            image_id(dst.image),
            dst.extent.width,
            dst.extent.height
        ));
    }

    fn copy_image(&mut self, src: &ImageRegion<'_>, dst: &ImageRegion<'_>) {
        self.commands.push(format!(
            "copy_image {}->{} {}x{}",
            image_id(src.image),
            image_id(dst.image),
            dst.extent.width,
            dst.extent.height
        ));
    }

    fn blit_image(&mut self, src: &ImageRegion<'_>, dst: &ImageRegion<'_>) {
        self.commands.push(format!(
            "blit_image {}->{}",
            image_id(src.image),
            image_id(dst.image)
        ));
    }

    fn resolve_image(&mut self, src: &ImageRegion<'_>, dst: &ImageRegion<'_>) {
        self.commands.push(format!(
            "resolve_image {}->{}",
            image_id(src.image),
            image_id(dst.image)
        ));
    }
}

// ============================================================================
// Mock Swapchain
// ============================================================================

/// Images in every mock swapchain
pub const MOCK_SWAPCHAIN_IMAGES: u32 = 3;

pub struct MockSwapchain {
    state: Arc<MockState>,
    images: Vec<u32>,
    format: Format,
    extent: Extent2D,
    next: u32,
}

impl BackendSwapchain for MockSwapchain {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn images(&self) -> Result<Vec<Box<dyn BackendImage>>> {
        Ok(self
            .images
            .iter()
            .map(|&id| Box::new(MockImage { id }) as Box<dyn BackendImage>)
            .collect())
    }

    fn format(&self) -> Format {
        self.format
    }

    fn extent(&self) -> Extent2D {
        self.extent
    }

    fn acquire_next_image(&mut self, _signal: &dyn BackendSemaphore) -> Result<u32> {
        if self.state.out_of_date.load(Ordering::SeqCst) {
            return Err(Error::SwapchainOutOfDate);
        }
        let index = self.next;
        self.next = (self.next + 1) % self.images.len() as u32;
        self.state.push_log(format!("acquire {}", index));
        Ok(index)
    }

    fn present(&self, queue: u32, image_index: u32, waits: &[&dyn BackendSemaphore]) -> Result<()> {
        self.state.push_log(format!(
            "present {} queue={} waits={:?}",
            image_index,
            queue,
            waits.iter().map(|s| semaphore_id(*s)).collect::<Vec<_>>()
        ));
        Ok(())
    }
}

// ============================================================================
// Helpers
// ============================================================================

pub fn image_id(image: &dyn BackendImage) -> u32 {
    image.as_any().downcast_ref::<MockImage>().unwrap().id
}

pub fn semaphore_id(semaphore: &dyn BackendSemaphore) -> u32 {
    semaphore.as_any().downcast_ref::<MockSemaphore>().unwrap().id
}

fn buffer_of(buffer: &dyn BackendBuffer) -> &MockBuffer {
    buffer.as_any().downcast_ref::<MockBuffer>().unwrap()
}

/// Commands recorded so far by a mock command buffer
pub fn recorded_commands(command: &dyn BackendCommandBuffer) -> Vec<String> {
    command
        .as_any()
        .downcast_ref::<MockCommandBuffer>()
        .unwrap()
        .commands
        .clone()
}

/// Push constant payloads recorded so far by a mock command buffer
pub fn pushed_constants(command: &dyn BackendCommandBuffer) -> Vec<Vec<u8>> {
    command
        .as_any()
        .downcast_ref::<MockCommandBuffer>()
        .unwrap()
        .pushed
        .clone()
}
