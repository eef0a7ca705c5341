/// VulkanBuffer - Vulkan implementation of the BackendBuffer trait

use std::any::Any;
use std::sync::Arc;

use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;
use ignis_engine::ignis::device::{BackendBuffer, BufferDesc, BufferUsage, MemoryProperties};
use ignis_engine::ignis::{Error, Result};
use ignis_engine::{ignis_err, ignis_error};

use crate::vulkan_context::VulkanContext;
use crate::vulkan_format::buffer_usage_to_vk;

/// Vulkan buffer implementation
pub struct VulkanBuffer {
    context: Arc<VulkanContext>,
    pub(crate) buffer: vk::Buffer,
    /// GPU memory allocation (None only during drop)
    allocation: Option<Allocation>,
    size: u64,
    device_address: Option<u64>,
}

impl VulkanBuffer {
    pub(crate) fn new(context: Arc<VulkanContext>, desc: &BufferDesc) -> Result<Self> {
        let buffer_info = vk::BufferCreateInfo::default()
            .size(desc.size)
            .usage(buffer_usage_to_vk(desc.usage))
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { context.device.create_buffer(&buffer_info, None) }.map_err(|e| {
            ignis_error!("ignis::vulkan", "Failed to create buffer ({} bytes): {:?}", desc.size, e);
            match e {
                vk::Result::ERROR_OUT_OF_DEVICE_MEMORY | vk::Result::ERROR_OUT_OF_HOST_MEMORY => {
                    Error::OutOfMemory
                }
                other => Error::BackendError(format!("Failed to create buffer: {:?}", other)),
            }
        })?;

        let requirements = unsafe { context.device.get_buffer_memory_requirements(buffer) };
        let location = if desc.memory.contains(MemoryProperties::HOST_VISIBLE) {
            MemoryLocation::CpuToGpu
        } else {
            MemoryLocation::GpuOnly
        };

        let allocation = context.allocator().and_then(|mut allocator| {
            allocator
                .allocate(&AllocationCreateDesc {
                    name: "ignis buffer",
                    requirements,
                    location,
                    linear: true,
                    allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                })
                .map_err(|e| {
                    ignis_error!("ignis::vulkan", "Buffer allocation failed ({} bytes): {:?}", desc.size, e);
                    Error::OutOfMemory
                })
        });
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { context.device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        if let Err(e) = unsafe {
            context
                .device
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
        } {
            if let Ok(mut allocator) = context.allocator() {
                allocator.free(allocation).ok();
            }
            unsafe { context.device.destroy_buffer(buffer, None) };
            return Err(ignis_err!("ignis::vulkan", "Failed to bind buffer memory: {:?}", e));
        }

        let device_address = if desc.usage.contains(BufferUsage::DEVICE_ADDRESS) {
            let info = vk::BufferDeviceAddressInfo::default().buffer(buffer);
            Some(unsafe { context.device.get_buffer_device_address(&info) })
        } else {
            None
        };

        Ok(Self {
            context,
            buffer,
            allocation: Some(allocation),
            size: desc.size,
            device_address,
        })
    }

    fn mapped(&self, offset: u64, len: usize) -> Result<*mut u8> {
        let allocation = self
            .allocation
            .as_ref()
            .ok_or_else(|| ignis_err!("ignis::vulkan", "Buffer has no allocation"))?;
        let end = offset.checked_add(len as u64);
        if end.map_or(true, |end| end > self.size) {
            return Err(Error::InvalidResource(format!(
                "range {}+{} exceeds buffer size {}",
                offset, len, self.size
            )));
        }
        let base = allocation
            .mapped_ptr()
            .ok_or_else(|| Error::InvalidResource("Buffer is not CPU-accessible".to_string()))?
            .as_ptr() as *mut u8;
        Ok(unsafe { base.add(offset as usize) })
    }
}

impl BackendBuffer for VulkanBuffer {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn write(&self, offset: u64, data: &[u8]) -> Result<()> {
        let dst = self.mapped(offset, data.len())?;
        unsafe { std::ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len()) };
        Ok(())
    }

    fn read(&self, offset: u64, out: &mut [u8]) -> Result<()> {
        let src = self.mapped(offset, out.len())?;
        unsafe { std::ptr::copy_nonoverlapping(src as *const u8, out.as_mut_ptr(), out.len()) };
        Ok(())
    }

    fn device_address(&self) -> Option<u64> {
        self.device_address
    }
}

impl Drop for VulkanBuffer {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            // Don't panic if lock fails - we still need to destroy the buffer
            if let Ok(mut allocator) = self.context.allocator() {
                allocator.free(allocation).ok();
            }
        }
        unsafe { self.context.device.destroy_buffer(self.buffer, None) };
    }
}
