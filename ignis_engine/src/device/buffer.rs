/// Buffer - GPU memory allocation with usage and memory metadata
///
/// Four factory modes differ only in usage flags, memory properties and
/// alignment:
///
/// | Mode    | Usage          | Memory                       | Alignment            |
/// |---------|----------------|------------------------------|----------------------|
/// | UBO     | uniform        | device-local, address-capable | min UBO alignment   |
/// | SSBO    | storage        | device-local, address-capable | min SSBO alignment  |
/// | Index32 | index          | device-local                 | 4 bytes              |
/// | Staging | transfer       | host-visible + coherent      | none                 |
///
/// The allocation is released when the buffer is dropped.

use crate::error::{Error, Result};
use crate::device::backend::{BackendBuffer, BufferDesc};
use crate::device::context::GpuContext;
use crate::device::types::{BufferUsage, MemoryProperties};

/// Round `size` up to a multiple of `alignment` (alignments of 0 and 1 are no-ops)
pub fn align_up(size: u64, alignment: u64) -> u64 {
    if alignment <= 1 {
        size
    } else {
        size.div_ceil(alignment) * alignment
    }
}

/// Owned GPU buffer
pub struct Buffer {
    backend: Box<dyn BackendBuffer>,
    /// Requested size, the accessible range
    size: u64,
    /// Size after alignment
    allocated_size: u64,
    usage: BufferUsage,
    memory: MemoryProperties,
    device_address: Option<u64>,
}

impl Buffer {
    /// Allocate a buffer of `size` bytes rounded up to `alignment`
    pub fn allocate(
        context: &GpuContext,
        size: u64,
        alignment: u64,
        usage: BufferUsage,
        memory: MemoryProperties,
    ) -> Result<Self> {
        if size == 0 {
            return Err(Error::InvalidResource("zero-sized buffer".to_string()));
        }

        let desc = BufferDesc {
            size: align_up(size, alignment),
            usage,
            memory,
        };
        let backend = context.backend().create_buffer(&desc)?;
        let device_address = if usage.contains(BufferUsage::DEVICE_ADDRESS) {
            backend.device_address()
        } else {
            None
        };

        Ok(Self {
            backend,
            size,
            allocated_size: desc.size,
            usage,
            memory,
            device_address,
        })
    }

    /// Device-local uniform buffer aligned to the device UBO alignment
    pub fn allocate_ubo(context: &GpuContext, size: u64) -> Result<Self> {
        let alignment = context.properties().min_uniform_buffer_alignment;
        Self::allocate(
            context,
            size,
            alignment,
            BufferUsage::UNIFORM
                | BufferUsage::TRANSFER_SRC
                | BufferUsage::TRANSFER_DST
                | BufferUsage::DEVICE_ADDRESS,
            MemoryProperties::DEVICE_LOCAL,
        )
    }

    /// Device-local storage buffer aligned to the device SSBO alignment
    pub fn allocate_ssbo(context: &GpuContext, size: u64) -> Result<Self> {
        let alignment = context.properties().min_storage_buffer_alignment;
        Self::allocate(
            context,
            size,
            alignment,
            BufferUsage::STORAGE
                | BufferUsage::TRANSFER_SRC
                | BufferUsage::TRANSFER_DST
                | BufferUsage::DEVICE_ADDRESS,
            MemoryProperties::DEVICE_LOCAL,
        )
    }

    /// Device-local buffer of `element_count` 32-bit indices
    pub fn allocate_index_buffer32(context: &GpuContext, element_count: u32) -> Result<Self> {
        Self::allocate(
            context,
            element_count as u64 * std::mem::size_of::<u32>() as u64,
            std::mem::size_of::<u32>() as u64,
            BufferUsage::INDEX | BufferUsage::TRANSFER_DST,
            MemoryProperties::DEVICE_LOCAL,
        )
    }

    /// Host-visible transfer buffer
    pub fn allocate_staging(context: &GpuContext, size: u64) -> Result<Self> {
        Self::allocate(
            context,
            size,
            1,
            BufferUsage::TRANSFER_SRC | BufferUsage::TRANSFER_DST,
            MemoryProperties::HOST_VISIBLE | MemoryProperties::HOST_COHERENT,
        )
    }

    /// Size in bytes as requested
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Size in bytes of the underlying allocation
    pub fn allocated_size(&self) -> u64 {
        self.allocated_size
    }

    pub fn usage(&self) -> BufferUsage {
        self.usage
    }

    pub fn memory_properties(&self) -> MemoryProperties {
        self.memory
    }

    pub fn is_host_visible(&self) -> bool {
        self.memory.contains(MemoryProperties::HOST_VISIBLE)
    }

    /// GPU virtual address (address-capable buffers only)
    pub fn device_address(&self) -> Option<u64> {
        self.device_address
    }

    pub fn backend(&self) -> &dyn BackendBuffer {
        self.backend.as_ref()
    }

    /// Copy `data` into the buffer at `offset`. Host-visible buffers only.
    pub fn write_data(&self, data: &[u8], offset: u64) -> Result<()> {
        self.check_host_access(offset, data.len() as u64)?;
        self.backend.write(offset, data)
    }

    /// Fill `out` from the buffer at `offset`. Host-visible buffers only.
    pub fn read_data(&self, out: &mut [u8], offset: u64) -> Result<()> {
        self.check_host_access(offset, out.len() as u64)?;
        self.backend.read(offset, out)
    }

    /// Fail unless `[offset, offset + len)` lies inside the buffer
    pub fn check_range(&self, offset: u64, len: u64) -> Result<()> {
        match offset.checked_add(len) {
            Some(end) if end <= self.size => Ok(()),
            _ => Err(Error::InvalidResource(format!(
                "range {}..+{} outside buffer of {} bytes",
                offset, len, self.size
            ))),
        }
    }

    fn check_host_access(&self, offset: u64, len: u64) -> Result<()> {
        if !self.is_host_visible() {
            return Err(Error::InvalidResource(
                "buffer is not host-visible".to_string(),
            ));
        }
        self.check_range(offset, len)
    }
}

#[cfg(test)]
#[path = "buffer_tests.rs"]
mod tests;
