/// Per-draw push constant block shared by every shader of the frame layer
///
/// Shaders read their geometry and material data from the global descriptor
/// arrays, indexed by the buffer slots carried here. An unset buffer is
/// passed as `u32::MAX`.

use bytemuck::{Pod, Zeroable};
use glam::Mat4;

use crate::device::types::BufferId;

/// Push constant block (96 bytes, std430-compatible)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct PushConstants {
    pub model: Mat4,
    pub vertices: u32,
    pub material: u32,
    pub instances: u32,
    pub buff1: u32,
    pub buff2: u32,
    pub buff3: u32,
    pub _pad: [u32; 2],
}

impl PushConstants {
    /// Size in bytes a pipeline must declare to receive the block
    pub const SIZE: u32 = std::mem::size_of::<PushConstants>() as u32;

    pub fn new(
        model: Mat4,
        vertices: BufferId,
        material: BufferId,
        instances: BufferId,
        aux: [BufferId; 3],
    ) -> Self {
        Self {
            model,
            vertices: shader_index(vertices),
            material: shader_index(material),
            instances: shader_index(instances),
            buff1: shader_index(aux[0]),
            buff2: shader_index(aux[1]),
            buff3: shader_index(aux[2]),
            _pad: [0; 2],
        }
    }
}

impl Default for PushConstants {
    fn default() -> Self {
        let none = BufferId::INVALID;
        Self::new(Mat4::IDENTITY, none, none, none, [none; 3])
    }
}

/// Index of a buffer in the global descriptor arrays
pub fn shader_index(id: BufferId) -> u32 {
    if id.is_valid() {
        id.slot()
    } else {
        u32::MAX
    }
}
