/// Shared device types: handles, formats, layouts, usage flags, engine constants

use bitflags::bitflags;

crate::define_handle! {
    /// Handle of a buffer owned by the device buffer table.
    ///
    /// Shaders see `slot()`: the index into the global storage/uniform
    /// buffer arrays.
    pub struct BufferId;
}

crate::define_handle! {
    /// Handle of an image owned by the device image table.
    ///
    /// Shaders see `slot()`: the index into the global image sampler array.
    pub struct ImageId;
}

/// A graphics queue of the device, by index within the graphics family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Queue(u32);

impl Queue {
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    pub fn index(self) -> u32 {
        self.0
    }
}

// ===== ENGINE CONSTANTS =====

/// Descriptor binding of the global storage buffer array
pub const STORAGE_BUFFER_BINDING: u32 = 0;

/// Descriptor binding of the global uniform buffer array
pub const UNIFORM_BUFFER_BINDING: u32 = 1;

/// Descriptor binding of the global combined image sampler array
pub const IMAGE_SAMPLER_BINDING: u32 = 2;

/// Upper bound applied by [`clamp_sample_count`]
pub const MAX_SAMPLE_COUNT: u32 = 8;

/// Color format of render targets
pub const COLOR_FORMAT: ColorFormat = ColorFormat::Rgba16;

/// Depth format of render targets
pub const DEPTH_FORMAT: DepthFormat = DepthFormat::D32Sfloat;

/// Device features that must be enabled or device creation fails
pub const REQUIRED_FEATURES: [&str; 8] = [
    "BufferDeviceAddress",
    "DynamicRendering",
    "Synchronization2",
    "DescriptorBindingUniformBufferUpdateAfterBind",
    "DescriptorBindingSampledImageUpdateAfterBind",
    "DescriptorBindingStorageBufferUpdateAfterBind",
    "DescriptorBindingPartiallyBound",
    "RuntimeDescriptorArray",
];

// ===== GEOMETRY =====

/// 2D extent in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Extent2D {
    pub width: u32,
    pub height: u32,
}

impl Extent2D {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Number of pixels
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// 2D offset in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Offset2D {
    pub x: i32,
    pub y: i32,
}

impl Offset2D {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// 2D rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect2D {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect2D {
    /// Rectangle at the origin covering `extent`
    pub fn from_extent(extent: Extent2D) -> Self {
        Self { x: 0, y: 0, width: extent.width, height: extent.height }
    }

    pub fn offset(&self) -> Offset2D {
        Offset2D::new(self.x, self.y)
    }

    pub fn extent(&self) -> Extent2D {
        Extent2D::new(self.width, self.height)
    }
}

/// Viewport dimensions and depth range
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    /// Viewport covering `rect` with the full [0, 1] depth range
    pub fn from_rect(rect: Rect2D) -> Self {
        Self {
            x: rect.x as f32,
            y: rect.y as f32,
            width: rect.width as f32,
            height: rect.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

// ===== FORMATS =====

/// Pixel formats understood by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(non_camel_case_types)]
pub enum Format {
    Undefined,
    R8G8B8A8_UNORM,
    R8G8B8A8_SRGB,
    B8G8R8A8_UNORM,
    B8G8R8A8_SRGB,
    R16G16B16A16_SFLOAT,
    R32G32B32A32_SFLOAT,
    D16_UNORM,
    D24_UNORM_S8_UINT,
    D32_SFLOAT,
}

impl Format {
    /// Bytes per pixel (0 for `Undefined`)
    pub fn pixel_size(self) -> u64 {
        match self {
            Format::Undefined => 0,
            Format::R8G8B8A8_UNORM
            | Format::R8G8B8A8_SRGB
            | Format::B8G8R8A8_UNORM
            | Format::B8G8R8A8_SRGB => 4,
            Format::R16G16B16A16_SFLOAT => 8,
            Format::R32G32B32A32_SFLOAT => 16,
            Format::D16_UNORM => 2,
            Format::D24_UNORM_S8_UINT => 4,
            Format::D32_SFLOAT => 4,
        }
    }

    pub fn is_depth(self) -> bool {
        matches!(self, Format::D16_UNORM | Format::D24_UNORM_S8_UINT | Format::D32_SFLOAT)
    }

    pub fn has_stencil(self) -> bool {
        matches!(self, Format::D24_UNORM_S8_UINT)
    }

    /// Aspect mask matching this format's family
    pub fn aspect(self) -> ImageAspect {
        if self.has_stencil() {
            ImageAspect::DEPTH | ImageAspect::STENCIL
        } else if self.is_depth() {
            ImageAspect::DEPTH
        } else {
            ImageAspect::COLOR
        }
    }
}

/// Color attachment formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ColorFormat {
    Rgba8,
    #[default]
    Rgba16,
    /// 32-bit float per channel
    Hdr,
}

impl ColorFormat {
    pub fn format(self) -> Format {
        match self {
            ColorFormat::Rgba8 => Format::R8G8B8A8_UNORM,
            ColorFormat::Rgba16 => Format::R16G16B16A16_SFLOAT,
            ColorFormat::Hdr => Format::R32G32B32A32_SFLOAT,
        }
    }
}

/// Depth attachment formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DepthFormat {
    #[default]
    D16Unorm,
    D24UnormS8Uint,
    D32Sfloat,
}

impl DepthFormat {
    pub fn format(self) -> Format {
        match self {
            DepthFormat::D16Unorm => Format::D16_UNORM,
            DepthFormat::D24UnormS8Uint => Format::D24_UNORM_S8_UINT,
            DepthFormat::D32Sfloat => Format::D32_SFLOAT,
        }
    }
}

/// Image layouts the engine transitions between
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ImageLayout {
    #[default]
    Undefined,
    General,
    ColorAttachment,
    DepthAttachment,
    DepthReadOnly,
    ShaderReadOnly,
    TransferSrc,
    TransferDst,
    PresentSrc,
}

// ===== FLAGS =====

bitflags! {
    /// How a buffer is used
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        const UNIFORM = 1 << 0;
        const STORAGE = 1 << 1;
        const INDEX = 1 << 2;
        const TRANSFER_SRC = 1 << 3;
        const TRANSFER_DST = 1 << 4;
        const DEVICE_ADDRESS = 1 << 5;
    }
}

bitflags! {
    /// Memory properties requested for an allocation
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MemoryProperties: u32 {
        const DEVICE_LOCAL = 1 << 0;
        const HOST_VISIBLE = 1 << 1;
        const HOST_COHERENT = 1 << 2;
    }
}

bitflags! {
    /// How an image is used
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ImageUsage: u32 {
        const TRANSFER_SRC = 1 << 0;
        const TRANSFER_DST = 1 << 1;
        const SAMPLED = 1 << 2;
        const STORAGE = 1 << 3;
        const COLOR_ATTACHMENT = 1 << 4;
        const DEPTH_STENCIL_ATTACHMENT = 1 << 5;
    }
}

bitflags! {
    /// Image aspects touched by barriers and copies
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ImageAspect: u32 {
        const COLOR = 1 << 0;
        const DEPTH = 1 << 1;
        const STENCIL = 1 << 2;
    }
}

bitflags! {
    /// Set of sample counts (same bit values as Vulkan)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SampleCounts: u32 {
        const X1 = 1;
        const X2 = 2;
        const X4 = 4;
        const X8 = 8;
        const X16 = 16;
        const X32 = 32;
        const X64 = 64;
    }
}

// ===== MULTISAMPLING =====

/// MSAA sample count
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum SampleCount {
    #[default]
    X1 = 1,
    X2 = 2,
    X4 = 4,
    X8 = 8,
}

impl SampleCount {
    /// Number of samples
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// Exact conversion (`None` for counts the engine does not use)
    pub fn from_u32(count: u32) -> Option<Self> {
        match count {
            1 => Some(SampleCount::X1),
            2 => Some(SampleCount::X2),
            4 => Some(SampleCount::X4),
            8 => Some(SampleCount::X8),
            _ => None,
        }
    }

    /// Flag of this count within a [`SampleCounts`] set
    pub fn flag(self) -> SampleCounts {
        SampleCounts::from_bits_truncate(self as u32)
    }

    /// Whether rendering with this count needs a resolve
    pub fn is_multisampled(self) -> bool {
        self != SampleCount::X1
    }
}

/// Round `requested` down to the nearest count present in `supported`,
/// never exceeding [`MAX_SAMPLE_COUNT`].
///
/// A request of 0 is treated as 1. Single sampling is assumed to always be
/// supported, so the result is `X1` when nothing larger fits.
pub fn clamp_sample_count(requested: u32, supported: SampleCounts) -> SampleCount {
    let limit = requested.clamp(1, MAX_SAMPLE_COUNT);
    [SampleCount::X8, SampleCount::X4, SampleCount::X2]
        .into_iter()
        .find(|count| count.as_u32() <= limit && supported.contains(count.flag()))
        .unwrap_or(SampleCount::X1)
}

/// Highest engine sample count contained in `supported`
pub fn max_sample_count(supported: SampleCounts) -> SampleCount {
    clamp_sample_count(MAX_SAMPLE_COUNT, supported)
}

// ===== RENDERING =====

/// Attachment load operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadOp {
    Load,
    Clear,
    DontCare,
}

/// Attachment store operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Store,
    DontCare,
}

/// Presentation modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PresentMode {
    Immediate,
    Mailbox,
    #[default]
    Fifo,
    FifoRelaxed,
}

/// Texel filtering for magnification, minification and mip selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Filter {
    Nearest,
    #[default]
    Linear,
}

/// Behavior of texture coordinates outside [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SamplerAddressMode {
    #[default]
    Repeat,
    MirroredRepeat,
    ClampToEdge,
    /// Opaque black outside the image
    ClampToBorder,
}

#[cfg(test)]
#[path = "types_tests.rs"]
mod tests;
