/// Pipeline - graphics pipeline for single-color + optional-depth dynamic rendering
///
/// Pipelines with the same push constant size share a pipeline layout. The
/// layout always includes the global descriptor set.

use crate::error::{Error, Result};
use crate::device::backend::BackendPipeline;
use crate::device::context::GpuContext;
use crate::device::shader::Shader;
use crate::device::types::{clamp_sample_count, ColorFormat, DepthFormat, SampleCount};

// ===== RASTERIZATION ENUMS =====

/// Face culling mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CullMode {
    /// No culling
    None,
    /// Cull front faces
    Front,
    /// Cull back faces
    Back,
    /// Cull everything
    FrontAndBack,
}

/// Front face winding order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrontFace {
    CounterClockwise,
    Clockwise,
}

/// Polygon rendering mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolygonMode {
    Fill,
    /// Wireframe
    Line,
    Point,
}

/// Comparison operator for depth tests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Never,
    Less,
    Equal,
    LessOrEqual,
    Greater,
    NotEqual,
    GreaterOrEqual,
    Always,
}

// ===== COLOR BLEND ENUMS =====

/// Blend factor for color blending equations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    DstColor,
    OneMinusDstColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
}

/// Blend operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendOp {
    /// result = src * srcFactor + dst * dstFactor
    Add,
    /// result = src * srcFactor - dst * dstFactor
    Subtract,
    /// result = dst * dstFactor - src * srcFactor
    ReverseSubtract,
    Min,
    Max,
}

/// Color blending of the single color attachment
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlendState {
    pub enable: bool,
    pub src_color_factor: BlendFactor,
    pub dst_color_factor: BlendFactor,
    pub color_op: BlendOp,
    pub src_alpha_factor: BlendFactor,
    pub dst_alpha_factor: BlendFactor,
    pub alpha_op: BlendOp,
}

impl Default for BlendState {
    fn default() -> Self {
        Self {
            enable: false,
            src_color_factor: BlendFactor::One,
            dst_color_factor: BlendFactor::Zero,
            color_op: BlendOp::Add,
            src_alpha_factor: BlendFactor::One,
            dst_alpha_factor: BlendFactor::Zero,
            alpha_op: BlendOp::Add,
        }
    }
}

impl BlendState {
    /// Standard "over" alpha blending
    pub fn alpha_blending() -> Self {
        Self {
            enable: true,
            src_color_factor: BlendFactor::SrcAlpha,
            dst_color_factor: BlendFactor::OneMinusSrcAlpha,
            color_op: BlendOp::Add,
            src_alpha_factor: BlendFactor::One,
            dst_alpha_factor: BlendFactor::OneMinusSrcAlpha,
            alpha_op: BlendOp::Add,
        }
    }
}

/// Graphics pipeline description
#[derive(Clone)]
pub struct PipelineCreateInfo<'a> {
    pub shaders: Vec<&'a Shader>,
    pub color_format: ColorFormat,
    /// Write the color attachment (false for depth-only pipelines)
    pub render_color: bool,
    pub depth_format: DepthFormat,
    pub cull_mode: CullMode,
    pub front_face: FrontFace,
    pub polygon_mode: PolygonMode,
    pub depth_compare_op: CompareOp,
    pub line_width: f32,
    pub sample_count: SampleCount,
    pub sample_shading: bool,
    pub min_sample_shading: f32,
    pub depth_test: bool,
    pub depth_write: bool,
    pub blend: BlendState,
}

impl Default for PipelineCreateInfo<'_> {
    fn default() -> Self {
        Self {
            shaders: Vec::new(),
            color_format: ColorFormat::Rgba16,
            render_color: true,
            depth_format: DepthFormat::D16Unorm,
            cull_mode: CullMode::Back,
            front_face: FrontFace::Clockwise,
            polygon_mode: PolygonMode::Fill,
            depth_compare_op: CompareOp::Less,
            line_width: 1.0,
            sample_count: SampleCount::X1,
            sample_shading: false,
            min_sample_shading: 1.0,
            depth_test: false,
            depth_write: false,
            blend: BlendState::default(),
        }
    }
}

/// Graphics pipeline
pub struct Pipeline {
    backend: Box<dyn BackendPipeline>,
    push_constant_size: u32,
    color_format: ColorFormat,
    depth_format: DepthFormat,
    sample_count: SampleCount,
}

impl Pipeline {
    /// Build a pipeline. The sample count is clamped to what the device
    /// supports, the push constant size is the largest of the shaders.
    pub fn new(context: &GpuContext, info: &PipelineCreateInfo<'_>) -> Result<Self> {
        if info.shaders.is_empty() {
            return Err(Error::InvalidResource(
                "pipeline needs at least one shader".to_string(),
            ));
        }

        let push_constant_size = Shader::merged_push_constant_size(&info.shaders);
        let max_push_constants = context.properties().max_push_constants_size;
        if push_constant_size > max_push_constants {
            return Err(Error::InvalidResource(format!(
                "push constant block of {} bytes exceeds device limit of {}",
                push_constant_size, max_push_constants
            )));
        }

        let sample_count = clamp_sample_count(
            info.sample_count.as_u32(),
            context.properties().sample_counts,
        );
        let mut clamped = info.clone();
        clamped.sample_count = sample_count;

        let backend = context.backend().create_pipeline(&clamped, push_constant_size)?;

        Ok(Self {
            backend,
            push_constant_size,
            color_format: info.color_format,
            depth_format: info.depth_format,
            sample_count,
        })
    }

    pub fn push_constant_size(&self) -> u32 {
        self.push_constant_size
    }

    pub fn color_format(&self) -> ColorFormat {
        self.color_format
    }

    pub fn depth_format(&self) -> DepthFormat {
        self.depth_format
    }

    pub fn sample_count(&self) -> SampleCount {
        self.sample_count
    }

    pub fn backend(&self) -> &dyn BackendPipeline {
        self.backend.as_ref()
    }
}
