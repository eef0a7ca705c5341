/// Shader - compiled SPIR-V module with its push constant block size

use std::path::Path;

use crate::error::{Error, Result};
use crate::device::backend::{BackendShader, ShaderDesc};
use crate::device::context::GpuContext;
use crate::ignis_error;

/// Shader stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Compute,
}

/// Compiled shader module
pub struct Shader {
    backend: Box<dyn BackendShader>,
    stage: ShaderStage,
    push_constant_size: u32,
}

impl Shader {
    /// Create a shader from SPIR-V bytecode.
    ///
    /// `push_constant_size` overrides the size found by reflection; with
    /// neither, the shader uses no push constants.
    pub fn new(
        context: &GpuContext,
        code: &[u8],
        stage: ShaderStage,
        push_constant_size: Option<u32>,
    ) -> Result<Self> {
        if code.is_empty() || code.len() % 4 != 0 {
            return Err(Error::InvalidResource(format!(
                "SPIR-V code size must be a non-zero multiple of 4 (got {} bytes)",
                code.len()
            )));
        }

        let backend = context.backend().create_shader(&ShaderDesc { code, stage })?;
        let push_constant_size = push_constant_size
            .or_else(|| backend.reflected_push_constant_size())
            .unwrap_or(0);

        Ok(Self {
            backend,
            stage,
            push_constant_size,
        })
    }

    /// Load SPIR-V bytecode from `path` and create a shader from it
    pub fn from_file(
        context: &GpuContext,
        path: &Path,
        stage: ShaderStage,
        push_constant_size: Option<u32>,
    ) -> Result<Self> {
        let code = std::fs::read(path).map_err(|e| {
            ignis_error!("ignis::Shader", "Failed to read shader '{}': {}", path.display(), e);
            Error::InvalidResource(format!("cannot read shader '{}': {}", path.display(), e))
        })?;
        Self::new(context, &code, stage, push_constant_size)
    }

    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    /// Size in bytes of the push constant block
    pub fn push_constant_size(&self) -> u32 {
        self.push_constant_size
    }

    pub fn backend(&self) -> &dyn BackendShader {
        self.backend.as_ref()
    }

    /// Push constant size shared by a set of shaders (the largest block)
    pub fn merged_push_constant_size(shaders: &[&Shader]) -> u32 {
        shaders
            .iter()
            .map(|shader| shader.push_constant_size)
            .max()
            .unwrap_or(0)
    }
}
