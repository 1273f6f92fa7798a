//! Shader modules and the HLSL compilation driver.
//!
//! # Overview
//!
//! - [`ShaderProfile`] is a DXC target profile (`vs_6_0`, `ps_6_0`) and
//!   determines the pipeline stage.
//! - [`ShaderCompiler`] compiles HLSL in-process through the DXC library and
//!   returns SPIR-V words. Files that are already `.spv` are read directly.
//! - [`Shader`] wraps a `VkShaderModule` with its stage and entry point.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::path::Path;
//! use lumen_rhi::device::Device;
//! use lumen_rhi::shader::{Shader, ShaderCompiler, ShaderProfile};
//!
//! # fn example(device: Arc<Device>) -> Result<(), lumen_rhi::RhiError> {
//! let compiler = ShaderCompiler::new();
//! let profile: ShaderProfile = "vs_6_0".parse()?;
//! let words = compiler.compile(Path::new("shaders/Object3D.VS.hlsl"), profile)?;
//! let vertex_shader = Shader::from_spirv_words(device, &words, profile.stage(), "main")?;
//! # Ok(())
//! # }
//! ```

use std::ffi::CString;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use ash::vk;
use hassle_rs::compile_hlsl;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub fn to_vk_stage(self) -> vk::ShaderStageFlags {
        match self {
            ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
        }
    }
}

impl std::fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// DXC target profile.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderProfile {
    /// `vs_6_0`
    Vertex6_0,
    /// `ps_6_0`
    Pixel6_0,
}

impl ShaderProfile {
    pub fn as_str(self) -> &'static str {
        match self {
            ShaderProfile::Vertex6_0 => "vs_6_0",
            ShaderProfile::Pixel6_0 => "ps_6_0",
        }
    }

    pub fn stage(self) -> ShaderStage {
        match self {
            ShaderProfile::Vertex6_0 => ShaderStage::Vertex,
            ShaderProfile::Pixel6_0 => ShaderStage::Fragment,
        }
    }
}

impl FromStr for ShaderProfile {
    type Err = RhiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vs_6_0" => Ok(ShaderProfile::Vertex6_0),
            "ps_6_0" => Ok(ShaderProfile::Pixel6_0),
            other => Err(RhiError::ShaderError(format!(
                "Unsupported shader profile '{}'",
                other
            ))),
        }
    }
}

impl std::fmt::Display for ShaderProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// In-process DXC driver targeting SPIR-V.
///
/// Includes resolve against the directory of the compiled file plus any
/// directories added with [`ShaderCompiler::include_dir`].
#[derive(Debug, Clone, Default)]
pub struct ShaderCompiler {
    include_dirs: Vec<PathBuf>,
}

impl ShaderCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn include_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.include_dirs.push(dir.into());
        self
    }

    /// Compiles `path` for `profile` and returns SPIR-V words.
    ///
    /// `.spv` inputs skip the compiler.
    ///
    /// # Errors
    ///
    /// [`RhiError::ShaderError`] if the source cannot be read, the DXC
    /// library cannot be loaded, or compilation fails. Compiler
    /// diagnostics are carried in the message.
    pub fn compile(&self, path: &Path, profile: ShaderProfile) -> RhiResult<Vec<u32>> {
        info!("Begin compile shader, path: {}, profile: {}", path.display(), profile);

        if path.extension().is_some_and(|ext| ext == "spv") {
            let bytes = std::fs::read(path).map_err(|e| {
                RhiError::ShaderError(format!("Failed to read shader file {:?}: {}", path, e))
            })?;
            let words = spirv_words(&bytes)?;
            info!("Loaded precompiled shader, path: {}", path.display());
            return Ok(words);
        }

        let source = std::fs::read_to_string(path).map_err(|e| {
            RhiError::ShaderError(format!("Failed to read shader file {:?}: {}", path, e))
        })?;

        let include_dirs = self.search_dirs(path);
        let args = dxc_arguments(&include_dirs);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let source_name = path
            .file_name()
            .map(|name| name.to_string_lossy())
            .unwrap_or_default();

        let bytes = compile_hlsl(&source_name, &source, "main", profile.as_str(), &args, &[])
            .map_err(|e| {
                RhiError::ShaderError(format!("{} ({}): {}", path.display(), profile, e))
            })?;

        let words = spirv_words(&bytes)?;
        info!(
            "Compile succeeded, path: {}, profile: {}, {} words",
            path.display(),
            profile,
            words.len()
        );
        Ok(words)
    }

    fn search_dirs(&self, path: &Path) -> Vec<PathBuf> {
        path.parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .into_iter()
            .chain(self.include_dirs.iter().cloned())
            .collect()
    }
}

/// Compiler flags: SPIR-V output with embedded debug info and no
/// optimization, followed by one `-I` per include directory.
fn dxc_arguments(include_dirs: &[PathBuf]) -> Vec<String> {
    let mut args: Vec<String> = ["-spirv", "-Zi", "-Qembed_debug", "-Od"]
        .into_iter()
        .map(String::from)
        .collect();
    for dir in include_dirs {
        args.push("-I".to_string());
        args.push(dir.to_string_lossy().into_owned());
    }
    args
}

fn spirv_words(bytes: &[u8]) -> RhiResult<Vec<u32>> {
    if !bytes.len().is_multiple_of(4) {
        return Err(RhiError::ShaderError(format!(
            "SPIR-V code must be 4-byte aligned, got {} bytes",
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

/// `VkShaderModule` with its stage and entry point.
pub struct Shader {
    device: Arc<Device>,
    module: vk::ShaderModule,
    stage: ShaderStage,
    entry_point: CString,
}

impl Shader {
    /// # Errors
    ///
    /// Returns an error if the entry point contains a nul byte or module
    /// creation fails.
    pub fn from_spirv_words(
        device: Arc<Device>,
        code: &[u32],
        stage: ShaderStage,
        entry_point: &str,
    ) -> RhiResult<Self> {
        let entry_point = CString::new(entry_point)
            .map_err(|e| RhiError::ShaderError(format!("Invalid entry point name: {}", e)))?;

        let create_info = vk::ShaderModuleCreateInfo::default().code(code);
        let module = unsafe { device.handle().create_shader_module(&create_info, None)? };

        info!(
            "Created {} shader module with entry point {:?}",
            stage, entry_point
        );

        Ok(Self {
            device,
            module,
            stage,
            entry_point,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }

    #[inline]
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    /// Must not outlive `self`.
    pub fn stage_create_info(&self) -> vk::PipelineShaderStageCreateInfo<'_> {
        vk::PipelineShaderStageCreateInfo::default()
            .stage(self.stage.to_vk_stage())
            .module(self.module)
            .name(&self.entry_point)
    }
}

impl Drop for Shader {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_shader_module(self.module, None);
        }
        debug!("Destroyed {} shader module", self.stage);
    }
}
