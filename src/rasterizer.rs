//! Interface to off-screen rasterizers bound to a graphics context.

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tracing::debug;

use rasterize_pools::ResourceFactory;

/// Number of channels in a rendered pixel (RGBA).
pub const PIXEL_CHANNELS: usize = 4;

/// Error type reported by rasterizers and their backends.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RasterizerError {
    /// Graphics context could not be created or made current.
    #[error("Unable to create rendering context: {0}")]
    ContextCreation(String),
    /// Shader program could not be compiled or linked.
    #[error("Unable to compile shader program: {0}")]
    ShaderCompilation(String),
    /// Shader program has no uniform or storage block with this name.
    #[error("Shader program has no variable named '{0}'")]
    UnknownVariable(String),
    /// Output buffer does not match render target dimensions.
    #[error("Output buffer holds {actual} values, render target needs {expected}")]
    OutputSize {
        /// Number of values required by the render target.
        expected: usize,
        /// Size of the provided buffer.
        actual: usize,
    },
    /// Graphics context was lost, the rasterizer can't be used anymore.
    #[error("Rendering context lost: {0}")]
    ContextLost(String),
    /// Any other error reported by the graphics API.
    #[error("Graphics API error: {0}")]
    Graphics(String),
}

impl RasterizerError {
    /// Check whether the rasterizer that reported this error must not be reused.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ContextLost(_))
    }
}

/// Off-screen rasterizer owning a graphics context and a compiled shader program.
///
/// Rasterizers are not thread-safe in use; they may only be moved between threads.
pub trait Rasterizer: Send {
    /// Bind a flattened matrix to a named uniform.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the name is not known to the compiled program.
    fn set_uniform_matrix(
        &mut self,
        name: &str,
        num_columns: usize,
        num_rows: usize,
        transpose: bool,
        matrix: &[f32],
    ) -> Result<(), RasterizerError>;

    /// Upload a flat buffer to a named shader storage block.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the name is not known to the compiled program.
    fn set_shader_storage_buffer(&mut self, name: &str, data: &[f32]) -> Result<(), RasterizerError>;

    /// Draw `num_points` primitives, wait for completion and read back the pixels.
    ///
    /// `result` must hold exactly `width * height * 4` values.
    ///
    /// # Errors
    ///
    /// Returns `Err` on any graphics API error, or if `result` has the wrong size.
    fn render(&mut self, num_points: u32, result: &mut [f32]) -> Result<(), RasterizerError>;
}

/// Source of new rasterizers, usually wrapping a windowing or EGL library.
pub trait RasterizerBackend: Send + Sync {
    /// Rasterizer type built by this backend.
    type Rasterizer: Rasterizer;

    /// Create a context, compile the shader program and allocate the render target.
    ///
    /// # Errors
    ///
    /// Returns `Err` if context creation or shader compilation failed.
    fn create(&self, settings: &RasterizerSettings) -> Result<Self::Rasterizer, RasterizerError>;
}

/// Shader program sources.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
#[non_exhaustive]
pub struct ShaderSources {
    /// Vertex shader.
    pub vertex: String,
    /// Geometry shader. Empty source means no geometry stage.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "ShaderSources::deserialize_geometry"
    )]
    pub geometry: Option<String>,
    /// Fragment shader.
    pub fragment: String,
}

impl ShaderSources {
    /// Create shader sources without a geometry stage.
    #[must_use]
    pub fn new(vertex: impl Into<String>, fragment: impl Into<String>) -> Self {
        Self {
            vertex: vertex.into(),
            geometry: None,
            fragment: fragment.into(),
        }
    }

    /// Add a geometry stage.
    #[must_use]
    pub fn with_geometry(mut self, geometry: impl Into<String>) -> Self {
        self.geometry = Some(geometry.into());
        self.normalized()
    }

    fn normalized(mut self) -> Self {
        self.geometry = self.geometry.filter(|geometry| !geometry.is_empty());
        self
    }

    fn deserialize_geometry<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let geometry = Option::<String>::deserialize(deserializer)?;
        Ok(geometry.filter(|geometry| !geometry.is_empty()))
    }
}

/// Values the render target is cleared to before drawing.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
#[non_exhaustive]
pub struct ClearValues {
    /// Red channel.
    #[serde(default)]
    pub red: f32,
    /// Green channel.
    #[serde(default)]
    pub green: f32,
    /// Blue channel.
    #[serde(default)]
    pub blue: f32,
    /// Depth buffer.
    #[serde(default = "ClearValues::default_depth")]
    pub depth: f32,
}

impl Default for ClearValues {
    fn default() -> Self {
        Self {
            red: 0.0,
            green: 0.0,
            blue: 0.0,
            depth: Self::default_depth(),
        }
    }
}

impl ClearValues {
    /// Default value for [`Self::depth`].
    #[must_use]
    #[inline]
    fn default_depth() -> f32 {
        1.0
    }

    /// Create clear values with custom color and default depth.
    #[must_use]
    pub fn color(red: f32, green: f32, blue: f32) -> Self {
        Self {
            red,
            green,
            blue,
            ..Self::default()
        }
    }
}

/// Everything a backend needs to build a rasterizer.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub struct RasterizerSettings {
    /// Render target width in pixels.
    pub width: usize,
    /// Render target height in pixels.
    pub height: usize,
    /// Shader program sources.
    pub shaders: ShaderSources,
    /// Clear values.
    pub clear: ClearValues,
}

impl RasterizerSettings {
    /// Create rasterizer settings.
    #[must_use]
    pub fn new(width: usize, height: usize, shaders: ShaderSources, clear: ClearValues) -> Self {
        Self {
            width,
            height,
            shaders: shaders.normalized(),
            clear,
        }
    }

    /// Number of values in a single rendered image.
    #[must_use]
    pub fn image_size(&self) -> usize {
        self.width * self.height * PIXEL_CHANNELS
    }

    /// Check that an output buffer matches the render target.
    ///
    /// # Errors
    ///
    /// Returns [`RasterizerError::OutputSize`] if sizes differ.
    pub fn check_output(&self, result: &[f32]) -> Result<(), RasterizerError> {
        let expected = self.image_size();
        if result.len() == expected {
            Ok(())
        } else {
            Err(RasterizerError::OutputSize {
                expected,
                actual: result.len(),
            })
        }
    }
}

/// Pool factory building rasterizers from fixed settings.
#[derive(Debug)]
pub struct RasterizerManager<B> {
    backend: B,
    settings: RasterizerSettings,
}

impl<B: RasterizerBackend> RasterizerManager<B> {
    /// Bundle backend with rasterizer settings.
    pub fn new(backend: B, settings: RasterizerSettings) -> Self {
        Self { backend, settings }
    }

    /// Rasterizer settings.
    pub fn settings(&self) -> &RasterizerSettings {
        &self.settings
    }

    /// Rasterizer backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }
}

impl<B: RasterizerBackend> ResourceFactory for RasterizerManager<B> {
    type Resource = B::Rasterizer;
    type Error = RasterizerError;

    fn create(&self) -> Result<Self::Resource, Self::Error> {
        debug!(
            width = self.settings.width,
            height = self.settings.height,
            "creating rasterizer"
        );
        self.backend.create(&self.settings)
    }
}
