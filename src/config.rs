//! Operation configuration structures.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    logging::LoggingConfig,
    rasterizer::{ClearValues, RasterizerSettings, ShaderSources},
};

/// Root container for rasterize operation configuration.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[non_exhaustive]
pub struct RasterizeConfig {
    /// Size of rendered images.
    pub output_resolution: OutputResolution,
    /// Values the render target is cleared to.
    #[serde(default)]
    pub clear: ClearValues,
    /// Shader program sources.
    pub shaders: ShaderSources,
    /// Names of shader variables, in input order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variable_names: Vec<String>,
    /// Kinds of shader variables (`mat` or `buffer`), matching [`Self::variable_names`].
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variable_kinds: Vec<String>,
    /// Rasterizer pool configuration.
    #[serde(default)]
    pub pool: PoolConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl RasterizeConfig {
    /// Create configuration with no variables.
    #[must_use]
    pub fn new(width: usize, height: usize, shaders: ShaderSources) -> Self {
        Self {
            output_resolution: OutputResolution { width, height },
            clear: ClearValues::default(),
            shaders,
            variable_names: Vec::new(),
            variable_kinds: Vec::new(),
            pool: PoolConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Create builder for loading configuration from files and environment.
    pub fn builder() -> RasterizeConfigBuilder {
        RasterizeConfigBuilder::new()
    }

    /// Declare a shader variable.
    pub fn with_variable(&mut self, name: impl ToString, kind: impl ToString) -> &mut Self {
        self.variable_names.push(name.to_string());
        self.variable_kinds.push(kind.to_string());
        self
    }

    /// Set clear values.
    pub fn with_clear(&mut self, clear: ClearValues) -> &mut Self {
        self.clear = clear;
        self
    }

    /// Set pool configuration.
    pub fn with_pool(&mut self, pool: PoolConfig) -> &mut Self {
        self.pool = pool;
        self
    }

    /// Settings used to build each pooled rasterizer.
    #[must_use]
    pub fn rasterizer_settings(&self) -> RasterizerSettings {
        RasterizerSettings::new(
            self.output_resolution.width,
            self.output_resolution.height,
            self.shaders.clone(),
            self.clear,
        )
    }
}

/// Size of rendered images in pixels.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[non_exhaustive]
pub struct OutputResolution {
    /// Image width.
    pub width: usize,
    /// Image height.
    pub height: usize,
}

/// Rasterizer pool configuration.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[non_exhaustive]
pub struct PoolConfig {
    /// Pool name used in metrics and traces.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Maximum number of live rasterizers. Unbounded if not set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_size: Option<usize>,
    /// How long to wait for a free rasterizer when the pool is full.
    ///
    /// Wait indefinitely if not set.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "humantime_serde"
    )]
    pub acquire_timeout: Option<Duration>,
    /// Interval between gatherings of pool state metrics.
    #[serde(default = "PoolConfig::default_probe_interval", with = "humantime_serde")]
    pub probe_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            label: None,
            max_size: None,
            acquire_timeout: None,
            probe_interval: Self::default_probe_interval(),
        }
    }
}

impl PoolConfig {
    /// Default value for [`Self::probe_interval`].
    #[must_use]
    #[inline]
    fn default_probe_interval() -> Duration {
        Duration::from_secs(15)
    }

    /// Set maximum number of live rasterizers.
    #[must_use]
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = Some(max_size);
        self
    }

    /// Set acquisition timeout.
    #[must_use]
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = Some(timeout);
        self
    }

    /// Set pool name.
    #[must_use]
    pub fn with_label(mut self, label: impl ToString) -> Self {
        self.label = Some(label.to_string());
        self
    }
}

/// Error returned when configuration sources can't be read or parsed.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// Source is missing, malformed or doesn't match [`RasterizeConfig`].
    #[error("Unable to load rasterize configuration: {0}")]
    Load(#[from] config::ConfigError),
}

/// Layered loader for [`RasterizeConfig`].
///
/// Sources added later override values from earlier ones.
#[must_use]
#[derive(Default)]
pub struct RasterizeConfigBuilder {
    sources: config::ConfigBuilder<config::builder::DefaultState>,
}

impl RasterizeConfigBuilder {
    /// Create loader with no sources.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add any [`config::Source`], e.g. an in-memory YAML document.
    pub fn with_source<S>(self, source: S) -> Self
    where
        S: config::Source + Send + Sync + 'static,
    {
        Self {
            sources: self.sources.add_source(source),
        }
    }

    /// Add a configuration file. Format is guessed from the extension, which may be omitted.
    pub fn with_file(self, path: impl AsRef<str>) -> Self {
        self.with_source(config::File::with_name(path.as_ref()))
    }

    /// Add an optional configuration file, silently skipped if absent.
    pub fn with_optional_file(self, path: impl AsRef<str>) -> Self {
        self.with_source(config::File::with_name(path.as_ref()).required(false))
    }

    /// Add environment variables, e.g. `RASTERIZE__POOL__MAX_SIZE` for prefix `RASTERIZE`.
    pub fn with_env(self, prefix: impl AsRef<str>) -> Self {
        let env = config::Environment::with_prefix(prefix.as_ref())
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true);
        self.with_source(env)
    }

    /// Read all sources and deserialize the result.
    ///
    /// # Errors
    ///
    /// Returns `Err` if a required source can't be read, or if merged values don't form a
    /// valid configuration.
    pub fn build(self) -> Result<RasterizeConfig, ConfigError> {
        let merged = self.sources.build()?;
        Ok(merged.try_deserialize()?)
    }
}
