#![doc = include_str!("../README.md")]
#![forbid(unsafe_code)]
#![deny(elided_lifetimes_in_paths, unreachable_pub)]
#![warn(missing_docs)]

mod config;
mod errors;
mod logging;
mod op;
mod rasterizer;
mod tensor;
mod util;
mod variable;

pub use rasterize_pools as pools;

pub use self::{
    config::{ConfigError, OutputResolution, PoolConfig, RasterizeConfig, RasterizeConfigBuilder},
    errors::RasterizeError,
    logging::{
        LogFormat, LogLevel, LogOutput, LogRegistry, LogRotation, LogSink, LoggingConfig,
        LoggingError, LoggingGuard,
    },
    op::{RasterizeOp, RasterizerPool},
    rasterizer::{
        ClearValues, Rasterizer, RasterizerBackend, RasterizerError, RasterizerManager,
        RasterizerSettings, ShaderSources, PIXEL_CHANNELS,
    },
    tensor::{DType, Tensor, TensorData, TensorError, TensorShape},
    variable::{VariableKind, VariableSpec},
};
