//! Shader variables bound for every batch element.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
    errors::RasterizeError,
    rasterizer::{Rasterizer, RasterizerError},
    tensor::{DType, Tensor, TensorShape},
};

/// Kind of a shader variable.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableKind {
    /// Matrix uniform; values have trailing `(rows, cols)` dimensions.
    Mat,
    /// Shader storage buffer; values have one trailing dimension.
    Buffer,
}

impl VariableKind {
    /// Number of trailing value dimensions consumed by a single batch element.
    #[must_use]
    pub fn trailing_dims(self) -> usize {
        match self {
            Self::Mat => 2,
            Self::Buffer => 1,
        }
    }

    /// Tag used in configuration.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mat => "mat",
            Self::Buffer => "buffer",
        }
    }
}

impl fmt::Display for VariableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VariableKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mat" => Ok(Self::Mat),
            "buffer" => Ok(Self::Buffer),
            other => Err(other.to_string()),
        }
    }
}

/// Declared shader variable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VariableSpec {
    /// Name of the variable in the shader program.
    pub name: String,
    /// Variable kind.
    pub kind: VariableKind,
}

/// Per-element layout of a bound variable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Layout {
    Matrix { rows: usize, cols: usize },
    Buffer { len: usize },
}

impl Layout {
    fn element_len(self) -> usize {
        match self {
            Self::Matrix { rows, cols } => rows * cols,
            Self::Buffer { len } => len,
        }
    }
}

/// Variable resolved against its input tensor.
#[derive(Debug)]
pub(crate) struct BoundVariable<'a> {
    pub(crate) name: &'a str,
    pub(crate) layout: Layout,
    values: &'a [f32],
}

impl<'a> BoundVariable<'a> {
    /// Resolve a declared variable against an input value.
    ///
    /// Returns the bound variable and its batch shape.
    pub(crate) fn bind(
        spec: &'a VariableSpec,
        value: &'a Tensor,
    ) -> Result<(Self, TensorShape), RasterizeError> {
        let shape = value.shape();
        let unsupported = || RasterizeError::UnsupportedVariable {
            name: spec.name.clone(),
            kind: spec.kind,
            shape: shape.clone(),
            dtype: value.dtype(),
        };
        let values = match (spec.kind, value.dtype()) {
            (VariableKind::Mat | VariableKind::Buffer, DType::Float) => {
                value.as_f32().ok_or_else(unsupported)?
            }
            _ => return Err(unsupported()),
        };
        let (batch_shape, tail) =
            shape
                .split_last(spec.kind.trailing_dims())
                .ok_or_else(|| RasterizeError::VariableRank {
                    name: spec.name.clone(),
                    kind: spec.kind,
                    shape: shape.clone(),
                })?;
        let layout = match (spec.kind, tail) {
            (VariableKind::Mat, &[rows, cols]) => Layout::Matrix { rows, cols },
            (VariableKind::Buffer, &[len]) => Layout::Buffer { len },
            _ => return Err(unsupported()),
        };
        let bound = Self {
            name: &spec.name,
            layout,
            values,
        };
        Ok((bound, batch_shape))
    }

    /// Values belonging to a single batch element.
    pub(crate) fn element(&self, index: usize) -> &'a [f32] {
        let len = self.layout.element_len();
        &self.values[len * index..len * (index + 1)]
    }

    /// Upload values of a single batch element to the rasterizer.
    pub(crate) fn upload<R>(&self, rasterizer: &mut R, index: usize) -> Result<(), RasterizerError>
    where
        R: Rasterizer + ?Sized,
    {
        let values = self.element(index);
        match self.layout {
            // Values are row-major, GL expects column-major.
            Layout::Matrix { rows, cols } => {
                rasterizer.set_uniform_matrix(self.name, cols, rows, true, values)
            }
            Layout::Buffer { .. } => rasterizer.set_shader_storage_buffer(self.name, values),
        }
    }
}
