use thiserror::Error;

use crate::{
    rasterizer::RasterizerError,
    tensor::{DType, TensorError, TensorShape},
    variable::VariableKind,
};

/// Error type returned by [`RasterizeOp`](crate::RasterizeOp).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RasterizeError {
    /// Variable names and kinds lists differ in length.
    #[error("The variable names and kinds must have the same size: {names} names, {kinds} kinds")]
    KindCountMismatch {
        /// Number of variable names.
        names: usize,
        /// Number of variable kinds.
        kinds: usize,
    },
    /// Variable kind tag is not recognized.
    #[error("Unknown kind '{kind}' for variable with name='{name}', expected 'mat' or 'buffer'")]
    UnknownKind {
        /// Variable name.
        name: String,
        /// Unrecognized kind tag.
        kind: String,
    },
    /// Same variable name is declared more than once.
    #[error("Variable with name='{name}' is declared more than once")]
    DuplicateVariable {
        /// Variable name.
        name: String,
    },
    /// Output resolution has a zero dimension.
    #[error("Invalid output resolution {width}x{height}")]
    InvalidResolution {
        /// Requested width.
        width: usize,
        /// Requested height.
        height: usize,
    },
    /// Number of input values does not match declared variables.
    #[error("The variable names, kinds, and values must have the same size: {expected} declared, {actual} values")]
    ValueCountMismatch {
        /// Number of declared variables.
        expected: usize,
        /// Number of provided values.
        actual: usize,
    },
    /// Unsupported combination of variable kind and value type.
    #[error("Don't know how to handle variable with name='{name}', kind={kind}, shape={shape} and type={dtype}")]
    UnsupportedVariable {
        /// Variable name.
        name: String,
        /// Variable kind.
        kind: VariableKind,
        /// Value shape.
        shape: TensorShape,
        /// Value type.
        dtype: DType,
    },
    /// Value has fewer dimensions than its kind requires.
    #[error("Variable with name='{name}' and kind={kind} needs at least {} dimensions, got shape={shape}", kind.trailing_dims())]
    VariableRank {
        /// Variable name.
        name: String,
        /// Variable kind.
        kind: VariableKind,
        /// Value shape.
        shape: TensorShape,
    },
    /// Batch shapes of two variables differ.
    #[error("Incompatible batch shape for variable with name='{name}', batch shape={batch_shape}, expected {expected}")]
    IncompatibleBatchShape {
        /// Variable name.
        name: String,
        /// Batch shape of this variable.
        batch_shape: TensorShape,
        /// Batch shape established by preceding variables.
        expected: TensorShape,
    },
    /// Number of points is not a non-negative int32 scalar.
    #[error("num_points must be a non-negative int32 scalar, got shape={shape} and type={dtype}")]
    InvalidNumPoints {
        /// Input shape.
        shape: TensorShape,
        /// Input type.
        dtype: DType,
    },
    /// Rasterizer could not be acquired from the pool.
    #[error("Unable to acquire rasterizer: {0}")]
    Acquire(#[from] rasterize_pools::Error<RasterizerError>),
    /// Rasterizer failed while processing a batch element.
    #[error("Rendering of batch element {element} failed: {source}")]
    Render {
        /// Flat index of the failed batch element.
        element: usize,
        /// Rasterizer error.
        #[source]
        source: RasterizerError,
    },
    /// Output tensor could not be built.
    #[error(transparent)]
    Tensor(#[from] TensorError),
}

impl RasterizeError {
    /// Check whether this error is caused by invalid call arguments.
    #[must_use]
    pub fn is_invalid_argument(&self) -> bool {
        matches!(
            self,
            Self::ValueCountMismatch { .. }
                | Self::UnsupportedVariable { .. }
                | Self::VariableRank { .. }
                | Self::IncompatibleBatchShape { .. }
                | Self::InvalidNumPoints { .. }
        )
    }
}
