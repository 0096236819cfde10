//! Minimal dense tensor model for operation inputs and outputs.

use std::fmt;

use thiserror::Error;

/// Error type used when constructing tensors.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum TensorError {
    /// Number of values does not match the shape.
    #[error("Shape {shape} requires {expected} values, got {actual}")]
    ValueCount {
        /// Requested shape.
        shape: TensorShape,
        /// Number of elements of the shape.
        expected: usize,
        /// Number of provided values.
        actual: usize,
    },
}

/// Element type of a tensor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum DType {
    /// 32-bit float.
    Float,
    /// 64-bit float.
    Double,
    /// 32-bit signed integer.
    Int32,
    /// 64-bit signed integer.
    Int64,
    /// 8-bit unsigned integer.
    UInt8,
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Float => "float",
            Self::Double => "double",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::UInt8 => "uint8",
        })
    }
}

/// Shape of a tensor.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct TensorShape(Vec<usize>);

impl TensorShape {
    /// Create a shape from a list of dimension sizes.
    #[must_use]
    pub fn new(dims: impl Into<Vec<usize>>) -> Self {
        Self(dims.into())
    }

    /// Create a zero-rank shape.
    #[must_use]
    pub fn scalar() -> Self {
        Self(Vec::new())
    }

    /// Number of dimensions.
    #[must_use]
    pub fn rank(&self) -> usize {
        self.0.len()
    }

    /// Dimension sizes.
    #[must_use]
    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    /// Total number of elements.
    ///
    /// A zero-rank shape has exactly one element.
    #[must_use]
    pub fn num_elements(&self) -> usize {
        self.0.iter().product()
    }

    /// Split the shape into leading dimensions and the last `count` dimensions.
    ///
    /// Returns `None` if the shape has fewer than `count` dimensions.
    #[must_use]
    pub fn split_last(&self, count: usize) -> Option<(TensorShape, &[usize])> {
        let at = self.0.len().checked_sub(count)?;
        let (lead, tail) = self.0.split_at(at);
        Some((TensorShape(lead.to_vec()), tail))
    }

    /// Append all dimensions of another shape.
    pub fn append_shape(&mut self, other: &TensorShape) -> &mut Self {
        self.0.extend_from_slice(&other.0);
        self
    }
}

impl From<Vec<usize>> for TensorShape {
    fn from(dims: Vec<usize>) -> Self {
        Self(dims)
    }
}

impl<const N: usize> From<[usize; N]> for TensorShape {
    fn from(dims: [usize; N]) -> Self {
        Self(dims.to_vec())
    }
}

impl fmt::Display for TensorShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (idx, dim) in self.0.iter().enumerate() {
            if idx > 0 {
                f.write_str(",")?;
            }
            write!(f, "{dim}")?;
        }
        f.write_str("]")
    }
}

/// Flat, typed tensor storage in row-major order.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum TensorData {
    /// 32-bit floats.
    Float(Vec<f32>),
    /// 64-bit floats.
    Double(Vec<f64>),
    /// 32-bit signed integers.
    Int32(Vec<i32>),
    /// 64-bit signed integers.
    Int64(Vec<i64>),
    /// 8-bit unsigned integers.
    UInt8(Vec<u8>),
}

impl TensorData {
    /// Element type.
    #[must_use]
    pub fn dtype(&self) -> DType {
        match self {
            Self::Float(_) => DType::Float,
            Self::Double(_) => DType::Double,
            Self::Int32(_) => DType::Int32,
            Self::Int64(_) => DType::Int64,
            Self::UInt8(_) => DType::UInt8,
        }
    }

    /// Number of stored values.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Float(v) => v.len(),
            Self::Double(v) => v.len(),
            Self::Int32(v) => v.len(),
            Self::Int64(v) => v.len(),
            Self::UInt8(v) => v.len(),
        }
    }

    /// Check if there are no stored values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Dense tensor.
#[derive(Clone, Debug, PartialEq)]
pub struct Tensor {
    shape: TensorShape,
    data: TensorData,
}

impl Tensor {
    /// Create a tensor, checking that the number of values matches the shape.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the number of values differs from the number of shape elements.
    pub fn new(shape: impl Into<TensorShape>, data: TensorData) -> Result<Self, TensorError> {
        let shape = shape.into();
        let expected = shape.num_elements();
        if data.len() != expected {
            return Err(TensorError::ValueCount {
                shape,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { shape, data })
    }

    /// Create a float tensor.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the number of values differs from the number of shape elements.
    pub fn from_f32(shape: impl Into<TensorShape>, values: Vec<f32>) -> Result<Self, TensorError> {
        Self::new(shape, TensorData::Float(values))
    }

    /// Create a zero-rank int32 tensor.
    #[must_use]
    pub fn scalar_i32(value: i32) -> Self {
        Self {
            shape: TensorShape::scalar(),
            data: TensorData::Int32(vec![value]),
        }
    }

    /// Tensor shape.
    #[must_use]
    pub fn shape(&self) -> &TensorShape {
        &self.shape
    }

    /// Element type.
    #[must_use]
    pub fn dtype(&self) -> DType {
        self.data.dtype()
    }

    /// Typed storage.
    #[must_use]
    pub fn data(&self) -> &TensorData {
        &self.data
    }

    /// Float values, if this is a float tensor.
    #[must_use]
    pub fn as_f32(&self) -> Option<&[f32]> {
        match &self.data {
            TensorData::Float(v) => Some(v),
            _ => None,
        }
    }

    /// Consume the tensor, returning its float values.
    #[must_use]
    pub fn into_f32(self) -> Option<Vec<f32>> {
        match self.data {
            TensorData::Float(v) => Some(v),
            _ => None,
        }
    }
}
