use crate::foundation::core::{DType, TensorShape};
use crate::foundation::error::{DetectError, DetectResult};

/// Typed element storage of a [`HostTensor`].
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TensorData {
    /// 32-bit float elements.
    F32(Vec<f32>),
    /// 32-bit integer elements.
    I32(Vec<i32>),
}

impl TensorData {
    /// Element type.
    pub fn dtype(&self) -> DType {
        match self {
            Self::F32(_) => DType::F32,
            Self::I32(_) => DType::I32,
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        match self {
            Self::F32(v) => v.len(),
            Self::I32(v) => v.len(),
        }
    }

    /// Return `true` when there are no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A tensor that has been read back into host memory.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct HostTensor {
    shape: TensorShape,
    data: TensorData,
}

impl HostTensor {
    /// Create a tensor, checking that `data` holds exactly `shape.element_count()` elements.
    ///
    /// Degenerate shapes are allowed here; rejecting them is the collector's job.
    pub fn new(shape: TensorShape, data: TensorData) -> DetectResult<Self> {
        if shape.element_count() != data.len() && !(shape.is_degenerate() && data.is_empty()) {
            return Err(DetectError::validation(format!(
                "tensor shape {shape} needs {} elements, got {}",
                shape.element_count(),
                data.len()
            )));
        }
        Ok(Self { shape, data })
    }

    /// Convenience constructor for float tensors.
    pub fn f32(shape: impl Into<TensorShape>, data: Vec<f32>) -> DetectResult<Self> {
        Self::new(shape.into(), TensorData::F32(data))
    }

    /// Convenience constructor for integer tensors.
    pub fn i32(shape: impl Into<TensorShape>, data: Vec<i32>) -> DetectResult<Self> {
        Self::new(shape.into(), TensorData::I32(data))
    }

    /// Zero-filled tensor of the given shape and type.
    pub fn zeros(shape: TensorShape, dtype: DType) -> Self {
        let n = shape.element_count();
        let data = match dtype {
            DType::F32 => TensorData::F32(vec![0.0; n]),
            DType::I32 => TensorData::I32(vec![0; n]),
        };
        Self { shape, data }
    }

    /// Tensor shape.
    pub fn shape(&self) -> &TensorShape {
        &self.shape
    }

    /// Element storage.
    pub fn data(&self) -> &TensorData {
        &self.data
    }

    /// Element type.
    pub fn dtype(&self) -> DType {
        self.data.dtype()
    }

    /// Borrow the elements as `f32`, or fail with a validation error.
    pub fn as_f32(&self) -> DetectResult<&[f32]> {
        match &self.data {
            TensorData::F32(v) => Ok(v),
            TensorData::I32(_) => Err(DetectError::validation("expected f32 tensor, got i32")),
        }
    }

    /// Borrow the elements as `i32`, or fail with a validation error.
    pub fn as_i32(&self) -> DetectResult<&[i32]> {
        match &self.data {
            TensorData::I32(v) => Ok(v),
            TensorData::F32(_) => Err(DetectError::validation("expected i32 tensor, got f32")),
        }
    }
}
