//! Tensor descriptors and the two tensor shapes exchanged with the executor.

use super::ids::DeviceAddr;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Element data type of a tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DataType {
    /// 32-bit float.
    #[default]
    Float32,
    /// 16-bit float.
    Float16,
    /// bfloat16.
    BFloat16,
    /// Signed 8-bit integer.
    Int8,
    /// Signed 32-bit integer.
    Int32,
    /// Signed 64-bit integer.
    Int64,
    /// Unsigned 8-bit integer.
    UInt8,
    /// Boolean.
    Bool,
}

impl DataType {
    /// Size of one element in bytes.
    #[must_use]
    pub const fn size_bytes(&self) -> usize {
        match self {
            Self::Float32 | Self::Int32 => 4,
            Self::Float16 | Self::BFloat16 => 2,
            Self::Int64 => 8,
            Self::Int8 | Self::UInt8 | Self::Bool => 1,
        }
    }
}

/// Tensor shape. Negative dimensions mark unknown extents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Shape(Vec<i64>);

impl Shape {
    /// Marker for a dimension whose extent is unknown until run time.
    pub const UNKNOWN_DIM: i64 = -1;
    /// Marker for a shape whose rank is unknown until run time.
    pub const UNKNOWN_RANK: i64 = -2;

    /// Create a shape from its dimensions.
    #[must_use]
    pub fn new(dims: impl Into<Vec<i64>>) -> Self {
        Self(dims.into())
    }

    /// A scalar shape.
    #[must_use]
    pub fn scalar() -> Self {
        Self(Vec::new())
    }

    /// Dimensions of the shape.
    #[must_use]
    pub fn dims(&self) -> &[i64] {
        &self.0
    }

    /// Number of dimensions.
    #[must_use]
    pub fn rank(&self) -> usize {
        self.0.len()
    }

    /// Whether every dimension is known.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.0.iter().all(|&d| d >= 0)
    }

    /// Element count, or `None` if the shape is not static or the count
    /// overflows.
    #[must_use]
    pub fn num_elements(&self) -> Option<u64> {
        self.0.iter().try_fold(1u64, |acc, &d| {
            let d = u64::try_from(d).ok()?;
            acc.checked_mul(d)
        })
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{d}")?;
        }
        write!(f, "]")
    }
}

impl From<Vec<i64>> for Shape {
    fn from(dims: Vec<i64>) -> Self {
        Self(dims)
    }
}

/// Shape and data type of a tensor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TensorDesc {
    /// Tensor shape.
    pub shape: Shape,
    /// Element type.
    pub dtype: DataType,
}

impl TensorDesc {
    /// Create a descriptor.
    #[must_use]
    pub fn new(shape: impl Into<Shape>, dtype: DataType) -> Self {
        Self {
            shape: shape.into(),
            dtype,
        }
    }

    /// Size in bytes, or `None` when the shape is dynamic or the size overflows.
    #[must_use]
    pub fn size_bytes(&self) -> Option<u64> {
        self.shape
            .num_elements()
            .and_then(|n| n.checked_mul(self.dtype.size_bytes() as u64))
    }
}

/// A host tensor used by the batch and stream-synchronous run paths.
#[derive(Debug, Clone, Default)]
pub struct Tensor {
    /// Descriptor.
    pub desc: TensorDesc,
    /// Host data.
    pub data: Bytes,
}

impl Tensor {
    /// Create a tensor from a descriptor and host data.
    #[must_use]
    pub fn new(desc: TensorDesc, data: impl Into<Bytes>) -> Self {
        Self {
            desc,
            data: data.into(),
        }
    }

    /// Create a zero-filled tensor for a static descriptor.
    #[must_use]
    pub fn zeroed(desc: TensorDesc) -> Self {
        let len = desc.size_bytes().unwrap_or(0) as usize;
        Self {
            desc,
            data: Bytes::from(vec![0u8; len]),
        }
    }
}

/// A lightweight view of a tensor that already lives in device memory.
///
/// Used by the stream-asynchronous run path, where no host copy is made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorView {
    /// Descriptor.
    pub desc: TensorDesc,
    /// Device address of the first element.
    pub addr: DeviceAddr,
    /// Length of the buffer in bytes.
    pub size: u64,
}

impl TensorView {
    /// Create a device tensor view.
    #[must_use]
    pub fn new(desc: TensorDesc, addr: DeviceAddr, size: u64) -> Self {
        Self { desc, addr, size }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_shape_detection() {
        assert!(Shape::new(vec![1, 3, 224, 224]).is_static());
        assert!(!Shape::new(vec![-1, 3]).is_static());
        assert!(!Shape::new(vec![Shape::UNKNOWN_RANK]).is_static());
        assert!(Shape::scalar().is_static());
    }

    #[test]
    fn desc_size_in_bytes() {
        let desc = TensorDesc::new(vec![2, 8], DataType::Float16);
        assert_eq!(desc.size_bytes(), Some(32));

        let dynamic = TensorDesc::new(vec![-1, 8], DataType::Float16);
        assert_eq!(dynamic.size_bytes(), None);
    }

    #[test]
    fn oversized_shape_has_no_element_count() {
        let huge = Shape::new(vec![i64::MAX, i64::MAX]);
        assert!(huge.is_static());
        assert_eq!(huge.num_elements(), None);
        assert_eq!(Shape::scalar().num_elements(), Some(1));

        let desc = TensorDesc::new(vec![i64::MAX], DataType::Float32);
        assert_eq!(desc.size_bytes(), None);
    }

    #[test]
    fn zeroed_tensor_has_full_length() {
        let t = Tensor::zeroed(TensorDesc::new(vec![4], DataType::Int32));
        assert_eq!(t.data.len(), 16);
    }

    #[test]
    fn shape_display() {
        assert_eq!(Shape::new(vec![1, -1, 3]).to_string(), "[1,-1,3]");
    }
}
