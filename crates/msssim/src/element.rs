use ndarray::{Array4, ScalarOperand};
use num_traits::{Float, FromPrimitive};
use std::fmt::Debug;

/// Runtime tag for the element type of a tensor.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum DType {
    F32,
    F64,
}

/// A window kernel with its element type erased, as kept in the engine cache.
#[derive(Debug, Clone)]
pub enum WindowStorage {
    F32(Array4<f32>),
    F64(Array4<f64>),
}

impl WindowStorage {
    pub fn dtype(&self) -> DType {
        match self {
            WindowStorage::F32(_) => DType::F32,
            WindowStorage::F64(_) => DType::F64,
        }
    }

    pub fn shape(&self) -> &[usize] {
        match self {
            WindowStorage::F32(w) => w.shape(),
            WindowStorage::F64(w) => w.shape(),
        }
    }
}

/// Floating point sample type the metrics can be computed with.
pub trait Element:
    Float + FromPrimitive + ScalarOperand + Debug + Default + Send + Sync + 'static
{
    const DTYPE: DType;

    /// Lossy conversion from a double, used to materialize constants and kernels.
    fn cast(value: f64) -> Self;

    fn widen(self) -> f64;

    fn store(window: Array4<Self>) -> WindowStorage;

    /// Borrow the kernel back if it was stored with this element type.
    fn select(storage: &WindowStorage) -> Option<&Array4<Self>>;
}

impl Element for f32 {
    const DTYPE: DType = DType::F32;

    #[inline]
    fn cast(value: f64) -> Self {
        value as f32
    }

    #[inline]
    fn widen(self) -> f64 {
        self as f64
    }

    fn store(window: Array4<Self>) -> WindowStorage {
        WindowStorage::F32(window)
    }

    fn select(storage: &WindowStorage) -> Option<&Array4<Self>> {
        match storage {
            WindowStorage::F32(w) => Some(w),
            WindowStorage::F64(_) => None,
        }
    }
}

impl Element for f64 {
    const DTYPE: DType = DType::F64;

    #[inline]
    fn cast(value: f64) -> Self {
        value
    }

    #[inline]
    fn widen(self) -> f64 {
        self
    }

    fn store(window: Array4<Self>) -> WindowStorage {
        WindowStorage::F64(window)
    }

    fn select(storage: &WindowStorage) -> Option<&Array4<Self>> {
        match storage {
            WindowStorage::F64(w) => Some(w),
            WindowStorage::F32(_) => None,
        }
    }
}
