//! Tensor container.
//!
//! `Tensor<T>` keeps its elements in reference-counted storage, so cloning a
//! tensor shares the buffer. Kernels that want to write into an input can
//! check [`Tensor::buffer_is_unique`] first.
use std::fmt;
use std::sync::Arc;

use anyhow::Result;

use super::shape::{check_len, numel, shape_debug_string};

pub struct Tensor<T> {
    data: Arc<Vec<T>>,
    shape: Vec<usize>,
}

impl<T> Clone for Tensor<T> {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
            shape: self.shape.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Tensor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tensor")
            .field("shape", &shape_debug_string(&self.shape))
            .field("data", &self.data)
            .finish()
    }
}

impl<T: PartialEq> PartialEq for Tensor<T> {
    fn eq(&self, other: &Self) -> bool {
        self.shape == other.shape && self.data == other.data
    }
}

impl<T> Tensor<T> {
    /// Build a rank-1 tensor from a flat data vector.
    pub fn from_vec(data: Vec<T>) -> Self {
        let shape = vec![data.len()];
        Self {
            data: Arc::new(data),
            shape,
        }
    }

    /// Build a tensor with an explicit shape.
    ///
    /// # Example
    /// ```
    /// # use kernel_fallback::tensor::Tensor;
    /// # fn main() -> anyhow::Result<()> {
    /// let t = Tensor::from_vec_with_shape(vec![1.0f32, 2.0, 3.0, 4.0], vec![2, 2])?;
    /// assert_eq!(t.numel(), 4);
    /// # Ok(()) }
    /// ```
    pub fn from_vec_with_shape(data: Vec<T>, shape: Vec<usize>) -> Result<Self> {
        check_len(&shape, data.len())?;
        Ok(Self {
            data: Arc::new(data),
            shape,
        })
    }

    /// Create a rank-0 tensor holding one value.
    pub fn from_scalar(value: T) -> Self {
        Self {
            data: Arc::new(vec![value]),
            shape: Vec::new(),
        }
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn numel(&self) -> usize {
        numel(&self.shape)
    }

    pub fn is_scalar(&self) -> bool {
        self.shape.is_empty()
    }

    /// True when no other tensor shares this buffer.
    pub fn buffer_is_unique(&self) -> bool {
        Arc::strong_count(&self.data) == 1
    }

    pub fn shares_buffer_with(&self, other: &Tensor<T>) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    /// Copy the elements into a buffer owned by the returned tensor alone.
    pub fn deep_copy(&self) -> Self
    where
        T: Clone,
    {
        Self {
            data: Arc::new(self.data.as_ref().clone()),
            shape: self.shape.clone(),
        }
    }

    /// Take the elements out, reusing the buffer when nothing else holds it.
    pub fn into_vec(self) -> Vec<T>
    where
        T: Clone,
    {
        Arc::try_unwrap(self.data).unwrap_or_else(|shared| shared.as_ref().clone())
    }
}
