//! Tensors in the async runtime's own representation.
//!
//! Arguments handed to the core-runtime dispatch path arrive as
//! [`RuntimeTensor`]s and are converted to legacy [`TensorValue`]s before a
//! kernel sees them.
use anyhow::{anyhow, Result};
use bytemuck::Pod;

use super::shape::{check_len, checked_numel};
use super::{DType, FallbackTensor, Tensor, TensorElement, TensorValue, BF16, F16};

/// Dense row-major tensor stored as raw little-endian bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseHostTensor {
    dtype: DType,
    shape: Vec<usize>,
    bytes: Vec<u8>,
}

impl DenseHostTensor {
    pub fn new(dtype: DType, shape: Vec<usize>, bytes: Vec<u8>) -> Self {
        Self {
            dtype,
            shape,
            bytes,
        }
    }

    /// Encode a typed slice; `T` must be a plain numeric element.
    pub fn from_slice<T: Pod + TensorElement>(shape: Vec<usize>, data: &[T]) -> Result<Self> {
        check_len(&shape, data.len())?;
        Ok(Self {
            dtype: T::DTYPE,
            shape,
            bytes: bytemuck::cast_slice(data).to_vec(),
        })
    }

    pub fn from_tensor_value(value: &TensorValue) -> Self {
        let bytes = match value {
            TensorValue::I8(t) => bytemuck::cast_slice(t.data()).to_vec(),
            TensorValue::I16(t) => bytemuck::cast_slice(t.data()).to_vec(),
            TensorValue::I32(t) => bytemuck::cast_slice(t.data()).to_vec(),
            TensorValue::I64(t) => bytemuck::cast_slice(t.data()).to_vec(),
            TensorValue::U8(t) => t.data().to_vec(),
            TensorValue::U16(t) => bytemuck::cast_slice(t.data()).to_vec(),
            TensorValue::U32(t) => bytemuck::cast_slice(t.data()).to_vec(),
            TensorValue::U64(t) => bytemuck::cast_slice(t.data()).to_vec(),
            TensorValue::F16(t) => {
                let bits = t.data().iter().map(|v| v.bits).collect::<Vec<u16>>();
                bytemuck::cast_slice(&bits).to_vec()
            }
            TensorValue::BF16(t) => {
                let bits = t.data().iter().map(|v| v.bits).collect::<Vec<u16>>();
                bytemuck::cast_slice(&bits).to_vec()
            }
            TensorValue::F32(t) => bytemuck::cast_slice(t.data()).to_vec(),
            TensorValue::F64(t) => bytemuck::cast_slice(t.data()).to_vec(),
            TensorValue::Bool(t) => t.data().iter().map(|v| *v as u8).collect(),
        };
        Self {
            dtype: value.dtype(),
            shape: value.shape().to_vec(),
            bytes,
        }
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn to_tensor_value(&self) -> Result<TensorValue> {
        let expected = checked_numel(&self.shape)?
            .checked_mul(self.dtype.size_in_bytes())
            .ok_or_else(|| {
                anyhow!(
                    "dense host tensor {}{:?} overflows the byte count",
                    self.dtype,
                    self.shape
                )
            })?;
        if self.bytes.len() != expected {
            return Err(anyhow!(
                "dense host tensor {}{:?} holds {} bytes, expected {}",
                self.dtype,
                self.shape,
                self.bytes.len(),
                expected
            ));
        }
        let shape = self.shape.clone();
        let value = match self.dtype {
            DType::I8 => decode::<i8>(&self.bytes, shape)?,
            DType::I16 => decode::<i16>(&self.bytes, shape)?,
            DType::I32 => decode::<i32>(&self.bytes, shape)?,
            DType::I64 => decode::<i64>(&self.bytes, shape)?,
            DType::U8 => decode::<u8>(&self.bytes, shape)?,
            DType::U16 => decode::<u16>(&self.bytes, shape)?,
            DType::U32 => decode::<u32>(&self.bytes, shape)?,
            DType::U64 => decode::<u64>(&self.bytes, shape)?,
            DType::F32 => decode::<f32>(&self.bytes, shape)?,
            DType::F64 => decode::<f64>(&self.bytes, shape)?,
            DType::F16 => {
                let data = read_pod::<u16>(&self.bytes)
                    .into_iter()
                    .map(|bits| F16 { bits })
                    .collect::<Vec<F16>>();
                Tensor::from_vec_with_shape(data, shape)?.into()
            }
            DType::BF16 => {
                let data = read_pod::<u16>(&self.bytes)
                    .into_iter()
                    .map(|bits| BF16 { bits })
                    .collect::<Vec<BF16>>();
                Tensor::from_vec_with_shape(data, shape)?.into()
            }
            DType::Bool => {
                let mut data = Vec::with_capacity(self.bytes.len());
                for (idx, byte) in self.bytes.iter().enumerate() {
                    match byte {
                        0 => data.push(false),
                        1 => data.push(true),
                        other => {
                            return Err(anyhow!(
                                "bool tensor element {} has invalid byte {}",
                                idx,
                                other
                            ))
                        }
                    }
                }
                Tensor::from_vec_with_shape(data, shape)?.into()
            }
        };
        Ok(value)
    }
}

fn read_pod<T: Pod>(bytes: &[u8]) -> Vec<T> {
    bytes
        .chunks_exact(std::mem::size_of::<T>())
        .map(bytemuck::pod_read_unaligned::<T>)
        .collect()
}

fn decode<T: Pod + TensorElement>(bytes: &[u8], shape: Vec<usize>) -> Result<TensorValue> {
    let data = read_pod::<T>(bytes);
    Ok(T::into_value(Tensor::from_vec_with_shape(data, shape)?))
}

/// Host tensor of strings; the legacy side has no matching dtype.
#[derive(Debug, Clone, PartialEq)]
pub struct StringHostTensor {
    pub shape: Vec<usize>,
    pub values: Vec<String>,
}

/// Argument as presented by the async runtime.
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeTensor {
    DenseHost(DenseHostTensor),
    Fallback(FallbackTensor),
    StringHost(StringHostTensor),
}

impl RuntimeTensor {
    pub fn scalar<T: Pod + TensorElement>(value: T) -> Self {
        RuntimeTensor::DenseHost(DenseHostTensor {
            dtype: T::DTYPE,
            shape: Vec::new(),
            bytes: bytemuck::bytes_of(&value).to_vec(),
        })
    }

    /// Convert into the legacy representation.
    pub fn to_tensor_value(&self) -> Result<TensorValue> {
        match self {
            RuntimeTensor::DenseHost(dense) => dense.to_tensor_value(),
            RuntimeTensor::Fallback(fallback) => Ok(fallback.tensor().clone()),
            RuntimeTensor::StringHost(strings) => Err(anyhow!(
                "string host tensor with shape {:?} has no legacy tensor representation",
                strings.shape
            )),
        }
    }
}
