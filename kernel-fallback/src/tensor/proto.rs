//! Serialized tensor description used by constant tensors.
//!
//! ```json
//! { "dtype": "i32", "shape": [2], "int_val": [1, 2] }
//! ```
//!
//! A value list holding a single element fills the whole shape, up to
//! [`MAX_FILL_ELEMENTS`] elements.
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use super::shape::checked_numel;
use super::{DType, Tensor, TensorElement, TensorValue, BF16, F16};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TensorProto {
    pub dtype: Option<String>,
    pub shape: Vec<usize>,
    pub float_val: Vec<f64>,
    pub int_val: Vec<i64>,
    pub uint_val: Vec<u64>,
    pub bool_val: Vec<bool>,
}

impl TensorProto {
    pub fn parse(serialized: &str) -> Result<Self> {
        serde_json::from_str(serialized).context("failed to parse tensor proto")
    }

    pub fn to_tensor_value(&self) -> Result<TensorValue> {
        let ident = self
            .dtype
            .as_deref()
            .ok_or_else(|| anyhow!("tensor proto is missing a dtype"))?;
        let dtype = DType::from_ident(ident)?;
        let count = checked_numel(&self.shape)?;
        let value = match dtype {
            DType::I8 => ints::<i8>(&self.int_val, count, &self.shape)?,
            DType::I16 => ints::<i16>(&self.int_val, count, &self.shape)?,
            DType::I32 => ints::<i32>(&self.int_val, count, &self.shape)?,
            DType::I64 => ints::<i64>(&self.int_val, count, &self.shape)?,
            DType::U8 => uints::<u8>(&self.uint_val, count, &self.shape)?,
            DType::U16 => uints::<u16>(&self.uint_val, count, &self.shape)?,
            DType::U32 => uints::<u32>(&self.uint_val, count, &self.shape)?,
            DType::U64 => uints::<u64>(&self.uint_val, count, &self.shape)?,
            DType::F32 => {
                let data = expand(&self.float_val, count)?
                    .into_iter()
                    .map(|v| v as f32)
                    .collect::<Vec<f32>>();
                build(data, &self.shape)?
            }
            DType::F64 => build(expand(&self.float_val, count)?, &self.shape)?,
            DType::F16 => {
                let data = expand(&self.float_val, count)?
                    .into_iter()
                    .map(|v| F16::from_f32(v as f32))
                    .collect::<Vec<F16>>();
                build(data, &self.shape)?
            }
            DType::BF16 => {
                let data = expand(&self.float_val, count)?
                    .into_iter()
                    .map(|v| BF16::from_f32(v as f32))
                    .collect::<Vec<BF16>>();
                build(data, &self.shape)?
            }
            DType::Bool => build(expand(&self.bool_val, count)?, &self.shape)?,
        };
        Ok(value)
    }
}

/// Largest element count a single-value fill may expand to.
pub const MAX_FILL_ELEMENTS: usize = 1 << 26;

fn expand<T: Clone>(values: &[T], count: usize) -> Result<Vec<T>> {
    if values.len() == count {
        return Ok(values.to_vec());
    }
    match values {
        [_] if count > MAX_FILL_ELEMENTS => Err(anyhow!(
            "tensor proto fill of {} elements exceeds the limit of {}",
            count,
            MAX_FILL_ELEMENTS
        )),
        [single] => Ok(vec![single.clone(); count]),
        _ => Err(anyhow!(
            "tensor proto holds {} values for {} elements",
            values.len(),
            count
        )),
    }
}

fn build<T: TensorElement>(data: Vec<T>, shape: &[usize]) -> Result<TensorValue> {
    Ok(T::into_value(Tensor::from_vec_with_shape(data, shape.to_vec())?))
}

fn ints<T>(values: &[i64], count: usize, shape: &[usize]) -> Result<TensorValue>
where
    T: TensorElement + TryFrom<i64>,
{
    let data = expand(values, count)?
        .into_iter()
        .map(|v| T::try_from(v).map_err(|_| anyhow!("value {} out of range for {}", v, T::DTYPE)))
        .collect::<Result<Vec<T>>>()?;
    build(data, shape)
}

fn uints<T>(values: &[u64], count: usize, shape: &[usize]) -> Result<TensorValue>
where
    T: TensorElement + TryFrom<u64>,
{
    let data = expand(values, count)?
        .into_iter()
        .map(|v| T::try_from(v).map_err(|_| anyhow!("value {} out of range for {}", v, T::DTYPE)))
        .collect::<Result<Vec<T>>>()?;
    build(data, shape)
}
