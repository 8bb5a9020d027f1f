use std::fmt;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use super::shape::shape_debug_string;
use super::{Tensor, BF16, F16};

/// Element type of a legacy tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DType {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F16,
    BF16,
    F32,
    F64,
    Bool,
}

impl DType {
    /// Parse a dtype from its identifier string.
    pub fn from_ident(ident: &str) -> Result<Self> {
        match ident {
            "i8" | "int8" => Ok(DType::I8),
            "i16" | "int16" => Ok(DType::I16),
            "i32" | "int32" => Ok(DType::I32),
            "i64" | "int64" => Ok(DType::I64),
            "u8" | "uint8" => Ok(DType::U8),
            "u16" | "uint16" => Ok(DType::U16),
            "u32" | "uint32" => Ok(DType::U32),
            "u64" | "uint64" => Ok(DType::U64),
            "f16" | "half" => Ok(DType::F16),
            "bf16" | "bfloat16" => Ok(DType::BF16),
            "f32" | "float" => Ok(DType::F32),
            "f64" | "double" => Ok(DType::F64),
            "bool" => Ok(DType::Bool),
            _ => Err(anyhow!("unsupported dtype: {}", ident)),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DType::I8 => "int8",
            DType::I16 => "int16",
            DType::I32 => "int32",
            DType::I64 => "int64",
            DType::U8 => "uint8",
            DType::U16 => "uint16",
            DType::U32 => "uint32",
            DType::U64 => "uint64",
            DType::F16 => "half",
            DType::BF16 => "bfloat16",
            DType::F32 => "float",
            DType::F64 => "double",
            DType::Bool => "bool",
        }
    }

    /// Size in bytes of one element in dense host layout.
    pub fn size_in_bytes(self) -> usize {
        match self {
            DType::I8 | DType::U8 | DType::Bool => 1,
            DType::I16 | DType::U16 | DType::F16 | DType::BF16 => 2,
            DType::I32 | DType::U32 | DType::F32 => 4,
            DType::I64 | DType::U64 | DType::F64 => 8,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Element type that can be converted to/from `TensorValue`.
pub trait TensorElement: Sized + Clone + Send + Sync + 'static {
    const DTYPE: DType;
    /// Borrow the typed tensor out of a generic value.
    fn from_value(value: &TensorValue) -> Option<&Tensor<Self>>;
    /// Wrap a typed tensor into a generic value.
    fn into_value(tensor: Tensor<Self>) -> TensorValue;
}

macro_rules! impl_tensor_element {
    ($($ty:ty => $variant:ident),+ $(,)?) => {
        $(
            impl TensorElement for $ty {
                const DTYPE: DType = DType::$variant;

                fn from_value(value: &TensorValue) -> Option<&Tensor<Self>> {
                    match value {
                        TensorValue::$variant(tensor) => Some(tensor),
                        _ => None,
                    }
                }

                fn into_value(tensor: Tensor<Self>) -> TensorValue {
                    TensorValue::$variant(tensor)
                }
            }

            impl From<Tensor<$ty>> for TensorValue {
                fn from(tensor: Tensor<$ty>) -> Self {
                    TensorValue::$variant(tensor)
                }
            }
        )+
    };
}

/// Legacy native tensor: a typed tensor tagged by its dtype.
#[derive(Debug, Clone, PartialEq)]
pub enum TensorValue {
    I8(Tensor<i8>),
    I16(Tensor<i16>),
    I32(Tensor<i32>),
    I64(Tensor<i64>),
    U8(Tensor<u8>),
    U16(Tensor<u16>),
    U32(Tensor<u32>),
    U64(Tensor<u64>),
    F16(Tensor<F16>),
    BF16(Tensor<BF16>),
    F32(Tensor<f32>),
    F64(Tensor<f64>),
    Bool(Tensor<bool>),
}

impl_tensor_element!(
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    F16 => F16,
    BF16 => BF16,
    f32 => F32,
    f64 => F64,
    bool => Bool,
);

macro_rules! with_tensor {
    ($value:expr, $tensor:ident => $body:expr) => {
        match $value {
            TensorValue::I8($tensor) => $body,
            TensorValue::I16($tensor) => $body,
            TensorValue::I32($tensor) => $body,
            TensorValue::I64($tensor) => $body,
            TensorValue::U8($tensor) => $body,
            TensorValue::U16($tensor) => $body,
            TensorValue::U32($tensor) => $body,
            TensorValue::U64($tensor) => $body,
            TensorValue::F16($tensor) => $body,
            TensorValue::BF16($tensor) => $body,
            TensorValue::F32($tensor) => $body,
            TensorValue::F64($tensor) => $body,
            TensorValue::Bool($tensor) => $body,
        }
    };
}

impl TensorValue {
    pub fn dtype(&self) -> DType {
        match self {
            TensorValue::I8(_) => DType::I8,
            TensorValue::I16(_) => DType::I16,
            TensorValue::I32(_) => DType::I32,
            TensorValue::I64(_) => DType::I64,
            TensorValue::U8(_) => DType::U8,
            TensorValue::U16(_) => DType::U16,
            TensorValue::U32(_) => DType::U32,
            TensorValue::U64(_) => DType::U64,
            TensorValue::F16(_) => DType::F16,
            TensorValue::BF16(_) => DType::BF16,
            TensorValue::F32(_) => DType::F32,
            TensorValue::F64(_) => DType::F64,
            TensorValue::Bool(_) => DType::Bool,
        }
    }

    pub fn shape(&self) -> &[usize] {
        with_tensor!(self, tensor => tensor.shape())
    }

    /// Logical element count.
    pub fn len(&self) -> usize {
        with_tensor!(self, tensor => tensor.numel())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn scalar<T: TensorElement>(value: T) -> Self {
        T::into_value(Tensor::from_scalar(value))
    }

    /// Borrow the typed tensor, failing on a dtype mismatch.
    pub fn as_typed<T: TensorElement>(&self) -> Result<&Tensor<T>> {
        T::from_value(self).ok_or_else(|| {
            anyhow!(
                "expected a {} tensor, got a {} tensor",
                T::DTYPE,
                self.dtype()
            )
        })
    }

    pub fn buffer_is_unique(&self) -> bool {
        with_tensor!(self, tensor => tensor.buffer_is_unique())
    }

    pub fn shares_buffer_with(&self, other: &TensorValue) -> bool {
        match (self, other) {
            (TensorValue::I8(a), TensorValue::I8(b)) => a.shares_buffer_with(b),
            (TensorValue::I16(a), TensorValue::I16(b)) => a.shares_buffer_with(b),
            (TensorValue::I32(a), TensorValue::I32(b)) => a.shares_buffer_with(b),
            (TensorValue::I64(a), TensorValue::I64(b)) => a.shares_buffer_with(b),
            (TensorValue::U8(a), TensorValue::U8(b)) => a.shares_buffer_with(b),
            (TensorValue::U16(a), TensorValue::U16(b)) => a.shares_buffer_with(b),
            (TensorValue::U32(a), TensorValue::U32(b)) => a.shares_buffer_with(b),
            (TensorValue::U64(a), TensorValue::U64(b)) => a.shares_buffer_with(b),
            (TensorValue::F16(a), TensorValue::F16(b)) => a.shares_buffer_with(b),
            (TensorValue::BF16(a), TensorValue::BF16(b)) => a.shares_buffer_with(b),
            (TensorValue::F32(a), TensorValue::F32(b)) => a.shares_buffer_with(b),
            (TensorValue::F64(a), TensorValue::F64(b)) => a.shares_buffer_with(b),
            (TensorValue::Bool(a), TensorValue::Bool(b)) => a.shares_buffer_with(b),
            _ => false,
        }
    }

    /// Copy into a fresh buffer that nothing else references.
    pub fn deep_copy(&self) -> Self {
        with_tensor!(self, tensor => tensor.deep_copy().into())
    }

    /// Dtype followed by shape, e.g. `int32[2,2]`.
    pub fn debug_string(&self) -> String {
        format!("{}{}", self.dtype(), shape_debug_string(self.shape()))
    }
}
