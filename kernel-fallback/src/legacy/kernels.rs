//! Built-in CPU kernels: `Add`, `AddV2` and `Identity`.
use std::sync::Arc;

use anyhow::{anyhow, Result};
use once_cell::sync::Lazy;

use crate::error::Status;
use crate::tensor::{shape_debug_string, DType, Tensor, TensorElement, TensorValue, BF16, F16};

use super::{
    BuiltKernel, KernelConstruction, KernelFactory, KernelImpl, OpKernelContext, SyncOpKernel,
    DEVICE_TYPE_CPU,
};

pub(super) static ENTRIES: Lazy<Vec<(&'static str, &'static str, KernelFactory)>> =
    Lazy::new(|| {
        let add: KernelFactory = Arc::new(build_add);
        let identity: KernelFactory = Arc::new(build_identity);
        vec![
            ("Add", DEVICE_TYPE_CPU, Arc::clone(&add)),
            ("AddV2", DEVICE_TYPE_CPU, add),
            ("Identity", DEVICE_TYPE_CPU, identity),
        ]
    });

trait AddElement: TensorElement + Copy {
    fn add(a: Self, b: Self) -> Self;
}

macro_rules! impl_add_wrapping {
    ($($ty:ty),+) => {
        $(impl AddElement for $ty {
            fn add(a: Self, b: Self) -> Self {
                a.wrapping_add(b)
            }
        })+
    };
}

impl_add_wrapping!(i8, i16, i32, i64, u8, u16, u32, u64);

impl AddElement for f32 {
    fn add(a: Self, b: Self) -> Self {
        a + b
    }
}

impl AddElement for f64 {
    fn add(a: Self, b: Self) -> Self {
        a + b
    }
}

impl AddElement for F16 {
    fn add(a: Self, b: Self) -> Self {
        F16::from_f32(a.to_f32() + b.to_f32())
    }
}

impl AddElement for BF16 {
    fn add(a: Self, b: Self) -> Self {
        BF16::from_f32(a.to_f32() + b.to_f32())
    }
}

fn build_add(construction: &KernelConstruction<'_>) -> Result<BuiltKernel> {
    let dtype = construction.attr_dtype("T")?;
    if dtype == DType::Bool {
        return Err(Status::invalid_argument(format!(
            "{} does not support {} inputs",
            construction.op_name, dtype
        ))
        .into());
    }
    Ok(BuiltKernel {
        input_types: vec![dtype, dtype],
        output_types: vec![dtype],
        kernel: KernelImpl::Sync(Box::new(AddKernel { dtype })),
    })
}

fn build_identity(construction: &KernelConstruction<'_>) -> Result<BuiltKernel> {
    let dtype = construction.attr_dtype("T")?;
    Ok(BuiltKernel {
        input_types: vec![dtype],
        output_types: vec![dtype],
        kernel: KernelImpl::Sync(Box::new(IdentityKernel)),
    })
}

struct AddKernel {
    dtype: DType,
}

impl SyncOpKernel for AddKernel {
    fn compute(&self, ctx: &mut OpKernelContext<'_>) -> Result<(), Status> {
        let a = ctx.input(0)?;
        let b = ctx.input(1)?;
        let sum = match self.dtype {
            DType::I8 => add_typed::<i8>(a, b),
            DType::I16 => add_typed::<i16>(a, b),
            DType::I32 => add_typed::<i32>(a, b),
            DType::I64 => add_typed::<i64>(a, b),
            DType::U8 => add_typed::<u8>(a, b),
            DType::U16 => add_typed::<u16>(a, b),
            DType::U32 => add_typed::<u32>(a, b),
            DType::U64 => add_typed::<u64>(a, b),
            DType::F16 => add_typed::<F16>(a, b),
            DType::BF16 => add_typed::<BF16>(a, b),
            DType::F32 => add_typed::<f32>(a, b),
            DType::F64 => add_typed::<f64>(a, b),
            DType::Bool => Err(anyhow!("add does not support bool")),
        }?;
        ctx.set_output(0, sum)?;
        Ok(())
    }
}

/// Elementwise add with scalar broadcasting on either side.
fn add_typed<T: AddElement>(a: &TensorValue, b: &TensorValue) -> Result<TensorValue> {
    let a = a.as_typed::<T>()?;
    let b = b.as_typed::<T>()?;
    let (shape, data) = if a.shape() == b.shape() {
        let data = a
            .data()
            .iter()
            .zip(b.data())
            .map(|(x, y)| T::add(*x, *y))
            .collect::<Vec<_>>();
        (a.shape().to_vec(), data)
    } else if b.is_scalar() {
        let y = b.data()[0];
        (a.shape().to_vec(), a.data().iter().map(|x| T::add(*x, y)).collect())
    } else if a.is_scalar() {
        let x = a.data()[0];
        (b.shape().to_vec(), b.data().iter().map(|y| T::add(x, *y)).collect())
    } else {
        return Err(Status::invalid_argument(format!(
            "Incompatible shapes: {} vs. {}",
            shape_debug_string(a.shape()),
            shape_debug_string(b.shape())
        ))
        .into());
    };
    Ok(T::into_value(Tensor::from_vec_with_shape(data, shape)?))
}

struct IdentityKernel;

impl SyncOpKernel for IdentityKernel {
    fn compute(&self, ctx: &mut OpKernelContext<'_>) -> Result<(), Status> {
        let input = ctx.input(0)?.clone();
        ctx.set_output(0, input)?;
        Ok(())
    }
}
