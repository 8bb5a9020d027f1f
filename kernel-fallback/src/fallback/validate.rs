use std::sync::Arc;

use anyhow::{Context, Result};

use crate::error::Status;
use crate::legacy::OpKernel;
use crate::tensor::{DType, RuntimeTensor, TensorValue};

/// Predicate naming ops whose arguments skip the per-position dtype check.
pub type DtypeCheckExemption = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Convert runtime arguments into legacy tensors, appending to `out`.
pub fn convert_input_tensors(args: &[RuntimeTensor], out: &mut Vec<TensorValue>) -> Result<()> {
    out.reserve(args.len());
    for (index, arg) in args.iter().enumerate() {
        let tensor = arg
            .to_tensor_value()
            .with_context(|| format!("failed to convert argument #{}", index))?;
        out.push(tensor);
    }
    Ok(())
}

/// Check the argument count, then each argument's dtype unless `op_kernel`
/// is exempt.
pub fn validate_input_types<F>(
    op_kernel: &OpKernel,
    num_inputs: usize,
    dtype_of: F,
    is_exempt: &dyn Fn(&str) -> bool,
) -> Result<(), Status>
where
    F: Fn(usize) -> Option<DType>,
{
    let expected = op_kernel.input_types();
    if num_inputs != expected.len() {
        return Err(Status::invalid_argument(format!(
            "cannot compute {}: expected {} inputs, got {}",
            op_kernel.name(),
            expected.len(),
            num_inputs
        )));
    }
    if is_exempt(op_kernel.name()) {
        return Ok(());
    }
    for (index, expected) in expected.iter().enumerate() {
        let actual = dtype_of(index).ok_or_else(|| {
            Status::internal(format!("{}: input #{} is missing", op_kernel.name(), index))
        })?;
        if actual != *expected {
            return Err(Status::invalid_argument(format!(
                "cannot compute {} as input #{}(zero-based) was expected to be a {} tensor but is a {} tensor",
                op_kernel.name(),
                index,
                expected,
                actual
            )));
        }
    }
    Ok(())
}
