use crate::error::{convert_status_code, FallbackError, Status};
use crate::runtime::{AsyncValueRef, Chain, ExecutionContext};
use crate::tensor::FallbackTensor;

/// Translate `status` into one error value and set it on every result and
/// on the chain.
pub(crate) fn emit_error_and_set_in_results(
    exec_ctx: &ExecutionContext,
    op_name: &str,
    status: &Status,
    results: &[AsyncValueRef<FallbackTensor>],
    chain: Option<&AsyncValueRef<Chain>>,
) -> FallbackError {
    let err = exec_ctx.host().emit_error(
        format!(
            "error running kernel fallback kernel {}: {}",
            op_name,
            status.message()
        ),
        convert_status_code(status.code()),
    );
    set_error_in_results(&err, results, chain);
    err
}

/// Propagate an existing error without translating it.
pub(crate) fn set_error_in_results(
    err: &FallbackError,
    results: &[AsyncValueRef<FallbackTensor>],
    chain: Option<&AsyncValueRef<Chain>>,
) {
    for result in results {
        result.set_error(err.clone());
    }
    if let Some(chain) = chain {
        chain.set_error(err.clone());
    }
}
