//! Synchronous and asynchronous dispatch into a legacy runner.
use std::sync::Arc;

use crate::error::Status;
use crate::legacy::{OpKernelContext, OpKernelRunner};
use crate::runtime::{AsyncValueRef, Chain, ExecutionContext};
use crate::tensor::FallbackTensor;

use super::emit::emit_error_and_set_in_results;
use super::run_state::RunState;

/// Run the kernel on the calling thread and publish its outputs, or one
/// error, before returning.
pub(crate) fn execute_sync(
    exec_ctx: &ExecutionContext,
    op_name: &str,
    runner: &dyn OpKernelRunner,
    run_state: &RunState,
    args: &[AsyncValueRef<FallbackTensor>],
    results: &[AsyncValueRef<FallbackTensor>],
    chain: Option<&AsyncValueRef<Chain>>,
) {
    let mut context = OpKernelContext::with_scratch(
        &run_state.params,
        &run_state.input_tensors,
        args,
        &run_state.input_slots,
        results.len(),
    );
    runner.run(&mut context);
    if !context.status().is_ok() {
        emit_error_and_set_in_results(exec_ctx, op_name, context.status(), results, chain);
        return;
    }
    publish_outputs(exec_ctx, op_name, &mut context, results, chain);
}

/// State shared with the completion callback of an asynchronous kernel.
struct AsyncExecutionState {
    exec_ctx: ExecutionContext,
    op_name: String,
    results: Vec<AsyncValueRef<FallbackTensor>>,
    chain: Option<AsyncValueRef<Chain>>,
}

impl AsyncExecutionState {
    fn complete(self: Arc<Self>, mut context: OpKernelContext<'static>) {
        if !context.status().is_ok() {
            emit_error_and_set_in_results(
                &self.exec_ctx,
                &self.op_name,
                context.status(),
                &self.results,
                self.chain.as_ref(),
            );
            return;
        }
        let host = Arc::clone(self.exec_ctx.host());
        host.enqueue_work(move || {
            publish_outputs(
                &self.exec_ctx,
                &self.op_name,
                &mut context,
                &self.results,
                self.chain.as_ref(),
            );
        });
    }
}

/// Start the kernel and return at once. `results` and `chain` stay
/// unavailable until the kernel calls back: errors are set from the callback
/// thread, values from the host work queue.
pub(crate) fn execute_async(
    exec_ctx: &ExecutionContext,
    op_name: &str,
    runner: &dyn OpKernelRunner,
    run_state: &RunState,
    args: &[AsyncValueRef<FallbackTensor>],
    results: &[AsyncValueRef<FallbackTensor>],
    chain: Option<&AsyncValueRef<Chain>>,
) {
    let context = OpKernelContext::with_owned(
        run_state.params.clone(),
        run_state.owned_inputs(args),
        results.len(),
    );
    let state = Arc::new(AsyncExecutionState {
        exec_ctx: exec_ctx.clone(),
        op_name: op_name.to_string(),
        results: results.to_vec(),
        chain: chain.cloned(),
    });
    runner.run_async(context, Box::new(move |context| state.complete(context)));
}

fn publish_outputs(
    exec_ctx: &ExecutionContext,
    op_name: &str,
    context: &mut OpKernelContext<'_>,
    results: &[AsyncValueRef<FallbackTensor>],
    chain: Option<&AsyncValueRef<Chain>>,
) {
    let mut outputs = Vec::with_capacity(results.len());
    for index in 0..results.len() {
        match context.take_output(index) {
            Some(output) => outputs.push(output),
            None => {
                let status = Status::internal(format!("output #{} was not set", index));
                emit_error_and_set_in_results(exec_ctx, op_name, &status, results, chain);
                return;
            }
        }
    }
    for (result, output) in results.iter().zip(outputs) {
        result.emplace(FallbackTensor::new(output));
    }
    if let Some(chain) = chain {
        chain.emplace(Chain);
    }
}
