use std::sync::mpsc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use kernel_fallback::{execute_op, execute_op_seq, AsyncValueRef, Chain, ErrorCode, Status};

use crate::common::{self, Harness};

#[test]
fn results_resolve_on_host_work_queue() -> Result<()> {
    let harness = Harness::new()?;
    harness.create(0, "DeferredAddOne", 1, kernel_fallback::OpAttrs::none())?;
    let enqueued_before = harness.host.enqueued_work_count();

    let in_chain = AsyncValueRef::available(Chain);
    let (out_chain, results) = execute_op_seq(
        &harness.exec_ctx,
        &in_chain,
        &[common::scalar_arg(7i32)],
        1,
        0,
        "DeferredAddOne",
    );
    assert!(results[0].is_unavailable());
    assert!(out_chain.is_unavailable());
    assert_eq!(harness.kernels.pending_len(), 1);

    let (sender, receiver) = mpsc::channel();
    results[0].and_then(move |_| {
        let name = std::thread::current().name().map(str::to_string);
        let _ = sender.send(name);
    });

    for pending in harness.kernels.take_pending() {
        pending.finish(common::add_one);
    }
    let value = common::wait_tensor(&results[0])?;
    assert_eq!(common::scalar_i32(&value)?, 8);
    out_chain
        .wait_timeout(Duration::from_secs(5))
        .ok_or_else(|| anyhow!("chain did not resolve"))??;
    assert!(harness.host.enqueued_work_count() > enqueued_before);

    let thread_name = receiver
        .recv_timeout(Duration::from_secs(5))?
        .ok_or_else(|| anyhow!("publishing thread has no name"))?;
    assert!(thread_name.starts_with("fallback-host-"));
    Ok(())
}

#[test]
fn async_error_is_set_from_callback() -> Result<()> {
    let harness = Harness::new()?;
    harness.create(0, "DeferredAddOne", 1, kernel_fallback::OpAttrs::none())?;
    let in_chain = AsyncValueRef::available(Chain);
    let (out_chain, results) = execute_op_seq(
        &harness.exec_ctx,
        &in_chain,
        &[common::scalar_arg(1i32)],
        1,
        0,
        "DeferredAddOne",
    );
    let enqueued_before = harness.host.enqueued_work_count();

    for pending in harness.kernels.take_pending() {
        pending.finish(|ctx| ctx.set_status(Status::aborted("device lost")));
    }
    assert!(results[0].is_error());
    assert!(out_chain.is_error());
    let err = common::expect_error(&results[0])?;
    assert_eq!(err.code(), ErrorCode::Aborted);
    assert_eq!(
        err.message(),
        "error running kernel fallback kernel DeferredAddOne: device lost"
    );
    assert_eq!(common::expect_error(&out_chain)?, err);
    assert_eq!(harness.host.enqueued_work_count(), enqueued_before);
    Ok(())
}

#[test]
fn async_kernel_gets_owned_inputs() -> Result<()> {
    let harness = Harness::new()?;
    harness.create(0, "DeferredAddOne", 1, kernel_fallback::OpAttrs::none())?;
    let results = execute_op(
        &harness.exec_ctx,
        &[common::scalar_arg(41i32)],
        1,
        0,
        "DeferredAddOne",
    );
    let mut pending = harness.kernels.take_pending();
    let invocation = pending.pop().ok_or_else(|| anyhow!("no pending invocation"))?;
    assert_eq!(invocation.ctx.num_inputs(), 1);
    assert!(!invocation.ctx.input_is_borrowed(0));
    assert_eq!(invocation.ctx.step_id(), common::REQUEST_ID);

    let finisher = std::thread::spawn(move || invocation.finish(common::add_one));
    finisher
        .join()
        .map_err(|_| anyhow!("finisher thread panicked"))?;
    assert_eq!(common::scalar_i32(&common::wait_tensor(&results[0])?)?, 42);
    Ok(())
}
