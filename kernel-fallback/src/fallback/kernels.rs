//! Fallback kernels callable from the async runtime.
use std::sync::Arc;

use crate::error::{ErrorCode, FallbackError, Status};
use crate::legacy::{
    attr_value_map_debug_string, AttrBuilder, AttrValueMap, Device, LegacyKernelRunner, OpAttrs,
    OpKernelRunner,
};
use crate::logging::{log_to_listeners, vlog_enabled};
use crate::runtime::{
    run_when_ready, AsyncValueRef, Chain, ExecutionContext, Readiness, ResourceKey,
    TraceEventKind, TraceMe, TracingLevel,
};
use crate::tensor::{FallbackTensor, ImmutableTensor, RuntimeTensor, TensorProto, TensorValue};

use super::emit::{emit_error_and_set_in_results, set_error_in_results};
use super::execute::{execute_async, execute_sync};
use super::resource_array::unset_resource_error;
use super::run_state::{acquire_run_state, RunState};
use super::validate::{convert_input_tensors, validate_input_types};
use super::{FallbackRequestState, OpKernelRunnerCache};

const MISSING_REQUEST_STATE: &str = "FallbackRequestState not found in RequestContext.";

fn request_state(exec_ctx: &ExecutionContext) -> Result<&FallbackRequestState, Status> {
    exec_ctx
        .request_ctx()
        .get_data_if_exists::<FallbackRequestState>()
        .ok_or_else(|| Status::not_found(MISSING_REQUEST_STATE))
}

fn status_error(exec_ctx: &ExecutionContext, op_name: &str, status: &Status) -> FallbackError {
    emit_error_and_set_in_results(exec_ctx, op_name, status, &[], None)
}

fn unconstructed_results(num_results: usize) -> Vec<AsyncValueRef<FallbackTensor>> {
    (0..num_results)
        .map(|_| AsyncValueRef::unconstructed())
        .collect()
}

/// Build the runner for `op_name` and register it under `op_key` once
/// `in_chain` is available.
///
/// A leading `tf.` is stripped from `op_name`. Attributes are built before
/// returning. A construction error or an errored `in_chain` fails the
/// returned chain.
pub fn create_op(
    exec_ctx: &ExecutionContext,
    in_chain: &AsyncValueRef<Chain>,
    op_key: i64,
    device: &str,
    num_args: usize,
    op_name: &str,
    attr_builder: AttrBuilder<'_>,
) -> AsyncValueRef<Chain> {
    let op_name = op_name.strip_prefix("tf.").unwrap_or(op_name);
    let out_chain = AsyncValueRef::unconstructed();
    let attrs = match LegacyKernelRunner::build_attrs(op_name, attr_builder) {
        Ok(attrs) => attrs,
        Err(status) => {
            out_chain.set_error(status_error(exec_ctx, op_name, &status));
            return out_chain;
        }
    };
    let exec_ctx = exec_ctx.clone();
    let op_name = op_name.to_string();
    let device = device.to_string();
    let done = out_chain.clone();
    in_chain.and_then(move |chain| {
        if let Err(err) = chain {
            done.set_error(err.clone());
            return;
        }
        match register_runner(&exec_ctx, op_key, &device, num_args, &op_name, attrs) {
            Ok(()) => done.emplace(Chain),
            Err(err) => done.set_error(err),
        }
    });
    out_chain
}

fn register_runner(
    exec_ctx: &ExecutionContext,
    op_key: i64,
    device: &str,
    num_args: usize,
    op_name: &str,
    attrs: AttrValueMap,
) -> Result<(), FallbackError> {
    let _trace = TraceMe::new(exec_ctx.host(), TraceEventKind::CreateOp, || {
        op_name.to_string()
    });
    let request_state =
        request_state(exec_ctx).map_err(|status| status_error(exec_ctx, op_name, &status))?;
    let runner = LegacyKernelRunner::create_with_attrs(
        op_name,
        device,
        num_args,
        attrs,
        request_state.device_manager(),
        request_state.function_library(),
    )
    .map_err(|status| status_error(exec_ctx, op_name, &status))?;
    if !request_state.runner_table().insert(op_key, Arc::new(runner)) {
        return Err(exec_ctx.host().emit_error(
            format!("kernel runner already exists: {}", op_name),
            ErrorCode::AlreadyExists,
        ));
    }
    crate::trace!("fallback.create_op key={} op={} device={}", op_key, op_name, device);
    Ok(())
}

/// Run the non-side-effecting op registered under `op_key`.
///
/// Execution waits until every argument is available.
pub fn execute_op(
    exec_ctx: &ExecutionContext,
    args: &[AsyncValueRef<FallbackTensor>],
    num_results: usize,
    op_key: i64,
    op_name: &str,
) -> Vec<AsyncValueRef<FallbackTensor>> {
    let results = unconstructed_results(num_results);
    schedule_op(exec_ctx, op_key, op_name, args, None, &results, None);
    results
}

/// Run the side-effecting op registered under `op_key` after `in_chain`.
pub fn execute_op_seq(
    exec_ctx: &ExecutionContext,
    in_chain: &AsyncValueRef<Chain>,
    args: &[AsyncValueRef<FallbackTensor>],
    num_results: usize,
    op_key: i64,
    op_name: &str,
) -> (AsyncValueRef<Chain>, Vec<AsyncValueRef<FallbackTensor>>) {
    let out_chain = AsyncValueRef::unconstructed();
    let results = unconstructed_results(num_results);
    schedule_op(
        exec_ctx,
        op_key,
        op_name,
        args,
        Some(in_chain),
        &results,
        Some(&out_chain),
    );
    (out_chain, results)
}

fn schedule_op(
    exec_ctx: &ExecutionContext,
    op_key: i64,
    op_name: &str,
    args: &[AsyncValueRef<FallbackTensor>],
    in_chain: Option<&AsyncValueRef<Chain>>,
    results: &[AsyncValueRef<FallbackTensor>],
    out_chain: Option<&AsyncValueRef<Chain>>,
) {
    let ready = args.iter().all(AsyncValueRef::is_available)
        && in_chain.map_or(true, AsyncValueRef::is_available);
    if ready {
        execute_when_ready(exec_ctx, op_key, op_name, args, in_chain, results, out_chain);
        return;
    }
    let mut pending = args
        .iter()
        .map(|arg| arg as &dyn Readiness)
        .collect::<Vec<_>>();
    if let Some(in_chain) = in_chain {
        pending.push(in_chain);
    }
    let exec_ctx = exec_ctx.clone();
    let op_name = op_name.to_string();
    let args = args.to_vec();
    let in_chain = in_chain.cloned();
    let results = results.to_vec();
    let out_chain = out_chain.cloned();
    run_when_ready(&pending, move || {
        execute_when_ready(
            &exec_ctx,
            op_key,
            &op_name,
            &args,
            in_chain.as_ref(),
            &results,
            out_chain.as_ref(),
        );
    });
}

fn execute_when_ready(
    exec_ctx: &ExecutionContext,
    op_key: i64,
    op_name: &str,
    args: &[AsyncValueRef<FallbackTensor>],
    in_chain: Option<&AsyncValueRef<Chain>>,
    results: &[AsyncValueRef<FallbackTensor>],
    out_chain: Option<&AsyncValueRef<Chain>>,
) {
    let upstream = in_chain
        .and_then(AsyncValueRef::get_error)
        .or_else(|| args.iter().find_map(AsyncValueRef::get_error));
    if let Some(err) = upstream {
        set_error_in_results(err, results, out_chain);
        return;
    }
    let request_state = match request_state(exec_ctx) {
        Ok(request_state) => request_state,
        Err(status) => {
            emit_error_and_set_in_results(exec_ctx, op_name, &status, results, out_chain);
            return;
        }
    };
    let runner = match request_state.runner_table().get(op_key) {
        Some(runner) => runner,
        None => {
            crate::critical!("no kernel runner for op key {} ({})", op_key, op_name);
            let status = Status::internal(format!("no kernel runner for op key {}", op_key));
            emit_error_and_set_in_results(exec_ctx, op_name, &status, results, out_chain);
            return;
        }
    };
    let mut trace = TraceMe::new(exec_ctx.host(), TraceEventKind::OpExecute, || {
        op_name.to_string()
    });
    trace.append_metadata(|level| {
        op_trace_metadata(exec_ctx, op_name, level, runner.as_ref(), args)
    });

    let mut run_state = acquire_run_state();
    if !run_state.fill_inputs(args) {
        let status = Status::internal("argument is not available");
        emit_error_and_set_in_results(exec_ctx, op_name, &status, results, out_chain);
        return;
    }
    run_state.set_up_params(exec_ctx, request_state, runner.as_ref());
    maybe_log_device_placement(request_state, op_name, &run_state);
    dispatch(
        exec_ctx,
        op_name,
        request_state,
        runner.as_ref(),
        &run_state,
        args,
        results,
        out_chain,
    );
}

#[allow(clippy::too_many_arguments)]
fn dispatch(
    exec_ctx: &ExecutionContext,
    op_name: &str,
    request_state: &FallbackRequestState,
    runner: &dyn OpKernelRunner,
    run_state: &RunState,
    args: &[AsyncValueRef<FallbackTensor>],
    results: &[AsyncValueRef<FallbackTensor>],
    chain: Option<&AsyncValueRef<Chain>>,
) {
    let validated = validate_input_types(
        runner.op_kernel(),
        run_state.input_slots.len(),
        |index| run_state.input(index, args).map(TensorValue::dtype),
        &|name: &str| request_state.is_dtype_check_exempt(name),
    );
    if let Err(status) = validated {
        emit_error_and_set_in_results(exec_ctx, op_name, &status, results, chain);
        return;
    }
    if runner.is_async() {
        execute_async(exec_ctx, op_name, runner, run_state, args, results, chain);
    } else {
        execute_sync(exec_ctx, op_name, runner, run_state, args, results, chain);
    }
}

fn op_trace_metadata(
    exec_ctx: &ExecutionContext,
    op_name: &str,
    level: TracingLevel,
    runner: &dyn OpKernelRunner,
    args: &[AsyncValueRef<FallbackTensor>],
) -> Vec<(String, String)> {
    let mut metadata = vec![("id".to_string(), exec_ctx.request_ctx().id().to_string())];
    if level >= TracingLevel::Verbose {
        let long_name = exec_ctx
            .location()
            .debug_info
            .clone()
            .unwrap_or_else(|| op_name.to_string());
        metadata.push(("long_name".to_string(), long_name));
    }
    if level >= TracingLevel::Debug {
        for (index, arg) in args.iter().enumerate() {
            if let Some(tensor) = arg.get() {
                metadata.push((format!("input{}", index), tensor.tensor().debug_string()));
            }
        }
        metadata.push((
            "attrs".to_string(),
            attr_value_map_debug_string(runner.op_kernel().attrs()),
        ));
    }
    metadata
}

fn maybe_log_device_placement(
    request_state: &FallbackRequestState,
    op_name: &str,
    run_state: &RunState,
) {
    if !request_state.log_device_placement() && !vlog_enabled() {
        return;
    }
    let device = run_state
        .params
        .device
        .as_ref()
        .map(|device| device.name())
        .unwrap_or("<unknown>");
    let message = format!("Executing op {} in device {}", op_name, device);
    if !log_to_listeners(&message) {
        crate::info!("{}", message);
    }
}

/// Dynamic dispatch from the core runtime: the runner is resolved through
/// the per-request cache and arguments are converted from runtime tensors.
pub fn execute_compat_core_runtime_dispatch(
    exec_ctx: &ExecutionContext,
    op_name: &str,
    device_name: &str,
    arguments: &[RuntimeTensor],
    num_results: usize,
    attrs: &OpAttrs,
) -> (AsyncValueRef<Chain>, Vec<AsyncValueRef<FallbackTensor>>) {
    let chain = AsyncValueRef::unconstructed();
    let results = unconstructed_results(num_results);
    let fail = |status: Status| {
        emit_error_and_set_in_results(exec_ctx, op_name, &status, &results, Some(&chain));
    };
    let request_state = match request_state(exec_ctx) {
        Ok(request_state) => request_state,
        Err(status) => {
            fail(status);
            return (chain, results);
        }
    };
    let cache = match exec_ctx
        .request_ctx()
        .resource_context()
        .get_or_create_resource::<OpKernelRunnerCache>(ResourceKey::RunnerCache)
    {
        Ok(cache) => cache,
        Err(err) => {
            fail(Status::internal(format!("{:#}", err)));
            return (chain, results);
        }
    };
    if vlog_enabled() {
        let mut attr_map = AttrValueMap::new();
        if attrs.fill_attr_value_map(&mut attr_map).is_ok() {
            crate::trace!(
                "core_runtime.dispatch op={} device={} attrs=[{}]",
                op_name,
                device_name,
                attr_value_map_debug_string(&attr_map)
            );
        }
    }
    let attr_builder = |map: &mut AttrValueMap| attrs.fill_attr_value_map(map);
    let runner = match cache.get_or_create(
        exec_ctx.location(),
        op_name,
        device_name,
        arguments.len(),
        &attr_builder,
        request_state,
    ) {
        Ok(runner) => runner,
        Err(status) => {
            fail(status);
            return (chain, results);
        }
    };

    let mut run_state = acquire_run_state();
    if let Err(err) = convert_input_tensors(arguments, &mut run_state.input_tensors) {
        fail(Status::internal(format!("{:#}", err)));
        return (chain, results);
    }
    run_state.use_copied_inputs();
    run_state.set_up_params(exec_ctx, request_state, runner.as_ref());
    maybe_log_device_placement(request_state, op_name, &run_state);
    dispatch(
        exec_ctx,
        op_name,
        request_state,
        runner.as_ref(),
        &run_state,
        &[],
        &results,
        Some(&chain),
    );
    drop(run_state);
    (chain, results)
}

/// Store an immutable copy of `arg` at `index` of the resource array once
/// `in_chain` is available. An upstream error skips the write and fails the
/// returned chain.
pub fn set_resource(
    exec_ctx: &ExecutionContext,
    in_chain: &AsyncValueRef<Chain>,
    arg: &FallbackTensor,
    index: usize,
) -> AsyncValueRef<Chain> {
    let out_chain = AsyncValueRef::unconstructed();
    let resource_array = match request_state(exec_ctx) {
        Ok(request_state) => Arc::clone(request_state.resource_array()),
        Err(status) => {
            out_chain.set_error(status_error(exec_ctx, "SetResource", &status));
            return out_chain;
        }
    };
    let host = Arc::clone(exec_ctx.host());
    let tensor = arg.tensor().clone();
    let done = out_chain.clone();
    in_chain.and_then(move |chain| {
        if let Err(err) = chain {
            done.set_error(err.clone());
            return;
        }
        let _trace = TraceMe::new(&host, TraceEventKind::ResourceWrite, || {
            format!("set_resource[{}]", index)
        });
        resource_array.set_resource(index, &tensor);
        done.emplace(Chain);
    });
    out_chain
}

/// Read resource-array entries once `in_chain` is available.
///
/// The output chain mirrors `in_chain`, or carries the error when the
/// request has no fallback state. An unset index fails its result with
/// `FailedPrecondition`.
pub fn get_resource(
    exec_ctx: &ExecutionContext,
    in_chain: &AsyncValueRef<Chain>,
    indices: &[usize],
) -> (AsyncValueRef<Chain>, Vec<AsyncValueRef<FallbackTensor>>) {
    let out_chain = AsyncValueRef::unconstructed();
    let results = unconstructed_results(indices.len());
    let resource_array = match request_state(exec_ctx) {
        Ok(request_state) => Arc::clone(request_state.resource_array()),
        Err(status) => {
            let err = status_error(exec_ctx, "GetResource", &status);
            set_error_in_results(&err, &results, Some(&out_chain));
            return (out_chain, results);
        }
    };
    in_chain.forward_to(out_chain.clone());
    let host = Arc::clone(exec_ctx.host());
    let indices = indices.to_vec();
    let pending = results.clone();
    in_chain.and_then(move |chain| {
        let _trace = TraceMe::new(&host, TraceEventKind::ResourceRead, || {
            format!("get_resource{:?}", indices)
        });
        if let Err(err) = chain {
            set_error_in_results(err, &pending, None);
            return;
        }
        for (result, index) in pending.iter().zip(indices) {
            match resource_array.try_get_resource(index) {
                Some(resource) => resource.forward_to(result.clone()),
                None => result.set_error(unset_resource_error(index)),
            }
        }
    });
    (out_chain, results)
}

/// Give each result its own immutable copy of a mutable `arg`; share an
/// immutable one.
pub fn copy_if_small(arg: &FallbackTensor, num_results: usize) -> Vec<FallbackTensor> {
    if arg.is_immutable() {
        return vec![arg.clone(); num_results];
    }
    (0..num_results)
        .map(|_| ImmutableTensor::create(arg.tensor()))
        .collect()
}

/// Build a tensor from its serialized description.
pub fn const_tensor(
    exec_ctx: &ExecutionContext,
    serialized: &str,
) -> Result<FallbackTensor, FallbackError> {
    TensorProto::parse(serialized)
        .and_then(|proto| proto.to_tensor_value())
        .map(FallbackTensor::new)
        .map_err(|err| {
            exec_ctx
                .host()
                .emit_error(format!("{:#}", err), ErrorCode::InvalidArgument)
        })
}

/// Resolve `device_name`, preferring the request's custom device.
pub fn get_device(
    exec_ctx: &ExecutionContext,
    device_name: &str,
) -> Result<Arc<Device>, FallbackError> {
    let request_state =
        request_state(exec_ctx).map_err(|status| status_error(exec_ctx, "GetDevice", &status))?;
    let device = request_state
        .device_manager()
        .lookup_device(device_name)
        .map_err(|status| status_error(exec_ctx, "GetDevice", &status))?;
    match request_state.custom_device() {
        Some(custom) if custom.name() == device.name() => Ok(Arc::clone(custom)),
        _ => Ok(device),
    }
}
