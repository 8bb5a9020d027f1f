#[path = "common/mod.rs"]
mod common;

#[path = "request/request_state.rs"]
mod request_state;
#[path = "request/resource_array.rs"]
mod resource_array;
#[path = "runners/runner_table.rs"]
mod runner_table;
#[path = "runners/runner_cache.rs"]
mod runner_cache;
#[path = "dispatch/dispatch_sync.rs"]
mod dispatch_sync;
#[path = "dispatch/dispatch_async.rs"]
mod dispatch_async;
#[path = "dispatch/dispatch_core_runtime.rs"]
mod dispatch_core_runtime;
#[path = "dispatch/validation.rs"]
mod validation;
#[path = "dispatch/run_state.rs"]
mod run_state;
#[path = "runtime/async_value.rs"]
mod async_value;
#[path = "runtime/tracing.rs"]
mod tracing_events;
#[path = "misc/errors.rs"]
mod errors;
#[path = "misc/tensors.rs"]
mod tensors;
#[path = "misc/config.rs"]
mod config;
#[path = "misc/legacy.rs"]
mod legacy;
