//! The kernel fallback execution engine.
//!
//! A request starts by attaching a [`FallbackRequestState`] to its request
//! context. Each op invocation then resolves a runner from the
//! [`OpKernelRunnerTable`] or [`OpKernelRunnerCache`], fills the thread's
//! scratch state, runs the legacy kernel synchronously or asynchronously and
//! publishes either every output plus the chain, or one error on all of them.
mod emit;
mod execute;
mod kernels;
mod request_state;
mod resource_array;
mod run_state;
mod runner_cache;
mod runner_table;
mod validate;

pub use kernels::{
    const_tensor, copy_if_small, create_op, execute_compat_core_runtime_dispatch, execute_op,
    execute_op_seq, get_device, get_resource, set_resource,
};
pub use request_state::{
    setup_request_context, setup_request_context_from_eager, FallbackRequestState,
    RequestStateOptions,
};
pub use resource_array::FallbackResourceArray;
pub use run_state::scratch_input_stats;
pub use runner_cache::OpKernelRunnerCache;
pub use runner_table::OpKernelRunnerTable;
pub use validate::{convert_input_tensors, validate_input_types, DtypeCheckExemption};
