pub mod logging;

pub mod config;
pub mod error;
pub mod fallback;
pub mod legacy;
pub mod runtime;
pub mod tensor;

pub use config::FallbackConfig;
pub use error::{convert_status_code, Code, ErrorCode, FallbackError, Status};
pub use fallback::{
    const_tensor, copy_if_small, create_op, execute_compat_core_runtime_dispatch, execute_op,
    execute_op_seq, get_device, get_resource, set_resource, setup_request_context,
    setup_request_context_from_eager, validate_input_types, FallbackRequestState, FallbackResourceArray,
    OpKernelRunnerCache, OpKernelRunnerTable, RequestStateOptions,
};
pub use legacy::{
    AttrValue, AttrValueMap, DeviceManager, FunctionLibraryRuntime, KernelRegistry, OpAttrs,
    OpKernelRunner,
};
pub use runtime::{AsyncValueRef, Chain, ExecutionContext, HostContext, Location};
pub use tensor::{DType, FallbackTensor, ImmutableTensor, RuntimeTensor, Tensor, TensorValue};
