//! Minimal legacy kernel model the fallback engine drives.
mod attrs;
mod cancellation;
mod context;
mod device;
mod eager;
mod function_library;
mod kernels;
mod registry;
mod rendezvous;
mod runner;
mod step;

pub use attrs::{
    attr_dtype, attr_value_map_debug_string, AttrBuilder, AttrValue, AttrValueMap, OpAttr,
    OpAttrs,
};
pub use cancellation::{CancellationManager, CancellationToken};
pub use context::{
    inline_intra_op_runner, InputSlot, IntraOpRunner, OpKernel, OpKernelContext, OpKernelParams,
};
pub use device::{
    AllocatorAttributes, Device, DeviceManager, DEVICE_TYPE_CPU, HOST_CPU_DEVICE_NAME,
};
pub use eager::EagerContext;
pub use function_library::FunctionLibraryRuntime;
pub use registry::{BuiltKernel, KernelConstruction, KernelFactory, KernelRegistry};
pub use rendezvous::{LocalRendezvous, Rendezvous};
pub use runner::{
    AsyncDone, AsyncOpKernel, KernelImpl, LegacyKernelRunner, OpKernelRunner, SyncOpKernel,
};
pub use step::{
    CollectiveExecutorHandle, ModelMetadata, ResourceMgr, ScopedStepContainer, SessionMetadata,
};
