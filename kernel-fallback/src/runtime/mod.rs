mod async_value;
mod host_context;
mod request;
mod trace;

pub use async_value::{run_when_ready, AsyncValueRef, Chain, Readiness};
pub use host_context::HostContext;
pub use request::{
    ContextData, ExecutionContext, Location, RequestContext, RequestContextBuilder,
    ResourceContext, ResourceKey,
};
pub use trace::{encode_metadata, TraceEvent, TraceEventKind, TraceMe, TracingLevel};
