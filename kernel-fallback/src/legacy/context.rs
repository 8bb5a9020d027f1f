use std::borrow::Cow;
use std::sync::Arc;

use anyhow::{anyhow, Result};

use crate::error::Status;
use crate::runtime::AsyncValueRef;
use crate::tensor::{DType, FallbackTensor, TensorValue};

use super::{
    AllocatorAttributes, AttrValueMap, CancellationManager, CollectiveExecutorHandle, Device,
    FunctionLibraryRuntime, Rendezvous, ResourceMgr, ScopedStepContainer, SessionMetadata,
};

/// Kernel metadata: op name, declared input types and output types.
#[derive(Debug, Clone, PartialEq)]
pub struct OpKernel {
    name: String,
    input_types: Vec<DType>,
    output_types: Vec<DType>,
    attrs: AttrValueMap,
}

impl OpKernel {
    pub fn new(
        name: impl Into<String>,
        input_types: Vec<DType>,
        output_types: Vec<DType>,
        attrs: AttrValueMap,
    ) -> Self {
        Self {
            name: name.into(),
            input_types,
            output_types,
            attrs,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn input_types(&self) -> &[DType] {
        &self.input_types
    }

    pub fn output_types(&self) -> &[DType] {
        &self.output_types
    }

    pub fn num_inputs(&self) -> usize {
        self.input_types.len()
    }

    pub fn num_outputs(&self) -> usize {
        self.output_types.len()
    }

    pub fn attrs(&self) -> &AttrValueMap {
        &self.attrs
    }
}

/// Schedules closures for a kernel's intra-op parallelism.
pub type IntraOpRunner = Arc<dyn Fn(Box<dyn FnOnce() + Send>) + Send + Sync>;

/// Runner that executes the closure on the calling thread.
pub fn inline_intra_op_runner() -> IntraOpRunner {
    Arc::new(|work| work())
}

/// Everything a kernel sees besides its inputs.
#[derive(Clone, Default)]
pub struct OpKernelParams {
    pub step_id: i64,
    pub device: Option<Arc<Device>>,
    pub op_kernel: Option<Arc<OpKernel>>,
    pub resource_manager: Option<Arc<ResourceMgr>>,
    pub input_alloc_attrs: Vec<AllocatorAttributes>,
    pub output_alloc_attrs: Vec<AllocatorAttributes>,
    pub step_container: Option<Arc<ScopedStepContainer>>,
    pub function_library: Option<Arc<FunctionLibraryRuntime>>,
    pub runner: Option<IntraOpRunner>,
    pub collective_executor: Option<Arc<CollectiveExecutorHandle>>,
    pub rendezvous: Option<Arc<dyn Rendezvous>>,
    pub session_metadata: Option<Arc<SessionMetadata>>,
    pub cancellation_manager: Option<Arc<CancellationManager>>,
}

impl OpKernelParams {
    /// Release every reference while keeping the attribute buffers.
    pub fn reset(&mut self) {
        self.step_id = 0;
        self.device = None;
        self.op_kernel = None;
        self.resource_manager = None;
        self.input_alloc_attrs.clear();
        self.output_alloc_attrs.clear();
        self.step_container = None;
        self.function_library = None;
        self.runner = None;
        self.collective_executor = None;
        self.rendezvous = None;
        self.session_metadata = None;
        self.cancellation_manager = None;
    }
}

/// Where input `i` of a scratch-backed context lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputSlot {
    /// Index into the copied tensors.
    Copied(usize),
    /// Index into the caller's arguments.
    Borrowed(usize),
}

enum Inputs<'a> {
    Scratch {
        copies: &'a [TensorValue],
        args: &'a [AsyncValueRef<FallbackTensor>],
        slots: &'a [InputSlot],
    },
    Owned(Vec<TensorValue>),
}

/// Per-invocation view handed to a kernel.
pub struct OpKernelContext<'a> {
    params: Cow<'a, OpKernelParams>,
    inputs: Inputs<'a>,
    outputs: Vec<Option<TensorValue>>,
    status: Status,
}

impl<'a> OpKernelContext<'a> {
    /// Context over thread-local scratch storage.
    pub fn with_scratch(
        params: &'a OpKernelParams,
        copies: &'a [TensorValue],
        args: &'a [AsyncValueRef<FallbackTensor>],
        slots: &'a [InputSlot],
        num_outputs: usize,
    ) -> Self {
        Self {
            params: Cow::Borrowed(params),
            inputs: Inputs::Scratch {
                copies,
                args,
                slots,
            },
            outputs: vec![None; num_outputs],
            status: Status::ok(),
        }
    }

    pub fn params(&self) -> &OpKernelParams {
        &self.params
    }

    pub fn num_inputs(&self) -> usize {
        match &self.inputs {
            Inputs::Scratch { slots, .. } => slots.len(),
            Inputs::Owned(inputs) => inputs.len(),
        }
    }

    pub fn input(&self, index: usize) -> Result<&TensorValue> {
        let input = match &self.inputs {
            Inputs::Scratch {
                copies,
                args,
                slots,
            } => match slots.get(index) {
                Some(InputSlot::Copied(slot)) => copies.get(*slot),
                Some(InputSlot::Borrowed(slot)) => args
                    .get(*slot)
                    .and_then(|arg| arg.get())
                    .map(FallbackTensor::tensor),
                None => None,
            },
            Inputs::Owned(inputs) => inputs.get(index),
        };
        input.ok_or_else(|| anyhow!("input {} out of range ({} inputs)", index, self.num_inputs()))
    }

    /// True when input `index` refers to the caller's tensor without a copy.
    pub fn input_is_borrowed(&self, index: usize) -> bool {
        match &self.inputs {
            Inputs::Scratch { slots, .. } => matches!(slots.get(index), Some(InputSlot::Borrowed(_))),
            Inputs::Owned(_) => false,
        }
    }

    pub fn num_outputs(&self) -> usize {
        self.outputs.len()
    }

    pub fn set_output(&mut self, index: usize, value: TensorValue) -> Result<()> {
        let num_outputs = self.outputs.len();
        let slot = self
            .outputs
            .get_mut(index)
            .ok_or_else(|| anyhow!("output {} out of range ({} outputs)", index, num_outputs))?;
        *slot = Some(value);
        Ok(())
    }

    pub fn output(&self, index: usize) -> Option<&TensorValue> {
        self.outputs.get(index).and_then(Option::as_ref)
    }

    pub fn take_output(&mut self, index: usize) -> Option<TensorValue> {
        self.outputs.get_mut(index).and_then(Option::take)
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn set_status(&mut self, status: Status) {
        self.status = status;
    }

    pub fn op_kernel(&self) -> Option<&Arc<OpKernel>> {
        self.params.op_kernel.as_ref()
    }

    pub fn step_id(&self) -> i64 {
        self.params.step_id
    }

    pub fn cancellation_manager(&self) -> Option<&Arc<CancellationManager>> {
        self.params.cancellation_manager.as_ref()
    }

    pub fn rendezvous(&self) -> Option<&Arc<dyn Rendezvous>> {
        self.params.rendezvous.as_ref()
    }

    /// Schedule `work` on the intra-op runner, inline when none is set.
    pub fn run_intra_op<F>(&self, work: F)
    where
        F: FnOnce() + Send + 'static,
    {
        match &self.params.runner {
            Some(runner) => runner(Box::new(work)),
            None => work(),
        }
    }
}

impl OpKernelContext<'static> {
    /// Context that owns its parameters and inputs.
    pub fn with_owned(params: OpKernelParams, inputs: Vec<TensorValue>, num_outputs: usize) -> Self {
        Self {
            params: Cow::Owned(params),
            inputs: Inputs::Owned(inputs),
            outputs: vec![None; num_outputs],
            status: Status::ok(),
        }
    }
}
