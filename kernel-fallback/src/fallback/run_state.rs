//! Per-thread scratch storage reused across kernel invocations.
use std::cell::Cell;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use crate::legacy::{InputSlot, OpKernelParams, OpKernelRunner};
use crate::runtime::{AsyncValueRef, ExecutionContext};
use crate::tensor::{FallbackTensor, TensorValue};

use super::FallbackRequestState;

#[derive(Default)]
pub(crate) struct RunState {
    /// Owned copies of shared, mutable arguments.
    pub(crate) input_tensors: Vec<TensorValue>,
    /// One slot per kernel input, pointing at a copy or at the argument.
    pub(crate) input_slots: Vec<InputSlot>,
    pub(crate) params: OpKernelParams,
}

thread_local! {
    static RUN_STATE: Cell<RunState> = Cell::new(RunState::default());
}

/// Exclusive use of this thread's [`RunState`]. Dropping it clears the
/// inputs and parameters and parks the buffers for the next invocation.
pub(crate) struct RunStateGuard {
    state: RunState,
}

impl Deref for RunStateGuard {
    type Target = RunState;

    fn deref(&self) -> &RunState {
        &self.state
    }
}

impl DerefMut for RunStateGuard {
    fn deref_mut(&mut self) -> &mut RunState {
        &mut self.state
    }
}

impl Drop for RunStateGuard {
    fn drop(&mut self) {
        let mut state = std::mem::take(&mut self.state);
        state.input_tensors.clear();
        state.input_slots.clear();
        state.params.reset();
        let _ = RUN_STATE.try_with(|cell| cell.set(state));
    }
}

/// Take this thread's scratch state. A nested invocation on the same thread
/// gets a fresh state.
pub(crate) fn acquire_run_state() -> RunStateGuard {
    let state = RUN_STATE
        .try_with(|cell| cell.take())
        .unwrap_or_default();
    RunStateGuard { state }
}

/// Length and capacity of the parked input copies of the calling thread.
pub fn scratch_input_stats() -> (usize, usize) {
    RUN_STATE
        .try_with(|cell| {
            let state = cell.take();
            let stats = (state.input_tensors.len(), state.input_tensors.capacity());
            cell.set(state);
            stats
        })
        .unwrap_or((0, 0))
}

impl RunState {
    /// Reference immutable or uniquely held arguments, copy the rest.
    ///
    /// Every argument must be concrete.
    pub(crate) fn fill_inputs(&mut self, args: &[AsyncValueRef<FallbackTensor>]) -> bool {
        self.input_tensors.clear();
        self.input_slots.clear();
        for (index, arg) in args.iter().enumerate() {
            let tensor = match arg.get() {
                Some(tensor) => tensor,
                None => return false,
            };
            if tensor.is_immutable() || arg.is_unique() {
                self.input_slots.push(InputSlot::Borrowed(index));
            } else {
                self.input_slots.push(InputSlot::Copied(self.input_tensors.len()));
                self.input_tensors.push(tensor.tensor().clone());
            }
        }
        true
    }

    /// Inputs already converted into `input_tensors`.
    pub(crate) fn use_copied_inputs(&mut self) {
        self.input_slots.clear();
        self.input_slots
            .extend((0..self.input_tensors.len()).map(InputSlot::Copied));
    }

    pub(crate) fn input<'a>(
        &'a self,
        index: usize,
        args: &'a [AsyncValueRef<FallbackTensor>],
    ) -> Option<&'a TensorValue> {
        match self.input_slots.get(index)? {
            InputSlot::Copied(slot) => self.input_tensors.get(*slot),
            InputSlot::Borrowed(slot) => args.get(*slot)?.get().map(FallbackTensor::tensor),
        }
    }

    /// Owned inputs for a context that outlives this call.
    pub(crate) fn owned_inputs(&self, args: &[AsyncValueRef<FallbackTensor>]) -> Vec<TensorValue> {
        (0..self.input_slots.len())
            .filter_map(|index| self.input(index, args).cloned())
            .collect()
    }

    /// Point the parameters at this invocation's runner and request.
    pub(crate) fn set_up_params(
        &mut self,
        exec_ctx: &ExecutionContext,
        request_state: &FallbackRequestState,
        runner: &dyn OpKernelRunner,
    ) {
        let params = &mut self.params;
        params.step_id = exec_ctx.request_ctx().id();
        params.device = Some(
            request_state
                .custom_device()
                .cloned()
                .unwrap_or_else(|| Arc::clone(runner.device())),
        );
        params.op_kernel = Some(Arc::clone(runner.op_kernel()));
        params.resource_manager = runner.resource_manager().cloned();
        params.input_alloc_attrs.clear();
        params
            .input_alloc_attrs
            .extend_from_slice(runner.input_alloc_attrs());
        params.output_alloc_attrs.clear();
        params
            .output_alloc_attrs
            .extend_from_slice(runner.output_alloc_attrs());
        params.step_container = Some(Arc::clone(request_state.step_container()));
        params.function_library = runner.function_library_runtime().cloned();
        params.runner = Some(Arc::clone(request_state.runner()));
        params.collective_executor = request_state.collective_executor().cloned();
        params.rendezvous = request_state.rendezvous().cloned();
        params.session_metadata = Some(Arc::clone(request_state.session_metadata()));
        params.cancellation_manager = Some(Arc::clone(request_state.cancellation_manager()));
    }
}
