use std::sync::Arc;

use crate::error::Status;

use super::{
    CollectiveExecutorHandle, DeviceManager, FunctionLibraryRuntime, LocalRendezvous, Rendezvous,
    ScopedStepContainer,
};

/// Eager execution context whose step resources a request may reuse.
pub struct EagerContext {
    device_manager: Arc<DeviceManager>,
    function_library: Arc<FunctionLibraryRuntime>,
    step_container: Arc<ScopedStepContainer>,
    collective_executor: Option<Arc<CollectiveExecutorHandle>>,
}

impl EagerContext {
    /// Fails when the device manager has no host CPU.
    pub fn new(
        device_manager: Arc<DeviceManager>,
        function_library: Arc<FunctionLibraryRuntime>,
        step_id: i64,
    ) -> Result<Self, Status> {
        let resource_manager = device_manager
            .host_cpu()
            .map(|device| Arc::clone(device.resource_manager()))
            .ok_or_else(|| Status::failed_precondition("eager context requires a host CPU device"))?;
        Ok(Self {
            device_manager,
            function_library,
            step_container: Arc::new(ScopedStepContainer::new(step_id, resource_manager)),
            collective_executor: None,
        })
    }

    pub fn with_collective_executor(mut self, handle: CollectiveExecutorHandle) -> Self {
        self.collective_executor = Some(Arc::new(handle));
        self
    }

    pub fn device_manager(&self) -> &Arc<DeviceManager> {
        &self.device_manager
    }

    pub fn function_library(&self) -> &Arc<FunctionLibraryRuntime> {
        &self.function_library
    }

    pub fn step_container(&self) -> &Arc<ScopedStepContainer> {
        &self.step_container
    }

    pub fn collective_executor(&self) -> Option<&Arc<CollectiveExecutorHandle>> {
        self.collective_executor.as_ref()
    }

    /// Fresh rendezvous for `step_id`.
    pub fn create_rendezvous(&self, step_id: i64) -> Arc<dyn Rendezvous> {
        Arc::new(LocalRendezvous::new(step_id))
    }
}
