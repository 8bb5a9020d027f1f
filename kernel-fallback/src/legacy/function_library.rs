use std::sync::Arc;

use super::{DeviceManager, KernelRegistry};

/// Kernel lookup scope shared by the runners of a session.
pub struct FunctionLibraryRuntime {
    device_manager: Arc<DeviceManager>,
    kernel_registry: KernelRegistry,
}

impl FunctionLibraryRuntime {
    pub fn new(device_manager: Arc<DeviceManager>, kernel_registry: KernelRegistry) -> Self {
        Self {
            device_manager,
            kernel_registry,
        }
    }

    pub fn device_manager(&self) -> &Arc<DeviceManager> {
        &self.device_manager
    }

    pub fn kernel_registry(&self) -> &KernelRegistry {
        &self.kernel_registry
    }
}
