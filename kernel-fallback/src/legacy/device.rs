use std::sync::Arc;

use rayon::ThreadPool;

use crate::error::Status;

use super::ResourceMgr;

pub const DEVICE_TYPE_CPU: &str = "CPU";

/// Full name of the local host CPU device.
pub const HOST_CPU_DEVICE_NAME: &str = "/job:localhost/replica:0/task:0/device:CPU:0";

/// Allocation hints for kernel inputs and outputs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocatorAttributes {
    pub on_host: bool,
}

/// A legacy device. CPU devices may carry their own intra-op pool.
pub struct Device {
    name: String,
    device_type: String,
    resource_manager: Arc<ResourceMgr>,
    intra_op_pool: Option<Arc<ThreadPool>>,
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("name", &self.name)
            .field("device_type", &self.device_type)
            .finish_non_exhaustive()
    }
}

impl Device {
    pub fn new(name: impl Into<String>, device_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            device_type: device_type.into(),
            resource_manager: Arc::new(ResourceMgr::default()),
            intra_op_pool: None,
        }
    }

    pub fn host_cpu() -> Self {
        Self::new(HOST_CPU_DEVICE_NAME, DEVICE_TYPE_CPU)
    }

    /// Same device identity and resources, scheduled on `pool`.
    pub fn with_intra_op_pool(&self, pool: Arc<ThreadPool>) -> Self {
        Self {
            name: self.name.clone(),
            device_type: self.device_type.clone(),
            resource_manager: Arc::clone(&self.resource_manager),
            intra_op_pool: Some(pool),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn device_type(&self) -> &str {
        &self.device_type
    }

    pub fn resource_manager(&self) -> &Arc<ResourceMgr> {
        &self.resource_manager
    }

    pub fn intra_op_pool(&self) -> Option<&Arc<ThreadPool>> {
        self.intra_op_pool.as_ref()
    }
}

/// Directory of the devices visible to a session.
pub struct DeviceManager {
    devices: Vec<Arc<Device>>,
}

impl DeviceManager {
    pub fn new(devices: Vec<Arc<Device>>) -> Self {
        Self { devices }
    }

    /// A manager holding only the host CPU.
    pub fn with_host_cpu() -> Self {
        Self::new(vec![Arc::new(Device::host_cpu())])
    }

    /// Resolve a device by full name or by its `/device:TYPE:N` suffix.
    pub fn lookup_device(&self, name: &str) -> Result<Arc<Device>, Status> {
        self.devices
            .iter()
            .find(|device| {
                device.name() == name || (name.starts_with('/') && device.name().ends_with(name))
            })
            .cloned()
            .ok_or_else(|| Status::not_found(format!("unknown device: {}", name)))
    }

    /// First CPU device.
    pub fn host_cpu(&self) -> Option<&Arc<Device>> {
        self.devices
            .iter()
            .find(|device| device.device_type() == DEVICE_TYPE_CPU)
    }

    pub fn list_devices(&self) -> &[Arc<Device>] {
        &self.devices
    }
}
