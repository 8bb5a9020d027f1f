use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::Status;

type Resource = Arc<dyn Any + Send + Sync>;

/// Named resources grouped by container.
#[derive(Default)]
pub struct ResourceMgr {
    containers: Mutex<HashMap<String, HashMap<String, Resource>>>,
}

impl ResourceMgr {
    pub fn create<T: Send + Sync + 'static>(
        &self,
        container: &str,
        name: &str,
        value: T,
    ) -> Result<(), Status> {
        let mut containers = self
            .containers
            .lock()
            .expect("resource manager mutex poisoned");
        let entries = containers.entry(container.to_string()).or_default();
        if entries.contains_key(name) {
            return Err(Status::already_exists(format!(
                "resource {}/{} already exists",
                container, name
            )));
        }
        entries.insert(name.to_string(), Arc::new(value));
        Ok(())
    }

    pub fn lookup<T: Send + Sync + 'static>(
        &self,
        container: &str,
        name: &str,
    ) -> Result<Arc<T>, Status> {
        let resource = self
            .containers
            .lock()
            .expect("resource manager mutex poisoned")
            .get(container)
            .and_then(|entries| entries.get(name))
            .cloned()
            .ok_or_else(|| {
                Status::not_found(format!("resource {}/{} does not exist", container, name))
            })?;
        resource.downcast::<T>().map_err(|_| {
            Status::invalid_argument(format!(
                "resource {}/{} has a different type",
                container, name
            ))
        })
    }

    /// Drop every resource in `container`. Returns how many were removed.
    pub fn cleanup(&self, container: &str) -> usize {
        self.containers
            .lock()
            .expect("resource manager mutex poisoned")
            .remove(container)
            .map(|entries| entries.len())
            .unwrap_or(0)
    }
}

/// Step-scoped resource container, emptied when dropped.
pub struct ScopedStepContainer {
    step_id: i64,
    name: String,
    resource_manager: Arc<ResourceMgr>,
}

impl ScopedStepContainer {
    pub fn new(step_id: i64, resource_manager: Arc<ResourceMgr>) -> Self {
        Self {
            step_id,
            name: format!("__per_step_{}", step_id),
            resource_manager,
        }
    }

    pub fn step_id(&self) -> i64 {
        self.step_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn create<T: Send + Sync + 'static>(&self, name: &str, value: T) -> Result<(), Status> {
        self.resource_manager.create(&self.name, name, value)
    }

    pub fn lookup<T: Send + Sync + 'static>(&self, name: &str) -> Result<Arc<T>, Status> {
        self.resource_manager.lookup(&self.name, name)
    }
}

impl Drop for ScopedStepContainer {
    fn drop(&mut self) {
        let removed = self.resource_manager.cleanup(&self.name);
        if removed > 0 {
            crate::trace!("step.cleanup container={} removed={}", self.name, removed);
        }
    }
}

/// Handle to the collective executor of a step.
#[derive(Debug)]
pub struct CollectiveExecutorHandle {
    step_id: i64,
}

impl CollectiveExecutorHandle {
    pub fn new(step_id: i64) -> Self {
        Self { step_id }
    }

    pub fn step_id(&self) -> i64 {
        self.step_id
    }
}

/// Identity of the model a request runs, as given by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelMetadata {
    pub name: String,
    pub version: i64,
}

/// Model identity as exposed to kernels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionMetadata {
    pub name: String,
    pub version: i64,
}

impl From<&ModelMetadata> for SessionMetadata {
    fn from(model: &ModelMetadata) -> Self {
        Self {
            name: model.name.clone(),
            version: model.version,
        }
    }
}
