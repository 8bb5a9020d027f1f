use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};

use super::HostContext;

/// Named slots of the per-request resource context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKey {
    RunnerTable,
    RunnerCache,
    ResourceArray,
}

impl ResourceKey {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKey::RunnerTable => "OpKernelRunnerTableResourceName",
            ResourceKey::RunnerCache => "OpKernelRunnerCacheResourceName",
            ResourceKey::ResourceArray => "FallbackResourceArray",
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resources shared by every request built on the same context.
#[derive(Default)]
pub struct ResourceContext {
    resources: Mutex<HashMap<ResourceKey, Arc<dyn Any + Send + Sync>>>,
}

impl ResourceContext {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Return the resource under `key`, creating it with `T::default()` on
    /// first use.
    pub fn get_or_create_resource<T>(&self, key: ResourceKey) -> Result<Arc<T>>
    where
        T: Default + Send + Sync + 'static,
    {
        let resource = {
            let mut resources = self
                .resources
                .lock()
                .expect("resource context mutex poisoned");
            Arc::clone(
                resources
                    .entry(key)
                    .or_insert_with(|| Arc::new(T::default()) as Arc<dyn Any + Send + Sync>),
            )
        };
        resource
            .downcast::<T>()
            .map_err(|_| anyhow!("resource {} holds a different type", key))
    }
}

/// Typed bag of per-request data, one value per type.
#[derive(Default)]
pub struct ContextData {
    entries: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl ContextData {
    pub fn emplace<T: Send + Sync + 'static>(&mut self, value: T) {
        self.entries.insert(TypeId::of::<T>(), Box::new(value));
    }

    pub fn get<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.entries
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref::<T>())
    }

    pub fn get_mut<T: Send + Sync + 'static>(&mut self) -> Option<&mut T> {
        self.entries
            .get_mut(&TypeId::of::<T>())
            .and_then(|value| value.downcast_mut::<T>())
    }
}

pub struct RequestContextBuilder {
    id: i64,
    resource_context: Arc<ResourceContext>,
    context_data: ContextData,
}

impl RequestContextBuilder {
    pub fn new(id: i64, resource_context: Arc<ResourceContext>) -> Self {
        Self {
            id,
            resource_context,
            context_data: ContextData::default(),
        }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn resource_context(&self) -> &Arc<ResourceContext> {
        &self.resource_context
    }

    pub fn context_data(&self) -> &ContextData {
        &self.context_data
    }

    pub fn context_data_mut(&mut self) -> &mut ContextData {
        &mut self.context_data
    }

    pub fn build(self) -> Arc<RequestContext> {
        Arc::new(RequestContext {
            id: self.id,
            resource_context: self.resource_context,
            context_data: self.context_data,
        })
    }
}

pub struct RequestContext {
    id: i64,
    resource_context: Arc<ResourceContext>,
    context_data: ContextData,
}

impl RequestContext {
    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn resource_context(&self) -> &ResourceContext {
        &self.resource_context
    }

    pub fn get_data_if_exists<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.context_data.get::<T>()
    }
}

/// Source location of an op in the lowered program.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Location {
    pub id: u64,
    pub debug_info: Option<String>,
}

impl Location {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            debug_info: None,
        }
    }

    pub fn with_debug_info(mut self, debug_info: impl Into<String>) -> Self {
        self.debug_info = Some(debug_info.into());
        self
    }
}

/// Everything a kernel invocation needs from the runtime.
#[derive(Clone)]
pub struct ExecutionContext {
    host: Arc<HostContext>,
    request_ctx: Arc<RequestContext>,
    location: Location,
}

impl ExecutionContext {
    pub fn new(host: Arc<HostContext>, request_ctx: Arc<RequestContext>, location: Location) -> Self {
        Self {
            host,
            request_ctx,
            location,
        }
    }

    pub fn host(&self) -> &Arc<HostContext> {
        &self.host
    }

    pub fn request_ctx(&self) -> &Arc<RequestContext> {
        &self.request_ctx
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    /// Same host and request, different op location.
    pub fn at(&self, location: Location) -> Self {
        Self {
            host: Arc::clone(&self.host),
            request_ctx: Arc::clone(&self.request_ctx),
            location,
        }
    }
}
