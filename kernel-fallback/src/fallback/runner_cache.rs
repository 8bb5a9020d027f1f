use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use once_cell::sync::OnceCell;

use crate::error::Status;
use crate::legacy::{AttrBuilder, LegacyKernelRunner, OpKernelRunner};
use crate::runtime::Location;

use super::FallbackRequestState;

type CacheSlot = Arc<OnceCell<Result<Arc<dyn OpKernelRunner>, Status>>>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    location: u64,
    op_name: String,
    device_name: String,
    num_args: usize,
    attrs: String,
}

/// Runners memoized by structural signature.
///
/// Concurrent first lookups of one key construct the runner once; every
/// caller sees that runner or that construction error. Failed slots are
/// dropped so a later call retries.
#[derive(Default)]
pub struct OpKernelRunnerCache {
    slots: Mutex<HashMap<CacheKey, CacheSlot>>,
}

impl OpKernelRunnerCache {
    pub fn get_or_create(
        &self,
        location: &Location,
        op_name: &str,
        device_name: &str,
        num_args: usize,
        attr_builder: AttrBuilder<'_>,
        request_state: &FallbackRequestState,
    ) -> Result<Arc<dyn OpKernelRunner>, Status> {
        let attrs = LegacyKernelRunner::build_attrs(op_name, attr_builder)?;
        let serialized = serde_json::to_string(&attrs).map_err(|err| {
            Status::internal(format!("failed to serialize attributes of {}: {}", op_name, err))
        })?;
        let key = CacheKey {
            location: location.id,
            op_name: op_name.to_string(),
            device_name: device_name.to_string(),
            num_args,
            attrs: serialized,
        };
        let slot = {
            let mut slots = self.slots.lock().expect("runner cache mutex poisoned");
            Arc::clone(slots.entry(key.clone()).or_default())
        };
        let result = slot
            .get_or_init(|| {
                crate::trace!(
                    "runner_cache.create op={} device={} location={}",
                    op_name,
                    device_name,
                    location.id
                );
                LegacyKernelRunner::create_with_attrs(
                    op_name,
                    device_name,
                    num_args,
                    attrs,
                    request_state.device_manager(),
                    request_state.function_library(),
                )
                .map(|runner| Arc::new(runner) as Arc<dyn OpKernelRunner>)
            })
            .clone();
        if result.is_err() {
            let mut slots = self.slots.lock().expect("runner cache mutex poisoned");
            if slots.get(&key).map_or(false, |current| Arc::ptr_eq(current, &slot)) {
                slots.remove(&key);
            }
        }
        result
    }

    pub fn len(&self) -> usize {
        self.slots.lock().expect("runner cache mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
