use std::sync::RwLock;

use crate::error::{ErrorCode, FallbackError};
use crate::runtime::AsyncValueRef;
use crate::tensor::{FallbackTensor, ImmutableTensor, TensorValue};

/// Index-addressed long-lived tensors, such as captured variables.
///
/// Entries are stored as already-available immutable tensors, so reads hand
/// out the same shared value without copying.
#[derive(Default)]
pub struct FallbackResourceArray {
    resources: RwLock<Vec<Option<AsyncValueRef<FallbackTensor>>>>,
}

impl FallbackResourceArray {
    /// Store an immutable copy of `tensor` at `index`. Last write wins.
    pub fn set_resource(&self, index: usize, tensor: &TensorValue) {
        let value = AsyncValueRef::available(ImmutableTensor::create(tensor));
        let mut resources = self
            .resources
            .write()
            .expect("resource array lock poisoned");
        if resources.len() <= index {
            resources.resize(index + 1, None);
        }
        resources[index] = Some(value);
    }

    pub fn try_get_resource(&self, index: usize) -> Option<AsyncValueRef<FallbackTensor>> {
        self.resources
            .read()
            .expect("resource array lock poisoned")
            .get(index)
            .cloned()
            .flatten()
    }

    /// Value at `index`. The index must have been set; unset indices yield an
    /// error value and trip a debug assertion.
    pub fn get_resource(&self, index: usize) -> AsyncValueRef<FallbackTensor> {
        let resource = self.try_get_resource(index);
        debug_assert!(resource.is_some(), "resource array index {} is unset", index);
        resource.unwrap_or_else(|| AsyncValueRef::error(unset_resource_error(index)))
    }

    pub fn len(&self) -> usize {
        self.resources
            .read()
            .expect("resource array lock poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub(crate) fn unset_resource_error(index: usize) -> FallbackError {
    FallbackError::new(
        ErrorCode::FailedPrecondition,
        format!("resource array index {} is unset", index),
    )
}
