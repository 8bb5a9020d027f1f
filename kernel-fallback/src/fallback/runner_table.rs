use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::legacy::OpKernelRunner;

/// Runners keyed by the op key assigned when the graph was lowered.
#[derive(Default)]
pub struct OpKernelRunnerTable {
    runners: RwLock<HashMap<i64, Arc<dyn OpKernelRunner>>>,
}

impl OpKernelRunnerTable {
    /// Returns false, keeping the existing runner, when `key` is taken.
    pub fn insert(&self, key: i64, runner: Arc<dyn OpKernelRunner>) -> bool {
        let mut runners = self.runners.write().expect("runner table lock poisoned");
        if runners.contains_key(&key) {
            return false;
        }
        runners.insert(key, runner);
        true
    }

    pub fn get(&self, key: i64) -> Option<Arc<dyn OpKernelRunner>> {
        self.runners
            .read()
            .expect("runner table lock poisoned")
            .get(&key)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.runners.read().expect("runner table lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
