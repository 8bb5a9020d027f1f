use std::collections::{HashMap, VecDeque};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

use crate::error::Status;
use crate::tensor::TensorValue;

/// Channel for handing tensors between ops of one step.
pub trait Rendezvous: Send + Sync {
    fn send(&self, key: &str, value: TensorValue) -> Result<(), Status>;
    /// Blocks until a value for `key` arrives or the rendezvous aborts.
    fn recv(&self, key: &str) -> Result<TensorValue, Status>;
    fn recv_timeout(&self, key: &str, timeout: Duration) -> Result<Option<TensorValue>, Status>;
    fn start_abort(&self, status: Status);
}

#[derive(Default)]
struct Table {
    values: HashMap<String, VecDeque<TensorValue>>,
    aborted: Option<Status>,
}

/// In-process rendezvous keyed by string.
pub struct LocalRendezvous {
    step_id: i64,
    table: Mutex<Table>,
    ready: Condvar,
}

impl LocalRendezvous {
    pub fn new(step_id: i64) -> Self {
        Self {
            step_id,
            table: Mutex::new(Table::default()),
            ready: Condvar::new(),
        }
    }

    pub fn step_id(&self) -> i64 {
        self.step_id
    }

    fn take(table: &mut Table, key: &str) -> Result<Option<TensorValue>, Status> {
        if let Some(status) = &table.aborted {
            return Err(status.clone());
        }
        Ok(table.values.get_mut(key).and_then(VecDeque::pop_front))
    }
}

impl Rendezvous for LocalRendezvous {
    fn send(&self, key: &str, value: TensorValue) -> Result<(), Status> {
        let mut table = self.table.lock().expect("rendezvous mutex poisoned");
        if let Some(status) = &table.aborted {
            return Err(status.clone());
        }
        table
            .values
            .entry(key.to_string())
            .or_default()
            .push_back(value);
        self.ready.notify_all();
        Ok(())
    }

    fn recv(&self, key: &str) -> Result<TensorValue, Status> {
        let mut table = self.table.lock().expect("rendezvous mutex poisoned");
        loop {
            if let Some(value) = Self::take(&mut table, key)? {
                return Ok(value);
            }
            table = self.ready.wait(table).expect("rendezvous mutex poisoned");
        }
    }

    fn recv_timeout(&self, key: &str, timeout: Duration) -> Result<Option<TensorValue>, Status> {
        let mut table = self.table.lock().expect("rendezvous mutex poisoned");
        if let Some(value) = Self::take(&mut table, key)? {
            return Ok(Some(value));
        }
        let (mut table, _) = self
            .ready
            .wait_timeout_while(table, timeout, |table| {
                table.aborted.is_none()
                    && table.values.get(key).map_or(true, VecDeque::is_empty)
            })
            .expect("rendezvous mutex poisoned");
        Self::take(&mut table, key)
    }

    fn start_abort(&self, status: Status) {
        let mut table = self.table.lock().expect("rendezvous mutex poisoned");
        if table.aborted.is_none() {
            table.aborted = Some(status);
            table.values.clear();
        }
        self.ready.notify_all();
    }
}
