use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

pub type CancellationToken = u64;

type CancelCallback = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct CancelState {
    cancelled: bool,
    callbacks: HashMap<CancellationToken, CancelCallback>,
}

/// Shared cancellation flag that kernels poll or register against.
#[derive(Default)]
pub struct CancellationManager {
    next_token: AtomicU64,
    state: Mutex<CancelState>,
}

impl CancellationManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_cancellation_token(&self) -> CancellationToken {
        self.next_token.fetch_add(1, Ordering::Relaxed)
    }

    /// Returns false, without registering, when already cancelled.
    pub fn register_callback<F>(&self, token: CancellationToken, callback: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.state.lock().expect("cancellation mutex poisoned");
        if state.cancelled {
            return false;
        }
        state.callbacks.insert(token, Box::new(callback));
        true
    }

    pub fn deregister_callback(&self, token: CancellationToken) -> bool {
        self.state
            .lock()
            .expect("cancellation mutex poisoned")
            .callbacks
            .remove(&token)
            .is_some()
    }

    /// Mark cancelled and run every registered callback once.
    pub fn start_cancel(&self) {
        let callbacks = {
            let mut state = self.state.lock().expect("cancellation mutex poisoned");
            if state.cancelled {
                return;
            }
            state.cancelled = true;
            std::mem::take(&mut state.callbacks)
        };
        for (_, callback) in callbacks {
            callback();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.lock().expect("cancellation mutex poisoned").cancelled
    }
}
