//! Shared futures of the async runtime.
//!
//! An [`AsyncValueRef`] starts unconstructed and is set exactly once, either
//! to a value or to a [`FallbackError`]. Callbacks registered with
//! [`AsyncValueRef::and_then`] run on the thread that sets the value, or
//! inline when the value is already available.
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use once_cell::sync::OnceCell;

use crate::error::FallbackError;

/// Payload of a completion token.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Chain;

type Waiter<T> = Box<dyn FnOnce(Result<&T, &FallbackError>) + Send>;

struct AsyncValue<T> {
    state: OnceCell<Result<T, FallbackError>>,
    waiters: Mutex<Vec<Waiter<T>>>,
    ready: Condvar,
}

pub struct AsyncValueRef<T> {
    inner: Arc<AsyncValue<T>>,
}

impl<T> Clone for AsyncValueRef<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for AsyncValueRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.state.get() {
            None => f.write_str("AsyncValueRef(<unavailable>)"),
            Some(Ok(value)) => write!(f, "AsyncValueRef({:?})", value),
            Some(Err(err)) => write!(f, "AsyncValueRef(error: {})", err),
        }
    }
}

impl<T: Send + Sync + 'static> AsyncValueRef<T> {
    fn from_state(state: OnceCell<Result<T, FallbackError>>) -> Self {
        Self {
            inner: Arc::new(AsyncValue {
                state,
                waiters: Mutex::new(Vec::new()),
                ready: Condvar::new(),
            }),
        }
    }

    /// A value that will be set later.
    pub fn unconstructed() -> Self {
        Self::from_state(OnceCell::new())
    }

    pub fn available(value: T) -> Self {
        Self::from_state(OnceCell::with_value(Ok(value)))
    }

    pub fn error(err: FallbackError) -> Self {
        Self::from_state(OnceCell::with_value(Err(err)))
    }

    pub fn emplace(&self, value: T) {
        self.set_state(Ok(value));
    }

    pub fn set_error(&self, err: FallbackError) {
        self.set_state(Err(err));
    }

    fn set_state(&self, state: Result<T, FallbackError>) {
        let already_set = self.inner.state.set(state).is_err();
        debug_assert!(!already_set, "async value set twice");
        if already_set {
            return;
        }
        let waiters = {
            let mut waiters = self
                .inner
                .waiters
                .lock()
                .expect("async value waiters mutex poisoned");
            self.inner.ready.notify_all();
            std::mem::take(&mut *waiters)
        };
        if let Some(state) = self.inner.state.get() {
            for waiter in waiters {
                waiter(state.as_ref());
            }
        }
    }

    /// True once the value or an error has been set.
    pub fn is_available(&self) -> bool {
        self.inner.state.get().is_some()
    }

    pub fn is_unavailable(&self) -> bool {
        !self.is_available()
    }

    pub fn is_concrete(&self) -> bool {
        matches!(self.inner.state.get(), Some(Ok(_)))
    }

    pub fn is_error(&self) -> bool {
        matches!(self.inner.state.get(), Some(Err(_)))
    }

    pub fn get(&self) -> Option<&T> {
        self.inner.state.get().and_then(|state| state.as_ref().ok())
    }

    pub fn get_error(&self) -> Option<&FallbackError> {
        self.inner.state.get().and_then(|state| state.as_ref().err())
    }

    /// True when this handle is the only reference to the value.
    pub fn is_unique(&self) -> bool {
        Arc::strong_count(&self.inner) == 1
    }

    pub fn ptr_eq(&self, other: &AsyncValueRef<T>) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Run `f` once the value is available.
    pub fn and_then<F>(&self, f: F)
    where
        F: FnOnce(Result<&T, &FallbackError>) + Send + 'static,
    {
        let mut waiters = self
            .inner
            .waiters
            .lock()
            .expect("async value waiters mutex poisoned");
        if let Some(state) = self.inner.state.get() {
            drop(waiters);
            f(state.as_ref());
            return;
        }
        waiters.push(Box::new(f));
    }

    /// Block the calling thread until the value is available.
    pub fn wait(&self) -> Result<&T, FallbackError> {
        let mut waiters = self
            .inner
            .waiters
            .lock()
            .expect("async value waiters mutex poisoned");
        while self.inner.state.get().is_none() {
            waiters = self
                .inner
                .ready
                .wait(waiters)
                .expect("async value waiters mutex poisoned");
        }
        drop(waiters);
        self.resolved()
    }

    /// Like [`wait`](Self::wait) but gives up after `timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<&T, FallbackError>> {
        let deadline = Instant::now() + timeout;
        let mut waiters = self
            .inner
            .waiters
            .lock()
            .expect("async value waiters mutex poisoned");
        while self.inner.state.get().is_none() {
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (guard, _) = self
                .inner
                .ready
                .wait_timeout(waiters, deadline - now)
                .expect("async value waiters mutex poisoned");
            waiters = guard;
        }
        drop(waiters);
        Some(self.resolved())
    }

    fn resolved(&self) -> Result<&T, FallbackError> {
        match self.inner.state.get() {
            Some(Ok(value)) => Ok(value),
            Some(Err(err)) => Err(err.clone()),
            None => unreachable!("resolved() called on an unavailable async value"),
        }
    }

    /// Mirror this value, or its error, into `dest` when it resolves.
    pub fn forward_to(&self, dest: AsyncValueRef<T>)
    where
        T: Clone,
    {
        self.and_then(move |state| match state {
            Ok(value) => dest.emplace(value.clone()),
            Err(err) => dest.set_error(err.clone()),
        });
    }
}

/// Type-erased view used to wait on values of different payload types.
pub trait Readiness {
    fn is_ready(&self) -> bool;
    fn on_ready(&self, f: Box<dyn FnOnce() + Send>);
}

impl<T: Send + Sync + 'static> Readiness for AsyncValueRef<T> {
    fn is_ready(&self) -> bool {
        self.is_available()
    }

    fn on_ready(&self, f: Box<dyn FnOnce() + Send>) {
        self.and_then(move |_| f());
    }
}

/// Run `f` after every value in `values` is available (value or error).
///
/// Runs inline when nothing is pending.
pub fn run_when_ready<F>(values: &[&dyn Readiness], f: F)
where
    F: FnOnce() + Send + 'static,
{
    let pending = values
        .iter()
        .filter(|value| !value.is_ready())
        .collect::<Vec<_>>();
    if pending.is_empty() {
        f();
        return;
    }
    let remaining = Arc::new(AtomicUsize::new(pending.len()));
    let f = Arc::new(Mutex::new(Some(f)));
    for value in pending {
        let remaining = Arc::clone(&remaining);
        let f = Arc::clone(&f);
        value.on_ready(Box::new(move || {
            if remaining.fetch_sub(1, Ordering::AcqRel) != 1 {
                return;
            }
            let f = f.lock().expect("run_when_ready mutex poisoned").take();
            if let Some(f) = f {
                f();
            }
        }));
    }
}
