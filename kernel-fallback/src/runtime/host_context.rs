use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::config::FallbackConfig;
use crate::error::{ErrorCode, FallbackError};

use super::{TraceEvent, TracingLevel};

/// Owner of the runtime's work queue and trace sink.
pub struct HostContext {
    work_queue: ThreadPool,
    tracing_level: Option<TracingLevel>,
    trace_capacity: usize,
    trace_events: Mutex<VecDeque<TraceEvent>>,
    dropped_traces: AtomicUsize,
    enqueued: AtomicUsize,
}

impl HostContext {
    pub fn new(config: &FallbackConfig) -> Result<Arc<Self>> {
        let work_queue = ThreadPoolBuilder::new()
            .num_threads(config.work_queue_threads)
            .thread_name(|index| format!("fallback-host-{}", index))
            .build()
            .map_err(|err| anyhow!("failed to build host work queue: {}", err))?;
        Ok(Arc::new(Self {
            work_queue,
            tracing_level: config.tracing_level,
            trace_capacity: config.trace_capacity,
            trace_events: Mutex::new(VecDeque::new()),
            dropped_traces: AtomicUsize::new(0),
            enqueued: AtomicUsize::new(0),
        }))
    }

    /// Host built from [`FallbackConfig::global`].
    pub fn from_global_config() -> Result<Arc<Self>> {
        Self::new(FallbackConfig::global())
    }

    /// Post `work` onto the runtime's own queue.
    pub fn enqueue_work<F>(&self, work: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.enqueued.fetch_add(1, Ordering::SeqCst);
        self.work_queue.spawn(work);
    }

    pub fn enqueued_work_count(&self) -> usize {
        self.enqueued.load(Ordering::SeqCst)
    }

    /// Thread index of the calling thread when it belongs to the work queue.
    pub fn current_worker_index(&self) -> Option<usize> {
        self.work_queue.current_thread_index()
    }

    /// Log `message` and build the matching error value.
    pub fn emit_error(&self, message: impl Into<String>, code: ErrorCode) -> FallbackError {
        let err = FallbackError::new(code, message);
        crate::error!("{}", err);
        err
    }

    pub fn tracing_level(&self) -> Option<TracingLevel> {
        self.tracing_level
    }

    /// Keep `event`, evicting the oldest one when the sink is full.
    pub fn record_trace(&self, event: TraceEvent) {
        if self.trace_capacity == 0 {
            self.dropped_traces.fetch_add(1, Ordering::Relaxed);
            return;
        }
        let mut events = self
            .trace_events
            .lock()
            .expect("trace events mutex poisoned");
        if events.len() >= self.trace_capacity {
            events.pop_front();
            self.dropped_traces.fetch_add(1, Ordering::Relaxed);
        }
        events.push_back(event);
    }

    /// Snapshot of the retained trace events, oldest first.
    pub fn trace_events(&self) -> Vec<TraceEvent> {
        self.trace_events
            .lock()
            .expect("trace events mutex poisoned")
            .iter()
            .cloned()
            .collect()
    }

    /// Remove and return the retained trace events, oldest first.
    pub fn take_trace_events(&self) -> Vec<TraceEvent> {
        let mut events = self
            .trace_events
            .lock()
            .expect("trace events mutex poisoned");
        std::mem::take(&mut *events).into()
    }

    /// Events evicted or discarded because the sink was full.
    pub fn dropped_trace_count(&self) -> usize {
        self.dropped_traces.load(Ordering::Relaxed)
    }
}
