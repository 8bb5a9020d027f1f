use std::fmt;
use std::time::Instant;

use anyhow::{anyhow, Result};
use serde::ser::{SerializeStruct, Serializer};
use serde::{Deserialize, Serialize};

use super::HostContext;

/// Verbosity of op trace events. `None` in the config disables tracing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TracingLevel {
    /// Request id only.
    Default,
    /// Adds the op's long name.
    Verbose,
    /// Adds per-input dtype/shape and the attribute dump.
    Debug,
}

impl TracingLevel {
    pub fn from_ident(ident: &str) -> Result<Self> {
        match ident.trim().to_ascii_lowercase().as_str() {
            "default" | "minimal" => Ok(TracingLevel::Default),
            "verbose" | "medium" => Ok(TracingLevel::Verbose),
            "debug" | "full" => Ok(TracingLevel::Debug),
            other => Err(anyhow!("unknown tracing level: {}", other)),
        }
    }
}

/// Kind of trace event emitted by the fallback kernels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceEventKind {
    OpExecute,
    CreateOp,
    ResourceRead,
    ResourceWrite,
}

impl fmt::Display for TraceEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceEventKind::OpExecute => write!(f, "OpExecute"),
            TraceEventKind::CreateOp => write!(f, "CreateOp"),
            TraceEventKind::ResourceRead => write!(f, "ResourceRead"),
            TraceEventKind::ResourceWrite => write!(f, "ResourceWrite"),
        }
    }
}

/// Trace record for a single fallback kernel invocation.
#[derive(Debug, Clone)]
pub struct TraceEvent {
    pub kind: TraceEventKind,
    pub name: String,
    pub metadata: String,
    pub micros: u64,
}

impl Serialize for TraceEvent {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_struct("TraceEvent", 4)?;
        state.serialize_field("kind", &self.kind)?;
        state.serialize_field("name", &self.name)?;
        state.serialize_field("metadata", &self.metadata)?;
        state.serialize_field("micros", &self.micros)?;
        state.end()
    }
}

/// Encode key/value pairs as `#k1=v1,k2=v2#`.
pub fn encode_metadata<K, V>(pairs: &[(K, V)]) -> String
where
    K: fmt::Display,
    V: fmt::Display,
{
    let body = pairs
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join(",");
    format!("#{}#", body)
}

/// Scope that records a [`TraceEvent`] into the host sink when dropped.
///
/// Inert when the host has no tracing level.
pub struct TraceMe<'a> {
    host: &'a HostContext,
    active: Option<ActiveTrace>,
}

struct ActiveTrace {
    kind: TraceEventKind,
    name: String,
    metadata: Vec<(String, String)>,
    start: Instant,
}

impl<'a> TraceMe<'a> {
    pub fn new<F>(host: &'a HostContext, kind: TraceEventKind, name: F) -> Self
    where
        F: FnOnce() -> String,
    {
        let active = host.tracing_level().map(|_| ActiveTrace {
            kind,
            name: name(),
            metadata: Vec::new(),
            start: Instant::now(),
        });
        Self { host, active }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Append metadata produced by `f`, which only runs when tracing is on.
    pub fn append_metadata<F>(&mut self, f: F)
    where
        F: FnOnce(TracingLevel) -> Vec<(String, String)>,
    {
        let level = match self.host.tracing_level() {
            Some(level) => level,
            None => return,
        };
        if let Some(active) = self.active.as_mut() {
            active.metadata.extend(f(level));
        }
    }
}

impl Drop for TraceMe<'_> {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            self.host.record_trace(TraceEvent {
                kind: active.kind,
                name: active.name,
                metadata: encode_metadata(&active.metadata),
                micros: active.start.elapsed().as_micros() as u64,
            });
        }
    }
}
