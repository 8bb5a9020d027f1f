use std::env;
use std::sync::OnceLock;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::runtime::TracingLevel;

/// Process-level knobs of the fallback engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    /// `None` disables op trace events.
    pub tracing_level: Option<TracingLevel>,
    /// Trace events the host keeps; older ones are dropped first.
    pub trace_capacity: usize,
    /// Host work queue size; 0 lets rayon pick.
    pub work_queue_threads: usize,
    /// Op names whose arguments skip the per-position dtype check.
    pub dtype_check_exemptions: Vec<String>,
}

pub const DEFAULT_TRACE_CAPACITY: usize = 4096;

static GLOBAL: OnceLock<FallbackConfig> = OnceLock::new();

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            tracing_level: None,
            trace_capacity: DEFAULT_TRACE_CAPACITY,
            work_queue_threads: 0,
            dtype_check_exemptions: Vec::new(),
        }
    }
}

impl FallbackConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("failed to parse fallback config")
    }

    /// Read `FALLBACK_TRACING_LEVEL`, `FALLBACK_TRACE_CAPACITY`,
    /// `FALLBACK_WORK_QUEUE_THREADS` and `FALLBACK_DTYPE_CHECK_EXEMPT`
    /// (comma separated).
    pub fn from_env() -> Result<Self> {
        let mut config = FallbackConfig::default();
        if let Ok(level) = env::var("FALLBACK_TRACING_LEVEL") {
            if !level.trim().is_empty() && level.trim() != "0" {
                config.tracing_level = Some(TracingLevel::from_ident(&level)?);
            }
        }
        if let Ok(capacity) = env::var("FALLBACK_TRACE_CAPACITY") {
            config.trace_capacity = capacity.trim().parse().map_err(|err| {
                anyhow!("invalid FALLBACK_TRACE_CAPACITY {:?}: {}", capacity, err)
            })?;
        }
        if let Ok(threads) = env::var("FALLBACK_WORK_QUEUE_THREADS") {
            config.work_queue_threads = threads.trim().parse().map_err(|err| {
                anyhow!("invalid FALLBACK_WORK_QUEUE_THREADS {:?}: {}", threads, err)
            })?;
        }
        if let Ok(exempt) = env::var("FALLBACK_DTYPE_CHECK_EXEMPT") {
            config.dtype_check_exemptions = exempt
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect();
        }
        Ok(config)
    }

    /// Environment config, read once. Falls back to defaults when the
    /// environment is malformed.
    pub fn global() -> &'static FallbackConfig {
        GLOBAL.get_or_init(|| match FallbackConfig::from_env() {
            Ok(config) => config,
            Err(err) => {
                crate::warning!("ignoring fallback environment config: {:#}", err);
                FallbackConfig::default()
            }
        })
    }

    pub fn is_dtype_check_exempt(&self, op_name: &str) -> bool {
        self.dtype_check_exemptions.iter().any(|name| name == op_name)
    }
}
