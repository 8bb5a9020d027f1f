use std::env;
use std::fmt::Arguments;
use std::sync::{Mutex, OnceLock};

#[derive(Clone, Copy, PartialEq, Eq)]
enum TraceLevel {
    Off,
    Basic,
    Full,
}

const TARGET: &str = "kernel_fallback";

type LogListener = Box<dyn Fn(&str) + Send + Sync>;

static TRACE_LEVEL: OnceLock<TraceLevel> = OnceLock::new();
static LISTENERS: OnceLock<Mutex<Vec<LogListener>>> = OnceLock::new();

fn parse_trace_level(value: &str) -> TraceLevel {
    let normalized = value.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "1" | "basic" => TraceLevel::Basic,
        "full" => TraceLevel::Full,
        _ => TraceLevel::Off,
    }
}

fn trace_level() -> TraceLevel {
    *TRACE_LEVEL.get_or_init(|| {
        env::var("FALLBACK_TRACE")
            .ok()
            .as_deref()
            .map(parse_trace_level)
            .unwrap_or(TraceLevel::Off)
    })
}

fn trace_basic_enabled() -> bool {
    matches!(trace_level(), TraceLevel::Full | TraceLevel::Basic)
}

/// True when verbose op logging (attribute dumps, placement) is on.
pub fn vlog_enabled() -> bool {
    trace_level() == TraceLevel::Full
}

fn listeners() -> &'static Mutex<Vec<LogListener>> {
    LISTENERS.get_or_init(|| Mutex::new(Vec::new()))
}

/// Register a process-wide sink for placement and diagnostic messages.
pub fn add_log_listener<F>(listener: F)
where
    F: Fn(&str) + Send + Sync + 'static,
{
    listeners()
        .lock()
        .expect("log listeners mutex poisoned")
        .push(Box::new(listener));
}

/// Hand `msg` to every registered listener. Returns false when none exist.
pub fn log_to_listeners(msg: &str) -> bool {
    let listeners = listeners().lock().expect("log listeners mutex poisoned");
    if listeners.is_empty() {
        return false;
    }
    for listener in listeners.iter() {
        listener(msg);
    }
    true
}

/// Emit a warning message when trace level allows it.
pub fn emit_warning(args: Arguments) {
    if trace_basic_enabled() {
        tracing::warn!(target: TARGET, "{}", args);
    }
}

/// Emit an error message when trace level allows it.
pub fn emit_error(args: Arguments) {
    if trace_basic_enabled() {
        tracing::error!(target: TARGET, "{}", args);
    }
}

/// Emit a critical message unconditionally.
pub fn emit_critical(args: Arguments) {
    tracing::error!(target: TARGET, critical = true, "{}", args);
}

/// Emit a trace message when trace level allows it.
pub fn emit_trace(args: Arguments) {
    if trace_basic_enabled() {
        tracing::trace!(target: TARGET, "{}", args);
    }
}

/// Emit an info message unconditionally.
pub fn emit_info(args: Arguments) {
    tracing::info!(target: TARGET, "{}", args);
}

/// Emit a warning message via the logging subsystem.
#[macro_export]
macro_rules! warning {
    ($($arg:tt)*) => {
        $crate::logging::emit_warning(format_args!($($arg)*))
    };
}

/// Emit an error message via the logging subsystem.
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {
        $crate::logging::emit_error(format_args!($($arg)*))
    };
}

/// Emit a critical message via the logging subsystem.
#[macro_export]
macro_rules! critical {
    ($($arg:tt)*) => {
        $crate::logging::emit_critical(format_args!($($arg)*))
    };
}

/// Emit a trace message via the logging subsystem.
#[macro_export]
macro_rules! trace {
    ($($arg:tt)*) => {
        $crate::logging::emit_trace(format_args!($($arg)*))
    };
}

/// Emit an info message via the logging subsystem.
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {
        $crate::logging::emit_info(format_args!($($arg)*))
    };
}
