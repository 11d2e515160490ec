//! Per-evaluation sandbox state.
//!
//! This module provides:
//! - [`Sandbox`]: An isolated QuickJS runtime and context for one widget
//! - [`LogEntry`] and [`LogLevel`]: Console output captured from guest code

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rquickjs::{Context, Ctx, Function, Runtime, Value};
use tracing::{debug, error, info, warn};

use widget_composer_common::LoadError;

/// Isolated execution context for one widget.
///
/// Every sandbox owns its own QuickJS runtime, so two widgets never share a
/// heap. Calls into guest code go through [`Sandbox::with`], which arms the
/// wall-clock deadline for the duration of the call.
pub struct Sandbox {
    /// Widget identifier for tracing.
    identifier: String,

    /// The guest context. Declared before `runtime` so it is dropped first.
    context: Context,

    runtime: Runtime,

    /// Deadline of the call currently running, if any.
    deadline: Arc<Mutex<Option<Instant>>>,

    /// Set when the interrupt handler stopped guest code.
    interrupted: Arc<AtomicBool>,

    /// Console output collected from guest code.
    logs: Rc<RefCell<Vec<LogEntry>>>,

    timeout: Duration,
}

/// A single console entry from guest code.
#[derive(Debug, Clone)]
pub struct LogEntry {
    /// Log level (debug, info, warn, error).
    pub level: LogLevel,

    /// Log message content.
    pub message: String,

    /// Timestamp when the log was recorded.
    pub timestamp: Instant,
}

/// Log level for guest logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug-level messages.
    Debug,
    /// Informational messages.
    Info,
    /// Warning messages.
    Warn,
    /// Error messages.
    Error,
}

impl LogLevel {
    /// Convert a numeric level coming from the guest console shim.
    ///
    /// Unknown values default to Info.
    pub fn from_i32(level: i32) -> Self {
        match level {
            0 => LogLevel::Debug,
            2 => LogLevel::Warn,
            3 => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warn => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

impl Sandbox {
    /// Wrap a freshly created runtime and context.
    pub(crate) fn new(
        identifier: String,
        runtime: Runtime,
        context: Context,
        timeout: Duration,
    ) -> Self {
        let deadline: Arc<Mutex<Option<Instant>>> = Arc::new(Mutex::new(None));
        let interrupted = Arc::new(AtomicBool::new(false));

        let handler_deadline = Arc::clone(&deadline);
        let handler_flag = Arc::clone(&interrupted);
        runtime.set_interrupt_handler(Some(Box::new(move || {
            let expired = handler_deadline
                .lock()
                .is_some_and(|deadline| Instant::now() >= deadline);
            if expired {
                handler_flag.store(true, Ordering::SeqCst);
            }
            expired
        })));

        Self {
            identifier,
            context,
            runtime,
            deadline,
            interrupted,
            logs: Rc::new(RefCell::new(Vec::new())),
            timeout,
        }
    }

    /// Widget identifier this sandbox belongs to.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Run a closure inside the guest context under the call deadline.
    pub fn with<F, R>(&self, f: F) -> R
    where
        F: for<'js> FnOnce(Ctx<'js>) -> R,
    {
        self.interrupted.store(false, Ordering::SeqCst);
        *self.deadline.lock() = Some(Instant::now() + self.timeout);
        let result = self.context.with(f);
        *self.deadline.lock() = None;
        result
    }

    /// Returns `true` if the last call was stopped by the deadline.
    pub fn was_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// The configured per-call timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Create the guest console sink bound to this sandbox's log buffer.
    pub(crate) fn log_function<'js>(&self, ctx: &Ctx<'js>) -> rquickjs::Result<Function<'js>> {
        let logs = Rc::clone(&self.logs);
        let identifier = self.identifier.clone();
        Function::new(ctx.clone(), move |level: i32, message: String| {
            record(&logs, &identifier, LogLevel::from_i32(level), message);
        })
    }

    /// Snapshot of the console output collected so far.
    pub fn logs(&self) -> Vec<LogEntry> {
        self.logs.borrow().clone()
    }

    /// Attribute a value thrown out of guest code to this sandbox's widget.
    pub(crate) fn load_error(&self, thrown: Thrown) -> LoadError {
        if self.was_interrupted() {
            return LoadError::execution(
                &self.identifier,
                format!("interrupted after {} ms", self.timeout.as_millis()),
            );
        }
        match thrown {
            Thrown::Capability(capability) => LoadError::capability(&self.identifier, capability),
            Thrown::Message(message) => LoadError::execution(&self.identifier, message),
        }
    }

    /// Run the garbage collector of this sandbox's runtime.
    pub fn collect_garbage(&self) {
        self.runtime.run_gc();
    }
}

/// A value thrown out of guest code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Thrown {
    /// A `require` of a name outside the capability set.
    Capability(String),
    /// Any other exception, by message.
    Message(String),
}

/// Take the pending exception from the context and classify it.
///
/// Must be called inside the same context scope that produced `error`.
pub(crate) fn catch_thrown(ctx: &Ctx<'_>, error: rquickjs::Error) -> Thrown {
    if !matches!(error, rquickjs::Error::Exception) {
        return Thrown::Message(error.to_string());
    }

    let value = ctx.catch();
    if let Some(object) = value.as_object() {
        if let Ok(Some(capability)) = object.get::<_, Option<String>>("capability") {
            return Thrown::Capability(capability);
        }
        if let Ok(Some(message)) = object.get::<_, Option<String>>("message") {
            return Thrown::Message(message);
        }
    }
    Thrown::Message(stringify(ctx, value).unwrap_or_else(|| "unknown exception".to_string()))
}

fn stringify<'js>(ctx: &Ctx<'js>, value: Value<'js>) -> Option<String> {
    let to_string: Function<'js> = ctx.globals().get("String").ok()?;
    to_string.call((value,)).ok()
}

/// Store a guest log entry and re-emit it via tracing.
fn record(logs: &RefCell<Vec<LogEntry>>, identifier: &str, level: LogLevel, message: String) {
    match level {
        LogLevel::Debug => debug!(identifier, guest_log = true, "{}", message),
        LogLevel::Info => info!(identifier, guest_log = true, "{}", message),
        LogLevel::Warn => warn!(identifier, guest_log = true, "{}", message),
        LogLevel::Error => error!(identifier, guest_log = true, "{}", message),
    }

    logs.borrow_mut().push(LogEntry {
        level,
        message,
        timestamp: Instant::now(),
    });
}

impl std::fmt::Debug for Sandbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sandbox")
            .field("identifier", &self.identifier)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
