//! Categorized log output for ddserver
//!
//! Every status, warning and error line goes through one process-wide
//! [`LogSink`]. The default sink prints to stdout with a right-aligned
//! category header and ANSI colors, starting each line with `\r` so that
//! log output overwrites a half-drawn console prompt instead of appending
//! to it.
//!
//! # Environment Variables
//!
//! - `DD_LOG_LEVEL=<level>` - off, error, warn, status, debug (or 0..4)
//! - `DD_NO_COLOR=1` - Disable ANSI colors in the default sink
//! - `DD_FLUSH_LOG=1` - Flush stdout after each line
//!
//! # Usage
//!
//! ```ignore
//! use ddserver_core::{kerror, kwarn, kstatus, kplain};
//!
//! kstatus!("Server waiting on data...");
//! kwarn!("Socket file descriptor creation error");
//! kerror!("getaddrinfo {}", reason);
//! kplain!("Data received: {}", text);
//! ```

use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

/// Category of a log line
///
/// Doubles as a verbosity level: a line is shown when its level is at or
/// below the configured one. `Plain` (untagged) shares the status level.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogCategory {
    Off = 0,
    Error = 1,
    Warning = 2,
    Status = 3,
    Plain = 4,
    Debug = 5,
}

impl LogCategory {
    fn level(self) -> u8 {
        match self {
            LogCategory::Off => 0,
            LogCategory::Error => 1,
            LogCategory::Warning => 2,
            LogCategory::Status | LogCategory::Plain => 3,
            LogCategory::Debug => 4,
        }
    }

    /// Header text printed inside the brackets
    pub fn header(&self) -> &'static str {
        match self {
            LogCategory::Off => "",
            LogCategory::Error => "error",
            LogCategory::Warning => "warning",
            LogCategory::Status => "status",
            LogCategory::Plain => " ",
            LogCategory::Debug => "debug",
        }
    }

    /// ANSI color used for the message body
    pub fn color(&self) -> &'static str {
        match self {
            LogCategory::Error => "\x1b[31;1;1m",
            LogCategory::Warning => "\x1b[33;1;1m",
            LogCategory::Status => "\x1b[32;1;1m",
            LogCategory::Debug => "\x1b[36m",
            LogCategory::Off | LogCategory::Plain => COLOR_RESET,
        }
    }
}

pub const COLOR_RESET: &str = "\x1b[0m";

/// Destination for formatted log lines
///
/// Implementations must tolerate being called from any callback. The
/// runtime stays correct when the sink discards everything.
pub trait LogSink: Send + Sync {
    fn write(&self, category: LogCategory, text: &str);
}

/// Prints `\r[  category] text` to stdout
pub struct ConsoleSink {
    color: bool,
}

impl ConsoleSink {
    pub fn new(color: bool) -> Self {
        Self { color }
    }
}

impl LogSink for ConsoleSink {
    fn write(&self, category: LogCategory, text: &str) {
        let stdout = std::io::stdout();
        let mut handle = stdout.lock();
        if self.color {
            let _ = write!(
                handle,
                "{}\r[{:>10}] {}{}{}",
                COLOR_RESET,
                category.header(),
                category.color(),
                text,
                COLOR_RESET
            );
        } else {
            let _ = write!(handle, "\r[{:>10}] {}", category.header(), text);
        }
        let _ = handle.write_all(b"\n");
        if flush_enabled() {
            let _ = handle.flush();
        }
    }
}

/// Discards everything
pub struct NullSink;

impl LogSink for NullSink {
    fn write(&self, _category: LogCategory, _text: &str) {}
}

/// Keeps every line in memory; clones share the same buffer
#[derive(Clone, Default)]
pub struct MemorySink {
    lines: Arc<Mutex<Vec<(LogCategory, String)>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of captured lines
    pub fn lines(&self) -> Vec<(LogCategory, String)> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }

    pub fn contains(&self, category: LogCategory, needle: &str) -> bool {
        self.lines()
            .iter()
            .any(|(c, text)| *c == category && text.contains(needle))
    }
}

impl LogSink for MemorySink {
    fn write(&self, category: LogCategory, text: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push((category, text.to_string()));
        }
    }
}

// Global configuration (initialized once)
static SINK: RwLock<Option<Box<dyn LogSink>>> = RwLock::new(None);
static FLUSH_ENABLED: AtomicBool = AtomicBool::new(false);
static COLOR_ENABLED: AtomicBool = AtomicBool::new(true);
static LOG_LEVEL: AtomicU8 = AtomicU8::new(3);
static INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Initialize logging from environment variables
///
/// Called automatically on first log, but can be called explicitly for
/// deterministic initialization.
pub fn init() {
    if INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }

    if let Ok(val) = std::env::var("DD_FLUSH_LOG") {
        let flush = matches!(val.as_str(), "1" | "true" | "yes" | "on");
        FLUSH_ENABLED.store(flush, Ordering::Relaxed);
    }

    if let Ok(val) = std::env::var("DD_NO_COLOR") {
        let no_color = matches!(val.as_str(), "1" | "true" | "yes" | "on");
        COLOR_ENABLED.store(!no_color, Ordering::Relaxed);
    }

    if let Ok(val) = std::env::var("DD_LOG_LEVEL") {
        let level = match val.to_lowercase().as_str() {
            "off" | "0" => LogCategory::Off,
            "error" | "1" => LogCategory::Error,
            "warn" | "warning" | "2" => LogCategory::Warning,
            "status" | "info" | "3" => LogCategory::Status,
            "debug" | "4" => LogCategory::Debug,
            _ => LogCategory::Status,
        };
        LOG_LEVEL.store(level.level(), Ordering::Relaxed);
    }
}

#[inline]
fn ensure_init() {
    if !INITIALIZED.load(Ordering::Relaxed) {
        init();
    }
}

/// Check if flush is enabled
#[inline]
pub fn flush_enabled() -> bool {
    ensure_init();
    FLUSH_ENABLED.load(Ordering::Relaxed)
}

/// Set the maximum category shown
pub fn set_log_level(level: LogCategory) {
    ensure_init();
    LOG_LEVEL.store(level.level(), Ordering::Relaxed);
}

pub fn set_flush_enabled(enabled: bool) {
    ensure_init();
    FLUSH_ENABLED.store(enabled, Ordering::Relaxed);
}

pub fn set_color_enabled(enabled: bool) {
    ensure_init();
    COLOR_ENABLED.store(enabled, Ordering::Relaxed);
}

/// Check if a category would currently be written
#[inline]
pub fn category_enabled(category: LogCategory) -> bool {
    ensure_init();
    category != LogCategory::Off && category.level() <= LOG_LEVEL.load(Ordering::Relaxed)
}

/// Replace the process-wide sink
pub fn set_sink(sink: Box<dyn LogSink>) {
    if let Ok(mut slot) = SINK.write() {
        *slot = Some(sink);
    }
}

/// Go back to the default stdout sink
pub fn reset_sink() {
    if let Ok(mut slot) = SINK.write() {
        *slot = None;
    }
}

static CAPTURE_LOCK: Mutex<()> = Mutex::new(());

/// Every line goes to a [`MemorySink`] at debug level until this is dropped
///
/// Captures are serialized process-wide. Dropping one puts back the
/// default sink and the previous level.
pub struct LogCapture {
    sink: MemorySink,
    level: u8,
    _lock: MutexGuard<'static, ()>,
}

/// Start capturing log lines, waiting for any other capture to end
pub fn capture() -> LogCapture {
    let lock = match CAPTURE_LOCK.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    ensure_init();
    let level = LOG_LEVEL.swap(LogCategory::Debug.level(), Ordering::Relaxed);
    let sink = MemorySink::new();
    set_sink(Box::new(sink.clone()));
    LogCapture {
        sink,
        level,
        _lock: lock,
    }
}

impl LogCapture {
    pub fn lines(&self) -> Vec<(LogCategory, String)> {
        self.sink.lines()
    }

    pub fn contains(&self, category: LogCategory, needle: &str) -> bool {
        self.sink.contains(category, needle)
    }
}

impl Drop for LogCapture {
    fn drop(&mut self) {
        reset_sink();
        LOG_LEVEL.store(self.level, Ordering::Relaxed);
    }
}

/// Internal: format and route one line
#[doc(hidden)]
pub fn _klog_impl(category: LogCategory, args: std::fmt::Arguments<'_>) {
    if !category_enabled(category) {
        return;
    }
    let text = args.to_string();
    let guard = match SINK.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    match guard.as_ref() {
        Some(sink) => sink.write(category, &text),
        None => ConsoleSink::new(COLOR_ENABLED.load(Ordering::Relaxed)).write(category, &text),
    }
}

// ============================================================================
// Public Macros
// ============================================================================

/// Error line (always shown unless logging is off)
#[macro_export]
macro_rules! kerror {
    ($($arg:tt)*) => {{
        $crate::kprint::_klog_impl(
            $crate::kprint::LogCategory::Error,
            format_args!($($arg)*)
        );
    }};
}

/// Warning line
#[macro_export]
macro_rules! kwarn {
    ($($arg:tt)*) => {{
        $crate::kprint::_klog_impl(
            $crate::kprint::LogCategory::Warning,
            format_args!($($arg)*)
        );
    }};
}

/// Status line
#[macro_export]
macro_rules! kstatus {
    ($($arg:tt)*) => {{
        $crate::kprint::_klog_impl(
            $crate::kprint::LogCategory::Status,
            format_args!($($arg)*)
        );
    }};
}

/// Untagged line
#[macro_export]
macro_rules! kplain {
    ($($arg:tt)*) => {{
        $crate::kprint::_klog_impl(
            $crate::kprint::LogCategory::Plain,
            format_args!($($arg)*)
        );
    }};
}

/// Debug line (resolution candidates, per-packet detail)
#[macro_export]
macro_rules! kdebug {
    ($($arg:tt)*) => {{
        $crate::kprint::_klog_impl(
            $crate::kprint::LogCategory::Debug,
            format_args!($($arg)*)
        );
    }};
}

/// Line in a category picked at runtime, e.g. from a message tag
#[macro_export]
macro_rules! klog {
    ($category:expr, $($arg:tt)*) => {{
        $crate::kprint::_klog_impl($category, format_args!($($arg)*));
    }};
}

// ============================================================================
// Tests
// ============================================================================
