//! ddserver runtime configuration
//!
//! Compile-time defaults with runtime environment overrides.
//!
//! # Configuration Priority (highest wins)
//!
//! 1. Builder setters
//! 2. Environment variables (`from_env`)
//! 3. `DD_CONFIG_RS` file merged at build time
//! 4. Library defaults
//!
//! # Example
//!
//! ```rust,ignore
//! use ddserver_runtime::config::RuntimeConfig;
//!
//! let config = RuntimeConfig::from_env()
//!     .poll_wait(Duration::from_micros(500))
//!     .prompt("relay");
//! config.validate()?;
//! ```

pub mod defaults;

use ddserver_core::env::{env_get, env_get_bool, env_get_opt, env_get_str};
use ddserver_core::{ConfigError, WireFormat};
use std::path::PathBuf;
use std::time::Duration;

/// Largest accepted readiness wait; anything longer makes the console laggy
const MAX_POLL_WAIT: Duration = Duration::from_millis(100);

/// Runtime configuration with builder pattern
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Bounded wait for listener readiness, once per tick
    pub poll_wait: Duration,
    /// Backlog passed to listen() for stream servers
    pub listen_backlog: i32,
    /// Retained console history entries
    pub history_capacity: usize,
    /// Width of one history slot, terminator included
    pub history_line_width: usize,
    /// Persistent history file; `None` keeps history in memory only
    pub history_log: Option<PathBuf>,
    /// Console prompt, rendered as `<prompt>:$ `
    pub prompt: String,
    /// Payload layout on the wire
    pub wire_format: WireFormat,
    /// ANSI colors on the console
    pub color: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl RuntimeConfig {
    /// Compile-time defaults with environment overrides.
    ///
    /// Environment variables (all optional):
    /// - `DD_POLL_WAIT_US` - Readiness wait in microseconds
    /// - `DD_LISTEN_BACKLOG` - Stream listen backlog
    /// - `DD_HISTORY_CAPACITY` - Console history entries
    /// - `DD_HISTORY_LINE_WIDTH` - Bytes per history slot
    /// - `DD_HISTORY_LOG` - History file path (empty disables persistence)
    /// - `DD_PROMPT` - Console prompt text
    /// - `DD_WIRE_FORMAT` - `raw` or `tagged`
    /// - `DD_COLOR` - Colored console output (0/1)
    pub fn from_env() -> Self {
        let base = Self::new();
        let history_log = match std::env::var("DD_HISTORY_LOG") {
            Ok(path) if path.trim().is_empty() => None,
            Ok(path) => Some(PathBuf::from(path)),
            Err(_) => base.history_log,
        };

        Self {
            poll_wait: Duration::from_micros(env_get("DD_POLL_WAIT_US", defaults::POLL_WAIT_US)),
            listen_backlog: env_get("DD_LISTEN_BACKLOG", defaults::LISTEN_BACKLOG),
            history_capacity: env_get("DD_HISTORY_CAPACITY", defaults::HISTORY_CAPACITY),
            history_line_width: env_get("DD_HISTORY_LINE_WIDTH", defaults::HISTORY_LINE_WIDTH),
            history_log,
            prompt: env_get_str("DD_PROMPT", defaults::PROMPT),
            wire_format: env_get_opt("DD_WIRE_FORMAT").unwrap_or(base.wire_format),
            color: env_get_bool("DD_COLOR", defaults::COLOR_OUTPUT),
        }
    }

    /// Defaults only, no environment lookup. Useful for tests.
    pub fn new() -> Self {
        Self {
            poll_wait: Duration::from_micros(defaults::POLL_WAIT_US),
            listen_backlog: defaults::LISTEN_BACKLOG,
            history_capacity: defaults::HISTORY_CAPACITY,
            history_line_width: defaults::HISTORY_LINE_WIDTH,
            history_log: Some(PathBuf::from(defaults::HISTORY_LOG_PATH)),
            prompt: defaults::PROMPT.to_string(),
            wire_format: if defaults::TAGGED_WIRE {
                WireFormat::Tagged
            } else {
                WireFormat::Raw
            },
            color: defaults::COLOR_OUTPUT,
        }
    }

    // Builder methods

    pub fn poll_wait(mut self, d: Duration) -> Self {
        self.poll_wait = d;
        self
    }

    pub fn listen_backlog(mut self, n: i32) -> Self {
        self.listen_backlog = n;
        self
    }

    pub fn history_capacity(mut self, n: usize) -> Self {
        self.history_capacity = n;
        self
    }

    pub fn history_line_width(mut self, n: usize) -> Self {
        self.history_line_width = n;
        self
    }

    pub fn history_log(mut self, path: Option<PathBuf>) -> Self {
        self.history_log = path;
        self
    }

    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    pub fn wire_format(mut self, format: WireFormat) -> Self {
        self.wire_format = format;
        self
    }

    pub fn color(mut self, enable: bool) -> Self {
        self.color = enable;
        self
    }

    /// Validate configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_wait.is_zero() {
            return Err(ConfigError::InvalidValue("poll_wait must be > 0"));
        }
        if self.poll_wait > MAX_POLL_WAIT {
            return Err(ConfigError::InvalidValue("poll_wait must be <= 100ms"));
        }
        if self.listen_backlog <= 0 {
            return Err(ConfigError::InvalidValue("listen_backlog must be > 0"));
        }
        if self.history_capacity == 0 {
            return Err(ConfigError::InvalidValue("history_capacity must be > 0"));
        }
        if self.history_line_width < 2 {
            return Err(ConfigError::InvalidValue("history_line_width must be >= 2"));
        }
        if self.prompt.contains(['\n', '\r']) {
            return Err(ConfigError::InvalidValue("prompt must be a single line"));
        }
        Ok(())
    }

    /// Print configuration (for debugging)
    pub fn print(&self) {
        eprintln!("ddserver Configuration:");
        eprintln!("  poll_wait:           {:?}", self.poll_wait);
        eprintln!("  listen_backlog:      {}", self.listen_backlog);
        eprintln!("  history_capacity:    {}", self.history_capacity);
        eprintln!("  history_line_width:  {}", self.history_line_width);
        match &self.history_log {
            Some(path) => eprintln!("  history_log:         {}", path.display()),
            None => eprintln!("  history_log:         (memory only)"),
        }
        eprintln!("  prompt:              {}", self.prompt);
        eprintln!("  wire_format:         {:?}", self.wire_format);
        eprintln!("  color:               {}", self.color);
    }
}
