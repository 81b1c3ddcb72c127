//! ddserver build-time configuration
//!
//! Copy this file next to your project and keep only what you change.
//!
//! Usage:
//!   DD_CONFIG_RS=./cmd/ddchat/dd_config.rs cargo build -p ddchat --features ddserver/custom-config
//!
//! Every value can still be overridden at runtime:
//!   DD_POLL_WAIT_US=500 DD_PROMPT=relay ./target/release/ddchat

// Readiness wait per reactor tick (us)
pub const POLL_WAIT_US: u64 = 100;

// listen() backlog for TCP mode
pub const LISTEN_BACKLOG: i32 = 10;

// Console history entries kept in memory
pub const HISTORY_CAPACITY: usize = 50;

// Bytes per history line, terminator included
pub const HISTORY_LINE_WIDTH: usize = 1024;

// Where finished console lines are appended
pub const HISTORY_LOG_PATH: &str = "server_input.log";

// Text before `:$ ` on the console
pub const PROMPT: &str = "local_machine";

// Prefix payloads with the 8-byte category tag
pub const TAGGED_WIRE: bool = false;

// ANSI colors on the console
pub const COLOR_OUTPUT: bool = true;
