//! # ddserver-core
//!
//! Core types and traits for the ddserver network runtime.
//!
//! This crate is platform-agnostic and contains no OS-specific code.
//! Sockets, terminals, the monotonic clock and the reactor loop itself
//! live in `ddserver-runtime`.
//!
//! ## Modules
//!
//! - `kprint` - Categorized log sink and print macros
//! - `env` - Environment variable utilities
//! - `error` - Error taxonomy
//! - `clock` - Nanosecond conversions and the `ClockSource` trait
//! - `message` - Typed message values and the tag/payload wire codec
//! - `timer` - Fixed-capacity timer table
//! - `history` - Command history ring and live edit slot
//! - `keys` - Raw keystroke decoder
//! - `traits` - Platform traits

pub mod kprint;
pub mod env;
pub mod error;
pub mod clock;
pub mod message;
pub mod timer;
pub mod history;
pub mod keys;
pub mod traits;

// Re-exports for convenience
pub use clock::{nanos_to_millis, nanos_to_seconds, seconds_to_nanos, ClockSource, ManualClock};
pub use env::{env_get, env_get_bool, env_get_opt, env_get_str};
pub use error::{
    ConfigError, NetError, NetResult, ReactorError, TerminalError, TimerCapacityError,
};
pub use history::HistoryRing;
pub use keys::{Key, KeyDecoder};
pub use message::{Decoded, Message, MsgTag, MsgValue, WireFormat};
pub use timer::{Flow, TimerSlot, TimerSpec, TimerTable};
pub use traits::Terminal;

/// Sizing constants shared by the runtime and applications
pub mod constants {
    /// Bytes reserved in front of a tagged payload
    pub const MAX_TAG_SIZE: usize = std::mem::size_of::<u64>();

    /// Size of one datagram on the channel
    pub const CHANNEL_CAPACITY: usize = 1024;

    /// Largest message body (channel minus tag reservation)
    pub const MAX_MSG_SIZE: usize = CHANNEL_CAPACITY - MAX_TAG_SIZE;

    /// Timer slots per reactor loop
    pub const MAX_ACTIVE_TIMERS: usize = 10;

    /// Listen backlog and peer table capacity
    pub const BACKLOG: usize = 10;

    /// Retained history entries
    pub const HISTORY_CAPACITY: usize = 50;

    /// Width of one history slot, terminator included
    pub const HISTORY_LINE_WIDTH: usize = 1024;
}
