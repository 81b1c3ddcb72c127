//! # ddserver - Minimal network service runtime
//!
//! One listening socket, one thread, one console.
//!
//! ## Features
//!
//! - **Endpoints**: resolve a host/port, take the first candidate a socket
//!   opens for, bind as server or use as client (UDP, optional TCP)
//! - **Reactor**: bounded readiness wait plus up to 10 timers per loop
//! - **Console**: raw-mode line editor with a 50-entry history persisted to
//!   a log file
//! - **Codec**: text payloads with an optional 8-byte category tag
//!
//! ## Quick Start
//!
//! ```ignore
//! use ddserver::{resolve_and_select, ConsoleSession, Reactor, RuntimeConfig, SocketKind};
//!
//! let config = RuntimeConfig::from_env();
//! let mut server = resolve_and_select("localhost", 4321, SocketKind::Datagram)?;
//! server.bind_as_server()?;
//!
//! let mut console = ConsoleSession::stdio(&config);
//! let mut reactor = Reactor::new(&server, |h| {
//!     if let Some(data) = h.listener().receive()? {
//!         kplain!("Data received: {}", data.msg);
//!     }
//!     Ok(())
//! });
//! reactor.add_timer(0.1, true, |h| {
//!     console.collect_input();
//!     if console.query_completed_line().as_deref() == Some("exit") {
//!         h.break_loop();
//!     }
//! })?;
//! reactor.run()?;
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Application                            │
//! │          read callback, timer callbacks, commands           │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Reactor                                │
//! │        select(listener, 100us) → read cb → timer walk       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!          ┌───────────────────┼───────────────────┐
//!          ▼                   ▼                   ▼
//!    ┌───────────┐      ┌───────────┐      ┌───────────┐
//!    │ Endpoint  │      │  Console  │      │   Codec   │
//!    │ UDP / TCP │      │ raw + ring│      │ tag + text│
//!    └───────────┘      └───────────┘      └───────────┘
//! ```

pub mod command;
pub mod peers;

// Re-export core types
pub use ddserver_core::{
    constants, kprint, nanos_to_millis, nanos_to_seconds, seconds_to_nanos, ClockSource,
    ConfigError, HistoryRing, Key, KeyDecoder, ManualClock, Message, MsgTag, MsgValue, NetError,
    NetResult, ReactorError, Terminal, TerminalError, TimerCapacityError, TimerSlot, TimerSpec,
    WireFormat,
};
pub use ddserver_core::{kdebug, kerror, klog, kplain, kstatus, kwarn};

// Re-export runtime
pub use ddserver_runtime::{
    create_endpoint_from_peer_address, resolve, resolve_and_select, AddrFamily,
    AddressCandidate, BindOptions, ConsoleSession, Endpoint, LoopHandle, LoopState,
    MonotonicClock, Reactor, RecvMsg, RuntimeConfig, SocketKind, UnixTerminal,
};

pub use command::{Command, CommandError};
pub use peers::PeerTable;
