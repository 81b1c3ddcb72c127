//! Error types for the ddserver runtime
//!
//! Transport errors (per-candidate socket failures, single sends) are
//! logged where they happen and absorbed by the caller. Structural errors
//! (bind, listen, fatal receive, poll) propagate and end the loop or the
//! server path.

use std::io;
use thiserror::Error;

/// Result type for address/socket operations
pub type NetResult<T> = Result<T, NetError>;

/// Address/socket manager errors
#[derive(Debug, Error)]
pub enum NetError {
    /// Name service lookup failed
    #[error("getaddrinfo {host}:{port}: {reason}")]
    Resolution {
        host: String,
        port: u16,
        reason: String,
    },

    /// Lookup succeeded but every candidate's socket creation failed
    #[error("no usable candidate for {host}:{port}")]
    NoUsableCandidate { host: String, port: u16 },

    /// Operation needs a selected candidate and there is none
    #[error("endpoint has no selected address")]
    NoCandidate,

    /// Endpoint socket was already closed
    #[error("endpoint socket is closed")]
    Closed,

    #[error("socket option {option}: {source}")]
    SocketOption {
        option: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("bind: {0}")]
    Bind(#[source] io::Error),

    #[error("listen: {0}")]
    Listen(#[source] io::Error),

    #[error("connect: {0}")]
    Connect(#[source] io::Error),

    #[error("accept: {0}")]
    Accept(#[source] io::Error),

    /// OS-level send failure; the message is dropped
    #[error("send: {0}")]
    Send(#[source] io::Error),

    /// Kernel accepted fewer bytes than the encoded message
    #[error("short send: {sent}B out of {expected}B")]
    ShortSend { sent: usize, expected: usize },

    /// Genuine receive failure (would-block is not an error)
    #[error("receive: {0}")]
    Receive(#[source] io::Error),
}

impl NetError {
    /// Errors that must end the server path or the reactor loop
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            NetError::Bind(_)
                | NetError::Listen(_)
                | NetError::NoCandidate
                | NetError::SocketOption { .. }
                | NetError::Receive(_)
        )
    }
}

/// Registering past the fixed timer capacity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("loop timer limit reached ({capacity})")]
pub struct TimerCapacityError {
    pub capacity: usize,
}

/// Reactor loop errors
#[derive(Debug, Error)]
pub enum ReactorError {
    /// Readiness poll failed (not a timeout)
    #[error("select error: {0}")]
    Poll(#[source] io::Error),

    /// The read callback reported a fatal receive failure
    #[error("listener failed: {0}")]
    Listener(#[from] NetError),

    /// A loop runs once; a terminated loop is discarded
    #[error("loop already terminated")]
    Terminated,
}

/// Raw-mode and keystroke errors; always best-effort
#[derive(Debug, Error)]
pub enum TerminalError {
    #[error("enter raw mode: {0}")]
    EnterRaw(#[source] io::Error),

    #[error("restore terminal: {0}")]
    Restore(#[source] io::Error),

    #[error("read keystrokes: {0}")]
    Read(#[source] io::Error),

    #[error("install interrupt handler: {0}")]
    Signal(#[source] io::Error),
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Invalid config: {0}")]
    InvalidValue(&'static str),
}
