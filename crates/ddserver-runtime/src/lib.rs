//! # ddserver-runtime
//!
//! Platform-specific runtime for the ddserver network service.
//!
//! This crate provides:
//! - Address resolution and non-blocking UDP/TCP endpoints
//! - The single-threaded reactor loop with its fixed timer table
//! - The raw-mode console session with persistent history
//! - SIGINT handling that restores the terminal
//! - Build-time and environment configuration

pub mod config;
pub mod net;
pub mod reactor;
pub mod console;
pub mod signal;

// Re-exports
pub use config::RuntimeConfig;
pub use console::ConsoleSession;
pub use net::{
    create_endpoint_from_peer_address, resolve, resolve_and_select, AddrFamily,
    AddressCandidate, BindOptions, Endpoint, RecvMsg, SocketKind,
};
pub use reactor::{LoopHandle, LoopState, Reactor};

// Platform detection
cfg_if::cfg_if! {
    if #[cfg(unix)] {
        mod platform_unix;
        use platform_unix as platform;
        pub use platform_unix::{MonotonicClock, UnixTerminal};
    } else {
        compile_error!("Unsupported platform");
    }
}
