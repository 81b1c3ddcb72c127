//! Interrupt handling for the raw-mode console
//!
//! Ctrl-C must never leave the terminal without echo. The console's
//! terminal hands its saved state here once raw mode is entered.

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        mod unix;
        pub use unix::*;
    }
}
