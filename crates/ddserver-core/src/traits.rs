//! Platform traits
//!
//! Implemented by `ddserver-runtime` for each supported OS. The console
//! editor only talks to these, so tests can drive it with scripted input.

use crate::error::TerminalError;

/// Terminal the console editor reads keystrokes from
///
/// `enter_raw` disables echo and line buffering and makes reads
/// non-blocking; `restore` undoes exactly that. Both are best-effort and
/// may be called more than once. `restore` must also undo a partial
/// `enter_raw` that returned an error.
pub trait Terminal {
    fn enter_raw(&mut self) -> Result<(), TerminalError>;

    fn restore(&mut self) -> Result<(), TerminalError>;

    /// Append whatever bytes are pending without blocking
    ///
    /// Returns the number of bytes appended; 0 when nothing is waiting.
    fn read_available(&mut self, buf: &mut Vec<u8>) -> Result<usize, TerminalError>;
}
