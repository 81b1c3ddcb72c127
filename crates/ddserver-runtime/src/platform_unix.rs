//! Unix platform implementation
//!
//! Monotonic clock, bounded readiness wait, non-blocking descriptors and
//! the raw-mode stdin terminal.

use ddserver_core::{ClockSource, TerminalError};
use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::time::{clock_gettime, ClockId};
use std::cell::Cell;
use std::io;
use std::os::unix::io::RawFd;
use std::time::Duration;

use crate::signal;

// ============================================================================
// Clock
// ============================================================================

/// CLOCK_MONOTONIC in nanoseconds
///
/// Never goes backwards: a failed read repeats the previous value.
#[derive(Debug, Default)]
pub struct MonotonicClock {
    last: Cell<u64>,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ClockSource for MonotonicClock {
    fn now_nanos(&self) -> u64 {
        if let Ok(ts) = clock_gettime(ClockId::CLOCK_MONOTONIC) {
            let nanos = (ts.tv_sec() as u64)
                .saturating_mul(1_000_000_000)
                .saturating_add(ts.tv_nsec() as u64);
            if nanos > self.last.get() {
                self.last.set(nanos);
            }
        }
        self.last.get()
    }
}

// ============================================================================
// Descriptors
// ============================================================================

/// Add O_NONBLOCK, returning the flags that were set before
pub(crate) fn set_nonblocking(fd: RawFd) -> io::Result<OFlag> {
    let bits = fcntl(fd, FcntlArg::F_GETFL).map_err(io::Error::from)?;
    let before = OFlag::from_bits_truncate(bits);
    fcntl(fd, FcntlArg::F_SETFL(before | OFlag::O_NONBLOCK)).map_err(io::Error::from)?;
    Ok(before)
}

/// Wait up to `timeout` for `fd` to become readable
///
/// This is the only blocking call in a reactor tick. An interrupted wait
/// counts as a timeout.
pub(crate) fn wait_readable(fd: RawFd, timeout: Duration) -> io::Result<bool> {
    if fd < 0 || fd as usize >= libc::FD_SETSIZE as usize {
        return Err(io::Error::from_raw_os_error(libc::EBADF));
    }

    let mut tv = libc::timeval {
        tv_sec: timeout.as_secs() as libc::time_t,
        tv_usec: timeout.subsec_micros() as libc::suseconds_t,
    };

    let rc = unsafe {
        let mut read_fds: libc::fd_set = std::mem::zeroed();
        libc::FD_ZERO(&mut read_fds);
        libc::FD_SET(fd, &mut read_fds);
        libc::select(
            fd + 1,
            &mut read_fds,
            std::ptr::null_mut(),
            std::ptr::null_mut(),
            &mut tv,
        )
    };

    match rc {
        -1 => {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                Ok(false)
            } else {
                Err(err)
            }
        }
        0 => Ok(false),
        _ => Ok(true),
    }
}

// ============================================================================
// Terminal
// ============================================================================

const STDIN: RawFd = libc::STDIN_FILENO;

/// Standard input switched to non-canonical, no-echo, non-blocking mode
///
/// The original termios and descriptor flags are captured on the first
/// `enter_raw` and handed to the interrupt handler so Ctrl-C restores them.
pub struct UnixTerminal {
    saved_termios: Option<libc::termios>,
    saved_flags: Option<OFlag>,
}

impl UnixTerminal {
    pub fn new() -> Self {
        Self {
            saved_termios: None,
            saved_flags: None,
        }
    }

    pub fn is_raw(&self) -> bool {
        self.saved_termios.is_some()
    }
}

impl Default for UnixTerminal {
    fn default() -> Self {
        Self::new()
    }
}

impl ddserver_core::Terminal for UnixTerminal {
    /// Make stdin non-blocking, then switch off echo and canonical mode
    ///
    /// Stdin stays non-blocking when it is not a terminal, so polling never
    /// stalls on a pipe. The saved flags are still put back by `restore`
    /// and by the SIGINT handler.
    fn enter_raw(&mut self) -> Result<(), TerminalError> {
        if self.saved_flags.is_some() {
            return Ok(());
        }

        let flags = set_nonblocking(STDIN).map_err(TerminalError::EnterRaw)?;
        self.saved_flags = Some(flags);

        let mut term: libc::termios = unsafe { std::mem::zeroed() };
        if unsafe { libc::tcgetattr(STDIN, &mut term) } != 0 {
            let err = io::Error::last_os_error();
            signal::install_terminal_restore(STDIN, None, flags.bits())?;
            return Err(TerminalError::EnterRaw(err));
        }
        let original = term;

        term.c_lflag &= !(libc::ECHO | libc::ECHOE | libc::ICANON);
        if unsafe { libc::tcsetattr(STDIN, libc::TCSANOW, &term) } != 0 {
            let err = io::Error::last_os_error();
            signal::install_terminal_restore(STDIN, None, flags.bits())?;
            return Err(TerminalError::EnterRaw(err));
        }
        self.saved_termios = Some(original);

        signal::install_terminal_restore(STDIN, Some(original), flags.bits())
    }

    fn restore(&mut self) -> Result<(), TerminalError> {
        let mut result = Ok(());

        if let Some(original) = self.saved_termios.take() {
            if unsafe { libc::tcsetattr(STDIN, libc::TCSANOW, &original) } != 0 {
                result = Err(TerminalError::Restore(io::Error::last_os_error()));
            }
        }
        if let Some(flags) = self.saved_flags.take() {
            if let Err(e) = fcntl(STDIN, FcntlArg::F_SETFL(flags)) {
                result = Err(TerminalError::Restore(io::Error::from(e)));
            }
        }
        result
    }

    fn read_available(&mut self, buf: &mut Vec<u8>) -> Result<usize, TerminalError> {
        let mut chunk = [0u8; 256];
        let mut total = 0;

        loop {
            let n = unsafe { libc::read(STDIN, chunk.as_mut_ptr().cast(), chunk.len()) };
            if n > 0 {
                let n = n as usize;
                buf.extend_from_slice(&chunk[..n]);
                total += n;
                continue;
            }
            if n == 0 {
                // EOF: stdin closed or redirected from an exhausted file
                return Ok(total);
            }

            let err = io::Error::last_os_error();
            match err.kind() {
                io::ErrorKind::WouldBlock => return Ok(total),
                io::ErrorKind::Interrupted => continue,
                _ => return Err(TerminalError::Read(err)),
            }
        }
    }
}
