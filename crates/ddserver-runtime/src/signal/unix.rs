//! Unix SIGINT handler that restores the terminal, then dies by SIGINT

use ddserver_core::TerminalError;
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use std::io;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::OnceLock;

static HANDLER_INSTALLED: AtomicBool = AtomicBool::new(false);
static SAVED_TERMIOS: OnceLock<libc::termios> = OnceLock::new();
static SAVED_FD: AtomicI32 = AtomicI32::new(-1);
static SAVED_FLAGS: AtomicI32 = AtomicI32::new(0);

/// Install the SIGINT handler that puts `fd` back to `termios` and `flags`
///
/// `termios` is `None` when `fd` is not a terminal; only the flags are
/// restored then. The first termios snapshot is kept. Installing the
/// handler again only updates the saved flags.
pub fn install_terminal_restore(
    fd: RawFd,
    termios: Option<libc::termios>,
    flags: i32,
) -> Result<(), TerminalError> {
    if let Some(termios) = termios {
        let _ = SAVED_TERMIOS.set(termios);
    }
    SAVED_FLAGS.store(flags, Ordering::SeqCst);
    SAVED_FD.store(fd, Ordering::SeqCst);

    if HANDLER_INSTALLED.swap(true, Ordering::SeqCst) {
        return Ok(());
    }

    let action = SigAction::new(
        SigHandler::Handler(restore_and_reraise),
        SaFlags::empty(),
        SigSet::empty(),
    );
    // SAFETY: the handler only touches atomics, a fully initialized
    // OnceLock and async-signal-safe libc calls.
    match unsafe { sigaction(Signal::SIGINT, &action) } {
        Ok(_) => Ok(()),
        Err(e) => {
            HANDLER_INSTALLED.store(false, Ordering::SeqCst);
            Err(TerminalError::Signal(io::Error::from(e)))
        }
    }
}

/// True once the SIGINT handler is in place
pub fn restore_handler_installed() -> bool {
    HANDLER_INSTALLED.load(Ordering::SeqCst)
}

extern "C" fn restore_and_reraise(_sig: libc::c_int) {
    let fd = SAVED_FD.load(Ordering::SeqCst);
    if fd >= 0 {
        unsafe {
            if let Some(termios) = SAVED_TERMIOS.get() {
                libc::tcsetattr(fd, libc::TCSANOW, termios);
            }
            libc::fcntl(fd, libc::F_SETFL, SAVED_FLAGS.load(Ordering::SeqCst));
        }
    }

    // Default action terminates the process; open files are closed by exit
    unsafe {
        libc::signal(libc::SIGINT, libc::SIG_DFL);
        libc::raise(libc::SIGINT);
    }
}
