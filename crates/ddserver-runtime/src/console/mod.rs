//! Interactive console session
//!
//! One session owns the terminal, the history ring and the history log
//! file. It is polled once per reactor tick and never blocks:
//!
//! ```text
//!   collect_input()
//!     first call:  enter raw mode → replay log into ring → open log (append)
//!     every call:  drain keys → edit ring → redraw `<prompt>:$ <line>`
//!
//!   query_completed_line() → Some(line) once per finished line
//! ```
//!
//! Raw mode is left again by [`ConsoleSession::restore`], on drop, or by
//! the SIGINT handler installed when raw mode was entered.

use ddserver_core::kprint::COLOR_RESET;
use ddserver_core::{kdebug, kwarn};
use ddserver_core::{HistoryRing, Key, KeyDecoder, Terminal};
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use crate::config::RuntimeConfig;

const PROMPT_COLOR: &str = "\x1b[32;1;1m";
const PROMPT_SUFFIX: &str = ":$ ";

/// Raw-mode line editor over a [`Terminal`], echoing to `W`
pub struct ConsoleSession<T: Terminal, W: Write> {
    terminal: T,
    out: W,
    ring: HistoryRing,
    decoder: KeyDecoder,
    log_path: Option<PathBuf>,
    log: Option<File>,
    prompt: String,
    color: bool,
    completed: Option<String>,
    started: bool,
    raw: bool,
    /// Visible width of the last redraw
    drawn: usize,
    input: Vec<u8>,
    keys: Vec<Key>,
}

#[cfg(unix)]
impl ConsoleSession<crate::platform::UnixTerminal, io::Stdout> {
    /// Session on the process's stdin/stdout
    pub fn stdio(config: &RuntimeConfig) -> Self {
        Self::new(crate::platform::UnixTerminal::new(), io::stdout(), config)
    }
}

impl<T: Terminal, W: Write> ConsoleSession<T, W> {
    pub fn new(terminal: T, out: W, config: &RuntimeConfig) -> Self {
        Self {
            terminal,
            out,
            ring: HistoryRing::new(config.history_capacity, config.history_line_width),
            decoder: KeyDecoder::new(),
            log_path: config.history_log.clone(),
            log: None,
            prompt: config.prompt.clone(),
            color: config.color,
            completed: None,
            started: false,
            raw: false,
            drawn: 0,
            input: Vec::with_capacity(256),
            keys: Vec::with_capacity(64),
        }
    }

    /// Poll the terminal once: edit, finish lines, redraw
    pub fn collect_input(&mut self) {
        if !self.started {
            self.start();
        }

        self.input.clear();
        if let Err(e) = self.terminal.read_available(&mut self.input) {
            kwarn!("Console read failed: {}", e);
        }
        self.keys.clear();
        self.decoder.decode_into(&self.input, &mut self.keys);

        for i in 0..self.keys.len() {
            let key = self.keys[i];
            match key {
                Key::Char(byte) => {
                    self.ring.push_char(byte as char);
                }
                Key::Backspace => {
                    self.ring.backspace();
                }
                Key::Up => {
                    self.ring.up();
                }
                Key::Down => {
                    self.ring.down();
                }
                Key::Enter => {
                    if let Some(line) = self.ring.enter() {
                        self.append_to_log(&line);
                        self.completed = Some(line);
                    }
                }
            }
        }

        if let Err(e) = self.render() {
            kdebug!("Console redraw failed: {}", e);
        }
    }

    /// Take the most recently finished line, if any
    ///
    /// Each line is delivered once. When several lines finish between two
    /// queries only the latest is returned; all of them are in history.
    pub fn query_completed_line(&mut self) -> Option<String> {
        self.completed.take()
    }

    pub fn history(&self) -> &HistoryRing {
        &self.ring
    }

    /// Line currently shown after the prompt
    pub fn current_line(&self) -> &str {
        self.ring.current()
    }

    pub fn is_raw(&self) -> bool {
        self.raw
    }

    pub fn log_path(&self) -> Option<&Path> {
        self.log_path.as_deref()
    }

    /// True while finished lines are being appended to the log file
    pub fn is_persisting(&self) -> bool {
        self.log.is_some()
    }

    /// Leave raw mode and close the log; safe to call more than once
    pub fn restore(&mut self) {
        self.log = None;
        // A refused raw mode may still have changed the descriptor flags
        if let Err(e) = self.terminal.restore() {
            kwarn!("Console restore failed: {}", e);
        }
        if !self.raw {
            return;
        }
        self.raw = false;
        if let Err(e) = self.out.write_all(b"\n").and_then(|()| self.out.flush()) {
            kdebug!("Console restore output failed: {}", e);
        }
    }

    fn start(&mut self) {
        self.started = true;

        match self.terminal.enter_raw() {
            Ok(()) => self.raw = true,
            Err(e) => kwarn!("Console stays in line mode: {}", e),
        }

        let path = match &self.log_path {
            Some(path) => path.clone(),
            None => return,
        };

        if let Ok(file) = File::open(&path) {
            let mut replayed = 0usize;
            for line in BufReader::new(file).lines() {
                match line {
                    Ok(line) => {
                        if self.ring.replay(&line) {
                            replayed += 1;
                        }
                    }
                    Err(e) => {
                        kwarn!("History replay stopped: {}", e);
                        break;
                    }
                }
            }
            kdebug!("Replayed {} history lines from {}", replayed, path.display());
        }

        match OpenOptions::new().create(true).append(true).open(&path) {
            Ok(file) => self.log = Some(file),
            Err(e) => kwarn!(
                "History log {} unavailable, keeping history in memory: {}",
                path.display(),
                e
            ),
        }
    }

    fn append_to_log(&mut self, line: &str) {
        let Some(log) = self.log.as_mut() else {
            return;
        };
        if let Err(e) = writeln!(log, "{}", line) {
            kwarn!("History log write failed, keeping history in memory: {}", e);
            self.log = None;
        }
    }

    fn render(&mut self) -> io::Result<()> {
        let line = self.ring.current();

        self.out.write_all(b"\r")?;
        for _ in 0..self.drawn {
            self.out.write_all(b" ")?;
        }
        self.out.write_all(b"\r")?;

        if self.color {
            write!(
                self.out,
                "{}{}{}{}{}",
                PROMPT_COLOR, self.prompt, COLOR_RESET, PROMPT_SUFFIX, line
            )?;
        } else {
            write!(self.out, "{}{}{}", self.prompt, PROMPT_SUFFIX, line)?;
        }
        self.out.flush()?;

        self.drawn = self.prompt.len() + PROMPT_SUFFIX.len() + line.len();
        Ok(())
    }
}

impl<T: Terminal, W: Write> Drop for ConsoleSession<T, W> {
    fn drop(&mut self) {
        self.restore();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ddserver_core::kprint::{self, LogCategory};
    use ddserver_core::TerminalError;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use std::rc::Rc;

    /// Hands out one scripted chunk per read
    #[derive(Clone, Default)]
    struct ScriptedTerminal {
        chunks: Rc<RefCell<VecDeque<Vec<u8>>>>,
        raw: Rc<Cell<bool>>,
        restores: Rc<Cell<u32>>,
        not_a_tty: bool,
    }

    impl ScriptedTerminal {
        fn type_bytes(&self, bytes: &[u8]) {
            self.chunks.borrow_mut().push_back(bytes.to_vec());
        }
    }

    impl Terminal for ScriptedTerminal {
        fn enter_raw(&mut self) -> Result<(), TerminalError> {
            if self.not_a_tty {
                return Err(TerminalError::EnterRaw(io::Error::new(
                    io::ErrorKind::Other,
                    "not a terminal",
                )));
            }
            self.raw.set(true);
            Ok(())
        }

        fn restore(&mut self) -> Result<(), TerminalError> {
            self.raw.set(false);
            self.restores.set(self.restores.get() + 1);
            Ok(())
        }

        fn read_available(&mut self, buf: &mut Vec<u8>) -> Result<usize, TerminalError> {
            match self.chunks.borrow_mut().pop_front() {
                Some(chunk) => {
                    buf.extend_from_slice(&chunk);
                    Ok(chunk.len())
                }
                None => Ok(0),
            }
        }
    }

    /// Points fd 0 at another file until dropped
    #[cfg(unix)]
    struct StdinRedirect {
        saved: libc::c_int,
    }

    #[cfg(unix)]
    impl StdinRedirect {
        fn to(file: &File) -> Self {
            use std::os::unix::io::AsRawFd;

            let saved = unsafe { libc::dup(libc::STDIN_FILENO) };
            assert!(saved >= 0);
            assert_eq!(
                unsafe { libc::dup2(file.as_raw_fd(), libc::STDIN_FILENO) },
                libc::STDIN_FILENO
            );
            Self { saved }
        }
    }

    #[cfg(unix)]
    impl Drop for StdinRedirect {
        fn drop(&mut self) {
            unsafe {
                libc::dup2(self.saved, libc::STDIN_FILENO);
                libc::close(self.saved);
            }
        }
    }

    fn config_with_log(path: Option<PathBuf>) -> RuntimeConfig {
        RuntimeConfig::new().history_log(path).color(false)
    }

    #[test]
    fn test_backspace_then_enter_logs_line() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("server_input.log");
        let term = ScriptedTerminal::default();
        let mut console = ConsoleSession::new(term.clone(), Vec::new(), &config_with_log(Some(log.clone())));

        term.type_bytes(b"abc");
        term.type_bytes(&[0x7f]);
        term.type_bytes(b"\n");
        for _ in 0..3 {
            console.collect_input();
        }

        assert_eq!(console.query_completed_line().as_deref(), Some("ab"));
        assert_eq!(console.query_completed_line(), None);

        let saved = std::fs::read_to_string(&log).unwrap();
        assert_eq!(saved.lines().last(), Some("ab"));
    }

    #[test]
    fn test_raw_mode_entered_once_on_first_poll() {
        let term = ScriptedTerminal::default();
        let mut console = ConsoleSession::new(term.clone(), Vec::new(), &config_with_log(None));
        assert!(!term.raw.get());

        console.collect_input();
        assert!(term.raw.get());
        assert!(console.is_raw());

        console.restore();
        console.collect_input();
        assert!(!term.raw.get());
    }

    #[test]
    fn test_refused_raw_mode_still_restores() {
        let term = ScriptedTerminal {
            not_a_tty: true,
            ..Default::default()
        };
        let mut console = ConsoleSession::new(term.clone(), Vec::new(), &config_with_log(None));
        console.collect_input();
        assert!(!console.is_raw());

        drop(console);
        assert_eq!(term.restores.get(), 1);
    }

    /// Writer whose every write fails
    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }
    }

    #[test]
    fn test_restore_output_failure_is_logged() {
        let log = kprint::capture();

        let term = ScriptedTerminal::default();
        let mut console = ConsoleSession::new(term.clone(), BrokenPipe, &config_with_log(None));
        console.collect_input();
        console.restore();

        assert!(log.contains(LogCategory::Debug, "Console redraw failed"));
        assert!(log.contains(LogCategory::Debug, "Console restore output failed"));
        assert!(!term.raw.get());
    }

    #[cfg(unix)]
    #[test]
    fn test_stdio_session_on_non_tty_leaves_stdin_blocking() {
        let null = File::open("/dev/null").unwrap();
        let _stdin = StdinRedirect::to(&null);

        {
            let mut console = ConsoleSession::stdio(&config_with_log(None));
            console.collect_input();
            assert!(!console.is_raw());
        }

        let flags = unsafe { libc::fcntl(libc::STDIN_FILENO, libc::F_GETFL) };
        assert!(flags >= 0);
        assert_eq!(flags & libc::O_NONBLOCK, 0);
    }

    #[test]
    fn test_existing_log_is_replayed() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("history.log");
        std::fs::write(&log, "first\n\n   \nsecond\n").unwrap();

        let term = ScriptedTerminal::default();
        let mut console = ConsoleSession::new(term.clone(), Vec::new(), &config_with_log(Some(log.clone())));
        console.collect_input();

        let entries: Vec<&str> = console.history().entries().collect();
        assert_eq!(entries, vec!["first", "   ", "second"]);

        term.type_bytes(b"third\r");
        console.collect_input();
        assert_eq!(console.query_completed_line().as_deref(), Some("third"));
        assert_eq!(std::fs::read_to_string(&log).unwrap(), "first\n\n   \nsecond\nthird\n");
    }

    #[test]
    fn test_up_arrow_recalls_and_edits_copy() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("history.log");
        std::fs::write(&log, "hello\n").unwrap();

        let term = ScriptedTerminal::default();
        let mut console = ConsoleSession::new(term.clone(), Vec::new(), &config_with_log(Some(log)));

        // Arrow split across two reads
        term.type_bytes(b"\x1b[");
        term.type_bytes(b"A!");
        term.type_bytes(b"\n");
        for _ in 0..3 {
            console.collect_input();
        }

        assert_eq!(console.query_completed_line().as_deref(), Some("hello!"));
        let entries: Vec<&str> = console.history().entries().collect();
        assert_eq!(entries, vec!["hello", "hello!"]);
    }

    #[test]
    fn test_unopenable_log_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("missing-dir").join("history.log");

        let term = ScriptedTerminal::default();
        let mut console = ConsoleSession::new(term.clone(), Vec::new(), &config_with_log(Some(log.clone())));
        term.type_bytes(b"ping\n");
        console.collect_input();

        assert!(!console.is_persisting());
        assert_eq!(console.query_completed_line().as_deref(), Some("ping"));
        assert_eq!(console.history().len(), 1);
        assert!(!log.exists());
    }

    #[test]
    fn test_redraw_clears_previous_width() {
        let term = ScriptedTerminal::default();
        let mut console = ConsoleSession::new(term.clone(), Vec::new(), &config_with_log(None));

        term.type_bytes(b"ab");
        console.collect_input();
        term.type_bytes(&[0x7f]);
        console.collect_input();

        let shown = String::from_utf8(console.out.clone()).unwrap();
        let prompt = "local_machine:$ ";
        let first = format!("\r\r{}ab", prompt);
        let second = format!("\r{}\r{}a", " ".repeat(prompt.len() + 2), prompt);
        assert_eq!(shown, format!("{}{}", first, second));
    }

    #[test]
    fn test_drop_restores_terminal() {
        let term = ScriptedTerminal::default();
        {
            let mut console = ConsoleSession::new(term.clone(), Vec::new(), &config_with_log(None));
            console.collect_input();
            assert!(term.raw.get());
        }
        assert!(!term.raw.get());
        assert_eq!(term.restores.get(), 1);
    }
}
