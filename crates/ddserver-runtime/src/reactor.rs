//! Single-threaded reactor loop
//!
//! One tick:
//!
//! ```text
//!   select(listener, poll_wait) ──readable──► on_readable
//!            │                                    │ break? → return
//!            ▼                                    ▼
//!   walk timers (active_time snapshot) ───► callback → break? → return
//!            │
//!            ▼
//!   active_time = now()
//! ```
//!
//! The readiness wait is the only blocking point. Callbacks end the loop by
//! calling [`LoopHandle::break_loop`]; the flag is checked right after each
//! callback, so nothing else runs once it is cleared.
//!
//! # Example
//!
//! ```ignore
//! let mut reactor = Reactor::new(&server, |h| {
//!     if let Some(data) = h.listener().receive()? {
//!         kplain!("Data received: {}", data.msg);
//!     }
//!     Ok(())
//! });
//! reactor.add_timer(0.1, true, |h| poll_console(h));
//! reactor.run()?;
//! ```

use ddserver_core::constants::MAX_ACTIVE_TIMERS;
use ddserver_core::{kerror, kwarn};
use ddserver_core::{
    nanos_to_seconds, seconds_to_nanos, ClockSource, Flow, NetError, NetResult, ReactorError,
    TimerCapacityError, TimerSlot, TimerSpec, TimerTable,
};
use std::time::Duration;

use crate::config::defaults;
use crate::net::Endpoint;
use crate::platform::{wait_readable, MonotonicClock};

/// Callback run when a timer is due
pub type TimerCallback<'a> = Box<dyn FnMut(&mut LoopHandle<'_>) + 'a>;

/// Callback run when the listener is readable
///
/// A fatal error (see [`NetError::is_fatal`]) ends the loop; any other
/// error is logged and the loop goes on.
pub type ReadCallback<'a> = Box<dyn FnMut(&mut LoopHandle<'_>) -> NetResult<()> + 'a>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running,
    Terminated,
}

/// What a callback sees of the running loop
pub struct LoopHandle<'h> {
    listener: &'h Endpoint,
    active: &'h mut bool,
    start_time: u64,
    active_time: u64,
    timer: Option<TimerSpec>,
}

impl<'h> LoopHandle<'h> {
    /// Stop the loop as soon as the current callback returns
    pub fn break_loop(&mut self) {
        *self.active = false;
    }

    pub fn is_active(&self) -> bool {
        *self.active
    }

    /// The borrowed listening endpoint
    pub fn listener(&self) -> &'h Endpoint {
        self.listener
    }

    /// Nanoseconds from loop start to this tick's snapshot
    pub fn elapsed_nanos(&self) -> u64 {
        self.active_time - self.start_time
    }

    pub fn elapsed_seconds(&self) -> f64 {
        nanos_to_seconds(self.elapsed_nanos())
    }

    /// Timer being fired; `None` inside the read callback
    pub fn timer(&self) -> Option<&TimerSpec> {
        self.timer.as_ref()
    }
}

/// Reactor over one borrowed listener
///
/// The loop never closes the listener; that stays with the caller.
pub struct Reactor<'a> {
    listener: &'a Endpoint,
    on_readable: ReadCallback<'a>,
    timers: TimerTable<TimerCallback<'a>>,
    clock: Box<dyn ClockSource + 'a>,
    poll_wait: Duration,
    state: LoopState,
    start_time: u64,
    active_time: u64,
    active: bool,
}

impl<'a> Reactor<'a> {
    pub fn new<F>(listener: &'a Endpoint, on_readable: F) -> Self
    where
        F: FnMut(&mut LoopHandle<'_>) -> NetResult<()> + 'a,
    {
        Self {
            listener,
            on_readable: Box::new(on_readable),
            timers: TimerTable::with_capacity(MAX_ACTIVE_TIMERS),
            clock: Box::new(MonotonicClock::new()),
            poll_wait: Duration::from_micros(defaults::POLL_WAIT_US),
            state: LoopState::Idle,
            start_time: 0,
            active_time: 0,
            active: true,
        }
    }

    /// Replace the time source
    pub fn with_clock(mut self, clock: impl ClockSource + 'a) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Bound on the per-tick readiness wait
    pub fn with_poll_wait(mut self, wait: Duration) -> Self {
        self.poll_wait = wait;
        self
    }

    /// Register a timer firing every `seconds` (or once when `repeat` is false)
    ///
    /// Past the fixed capacity the timer is dropped, an error is logged and
    /// the existing timers are left as they are.
    pub fn add_timer<F>(
        &mut self,
        seconds: f64,
        repeat: bool,
        callback: F,
    ) -> Result<TimerSlot, TimerCapacityError>
    where
        F: FnMut(&mut LoopHandle<'_>) + 'a,
    {
        let tick = seconds_to_nanos(seconds.max(0.0));
        let spec = if repeat {
            TimerSpec::repeating(tick)
        } else {
            TimerSpec::once(tick)
        };

        self.timers.add(spec, Box::new(callback)).map_err(|e| {
            kerror!("Loop timer limit reached. Abort add");
            e
        })
    }

    /// Run until a callback breaks the loop or a fatal error occurs
    ///
    /// A loop runs once; calling `run` again returns
    /// [`ReactorError::Terminated`].
    pub fn run(&mut self) -> Result<(), ReactorError> {
        if self.state != LoopState::Idle {
            return Err(ReactorError::Terminated);
        }
        self.state = LoopState::Running;
        let result = self.run_ticks();
        self.state = LoopState::Terminated;
        self.active = false;
        result
    }

    fn run_ticks(&mut self) -> Result<(), ReactorError> {
        let fd = match self.listener.fd() {
            Some(fd) => fd,
            None => {
                kerror!("Loop listener is closed");
                return Err(ReactorError::Listener(NetError::Closed));
            }
        };

        self.start_time = self.clock.now_nanos();
        self.active_time = self.start_time;
        self.timers.reset_all(self.start_time);

        while self.active {
            let readable = match wait_readable(fd, self.poll_wait) {
                Ok(readable) => readable,
                Err(e) => {
                    kerror!("Select error: {}", e);
                    return Err(ReactorError::Poll(e));
                }
            };

            if readable {
                let mut handle = LoopHandle {
                    listener: self.listener,
                    active: &mut self.active,
                    start_time: self.start_time,
                    active_time: self.active_time,
                    timer: None,
                };
                if let Err(e) = (self.on_readable)(&mut handle) {
                    if e.is_fatal() {
                        kerror!("Listener failed, stopping loop: {}", e);
                        return Err(ReactorError::Listener(e));
                    }
                    kwarn!("Read callback: {}", e);
                }
                if !self.active {
                    return Ok(());
                }
            }

            if self.fire_timers() == Flow::Break {
                return Ok(());
            }

            self.active_time = self.active_time.max(self.clock.now_nanos());
        }

        Ok(())
    }

    fn fire_timers(&mut self) -> Flow {
        let listener = self.listener;
        let start_time = self.start_time;
        let active_time = self.active_time;
        let active = &mut self.active;

        self.timers.fire_due(active_time, |callback, spec| {
            let mut handle = LoopHandle {
                listener,
                active: &mut *active,
                start_time,
                active_time,
                timer: Some(*spec),
            };
            callback(&mut handle);

            if *active {
                Flow::Continue
            } else {
                Flow::Break
            }
        })
    }

    pub fn timers_count(&self) -> usize {
        self.timers.len()
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Nanoseconds between loop start and the latest tick
    pub fn elapsed_nanos(&self) -> u64 {
        self.active_time - self.start_time
    }

    pub fn elapsed_seconds(&self) -> f64 {
        nanos_to_seconds(self.elapsed_nanos())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::{resolve_and_select, SocketKind};
    use ddserver_core::Message;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    /// Advances by `step` on every read
    struct SteppingClock {
        now: Cell<u64>,
        step: u64,
    }

    impl ClockSource for SteppingClock {
        fn now_nanos(&self) -> u64 {
            let now = self.now.get();
            self.now.set(now + self.step);
            now
        }
    }

    fn idle_listener() -> Endpoint {
        let mut server = resolve_and_select("127.0.0.1", 0, SocketKind::Datagram).unwrap();
        server.bind_as_server().unwrap();
        server
    }

    fn ignore_reads(_: &mut LoopHandle<'_>) -> NetResult<()> {
        Ok(())
    }

    #[test]
    fn test_udp_hello_reaches_read_callback() {
        let mut server = resolve_and_select("127.0.0.1", 4321, SocketKind::Datagram).unwrap();
        server.bind_as_server().unwrap();

        let client = resolve_and_select("127.0.0.1", 4321, SocketKind::Datagram).unwrap();
        client.send(&Message::new("hello")).unwrap();

        let received = RefCell::new(Vec::new());
        let mut reactor = Reactor::new(&server, |h| {
            if let Some(data) = h.listener().receive()? {
                received.borrow_mut().push((data.bytes_read, data.msg));
                h.break_loop();
            }
            Ok(())
        });
        // Safety net so a lost datagram fails the test instead of hanging
        reactor.add_timer(2.0, false, |h| h.break_loop()).unwrap();
        reactor.run().unwrap();
        drop(reactor);

        assert_eq!(received.into_inner(), vec![(5, "hello".to_string())]);
    }

    #[test]
    fn test_one_shot_fires_once_and_leaves_table() {
        let listener = idle_listener();
        let fired = Cell::new(0u32);

        let mut reactor = Reactor::new(&listener, ignore_reads);
        reactor.add_timer(0.05, false, |_| fired.set(fired.get() + 1)).unwrap();
        reactor.add_timer(0.2, true, |h| h.break_loop()).unwrap();
        assert_eq!(reactor.timers_count(), 2);

        reactor.run().unwrap();

        assert_eq!(fired.get(), 1);
        assert_eq!(reactor.timers_count(), 1);
        assert!(reactor.elapsed_seconds() >= 0.2);
    }

    #[test]
    fn test_eleventh_timer_rejected() {
        let listener = idle_listener();
        let mut reactor = Reactor::new(&listener, ignore_reads);

        for _ in 0..MAX_ACTIVE_TIMERS {
            reactor.add_timer(1.0, true, |_| {}).unwrap();
        }
        let err = reactor.add_timer(0.5, false, |_| {}).unwrap_err();
        assert_eq!(err.capacity, MAX_ACTIVE_TIMERS);
        assert_eq!(reactor.timers_count(), MAX_ACTIVE_TIMERS);
    }

    #[test]
    fn test_repeating_timer_uses_tick_snapshot() {
        let listener = idle_listener();
        let clock = SteppingClock {
            now: Cell::new(0),
            step: 10_000_000,
        };
        let fired_at = RefCell::new(Vec::new());

        let mut reactor = Reactor::new(&listener, ignore_reads)
            .with_clock(clock)
            .with_poll_wait(Duration::from_micros(1));
        reactor
            .add_timer(0.025, true, |h| {
                fired_at.borrow_mut().push(h.elapsed_nanos());
                if fired_at.borrow().len() == 3 {
                    h.break_loop();
                }
            })
            .unwrap();
        reactor.run().unwrap();
        drop(reactor);

        // Ticks see 0, 10, 20, 30ms...; the timer resets to the tick it fired on
        assert_eq!(fired_at.into_inner(), vec![30_000_000, 60_000_000, 90_000_000]);
    }

    #[test]
    fn test_break_skips_rest_of_walk() {
        let listener = idle_listener();
        let clock = SteppingClock {
            now: Cell::new(0),
            step: 1_000_000,
        };
        let order = RefCell::new(Vec::new());

        let mut reactor = Reactor::new(&listener, ignore_reads)
            .with_clock(clock)
            .with_poll_wait(Duration::from_micros(1));
        reactor
            .add_timer(0.0, true, |h| {
                order.borrow_mut().push("first");
                h.break_loop();
            })
            .unwrap();
        reactor.add_timer(0.0, true, |_| order.borrow_mut().push("second")).unwrap();
        reactor.run().unwrap();
        drop(reactor);

        assert_eq!(order.into_inner(), vec!["first"]);
    }

    #[test]
    fn test_read_break_skips_timers() {
        let server = idle_listener();
        let client = resolve_and_select("127.0.0.1", server.port(), SocketKind::Datagram).unwrap();
        client.send(&Message::new("stop")).unwrap();

        let timer_ran = Cell::new(false);
        let mut reactor = Reactor::new(&server, |h| {
            h.listener().receive()?;
            h.break_loop();
            Ok(())
        })
        .with_poll_wait(Duration::from_millis(500));
        reactor.add_timer(0.0, true, |_| timer_ran.set(true)).unwrap();
        reactor.run().unwrap();

        assert!(!timer_ran.get());
    }

    #[test]
    fn test_fatal_read_error_ends_loop() {
        let server = idle_listener();
        let client = resolve_and_select("127.0.0.1", server.port(), SocketKind::Datagram).unwrap();
        client.send(&Message::new("boom")).unwrap();

        let mut reactor = Reactor::new(&server, |h| {
            h.listener().receive()?;
            Err(NetError::Receive(std::io::Error::from(std::io::ErrorKind::Other)))
        });
        let err = reactor.run().unwrap_err();
        assert!(matches!(err, ReactorError::Listener(NetError::Receive(_))));
        assert_eq!(reactor.state(), LoopState::Terminated);
    }

    #[test]
    fn test_terminated_loop_cannot_rerun() {
        let listener = idle_listener();
        let clock = SteppingClock {
            now: Cell::new(0),
            step: 1_000,
        };
        let runs = Cell::new(0u32);

        let mut reactor = Reactor::new(&listener, ignore_reads)
            .with_clock(clock)
            .with_poll_wait(Duration::from_micros(1));
        reactor
            .add_timer(0.0, true, |h| {
                runs.set(runs.get() + 1);
                h.break_loop();
            })
            .unwrap();
        assert_eq!(reactor.state(), LoopState::Idle);

        reactor.run().unwrap();
        assert_eq!(reactor.state(), LoopState::Terminated);
        assert!(matches!(reactor.run(), Err(ReactorError::Terminated)));
        assert_eq!(runs.get(), 1);
    }
}
