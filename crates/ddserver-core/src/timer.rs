//! Fixed-capacity timer table
//!
//! Timers live by value in a bounded vector. Expired one-shot timers are
//! removed with swap-with-last, so the slot index handed out at
//! registration is only meaningful until the first removal.
//!
//! ```text
//!  slots:  [ t0 | t1 | t2 | t3 ]      t1 one-shot, due
//!                 ▲
//!  fire t1, then t3 moves into slot 1 and slot 1 is examined again
//!  slots:  [ t0 | t3 | t2 ]
//! ```

use crate::error::TimerCapacityError;

/// Interval and repeat flag of one timer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerSpec {
    /// Fires once `now - last_fired` exceeds this many nanoseconds
    pub tick_nanos: u64,
    pub repeat: bool,
}

impl TimerSpec {
    pub fn repeating(tick_nanos: u64) -> Self {
        Self {
            tick_nanos,
            repeat: true,
        }
    }

    pub fn once(tick_nanos: u64) -> Self {
        Self {
            tick_nanos,
            repeat: false,
        }
    }
}

/// Slot a timer landed in at registration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerSlot(pub usize);

/// Whether the walk should go on after a callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Break,
}

#[derive(Debug)]
struct TimerEntry<C> {
    spec: TimerSpec,
    last_fired: u64,
    callback: C,
}

/// Bounded table of timers with callbacks of type `C`
#[derive(Debug)]
pub struct TimerTable<C> {
    entries: Vec<TimerEntry<C>>,
    capacity: usize,
}

impl<C> TimerTable<C> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Register a timer; the table is left untouched when full
    pub fn add(&mut self, spec: TimerSpec, callback: C) -> Result<TimerSlot, TimerCapacityError> {
        if self.entries.len() >= self.capacity {
            return Err(TimerCapacityError {
                capacity: self.capacity,
            });
        }
        self.entries.push(TimerEntry {
            spec,
            last_fired: 0,
            callback,
        });
        Ok(TimerSlot(self.entries.len() - 1))
    }

    /// Set every timer's last-fired timestamp, used when a loop starts
    pub fn reset_all(&mut self, now: u64) {
        for entry in &mut self.entries {
            entry.last_fired = now;
        }
    }

    /// Walk the table once and fire every due timer
    ///
    /// A timer is due when `now - last_fired > tick_nanos`. After firing, a
    /// repeating timer's `last_fired` becomes `now` (drift is not corrected);
    /// a one-shot timer is swap-removed and its slot re-examined. Returns
    /// `Flow::Break` as soon as `fire` does, leaving the fired timer as is.
    pub fn fire_due<F>(&mut self, now: u64, mut fire: F) -> Flow
    where
        F: FnMut(&mut C, &TimerSpec) -> Flow,
    {
        let mut idx = 0;
        while idx < self.entries.len() {
            let entry = &mut self.entries[idx];
            let delta = now.saturating_sub(entry.last_fired);

            if entry.spec.tick_nanos < delta {
                if fire(&mut entry.callback, &entry.spec) == Flow::Break {
                    return Flow::Break;
                }

                if entry.spec.repeat {
                    entry.last_fired = now;
                } else {
                    self.entries.swap_remove(idx);
                    continue;
                }
            }

            idx += 1;
        }
        Flow::Continue
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn spec(&self, slot: TimerSlot) -> Option<TimerSpec> {
        self.entries.get(slot.0).map(|e| e.spec)
    }

    pub fn last_fired(&self, slot: TimerSlot) -> Option<u64> {
        self.entries.get(slot.0).map(|e| e.last_fired)
    }

    pub fn specs(&self) -> impl Iterator<Item = &TimerSpec> + '_ {
        self.entries.iter().map(|e| &e.spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::MAX_ACTIVE_TIMERS;

    #[test]
    fn test_capacity_enforced() {
        let mut table: TimerTable<u32> = TimerTable::with_capacity(MAX_ACTIVE_TIMERS);
        for i in 0..MAX_ACTIVE_TIMERS {
            let slot = table.add(TimerSpec::repeating(i as u64 + 1), i as u32).unwrap();
            assert_eq!(slot, TimerSlot(i));
        }

        let err = table.add(TimerSpec::once(99), 99).unwrap_err();
        assert_eq!(err.capacity, MAX_ACTIVE_TIMERS);
        assert_eq!(table.len(), MAX_ACTIVE_TIMERS);

        // Existing timers unmodified
        for (i, spec) in table.specs().enumerate() {
            assert_eq!(*spec, TimerSpec::repeating(i as u64 + 1));
        }
    }

    #[test]
    fn test_repeating_fires_only_past_interval() {
        let mut table = TimerTable::with_capacity(4);
        let slot = table.add(TimerSpec::repeating(100), 0u32).unwrap();
        table.reset_all(1_000);

        // Exactly the interval is not enough
        table.fire_due(1_100, |count, _| {
            *count += 1;
            Flow::Continue
        });
        assert_eq!(table.last_fired(slot), Some(1_000));

        table.fire_due(1_101, |count, _| {
            *count += 1;
            Flow::Continue
        });
        assert_eq!(table.last_fired(slot), Some(1_101));

        // Reset to the tick timestamp, not last + interval
        table.fire_due(1_350, |count, _| {
            *count += 1;
            Flow::Continue
        });
        assert_eq!(table.last_fired(slot), Some(1_350));
        assert_eq!(table.entries[0].callback, 2);
    }

    #[test]
    fn test_one_shot_removed_after_firing() {
        let mut table = TimerTable::with_capacity(4);
        table.add(TimerSpec::once(10), "once").unwrap();
        table.add(TimerSpec::repeating(1_000), "slow").unwrap();
        table.reset_all(0);

        let mut fired = Vec::new();
        table.fire_due(50, |name, _| {
            fired.push(*name);
            Flow::Continue
        });
        assert_eq!(fired, vec!["once"]);
        assert_eq!(table.len(), 1);

        fired.clear();
        table.fire_due(60, |name, _| {
            fired.push(*name);
            Flow::Continue
        });
        assert!(fired.is_empty());
    }

    #[test]
    fn test_swapped_in_timer_checked_same_walk() {
        let mut table = TimerTable::with_capacity(4);
        table.add(TimerSpec::once(1), 'a').unwrap();
        table.add(TimerSpec::repeating(1_000_000), 'b').unwrap();
        table.add(TimerSpec::once(1), 'c').unwrap();
        table.reset_all(0);

        let mut fired = Vec::new();
        table.fire_due(10, |name, _| {
            fired.push(*name);
            Flow::Continue
        });

        // 'c' moved into slot 0 and still fired this walk
        assert_eq!(fired, vec!['a', 'c']);
        assert_eq!(table.len(), 1);
        assert_eq!(table.spec(TimerSlot(0)), Some(TimerSpec::repeating(1_000_000)));
    }

    #[test]
    fn test_break_stops_walk() {
        let mut table = TimerTable::with_capacity(4);
        table.add(TimerSpec::once(1), 1).unwrap();
        table.add(TimerSpec::once(1), 2).unwrap();
        table.reset_all(0);

        let mut fired = Vec::new();
        let flow = table.fire_due(10, |n, _| {
            fired.push(*n);
            Flow::Break
        });

        assert_eq!(flow, Flow::Break);
        assert_eq!(fired, vec![1]);
        // Neither removed: the walk stopped right after the callback
        assert_eq!(table.len(), 2);
    }
}
