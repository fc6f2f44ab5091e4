//! Debounce-then-interval timer logic, kept free of any clock or thread.
//!
//! The runtime feeds the current instant into [`Scheduler::poll`] and sleeps until
//! [`Scheduler::next_deadline`]; tests drive it with synthetic instants.

use log::debug;
use std::time::{Duration, Instant};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(200);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    /// First registration seen, the initial fetch runs at `fire_at`.
    DebouncePending { fire_at: Instant },
    /// Recurring polling. `debounce` is set when a later registration re-armed it.
    Polling {
        next_poll: Instant,
        debounce: Option<Instant>,
    },
}

/// Why a sync pass is due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Debounce,
    Interval,
}

#[derive(Debug)]
pub struct Scheduler {
    state: SchedulerState,
    debounce: Duration,
    interval: Duration,
}

impl Default for Scheduler {
    fn default() -> Self {
        Scheduler::new(DEFAULT_DEBOUNCE, DEFAULT_POLL_INTERVAL)
    }
}

impl Scheduler {
    pub fn new(debounce: Duration, interval: Duration) -> Self {
        Scheduler {
            state: SchedulerState::Idle,
            debounce,
            interval,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// A device was registered: (re-)arm the debounce. A running interval is left alone.
    pub fn on_register(&mut self, now: Instant) {
        let fire_at = now + self.debounce;
        self.state = match self.state {
            SchedulerState::Idle | SchedulerState::DebouncePending { .. } => SchedulerState::DebouncePending { fire_at },
            SchedulerState::Polling { next_poll, .. } => SchedulerState::Polling {
                next_poll,
                debounce: Some(fire_at),
            },
        };
    }

    /// The registry became empty: drop every timer.
    pub fn on_empty(&mut self) {
        if self.state != SchedulerState::Idle {
            debug!("Scheduler idle, timers cleared");
        }
        self.state = SchedulerState::Idle;
    }

    /// Advance the state machine to `now` and report a due sync pass, if any.
    ///
    /// At most one trigger is returned per call; call again until `None` to drain.
    pub fn poll(&mut self, now: Instant) -> Option<Trigger> {
        match self.state {
            SchedulerState::Idle => None,
            SchedulerState::DebouncePending { fire_at } => {
                if now < fire_at {
                    return None;
                }
                self.state = SchedulerState::Polling {
                    next_poll: now + self.interval,
                    debounce: None,
                };
                Some(Trigger::Debounce)
            }
            SchedulerState::Polling { next_poll, debounce } => {
                if let Some(fire_at) = debounce
                    && now >= fire_at
                {
                    // The debounced pass stands in for the next tick.
                    self.state = SchedulerState::Polling {
                        next_poll: now + self.interval,
                        debounce: None,
                    };
                    return Some(Trigger::Debounce);
                }
                if now < next_poll {
                    return None;
                }
                // Skip missed ticks instead of firing a burst after a long pass.
                let mut next = next_poll + self.interval;
                if next <= now {
                    next = now + self.interval;
                }
                self.state = SchedulerState::Polling {
                    next_poll: next,
                    debounce,
                };
                Some(Trigger::Interval)
            }
        }
    }

    /// Earliest instant at which [`Scheduler::poll`] can return a trigger.
    pub fn next_deadline(&self) -> Option<Instant> {
        match self.state {
            SchedulerState::Idle => None,
            SchedulerState::DebouncePending { fire_at } => Some(fire_at),
            SchedulerState::Polling { next_poll, debounce } => {
                Some(debounce.map_or(next_poll, |d| d.min(next_poll)))
            }
        }
    }

    /// Number of armed timers.
    pub fn timer_count(&self) -> usize {
        match self.state {
            SchedulerState::Idle => 0,
            SchedulerState::DebouncePending { .. } => 1,
            SchedulerState::Polling { debounce, .. } => 1 + usize::from(debounce.is_some()),
        }
    }
}
