//! Iambic Keyer: paddle-driven latch-based state machine producing
//! alternating dots/dashes with Curtis A/B semantics, feeding tones into
//! the tone queue. Scheduler-agnostic: an external timer (owned by
//! `Engine`) calls `tick()` every `next_interval()` microseconds rather
//! than the keyer driving its own clock.

use crate::error::{CwError, Result};
use crate::queue::ToneQueue;
use crate::timing::Timing;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyerState {
    Idle,
    InDotA,
    InDashA,
    AfterDotA,
    AfterDashA,
    InDotB,
    InDashB,
    AfterDotB,
    AfterDashB,
}

struct Inner {
    state: KeyerState,
    dot_paddle: bool,
    dash_paddle: bool,
    dot_latch: bool,
    dash_latch: bool,
    curtis_b_latch: bool,
    curtis_b_enabled: bool,
}

pub struct IambicKeyer {
    inner: Mutex<Inner>,
    activity: Condvar,
    scheduler_running: AtomicBool,
    queue: Arc<ToneQueue>,
    timing: Arc<Mutex<Timing>>,
}

impl IambicKeyer {
    pub fn new(queue: Arc<ToneQueue>, timing: Arc<Mutex<Timing>>) -> Self {
        IambicKeyer {
            inner: Mutex::new(Inner {
                state: KeyerState::Idle,
                dot_paddle: false,
                dash_paddle: false,
                dot_latch: false,
                dash_latch: false,
                curtis_b_latch: false,
                curtis_b_enabled: false,
            }),
            activity: Condvar::new(),
            scheduler_running: AtomicBool::new(false),
            queue,
            timing,
        }
    }

    /// Called by the owning scheduler once it starts calling `tick()`
    /// periodically; wait operations use this to distinguish "nothing to
    /// wait for" from "nobody is driving the clock".
    pub fn set_scheduler_running(&self, running: bool) {
        self.scheduler_running.store(running, Ordering::SeqCst);
        self.activity.notify_all();
    }

    pub fn set_curtis_b_enabled(&self, enabled: bool) {
        self.inner.lock().unwrap().curtis_b_enabled = enabled;
    }

    pub fn curtis_b_enabled(&self) -> bool {
        self.inner.lock().unwrap().curtis_b_enabled
    }

    pub fn paddle_states(&self) -> (bool, bool) {
        let inner = self.inner.lock().unwrap();
        (inner.dot_paddle, inner.dash_paddle)
    }

    pub fn latches(&self) -> (bool, bool, bool) {
        let inner = self.inner.lock().unwrap();
        (inner.dot_latch, inner.dash_latch, inner.curtis_b_latch)
    }

    pub fn state(&self) -> KeyerState {
        self.inner.lock().unwrap().state
    }

    pub fn is_keyer_busy(&self) -> bool {
        self.state() != KeyerState::Idle
    }

    pub fn notify_paddle_event(&self, dot: bool, dash: bool) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.dot_paddle = dot;
        inner.dash_paddle = dash;
        if dot {
            inner.dot_latch = true;
        }
        if dash {
            inner.dash_latch = true;
        }
        if dot && dash && inner.curtis_b_enabled {
            inner.curtis_b_latch = true;
        }

        if inner.state == KeyerState::Idle {
            if dot && !dash {
                inner.state = KeyerState::AfterDashA;
            } else if dash && !dot {
                inner.state = KeyerState::AfterDotA;
            } else if dot && dash {
                inner.state = KeyerState::AfterDashA;
            }
        }
        drop(inner);
        self.activity.notify_all();
        Ok(())
    }

    /// Microseconds until the next tick should fire for the current state,
    /// or `None` if the keyer is idle and needs no driving clock.
    pub fn next_interval_usec(&self) -> Option<i64> {
        let state = self.state();
        let d = self.timing.lock().unwrap().derived();
        match state {
            KeyerState::Idle => None,
            KeyerState::InDotA | KeyerState::InDotB => Some(d.dot),
            KeyerState::InDashA | KeyerState::InDashB => Some(d.dash),
            KeyerState::AfterDotA
            | KeyerState::AfterDashA
            | KeyerState::AfterDotB
            | KeyerState::AfterDashB => Some(d.end_of_element),
        }
    }

    fn frequency(&self) -> u32 {
        self.timing.lock().unwrap().frequency()
    }

    /// Advances the state machine by one element boundary.
    pub fn tick(&self) -> Result<()> {
        let freq = self.frequency();
        let mut inner = self.inner.lock().unwrap();

        match inner.state {
            KeyerState::Idle => {}

            KeyerState::InDotA | KeyerState::InDashA | KeyerState::InDotB | KeyerState::InDashB => {
                if !inner.dot_paddle {
                    inner.dot_latch = false;
                }
                if !inner.dash_paddle {
                    inner.dash_latch = false;
                }
                let d = self.timing.lock().unwrap().derived();
                self.queue.enqueue(d.end_of_element, 0)?;
                inner.state = match inner.state {
                    KeyerState::InDotA => KeyerState::AfterDotA,
                    KeyerState::InDashA => KeyerState::AfterDashA,
                    KeyerState::InDotB => KeyerState::AfterDotB,
                    KeyerState::InDashB => KeyerState::AfterDashB,
                    _ => unreachable!(),
                };
            }

            KeyerState::AfterDotA => {
                if inner.dash_latch {
                    let d = self.timing.lock().unwrap().derived();
                    self.queue.enqueue(d.dash, freq)?;
                    inner.state = if inner.curtis_b_latch {
                        inner.curtis_b_latch = false;
                        KeyerState::InDashB
                    } else {
                        KeyerState::InDashA
                    };
                } else if inner.dot_latch {
                    let d = self.timing.lock().unwrap().derived();
                    self.queue.enqueue(d.dot, freq)?;
                    inner.state = KeyerState::InDotA;
                } else {
                    inner.state = KeyerState::Idle;
                }
            }

            KeyerState::AfterDotB => {
                let d = self.timing.lock().unwrap().derived();
                self.queue.enqueue(d.dash, freq)?;
                inner.state = KeyerState::InDashA;
            }

            KeyerState::AfterDashA => {
                if inner.dot_latch {
                    let d = self.timing.lock().unwrap().derived();
                    self.queue.enqueue(d.dot, freq)?;
                    inner.state = if inner.curtis_b_latch {
                        inner.curtis_b_latch = false;
                        KeyerState::InDotB
                    } else {
                        KeyerState::InDotA
                    };
                } else if inner.dash_latch {
                    let d = self.timing.lock().unwrap().derived();
                    self.queue.enqueue(d.dash, freq)?;
                    inner.state = KeyerState::InDashA;
                } else {
                    inner.state = KeyerState::Idle;
                }
            }

            KeyerState::AfterDashB => {
                let d = self.timing.lock().unwrap().derived();
                self.queue.enqueue(d.dot, freq)?;
                inner.state = KeyerState::InDotA;
            }
        }

        drop(inner);
        self.activity.notify_all();
        Ok(())
    }

    fn wait(&self, predicate: impl Fn(&Inner) -> bool) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        loop {
            if predicate(&inner) {
                return Ok(());
            }
            if !self.scheduler_running.load(Ordering::SeqCst) {
                return Err(CwError::Deadlock("iambic scheduler is not running"));
            }
            let (guard, _timeout) = self
                .activity
                .wait_timeout(inner, std::time::Duration::from_millis(20))
                .unwrap();
            inner = guard;
        }
    }

    pub fn wait_for_element(&self) -> Result<()> {
        if !self.scheduler_running.load(Ordering::SeqCst) {
            return Err(CwError::Deadlock("iambic scheduler is not running"));
        }
        let inner = self.inner.lock().unwrap();
        let _ = self.activity.wait_timeout(inner, std::time::Duration::from_millis(20)).unwrap();
        Ok(())
    }

    pub fn wait_for_keyer(&self) -> Result<()> {
        {
            let inner = self.inner.lock().unwrap();
            if inner.dot_paddle || inner.dash_paddle {
                return Err(CwError::Deadlock("a paddle is still held"));
            }
        }
        self.wait(|inner| inner.state == KeyerState::Idle)
    }

    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.state = KeyerState::Idle;
        inner.dot_paddle = false;
        inner.dash_paddle = false;
        inner.dot_latch = false;
        inner.dash_latch = false;
        inner.curtis_b_latch = false;
    }
}
