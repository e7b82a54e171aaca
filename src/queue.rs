//! Tone Queue: a bounded circular buffer of (duration, frequency) tone
//! records, single consumer (the sine generator worker), many producers
//! (sender, iambic keyer, straight key). An explicit ring buffer rather
//! than a channel, since the FOREVER-hold and low-water-callback semantics
//! need direct access to head/tail.

use crate::error::{CwError, Result};
use crate::keystate::KeyState;

/// Hold the last sample indefinitely until a new tone is enqueued.
pub const FOREVER: i64 = -1;
/// Short fixed-length rising fade; length is a generator concern.
pub const RISING_SLOPE: i64 = -2;
/// Short fixed-length falling fade; length is a generator concern.
pub const FALLING_SLOPE: i64 = -3;

pub const DEFAULT_CAPACITY: usize = 3000;
/// Sender checks against `capacity - HIGH_WATER_MARGIN` before enqueueing a
/// full representation.
pub const HIGH_WATER_MARGIN: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    Idle,
    Busy,
}

/// A single queued tone: duration in microseconds (or one of the sentinel
/// constants above), frequency in Hz (0 = silence).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tone {
    pub duration_usec: i64,
    pub frequency_hz: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DequeueOutcome {
    JustEmptied,
    StillEmpty,
    NonEmpty(Tone),
}

pub type LowWaterCallback = Box<dyn FnMut() + Send>;

struct Inner {
    buffer: Vec<Tone>,
    head: usize,
    tail: usize,
    state: QueueState,
    low_water_mark: usize,
    low_water_callback: Option<LowWaterCallback>,
}

pub struct ToneQueue {
    inner: std::sync::Mutex<Inner>,
    /// Bumped on every enqueue/dequeue transition; wait_for_tone waits for
    /// this to move.
    activity: std::sync::Condvar,
    /// Set by the generator while its worker thread is alive. Wait
    /// operations fail with `Deadlock` instead of blocking forever once
    /// this goes false.
    generator_running: std::sync::atomic::AtomicBool,
}

const WAIT_POLL: std::time::Duration = std::time::Duration::from_millis(20);

impl Default for ToneQueue {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl ToneQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        ToneQueue {
            inner: std::sync::Mutex::new(Inner {
                buffer: vec![Tone { duration_usec: 0, frequency_hz: 0 }; capacity + 1],
                head: 0,
                tail: 0,
                state: QueueState::Idle,
                low_water_mark: 0,
                low_water_callback: None,
            }),
            activity: std::sync::Condvar::new(),
            generator_running: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Called by the generator worker on start/stop; wait operations use
    /// this to fail fast with `Deadlock` instead of blocking forever
    /// against a worker that no longer exists.
    pub fn set_generator_running(&self, running: bool) {
        self.generator_running.store(running, std::sync::atomic::Ordering::SeqCst);
        self.activity.notify_all();
    }

    fn is_generator_running(&self) -> bool {
        self.generator_running.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Blocks until the queue is idle (fully drained). Fails with
    /// `Deadlock` if the generator worker is not running.
    pub fn wait_for_tone_queue(&self) -> Result<()> {
        loop {
            if !self.is_generator_running() {
                return Err(CwError::Deadlock("generator worker is not running"));
            }
            let inner = self.inner.lock().unwrap();
            if inner.state == QueueState::Idle {
                return Ok(());
            }
            let _ = self.activity.wait_timeout(inner, WAIT_POLL).unwrap();
        }
    }

    /// Blocks until queue length drops to at most `level`. Fails with
    /// `Deadlock` if the generator worker is not running.
    pub fn wait_for_tone_queue_critical(&self, level: usize) -> Result<()> {
        loop {
            if !self.is_generator_running() {
                return Err(CwError::Deadlock("generator worker is not running"));
            }
            let inner = self.inner.lock().unwrap();
            if Self::length_of(&inner) <= level {
                return Ok(());
            }
            let _ = self.activity.wait_timeout(inner, WAIT_POLL).unwrap();
        }
    }

    /// Blocks until the next dequeue event (one tone boundary). Fails with
    /// `Deadlock` if the generator worker is not running.
    pub fn wait_for_tone(&self) -> Result<()> {
        if !self.is_generator_running() {
            return Err(CwError::Deadlock("generator worker is not running"));
        }
        let inner = self.inner.lock().unwrap();
        let _ = self.activity.wait_timeout(inner, WAIT_POLL).unwrap();
        Ok(())
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().unwrap().buffer.len() - 1
    }

    pub fn length(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        Self::length_of(&inner)
    }

    fn length_of(inner: &Inner) -> usize {
        let cap = inner.buffer.len();
        (inner.tail + cap - inner.head) % cap
    }

    pub fn is_full(&self) -> bool {
        let inner = self.inner.lock().unwrap();
        Self::next_index(&inner, inner.tail) == inner.head
    }

    pub fn state(&self) -> QueueState {
        self.inner.lock().unwrap().state
    }

    pub fn set_low_water_mark(&self, mark: usize) {
        self.inner.lock().unwrap().low_water_mark = mark;
    }

    pub fn set_low_water_callback(&self, callback: Option<LowWaterCallback>) {
        self.inner.lock().unwrap().low_water_callback = callback;
    }

    fn next_index(inner: &Inner, index: usize) -> usize {
        (index + 1) % inner.buffer.len()
    }

    pub fn enqueue(&self, duration_usec: i64, frequency_hz: u32) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let next_tail = Self::next_index(&inner, inner.tail);
        if next_tail == inner.head {
            return Err(CwError::WouldBlock("tone queue is full"));
        }
        let was_empty = inner.head == inner.tail;
        inner.buffer[inner.tail] = Tone { duration_usec, frequency_hz };
        inner.tail = next_tail;
        if was_empty {
            inner.state = QueueState::Busy;
        }
        drop(inner);
        self.activity.notify_all();
        Ok(())
    }

    /// Dequeues the next tone, applying the FOREVER-hold and low-water
    /// callback rules, and updates `key_state` accordingly. The low-water
    /// callback (if any) runs with the queue mutex released.
    pub fn dequeue(&self, key_state: &mut KeyState) -> DequeueOutcome {
        let mut fired_callback: Option<LowWaterCallback> = None;
        let outcome = {
            let mut inner = self.inner.lock().unwrap();

            if inner.head == inner.tail {
                let outcome = if inner.state == QueueState::Busy {
                    inner.state = QueueState::Idle;
                    DequeueOutcome::JustEmptied
                } else {
                    DequeueOutcome::StillEmpty
                };
                outcome
            } else {
                let length_before = Self::length_of(&inner);

                // Skip zero-duration entries without returning them.
                while inner.head != inner.tail && inner.buffer[inner.head].duration_usec == 0 {
                    inner.head = Self::next_index(&inner, inner.head);
                }

                if inner.head == inner.tail {
                    inner.state = QueueState::Idle;
                    DequeueOutcome::JustEmptied
                } else {
                    let tone = inner.buffer[inner.head];
                    let only_entry_left = Self::next_index(&inner, inner.head) == inner.tail;

                    if tone.duration_usec == FOREVER && only_entry_left {
                        // Held: replay without advancing head.
                        DequeueOutcome::NonEmpty(tone)
                    } else {
                        inner.head = Self::next_index(&inner, inner.head);
                        let length_after = Self::length_of(&inner);
                        if length_before > inner.low_water_mark
                            && length_after <= inner.low_water_mark
                        {
                            fired_callback = inner.low_water_callback.take();
                        }
                        DequeueOutcome::NonEmpty(tone)
                    }
                }
            }
        };

        if let Some(mut cb) = fired_callback {
            cb();
            self.inner.lock().unwrap().low_water_callback = Some(cb);
        }

        match outcome {
            DequeueOutcome::NonEmpty(tone) if tone.frequency_hz != 0 => key_state.set_closed(true),
            _ => key_state.set_closed(false),
        }

        self.activity.notify_all();
        outcome
    }

    pub fn flush(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.head = inner.tail;
    }

    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.head = inner.tail;
        inner.state = QueueState::Idle;
    }
}

impl std::fmt::Debug for ToneQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock().unwrap();
        f.debug_struct("ToneQueue")
            .field("length", &Self::length_of(&inner))
            .field("capacity", &(inner.buffer.len() - 1))
            .field("state", &inner.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enqueue_dequeue_preserves_value() {
        let q = ToneQueue::with_capacity(8);
        let mut ks = KeyState::new();
        q.enqueue(1000, 800).unwrap();
        match q.dequeue(&mut ks) {
            DequeueOutcome::NonEmpty(t) => {
                assert_eq!(t.duration_usec, 1000);
                assert_eq!(t.frequency_hz, 800);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn full_queue_rejects_enqueue_unchanged() {
        let q = ToneQueue::with_capacity(2);
        q.enqueue(1, 1).unwrap();
        q.enqueue(2, 2).unwrap();
        assert!(q.is_full());
        assert!(matches!(q.enqueue(3, 3), Err(CwError::WouldBlock(_))));
        assert!(q.is_full());
        assert_eq!(q.length(), 2);
    }

    #[test]
    fn empty_then_busy_reports_just_emptied_once() {
        let q = ToneQueue::with_capacity(4);
        let mut ks = KeyState::new();
        assert_eq!(q.dequeue(&mut ks), DequeueOutcome::StillEmpty);

        q.enqueue(500, 600).unwrap();
        assert!(matches!(q.dequeue(&mut ks), DequeueOutcome::NonEmpty(_)));
        assert_eq!(q.dequeue(&mut ks), DequeueOutcome::JustEmptied);
        assert_eq!(q.dequeue(&mut ks), DequeueOutcome::StillEmpty);
    }

    #[test]
    fn forever_tone_is_replayed_without_advancing() {
        let q = ToneQueue::with_capacity(4);
        let mut ks = KeyState::new();
        q.enqueue(FOREVER, 800).unwrap();
        for _ in 0..3 {
            match q.dequeue(&mut ks) {
                DequeueOutcome::NonEmpty(t) => assert_eq!(t.duration_usec, FOREVER),
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(q.length(), 1);
    }

    #[test]
    fn low_water_callback_fires_once_on_crossing() {
        let q = ToneQueue::with_capacity(8);
        q.set_low_water_mark(1);
        let fired = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let fired2 = fired.clone();
        q.set_low_water_callback(Some(Box::new(move || {
            fired2.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        })));

        let mut ks = KeyState::new();
        q.enqueue(1, 1).unwrap();
        q.enqueue(2, 2).unwrap();
        q.enqueue(3, 3).unwrap();

        q.dequeue(&mut ks); // length 3 -> 2, above mark still
        assert_eq!(fired.load(std::sync::atomic::Ordering::SeqCst), 0);
        q.dequeue(&mut ks); // length 2 -> 1, crosses mark
        assert_eq!(fired.load(std::sync::atomic::Ordering::SeqCst), 1);
        q.dequeue(&mut ks); // length 1 -> 0, already at/below mark, no refire
        assert_eq!(fired.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn key_state_follows_frequency() {
        let q = ToneQueue::with_capacity(4);
        let mut ks = KeyState::new();
        q.enqueue(1000, 800).unwrap();
        q.dequeue(&mut ks);
        assert!(ks.is_closed());
        q.enqueue(500, 0).unwrap();
        q.dequeue(&mut ks);
        assert!(!ks.is_closed());
    }

    #[test]
    fn wait_operations_deadlock_without_running_generator() {
        let q = ToneQueue::with_capacity(4);
        assert!(matches!(q.wait_for_tone_queue(), Err(CwError::Deadlock(_))));
        assert!(matches!(q.wait_for_tone_queue_critical(0), Err(CwError::Deadlock(_))));
        assert!(matches!(q.wait_for_tone(), Err(CwError::Deadlock(_))));
    }

    #[test]
    fn wait_for_tone_queue_returns_once_idle() {
        let q = std::sync::Arc::new(ToneQueue::with_capacity(8));
        q.set_generator_running(true);
        q.enqueue(1000, 800).unwrap();

        let q2 = q.clone();
        let drainer = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(10));
            let mut ks = KeyState::new();
            q2.dequeue(&mut ks);
            q2.dequeue(&mut ks);
        });

        q.wait_for_tone_queue().unwrap();
        drainer.join().unwrap();
    }

    #[test]
    fn reset_clears_and_sets_idle() {
        let q = ToneQueue::with_capacity(4);
        q.enqueue(1, 1).unwrap();
        q.reset();
        assert_eq!(q.length(), 0);
        assert_eq!(q.state(), QueueState::Idle);
    }
}
