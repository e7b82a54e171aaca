//! Straight Key: raw key-down/up passthrough, sustaining a continuous tone
//! while down, driving the tone queue and key state directly through the
//! slope/FOREVER sequencing.

use crate::error::Result;
use crate::keystate::KeyState;
use crate::queue::{ToneQueue, FALLING_SLOPE, FOREVER, RISING_SLOPE};
use crate::timing::Timing;
use std::sync::{Arc, Mutex};

pub struct StraightKey {
    queue: Arc<ToneQueue>,
    key_state: Arc<Mutex<KeyState>>,
    timing: Arc<Mutex<Timing>>,
    closed: bool,
}

impl StraightKey {
    pub fn new(queue: Arc<ToneQueue>, key_state: Arc<Mutex<KeyState>>, timing: Arc<Mutex<Timing>>) -> Self {
        StraightKey { queue, key_state, timing, closed: false }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn notify_straight_key_event(&mut self, closed: bool) -> Result<()> {
        if closed == self.closed {
            return Ok(());
        }
        self.closed = closed;
        self.key_state.lock().unwrap().set_closed(closed);

        let frequency = self.timing.lock().unwrap().frequency();
        if closed {
            self.queue.enqueue(RISING_SLOPE, frequency)?;
            self.queue.enqueue(FOREVER, frequency)?;
        } else {
            self.queue.enqueue(FALLING_SLOPE, 0)?;
            self.queue.enqueue(FOREVER, 0)?;
        }
        Ok(())
    }

    pub fn reset(&mut self) {
        self.closed = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::DequeueOutcome;

    #[test]
    fn key_down_enqueues_rising_then_forever_tone() {
        let queue = Arc::new(ToneQueue::with_capacity(8));
        let key_state = Arc::new(Mutex::new(KeyState::new()));
        let timing = Arc::new(Mutex::new(Timing::new()));
        let mut key = StraightKey::new(queue.clone(), key_state.clone(), timing);

        key.notify_straight_key_event(true).unwrap();
        assert!(key_state.lock().unwrap().is_closed());

        let mut ks = KeyState::new();
        match queue.dequeue(&mut ks) {
            DequeueOutcome::NonEmpty(t) => assert_eq!(t.duration_usec, RISING_SLOPE),
            other => panic!("unexpected {other:?}"),
        }
        match queue.dequeue(&mut ks) {
            DequeueOutcome::NonEmpty(t) => assert_eq!(t.duration_usec, FOREVER),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn key_up_enqueues_falling_then_forever_silence() {
        let queue = Arc::new(ToneQueue::with_capacity(8));
        let key_state = Arc::new(Mutex::new(KeyState::new()));
        let timing = Arc::new(Mutex::new(Timing::new()));
        let mut key = StraightKey::new(queue.clone(), key_state.clone(), timing);

        key.notify_straight_key_event(true).unwrap();
        key.notify_straight_key_event(false).unwrap();

        let mut ks = KeyState::new();
        let _ = queue.dequeue(&mut ks); // rising
        let _ = queue.dequeue(&mut ks); // forever-on
        match queue.dequeue(&mut ks) {
            DequeueOutcome::NonEmpty(t) => {
                assert_eq!(t.duration_usec, FALLING_SLOPE);
                assert_eq!(t.frequency_hz, 0);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn repeated_same_state_is_a_no_op() {
        let queue = Arc::new(ToneQueue::with_capacity(8));
        let key_state = Arc::new(Mutex::new(KeyState::new()));
        let timing = Arc::new(Mutex::new(Timing::new()));
        let mut key = StraightKey::new(queue.clone(), key_state, timing);

        key.notify_straight_key_event(true).unwrap();
        key.notify_straight_key_event(true).unwrap();
        assert_eq!(queue.length(), 2);
    }
}
