//! Sender: maps characters, representations and strings to sequences of
//! tones enqueued directly into a live [`ToneQueue`] against the current
//! [`Timing`] derivation.

use crate::error::{CwError, Result};
use crate::queue::{ToneQueue, HIGH_WATER_MARGIN};
use crate::table;
use crate::timing::Timing;
use std::sync::{Arc, Mutex};

pub struct Sender {
    queue: Arc<ToneQueue>,
    timing: Arc<Mutex<Timing>>,
}

impl Sender {
    pub fn new(queue: Arc<ToneQueue>, timing: Arc<Mutex<Timing>>) -> Self {
        Sender { queue, timing }
    }

    fn check_high_water(&self) -> Result<()> {
        let high_water_mark = self.queue.capacity().saturating_sub(HIGH_WATER_MARGIN);
        if self.queue.length() >= high_water_mark {
            return Err(CwError::WouldBlock("tone queue at or above high-water mark"));
        }
        Ok(())
    }

    pub fn send_dot(&self) -> Result<()> {
        self.check_high_water()?;
        self.enqueue_representation_unchecked(".")
    }

    pub fn send_dash(&self) -> Result<()> {
        self.check_high_water()?;
        self.enqueue_representation_unchecked("-")
    }

    pub fn send_character_space(&self) -> Result<()> {
        let d = self.timing.lock().unwrap().derived();
        self.queue.enqueue(d.end_of_character + d.additional, 0)
    }

    pub fn send_word_space(&self) -> Result<()> {
        let d = self.timing.lock().unwrap().derived();
        self.queue.enqueue(d.end_of_word + d.adjustment, 0)
    }

    pub fn send_representation(&self, representation: &str) -> Result<()> {
        self.check_high_water()?;
        self.enqueue_representation_unchecked(representation)?;
        let d = self.timing.lock().unwrap().derived();
        self.queue.enqueue(d.end_of_character + d.additional, 0)
    }

    pub fn send_representation_partial(&self, representation: &str) -> Result<()> {
        self.check_high_water()?;
        self.enqueue_representation_unchecked(representation)
    }

    fn enqueue_representation_unchecked(&self, representation: &str) -> Result<()> {
        let (frequency, dot, dash, end_of_element) = {
            let mut t = self.timing.lock().unwrap();
            let d = t.derived();
            (t.frequency(), d.dot, d.dash, d.end_of_element)
        };
        for element in representation.chars() {
            let duration = match element {
                '.' => dot,
                '-' => dash,
                _ => {
                    return Err(CwError::BadArgument {
                        field: "representation",
                        value: representation.to_string(),
                    })
                }
            };
            self.queue.enqueue(duration, frequency)?;
            self.queue.enqueue(end_of_element, 0)?;
        }
        Ok(())
    }

    pub fn send_character(&self, c: char) -> Result<()> {
        if c == ' ' {
            return self.send_word_space();
        }
        let representation = table::character_to_representation(c)
            .ok_or_else(|| CwError::NotFound(c.to_string()))?;
        self.send_representation(representation)
    }

    pub fn send_character_partial(&self, c: char) -> Result<()> {
        if c == ' ' {
            return self.send_word_space();
        }
        let representation = table::character_to_representation(c)
            .ok_or_else(|| CwError::NotFound(c.to_string()))?;
        self.send_representation_partial(representation)
    }

    pub fn send_string(&self, s: &str) -> Result<()> {
        for c in s.chars() {
            self.send_character(c)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::DequeueOutcome;

    fn sender() -> (Sender, Arc<ToneQueue>) {
        let queue = Arc::new(ToneQueue::with_capacity(3000));
        let timing = Arc::new(Mutex::new(Timing::new()));
        (Sender::new(queue.clone(), timing), queue)
    }

    #[test]
    fn send_character_a_is_dot_gap_dash_gap_chargap() {
        let (sender, queue) = sender();
        sender.send_character('A').unwrap();

        let mut ks = crate::keystate::KeyState::new();
        let mut tones = Vec::new();
        loop {
            match queue.dequeue(&mut ks) {
                DequeueOutcome::NonEmpty(t) => tones.push(t),
                _ => break,
            }
        }
        assert_eq!(tones.len(), 5); // dot, gap, dash, gap, char-space
        assert!(tones[0].frequency_hz > 0);
        assert_eq!(tones[1].frequency_hz, 0);
        assert!(tones[2].frequency_hz > 0);
        assert_eq!(tones[3].frequency_hz, 0);
        assert_eq!(tones[4].frequency_hz, 0);
    }

    #[test]
    fn unknown_character_fails_not_found() {
        let (sender, _queue) = sender();
        assert!(matches!(sender.send_character('#'), Err(CwError::NotFound(_))));
    }

    #[test]
    fn space_always_yields_word_space() {
        let (sender, queue) = sender();
        sender.send_character(' ').unwrap();
        let mut ks = crate::keystate::KeyState::new();
        assert_eq!(queue.length(), 1);
        match queue.dequeue(&mut ks) {
            DequeueOutcome::NonEmpty(t) => assert_eq!(t.frequency_hz, 0),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn high_water_mark_rejects_and_enqueues_nothing() {
        let queue = Arc::new(ToneQueue::with_capacity(200));
        let timing = Arc::new(Mutex::new(Timing::new()));
        let sender = Sender::new(queue.clone(), timing);
        // Fill past the high-water mark (capacity - 100 = 100).
        for _ in 0..105 {
            queue.enqueue(1, 1).unwrap();
        }
        let before = queue.length();
        assert!(matches!(sender.send_character('E'), Err(CwError::WouldBlock(_))));
        assert_eq!(queue.length(), before);
    }

    #[test]
    fn partial_representation_has_no_trailing_character_gap() {
        let (sender, queue) = sender();
        sender.send_representation_partial(".-").unwrap();
        let mut ks = crate::keystate::KeyState::new();
        let mut count = 0;
        while let DequeueOutcome::NonEmpty(_) = queue.dequeue(&mut ks) {
            count += 1;
        }
        assert_eq!(count, 4); // dot, gap, dash, gap -- no char-space
    }
}
