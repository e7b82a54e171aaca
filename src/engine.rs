//! Engine: the single value that owns every subsystem, replacing the
//! historical per-process global state with something the caller holds
//! and passes explicitly. Grounded in the teacher's `main.rs`, which wires
//! together `Timing`, `audio::create_audio`, `Decoder`, and `AppState`
//! behind `Arc<Mutex<_>>` in one place — generalized here into a single
//! owned struct rather than loose locals, per the refactor called for
//! around replacing per-process singletons.

use crate::audio::{self, AudioSink, AudioSystem};
use crate::error::{CwError, Result};
use crate::generator::SineGenerator;
use crate::iambic::IambicKeyer;
use crate::keystate::KeyState;
use crate::queue::ToneQueue;
use crate::receiver::Receiver;
use crate::sender::Sender;
use crate::straight::StraightKey;
use crate::timing::Timing;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Set by the signal handler installed through [`Engine::register_reset_signal`];
/// polled by [`Engine::poll_reset_signal`]. A single process-wide flag is
/// the realistic limitation of a C-style signal handler with no context
/// pointer; an engine that wants per-instance signal handling should poll
/// this itself and call `reset()`.
static RESET_REQUESTED: AtomicBool = AtomicBool::new(false);
static EXIT_REQUESTED: AtomicBool = AtomicBool::new(false);

pub struct Engine {
    pub timing: Arc<Mutex<Timing>>,
    pub queue: Arc<ToneQueue>,
    pub key_state: Arc<Mutex<KeyState>>,
    pub sender: Sender,
    pub iambic: IambicKeyer,
    pub straight_key: StraightKey,
    pub receiver: Receiver,
    generator: Option<SineGenerator>,
}

impl Engine {
    /// Builds an engine with no generator running yet; call
    /// [`Engine::start_generator`] to open an audio backend and begin
    /// producing sound.
    pub fn new() -> Self {
        let timing = Arc::new(Mutex::new(Timing::new()));
        let queue = Arc::new(ToneQueue::new());
        queue.set_low_water_mark(queue.capacity() / 10);
        let key_state = Arc::new(Mutex::new(KeyState::new()));

        Engine {
            sender: Sender::new(queue.clone(), timing.clone()),
            iambic: IambicKeyer::new(queue.clone(), timing.clone()),
            straight_key: StraightKey::new(queue.clone(), key_state.clone(), timing.clone()),
            receiver: Receiver::new(timing.clone()),
            timing,
            queue,
            key_state,
            generator: None,
        }
    }

    pub fn start_generator(&mut self, system: AudioSystem, device: Option<&str>) -> Result<()> {
        let sink: Box<dyn AudioSink> = audio::open_sink(system, device)?;
        let volume = self.timing.lock().unwrap().volume();
        self.generator =
            Some(SineGenerator::start(sink, self.queue.clone(), self.key_state.clone(), volume));
        Ok(())
    }

    pub fn stop_generator(&mut self) {
        if let Some(mut gen) = self.generator.take() {
            gen.stop();
        }
    }

    pub fn generator_error(&self) -> Option<CwError> {
        self.generator.as_ref().and_then(|g| g.last_error())
    }

    pub fn set_volume(&mut self, percent: u32) -> Result<()> {
        self.timing.lock().unwrap().set_volume(percent)?;
        if let Some(gen) = &self.generator {
            gen.set_volume(percent);
        }
        Ok(())
    }

    /// Complete reset per the lifecycle contract: clears the queue,
    /// receive state and statistics, iambic latches, straight-key state,
    /// silences the generator (by flushing the queue), and returns
    /// parameters to their initial values.
    pub fn reset(&mut self) {
        self.queue.reset();
        self.receiver.reset();
        self.iambic.reset();
        self.straight_key.reset();
        *self.timing.lock().unwrap() = Timing::new();
        self.key_state.lock().unwrap().set_closed(false);
    }

    /// Installs a process-wide `SIGUSR1`-style reset handler. `exit_too`
    /// additionally requests process exit after the next
    /// [`Engine::poll_reset_signal`] call observes it.
    #[cfg(unix)]
    pub fn register_reset_signal(&self, signum: i32, exit_too: bool) {
        extern "C" fn handler(_sig: libc::c_int) {
            RESET_REQUESTED.store(true, Ordering::SeqCst);
        }
        unsafe {
            libc::signal(signum, handler as libc::sighandler_t);
        }
        EXIT_REQUESTED.store(exit_too, Ordering::SeqCst);
    }

    /// Call periodically from the driving loop; resets the engine (and
    /// reports whether exit was also requested) if the signal fired since
    /// the last poll.
    pub fn poll_reset_signal(&mut self) -> bool {
        if RESET_REQUESTED.swap(false, Ordering::SeqCst) {
            self.reset();
            return EXIT_REQUESTED.load(Ordering::SeqCst);
        }
        false
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_restores_initial_parameters() {
        let mut engine = Engine::new();
        engine.timing.lock().unwrap().set_send_speed(40).unwrap();
        engine.queue.enqueue(1, 1).unwrap();
        engine.reset();
        assert_eq!(engine.timing.lock().unwrap().send_speed(), 12);
        assert_eq!(engine.queue.length(), 0);
    }

    #[test]
    fn sender_and_queue_share_state() {
        let engine = Engine::new();
        engine.sender.send_character('E').unwrap();
        assert!(engine.queue.length() > 0);
    }
}
