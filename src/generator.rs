//! Sine Generator: the background worker that dequeues tones, shapes
//! slopes, synthesises PCM samples (or drives console on/off pulses), and
//! writes to the audio sink. An explicit worker thread pulling from the
//! tone queue, keeping a phase accumulator across write windows so tone
//! boundaries stay phase-continuous.

use crate::audio::AudioSink;
use crate::error::{CwError, Result};
use crate::keystate::KeyState;
use crate::queue::{DequeueOutcome, Tone, ToneQueue, FALLING_SLOPE, FOREVER, RISING_SLOPE};
use std::f64::consts::PI;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Length, in samples, of a ramp (rising/falling slope) or of one FOREVER
/// replay buffer.
const SLOPE_LEN: i64 = 200;
/// How long the worker sleeps between console on/off polls while holding a
/// FOREVER tone (console doesn't consume samples at a fixed rate).
const CONSOLE_FOREVER_POLL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlopeMode {
    None,
    Rising,
    Falling,
    Standard,
}

fn classify(tone: Tone, sample_rate: u32) -> (SlopeMode, i64) {
    match tone.duration_usec {
        FOREVER => (SlopeMode::None, SLOPE_LEN),
        RISING_SLOPE => (SlopeMode::Rising, SLOPE_LEN),
        FALLING_SLOPE => (SlopeMode::Falling, SLOPE_LEN),
        usec => {
            let count = (sample_rate as i64 * usec) / 1_000_000;
            (SlopeMode::Standard, count.max(0))
        }
    }
}

fn amplitude_fraction(mode: SlopeMode, index: i64, sample_count: i64, slope_len: i64) -> f64 {
    let slope_len = slope_len.min(sample_count / 2).max(1);
    match mode {
        SlopeMode::None => 1.0,
        SlopeMode::Rising => {
            if index < slope_len {
                index as f64 / slope_len as f64
            } else {
                1.0
            }
        }
        SlopeMode::Falling => {
            if index < slope_len {
                (slope_len - index) as f64 / slope_len as f64
            } else {
                0.0
            }
        }
        SlopeMode::Standard => {
            if index < slope_len {
                index as f64 / slope_len as f64
            } else if index >= sample_count - slope_len {
                (sample_count - index) as f64 / slope_len as f64
            } else {
                1.0
            }
        }
    }
}

struct Shared {
    error: Option<CwError>,
}

/// Owns the audio sink, the worker thread, and the phase/slope state that
/// thread alone touches. `queue` and `key_state` are shared with producers
/// (sender, keyer, straight key).
pub struct SineGenerator {
    queue: Arc<ToneQueue>,
    key_state: Arc<Mutex<KeyState>>,
    volume: Arc<std::sync::atomic::AtomicU32>,
    stop_flag: Arc<AtomicBool>,
    worker: Option<std::thread::JoinHandle<()>>,
    shared: Arc<Mutex<Shared>>,
}

impl SineGenerator {
    /// Spawns the worker thread, taking ownership of `sink`. `queue` and
    /// `key_state` are shared with the rest of the engine.
    pub fn start(
        sink: Box<dyn AudioSink>,
        queue: Arc<ToneQueue>,
        key_state: Arc<Mutex<KeyState>>,
        initial_volume: u32,
    ) -> Self {
        let stop_flag = Arc::new(AtomicBool::new(false));
        let shared = Arc::new(Mutex::new(Shared { error: None }));
        let volume = Arc::new(std::sync::atomic::AtomicU32::new(initial_volume));

        queue.set_generator_running(true);

        let worker = {
            let queue = queue.clone();
            let key_state = key_state.clone();
            let stop_flag = stop_flag.clone();
            let shared = shared.clone();
            let volume = volume.clone();
            std::thread::spawn(move || run_worker(sink, queue, key_state, stop_flag, shared, volume))
        };

        SineGenerator {
            queue,
            key_state,
            volume,
            stop_flag,
            worker: Some(worker),
            shared,
        }
    }

    pub fn set_volume(&self, percent: u32) {
        self.volume.store(percent, Ordering::SeqCst);
    }

    /// Last worker-thread error, if the worker terminated due to a
    /// persistent write failure.
    pub fn last_error(&self) -> Option<CwError> {
        self.shared.lock().unwrap().error.clone()
    }

    pub fn is_running(&self) -> bool {
        self.worker.as_ref().map(|h| !h.is_finished()).unwrap_or(false)
    }

    /// Signals the worker to drain and exit, and joins it.
    pub fn stop(&mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
        self.queue.set_generator_running(false);
    }
}

impl Drop for SineGenerator {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_worker(
    mut sink: Box<dyn AudioSink>,
    queue: Arc<ToneQueue>,
    key_state: Arc<Mutex<KeyState>>,
    stop_flag: Arc<AtomicBool>,
    shared: Arc<Mutex<Shared>>,
    volume: Arc<std::sync::atomic::AtomicU32>,
) {
    let sample_rate = sink.sample_rate();
    let period = sink.period_frames().max(1);
    let pcm_mode = sample_rate > 0;
    let mut phase = 0.0f64;
    let mut persistent_failures = 0u32;

    loop {
        if stop_flag.load(Ordering::SeqCst) {
            break;
        }

        let outcome = {
            let mut ks = key_state.lock().unwrap();
            queue.dequeue(&mut ks)
        };

        let write_result = match outcome {
            DequeueOutcome::StillEmpty => {
                let _ = queue.wait_for_tone();
                continue;
            }
            DequeueOutcome::JustEmptied => {
                if pcm_mode {
                    sink.write(&vec![0i16; period])
                } else {
                    sink.set_frequency(0);
                    sink.write(&[0])
                }
            }
            DequeueOutcome::NonEmpty(tone) => {
                let vol = volume.load(Ordering::SeqCst).min(100);
                if pcm_mode {
                    play_pcm(&mut *sink, tone, sample_rate, period, vol, &mut phase)
                } else {
                    play_console(&mut *sink, tone, vol)
                }
            }
        };

        match write_result {
            Ok(()) => persistent_failures = 0,
            Err(e) => {
                persistent_failures += 1;
                log::debug!("generator write failed ({persistent_failures}): {e}");
                if persistent_failures > 1 {
                    shared.lock().unwrap().error = Some(e);
                    break;
                }
            }
        }
    }

    let _ = sink.close();
}

fn play_pcm(
    sink: &mut dyn AudioSink,
    tone: Tone,
    sample_rate: u32,
    period: usize,
    volume_percent: u32,
    phase: &mut f64,
) -> Result<()> {
    let (mode, sample_count) = classify(tone, sample_rate);
    if sample_count == 0 {
        return Ok(());
    }
    let peak = i16::MAX as f64 * (volume_percent as f64 / 100.0);
    let phase_step = if tone.frequency_hz > 0 {
        2.0 * PI * tone.frequency_hz as f64 / sample_rate as f64
    } else {
        0.0
    };

    let mut remaining = sample_count;
    let mut produced = 0i64;
    while remaining > 0 {
        let window_len = remaining.min(period as i64) as usize;
        let mut buffer = vec![0i16; window_len];
        for sample in buffer.iter_mut() {
            let envelope = amplitude_fraction(mode, produced, sample_count, SLOPE_LEN);
            let value = if tone.frequency_hz > 0 { phase.sin() * peak * envelope } else { 0.0 };
            *sample = value.round() as i16;
            *phase += phase_step;
            produced += 1;
        }
        *phase %= 2.0 * PI;
        sink.write(&buffer)?;
        remaining -= window_len as i64;
    }
    Ok(())
}

fn play_console(sink: &mut dyn AudioSink, tone: Tone, volume_percent: u32) -> Result<()> {
    let on = tone.frequency_hz > 0 && volume_percent > 0;
    sink.set_frequency(if on { tone.frequency_hz } else { 0 });
    sink.write(if on { &[1] } else { &[0] })?;
    match tone.duration_usec {
        FOREVER => std::thread::sleep(CONSOLE_FOREVER_POLL),
        RISING_SLOPE | FALLING_SLOPE => {}
        usec if usec > 0 => std::thread::sleep(Duration::from_micros(usec as u64)),
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_forever_is_slope_none_short() {
        let tone = Tone { duration_usec: FOREVER, frequency_hz: 800 };
        let (mode, count) = classify(tone, 48_000);
        assert_eq!(mode, SlopeMode::None);
        assert_eq!(count, SLOPE_LEN);
    }

    #[test]
    fn classify_standard_scales_with_rate_and_duration() {
        let tone = Tone { duration_usec: 1_000_000, frequency_hz: 800 };
        let (mode, count) = classify(tone, 48_000);
        assert_eq!(mode, SlopeMode::Standard);
        assert_eq!(count, 48_000);
    }

    #[test]
    fn amplitude_ramps_up_then_steady_then_down() {
        use approx::assert_relative_eq;
        let count = 1000;
        assert_relative_eq!(amplitude_fraction(SlopeMode::Standard, 0, count, SLOPE_LEN), 0.0);
        assert_relative_eq!(amplitude_fraction(SlopeMode::Standard, count / 2, count, SLOPE_LEN), 1.0);
        assert_relative_eq!(
            amplitude_fraction(SlopeMode::Standard, count - 1, count, SLOPE_LEN),
            1.0 / SLOPE_LEN as f64,
            epsilon = 1e-9
        );
    }

    #[test]
    fn rising_and_falling_slope_envelopes_are_complementary() {
        use approx::assert_relative_eq;
        let rising = amplitude_fraction(SlopeMode::Rising, 50, SLOPE_LEN, SLOPE_LEN);
        let falling = amplitude_fraction(SlopeMode::Falling, 50, SLOPE_LEN, SLOPE_LEN);
        assert_relative_eq!(rising + falling, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn generator_drains_a_tone_through_null_sink() {
        let queue = Arc::new(ToneQueue::with_capacity(16));
        let key_state = Arc::new(Mutex::new(KeyState::new()));
        let sink: Box<dyn AudioSink> = Box::new(crate::audio::NullSink::default());
        let mut gen = SineGenerator::start(sink, queue.clone(), key_state, 70);

        queue.enqueue(2000, 800).unwrap();
        queue.wait_for_tone_queue().unwrap();
        gen.stop();
        assert!(gen.last_error().is_none());
    }
}
