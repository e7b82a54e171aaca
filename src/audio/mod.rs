//! Audio Sink: the abstract producer side the sine generator writes PCM
//! samples (or on/off pulses) into. One backend is selected at generator
//! creation, behind a probe/open/write/close contract shared by the
//! console/OSS/ALSA/PulseAudio/null backends.

use crate::error::{CwError, Result};

mod console;
mod null;

#[cfg(feature = "alsa-backend")]
mod alsa_backend;
#[cfg(feature = "oss-backend")]
mod oss;
#[cfg(feature = "pulseaudio-backend")]
mod pulseaudio;

pub use console::ConsoleSink;
pub use null::NullSink;

#[cfg(feature = "alsa-backend")]
pub use alsa_backend::AlsaSink;
#[cfg(feature = "oss-backend")]
pub use oss::OssSink;
#[cfg(feature = "pulseaudio-backend")]
pub use pulseaudio::PulseAudioSink;

/// Candidate PCM sample rates, probed in this order; the first a backend
/// accepts is used.
pub const CANDIDATE_SAMPLE_RATES: &[u32] = &[44_100, 48_000, 32_000, 22_050, 16_000, 11_025, 8_000];

pub const SAMPLE_MIN: i16 = i16::MIN;
pub const SAMPLE_MAX: i16 = i16::MAX;

/// Which audio system to use. `SoundCard` means "prefer OSS then ALSA at
/// open time"; `None` means no audio output at all (distinct from `Null`,
/// which is the explicit always-available fallback backend).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioSystem {
    None,
    Console,
    Oss,
    Alsa,
    PulseAudio,
    SoundCard,
    Null,
}

/// The contract every backend satisfies: open a device, learn the sample
/// rate and period it settled on, write PCM (or drive console on/off
/// pulses), and close. `probe` is folded into `open` returning `NoBackend`
/// on failure, since Rust's trait-object model has no use for a separate
/// existence check ahead of opening.
pub trait AudioSink: Send {
    /// Sample rate this backend settled on opening (0 for backends, like
    /// console, that don't synthesise samples).
    fn sample_rate(&self) -> u32;

    /// Preferred PCM period, in frames.
    fn period_frames(&self) -> usize;

    /// Writes one buffer of signed 16-bit mono PCM. Console backends
    /// ignore the waveform and instead derive on/off state from whether
    /// any sample in the buffer is non-zero.
    fn write(&mut self, samples: &[i16]) -> Result<()>;

    /// Called by the generator before each tone. Only the console backend
    /// uses this (to compute its frequency-divider value); PCM backends
    /// carry frequency in the synthesised waveform instead and ignore it.
    fn set_frequency(&mut self, _hz: u32) {}

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Opens the requested backend against `device` (backend-specific meaning;
/// `None` selects the backend's default). `SoundCard` tries OSS, then ALSA.
/// Falls back to nothing — callers that want a guaranteed-available sink
/// should request `AudioSystem::Null` explicitly.
pub fn open_sink(system: AudioSystem, device: Option<&str>) -> Result<Box<dyn AudioSink>> {
    match system {
        AudioSystem::None => Err(CwError::NoBackend("audio_system = None".into())),
        AudioSystem::Null => Ok(Box::new(NullSink::default())),
        AudioSystem::Console => Ok(Box::new(console::ConsoleSink::open(device)?)),
        AudioSystem::Oss => open_oss(device),
        AudioSystem::Alsa => open_alsa(device),
        AudioSystem::PulseAudio => open_pulseaudio(device),
        AudioSystem::SoundCard => open_oss(device).or_else(|_| open_alsa(device)),
    }
}

#[cfg(feature = "oss-backend")]
fn open_oss(device: Option<&str>) -> Result<Box<dyn AudioSink>> {
    Ok(Box::new(oss::OssSink::open(device)?))
}
#[cfg(not(feature = "oss-backend"))]
fn open_oss(_device: Option<&str>) -> Result<Box<dyn AudioSink>> {
    Err(CwError::NoBackend("oss-backend feature not enabled".into()))
}

#[cfg(feature = "alsa-backend")]
fn open_alsa(device: Option<&str>) -> Result<Box<dyn AudioSink>> {
    Ok(Box::new(alsa_backend::AlsaSink::open(device)?))
}
#[cfg(not(feature = "alsa-backend"))]
fn open_alsa(_device: Option<&str>) -> Result<Box<dyn AudioSink>> {
    Err(CwError::NoBackend("alsa-backend feature not enabled".into()))
}

#[cfg(feature = "pulseaudio-backend")]
fn open_pulseaudio(device: Option<&str>) -> Result<Box<dyn AudioSink>> {
    Ok(Box::new(pulseaudio::PulseAudioSink::open(device)?))
}
#[cfg(not(feature = "pulseaudio-backend"))]
fn open_pulseaudio(_device: Option<&str>) -> Result<Box<dyn AudioSink>> {
    Err(CwError::NoBackend("pulseaudio-backend feature not enabled".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_sink_always_available() {
        let mut sink = open_sink(AudioSystem::Null, None).unwrap();
        assert!(sink.write(&[0i16; 64]).is_ok());
    }

    #[test]
    fn explicit_none_fails_with_no_backend() {
        assert!(matches!(open_sink(AudioSystem::None, None), Err(CwError::NoBackend(_))));
    }
}
