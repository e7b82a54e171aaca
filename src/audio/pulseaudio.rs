//! PulseAudio backend, gated behind the `pulseaudio-backend` feature. Uses
//! the blocking `Simple` API (`Simple::new`/`write`/`drain`).

use super::AudioSink;
use crate::error::{CwError, Result};
use libpulse_binding::sample;
use libpulse_binding::stream::Direction;
use libpulse_simple_binding::Simple;

/// PulseAudio's simple API has no fragment-size negotiation; assume a
/// fixed default period instead.
const DEFAULT_PERIOD_FRAMES: usize = 512;

pub struct PulseAudioSink {
    simple: Simple,
    sample_rate: u32,
}

impl PulseAudioSink {
    pub fn open(device: Option<&str>) -> Result<Self> {
        let spec = sample::Spec {
            format: sample::Format::S16NE,
            channels: 1,
            rate: 48_000,
        };
        if !spec.is_valid() {
            return Err(CwError::BadArgument { field: "pulseaudio_spec", value: "invalid".into() });
        }
        let simple = Simple::new(
            None,
            "libcw",
            Direction::Playback,
            device,
            "cw tone",
            &spec,
            None,
            None,
        )
        .map_err(|e| CwError::NoBackend(format!("pulseaudio open: {e}")))?;

        Ok(PulseAudioSink { simple, sample_rate: spec.rate })
    }
}

impl AudioSink for PulseAudioSink {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn period_frames(&self) -> usize {
        DEFAULT_PERIOD_FRAMES
    }

    fn write(&mut self, samples: &[i16]) -> Result<()> {
        let bytes: &[u8] = unsafe {
            std::slice::from_raw_parts(samples.as_ptr() as *const u8, std::mem::size_of_val(samples))
        };
        self.simple
            .write(bytes)
            .map_err(|e| CwError::IoError(format!("pulseaudio write: {e}")))
    }

    fn close(&mut self) -> Result<()> {
        self.simple
            .drain()
            .map_err(|e| CwError::IoError(format!("pulseaudio drain: {e}")))
    }
}
