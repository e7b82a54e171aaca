//! ALSA PCM backend, gated behind the `alsa-backend` feature. Uses the
//! `alsa` crate's high-level PCM API; the dependency itself is grounded in
//! `Boddlnagg-midir`'s Cargo.toml (the `alsa` crate is a real dependency in
//! that repo, albeit for its MIDI sequencer rather than PCM).

use super::{AudioSink, CANDIDATE_SAMPLE_RATES};
use crate::error::{CwError, Result};
use alsa::pcm::{Access, Format, HwParams, State, PCM};
use alsa::{Direction, ValueOr};

pub struct AlsaSink {
    pcm: PCM,
    sample_rate: u32,
    period_frames: usize,
}

impl AlsaSink {
    pub fn open(device: Option<&str>) -> Result<Self> {
        let name = device.unwrap_or("default");
        let pcm = PCM::new(name, Direction::Playback, false)
            .map_err(|e| CwError::NoBackend(format!("alsa open {name}: {e}")))?;

        let mut accepted_rate = None;
        let mut period_frames = 0usize;
        {
            let hwp = HwParams::any(&pcm)
                .map_err(|e| CwError::IoError(format!("alsa hw_params::any: {e}")))?;
            hwp.set_access(Access::RWInterleaved)
                .map_err(|e| CwError::IoError(format!("alsa set_access: {e}")))?;
            hwp.set_format(Format::s16())
                .map_err(|e| CwError::IoError(format!("alsa set_format: {e}")))?;
            hwp.set_channels(1)
                .map_err(|e| CwError::IoError(format!("alsa set_channels: {e}")))?;

            for &rate in CANDIDATE_SAMPLE_RATES {
                if hwp.set_rate(rate, ValueOr::Nearest).is_ok() {
                    accepted_rate = Some(rate);
                    break;
                }
            }
            let rate = accepted_rate
                .ok_or_else(|| CwError::NoBackend("alsa: no candidate sample rate accepted".into()))?;

            pcm.hw_params(&hwp)
                .map_err(|e| CwError::IoError(format!("alsa hw_params commit: {e}")))?;
            period_frames = hwp.get_period_size().unwrap_or(512) as usize;
            accepted_rate = Some(rate);
        }

        pcm.prepare().map_err(|e| CwError::IoError(format!("alsa prepare: {e}")))?;

        Ok(AlsaSink {
            pcm,
            sample_rate: accepted_rate.unwrap(),
            period_frames,
        })
    }
}

impl AudioSink for AlsaSink {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn period_frames(&self) -> usize {
        self.period_frames
    }

    fn write(&mut self, samples: &[i16]) -> Result<()> {
        let io = self
            .pcm
            .io_i16()
            .map_err(|e| CwError::IoError(format!("alsa io_i16: {e}")))?;
        match io.writei(samples) {
            Ok(written) if written == samples.len() => Ok(()),
            Ok(written) => {
                log::debug!("alsa short write: {written}/{} frames", samples.len());
                Ok(())
            }
            Err(e) => {
                log::debug!("alsa underrun, recovering: {e}");
                self.pcm
                    .recover(e.errno() as i32, true)
                    .map_err(|e2| CwError::IoError(format!("alsa recover failed: {e2}")))?;
                let io = self
                    .pcm
                    .io_i16()
                    .map_err(|e| CwError::IoError(format!("alsa io_i16 retry: {e}")))?;
                io.writei(samples)
                    .map(|_| ())
                    .map_err(|e| CwError::IoError(format!("alsa write retry failed: {e}")))
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        if self.pcm.state() == State::Running {
            let _ = self.pcm.drain();
        }
        Ok(())
    }
}
