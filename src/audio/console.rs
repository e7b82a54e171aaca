//! Console backend: does not synthesise samples. Drives the kernel's
//! built-in beeper by writing a frequency-divider value through
//! `KIOCSOUND`, and treats volume as on/off only. Grounded in the
//! teacher's factory/backend split (`audio/mod.rs`); the ioctl plumbing
//! itself has no teacher analogue and follows the raw-fd/libc style used
//! for hardware access in `keyer/vband.rs`.

use super::AudioSink;
use crate::error::{CwError, Result};
use std::fs::{File, OpenOptions};
use std::os::unix::io::AsRawFd;

#[cfg(target_os = "linux")]
const KIOCSOUND: libc::c_ulong = 0x4B2F;
/// The kernel beeper's reference clock; `count = CLOCK_TICK_RATE / freq`.
#[cfg(target_os = "linux")]
const CLOCK_TICK_RATE: u32 = 1_193_180;

pub struct ConsoleSink {
    #[cfg(target_os = "linux")]
    device: File,
    frequency_hz: u32,
    sounding: bool,
}

impl ConsoleSink {
    pub fn open(device: Option<&str>) -> Result<Self> {
        #[cfg(target_os = "linux")]
        {
            let path = device.unwrap_or("/dev/console");
            let device = OpenOptions::new().write(true).open(path).map_err(|e| {
                CwError::IoError(format!("console open {path}: {e}"))
            })?;
            Ok(ConsoleSink { device, frequency_hz: 0, sounding: false })
        }
        #[cfg(not(target_os = "linux"))]
        {
            let _ = device;
            Err(CwError::NoBackend("console backend requires Linux".into()))
        }
    }

    #[cfg(target_os = "linux")]
    fn ioctl_sound(&self, count: libc::c_int) -> Result<()> {
        let rc = unsafe { libc::ioctl(self.device.as_raw_fd(), KIOCSOUND, count) };
        if rc != 0 {
            return Err(CwError::IoError(format!(
                "KIOCSOUND ioctl failed: {}",
                std::io::Error::last_os_error()
            )));
        }
        Ok(())
    }
}

impl AudioSink for ConsoleSink {
    fn sample_rate(&self) -> u32 {
        0
    }

    fn period_frames(&self) -> usize {
        0
    }

    fn set_frequency(&mut self, hz: u32) {
        self.frequency_hz = hz;
    }

    fn write(&mut self, samples: &[i16]) -> Result<()> {
        let wants_tone = self.frequency_hz > 0 && samples.iter().any(|&s| s != 0);
        if wants_tone == self.sounding {
            return Ok(());
        }
        self.sounding = wants_tone;
        #[cfg(target_os = "linux")]
        {
            let count = if wants_tone {
                (CLOCK_TICK_RATE / self.frequency_hz.max(1)) as libc::c_int
            } else {
                0
            };
            self.ioctl_sound(count)?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.sounding = false;
        #[cfg(target_os = "linux")]
        {
            self.ioctl_sound(0)?;
        }
        Ok(())
    }
}
