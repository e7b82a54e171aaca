//! OSS backend (`/dev/dsp`), gated behind the `oss-backend` feature. Plain
//! ioctl + blocking write over a raw fd, in the style of the console
//! backend's raw-fd approach, following OSS's well-documented ioctl
//! numbers for format/channels/speed negotiation.

use super::{AudioSink, CANDIDATE_SAMPLE_RATES};
use crate::error::{CwError, Result};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::unix::io::AsRawFd;

const SNDCTL_DSP_SETFMT: libc::c_ulong = 0xC004_5005;
const SNDCTL_DSP_CHANNELS: libc::c_ulong = 0xC004_6006;
const SNDCTL_DSP_SPEED: libc::c_ulong = 0xC004_6002;
const SNDCTL_DSP_GETBLKSIZE: libc::c_ulong = 0x8004_6004;
const AFMT_S16_LE: libc::c_int = 0x0000_0010;

pub struct OssSink {
    device: File,
    sample_rate: u32,
    period_frames: usize,
}

impl OssSink {
    pub fn open(device: Option<&str>) -> Result<Self> {
        let path = device.unwrap_or("/dev/dsp");
        let device = OpenOptions::new()
            .write(true)
            .open(path)
            .map_err(|e| CwError::NoBackend(format!("oss open {path}: {e}")))?;
        let fd = device.as_raw_fd();

        let mut fmt = AFMT_S16_LE;
        ioctl_checked(fd, SNDCTL_DSP_SETFMT, &mut fmt, "SETFMT")?;

        let mut channels = 1;
        ioctl_checked(fd, SNDCTL_DSP_CHANNELS, &mut channels, "CHANNELS")?;

        let mut accepted_rate = None;
        for &rate in CANDIDATE_SAMPLE_RATES {
            let mut speed = rate as libc::c_int;
            if ioctl_checked(fd, SNDCTL_DSP_SPEED, &mut speed, "SPEED").is_ok() {
                accepted_rate = Some(speed as u32);
                break;
            }
        }
        let sample_rate = accepted_rate
            .ok_or_else(|| CwError::NoBackend("oss: no candidate sample rate accepted".into()))?;

        let mut blksize: libc::c_int = 0;
        let period_frames = if ioctl_checked(fd, SNDCTL_DSP_GETBLKSIZE, &mut blksize, "GETBLKSIZE").is_ok()
        {
            (blksize as usize / std::mem::size_of::<i16>()).max(1)
        } else {
            512
        };

        Ok(OssSink { device, sample_rate, period_frames })
    }
}

fn ioctl_checked(
    fd: libc::c_int,
    request: libc::c_ulong,
    value: &mut libc::c_int,
    name: &'static str,
) -> Result<()> {
    let rc = unsafe { libc::ioctl(fd, request, value as *mut libc::c_int) };
    if rc != 0 {
        return Err(CwError::IoError(format!(
            "oss ioctl {name} failed: {}",
            std::io::Error::last_os_error()
        )));
    }
    Ok(())
}

impl AudioSink for OssSink {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn period_frames(&self) -> usize {
        self.period_frames
    }

    fn write(&mut self, samples: &[i16]) -> Result<()> {
        let bytes: &[u8] = bytemuck_cast(samples);
        match self.device.write(bytes) {
            Ok(n) if n == bytes.len() => Ok(()),
            Ok(n) => {
                log::debug!("oss short write: {n}/{} bytes", bytes.len());
                Ok(())
            }
            Err(e) => Err(CwError::IoError(format!("oss write: {e}"))),
        }
    }
}

/// Reinterprets an `i16` PCM buffer as raw little-endian bytes for the
/// write() syscall, without pulling in a dependency for one cast.
fn bytemuck_cast(samples: &[i16]) -> &[u8] {
    // Safety: `i16` has no padding and any bit pattern is valid; the
    // resulting slice's lifetime and length are derived directly from the
    // input slice.
    unsafe {
        std::slice::from_raw_parts(samples.as_ptr() as *const u8, std::mem::size_of_val(samples))
    }
}
