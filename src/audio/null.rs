//! Always-available no-op backend; accepts and discards every write.

use super::AudioSink;
use crate::error::Result;

#[derive(Default)]
pub struct NullSink;

impl AudioSink for NullSink {
    fn sample_rate(&self) -> u32 {
        48_000
    }

    fn period_frames(&self) -> usize {
        512
    }

    fn write(&mut self, _samples: &[i16]) -> Result<()> {
        Ok(())
    }
}
