//! Timing parameters: user-facing controls (speed, gap, tolerance,
//! weighting, volume, frequency) and the derived element durations
//! computed from them, recomputed through a dirty-flag/sync discipline.

use crate::error::{CwError, Result};

pub const SPEED_MIN: u32 = 4;
pub const SPEED_MAX: u32 = 60;
pub const FREQUENCY_MIN: u32 = 0;
pub const FREQUENCY_MAX: u32 = 4000;
pub const VOLUME_MIN: u32 = 0;
pub const VOLUME_MAX: u32 = 100;
pub const GAP_MIN: u32 = 0;
pub const GAP_MAX: u32 = 60;
pub const TOLERANCE_MIN: u32 = 0;
pub const TOLERANCE_MAX: u32 = 90;
pub const WEIGHTING_MIN: u32 = 20;
pub const WEIGHTING_MAX: u32 = 80;

pub const INITIAL_SEND_SPEED: u32 = 12;
pub const INITIAL_FREQUENCY: u32 = 800;
pub const INITIAL_VOLUME: u32 = 70;
pub const INITIAL_GAP: u32 = 0;
pub const INITIAL_TOLERANCE: u32 = 50;
pub const INITIAL_WEIGHTING: u32 = 50;
pub const INITIAL_NOISE_THRESHOLD_USEC: u32 = 10_000;

/// Derived, microsecond-denominated durations recomputed by [`Timing::sync`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Derived {
    pub unit: i64,
    pub dot: i64,
    pub dash: i64,
    pub end_of_element: i64,
    pub end_of_character: i64,
    pub end_of_word: i64,
    pub additional: i64,
    pub adjustment: i64,

    pub dot_range_min: i64,
    pub dot_range_max: i64,
    pub dash_range_min: i64,
    pub dash_range_max: i64,
    pub end_of_char_min: i64,
    pub end_of_char_max: i64,
}

#[derive(Debug, Clone)]
pub struct Timing {
    send_speed: u32,
    receive_speed: u32,
    frequency: u32,
    volume: u32,
    gap: u32,
    tolerance: u32,
    weighting: u32,
    noise_threshold_usec: u32,
    adaptive_receive: bool,

    dirty: bool,
    derived: Derived,
}

impl Default for Timing {
    fn default() -> Self {
        let mut t = Timing {
            send_speed: INITIAL_SEND_SPEED,
            receive_speed: INITIAL_SEND_SPEED,
            frequency: INITIAL_FREQUENCY,
            volume: INITIAL_VOLUME,
            gap: INITIAL_GAP,
            tolerance: INITIAL_TOLERANCE,
            weighting: INITIAL_WEIGHTING,
            noise_threshold_usec: INITIAL_NOISE_THRESHOLD_USEC,
            adaptive_receive: false,
            dirty: true,
            derived: Derived::default(),
        };
        t.sync();
        t
    }
}

fn check_range(field: &'static str, value: u32, min: u32, max: u32) -> Result<()> {
    if value < min || value > max {
        return Err(CwError::BadArgument { field, value: value.to_string() });
    }
    Ok(())
}

impl Timing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_send_speed(&mut self, wpm: u32) -> Result<()> {
        check_range("send_speed", wpm, SPEED_MIN, SPEED_MAX)?;
        self.send_speed = wpm;
        self.dirty = true;
        Ok(())
    }

    pub fn set_receive_speed(&mut self, wpm: u32) -> Result<()> {
        if self.adaptive_receive {
            return Err(CwError::NotPermitted(
                "cannot set receive speed while adaptive tracking is enabled",
            ));
        }
        check_range("receive_speed", wpm, SPEED_MIN, SPEED_MAX)?;
        self.receive_speed = wpm;
        self.dirty = true;
        Ok(())
    }

    /// Internal setter used by the receiver's adaptive-tracking recompute;
    /// bypasses the `NotPermitted` guard because adaptive mode is the
    /// caller.
    pub(crate) fn set_receive_speed_adaptive(&mut self, wpm: u32) {
        let clamped = wpm.clamp(SPEED_MIN, SPEED_MAX);
        self.receive_speed = clamped;
        self.dirty = true;
    }

    pub fn set_frequency(&mut self, hz: u32) -> Result<()> {
        check_range("frequency", hz, FREQUENCY_MIN, FREQUENCY_MAX)?;
        self.frequency = hz;
        self.dirty = true;
        Ok(())
    }

    pub fn set_volume(&mut self, percent: u32) -> Result<()> {
        check_range("volume", percent, VOLUME_MIN, VOLUME_MAX)?;
        self.volume = percent;
        self.dirty = true;
        Ok(())
    }

    pub fn set_gap(&mut self, dots: u32) -> Result<()> {
        check_range("gap", dots, GAP_MIN, GAP_MAX)?;
        self.gap = dots;
        self.dirty = true;
        Ok(())
    }

    pub fn set_tolerance(&mut self, percent: u32) -> Result<()> {
        check_range("tolerance", percent, TOLERANCE_MIN, TOLERANCE_MAX)?;
        self.tolerance = percent;
        self.dirty = true;
        Ok(())
    }

    pub fn set_weighting(&mut self, percent: u32) -> Result<()> {
        check_range("weighting", percent, WEIGHTING_MIN, WEIGHTING_MAX)?;
        self.weighting = percent;
        self.dirty = true;
        Ok(())
    }

    pub fn set_noise_threshold_usec(&mut self, threshold: u32) -> Result<()> {
        self.noise_threshold_usec = threshold;
        self.dirty = true;
        Ok(())
    }

    pub fn set_adaptive_receive(&mut self, enabled: bool) {
        self.adaptive_receive = enabled;
        self.dirty = true;
    }

    pub fn adaptive_receive(&self) -> bool {
        self.adaptive_receive
    }

    pub fn send_speed(&self) -> u32 {
        self.send_speed
    }

    pub fn receive_speed(&self) -> u32 {
        self.receive_speed
    }

    pub fn frequency(&self) -> u32 {
        self.frequency
    }

    pub fn volume(&self) -> u32 {
        self.volume
    }

    pub fn noise_threshold_usec(&self) -> u32 {
        self.noise_threshold_usec
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Recomputes every derived duration from the primary values. Lazy:
    /// callers invoke this before consuming `derived()`; it is a cheap
    /// no-op when nothing changed.
    pub fn sync(&mut self) {
        if !self.dirty {
            return;
        }
        let unit = 1_200_000i64 / self.send_speed as i64;
        let weighting_adj = 2 * (self.weighting as i64 - 50) * unit / 100;
        let dot = unit + weighting_adj;
        let dash = 3 * dot;
        let end_of_element = unit - 28 * weighting_adj / 22;
        let end_of_character = 3 * unit - end_of_element;
        let end_of_word = 7 * unit - end_of_character;
        let additional = self.gap as i64 * unit;
        let adjustment = 7 * additional / 3;

        // Adaptive mode overrides these via `apply_adaptive_ranges` once the
        // receiver has classified its first elements; until then (and
        // always, in fixed mode) the tolerance-based ranges apply.
        let (dot_range_min, dot_range_max, dash_range_min, dash_range_max, eoc_min, eoc_max) =
            self.fixed_receive_ranges(unit, dot);

        self.derived = Derived {
            unit,
            dot,
            dash,
            end_of_element,
            end_of_character,
            end_of_word,
            additional,
            adjustment,
            dot_range_min,
            dot_range_max,
            dash_range_min,
            dash_range_max,
            end_of_char_min: eoc_min,
            end_of_char_max: eoc_max,
        };
        self.dirty = false;
    }

    fn fixed_receive_ranges(&self, unit: i64, dot: i64) -> (i64, i64, i64, i64, i64, i64) {
        let recv_unit = 1_200_000i64 / self.receive_speed as i64;
        let recv_weighting_adj = 2 * (self.weighting as i64 - 50) * recv_unit / 100;
        let recv_dot = recv_unit + recv_weighting_adj;
        let recv_dash = 3 * recv_dot;
        let tol = self.tolerance as i64;
        let dot_min = (recv_dot * (100 - tol) / 100).max(0);
        let dot_max = recv_dot * (100 + tol) / 100;
        let dash_min = recv_dash * (100 - tol) / 100;
        let dash_max = recv_dash * (100 + tol) / 100;
        let eoc_min = dot_max;
        let eoc_max = recv_unit * 6 * (100 + tol) / 100;
        let _ = (unit, dot);
        (dot_min, dot_max, dash_min, dash_max, eoc_min, eoc_max)
    }

    /// Replaces the fixed receive ranges with adaptive ones derived from
    /// the receiver's moving averages, per the dot/dash/end-of-char
    /// adaptive formulas. Called by the receiver after updating its
    /// averages; does not touch send-side derived values.
    pub(crate) fn apply_adaptive_ranges(&mut self, dot_avg: i64, dash_avg: i64) {
        self.sync();
        self.derived.dot_range_min = 0;
        self.derived.dot_range_max = 2 * dot_avg;
        self.derived.dash_range_min = 2 * dot_avg;
        self.derived.dash_range_max = i64::MAX;
        self.derived.end_of_char_min = self.derived.dot_range_max;
        self.derived.end_of_char_max = 5 * dot_avg;
        let _ = dash_avg;
    }

    pub fn derived(&mut self) -> Derived {
        self.sync();
        self.derived
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weighting_50_has_zero_adjustment() {
        let mut t = Timing::new();
        t.set_send_speed(20).unwrap();
        t.set_weighting(50).unwrap();
        let d = t.derived();
        assert_eq!(d.dot, d.unit);
        assert_eq!(d.dash, 3 * d.unit);
    }

    #[test]
    fn timing_identities() {
        let mut t = Timing::new();
        for wpm in [4, 12, 20, 35, 60] {
            t.set_send_speed(wpm).unwrap();
            let d = t.derived();
            assert!(d.dot + d.end_of_element <= d.dash);
            assert_eq!(d.end_of_word + d.end_of_character, 7 * d.unit);
        }
    }

    #[test]
    fn out_of_range_setters_fail() {
        let mut t = Timing::new();
        assert!(t.set_send_speed(3).is_err());
        assert!(t.set_send_speed(61).is_err());
        assert!(t.set_frequency(4001).is_err());
        assert!(t.set_volume(101).is_err());
        assert!(t.set_weighting(19).is_err());
    }

    #[test]
    fn receive_speed_locked_while_adaptive() {
        let mut t = Timing::new();
        t.set_adaptive_receive(true);
        assert!(matches!(t.set_receive_speed(20), Err(CwError::NotPermitted(_))));
    }

    #[test]
    fn initial_values_match_reset_defaults() {
        let t = Timing::new();
        assert_eq!(t.send_speed(), 12);
        assert_eq!(t.frequency(), 800);
        assert_eq!(t.volume(), 70);
        assert!(!t.adaptive_receive());
    }
}
