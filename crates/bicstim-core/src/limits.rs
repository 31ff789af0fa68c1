//! Pulse waveform limits enforced by the validator.
//!
//! The BIC3232 stimulator programs every amplitude and duration through an
//! 8-bit register, so each range is 255 steps wide:
//!
//! - Main amplitude: 12 µA steps down to -3060 µA (255 × 12), 24 µA steps
//!   below that down to -6120 µA (255 × 24)
//! - Pulse and dead-zone duration: 10 µs steps from 10 to 2550 µs
//! - Post-pulse pause: 80 µs steps up to 20400 µs, with 10 µs standing in
//!   for the zero step, i.e. `{10, 80, 160, ..., 20400}`
//! - Counter pulse: -1/4 of the main amplitude for 4 × its duration

use serde::{Deserialize, Serialize};

/// Whether step grids are enforced in addition to ranges.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GridPolicy {
    /// Values off the step grid are rejected
    #[default]
    Strict,
    /// Only ranges are checked; the driver quantizes values to its grid
    RangeOnly,
}

/// Waveform and electrode limits of an implant.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PulseLimits {
    /// Most negative main amplitude in µA (default: -6120)
    pub main_amplitude_min_ua: i32,
    /// Amplitudes at or above this use the fine step (default: -3060)
    pub fine_step_threshold_ua: i32,
    /// Fine amplitude step in µA (default: 12)
    pub fine_step_ua: u32,
    /// Coarse amplitude step in µA (default: 24)
    pub coarse_step_ua: u32,
    /// Shortest main pulse / dead zone in µs (default: 10)
    pub pulse_duration_min_us: u64,
    /// Longest main pulse / dead zone in µs (default: 2550)
    pub pulse_duration_max_us: u64,
    /// Main pulse / dead zone step in µs (default: 10)
    pub pulse_duration_step_us: u64,
    /// Shortest post-pulse pause in µs (default: 10)
    pub pause_duration_min_us: u64,
    /// Longest post-pulse pause in µs (default: 20400)
    pub pause_duration_max_us: u64,
    /// Post-pulse pause step in µs, counted from 0 (default: 80)
    pub pause_duration_step_us: u64,
    /// Main to counter amplitude ratio, and counter to main duration ratio (default: 4)
    pub counter_ratio: u32,
    /// Number of stimulation channels; indices run from 0 (default: 32)
    pub channel_count: u32,
    /// Step grid enforcement
    pub grid: GridPolicy,
}

impl PulseLimits {
    /// Limits of the BIC3232 implant.
    pub const BIC3232: Self = Self {
        main_amplitude_min_ua: -6120,
        fine_step_threshold_ua: -3060,
        fine_step_ua: 12,
        coarse_step_ua: 24,
        pulse_duration_min_us: 10,
        pulse_duration_max_us: 2550,
        pulse_duration_step_us: 10,
        pause_duration_min_us: 10,
        pause_duration_max_us: 20_400,
        pause_duration_step_us: 80,
        counter_ratio: 4,
        channel_count: 32,
        grid: GridPolicy::Strict,
    };

    /// Same limits with a different grid policy.
    #[must_use]
    pub const fn with_grid(mut self, grid: GridPolicy) -> Self {
        self.grid = grid;
        self
    }

    /// Highest main amplitude in µA.
    #[inline]
    #[must_use]
    pub const fn main_amplitude_max_ua(&self) -> i32 {
        0
    }

    /// Check if the main amplitude lies within its range.
    #[must_use]
    pub const fn main_amplitude_in_range(&self, amplitude_ua: i32) -> bool {
        amplitude_ua >= self.main_amplitude_min_ua && amplitude_ua <= self.main_amplitude_max_ua()
    }

    /// Step size that applies at the given main amplitude.
    #[must_use]
    pub const fn amplitude_step_ua(&self, amplitude_ua: i32) -> u32 {
        if amplitude_ua >= self.fine_step_threshold_ua {
            self.fine_step_ua
        } else {
            self.coarse_step_ua
        }
    }

    /// Check if the main amplitude lies on its step grid.
    #[must_use]
    pub const fn main_amplitude_on_grid(&self, amplitude_ua: i32) -> bool {
        matches!(self.grid, GridPolicy::RangeOnly)
            || matches!(
                amplitude_ua.unsigned_abs().checked_rem(self.amplitude_step_ua(amplitude_ua)),
                Some(0)
            )
    }

    /// Check if a main pulse or dead-zone duration lies within its range.
    #[must_use]
    pub const fn pulse_duration_in_range(&self, duration_us: u64) -> bool {
        duration_us >= self.pulse_duration_min_us && duration_us <= self.pulse_duration_max_us
    }

    /// Check if a main pulse or dead-zone duration lies on its step grid.
    #[must_use]
    pub const fn pulse_duration_on_grid(&self, duration_us: u64) -> bool {
        matches!(self.grid, GridPolicy::RangeOnly)
            || matches!(duration_us.checked_rem(self.pulse_duration_step_us), Some(0))
    }

    /// Check if a post-pulse pause lies within its range.
    #[must_use]
    pub const fn pause_duration_in_range(&self, duration_us: u64) -> bool {
        duration_us >= self.pause_duration_min_us && duration_us <= self.pause_duration_max_us
    }

    /// Check if a post-pulse pause lies on its step grid.
    ///
    /// The grid starts at 0, so the minimum is accepted in place of the zero step.
    #[must_use]
    pub const fn pause_duration_on_grid(&self, duration_us: u64) -> bool {
        matches!(self.grid, GridPolicy::RangeOnly)
            || duration_us == self.pause_duration_min_us
            || matches!(duration_us.checked_rem(self.pause_duration_step_us), Some(0))
    }

    /// Check if an electrode index exists on the implant.
    #[inline]
    #[must_use]
    pub const fn electrode_in_range(&self, electrode: u32) -> bool {
        electrode < self.channel_count
    }
}

impl Default for PulseLimits {
    fn default() -> Self {
        Self::BIC3232
    }
}
