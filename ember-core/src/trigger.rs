//! Crank trigger decoding: edge classification, sync acquisition and the
//! angle/time primitives derived from the measured revolution period.

use crate::config::IgnitionConfig;
use crate::types::{
    TriggerPattern, MICROS_PER_MIN, RPM_FLOOR, RPM_MAX, SYNC_TIMEOUT_US,
};

/// Debounce floor for missing-tooth wheels, microseconds.
const MISSING_TOOTH_FILTER_US: u16 = 50;
/// Debounce floor for one-pulse-per-rev distributors, microseconds.
const DISTRIBUTOR_FILTER_US: u16 = 500;
/// Consecutive failed gap validations before sync is dropped.
const SYNC_LOSS_LIMIT: u8 = 10;
/// Accepted deviation of the pulse count at the gap.
const PULSE_COUNT_TOLERANCE: u16 = 10;

/// What one edge did to the decoder state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EdgeOutcome {
    /// Rejected by the debounce filter.
    Filtered,
    /// An ordinary tooth edge.
    Tooth,
    /// The reference gap was found but the pulse count failed validation.
    GapRejected,
    /// The reference gap was confirmed; a new revolution starts here.
    RevolutionStart,
}

/// Decoder state. Written by the trigger-edge handler, read by the main
/// loop under the owning mutex.
pub struct TriggerState {
    pattern: TriggerPattern,
    pulses_per_tooth: u8,
    /// Teeth physically present on the wheel.
    actual_teeth: u8,
    filter_time_us: u16,

    pub tooth_last_us: u32,
    pub tooth_last_minus_one_us: u32,
    pub tooth_one_us: u32,
    pub revolution_time_us: u32,
    pub tooth_count: u16,
    pub cur_gap: u32,
    pub last_gap: u32,
    pub sync_loss_counter: u8,
    pub has_sync: bool,
    /// Alternates 0/1 each revolution; selects the wasted-pair channel.
    pub revolution_counter: u8,
}

impl TriggerState {
    pub const fn new() -> Self {
        Self {
            pattern: TriggerPattern::MissingTooth,
            pulses_per_tooth: 2,
            actual_teeth: 35,
            filter_time_us: MISSING_TOOTH_FILTER_US,
            tooth_last_us: 0,
            tooth_last_minus_one_us: 0,
            tooth_one_us: 0,
            revolution_time_us: 0,
            tooth_count: 0,
            cur_gap: 0,
            last_gap: 0,
            sync_loss_counter: 0,
            has_sync: false,
            revolution_counter: 0,
        }
    }

    /// Apply the trigger section of the ignition config and reset all
    /// dynamic state. Called at boot and whenever the pattern changes.
    pub fn configure(&mut self, cfg: &IgnitionConfig) {
        self.pattern = cfg.trigger_pattern();
        match self.pattern {
            TriggerPattern::MissingTooth => {
                let teeth = cfg.trigger_teeth().max(1);
                let missing = cfg.trigger_missing().min(teeth - 1);
                self.actual_teeth = teeth - missing;
                self.pulses_per_tooth = cfg.trigger_edge().pulses_per_tooth();
                self.filter_time_us = MISSING_TOOTH_FILTER_US;
            }
            TriggerPattern::BasicDistributor => {
                self.actual_teeth = 1;
                self.pulses_per_tooth = 1;
                self.filter_time_us = DISTRIBUTOR_FILTER_US;
            }
        }
        self.reset();
    }

    /// Drop all measured state; sync must be re-acquired.
    pub fn reset(&mut self) {
        self.tooth_last_us = 0;
        self.tooth_last_minus_one_us = 0;
        self.tooth_one_us = 0;
        self.revolution_time_us = 0;
        self.tooth_count = 0;
        self.cur_gap = 0;
        self.last_gap = 0;
        self.sync_loss_counter = 0;
        self.has_sync = false;
        self.revolution_counter = 0;
    }

    pub fn pattern(&self) -> TriggerPattern {
        self.pattern
    }

    pub fn expected_pulses(&self) -> u16 {
        self.actual_teeth as u16 * self.pulses_per_tooth as u16
    }

    /// Process one trigger edge timestamped `now_us`.
    pub fn on_edge(&mut self, now_us: u32) -> EdgeOutcome {
        match self.pattern {
            TriggerPattern::MissingTooth => self.on_edge_missing_tooth(now_us),
            TriggerPattern::BasicDistributor => self.on_edge_distributor(now_us),
        }
    }

    fn on_edge_missing_tooth(&mut self, now_us: u32) -> EdgeOutcome {
        if self.tooth_last_us == 0 {
            self.tooth_last_us = now_us;
            self.tooth_count = 1;
            return EdgeOutcome::Tooth;
        }

        self.cur_gap = now_us.wrapping_sub(self.tooth_last_us);
        if self.cur_gap < self.filter_time_us as u32 {
            return EdgeOutcome::Filtered;
        }
        self.tooth_last_us = now_us;
        self.tooth_count = self.tooth_count.saturating_add(1);

        // The reference gap is at least 1.5x the previous tooth gap.
        let base_gap = if self.last_gap > 0 {
            self.last_gap
        } else {
            self.cur_gap
        };
        let is_gap = self.cur_gap > base_gap + (base_gap >> 1);

        let outcome = if is_gap {
            let expected = self.expected_pulses();
            let lo = expected.saturating_sub(PULSE_COUNT_TOLERANCE);
            let hi = expected + PULSE_COUNT_TOLERANCE;
            if self.tooth_count >= lo && self.tooth_count <= hi {
                self.sync_loss_counter = 0;
                self.tooth_one_us = now_us;
                if self.tooth_last_minus_one_us > 0 {
                    self.revolution_time_us =
                        now_us.wrapping_sub(self.tooth_last_minus_one_us);
                }
                self.tooth_last_minus_one_us = now_us;
                self.tooth_count = 1;
                self.revolution_counter ^= 1;
                // Sync is claimed once a full gap-to-gap period is measured.
                self.has_sync = self.revolution_time_us > 0;
                EdgeOutcome::RevolutionStart
            } else {
                self.tooth_count = 1;
                self.sync_loss_counter = self.sync_loss_counter.saturating_add(1);
                if self.sync_loss_counter > SYNC_LOSS_LIMIT {
                    self.has_sync = false;
                    self.revolution_time_us = 0;
                }
                EdgeOutcome::GapRejected
            }
        } else {
            EdgeOutcome::Tooth
        };

        self.last_gap = self.cur_gap;
        outcome
    }

    fn on_edge_distributor(&mut self, now_us: u32) -> EdgeOutcome {
        if self.tooth_last_us == 0 {
            self.tooth_last_us = now_us;
            self.tooth_one_us = now_us;
            self.tooth_count = 1;
            return EdgeOutcome::Tooth;
        }

        self.cur_gap = now_us.wrapping_sub(self.tooth_last_us);
        if self.cur_gap < self.filter_time_us as u32 {
            return EdgeOutcome::Filtered;
        }

        // Every accepted pulse is a revolution boundary.
        self.tooth_count = 1;
        self.tooth_one_us = now_us;
        self.revolution_time_us = self.cur_gap;
        self.tooth_last_us = now_us;
        self.tooth_last_minus_one_us = now_us;
        self.sync_loss_counter = 0;
        self.has_sync = true;
        self.revolution_counter ^= 1;
        EdgeOutcome::RevolutionStart
    }

    /// Engine speed from the measured revolution period, clamped to
    /// [0, 15000] with everything under 100 reported as stopped.
    pub fn rpm(&self) -> u16 {
        if !self.has_sync || self.revolution_time_us == 0 {
            return 0;
        }
        let rpm = MICROS_PER_MIN / self.revolution_time_us;
        let rpm = rpm.min(RPM_MAX as u32) as u16;
        if rpm < RPM_FLOOR {
            0
        } else {
            rpm
        }
    }

    /// Clear sync if no qualifying edge arrived for a second. Returns true
    /// when sync was lost by this call.
    pub fn check_sync_timeout(&mut self, now_us: u32) -> bool {
        if !self.has_sync {
            return false;
        }
        if now_us.wrapping_sub(self.tooth_last_us) > SYNC_TIMEOUT_US {
            self.has_sync = false;
            self.revolution_time_us = 0;
            true
        } else {
            false
        }
    }

    /// Time to traverse `angle` degrees at the current speed; 0 without a
    /// measured period.
    pub fn angle_to_time_us(&self, angle: u16) -> u32 {
        if self.revolution_time_us == 0 {
            return 0;
        }
        ((angle as u64 * self.revolution_time_us as u64) / 360) as u32
    }

    /// Crank degrees traversed in `time_us`; 0 without a measured period.
    pub fn time_to_angle(&self, time_us: u32) -> u16 {
        if self.revolution_time_us == 0 {
            return 0;
        }
        ((time_us as u64 * 360) / self.revolution_time_us as u64) as u16
    }

    /// Estimated crank angle (0-359) at `now_us`, relative to the reference
    /// tooth.
    pub fn crank_angle(&self, now_us: u32) -> u16 {
        if !self.has_sync || self.revolution_time_us == 0 {
            return 0;
        }
        let mut since_ref = now_us.wrapping_sub(self.tooth_one_us);
        if since_ref >= self.revolution_time_us {
            since_ref = self.revolution_time_us - 1;
        }
        ((since_ref as u64 * 360) / self.revolution_time_us as u64) as u16
    }
}

impl Default for TriggerState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests;
