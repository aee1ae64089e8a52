//! Output event scheduling.
//!
//! Coils are driven from timer compare-match interrupts for microsecond
//! phasing accuracy. Injectors are polled from the main loop against the
//! microsecond clock: the fluid transient dominates their dynamics, so
//! ~100 us of jitter is immaterial. Both kinds are planned once per detected
//! revolution start, inside the trigger interrupt.

use crate::hal::{CompareChannel, EventTimer, OutputDriver};
use crate::types::{DWELL_MAX, DWELL_MIN};

/// Event-timer tick period in microseconds.
pub const TIMER_TICK_US: u32 = 16;

/// A coil start this close in the future is treated as stale and dropped
/// rather than raced against the counter.
pub const MIN_IGNITION_DELAY_US: u32 = 25;

/// Dwell may occupy at most half a revolution.
const MAX_DWELL_ANGLE: u16 = 180;

pub fn us_to_ticks(us: u32) -> u16 {
    (us / TIMER_TICK_US).min(u16::MAX as u32) as u16
}

pub fn ticks_to_us(ticks: u16) -> u32 {
    ticks as u32 * TIMER_TICK_US
}

/// True once `deadline` is no longer in the future of `now`, with wrap.
#[inline]
fn reached_u32(now: u32, deadline: u32) -> bool {
    (now.wrapping_sub(deadline) as i32) >= 0
}

#[inline]
fn in_future_u16(now: u16, deadline: u16) -> bool {
    (deadline.wrapping_sub(now) as i16) > 0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ScheduleStatus {
    Off,
    Pending,
    Running,
}

/// One hardware-timed coil event.
#[derive(Clone, Copy)]
pub struct CoilSchedule {
    pub status: ScheduleStatus,
    pub start_compare: u16,
    pub end_compare: u16,
    pub duration: u16,
}

impl CoilSchedule {
    pub const fn new() -> Self {
        Self {
            status: ScheduleStatus::Off,
            start_compare: 0,
            end_compare: 0,
            duration: 0,
        }
    }
}

/// One polled injector event, in absolute microseconds.
#[derive(Clone, Copy)]
pub struct InjectorEvent {
    pub scheduled: bool,
    pub open: bool,
    pub open_time_us: u32,
    pub close_time_us: u32,
}

impl InjectorEvent {
    pub const fn new() -> Self {
        Self {
            scheduled: false,
            open: false,
            open_time_us: 0,
            close_time_us: 0,
        }
    }
}

pub const CHANNELS: usize = 3;

/// All output schedules. Lives behind the ECU mutex: the trigger interrupt
/// plans events, the compare-match interrupts run the coil state machines,
/// the main loop polls the injectors.
pub struct Schedules {
    pub coils: [CoilSchedule; CHANNELS],
    pub injectors: [InjectorEvent; CHANNELS],
}

/// Compare channel serving a coil index. A carries coils 0 and 2, B coil 1.
fn channel_for(idx: usize) -> CompareChannel {
    if idx == 1 {
        CompareChannel::B
    } else {
        CompareChannel::A
    }
}

/// The other coil sharing a compare channel, if any.
fn partner_of(idx: usize) -> Option<usize> {
    match idx {
        0 => Some(2),
        2 => Some(0),
        _ => None,
    }
}

impl Schedules {
    pub const fn new() -> Self {
        Self {
            coils: [CoilSchedule::new(); CHANNELS],
            injectors: [InjectorEvent::new(); CHANNELS],
        }
    }

    /// Plan an injector opening `delay_us` from now for `pw_us`. A plan
    /// landing on a still-open injector closes it first so events never
    /// overlap.
    pub fn schedule_injection(
        &mut self,
        idx: usize,
        now_us: u32,
        delay_us: u32,
        pw_us: u16,
        outputs: &mut impl OutputDriver,
    ) {
        let inj = &mut self.injectors[idx];
        if inj.open {
            outputs.injector_close(idx as u8);
            inj.open = false;
        }
        inj.open_time_us = now_us.wrapping_add(delay_us);
        inj.close_time_us = inj.open_time_us.wrapping_add(pw_us as u32);
        inj.scheduled = true;
    }

    /// Main-loop injector servicing. A late opening still runs its full
    /// pulse from the moment it is noticed.
    pub fn poll_injectors(&mut self, now_us: u32, outputs: &mut impl OutputDriver) {
        for idx in 0..CHANNELS {
            let inj = &mut self.injectors[idx];
            if !inj.scheduled {
                continue;
            }
            if !inj.open {
                if reached_u32(now_us, inj.open_time_us) {
                    inj.open = true;
                    outputs.injector_open(idx as u8);
                }
            } else if reached_u32(now_us, inj.close_time_us) {
                inj.open = false;
                inj.scheduled = false;
                outputs.injector_close(idx as u8);
            }
        }
    }

    /// Plan a coil event from the revolution that just started.
    ///
    /// `advance` degrees BTDC place the spark at `360 - advance`; dwell is
    /// laid out backwards from there, capped to half a revolution and
    /// shortened further if it would start before the reference tooth.
    /// Returns false when the computed start is under the 25 us stale
    /// threshold and nothing was armed.
    pub fn schedule_ignition(
        &mut self,
        idx: usize,
        revolution_time_us: u32,
        advance: i8,
        dwell_us: u16,
        timer: &mut impl EventTimer,
        outputs: &mut impl OutputDriver,
    ) -> bool {
        if revolution_time_us == 0 {
            return false;
        }

        let mut dwell = (dwell_us as u32).clamp(DWELL_MIN as u32, DWELL_MAX as u32);

        let mut dwell_angle = ((dwell as u64 * 360) / revolution_time_us as u64) as u16;
        if dwell_angle > MAX_DWELL_ANGLE {
            dwell_angle = MAX_DWELL_ANGLE;
            dwell = ((MAX_DWELL_ANGLE as u64 * revolution_time_us as u64) / 360) as u32;
        }

        let spark_angle: u16 = if advance > 0 { 360 - advance as u16 } else { 360 };

        let dwell_start_angle = if spark_angle > dwell_angle {
            spark_angle - dwell_angle
        } else {
            // Dwell longer than the room before the spark: shrink to fit.
            dwell_angle = spark_angle;
            dwell = ((dwell_angle as u64 * revolution_time_us as u64) / 360) as u32;
            0
        };

        let time_to_dwell =
            ((dwell_start_angle as u64 * revolution_time_us as u64) / 360) as u32;
        if time_to_dwell < MIN_IGNITION_DELAY_US {
            return false;
        }

        let coil = &mut self.coils[idx];
        if coil.status == ScheduleStatus::Running {
            outputs.coil_end_charge(idx as u8);
        }

        let start = timer.count().wrapping_add(us_to_ticks(time_to_dwell));
        let duration = us_to_ticks(dwell).max(1);
        coil.start_compare = start;
        coil.end_compare = start.wrapping_add(duration);
        coil.duration = duration;
        coil.status = ScheduleStatus::Pending;

        // Coils 0 and 2 share compare channel A. If the partner already owns
        // the compare register this event stays pending; the match handler
        // hands the register over once the partner completes.
        let partner_active = partner_of(idx)
            .map(|p| self.coils[p].status != ScheduleStatus::Off)
            .unwrap_or(false);
        if !partner_active {
            timer.set_compare(channel_for(idx), start);
        }
        true
    }

    /// Compare-match interrupt body. Returns the number of sparks fired so
    /// the caller can account ignition events.
    pub fn on_compare_match(
        &mut self,
        channel: CompareChannel,
        timer: &mut impl EventTimer,
        outputs: &mut impl OutputDriver,
    ) -> u8 {
        match channel {
            CompareChannel::A => self.service_channel(0, Some(2), channel, timer, outputs),
            CompareChannel::B => self.service_channel(1, None, channel, timer, outputs),
        }
    }

    fn service_channel(
        &mut self,
        primary: usize,
        secondary: Option<usize>,
        channel: CompareChannel,
        timer: &mut impl EventTimer,
        outputs: &mut impl OutputDriver,
    ) -> u8 {
        match self.coils[primary].status {
            ScheduleStatus::Pending => {
                self.coils[primary].status = ScheduleStatus::Running;
                outputs.coil_begin_charge(primary as u8);
                timer.set_compare(channel, self.coils[primary].end_compare);
                return 0;
            }
            ScheduleStatus::Running => {
                self.coils[primary].status = ScheduleStatus::Off;
                outputs.coil_end_charge(primary as u8);
                let mut sparks = 1;
                if let Some(sec) = secondary {
                    sparks += self.arm_or_fire(sec, channel, timer, outputs);
                }
                return sparks;
            }
            ScheduleStatus::Off => {}
        }

        if let Some(sec) = secondary {
            match self.coils[sec].status {
                ScheduleStatus::Pending => {
                    self.coils[sec].status = ScheduleStatus::Running;
                    outputs.coil_begin_charge(sec as u8);
                    timer.set_compare(channel, self.coils[sec].end_compare);
                }
                ScheduleStatus::Running => {
                    self.coils[sec].status = ScheduleStatus::Off;
                    outputs.coil_end_charge(sec as u8);
                    return 1;
                }
                ScheduleStatus::Off => {}
            }
        }
        0
    }

    /// Hand the shared compare register to a pending secondary schedule, or
    /// start it immediately if its moment already passed.
    fn arm_or_fire(
        &mut self,
        idx: usize,
        channel: CompareChannel,
        timer: &mut impl EventTimer,
        outputs: &mut impl OutputDriver,
    ) -> u8 {
        if self.coils[idx].status != ScheduleStatus::Pending {
            return 0;
        }
        let now = timer.count();
        if in_future_u16(now, self.coils[idx].start_compare) {
            timer.set_compare(channel, self.coils[idx].start_compare);
        } else {
            self.coils[idx].status = ScheduleStatus::Running;
            outputs.coil_begin_charge(idx as u8);
            timer.set_compare(channel, self.coils[idx].end_compare);
        }
        0
    }

    pub fn cancel_coil(&mut self, idx: usize, outputs: &mut impl OutputDriver) {
        if self.coils[idx].status != ScheduleStatus::Off {
            self.coils[idx].status = ScheduleStatus::Off;
            outputs.coil_end_charge(idx as u8);
        }
    }

    pub fn cancel_injector(&mut self, idx: usize, outputs: &mut impl OutputDriver) {
        let inj = &mut self.injectors[idx];
        if inj.scheduled || inj.open {
            inj.scheduled = false;
            inj.open = false;
            outputs.injector_close(idx as u8);
        }
    }

    /// Protection cut: drop schedules named by `mask` and drive their
    /// outputs inactive.
    pub fn apply_cut(&mut self, mask: u8, outputs: &mut impl OutputDriver) {
        use crate::types::cut;
        if mask & cut::FUEL != 0 {
            for idx in 0..CHANNELS {
                self.cancel_injector(idx, outputs);
            }
        }
        if mask & cut::SPARK != 0 {
            for idx in 0..CHANNELS {
                self.cancel_coil(idx, outputs);
            }
        }
    }
}

impl Default for Schedules {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests;
