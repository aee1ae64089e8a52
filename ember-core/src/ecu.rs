//! The ECU aggregate and its execution entry points.
//!
//! [`Ecu`] owns all state shared with interrupt context, each piece behind a
//! critical-section mutex: the live snapshot, the trigger decoder, the
//! output schedules and the calibration store. The embedding allocates one
//! `Ecu`, passes the same reference to the trigger-edge and compare-match
//! handlers, and drives [`EcuRunner::iterate`] from its idle loop.
//!
//! Write ownership is strict: compare-match interrupts are the only writers
//! of coil outputs, the main loop is the only writer of polled injectors,
//! and the tuner handler is the only writer of calibration bytes.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;

use crate::calibration::Calibration;
use crate::comms::TunerPort;
use crate::corrections::CorrectionState;
use crate::datacells::DataCell;
use crate::fuel;
use crate::hal::{
    AnalogInputs, Auxiliaries, Clock, CompareChannel, Eeprom, EventTimer, OutputDriver, Platform,
    TunerLink,
};
use crate::ignition::{self, RevLimiter};
use crate::periodic::{rate, Ticker};
use crate::protection::ProtectionSupervisor;
use crate::scheduler::Schedules;
use crate::sensors::Sensors;
use crate::status::EngineSnapshot;
use crate::storage;
use crate::trigger::{EdgeOutcome, TriggerState};
use crate::types::{cut, INJECTION_ANGLE, INJ_MAX_PW, INJ_MIN_PW};

type EcuMutex<T> = Mutex<CriticalSectionRawMutex, RefCell<T>>;

/// Process-wide mutable state, shared between the main loop and interrupts.
pub struct Ecu {
    pub status: DataCell<EngineSnapshot>,
    pub trigger: EcuMutex<TriggerState>,
    pub schedules: EcuMutex<Schedules>,
    pub calibration: EcuMutex<Calibration>,
}

impl Ecu {
    pub fn new() -> Self {
        Self {
            status: DataCell::new(EngineSnapshot::new()),
            trigger: Mutex::new(RefCell::new(TriggerState::new())),
            schedules: Mutex::new(RefCell::new(Schedules::new())),
            calibration: Mutex::new(RefCell::new(Calibration::new())),
        }
    }

    /// Trigger-edge interrupt body. Decodes the edge; on a confirmed
    /// revolution start, plans the next injection and coil events from the
    /// most recent pulse width, advance and dwell.
    pub fn on_trigger_edge(
        &self,
        now_us: u32,
        timer: &mut impl EventTimer,
        outputs: &mut impl OutputDriver,
    ) {
        let (outcome, rev_time, rev_counter) = self.trigger.lock(|t| {
            let mut t = t.borrow_mut();
            let outcome = t.on_edge(now_us);
            (outcome, t.revolution_time_us, t.revolution_counter)
        });

        if outcome != EdgeOutcome::RevolutionStart || rev_time == 0 {
            return;
        }

        let snap = self.status.read();

        // Wasted-pair selection: the alternating revolution counter picks
        // which of the two paired channels fires this turn.
        let channel = if rev_counter == 0 { 0 } else { 1 };

        let cut_mask = if snap.protection != 0 {
            self.calibration
                .lock(|cal| cal.borrow().ignition.protect_cut_mask())
        } else {
            0
        };

        let mut pw = if channel == 0 { snap.pw1 } else { snap.pw2 };
        if !(INJ_MIN_PW..=INJ_MAX_PW).contains(&pw) {
            pw = INJ_MIN_PW;
        }
        let delay_us = (INJECTION_ANGLE as u64 * rev_time as u64 / 360) as u32;

        self.schedules.lock(|s| {
            let mut s = s.borrow_mut();
            if cut_mask & cut::FUEL == 0 {
                s.schedule_injection(channel, now_us, delay_us, pw, outputs);
            }
            if cut_mask & cut::SPARK == 0 {
                s.schedule_ignition(channel, rev_time, snap.advance, snap.dwell, timer, outputs);
            }
        });
    }

    /// Compare-match interrupt body for either channel.
    pub fn on_compare_match(
        &self,
        channel: CompareChannel,
        timer: &mut impl EventTimer,
        outputs: &mut impl OutputDriver,
    ) {
        let sparks = self
            .schedules
            .lock(|s| s.borrow_mut().on_compare_match(channel, timer, outputs));
        if sparks > 0 {
            self.status.update_with(|st| {
                st.ignition_count = st.ignition_count.wrapping_add(sparks as u16);
            });
        }
    }

    /// Write a recomputed snapshot back, keeping the interrupt-owned spark
    /// counter that may have advanced while the copy was being worked on.
    fn commit(&self, snap: &EngineSnapshot) {
        self.status.update_with(|s| {
            let ignition_count = s.ignition_count;
            *s = *snap;
            s.ignition_count = ignition_count;
        });
    }
}

impl Default for Ecu {
    fn default() -> Self {
        Self::new()
    }
}

/// Main-loop-side state: filters, tick bookkeeping, correction and
/// protection latches, the tuner port.
pub struct EcuRunner {
    sensors: Sensors,
    ticker: Ticker,
    corrections: CorrectionState,
    rev_limiter: RevLimiter,
    protection: ProtectionSupervisor,
    tuner: TunerPort,
    pending_loops: u32,
    loops_this_second: u32,
}

impl EcuRunner {
    pub const fn new() -> Self {
        Self {
            sensors: Sensors::new(),
            ticker: Ticker::new(),
            corrections: CorrectionState::new(),
            rev_limiter: RevLimiter::new(),
            protection: ProtectionSupervisor::new(),
            tuner: TunerPort::new(),
            pending_loops: 0,
            loops_this_second: 0,
        }
    }

    /// Boot sequence: restore calibration, configure the decoder and seed
    /// the sensor filters.
    pub fn boot(
        &mut self,
        ecu: &Ecu,
        clock: &impl Clock,
        adc: &impl AnalogInputs,
        eeprom: &mut impl Eeprom,
    ) {
        ecu.calibration.lock(|cal| {
            let mut cal = cal.borrow_mut();
            let defaulted = storage::init(eeprom, &mut cal);
            if !defaulted {
                crate::info!("calibration restored from store");
            }
            ecu.trigger.lock(|t| t.borrow_mut().configure(&cal.ignition));

            let mut snap = ecu.status.read();
            self.sensors.prime(adc, &mut snap, &cal.fuel, clock.now_us());
            ecu.status.update(snap);
        });
    }

    /// One pass of the cooperative main loop.
    #[allow(clippy::too_many_arguments)]
    pub fn iterate(
        &mut self,
        ecu: &Ecu,
        clock: &impl Clock,
        adc: &impl AnalogInputs,
        timer: &mut impl EventTimer,
        outputs: &mut impl OutputDriver,
        link: &mut impl TunerLink,
        eeprom: &mut impl Eeprom,
        aux: &mut impl Auxiliaries,
        platform: &impl Platform,
    ) {
        let now_us = clock.now_us();
        let now_ms = clock.now_ms();
        self.pending_loops += 1;
        self.loops_this_second += 1;

        // Injector polling runs on every single pass.
        ecu.schedules
            .lock(|s| s.borrow_mut().poll_injectors(now_us, outputs));

        let flags = self.ticker.service(now_ms);
        if flags != 0 {
            let mut snap = ecu.status.read();

            ecu.calibration.lock(|cal| {
                let mut cal = cal.borrow_mut();

                if flags & rate::HZ1000 != 0 {
                    self.tick_1khz(ecu, &mut cal, &mut snap, adc, now_us);
                }
                if flags & rate::HZ200 != 0 {
                    self.corrections.update_engine_state(&mut snap, &cal.fuel);
                }
                if flags & rate::HZ30 != 0 {
                    self.sensors.read_medium(adc, &mut snap);
                    snap.afr_target =
                        cal.afr_table.lookup(snap.map_kpa, snap.rpm).clamp(0, 255) as u8;
                }
                if flags & rate::HZ15 != 0 {
                    self.corrections.ego_service(&snap, &cal.fuel);
                    let mask = self.protection.service(&snap, &cal.fuel, &cal.ignition);
                    if mask != 0 && snap.protection == 0 {
                        crate::warn!("protection tripped, mask {}", mask);
                    }
                    snap.protection = mask;
                    if mask != 0 {
                        let cut_mask = cal.ignition.protect_cut_mask();
                        ecu.schedules
                            .lock(|s| s.borrow_mut().apply_cut(cut_mask, outputs));
                    }
                }
                if flags & rate::HZ4 != 0 {
                    self.sensors.read_slow(adc, &mut snap);
                    let lost = ecu
                        .trigger
                        .lock(|t| t.borrow_mut().check_sync_timeout(now_us));
                    if lost {
                        snap.rpm = 0;
                        snap.revolution_time_us = 0;
                        snap.has_sync = false;
                    }
                    aux.service(&snap, now_ms);
                }
                if flags & rate::HZ1 != 0 {
                    snap.secl = snap.secl.wrapping_add(1);
                    if snap.rpm > 0 {
                        snap.run_secs = snap.run_secs.wrapping_add(1);
                    }
                    snap.loops_per_sec = self.loops_this_second.min(u16::MAX as u32) as u16;
                    self.loops_this_second = 0;
                    snap.free_ram = platform.free_ram();
                }
            });

            ecu.commit(&snap);
        }

        // Tuner traffic is handled whenever bytes are pending, main loop
        // only.
        let snap = ecu.status.read();
        ecu.calibration.lock(|cal| {
            self.tuner
                .service(link, &mut cal.borrow_mut(), &snap, eeprom);
        });
    }

    fn tick_1khz(
        &mut self,
        ecu: &Ecu,
        cal: &mut Calibration,
        snap: &mut EngineSnapshot,
        adc: &impl AnalogInputs,
        now_us: u32,
    ) {
        snap.loop_count = snap.loop_count.wrapping_add(self.pending_loops);
        self.pending_loops = 0;

        self.sensors.read_fast(adc, snap, &cal.fuel, now_us);

        let (rpm, rev_time, has_sync) = ecu.trigger.lock(|t| {
            let t = t.borrow();
            (t.rpm(), t.revolution_time_us, t.has_sync)
        });
        snap.rpm = rpm;
        snap.revolution_time_us = rev_time;
        snap.has_sync = has_sync;

        self.corrections.note_ignition_events(snap, &cal.fuel);
        let corrections = self.corrections.total(snap, &cal.fuel);
        snap.corrections = corrections;

        snap.ve = fuel::lookup_ve(&mut cal.ve_table, snap);
        let pw = fuel::pulse_width_us(&cal.fuel, snap.ve, snap.map_kpa, corrections);
        snap.pw1 = pw;
        snap.pw2 = pw;
        snap.pw3 = 0;

        snap.advance =
            ignition::compute_advance(&mut self.rev_limiter, &mut cal.ign_table, snap, &cal.ignition);
        snap.dwell = ignition::compute_dwell(snap, &cal.ignition);
    }
}

impl Default for EcuRunner {
    fn default() -> Self {
        Self::new()
    }
}
