//! Fuel correction chain and engine run-state transitions.
//!
//! All terms are percentages around 100. WUE, ASE, CLT and battery multiply;
//! acceleration enrichment adds; the total is clamped to [50, 200].

use crate::config::{FuelConfig, WUE_POINTS};
use crate::status::EngineSnapshot;
use crate::tables::interpolate;
use crate::types::{engine, CORR_MAX, CORR_MIN, WARMUP_TEMP_C};

pub struct CorrectionState {
    ase_value: u8,
    ase_counter: u8,
    was_run: bool,
    ego_pct: u8,
    ego_event_accum: u16,
    last_ignition_count: u16,
}

impl CorrectionState {
    pub const fn new() -> Self {
        Self {
            ase_value: 100,
            ase_counter: 0,
            was_run: false,
            ego_pct: 100,
            ego_event_accum: 0,
            last_ignition_count: 0,
        }
    }

    /// CRANK/RUN/WARMUP flag maintenance. After-start enrichment arms on
    /// every transition into RUN.
    pub fn update_engine_state(&mut self, snap: &mut EngineSnapshot, cfg: &FuelConfig) {
        let crank_limit = cfg.crank_rpm() as u16 * 10;
        if snap.rpm > 0 && snap.rpm < crank_limit {
            snap.set_engine_flag(engine::CRANK, true);
            snap.set_engine_flag(engine::RUN, false);
        } else if snap.rpm >= crank_limit && snap.rpm > 0 {
            snap.set_engine_flag(engine::CRANK, false);
            snap.set_engine_flag(engine::RUN, true);
            if !self.was_run {
                self.start_ase(snap, cfg);
            }
        } else {
            snap.set_engine_flag(engine::CRANK, false);
            snap.set_engine_flag(engine::RUN, false);
        }
        self.was_run = snap.engine_flag(engine::RUN);

        snap.set_engine_flag(engine::WARMUP, snap.coolant_c < WARMUP_TEMP_C);
    }

    fn start_ase(&mut self, snap: &mut EngineSnapshot, cfg: &FuelConfig) {
        // A zero event count means ASE is not in use.
        if cfg.ase_count() == 0 || cfg.ase_pct() <= 100 {
            self.ase_value = 100;
            self.ase_counter = 0;
            return;
        }
        self.ase_counter = cfg.ase_count();
        self.ase_value = cfg.ase_pct();
        snap.set_engine_flag(engine::ASE, true);
    }

    /// Account for ignition events since the last call: steps the ASE decay
    /// and accumulates events for the closed-loop stepper.
    pub fn note_ignition_events(&mut self, snap: &mut EngineSnapshot, cfg: &FuelConfig) {
        let delta = snap.ignition_count.wrapping_sub(self.last_ignition_count);
        self.last_ignition_count = snap.ignition_count;
        if delta == 0 {
            return;
        }
        self.ego_event_accum = self.ego_event_accum.saturating_add(delta);

        if !snap.engine_flag(engine::ASE) {
            return;
        }
        for _ in 0..delta {
            if self.ase_counter > 0 {
                self.ase_counter -= 1;
                let count = cfg.ase_count();
                if count > 0 {
                    let step = (cfg.ase_pct().saturating_sub(100)) / count;
                    self.ase_value = self.ase_value.saturating_sub(step);
                }
                if self.ase_value <= 100 {
                    self.ase_value = 100;
                    snap.set_engine_flag(engine::ASE, false);
                    break;
                }
            } else {
                self.ase_value = 100;
                snap.set_engine_flag(engine::ASE, false);
                break;
            }
        }
    }

    /// Closed-loop O2 trim, serviced at 15 Hz. Steps toward the target only
    /// while every gating condition holds; otherwise the trim resets.
    pub fn ego_service(&mut self, snap: &EngineSnapshot, cfg: &FuelConfig) {
        let gated = cfg.ego_enabled()
            && snap.engine_flag(engine::RUN)
            && snap.run_secs >= cfg.ego_delay_s() as u32
            && snap.coolant_c >= cfg.ego_temp_c()
            && snap.rpm / 100 >= cfg.ego_rpm() as u16
            && snap.tps <= cfg.ego_tps_max()
            && snap.o2 >= cfg.ego_min()
            && snap.o2 <= cfg.ego_max();

        if !gated {
            self.ego_pct = 100;
            self.ego_event_accum = 0;
            return;
        }

        let events = cfg.ego_ign_events().max(1) as u16;
        while self.ego_event_accum >= events {
            self.ego_event_accum -= events;
            let limit = cfg.ego_limit();
            let step = cfg.ego_step();
            if snap.o2 > cfg.ego_target() {
                // Rich of target: pull fuel.
                self.ego_pct = self
                    .ego_pct
                    .saturating_sub(step)
                    .max(100u8.saturating_sub(limit));
            } else if snap.o2 < cfg.ego_target() {
                self.ego_pct = self
                    .ego_pct
                    .saturating_add(step)
                    .min(100u8.saturating_add(limit));
            }
        }
    }

    /// Combined correction factor; also exports the individual terms into
    /// the snapshot for the tuner.
    pub fn total(&mut self, snap: &mut EngineSnapshot, cfg: &FuelConfig) -> u16 {
        let wue = wue_correction(snap, cfg);
        let ase = if snap.engine_flag(engine::ASE) {
            self.ase_value
        } else {
            100
        };
        let clt = clt_trim(snap);
        let bat = battery_correction(snap);
        let ae = accel_enrichment(snap, cfg);
        let ego = if cfg.ego_enabled() { self.ego_pct } else { 100 };

        snap.wue_pct = wue;
        snap.ase_pct = ase;
        snap.clt_pct = clt;
        snap.bat_pct = bat;
        snap.ae_pct = ae;
        snap.ego_pct = ego;

        let mut total: u32 = 100;
        total = total * wue as u32 / 100;
        total = total * ase as u32 / 100;
        total = total * clt as u32 / 100;
        total = total * bat as u32 / 100;
        total = total * ego as u32 / 100;
        total += ae as u32;

        (total as u16).clamp(CORR_MIN, CORR_MAX)
    }

    pub fn ase_active_value(&self) -> u8 {
        self.ase_value
    }
}

impl Default for CorrectionState {
    fn default() -> Self {
        Self::new()
    }
}

/// Warm-up enrichment: piecewise linear over six coolant temperature points,
/// 100 once out of warm-up.
pub fn wue_correction(snap: &EngineSnapshot, cfg: &FuelConfig) -> u8 {
    if !snap.engine_flag(engine::WARMUP) {
        return 100;
    }
    let temp = snap.coolant_c;
    if temp < cfg.wue_bin(0) {
        return cfg.wue_value(0);
    }
    for i in 0..WUE_POINTS - 1 {
        if temp >= cfg.wue_bin(i) && temp < cfg.wue_bin(i + 1) {
            return interpolate(
                temp as i32,
                cfg.wue_bin(i) as i32,
                cfg.wue_bin(i + 1) as i32,
                cfg.wue_value(i) as i32,
                cfg.wue_value(i + 1) as i32,
            ) as u8;
        }
    }
    cfg.wue_value(WUE_POINTS - 1)
}

/// TPS-based acceleration enrichment, additive. Doubles on a hard stab.
pub fn accel_enrichment(snap: &mut EngineSnapshot, cfg: &FuelConfig) -> u8 {
    if cfg.ae_mode() != 0 {
        return 0;
    }
    let thresh = cfg.ae_thresh() as i16;
    if snap.tps_dot > thresh {
        snap.set_engine_flag(engine::ACCEL, true);
        let mut ae = cfg.ae_pct().saturating_sub(100);
        if snap.tps_dot > thresh * 3 {
            ae = ae.saturating_mul(2);
        }
        ae
    } else {
        snap.set_engine_flag(engine::ACCEL, false);
        0
    }
}

/// Fine trim against overheating: 1 % off per 5 degC above 100, at most 5 %.
pub fn clt_trim(snap: &EngineSnapshot) -> u8 {
    if snap.coolant_c > 100 {
        let reduction = (((snap.coolant_c as i16) - 100) / 5).min(5) as u8;
        100 - reduction
    } else {
        100
    }
}

/// Injector dead-time compensation for battery voltage.
pub fn battery_correction(snap: &EngineSnapshot) -> u8 {
    let dv = snap.battery_dv;
    if dv <= 110 {
        110
    } else if dv <= 120 {
        105
    } else if dv >= 150 {
        97
    } else {
        100
    }
}
