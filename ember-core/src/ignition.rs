//! Ignition advance and dwell computation.

use crate::config::{IgnitionConfig, CLT_ADV_POINTS};
use crate::status::EngineSnapshot;
use crate::tables::{interpolate, Table3d};
use crate::types::{engine, DWELL_MAX, DWELL_MIN, IGN_MAX_ADVANCE, IGN_MIN_ADVANCE};

/// Soft rev limiter. Alternates cut/no-cut across spark computations so the
/// engine hangs on the limit instead of dying on it.
pub struct RevLimiter {
    cut_state: bool,
}

impl RevLimiter {
    pub const fn new() -> Self {
        Self { cut_state: false }
    }

    fn apply(&mut self, rpm: u16, cfg: &IgnitionConfig, advance: i8) -> i8 {
        let limit = cfg.rev_limit_rpm() as u16 * 100;
        if rpm >= limit {
            self.cut_state = !self.cut_state;
            if self.cut_state {
                return IGN_MIN_ADVANCE;
            }
        }
        advance
    }
}

impl Default for RevLimiter {
    fn default() -> Self {
        Self::new()
    }
}

/// Additional advance from coolant temperature, four-point piecewise linear
/// (typically positive when cold).
pub fn clt_advance(cfg: &IgnitionConfig, coolant_c: i8) -> i8 {
    if coolant_c < cfg.clt_adv_bin(0) {
        return cfg.clt_adv_value(0);
    }
    for i in 0..CLT_ADV_POINTS - 1 {
        if coolant_c >= cfg.clt_adv_bin(i) && coolant_c < cfg.clt_adv_bin(i + 1) {
            return interpolate(
                coolant_c as i32,
                cfg.clt_adv_bin(i) as i32,
                cfg.clt_adv_bin(i + 1) as i32,
                cfg.clt_adv_value(i) as i32,
                cfg.clt_adv_value(i + 1) as i32,
            ) as i8;
        }
    }
    cfg.clt_adv_value(CLT_ADV_POINTS - 1)
}

/// Ignition advance in degrees BTDC for the current snapshot.
pub fn compute_advance(
    limiter: &mut RevLimiter,
    table: &mut Table3d,
    snap: &EngineSnapshot,
    cfg: &IgnitionConfig,
) -> i8 {
    if snap.engine_flag(engine::CRANK) {
        return cfg
            .crank_advance()
            .clamp(IGN_MIN_ADVANCE, IGN_MAX_ADVANCE);
    }

    let base = table.lookup(snap.map_kpa, snap.rpm);
    let mut advance = base.clamp(i8::MIN as i16, i8::MAX as i16) as i8;

    advance = advance.saturating_add(clt_advance(cfg, snap.coolant_c));

    if snap.rpm > 0 && snap.rpm < cfg.idle_rpm() as u16 * 10 {
        advance = advance.saturating_add(cfg.idle_advance() as i8);
    }

    advance = limiter.apply(snap.rpm, cfg, advance);

    advance.clamp(IGN_MIN_ADVANCE, IGN_MAX_ADVANCE)
}

/// Coil dwell in microseconds for the current snapshot.
pub fn compute_dwell(snap: &EngineSnapshot, cfg: &IgnitionConfig) -> u16 {
    let dwell = if snap.engine_flag(engine::CRANK) {
        cfg.dwell_crank_us()
    } else {
        cfg.dwell_run_us()
    };
    let ceiling = cfg.dwell_limit_us().min(DWELL_MAX);
    dwell.clamp(DWELL_MIN, ceiling.max(DWELL_MIN))
}
