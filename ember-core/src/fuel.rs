//! Injector pulse-width computation.

use crate::config::FuelConfig;
use crate::status::EngineSnapshot;
use crate::tables::Table3d;
use crate::types::{INJ_MAX_PW, INJ_MIN_PW};

/// Volumetric efficiency from the fuel map at the current MAP/RPM.
pub fn lookup_ve(table: &mut Table3d, snap: &EngineSnapshot) -> u8 {
    table.lookup(snap.map_kpa, snap.rpm).clamp(0, 255) as u8
}

/// Pulse width in microseconds:
/// `reqFuel x VE/100 x MAP/100 x corrections/100 + injOpen`, evaluated in
/// 32-bit and clamped to the injector's usable window.
pub fn pulse_width_us(cfg: &FuelConfig, ve: u8, map_kpa: u8, corrections: u16) -> u16 {
    let mut pw = cfg.req_fuel_us() as u32;
    pw = pw * ve as u32 / 100;
    pw = pw * map_kpa as u32 / 100;
    pw = pw * corrections as u32 / 100;
    pw += cfg.inj_open_us() as u32;
    pw.clamp(INJ_MIN_PW as u32, INJ_MAX_PW as u32) as u16
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::{Table3d, TABLE_DIM};

    #[test]
    fn cold_start_idle_pulse_width() {
        // Scenario 1: reqFuel 10 ms, VE 55, MAP 40 kPa, corrections 144,
        // injOpen 1 ms -> 4168 us.
        let cfg = FuelConfig::defaults();
        assert_eq!(pulse_width_us(&cfg, 55, 40, 144), 4_168);
    }

    #[test]
    fn pulse_width_clamps_low_and_high() {
        let cfg = FuelConfig::defaults();
        // Tiny VE and load stays above the minimum.
        assert_eq!(pulse_width_us(&cfg, 1, 10, 50), 1_005);
        // Zero VE collapses to injOpen, still above the floor.
        assert_eq!(pulse_width_us(&cfg, 0, 10, 50), 1_000);
        // Heavy everything pins at the ceiling.
        assert_eq!(pulse_width_us(&cfg, 255, 255, 200), 20_000);
    }

    #[test]
    fn pulse_width_floor_applies() {
        let mut cfg = FuelConfig::defaults();
        // injOpen = 0 so the raw value can drop under 500 us.
        cfg.write_byte(5, 0);
        cfg.write_byte(6, 0);
        assert_eq!(pulse_width_us(&cfg, 1, 10, 50), 500);
    }

    #[test]
    fn ve_lookup_clamps_to_byte() {
        let mut axis_x = [0u16; TABLE_DIM];
        let mut axis_y = [0u8; TABLE_DIM];
        for i in 0..TABLE_DIM {
            axis_x[i] = (i as u16 + 1) * 500;
            axis_y[i] = 20 + i as u8 * 10;
        }
        let mut t = Table3d::from_parts(false, [[55u8; TABLE_DIM]; TABLE_DIM], axis_x, axis_y);
        let mut snap = crate::status::EngineSnapshot::new();
        snap.map_kpa = 40;
        snap.rpm = 800;
        assert_eq!(lookup_ve(&mut t, &snap), 55);
    }
}
