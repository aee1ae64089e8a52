//! Calibration config pages.
//!
//! Each page is the raw 128-byte record exactly as the tuner sees it; typed
//! accessors decode fields at fixed offsets. Keeping the bytes as the source
//! of truth makes page reads/writes trivially round-trip, including the
//! spare region kept for forward compatibility.

use crate::types::{cut, TriggerEdge, TriggerPattern};

pub const CONFIG_PAGE_SIZE: u16 = 128;

#[inline]
fn get_u16(raw: &[u8; 128], off: usize) -> u16 {
    u16::from_le_bytes([raw[off], raw[off + 1]])
}

#[inline]
fn put_u16(raw: &mut [u8; 128], off: usize, value: u16) {
    raw[off..off + 2].copy_from_slice(&value.to_le_bytes());
}

/// Fuel-side configuration (page 1).
#[derive(Clone)]
pub struct FuelConfig {
    raw: [u8; 128],
}

mod fuel_offs {
    pub const N_CYLINDERS: usize = 0;
    pub const INJECTOR_LAYOUT: usize = 1;
    pub const REQ_FUEL: usize = 2;
    pub const DIVIDER: usize = 4;
    pub const INJ_OPEN: usize = 5;
    pub const TPS_MIN: usize = 7;
    pub const TPS_MAX: usize = 8;
    pub const TPS_FILTER: usize = 9;
    pub const MAP_MIN: usize = 10;
    pub const MAP_MAX: usize = 11;
    pub const MAP_SAMPLE: usize = 12;
    pub const MAP_FILTER: usize = 13;
    pub const WUE_BINS: usize = 14;
    pub const WUE_VALUES: usize = 20;
    pub const ASE_PCT: usize = 26;
    pub const ASE_COUNT: usize = 27;
    pub const AE_MODE: usize = 28;
    pub const AE_THRESH: usize = 29;
    pub const AE_PCT: usize = 30;
    pub const AE_TIME: usize = 31;
    pub const PRIME_PULSE: usize = 32;
    pub const CRANK_RPM: usize = 33;
    pub const STOICH: usize = 34;
    pub const EGO_TYPE: usize = 35;
    pub const EGO_ALGORITHM: usize = 36;
    pub const EGO_DELAY: usize = 37;
    pub const EGO_TEMP: usize = 38;
    pub const EGO_RPM: usize = 39;
    pub const EGO_TPS_MAX: usize = 40;
    pub const EGO_MIN: usize = 41;
    pub const EGO_MAX: usize = 42;
    pub const EGO_LIMIT: usize = 43;
    pub const EGO_STEP: usize = 44;
    pub const EGO_IGN_EVENTS: usize = 45;
    pub const EGO_TARGET: usize = 46;
    pub const EGO_HYSTERESIS: usize = 47;
    pub const OIL_PROT_ENABLE: usize = 48;
    pub const OIL_PROT_THRESHOLD: usize = 49;
    pub const OIL_PROT_HYSTERESIS: usize = 50;
    pub const OIL_PROT_DELAY: usize = 51;
}

pub const WUE_POINTS: usize = 6;

impl FuelConfig {
    pub const fn from_raw(raw: [u8; 128]) -> Self {
        Self { raw }
    }

    /// Compiled defaults: conservative first-start values for a 4-cylinder
    /// port-injected engine.
    pub fn defaults() -> Self {
        use fuel_offs::*;
        let mut c = Self { raw: [0; 128] };
        c.raw[N_CYLINDERS] = 4;
        c.raw[INJECTOR_LAYOUT] = 0;
        put_u16(&mut c.raw, REQ_FUEL, 10_000);
        c.raw[DIVIDER] = 1;
        put_u16(&mut c.raw, INJ_OPEN, 1_000);
        c.raw[TPS_MIN] = 20;
        c.raw[TPS_MAX] = 235;
        c.raw[TPS_FILTER] = 50;
        c.raw[MAP_MIN] = 20;
        c.raw[MAP_MAX] = 105;
        c.raw[MAP_SAMPLE] = 0;
        c.raw[MAP_FILTER] = 20;
        let wue_bins: [i8; WUE_POINTS] = [-40, -20, 0, 20, 40, 60];
        let wue_values: [u8; WUE_POINTS] = [180, 160, 140, 120, 110, 100];
        for i in 0..WUE_POINTS {
            c.raw[WUE_BINS + i] = wue_bins[i] as u8;
            c.raw[WUE_VALUES + i] = wue_values[i];
        }
        c.raw[ASE_PCT] = 150;
        c.raw[ASE_COUNT] = 50;
        c.raw[AE_MODE] = 0;
        c.raw[AE_THRESH] = 10;
        c.raw[AE_PCT] = 120;
        c.raw[AE_TIME] = 10;
        c.raw[PRIME_PULSE] = 50;
        c.raw[CRANK_RPM] = 40;
        c.raw[STOICH] = 147;
        c.raw[EGO_TYPE] = 0;
        c.raw[EGO_ALGORITHM] = 0;
        c.raw[EGO_DELAY] = 20;
        c.raw[EGO_TEMP] = 60u8;
        c.raw[EGO_RPM] = 13;
        c.raw[EGO_TPS_MAX] = 50;
        c.raw[EGO_MIN] = 60;
        c.raw[EGO_MAX] = 140;
        c.raw[EGO_LIMIT] = 5;
        c.raw[EGO_STEP] = 1;
        c.raw[EGO_IGN_EVENTS] = 4;
        c.raw[EGO_TARGET] = 100;
        c.raw[EGO_HYSTERESIS] = 2;
        c.raw[OIL_PROT_ENABLE] = 0;
        c.raw[OIL_PROT_THRESHOLD] = 40;
        c.raw[OIL_PROT_HYSTERESIS] = 4;
        c.raw[OIL_PROT_DELAY] = 2;
        c
    }

    pub fn read_byte(&self, offset: u16) -> Option<u8> {
        self.raw.get(offset as usize).copied()
    }

    pub fn write_byte(&mut self, offset: u16, value: u8) -> bool {
        match self.raw.get_mut(offset as usize) {
            Some(b) => {
                *b = value;
                true
            }
            None => false,
        }
    }

    pub fn raw(&self) -> &[u8; 128] {
        &self.raw
    }

    pub fn n_cylinders(&self) -> u8 {
        self.raw[fuel_offs::N_CYLINDERS]
    }

    /// Base fuel quantity in microseconds at 100 % VE / 100 kPa.
    pub fn req_fuel_us(&self) -> u16 {
        get_u16(&self.raw, fuel_offs::REQ_FUEL)
    }

    /// Injector opening (dead) time in microseconds.
    pub fn inj_open_us(&self) -> u16 {
        get_u16(&self.raw, fuel_offs::INJ_OPEN)
    }

    pub fn tps_min(&self) -> u8 {
        self.raw[fuel_offs::TPS_MIN]
    }

    pub fn tps_max(&self) -> u8 {
        self.raw[fuel_offs::TPS_MAX]
    }

    pub fn tps_filter(&self) -> u8 {
        self.raw[fuel_offs::TPS_FILTER]
    }

    pub fn map_min_kpa(&self) -> u8 {
        self.raw[fuel_offs::MAP_MIN]
    }

    pub fn map_max_kpa(&self) -> u8 {
        self.raw[fuel_offs::MAP_MAX]
    }

    pub fn map_filter(&self) -> u8 {
        self.raw[fuel_offs::MAP_FILTER]
    }

    pub fn wue_bin(&self, i: usize) -> i8 {
        self.raw[fuel_offs::WUE_BINS + i] as i8
    }

    pub fn wue_value(&self, i: usize) -> u8 {
        self.raw[fuel_offs::WUE_VALUES + i]
    }

    pub fn ase_pct(&self) -> u8 {
        self.raw[fuel_offs::ASE_PCT]
    }

    pub fn ase_count(&self) -> u8 {
        self.raw[fuel_offs::ASE_COUNT]
    }

    pub fn ae_mode(&self) -> u8 {
        self.raw[fuel_offs::AE_MODE]
    }

    /// TPS rate threshold in %/s that arms acceleration enrichment.
    pub fn ae_thresh(&self) -> u8 {
        self.raw[fuel_offs::AE_THRESH]
    }

    pub fn ae_pct(&self) -> u8 {
        self.raw[fuel_offs::AE_PCT]
    }

    /// Cranking threshold, stored as RPM/10.
    pub fn crank_rpm(&self) -> u8 {
        self.raw[fuel_offs::CRANK_RPM]
    }

    pub fn ego_enabled(&self) -> bool {
        self.raw[fuel_offs::EGO_TYPE] != 0
    }

    /// Run seconds before closed-loop correction may engage.
    pub fn ego_delay_s(&self) -> u8 {
        self.raw[fuel_offs::EGO_DELAY]
    }

    pub fn ego_temp_c(&self) -> i8 {
        self.raw[fuel_offs::EGO_TEMP] as i8
    }

    /// Minimum engine speed, stored as RPM/100.
    pub fn ego_rpm(&self) -> u8 {
        self.raw[fuel_offs::EGO_RPM]
    }

    pub fn ego_tps_max(&self) -> u8 {
        self.raw[fuel_offs::EGO_TPS_MAX]
    }

    pub fn ego_min(&self) -> u8 {
        self.raw[fuel_offs::EGO_MIN]
    }

    pub fn ego_max(&self) -> u8 {
        self.raw[fuel_offs::EGO_MAX]
    }

    /// Maximum deviation of the correction from 100 %.
    pub fn ego_limit(&self) -> u8 {
        self.raw[fuel_offs::EGO_LIMIT]
    }

    pub fn ego_step(&self) -> u8 {
        self.raw[fuel_offs::EGO_STEP]
    }

    pub fn ego_ign_events(&self) -> u8 {
        self.raw[fuel_offs::EGO_IGN_EVENTS]
    }

    pub fn ego_target(&self) -> u8 {
        self.raw[fuel_offs::EGO_TARGET]
    }

    pub fn oil_prot_enabled(&self) -> bool {
        self.raw[fuel_offs::OIL_PROT_ENABLE] != 0
    }

    pub fn oil_prot_threshold(&self) -> u8 {
        self.raw[fuel_offs::OIL_PROT_THRESHOLD]
    }

    pub fn oil_prot_hysteresis(&self) -> u8 {
        self.raw[fuel_offs::OIL_PROT_HYSTERESIS]
    }

    /// Consecutive supervisor ticks below threshold before latching.
    pub fn oil_prot_delay(&self) -> u8 {
        self.raw[fuel_offs::OIL_PROT_DELAY]
    }
}

/// Ignition and trigger configuration (page 4).
#[derive(Clone)]
pub struct IgnitionConfig {
    raw: [u8; 128],
}

mod ign_offs {
    pub const TRIGGER_PATTERN: usize = 0;
    pub const TRIGGER_TEETH: usize = 1;
    pub const TRIGGER_MISSING: usize = 2;
    pub const TRIGGER_ANGLE: usize = 3;
    pub const TRIGGER_EDGE: usize = 4;
    pub const DWELL_RUN: usize = 5;
    pub const DWELL_CRANK: usize = 7;
    pub const DWELL_LIMIT: usize = 9;
    pub const CRANK_ADVANCE: usize = 11;
    pub const REV_LIMIT_RPM: usize = 12;
    pub const IDLE_ADVANCE: usize = 13;
    pub const IDLE_RPM: usize = 14;
    pub const CLT_ADV_BINS: usize = 15;
    pub const CLT_ADV_VALUES: usize = 19;
    pub const IGN_INVERT: usize = 23;
    pub const PROTECT_ENABLE: usize = 24;
    pub const PROTECT_RPM: usize = 25;
    pub const PROTECT_RPM_HYST: usize = 26;
    pub const PROTECT_CUT: usize = 27;
}

pub const CLT_ADV_POINTS: usize = 4;

impl IgnitionConfig {
    pub const fn from_raw(raw: [u8; 128]) -> Self {
        Self { raw }
    }

    pub fn defaults() -> Self {
        use ign_offs::*;
        let mut c = Self { raw: [0; 128] };
        c.raw[TRIGGER_PATTERN] = TriggerPattern::MissingTooth.to_raw();
        c.raw[TRIGGER_TEETH] = 36;
        c.raw[TRIGGER_MISSING] = 1;
        c.raw[TRIGGER_ANGLE] = 0;
        c.raw[TRIGGER_EDGE] = TriggerEdge::Both.to_raw();
        put_u16(&mut c.raw, DWELL_RUN, 3_000);
        put_u16(&mut c.raw, DWELL_CRANK, 4_000);
        put_u16(&mut c.raw, DWELL_LIMIT, 8_000);
        c.raw[CRANK_ADVANCE] = 10u8;
        c.raw[REV_LIMIT_RPM] = 60;
        c.raw[IDLE_ADVANCE] = 15;
        c.raw[IDLE_RPM] = 80;
        let bins: [i8; CLT_ADV_POINTS] = [-20, 0, 40, 80];
        let vals: [i8; CLT_ADV_POINTS] = [5, 3, 0, -2];
        for i in 0..CLT_ADV_POINTS {
            c.raw[CLT_ADV_BINS + i] = bins[i] as u8;
            c.raw[CLT_ADV_VALUES + i] = vals[i] as u8;
        }
        c.raw[IGN_INVERT] = 0;
        c.raw[PROTECT_ENABLE] = 0;
        c.raw[PROTECT_RPM] = 70;
        c.raw[PROTECT_RPM_HYST] = 3;
        c.raw[PROTECT_CUT] = cut::FUEL | cut::SPARK;
        c
    }

    pub fn read_byte(&self, offset: u16) -> Option<u8> {
        self.raw.get(offset as usize).copied()
    }

    pub fn write_byte(&mut self, offset: u16, value: u8) -> bool {
        match self.raw.get_mut(offset as usize) {
            Some(b) => {
                *b = value;
                true
            }
            None => false,
        }
    }

    pub fn raw(&self) -> &[u8; 128] {
        &self.raw
    }

    pub fn trigger_pattern(&self) -> TriggerPattern {
        TriggerPattern::from_raw(self.raw[ign_offs::TRIGGER_PATTERN])
    }

    pub fn trigger_teeth(&self) -> u8 {
        self.raw[ign_offs::TRIGGER_TEETH]
    }

    pub fn trigger_missing(&self) -> u8 {
        self.raw[ign_offs::TRIGGER_MISSING]
    }

    pub fn trigger_edge(&self) -> TriggerEdge {
        TriggerEdge::from_raw(self.raw[ign_offs::TRIGGER_EDGE])
    }

    pub fn dwell_run_us(&self) -> u16 {
        get_u16(&self.raw, ign_offs::DWELL_RUN)
    }

    pub fn dwell_crank_us(&self) -> u16 {
        get_u16(&self.raw, ign_offs::DWELL_CRANK)
    }

    pub fn dwell_limit_us(&self) -> u16 {
        get_u16(&self.raw, ign_offs::DWELL_LIMIT)
    }

    pub fn crank_advance(&self) -> i8 {
        self.raw[ign_offs::CRANK_ADVANCE] as i8
    }

    /// Soft rev limit, stored as RPM/100.
    pub fn rev_limit_rpm(&self) -> u8 {
        self.raw[ign_offs::REV_LIMIT_RPM]
    }

    pub fn idle_advance(&self) -> u8 {
        self.raw[ign_offs::IDLE_ADVANCE]
    }

    /// Idle threshold, stored as RPM/10.
    pub fn idle_rpm(&self) -> u8 {
        self.raw[ign_offs::IDLE_RPM]
    }

    pub fn clt_adv_bin(&self, i: usize) -> i8 {
        self.raw[ign_offs::CLT_ADV_BINS + i] as i8
    }

    pub fn clt_adv_value(&self, i: usize) -> i8 {
        self.raw[ign_offs::CLT_ADV_VALUES + i] as i8
    }

    pub fn protect_enabled(&self) -> bool {
        self.raw[ign_offs::PROTECT_ENABLE] != 0
    }

    /// Protection threshold, stored as RPM/100.
    pub fn protect_rpm(&self) -> u8 {
        self.raw[ign_offs::PROTECT_RPM]
    }

    pub fn protect_rpm_hysteresis(&self) -> u8 {
        self.raw[ign_offs::PROTECT_RPM_HYST]
    }

    pub fn protect_cut_mask(&self) -> u8 {
        self.raw[ign_offs::PROTECT_CUT]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fuel_defaults_decode() {
        let c = FuelConfig::defaults();
        assert_eq!(c.n_cylinders(), 4);
        assert_eq!(c.req_fuel_us(), 10_000);
        assert_eq!(c.inj_open_us(), 1_000);
        assert_eq!(c.crank_rpm(), 40);
        assert_eq!(c.wue_bin(0), -40);
        assert_eq!(c.wue_value(0), 180);
        assert_eq!(c.wue_bin(5), 60);
        assert_eq!(c.wue_value(5), 100);
        assert!(!c.ego_enabled());
        assert!(!c.oil_prot_enabled());
    }

    #[test]
    fn ignition_defaults_decode() {
        let c = IgnitionConfig::defaults();
        assert_eq!(c.trigger_pattern(), TriggerPattern::MissingTooth);
        assert_eq!(c.trigger_teeth(), 36);
        assert_eq!(c.trigger_missing(), 1);
        assert_eq!(c.trigger_edge(), TriggerEdge::Both);
        assert_eq!(c.dwell_run_us(), 3_000);
        assert_eq!(c.dwell_crank_us(), 4_000);
        assert_eq!(c.crank_advance(), 10);
        assert_eq!(c.rev_limit_rpm(), 60);
        assert_eq!(c.clt_adv_value(3), -2);
        assert_eq!(c.protect_cut_mask(), cut::FUEL | cut::SPARK);
    }

    #[test]
    fn byte_writes_round_trip_including_spare() {
        let mut c = FuelConfig::defaults();
        assert!(c.write_byte(2, 0x34));
        assert!(c.write_byte(3, 0x12));
        assert_eq!(c.req_fuel_us(), 0x1234);
        // Spare region holds arbitrary bytes.
        assert!(c.write_byte(127, 0xAB));
        assert_eq!(c.read_byte(127), Some(0xAB));
        assert!(!c.write_byte(128, 0));
        assert_eq!(c.read_byte(128), None);
    }
}
