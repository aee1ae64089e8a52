//! Sensor intake: first-order IIR filtering, calibration scaling and the
//! throttle rate estimate.
//!
//! Channels are grouped by update rate: MAP and TPS at 1 kHz, O2 and the
//! pressure senders at 30 Hz, temperatures and battery at 4 Hz.

use crate::config::FuelConfig;
use crate::hal::AnalogInputs;
use crate::status::EngineSnapshot;

/// Filter constants for the channels without a configurable alpha. Higher
/// means heavier filtering.
const FILTER_O2: u8 = 128;
const FILTER_BAT: u8 = 128;
const FILTER_OIL_PRESS: u8 = 100;
const FILTER_FUEL_PRESS: u8 = 100;

const ADC_VREF_MV: u32 = 5_000;
/// Battery divider ratio x100 (10k : 1k5).
const BAT_MULTIPLIER: u32 = 767;

/// TPS rate is measured across windows of at least this long; per-sample
/// deltas at the fast rate would quantize to multiples of 1000 %/s.
const TPS_DOT_WINDOW_US: u32 = 25_000;

/// `y = (x * (256 - alpha) + y_prev * alpha) >> 8`
#[inline]
pub fn iir(input: u16, prev: u16, alpha: u8) -> u16 {
    ((input as u32 * (256 - alpha as u32) + prev as u32 * alpha as u32) >> 8) as u16
}

/// Linear range mapping onto an ascending output range; safe on a
/// degenerate input range.
pub fn scale(x: u16, in_min: u16, in_max: u16, out_min: u16, out_max: u16) -> u16 {
    if in_max <= in_min || out_max < out_min {
        return out_min;
    }
    let x = x.clamp(in_min, in_max);
    let num = (x - in_min) as u32 * (out_max - out_min) as u32;
    out_min + (num / (in_max - in_min) as u32) as u16
}

/// Filter state and TPS history. Owned by the main loop; only the decoded
/// physical values land in the shared snapshot.
pub struct Sensors {
    map_adc: u16,
    tps_adc: u16,
    o2_adc: u16,
    bat_adc: u16,
    oil_adc: u16,
    fuel_adc: u16,
    last_tps_us: u32,
}

impl Sensors {
    pub const fn new() -> Self {
        Self {
            map_adc: 0,
            tps_adc: 0,
            o2_adc: 0,
            bat_adc: 0,
            oil_adc: 0,
            fuel_adc: 0,
            last_tps_us: 0,
        }
    }

    /// One unfiltered pass to seed every channel at boot.
    pub fn prime(
        &mut self,
        adc: &impl AnalogInputs,
        snap: &mut EngineSnapshot,
        cfg: &FuelConfig,
        now_us: u32,
    ) {
        self.map_adc = adc.map_raw();
        self.tps_adc = adc.tps_raw();
        self.o2_adc = adc.o2_raw();
        self.bat_adc = adc.battery_raw();
        self.oil_adc = adc.oil_pressure_raw();
        self.fuel_adc = adc.fuel_pressure_raw();
        self.last_tps_us = now_us;

        self.decode_map(snap, cfg);
        self.decode_tps(snap, cfg);
        snap.tps_last = snap.tps;
        snap.tps_dot = 0;
        self.decode_o2(snap);
        self.decode_battery(snap);
        self.decode_pressures(snap);
        snap.coolant_c = adc.coolant_celsius();
        snap.iat_c = adc.intake_air_celsius();
    }

    /// 1 kHz channels: manifold pressure, throttle and its rate.
    pub fn read_fast(
        &mut self,
        adc: &impl AnalogInputs,
        snap: &mut EngineSnapshot,
        cfg: &FuelConfig,
        now_us: u32,
    ) {
        self.map_adc = iir(adc.map_raw(), self.map_adc, cfg.map_filter());
        self.decode_map(snap, cfg);

        self.tps_adc = iir(adc.tps_raw(), self.tps_adc, cfg.tps_filter());
        self.decode_tps(snap, cfg);

        let delta_us = now_us.wrapping_sub(self.last_tps_us);
        if delta_us >= TPS_DOT_WINDOW_US {
            snap.tps_dot = tps_rate(snap.tps, snap.tps_last, delta_us);
            snap.tps_last = snap.tps;
            self.last_tps_us = now_us;
        }
    }

    /// 30 Hz channels: lambda and the pressure senders.
    pub fn read_medium(&mut self, adc: &impl AnalogInputs, snap: &mut EngineSnapshot) {
        self.o2_adc = iir(adc.o2_raw(), self.o2_adc, FILTER_O2);
        self.decode_o2(snap);

        self.oil_adc = iir(adc.oil_pressure_raw(), self.oil_adc, FILTER_OIL_PRESS);
        self.fuel_adc = iir(adc.fuel_pressure_raw(), self.fuel_adc, FILTER_FUEL_PRESS);
        self.decode_pressures(snap);
    }

    /// 4 Hz channels: temperatures and battery voltage.
    pub fn read_slow(&mut self, adc: &impl AnalogInputs, snap: &mut EngineSnapshot) {
        snap.coolant_c = adc.coolant_celsius();
        snap.iat_c = adc.intake_air_celsius();

        self.bat_adc = iir(adc.battery_raw(), self.bat_adc, FILTER_BAT);
        self.decode_battery(snap);
    }

    fn decode_map(&self, snap: &mut EngineSnapshot, cfg: &FuelConfig) {
        let kpa = scale(
            self.map_adc,
            0,
            1023,
            cfg.map_min_kpa() as u16,
            cfg.map_max_kpa() as u16,
        );
        snap.map_kpa = kpa.clamp(10, 255) as u8;
    }

    fn decode_tps(&self, snap: &mut EngineSnapshot, cfg: &FuelConfig) {
        let adc8 = (self.tps_adc >> 2) as u8;
        snap.tps = if adc8 <= cfg.tps_min() {
            0
        } else if adc8 >= cfg.tps_max() {
            100
        } else {
            scale(adc8 as u16, cfg.tps_min() as u16, cfg.tps_max() as u16, 0, 100) as u8
        };
    }

    fn decode_o2(&self, snap: &mut EngineSnapshot) {
        let mv = (self.o2_adc as u32 * ADC_VREF_MV / 1024).min(1_000);
        snap.o2 = (mv * 200 / 1_000) as u8;
    }

    fn decode_battery(&self, snap: &mut EngineSnapshot) {
        // Pin millivolts scaled back through the divider, in deci-volts.
        let dv = self.bat_adc as u32 * ADC_VREF_MV * BAT_MULTIPLIER / (1024 * 10_000);
        snap.battery_dv = dv.min(255) as u8;
    }

    fn decode_pressures(&self, snap: &mut EngineSnapshot) {
        snap.oil_pressure = scale(self.oil_adc, 0, 1023, 0, 250) as u8;
        snap.fuel_pressure = scale(self.fuel_adc, 0, 1023, 0, 250) as u8;
    }
}

impl Default for Sensors {
    fn default() -> Self {
        Self::new()
    }
}

/// Throttle rate of change in %/s from two samples `delta_us` apart.
pub fn tps_rate(current: u8, last: u8, delta_us: u32) -> i16 {
    if delta_us == 0 {
        return 0;
    }
    let delta = current as i32 - last as i32;
    let rate = delta * 1_000_000 / delta_us as i32;
    rate.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}
