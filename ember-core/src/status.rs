//! The live engine snapshot shared between the main loop, the interrupt
//! handlers and the tuner protocol.

/// One coherent view of everything the unit currently knows about the
/// engine. A single instance lives inside [`crate::ecu::Ecu`] behind a
/// [`crate::datacells::DataCell`]; readers always get a consistent copy.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EngineSnapshot {
    pub rpm: u16,
    /// Duration of the last crank revolution in microseconds; 0 without sync.
    pub revolution_time_us: u32,
    pub has_sync: bool,
    /// Bitfield of [`crate::types::engine`] flags.
    pub engine: u8,
    /// Bitfield of [`crate::types::protect`] flags.
    pub protection: u8,

    /// Manifold pressure in kPa.
    pub map_kpa: u8,
    /// Throttle position, 0-100 %.
    pub tps: u8,
    pub coolant_c: i8,
    pub iat_c: i8,
    /// Narrowband O2 on a 0-200 scale, 100 ≈ stoichiometric.
    pub o2: u8,
    /// Battery voltage in deci-volts (145 = 14.5 V).
    pub battery_dv: u8,
    /// Oil pressure, 0-250 scale (4 kPa per count).
    pub oil_pressure: u8,
    /// Fuel pressure, same scale as oil.
    pub fuel_pressure: u8,
    /// Current AFR target from the target table, 0-200 scale.
    pub afr_target: u8,

    /// Throttle rate of change in %/s.
    pub tps_dot: i16,
    pub tps_last: u8,

    /// Injector pulse widths in microseconds, per channel.
    pub pw1: u16,
    pub pw2: u16,
    pub pw3: u16,
    /// Volumetric efficiency from the fuel map, percent.
    pub ve: u8,
    /// Total fuel correction, percent of base.
    pub corrections: u16,
    /// Ignition advance in degrees BTDC.
    pub advance: i8,
    /// Coil dwell in microseconds.
    pub dwell: u16,

    // Individual correction terms, exported for tuning.
    pub wue_pct: u8,
    pub ase_pct: u8,
    pub ae_pct: u8,
    pub clt_pct: u8,
    pub bat_pct: u8,
    pub ego_pct: u8,

    /// Seconds since power-on.
    pub secl: u32,
    /// Seconds with the engine turning.
    pub run_secs: u32,
    pub ignition_count: u16,
    pub loop_count: u32,
    pub loops_per_sec: u16,
    pub free_ram: u16,
}

impl EngineSnapshot {
    pub const fn new() -> Self {
        Self {
            rpm: 0,
            revolution_time_us: 0,
            has_sync: false,
            engine: 0,
            protection: 0,
            map_kpa: 100,
            tps: 0,
            coolant_c: 20,
            iat_c: 20,
            o2: 100,
            battery_dv: 125,
            oil_pressure: 0,
            fuel_pressure: 0,
            afr_target: 100,
            tps_dot: 0,
            tps_last: 0,
            pw1: 0,
            pw2: 0,
            pw3: 0,
            ve: 0,
            corrections: 100,
            advance: 0,
            dwell: 0,
            wue_pct: 100,
            ase_pct: 100,
            ae_pct: 0,
            clt_pct: 100,
            bat_pct: 100,
            ego_pct: 100,
            secl: 0,
            run_secs: 0,
            ignition_count: 0,
            loop_count: 0,
            loops_per_sec: 0,
            free_ram: 0,
        }
    }

    #[inline]
    pub fn engine_flag(&self, flag: u8) -> bool {
        self.engine & flag != 0
    }

    #[inline]
    pub fn set_engine_flag(&mut self, flag: u8, on: bool) {
        if on {
            self.engine |= flag;
        } else {
            self.engine &= !flag;
        }
    }
}

impl Default for EngineSnapshot {
    fn default() -> Self {
        Self::new()
    }
}
