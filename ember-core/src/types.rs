//! Shared constants, status bitfields and small enums.

/// Engine status flags, serialized verbatim into live data offset 2.
pub mod engine {
    pub const CRANK: u8 = 1 << 0;
    pub const RUN: u8 = 1 << 1;
    pub const ASE: u8 = 1 << 2;
    pub const WARMUP: u8 = 1 << 3;
    pub const ACCEL: u8 = 1 << 4;
    pub const DECEL: u8 = 1 << 5;
}

/// Protection latch flags.
pub mod protect {
    pub const OVERREV: u8 = 1 << 0;
    pub const OILLOW: u8 = 1 << 1;
}

/// Protection cut mask, as stored in the ignition config page.
pub mod cut {
    pub const FUEL: u8 = 1 << 0;
    pub const SPARK: u8 = 1 << 1;
}

pub const MICROS_PER_MIN: u32 = 60_000_000;

/// RPM ceiling; anything above is clamped.
pub const RPM_MAX: u16 = 15_000;
/// Below this the engine is reported as stopped.
pub const RPM_FLOOR: u16 = 100;

/// Injector pulse-width limits in microseconds.
pub const INJ_MIN_PW: u16 = 500;
pub const INJ_MAX_PW: u16 = 20_000;

/// Crank angle at which injection is scheduled (degrees after the reference
/// tooth). 270° leaves room for the pulse to finish before TDC at the pulse
/// widths this unit produces.
pub const INJECTION_ANGLE: u16 = 270;

/// Ignition advance limits in degrees BTDC.
pub const IGN_MIN_ADVANCE: i8 = -10;
pub const IGN_MAX_ADVANCE: i8 = 45;

/// Coil dwell limits in microseconds.
pub const DWELL_MIN: u16 = 1_000;
pub const DWELL_MAX: u16 = 8_000;

/// Total fuel-correction limits, percent of base.
pub const CORR_MIN: u16 = 50;
pub const CORR_MAX: u16 = 200;

/// Coolant temperature below which the WARMUP flag is held.
pub const WARMUP_TEMP_C: i8 = 60;

/// No qualifying trigger edge for this long clears sync.
pub const SYNC_TIMEOUT_US: u32 = 1_000_000;

/// Crank trigger arrangement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TriggerPattern {
    /// N evenly spaced teeth with M omitted, one gap per revolution.
    #[default]
    MissingTooth,
    /// One pulse per revolution.
    BasicDistributor,
}

impl TriggerPattern {
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            1 => TriggerPattern::BasicDistributor,
            _ => TriggerPattern::MissingTooth,
        }
    }

    pub const fn to_raw(self) -> u8 {
        match self {
            TriggerPattern::MissingTooth => 0,
            TriggerPattern::BasicDistributor => 1,
        }
    }
}

/// Which edges of the trigger signal fire the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TriggerEdge {
    Rising,
    Falling,
    /// Both edges; each physical tooth produces two pulses.
    #[default]
    Both,
}

impl TriggerEdge {
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            0 => TriggerEdge::Rising,
            1 => TriggerEdge::Falling,
            _ => TriggerEdge::Both,
        }
    }

    pub const fn to_raw(self) -> u8 {
        match self {
            TriggerEdge::Rising => 0,
            TriggerEdge::Falling => 1,
            TriggerEdge::Both => 2,
        }
    }

    /// Pulses seen per physical tooth.
    pub const fn pulses_per_tooth(self) -> u8 {
        match self {
            TriggerEdge::Both => 2,
            _ => 1,
        }
    }
}
