//! Engine protection latches: over-rev and low oil pressure.

use crate::config::{FuelConfig, IgnitionConfig};
use crate::status::EngineSnapshot;
use crate::types::protect;

/// Latch state for both protections, serviced at 15 Hz.
pub struct ProtectionSupervisor {
    rpm_latched: bool,
    oil_latched: bool,
    oil_low_ticks: u8,
}

impl ProtectionSupervisor {
    pub const fn new() -> Self {
        Self {
            rpm_latched: false,
            oil_latched: false,
            oil_low_ticks: 0,
        }
    }

    /// Recompute the latches and return the protection status bitfield.
    pub fn service(
        &mut self,
        snap: &EngineSnapshot,
        fuel_cfg: &FuelConfig,
        ign_cfg: &IgnitionConfig,
    ) -> u8 {
        let mut mask = 0;

        if ign_cfg.protect_enabled() && ign_cfg.protect_rpm() > 0 {
            let limit = ign_cfg.protect_rpm() as u16 * 100;
            let hyst = ign_cfg.protect_rpm_hysteresis() as u16 * 100;
            let release = limit.saturating_sub(hyst);

            if self.rpm_latched {
                if snap.rpm <= release {
                    self.rpm_latched = false;
                }
            } else if snap.rpm >= limit {
                self.rpm_latched = true;
            }
        } else {
            self.rpm_latched = false;
        }
        if self.rpm_latched {
            mask |= protect::OVERREV;
        }

        if fuel_cfg.oil_prot_enabled() && fuel_cfg.oil_prot_threshold() > 0 {
            let threshold = fuel_cfg.oil_prot_threshold();
            let release = (threshold as u16 + fuel_cfg.oil_prot_hysteresis() as u16).min(250) as u8;
            let delay = fuel_cfg.oil_prot_delay().max(1);

            if self.oil_latched {
                if snap.oil_pressure > release {
                    self.oil_latched = false;
                    self.oil_low_ticks = 0;
                }
            } else if snap.oil_pressure <= threshold {
                self.oil_low_ticks = self.oil_low_ticks.saturating_add(1);
                if self.oil_low_ticks >= delay {
                    self.oil_latched = true;
                }
            } else {
                self.oil_low_ticks = 0;
            }
        } else {
            self.oil_latched = false;
            self.oil_low_ticks = 0;
        }
        if self.oil_latched {
            mask |= protect::OILLOW;
        }

        mask
    }
}

impl Default for ProtectionSupervisor {
    fn default() -> Self {
        Self::new()
    }
}
