//! Persistent calibration image.
//!
//! A single linear byte store holds a version byte, the three maps and both
//! config pages. A version mismatch on boot loads compiled defaults and
//! writes the image back. Every byte write is compare-first to spare the
//! part's write endurance.

use crate::calibration::Calibration;
use crate::config::{FuelConfig, IgnitionConfig};
use crate::hal::Eeprom;
use crate::tables::{Table3d, TABLE_DIM};

pub const DATA_VERSION: u8 = 1;

/// Image layout. Tables are cells, then X axis (u16 LE), then Y axis.
pub mod layout {
    pub const VERSION: u16 = 0;
    pub const VE_TABLE: u16 = 10;
    pub const VE_AXIS_X: u16 = VE_TABLE + 256;
    pub const VE_AXIS_Y: u16 = VE_AXIS_X + 32;
    pub const IGN_TABLE: u16 = VE_AXIS_Y + 16;
    pub const IGN_AXIS_X: u16 = IGN_TABLE + 256;
    pub const IGN_AXIS_Y: u16 = IGN_AXIS_X + 32;
    pub const CONFIG_FUEL: u16 = IGN_AXIS_Y + 16;
    pub const CONFIG_IGN: u16 = CONFIG_FUEL + 128;
    pub const AFR_TABLE: u16 = CONFIG_IGN + 128;
    pub const AFR_AXIS_X: u16 = AFR_TABLE + 256;
    pub const AFR_AXIS_Y: u16 = AFR_AXIS_X + 32;
    pub const END: u16 = AFR_AXIS_Y + 16;
}

/// Minimum store capacity for the full image.
pub const REQUIRED_SIZE: u16 = layout::END;

fn write_byte(eeprom: &mut impl Eeprom, addr: u16, value: u8) {
    if eeprom.read(addr) != value {
        eeprom.write(addr, value);
    }
}

fn save_table(eeprom: &mut impl Eeprom, base: u16, table: &Table3d) {
    let mut addr = base;
    for row in table.values.iter() {
        for &cell in row.iter() {
            write_byte(eeprom, addr, cell);
            addr += 1;
        }
    }
    for &bin in table.axis_x.iter() {
        let bytes = bin.to_le_bytes();
        write_byte(eeprom, addr, bytes[0]);
        write_byte(eeprom, addr + 1, bytes[1]);
        addr += 2;
    }
    for &bin in table.axis_y.iter() {
        write_byte(eeprom, addr, bin);
        addr += 1;
    }
}

fn load_table(eeprom: &impl Eeprom, base: u16, table: &mut Table3d) {
    let mut addr = base;
    for row in 0..TABLE_DIM {
        for col in 0..TABLE_DIM {
            table.values[row][col] = eeprom.read(addr);
            addr += 1;
        }
    }
    for bin in table.axis_x.iter_mut() {
        *bin = u16::from_le_bytes([eeprom.read(addr), eeprom.read(addr + 1)]);
        addr += 2;
    }
    for bin in table.axis_y.iter_mut() {
        *bin = eeprom.read(addr);
        addr += 1;
    }
    table.invalidate_cache();
}

fn save_raw(eeprom: &mut impl Eeprom, base: u16, raw: &[u8; 128]) {
    for (i, &b) in raw.iter().enumerate() {
        write_byte(eeprom, base + i as u16, b);
    }
}

fn load_raw(eeprom: &impl Eeprom, base: u16) -> [u8; 128] {
    let mut raw = [0u8; 128];
    for (i, b) in raw.iter_mut().enumerate() {
        *b = eeprom.read(base + i as u16);
    }
    raw
}

/// Persist the whole calibration, version byte last.
pub fn save_all(eeprom: &mut impl Eeprom, cal: &Calibration) {
    save_table(eeprom, layout::VE_TABLE, &cal.ve_table);
    save_table(eeprom, layout::IGN_TABLE, &cal.ign_table);
    save_raw(eeprom, layout::CONFIG_FUEL, cal.fuel.raw());
    save_raw(eeprom, layout::CONFIG_IGN, cal.ignition.raw());
    save_table(eeprom, layout::AFR_TABLE, &cal.afr_table);
    write_byte(eeprom, layout::VERSION, DATA_VERSION);
}

/// Overwrite the live calibration from the stored image.
pub fn load_all(eeprom: &impl Eeprom, cal: &mut Calibration) {
    load_table(eeprom, layout::VE_TABLE, &mut cal.ve_table);
    load_table(eeprom, layout::IGN_TABLE, &mut cal.ign_table);
    cal.fuel = FuelConfig::from_raw(load_raw(eeprom, layout::CONFIG_FUEL));
    cal.ignition = IgnitionConfig::from_raw(load_raw(eeprom, layout::CONFIG_IGN));
    load_table(eeprom, layout::AFR_TABLE, &mut cal.afr_table);
}

/// Boot-time load. Returns true when the store was stale and compiled
/// defaults were written back.
pub fn init(eeprom: &mut impl Eeprom, cal: &mut Calibration) -> bool {
    if eeprom.read(layout::VERSION) != DATA_VERSION {
        crate::info!("calibration store stale, writing defaults");
        *cal = Calibration::new();
        save_all(eeprom, cal);
        true
    } else {
        load_all(eeprom, cal);
        false
    }
}

#[cfg(test)]
mod tests;
