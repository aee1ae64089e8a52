//! The calibration store: every tunable byte the host tool can address,
//! organized as numbered pages.
//!
//! Pages are typed views, not raw memory: struct pages serve their record
//! bytes, table pages dispatch each offset to a cell, an X-axis bin or a
//! Y-axis bin with the wire encodings applied on the way through. Offsets
//! the firmware does not use are still readable (as zero) so the host tool
//! can walk entire pages.

use crate::config::{FuelConfig, IgnitionConfig, CONFIG_PAGE_SIZE};
use crate::crc::Crc32;
use crate::defaults;
use crate::tables::{Table3d, TABLE_DIM};

pub const PAGE_COUNT: u8 = 16;

/// Cells come first, then the RPM bins, then the MAP bins.
const TABLE_CELLS: u16 = (TABLE_DIM * TABLE_DIM) as u16;
const TABLE_AXIS_LEN: u16 = TABLE_DIM as u16;
pub const TABLE_PAGE_SIZE: u16 = TABLE_CELLS + 2 * TABLE_AXIS_LEN;

/// Wire size of each page. Entry 0 is reserved; pages without firmware
/// backing keep their published size for host-tool compatibility.
const PAGE_SIZES: [u16; PAGE_COUNT as usize] = [
    0,
    CONFIG_PAGE_SIZE,
    TABLE_PAGE_SIZE,
    TABLE_PAGE_SIZE,
    CONFIG_PAGE_SIZE,
    TABLE_PAGE_SIZE,
    128,
    240,
    384,
    192,
    192,
    288,
    192,
    128,
    288,
    256,
];

pub fn page_size(page: u8) -> u16 {
    if page >= PAGE_COUNT {
        return 0;
    }
    PAGE_SIZES[page as usize]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PageError {
    /// Unknown page, or offset+length exceeds the page.
    OutOfRange,
}

enum WriteKind {
    Fail,
    Stored,
    TableChanged,
}

/// Ignition cells travel with a +40 bias so negative advance fits a byte.
fn encode_ign_cell(advance: i8) -> u8 {
    (advance as i16 + 40).clamp(0, 255) as u8
}

fn decode_ign_cell(wire: u8) -> i8 {
    (wire as i16 - 40).clamp(i8::MIN as i16, i8::MAX as i16) as i8
}

/// X-axis bins travel as RPM/100.
fn encode_rpm_bin(rpm: u16) -> u8 {
    (rpm / 100).min(255) as u8
}

fn decode_rpm_bin(wire: u8) -> u16 {
    wire as u16 * 100
}

/// All live calibration state.
pub struct Calibration {
    pub fuel: FuelConfig,
    pub ignition: IgnitionConfig,
    pub ve_table: Table3d,
    pub ign_table: Table3d,
    pub afr_table: Table3d,
}

impl Calibration {
    /// Compiled defaults for every page.
    pub fn new() -> Self {
        Self {
            fuel: FuelConfig::defaults(),
            ignition: IgnitionConfig::defaults(),
            ve_table: defaults::default_ve_table(),
            ign_table: defaults::default_ign_table(),
            afr_table: defaults::default_afr_table(),
        }
    }

    /// One byte of a page as it appears on the wire.
    pub fn read_page_byte(&self, page: u8, offset: u16) -> Option<u8> {
        if offset >= page_size(page) {
            return None;
        }
        match page {
            1 => self.fuel.read_byte(offset),
            2 => Some(read_table_byte(&self.ve_table, offset, false)),
            3 => Some(read_table_byte(&self.ign_table, offset, true)),
            4 => self.ignition.read_byte(offset),
            5 => Some(read_table_byte(&self.afr_table, offset, false)),
            _ => Some(0),
        }
    }

    fn write_page_byte(&mut self, page: u8, offset: u16, value: u8) -> WriteKind {
        if offset >= page_size(page) {
            return WriteKind::Fail;
        }
        match page {
            1 => {
                if self.fuel.write_byte(offset, value) {
                    WriteKind::Stored
                } else {
                    WriteKind::Fail
                }
            }
            2 => write_table_byte(&mut self.ve_table, offset, value, false),
            3 => write_table_byte(&mut self.ign_table, offset, value, true),
            4 => {
                if self.ignition.write_byte(offset, value) {
                    WriteKind::Stored
                } else {
                    WriteKind::Fail
                }
            }
            5 => write_table_byte(&mut self.afr_table, offset, value, false),
            // Published-but-unbacked pages accept writes without storage.
            _ => WriteKind::Stored,
        }
    }

    /// Byte-range write with full range validation up front. Any table byte
    /// touched invalidates every lookup cache.
    pub fn write_page(&mut self, page: u8, offset: u16, data: &[u8]) -> Result<(), PageError> {
        let size = page_size(page);
        if size == 0 || offset as u32 + data.len() as u32 > size as u32 {
            return Err(PageError::OutOfRange);
        }
        let mut table_changed = false;
        for (i, &value) in data.iter().enumerate() {
            match self.write_page_byte(page, offset + i as u16, value) {
                WriteKind::Fail => return Err(PageError::OutOfRange),
                WriteKind::TableChanged => table_changed = true,
                WriteKind::Stored => {}
            }
        }
        if table_changed {
            self.invalidate_caches();
        }
        Ok(())
    }

    pub fn invalidate_caches(&mut self) {
        self.ve_table.invalidate_cache();
        self.ign_table.invalidate_cache();
        self.afr_table.invalidate_cache();
    }

    /// CRC-32 of the whole page as transmitted byte-by-byte.
    pub fn page_crc(&self, page: u8) -> Option<u32> {
        let size = page_size(page);
        if size == 0 {
            return None;
        }
        let mut crc = Crc32::new();
        for offset in 0..size {
            crc.update(self.read_page_byte(page, offset).unwrap_or(0));
        }
        Some(crc.finish())
    }
}

impl Default for Calibration {
    fn default() -> Self {
        Self::new()
    }
}

fn read_table_byte(table: &Table3d, offset: u16, signed_cells: bool) -> u8 {
    if offset < TABLE_CELLS {
        let row = (offset / TABLE_AXIS_LEN) as usize;
        let col = (offset % TABLE_AXIS_LEN) as usize;
        let raw = table.values[row][col];
        if signed_cells {
            encode_ign_cell(raw as i8)
        } else {
            raw
        }
    } else if offset < TABLE_CELLS + TABLE_AXIS_LEN {
        encode_rpm_bin(table.axis_x[(offset - TABLE_CELLS) as usize])
    } else {
        table.axis_y[(offset - TABLE_CELLS - TABLE_AXIS_LEN) as usize]
    }
}

fn write_table_byte(table: &mut Table3d, offset: u16, value: u8, signed_cells: bool) -> WriteKind {
    if offset < TABLE_CELLS {
        let row = (offset / TABLE_AXIS_LEN) as usize;
        let col = (offset % TABLE_AXIS_LEN) as usize;
        table.values[row][col] = if signed_cells {
            decode_ign_cell(value) as u8
        } else {
            value
        };
        WriteKind::TableChanged
    } else if offset < TABLE_CELLS + TABLE_AXIS_LEN {
        table.axis_x[(offset - TABLE_CELLS) as usize] = decode_rpm_bin(value);
        WriteKind::TableChanged
    } else if offset < TABLE_PAGE_SIZE {
        table.axis_y[(offset - TABLE_CELLS - TABLE_AXIS_LEN) as usize] = value;
        WriteKind::TableChanged
    } else {
        WriteKind::Fail
    }
}
