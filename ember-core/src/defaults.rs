//! Compiled default calibration maps, loaded on first boot or when the
//! stored image version does not match.

use crate::tables::{Table3d, TABLE_DIM};

/// Shared RPM axis for all maps.
pub const DEFAULT_AXIS_RPM: [u16; TABLE_DIM] = [
    500, 1000, 1500, 2000, 2500, 3000, 3500, 4000, 4500, 5000, 5500, 6000, 6500, 7000, 7500, 8000,
];

/// Shared MAP axis (kPa) for all maps.
pub const DEFAULT_AXIS_MAP: [u8; TABLE_DIM] = [
    20, 30, 40, 50, 60, 70, 80, 90, 100, 110, 120, 130, 140, 150, 160, 170,
];

/// Conservative first-start VE map: low 50s at idle loads rising toward
/// ~100 at full load. Meant to be tuned, not driven.
pub const DEFAULT_VE_TABLE: [[u8; TABLE_DIM]; TABLE_DIM] = [
    [45, 47, 50, 51, 52, 53, 54, 55, 55, 56, 57, 58, 59, 60, 61, 62],
    [47, 50, 52, 53, 54, 55, 56, 57, 58, 59, 60, 62, 63, 64, 65, 66],
    [50, 52, 54, 56, 57, 58, 59, 60, 61, 62, 64, 65, 66, 68, 69, 69],
    [52, 54, 57, 59, 60, 62, 63, 64, 65, 67, 68, 69, 71, 72, 73, 74],
    [54, 57, 59, 61, 63, 65, 66, 68, 70, 71, 73, 74, 75, 77, 78, 79],
    [57, 59, 61, 64, 66, 68, 70, 71, 73, 75, 76, 78, 79, 80, 82, 83],
    [59, 61, 64, 66, 68, 71, 73, 74, 76, 78, 79, 81, 82, 84, 85, 86],
    [61, 64, 66, 68, 71, 73, 75, 77, 79, 81, 83, 85, 86, 87, 89, 90],
    [64, 66, 68, 71, 73, 75, 78, 80, 82, 84, 86, 88, 90, 91, 92, 93],
    [66, 68, 71, 73, 75, 78, 80, 82, 85, 87, 89, 91, 93, 94, 95, 96],
    [68, 71, 73, 75, 78, 80, 82, 85, 87, 89, 92, 94, 95, 96, 97, 98],
    [71, 73, 75, 77, 80, 82, 84, 87, 89, 91, 94, 96, 97, 98, 99, 100],
    [73, 75, 77, 79, 81, 83, 86, 88, 90, 92, 95, 97, 98, 99, 100, 101],
    [75, 77, 78, 80, 82, 84, 87, 89, 91, 93, 96, 98, 99, 100, 101, 102],
    [77, 78, 79, 81, 83, 85, 88, 90, 92, 95, 97, 99, 100, 101, 102, 104],
    [78, 79, 80, 82, 84, 87, 89, 91, 94, 96, 98, 100, 101, 102, 104, 105],
];

/// Default spark map in degrees BTDC: more advance at light load and high
/// revs, pulled back as load rises.
pub const DEFAULT_IGN_TABLE: [[i8; TABLE_DIM]; TABLE_DIM] = [
    [15, 16, 18, 20, 21, 23, 25, 27, 29, 30, 31, 32, 33, 34, 35, 36],
    [14, 15, 16, 18, 20, 21, 23, 25, 27, 29, 29, 30, 31, 32, 33, 34],
    [12, 14, 15, 16, 18, 20, 21, 23, 25, 27, 28, 29, 29, 30, 31, 32],
    [11, 12, 14, 15, 16, 18, 20, 21, 23, 25, 26, 27, 28, 29, 29, 30],
    [10, 11, 12, 14, 15, 16, 18, 20, 21, 23, 24, 25, 26, 27, 28, 29],
    [9, 10, 11, 12, 14, 15, 16, 18, 20, 21, 22, 23, 24, 25, 26, 27],
    [8, 9, 10, 11, 12, 14, 15, 16, 18, 19, 20, 21, 22, 23, 24, 25],
    [7, 8, 9, 10, 11, 12, 14, 15, 16, 18, 19, 19, 20, 21, 22, 23],
    [7, 7, 8, 9, 10, 11, 12, 14, 15, 16, 17, 18, 19, 20, 21, 22],
    [6, 7, 8, 9, 10, 10, 11, 13, 14, 15, 16, 17, 18, 19, 20, 21],
    [5, 6, 7, 8, 9, 10, 11, 12, 14, 15, 16, 17, 18, 18, 19, 20],
    [5, 6, 7, 8, 9, 10, 10, 12, 13, 14, 15, 16, 17, 18, 19, 20],
    [4, 5, 6, 7, 8, 9, 10, 11, 13, 14, 15, 16, 17, 18, 18, 19],
    [4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19],
    [3, 4, 5, 6, 7, 8, 9, 10, 12, 13, 14, 15, 16, 17, 18, 18],
    [3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18],
];

pub fn default_ve_table() -> Table3d {
    Table3d::from_parts(false, DEFAULT_VE_TABLE, DEFAULT_AXIS_RPM, DEFAULT_AXIS_MAP)
}

pub fn default_ign_table() -> Table3d {
    let mut values = [[0u8; TABLE_DIM]; TABLE_DIM];
    for (r, row) in DEFAULT_IGN_TABLE.iter().enumerate() {
        for (c, &v) in row.iter().enumerate() {
            values[r][c] = v as u8;
        }
    }
    Table3d::from_parts(true, values, DEFAULT_AXIS_RPM, DEFAULT_AXIS_MAP)
}

/// Flat stoichiometric target until tuned.
pub fn default_afr_table() -> Table3d {
    Table3d::from_parts(
        false,
        [[100u8; TABLE_DIM]; TABLE_DIM],
        DEFAULT_AXIS_RPM,
        DEFAULT_AXIS_MAP,
    )
}
