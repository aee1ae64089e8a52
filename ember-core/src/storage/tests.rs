use super::*;
use std::vec;
use std::vec::Vec;

struct MockEeprom {
    bytes: Vec<u8>,
    writes: usize,
}

impl MockEeprom {
    fn blank() -> Self {
        Self {
            bytes: vec![0xFF; 2048],
            writes: 0,
        }
    }
}

impl Eeprom for MockEeprom {
    fn read(&self, addr: u16) -> u8 {
        self.bytes[addr as usize]
    }
    fn write(&mut self, addr: u16, value: u8) {
        self.bytes[addr as usize] = value;
        self.writes += 1;
    }
    fn capacity(&self) -> u16 {
        self.bytes.len() as u16
    }
}

#[test]
fn layout_fits_declared_size() {
    assert!(REQUIRED_SIZE <= 1_280);
    assert_eq!(layout::VE_AXIS_X, 266);
    assert_eq!(layout::CONFIG_FUEL, 618);
    assert_eq!(layout::AFR_AXIS_Y, 1_162);
}

#[test]
fn blank_store_gets_defaults_written_back() {
    let mut eeprom = MockEeprom::blank();
    let mut cal = Calibration::new();

    assert!(init(&mut eeprom, &mut cal));
    assert_eq!(eeprom.read(layout::VERSION), DATA_VERSION);

    // Second boot loads instead of defaulting.
    let mut cal2 = Calibration::new();
    cal2.fuel.write_byte(0, 99); // would be overwritten by the load
    assert!(!init(&mut eeprom, &mut cal2));
    assert_eq!(cal2.fuel.n_cylinders(), 4);
}

#[test]
fn image_round_trips_tables_and_configs() {
    let mut eeprom = MockEeprom::blank();
    let mut cal = Calibration::new();
    cal.write_page(2, 17, &[60, 65, 70]).unwrap();
    cal.write_page(3, 0, &[35]).unwrap(); // -5 deg cell
    cal.write_page(1, 2, &[0x88, 0x13]).unwrap(); // reqFuel 5000
    cal.write_page(5, 5, &[130]).unwrap();
    save_all(&mut eeprom, &cal);

    let mut loaded = Calibration::new();
    load_all(&eeprom, &mut loaded);
    assert_eq!(loaded.ve_table.values[1][1], 60);
    assert_eq!(loaded.ve_table.values[1][3], 70);
    assert_eq!(loaded.ign_table.values[0][0] as i8, -5);
    assert_eq!(loaded.fuel.req_fuel_us(), 5_000);
    assert_eq!(loaded.afr_table.values[0][5], 130);
    assert_eq!(loaded.ve_table.axis_x, cal.ve_table.axis_x);
    assert_eq!(loaded.ign_table.axis_y, cal.ign_table.axis_y);
}

#[test]
fn unchanged_bytes_are_not_rewritten() {
    let mut eeprom = MockEeprom::blank();
    let cal = Calibration::new();
    save_all(&mut eeprom, &cal);
    let first_pass = eeprom.writes;
    assert!(first_pass > 0);

    save_all(&mut eeprom, &cal);
    assert_eq!(eeprom.writes, first_pass);
}

#[test]
fn single_cell_change_writes_one_byte() {
    let mut eeprom = MockEeprom::blank();
    let mut cal = Calibration::new();
    save_all(&mut eeprom, &cal);
    let baseline = eeprom.writes;

    cal.write_page(2, 40, &[123]).unwrap();
    save_all(&mut eeprom, &cal);
    assert_eq!(eeprom.writes, baseline + 1);
}
