//! Software-in-the-loop bench for the Ember core.
//!
//! Simulates a four-cylinder engine with a 36-1 crank wheel through a
//! scripted run: cranking, catch, warm idle, a throttle stab up to 3000 RPM.
//! The core executes exactly as on hardware - trigger edges and compare
//! matches arrive as calls into the same entry points the firmware ISRs
//! use - and the tuner link is exercised over a loopback at the end.

use std::collections::VecDeque;

use ember_core::hal::{
    AnalogInputs, Auxiliaries, Clock, CompareChannel, Eeprom, EventTimer, OutputDriver, Platform,
    TunerLink,
};
use ember_core::scheduler::TIMER_TICK_US;
use ember_core::types::engine;
use ember_core::{Ecu, EcuRunner, EngineSnapshot};
use static_cell::StaticCell;

// Links the std critical-section implementation the core's mutexes need.
use critical_section as _;

const STEP_US: u32 = 16;
const SIM_SECONDS: u32 = 12;

struct SimClock {
    us: u32,
}

impl Clock for SimClock {
    fn now_us(&self) -> u32 {
        self.us
    }
    fn now_ms(&self) -> u32 {
        self.us / 1_000
    }
}

struct SimTimer {
    count: u16,
    compare: [Option<u16>; 2],
}

impl EventTimer for SimTimer {
    fn count(&self) -> u16 {
        self.count
    }
    fn set_compare(&mut self, channel: CompareChannel, value: u16) {
        self.compare[channel as usize] = Some(value);
    }
}

#[derive(Default)]
struct SimOutputs {
    injector_open: [bool; 3],
    coil_charging: [bool; 3],
    injections: u32,
    sparks: u32,
}

impl OutputDriver for SimOutputs {
    fn injector_open(&mut self, idx: u8) {
        if !self.injector_open[idx as usize] {
            self.injections += 1;
        }
        self.injector_open[idx as usize] = true;
    }
    fn injector_close(&mut self, idx: u8) {
        self.injector_open[idx as usize] = false;
    }
    fn coil_begin_charge(&mut self, idx: u8) {
        self.coil_charging[idx as usize] = true;
    }
    fn coil_end_charge(&mut self, idx: u8) {
        if self.coil_charging[idx as usize] {
            self.sparks += 1;
        }
        self.coil_charging[idx as usize] = false;
    }
}

/// Engine plant model: commanded speed and the sensor values it implies,
/// inverted back into raw ADC counts.
struct SimEngine {
    rpm: u32,
    map_kpa: u8,
    tps_pct: u8,
    coolant_c: f32,
}

impl SimEngine {
    fn new() -> Self {
        Self {
            rpm: 0,
            map_kpa: 95,
            tps_pct: 0,
            coolant_c: 20.0,
        }
    }

    /// Scripted profile: crank, catch to idle, stab to 3000.
    fn update(&mut self, t_s: u32) {
        match t_s {
            0..=1 => {
                self.rpm = 300;
                self.map_kpa = 95;
                self.tps_pct = 0;
            }
            2..=5 => {
                self.rpm = 900;
                self.map_kpa = 40;
                self.tps_pct = 2;
            }
            6..=8 => {
                self.rpm = (self.rpm + 700).min(3_000);
                self.map_kpa = 60;
                self.tps_pct = 25;
            }
            _ => {
                self.rpm = 3_000;
                self.map_kpa = 55;
                self.tps_pct = 20;
            }
        }
    }

    /// 4 C/s of warm-up while the engine turns.
    fn warm(&mut self) {
        if self.rpm >= 400 && self.coolant_c < 90.0 {
            self.coolant_c += 4.0 * STEP_US as f32 / 1_000_000.0;
        }
    }

    fn revolution_us(&self) -> Option<u32> {
        if self.rpm == 0 {
            None
        } else {
            Some(60_000_000 / self.rpm)
        }
    }
}

struct SimAdc<'a> {
    engine: &'a SimEngine,
}

impl AnalogInputs for SimAdc<'_> {
    fn map_raw(&self) -> u16 {
        ((self.engine.map_kpa.saturating_sub(20)) as u32 * 1_023 / 85) as u16
    }
    fn tps_raw(&self) -> u16 {
        let adc8 = 20 + self.engine.tps_pct as u32 * 215 / 100;
        (adc8 * 4) as u16
    }
    fn o2_raw(&self) -> u16 {
        102
    }
    fn battery_raw(&self) -> u16 {
        387 // ~14.4 V
    }
    fn oil_pressure_raw(&self) -> u16 {
        if self.engine.rpm > 0 { 300 } else { 40 }
    }
    fn fuel_pressure_raw(&self) -> u16 {
        600
    }
    fn coolant_celsius(&self) -> i8 {
        self.engine.coolant_c as i8
    }
    fn intake_air_celsius(&self) -> i8 {
        25
    }
}

struct SimEeprom {
    bytes: Vec<u8>,
}

impl Eeprom for SimEeprom {
    fn read(&self, addr: u16) -> u8 {
        self.bytes[addr as usize]
    }
    fn write(&mut self, addr: u16, value: u8) {
        self.bytes[addr as usize] = value;
    }
    fn capacity(&self) -> u16 {
        self.bytes.len() as u16
    }
}

struct LoopbackLink {
    rx: VecDeque<u8>,
    tx: Vec<u8>,
}

impl TunerLink for LoopbackLink {
    fn read(&mut self) -> Option<u8> {
        self.rx.pop_front()
    }
    fn write(&mut self, data: &[u8]) {
        self.tx.extend_from_slice(data);
    }
}

/// Reference auxiliary-output policies: fan hysteresis, fuel pump priming
/// and a stepped idle valve.
struct BenchAux {
    fan_on: bool,
    pump_on: bool,
    prime_until_ms: u32,
    last_turning_ms: u32,
    idle_duty: u8,
}

impl BenchAux {
    fn new() -> Self {
        Self {
            fan_on: false,
            pump_on: true,
            prime_until_ms: 2_000,
            last_turning_ms: 0,
            idle_duty: 0,
        }
    }
}

impl Auxiliaries for BenchAux {
    fn service(&mut self, snap: &EngineSnapshot, now_ms: u32) {
        // Radiator fan, 95/90 C hysteresis.
        if snap.coolant_c >= 95 && !self.fan_on {
            self.fan_on = true;
            log::info!("fan on at {} C", snap.coolant_c);
        } else if snap.coolant_c <= 90 && self.fan_on {
            self.fan_on = false;
            log::info!("fan off at {} C", snap.coolant_c);
        }

        // Fuel pump: prime, then follow the engine with a 1 s stop timeout.
        if now_ms < self.prime_until_ms {
            self.pump_on = true;
        } else if snap.rpm > 0 || snap.engine_flag(engine::CRANK) {
            self.pump_on = true;
            self.last_turning_ms = now_ms;
        } else if now_ms.wrapping_sub(self.last_turning_ms) >= 1_000 {
            if self.pump_on {
                log::info!("fuel pump off");
            }
            self.pump_on = false;
        }

        // Idle valve: step toward 850 RPM inside a 50 RPM deadband.
        if snap.tps <= 5 && snap.coolant_c >= 60 && snap.rpm > 0 {
            let error = 850 - snap.rpm as i32;
            if error.unsigned_abs() >= 50 {
                if error > 0 {
                    self.idle_duty = (self.idle_duty + 2).min(100);
                } else {
                    self.idle_duty = self.idle_duty.saturating_sub(2);
                }
            }
        }
    }
}

struct HostPlatform;

impl Platform for HostPlatform {
    fn free_ram(&self) -> u16 {
        0x7FFF
    }
}

/// Crank wheel edge source: 69 edges per revolution, reference gap four
/// intervals wide.
struct Wheel {
    next_edge_us: u32,
    position: u32,
}

impl Wheel {
    fn due(&mut self, now_us: u32, revolution_us: Option<u32>) -> bool {
        let Some(rev) = revolution_us else {
            // Stopped: park the next edge ahead of the clock.
            self.next_edge_us = now_us + 10_000;
            return false;
        };
        if now_us < self.next_edge_us {
            return false;
        }
        let interval = rev / 72;
        self.position += 1;
        self.next_edge_us += if self.position % 69 == 0 {
            interval * 4
        } else {
            interval
        };
        true
    }
}

fn frame_request(payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::new();
    frame.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    frame.extend_from_slice(payload);
    frame.extend_from_slice(&ember_core::crc::crc32(payload).to_be_bytes());
    frame
}

fn parse_response(tx: &mut Vec<u8>) -> Vec<u8> {
    assert!(tx.len() >= 7, "short response: {tx:02X?}");
    let len = u16::from_be_bytes([tx[0], tx[1]]) as usize;
    let payload = tx[2..2 + len].to_vec();
    let crc = u32::from_be_bytes([tx[2 + len], tx[3 + len], tx[4 + len], tx[5 + len]]);
    assert_eq!(crc, ember_core::crc::crc32(&payload), "response CRC");
    tx.drain(..2 + len + 4);
    payload
}

static ECU: StaticCell<Ecu> = StaticCell::new();

fn main() {
    env_logger::init();

    let ecu: &'static Ecu = ECU.init(Ecu::new());
    let mut runner = EcuRunner::new();

    let mut engine = SimEngine::new();
    let mut clock = SimClock { us: 1_000 };
    let mut timer = SimTimer {
        count: 0,
        compare: [None, None],
    };
    let mut outputs = SimOutputs::default();
    let mut eeprom = SimEeprom {
        bytes: vec![0xFF; 2_048],
    };
    let mut link = LoopbackLink {
        rx: VecDeque::new(),
        tx: Vec::new(),
    };
    let mut aux = BenchAux::new();
    let platform = HostPlatform;
    let mut wheel = Wheel {
        next_edge_us: 2_000,
        position: 0,
    };

    {
        let adc = SimAdc { engine: &engine };
        runner.boot(ecu, &clock, &adc, &mut eeprom);
    }
    println!("Ember SITL bench: 36-1 wheel, {SIM_SECONDS} s scripted run");

    let mut last_printed_s = u32::MAX;
    while clock.us < SIM_SECONDS * 1_000_000 {
        clock.us += STEP_US;
        let t_s = clock.us / 1_000_000;

        if t_s != last_printed_s {
            engine.update(t_s);
        }
        engine.warm();

        let prev_count = timer.count;
        timer.count = (clock.us / TIMER_TICK_US) as u16;

        if wheel.due(clock.us, engine.revolution_us()) {
            ecu.on_trigger_edge(clock.us, &mut timer, &mut outputs);
        }

        for (i, channel) in [CompareChannel::A, CompareChannel::B].into_iter().enumerate() {
            if let Some(compare) = timer.compare[i] {
                let advanced = timer.count.wrapping_sub(prev_count);
                let to_compare = compare.wrapping_sub(prev_count);
                if to_compare != 0 && to_compare <= advanced {
                    timer.compare[i] = None;
                    ecu.on_compare_match(channel, &mut timer, &mut outputs);
                }
            }
        }

        let adc = SimAdc { engine: &engine };
        runner.iterate(
            ecu,
            &clock,
            &adc,
            &mut timer,
            &mut outputs,
            &mut link,
            &mut eeprom,
            &mut aux,
            &platform,
        );

        if t_s != last_printed_s {
            last_printed_s = t_s;
            let snap = ecu.status.read();
            println!(
                "t={:2}s rpm={:4} map={:3}kPa clt={:3}C pw={:5}us adv={:3}deg dwell={}us \
                 corr={:3}% sync={} crank={} run={} accel={} idle_duty={}%",
                t_s,
                snap.rpm,
                snap.map_kpa,
                snap.coolant_c,
                snap.pw1,
                snap.advance,
                snap.dwell,
                snap.corrections,
                snap.has_sync as u8,
                snap.engine_flag(engine::CRANK) as u8,
                snap.engine_flag(engine::RUN) as u8,
                snap.engine_flag(engine::ACCEL) as u8,
                aux.idle_duty,
            );
        }
    }

    println!(
        "run complete: {} injections, {} sparks",
        outputs.injections, outputs.sparks
    );

    // Tuner loopback: tweak a VE cell, burn, and pull live data, the same
    // byte streams a host tuning application would produce.
    link.rx.extend(frame_request(&[b'M', 0, 2, 17, 0, 3, 0, 60, 65, 70]));
    link.rx.extend(frame_request(&[b'p', 0, 2, 17, 0, 3, 0]));
    link.rx.extend(frame_request(&[b'B']));
    link.rx.extend(frame_request(&[b'A']));
    for _ in 0..64 {
        clock.us += STEP_US;
        let adc = SimAdc { engine: &engine };
        runner.iterate(
            ecu,
            &clock,
            &adc,
            &mut timer,
            &mut outputs,
            &mut link,
            &mut eeprom,
            &mut aux,
            &platform,
        );
    }

    let write_ack = parse_response(&mut link.tx);
    let readback = parse_response(&mut link.tx);
    let burn_ack = parse_response(&mut link.tx);
    let live = parse_response(&mut link.tx);
    println!(
        "tuner loopback: write ack {:02X}, readback {:?}, burn ack {:02X}",
        write_ack[0],
        &readback[1..],
        burn_ack[0]
    );
    let rpm = u16::from_le_bytes([live[16], live[17]]);
    println!(
        "live data: rpm={} advance={} ve={}",
        rpm,
        live[26] as i16 - 40,
        live[104]
    );
}
