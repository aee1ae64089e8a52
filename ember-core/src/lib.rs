//! Ember: a small engine-management core for 1-6 cylinder four-stroke
//! spark-ignition engines.
//!
//! Everything real-time lives here and is hardware-free: crank trigger
//! decoding, the fuel and ignition models with their correction chain,
//! microsecond event scheduling, engine protection, the calibration page
//! store and the serial tuner protocol. Hardware enters only through the
//! trait contracts in [`hal`], which is what makes the whole crate testable
//! on the host and reusable across boards.

#![no_std]

#[cfg(test)]
extern crate std;

// Host test runs need the std critical-section implementation linked in.
#[cfg(test)]
use critical_section as _;

pub use log as external_log;

#[macro_use]
pub mod macros;

pub mod calibration;
pub mod comms;
pub mod config;
pub mod corrections;
pub mod crc;
pub mod datacells;
pub mod defaults;
pub mod ecu;
pub mod fuel;
pub mod hal;
pub mod ignition;
pub mod livedata;
pub mod periodic;
pub mod protection;
pub mod scheduler;
pub mod sensors;
pub mod status;
pub mod storage;
pub mod tables;
pub mod trigger;
pub mod types;

pub use calibration::Calibration;
pub use ecu::{Ecu, EcuRunner};
pub use hal::CompareChannel;
pub use status::EngineSnapshot;
