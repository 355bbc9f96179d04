//! # I2C Bus Transaction Engine
//!
//! A transactional model of a shared, multi-drop I2C/SMBus bus: one
//! controller at a time drives start, send, receive and end, while any
//! number of addressable peripherals answer.
//!
//! ## Features
//!
//! - **Address matching**: a start on an idle bus scans the attached
//!   peripherals and opens a transaction with whoever answers
//! - **Broadcast**: the general-call address opens a transaction with every
//!   peripheral at once and tolerates individual NACKs
//! - **Repeated start**: a start on a busy bus changes direction without
//!   releasing it, as SMBus reads do
//! - **Fault injection**: a one-shot NACK can be armed per bus
//! - **Save/restore**: transaction membership is rebuilt from one scalar per
//!   bus, with no cross-references persisted
//!
//! ## Quick Start
//!
//! ```rust
//! use i2cbus::{BusSystem, devices::{Eeprom24, EepromType}};
//!
//! let mut system = BusSystem::new();
//! let bus = system.create_bus("bmc");
//! system
//!     .add_peripheral(bus, Box::new(Eeprom24::new(0x50, EepromType::C24C02)))
//!     .unwrap();
//!
//! // Write 0xAB at word address 0x10
//! system.start_send(bus, 0x50).unwrap();
//! system.send(bus, 0x10).unwrap();
//! system.send(bus, 0xAB).unwrap();
//! system.end(bus).unwrap();
//!
//! // Set the pointer, then switch to reading without releasing the bus
//! system.start_send(bus, 0x50).unwrap();
//! system.send(bus, 0x10).unwrap();
//! system.start_recv(bus, 0x50).unwrap();
//! assert_eq!(system.recv(bus).unwrap(), 0xAB);
//! system.end(bus).unwrap();
//! ```
//!
//! ## Architecture
//!
//! - [`bus`] - The per-bus transaction engine
//! - [`peripheral`] - The capability contract peripherals implement
//! - [`registry`] - Peripheral ownership and handles
//! - [`system`] - Bus creation, serial allocation and the controller API
//! - [`observer`] - Transaction observer contract
//! - [`fault_injection`] - One-shot NACK injection and traffic counters
//! - [`snapshot`] - Save/restore of transaction membership
//! - [`config`] - JSON system description
//! - [`devices`] - Reference EEPROM and temperature-sensor peripherals

#![deny(warnings)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::new_without_default)]

pub mod bus;
pub mod config;
pub mod devices;
pub mod error;
pub mod fault_injection;
pub mod observer;
pub mod peripheral;
pub mod registry;
pub mod snapshot;
pub mod system;

// Re-export main public types for convenience
pub use bus::I2cBus;
pub use config::SystemConfig;
pub use error::{BusError, ConfigError, SnapshotError};
pub use fault_injection::NackInjector;
pub use observer::{NoFaults, TransactionObserver};
pub use peripheral::{
    Address, BusEvent, BusId, Direction, Peripheral, PeripheralId, BROADCAST_ADDRESS, NO_DATA,
};
pub use system::BusSystem;
