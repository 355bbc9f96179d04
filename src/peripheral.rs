//! The capability contract every bus participant implements.

use crate::error::{BusError, ConfigError};
use core::fmt;
use serde::{Deserialize, Serialize};

pub type Address = u8;

/// General-call address. Matches every attached peripheral at once.
pub const BROADCAST_ADDRESS: Address = 0x00;
pub const MAX_ADDRESS: Address = 0x7F;

/// Value a read yields when nobody drives the bus.
pub const NO_DATA: u8 = 0xFF;

/// Stable serial of a bus, assigned once by the registry that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BusId(pub u32);

impl fmt::Display for BusId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "i2c-{}", self.0)
    }
}

/// Handle into a [`PeripheralRegistry`](crate::registry::PeripheralRegistry).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeripheralId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Send,
    Recv,
}

/// Phase transitions delivered to matched peripherals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BusEvent {
    StartSend,
    StartRecv,
    Finish,
    Nack,
}

impl BusEvent {
    pub fn start(direction: Direction) -> Self {
        match direction {
            Direction::Send => BusEvent::StartSend,
            Direction::Recv => BusEvent::StartRecv,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            BusEvent::StartSend | BusEvent::StartRecv => "start",
            BusEvent::Finish => "finish",
            BusEvent::Nack => "nack",
        }
    }
}

/// What the observer's tracing hook is told about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceKind {
    Start(Direction),
    Finish,
    Nack,
    Send(u8),
    Recv(u8),
}

impl From<BusEvent> for TraceKind {
    fn from(event: BusEvent) -> Self {
        match event {
            BusEvent::StartSend => TraceKind::Start(Direction::Send),
            BusEvent::StartRecv => TraceKind::Start(Direction::Recv),
            BusEvent::Finish => TraceKind::Finish,
            BusEvent::Nack => TraceKind::Nack,
        }
    }
}

/// An addressable device on a multi-drop bus.
///
/// Only `address`, `set_address` and `kind` are mandatory. A peripheral
/// without a write path keeps the default `send`, which reports
/// [`BusError::MissingCapability`]; one without a read path keeps the
/// default `recv`, and the bus then floats to [`NO_DATA`].
pub trait Peripheral {
    fn address(&self) -> Address;

    fn set_address(&mut self, address: Address);

    /// Short device-family name, used in logs and by the CLI.
    fn kind(&self) -> &'static str;

    /// Address decode. Called once per scan of an idle bus.
    fn matches(&mut self, address: Address, broadcast: bool) -> bool {
        broadcast || self.address() == address
    }

    fn event(&mut self, _event: BusEvent) -> Result<(), BusError> {
        Ok(())
    }

    fn send(&mut self, _data: u8) -> Result<(), BusError> {
        Err(BusError::MissingCapability(self.address()))
    }

    fn recv(&mut self) -> Option<u8> {
        None
    }

    /// Device-internal state carried in snapshots. Empty for stateless
    /// devices.
    fn save_state(&self) -> Vec<u8> {
        Vec::new()
    }

    /// Applies a blob produced by [`Self::save_state`]. A blob the device
    /// does not recognise is ignored.
    fn load_state(&mut self, _state: &[u8]) {}
}

/// Post-load membership rule: a peripheral rejoins the open transaction when
/// the saved address names it, or when the saved transaction was a broadcast.
pub fn rejoins(saved_address: Option<Address>, own_address: Address) -> bool {
    match saved_address {
        None => false,
        Some(BROADCAST_ADDRESS) => true,
        Some(saved) => saved == own_address,
    }
}

pub fn validate_address(address: Address) -> Result<(), ConfigError> {
    if address == BROADCAST_ADDRESS {
        return Err(ConfigError::ReservedAddress(address));
    }
    if address > MAX_ADDRESS {
        return Err(ConfigError::AddressOutOfRange(address));
    }
    Ok(())
}
