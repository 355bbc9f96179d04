use crate::peripheral::{Address, BusId, PeripheralId};
use thiserror::Error;

/// Runtime outcome of a bus operation. None of these are fatal; the
/// controller decides whether to retry, abort or propagate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BusError {
    /// A non-broadcast scan matched nothing. The bus stays idle.
    #[error("no peripheral responded to address {0:#04x}")]
    NoResponder(Address),

    /// A matched peripheral refused the start (or repeated start) event.
    #[error("peripheral at {0:#04x} rejected the start condition")]
    PeripheralRejected(Address),

    /// The transaction observer forced a NACK on this start.
    #[error("NACK injected on {0}")]
    InjectedFault(BusId),

    /// A matched peripheral has no write path.
    #[error("peripheral at {0:#04x} cannot accept writes")]
    MissingCapability(Address),

    /// A matched peripheral did not acknowledge a byte or event.
    #[error("peripheral at {0:#04x} did not acknowledge")]
    PeripheralNack(Address),

    /// Data phase attempted with no transaction open.
    #[error("{0} is idle")]
    Idle(BusId),

    #[error("unknown bus {0}")]
    UnknownBus(BusId),
}

/// Attach-time and configuration precondition violations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("address {0:#04x} is reserved for broadcast")]
    ReservedAddress(Address),

    #[error("address {0:#04x} does not fit in 7 bits")]
    AddressOutOfRange(Address),

    #[error("address {address:#04x} already in use on {bus}")]
    AddressInUse { bus: BusId, address: Address },

    #[error("peripheral {peripheral:?} is already attached to {bus}")]
    AlreadyAttached { peripheral: PeripheralId, bus: BusId },

    #[error("{0} has no room for another peripheral")]
    BusFull(BusId),

    #[error("{0} is busy")]
    BusBusy(BusId),

    #[error("unknown bus {0}")]
    UnknownBus(BusId),

    #[error("unknown peripheral {0:?}")]
    UnknownPeripheral(PeripheralId),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Failures while taking, encoding or applying a snapshot.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot encoding failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("snapshot holds {found} {what}, system has {expected}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("unsupported snapshot version {0}")]
    Version(u32),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
