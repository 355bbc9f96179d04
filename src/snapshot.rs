//! Save/restore of transaction membership.
//!
//! No cross-entity references are persisted. Each bus saves one scalar, the
//! address its open transaction is talking to, and each peripheral saves its
//! own address plus an opaque device blob. On load every peripheral decides
//! locally whether it rejoins.

use crate::error::SnapshotError;
use crate::peripheral::{rejoins, Address, BusId, PeripheralId};
use crate::registry::PeripheralRegistry;
use serde::{Deserialize, Serialize};

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusState {
    pub serial: BusId,
    /// `None` when idle, the broadcast address for a broadcast, otherwise
    /// the address at the head of the matched set.
    pub saved_address: Option<Address>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeripheralState {
    pub address: Address,
    /// Output of [`Peripheral::save_state`](crate::peripheral::Peripheral::save_state).
    #[serde(default, with = "serde_bytes")]
    pub device: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemSnapshot {
    pub version: u32,
    pub buses: Vec<BusState>,
    pub peripherals: Vec<PeripheralState>,
}

impl SystemSnapshot {
    pub fn to_json(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        let snapshot: Self = serde_json::from_str(json)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::Version(snapshot.version));
        }
        Ok(snapshot)
    }
}

/// Membership a bus gets back after a restore, head first, when peripherals
/// are restored in registry order. [`BusSystem::restore`] installs exactly
/// this list.
///
/// [`BusSystem::restore`]: crate::system::BusSystem::restore
pub fn restored_members(
    devices: &PeripheralRegistry,
    bus: BusId,
    saved_address: Option<Address>,
) -> Vec<PeripheralId> {
    let mut members: Vec<PeripheralId> = devices
        .ids()
        .filter(|&id| devices.bus_of(id) == Some(bus))
        .filter(|&id| {
            devices
                .address(id)
                .is_some_and(|address| rejoins(saved_address, address))
        })
        .collect();
    // each rejoin goes to the front
    members.reverse();
    members
}
