//! The transaction engine of one multi-drop bus.
//!
//! A bus keeps the peripherals attached to it and the *matched set* of the
//! transaction in progress. The matched set is filled by a scan when an idle
//! bus sees a start, and drained only by [`I2cBus::end`]. A start on a busy
//! bus is a repeated start: it changes direction without rescanning, which is
//! how SMBus switches from the command write to the data read.

use crate::error::{BusError, ConfigError};
use crate::observer::TransactionObserver;
use crate::peripheral::{
    validate_address, Address, BusEvent, BusId, Direction, PeripheralId, TraceKind,
    BROADCAST_ADDRESS, MAX_ADDRESS, NO_DATA,
};
use crate::registry::PeripheralRegistry;
use crate::snapshot::BusState;
use arrayvec::ArrayString;
use core::fmt::Write;
use heapless::Deque;
use static_assertions::const_assert;
use tracing::{debug, info, trace, warn};

pub const MAX_PERIPHERALS_PER_BUS: usize = 128;
const TAG_CAPACITY: usize = 32;

// Every 7-bit address must fit, so scans and restores never overflow.
const_assert!(MAX_PERIPHERALS_PER_BUS > MAX_ADDRESS as usize);

type ChildList = heapless::Vec<PeripheralId, MAX_PERIPHERALS_PER_BUS>;
type MatchedSet = Deque<PeripheralId, MAX_PERIPHERALS_PER_BUS>;

pub struct I2cBus {
    id: BusId,
    name: String,
    tag: ArrayString<TAG_CAPACITY>,
    children: ChildList,
    // Most recently matched first.
    current: MatchedSet,
    broadcast: bool,
    saved_address: Option<Address>,
}

impl I2cBus {
    pub fn new(id: BusId, name: &str) -> Self {
        let mut tag = ArrayString::new();
        // A u32 serial always fits the tag.
        let _ = write!(tag, "i2c_bus_{}", id.0);

        debug!(bus = %id, tag = %tag, name, "init I2C bus");

        Self {
            id,
            name: name.to_owned(),
            tag,
            children: ChildList::new(),
            current: MatchedSet::new(),
            broadcast: false,
            saved_address: None,
        }
    }

    pub fn id(&self) -> BusId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Debug tag used to correlate this bus in logs and fault-injection UIs.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn children(&self) -> &[PeripheralId] {
        &self.children
    }

    /// True while a transaction holds at least one peripheral.
    pub fn is_busy(&self) -> bool {
        !self.current.is_empty()
    }

    pub fn is_broadcast(&self) -> bool {
        self.broadcast
    }

    /// Matched set, head first.
    pub fn matched(&self) -> impl Iterator<Item = PeripheralId> + '_ {
        self.current.iter().copied()
    }

    pub fn saved_address(&self) -> Option<Address> {
        self.saved_address
    }

    /// Attaches a peripheral. Its address must be valid and unique on this
    /// bus, and it must not already hang off another bus.
    pub fn attach(
        &mut self,
        devices: &mut PeripheralRegistry,
        peripheral: PeripheralId,
    ) -> Result<(), ConfigError> {
        let address = devices
            .address(peripheral)
            .ok_or(ConfigError::UnknownPeripheral(peripheral))?;
        validate_address(address)?;

        if self.find(devices, address).is_some() {
            return Err(ConfigError::AddressInUse {
                bus: self.id,
                address,
            });
        }
        if self.children.is_full() {
            return Err(ConfigError::BusFull(self.id));
        }

        devices.bind(peripheral, self.id)?;
        self.children
            .push(peripheral)
            .map_err(|_| ConfigError::BusFull(self.id))?;

        debug!(bus = %self.id, address, "attached peripheral");
        Ok(())
    }

    /// Child currently answering to `address`, if any.
    pub fn find(&self, devices: &PeripheralRegistry, address: Address) -> Option<PeripheralId> {
        self.children
            .iter()
            .copied()
            .find(|&id| devices.address(id) == Some(address))
    }

    /// Starts a transaction, or continues the open one in a new direction.
    ///
    /// When this opens the transaction (idle bus) and a peripheral refuses,
    /// the transaction is ended before returning. When it continues an open
    /// transaction and a peripheral refuses, the bus stays busy and the
    /// caller must `end` or `nack` it.
    pub fn start(
        &mut self,
        devices: &mut PeripheralRegistry,
        observer: &mut dyn TransactionObserver,
        address: Address,
        direction: Direction,
    ) -> Result<(), BusError> {
        if observer.on_transaction_start(self.id) {
            info!(bus = %self.id, address, "injected NACK");
            if !self.is_busy() {
                observer.on_transaction_end(self.id);
            }
            return Err(BusError::InjectedFault(self.id));
        }

        if address == BROADCAST_ADDRESS {
            self.broadcast = true;
        }

        let fresh_scan = self.current.is_empty();
        if fresh_scan {
            self.scan(devices, address);
        }

        if self.current.is_empty() {
            // Nobody answered, not even to a general call.
            self.broadcast = false;
            observer.on_transaction_end(self.id);
            return Err(BusError::NoResponder(address));
        }

        let event = BusEvent::start(direction);
        let mut rejected = None;
        for &id in self.current.iter() {
            if let Err(err) = notify(self.id, devices, observer, id, event) {
                if self.broadcast {
                    trace!(bus = %self.id, error = %err, "ignoring NACK during broadcast");
                    continue;
                }
                rejected = Some(err);
                break;
            }
        }

        if let Some(err) = rejected {
            warn!(bus = %self.id, address, fresh_scan, error = %err, "start rejected");
            if fresh_scan {
                self.end(devices, observer);
            }
            return Err(err);
        }

        Ok(())
    }

    /// Writes one byte to every matched peripheral. Everybody who can take
    /// the byte gets it; the first failure is reported.
    pub fn send(
        &mut self,
        devices: &mut PeripheralRegistry,
        observer: &mut dyn TransactionObserver,
        data: u8,
    ) -> Result<(), BusError> {
        if self.current.is_empty() {
            return Err(BusError::Idle(self.id));
        }

        let mut result = Ok(());
        for &id in self.current.iter() {
            let Some(device) = devices.get_mut(id) else {
                continue;
            };
            let address = device.address();

            trace!(bus = %self.id, address, data, "i2c send");
            observer.on_peripheral_event(self.id, TraceKind::Send(data), address);

            if let Err(err) = device.send(data) {
                if result.is_ok() {
                    result = Err(err);
                }
            }
        }
        result
    }

    /// Reads one byte from the head of the matched set. Floats to
    /// [`NO_DATA`] when idle, broadcasting, or when the head cannot be read.
    pub fn recv(
        &mut self,
        devices: &mut PeripheralRegistry,
        observer: &mut dyn TransactionObserver,
    ) -> u8 {
        if self.broadcast {
            return NO_DATA;
        }
        let Some(&head) = self.current.front() else {
            return NO_DATA;
        };
        let Some(device) = devices.get_mut(head) else {
            return NO_DATA;
        };

        match device.recv() {
            Some(data) => {
                let address = device.address();
                trace!(bus = %self.id, address, data, "i2c recv");
                observer.on_peripheral_event(self.id, TraceKind::Recv(data), address);
                data
            }
            None => NO_DATA,
        }
    }

    /// Finishes the transaction and releases the bus. No-op when idle.
    pub fn end(&mut self, devices: &mut PeripheralRegistry, observer: &mut dyn TransactionObserver) {
        if !self.is_busy() {
            return;
        }

        for &id in self.current.iter() {
            // finish cannot fail
            let _ = notify(self.id, devices, observer, id, BusEvent::Finish);
        }
        self.current.clear();
        self.broadcast = false;

        observer.on_transaction_end(self.id);
    }

    /// Delivers a NACK to every matched peripheral. The transaction stays
    /// open; the caller decides whether to `end` it.
    pub fn nack(&mut self, devices: &mut PeripheralRegistry, observer: &mut dyn TransactionObserver) {
        for &id in self.current.iter() {
            let _ = notify(self.id, devices, observer, id, BusEvent::Nack);
        }
    }

    /// Pre-save hook: captures the one scalar needed to rebuild the matched
    /// set after a restore.
    pub fn pre_save(&mut self, devices: &PeripheralRegistry) -> BusState {
        self.saved_address = match self.current.front() {
            None => None,
            Some(_) if self.broadcast => Some(BROADCAST_ADDRESS),
            Some(&head) => devices.address(head),
        };

        BusState {
            serial: self.id,
            saved_address: self.saved_address,
        }
    }

    /// Loads bus state and installs `members`, head first, as the matched
    /// set. No events are delivered. Ids that are not children of this bus
    /// are skipped.
    ///
    /// `members` normally comes from
    /// [`restored_members`](crate::snapshot::restored_members).
    pub fn restore(&mut self, state: &BusState, members: &[PeripheralId]) {
        self.current.clear();
        self.saved_address = state.saved_address;

        for &id in members {
            if !self.children.contains(&id) {
                continue;
            }
            if self.current.push_back(id).is_err() {
                break;
            }
        }
        self.broadcast =
            !self.current.is_empty() && state.saved_address == Some(BROADCAST_ADDRESS);
    }

    fn scan(&mut self, devices: &mut PeripheralRegistry, address: Address) {
        for &id in self.children.iter() {
            let Some(device) = devices.get_mut(id) else {
                continue;
            };
            if !device.matches(address, self.broadcast) {
                continue;
            }
            if self.current.push_front(id).is_err() {
                break;
            }
            // Addresses are unique; only a broadcast collects more than one.
            if !self.broadcast {
                break;
            }
        }
    }
}

fn notify(
    bus: BusId,
    devices: &mut PeripheralRegistry,
    observer: &mut dyn TransactionObserver,
    id: PeripheralId,
    event: BusEvent,
) -> Result<(), BusError> {
    let Some(device) = devices.get_mut(id) else {
        return Ok(());
    };
    let address = device.address();

    trace!(bus = %bus, event = event.label(), address, "i2c event");
    observer.on_peripheral_event(bus, event.into(), address);

    device
        .event(event)
        .map_err(|_| BusError::PeripheralRejected(address))
}
