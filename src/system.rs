//! The registry that owns buses, peripherals and the transaction observer.

use crate::bus::I2cBus;
use crate::config::SystemConfig;
use crate::error::{BusError, ConfigError, SnapshotError};
use crate::fault_injection::NackInjector;
use crate::observer::{NoFaults, TransactionObserver};
use crate::peripheral::{validate_address, Address, BusId, Direction, Peripheral, PeripheralId};
use crate::registry::PeripheralRegistry;
use crate::snapshot::{restored_members, PeripheralState, SystemSnapshot, SNAPSHOT_VERSION};
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Every bus in the machine plus the peripherals they drive.
///
/// Bus serials are handed out here, starting at 0, in creation order.
pub struct BusSystem<O: TransactionObserver = NoFaults> {
    devices: PeripheralRegistry,
    buses: Vec<I2cBus>,
    observer: O,
    next_serial: u32,
}

impl BusSystem<NoFaults> {
    pub fn new() -> Self {
        Self::with_observer(NoFaults)
    }
}

impl Default for BusSystem<NoFaults> {
    fn default() -> Self {
        Self::new()
    }
}

impl BusSystem<NackInjector> {
    /// Builds every bus and peripheral described by `config`, with a NACK
    /// injector configured from its `fault_injection` section.
    pub fn from_config(config: &SystemConfig) -> Result<Self, ConfigError> {
        let mut system = Self::with_observer(NackInjector::new_with_config(
            config.fault_injection.clone(),
        ));

        for bus_config in &config.buses {
            let bus = system.create_bus(&bus_config.name);
            for peripheral in &bus_config.peripherals {
                system.add_peripheral(bus, peripheral.kind.build(peripheral.address))?;
            }
        }

        info!(
            buses = system.buses.len(),
            peripherals = system.devices.len(),
            "bus system built"
        );
        Ok(system)
    }
}

impl<O: TransactionObserver> BusSystem<O> {
    pub fn with_observer(observer: O) -> Self {
        Self {
            devices: PeripheralRegistry::new(),
            buses: Vec::new(),
            observer,
            next_serial: 0,
        }
    }

    pub fn create_bus(&mut self, name: &str) -> BusId {
        let id = BusId(self.next_serial);
        self.next_serial += 1;
        self.buses.push(I2cBus::new(id, name));
        id
    }

    /// Log-only hook for a controller that re-runs its bus setup. The serial,
    /// attachments and any open transaction are left untouched.
    pub fn reinit_bus(&mut self, bus: BusId) -> Result<(), ConfigError> {
        let bus = self.bus(bus).ok_or(ConfigError::UnknownBus(bus))?;
        debug!(bus = %bus.id(), tag = bus.tag(), "I2C bus re-inited");
        Ok(())
    }

    /// Registers `device` and attaches it to `bus`.
    pub fn add_peripheral(
        &mut self,
        bus: BusId,
        device: Box<dyn Peripheral>,
    ) -> Result<PeripheralId, ConfigError> {
        let index = self.bus_index(bus).ok_or(ConfigError::UnknownBus(bus))?;

        // Checked before registering: a refused device never enters the registry.
        let address = device.address();
        validate_address(address)?;
        if self.buses[index].find(&self.devices, address).is_some() {
            return Err(ConfigError::AddressInUse { bus, address });
        }

        let id = self.devices.insert(device);
        self.buses[index].attach(&mut self.devices, id)?;
        Ok(id)
    }

    /// Reassigns a peripheral address. Only allowed while its bus is idle.
    pub fn set_peripheral_address(
        &mut self,
        peripheral: PeripheralId,
        address: Address,
    ) -> Result<(), ConfigError> {
        validate_address(address)?;

        if let Some(bus) = self.devices.bus_of(peripheral).and_then(|b| self.bus(b)) {
            if bus.is_busy() {
                return Err(ConfigError::BusBusy(bus.id()));
            }
            if let Some(other) = bus.find(&self.devices, address) {
                if other != peripheral {
                    return Err(ConfigError::AddressInUse {
                        bus: bus.id(),
                        address,
                    });
                }
            }
        }

        let device = self
            .devices
            .get_mut(peripheral)
            .ok_or(ConfigError::UnknownPeripheral(peripheral))?;
        device.set_address(address);
        Ok(())
    }

    pub fn bus(&self, bus: BusId) -> Option<&I2cBus> {
        self.bus_index(bus).map(|index| &self.buses[index])
    }

    pub fn buses(&self) -> impl Iterator<Item = &I2cBus> {
        self.buses.iter()
    }

    pub fn devices(&self) -> &PeripheralRegistry {
        &self.devices
    }

    pub fn peripheral(&self, id: PeripheralId) -> Option<&dyn Peripheral> {
        self.devices.get(id)
    }

    pub fn peripheral_mut(&mut self, id: PeripheralId) -> Option<&mut (dyn Peripheral + 'static)> {
        self.devices.get_mut(id)
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    pub fn observer_mut(&mut self) -> &mut O {
        &mut self.observer
    }

    pub fn is_busy(&self, bus: BusId) -> bool {
        self.bus(bus).is_some_and(I2cBus::is_busy)
    }

    /// Addresses in the matched set of `bus`, head first.
    pub fn matched_addresses(&self, bus: BusId) -> Vec<Address> {
        self.bus(bus)
            .map(|b| b.matched().filter_map(|id| self.devices.address(id)).collect())
            .unwrap_or_default()
    }

    pub fn start_transfer(
        &mut self,
        bus: BusId,
        address: Address,
        is_recv: bool,
    ) -> Result<(), BusError> {
        let direction = if is_recv { Direction::Recv } else { Direction::Send };
        let index = self.bus_index(bus).ok_or(BusError::UnknownBus(bus))?;
        self.buses[index].start(&mut self.devices, &mut self.observer, address, direction)
    }

    pub fn start_send(&mut self, bus: BusId, address: Address) -> Result<(), BusError> {
        self.start_transfer(bus, address, false)
    }

    pub fn start_recv(&mut self, bus: BusId, address: Address) -> Result<(), BusError> {
        self.start_transfer(bus, address, true)
    }

    pub fn send(&mut self, bus: BusId, data: u8) -> Result<(), BusError> {
        let index = self.bus_index(bus).ok_or(BusError::UnknownBus(bus))?;
        self.buses[index].send(&mut self.devices, &mut self.observer, data)
    }

    pub fn recv(&mut self, bus: BusId) -> Result<u8, BusError> {
        let index = self.bus_index(bus).ok_or(BusError::UnknownBus(bus))?;
        Ok(self.buses[index].recv(&mut self.devices, &mut self.observer))
    }

    pub fn end(&mut self, bus: BusId) -> Result<(), BusError> {
        let index = self.bus_index(bus).ok_or(BusError::UnknownBus(bus))?;
        self.buses[index].end(&mut self.devices, &mut self.observer);
        Ok(())
    }

    pub fn nack(&mut self, bus: BusId) -> Result<(), BusError> {
        let index = self.bus_index(bus).ok_or(BusError::UnknownBus(bus))?;
        self.buses[index].nack(&mut self.devices, &mut self.observer);
        Ok(())
    }

    /// Runs every bus's pre-save hook and collects the persisted scalars
    /// and device blobs.
    pub fn snapshot(&mut self) -> SystemSnapshot {
        let devices = &self.devices;
        let buses = self.buses.iter_mut().map(|bus| bus.pre_save(devices)).collect();
        let peripherals = devices
            .ids()
            .filter_map(|id| devices.get(id))
            .map(|device| PeripheralState {
                address: device.address(),
                device: device.save_state(),
            })
            .collect();

        SystemSnapshot {
            version: SNAPSHOT_VERSION,
            buses,
            peripherals,
        }
    }

    /// Applies a snapshot taken from a system with the same layout.
    ///
    /// The whole snapshot is checked first; a rejected snapshot leaves the
    /// system untouched. Then every peripheral gets its address and device
    /// state back, and each bus installs the membership
    /// [`restored_members`] computes for it. No events are delivered to
    /// peripherals. The observer hears about every bus whose busy state
    /// changed.
    pub fn restore(&mut self, snapshot: &SystemSnapshot) -> Result<(), SnapshotError> {
        self.check_snapshot(snapshot)?;

        let was_busy: Vec<bool> = self.buses.iter().map(I2cBus::is_busy).collect();

        let ids: Vec<PeripheralId> = self.devices.ids().collect();
        for (id, state) in ids.into_iter().zip(&snapshot.peripherals) {
            if let Some(device) = self.devices.get_mut(id) {
                device.set_address(state.address);
                device.load_state(&state.device);
            }
        }

        for (bus, state) in self.buses.iter_mut().zip(&snapshot.buses) {
            let members = restored_members(&self.devices, bus.id(), state.saved_address);
            bus.restore(state, &members);
        }

        for (bus, was_busy) in self.buses.iter().zip(was_busy) {
            match (was_busy, bus.is_busy()) {
                (false, true) => self.observer.on_transaction_resumed(bus.id()),
                (true, false) => self.observer.on_transaction_end(bus.id()),
                _ => {}
            }
        }

        debug!(buses = self.buses.len(), "snapshot restored");
        Ok(())
    }

    fn check_snapshot(&self, snapshot: &SystemSnapshot) -> Result<(), SnapshotError> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::Version(snapshot.version));
        }
        if snapshot.buses.len() != self.buses.len() {
            return Err(SnapshotError::ShapeMismatch {
                what: "buses",
                expected: self.buses.len(),
                found: snapshot.buses.len(),
            });
        }
        if snapshot.peripherals.len() != self.devices.len() {
            return Err(SnapshotError::ShapeMismatch {
                what: "peripherals",
                expected: self.devices.len(),
                found: snapshot.peripherals.len(),
            });
        }

        for (bus, state) in self.buses.iter().zip(&snapshot.buses) {
            if bus.id() != state.serial {
                return Err(ConfigError::UnknownBus(state.serial).into());
            }
        }

        let mut taken = BTreeSet::new();
        for (id, state) in self.devices.ids().zip(&snapshot.peripherals) {
            validate_address(state.address)?;
            if let Some(bus) = self.devices.bus_of(id) {
                if !taken.insert((bus, state.address)) {
                    return Err(ConfigError::AddressInUse {
                        bus,
                        address: state.address,
                    }
                    .into());
                }
            }
        }
        Ok(())
    }

    fn bus_index(&self, bus: BusId) -> Option<usize> {
        let index = bus.0 as usize;
        (index < self.buses.len()).then_some(index)
    }
}
