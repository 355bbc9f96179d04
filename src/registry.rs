use crate::error::ConfigError;
use crate::peripheral::{Address, BusId, Peripheral, PeripheralId};

struct Slot {
    device: Box<dyn Peripheral>,
    bus: Option<BusId>,
}

/// Owns every peripheral in the system. Buses refer to peripherals only by
/// [`PeripheralId`], so a bus never outlives or owns the devices it drives.
#[derive(Default)]
pub struct PeripheralRegistry {
    slots: Vec<Slot>,
}

impl PeripheralRegistry {
    pub fn new() -> Self {
        Self { slots: Vec::new() }
    }

    pub fn insert(&mut self, device: Box<dyn Peripheral>) -> PeripheralId {
        let id = PeripheralId(self.slots.len());
        self.slots.push(Slot { device, bus: None });
        id
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Handles in insertion order, which is also restore order.
    pub fn ids(&self) -> impl Iterator<Item = PeripheralId> {
        (0..self.slots.len()).map(PeripheralId)
    }

    pub fn get(&self, id: PeripheralId) -> Option<&dyn Peripheral> {
        self.slots.get(id.0).map(|slot| slot.device.as_ref())
    }

    pub fn get_mut(&mut self, id: PeripheralId) -> Option<&mut (dyn Peripheral + 'static)> {
        self.slots.get_mut(id.0).map(|slot| slot.device.as_mut())
    }

    pub fn address(&self, id: PeripheralId) -> Option<Address> {
        self.get(id).map(|device| device.address())
    }

    pub fn bus_of(&self, id: PeripheralId) -> Option<BusId> {
        self.slots.get(id.0).and_then(|slot| slot.bus)
    }

    /// Records that `id` now hangs off `bus`. A peripheral belongs to exactly
    /// one bus for its whole life.
    pub(crate) fn bind(&mut self, id: PeripheralId, bus: BusId) -> Result<(), ConfigError> {
        let slot = self
            .slots
            .get_mut(id.0)
            .ok_or(ConfigError::UnknownPeripheral(id))?;

        if let Some(existing) = slot.bus {
            return Err(ConfigError::AlreadyAttached {
                peripheral: id,
                bus: existing,
            });
        }

        slot.bus = Some(bus);
        Ok(())
    }
}
