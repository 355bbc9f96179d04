pub mod eeprom;
pub mod temp_sensor;

pub use eeprom::{Eeprom24, EepromType};
pub use temp_sensor::TempSensor;

use crate::peripheral::{Address, Peripheral};
use serde::{Deserialize, Serialize};

/// Device families the configuration layer knows how to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PeripheralKind {
    Eeprom {
        #[serde(default = "default_eeprom_type")]
        part: EepromType,
    },
    TempSensor,
}

fn default_eeprom_type() -> EepromType {
    EepromType::C24C02
}

impl PeripheralKind {
    pub fn build(self, address: Address) -> Box<dyn Peripheral> {
        match self {
            PeripheralKind::Eeprom { part } => Box::new(Eeprom24::new(address, part)),
            PeripheralKind::TempSensor => Box::new(TempSensor::new(address)),
        }
    }
}
