use crate::devices::{EepromType, PeripheralKind};
use crate::error::ConfigError;
use crate::fault_injection::NackInjectorConfig;
use crate::peripheral::Address;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Attach-time description of every bus and what hangs off it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SystemConfig {
    pub buses: Vec<BusConfig>,
    pub fault_injection: NackInjectorConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusConfig {
    pub name: String,
    #[serde(default)]
    pub peripherals: Vec<PeripheralConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeripheralConfig {
    pub address: Address,
    #[serde(flatten)]
    pub kind: PeripheralKind,
}

impl SystemConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Invalid(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }

    /// Two buses: a board-management bus with an EEPROM and a sensor, and a
    /// second sensor bus.
    pub fn sample() -> Self {
        Self {
            buses: vec![
                BusConfig {
                    name: "bmc".to_owned(),
                    peripherals: vec![
                        PeripheralConfig {
                            address: 0x50,
                            kind: PeripheralKind::Eeprom { part: EepromType::C24C32 },
                        },
                        PeripheralConfig {
                            address: 0x48,
                            kind: PeripheralKind::TempSensor,
                        },
                    ],
                },
                BusConfig {
                    name: "sensors".to_owned(),
                    peripherals: vec![
                        PeripheralConfig {
                            address: 0x49,
                            kind: PeripheralKind::TempSensor,
                        },
                        PeripheralConfig {
                            address: 0x4A,
                            kind: PeripheralKind::TempSensor,
                        },
                    ],
                },
            ],
            fault_injection: NackInjectorConfig::default(),
        }
    }
}
