use crate::error::BusError;
use crate::peripheral::{Address, BusEvent, Peripheral};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// 24Cxx-family part numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EepromType {
    C24C02,
    C24C08,
    C24C32,
    C24C64,
    C24C256,
}

#[derive(Debug, Clone, Copy)]
struct EepromSpec {
    word_address_bytes: u8,
    size: usize,
    page_size: usize,
}

impl EepromSpec {
    fn from_type(eeprom_type: EepromType) -> Self {
        match eeprom_type {
            EepromType::C24C02 => Self { word_address_bytes: 1, size: 256, page_size: 8 },
            EepromType::C24C08 => Self { word_address_bytes: 1, size: 1024, page_size: 16 },
            EepromType::C24C32 => Self { word_address_bytes: 2, size: 4096, page_size: 32 },
            EepromType::C24C64 => Self { word_address_bytes: 2, size: 8192, page_size: 32 },
            EepromType::C24C256 => Self { word_address_bytes: 2, size: 32768, page_size: 64 },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    WordAddressHigh,
    WordAddressLow,
    Data,
}

/// Byte-level 24Cxx EEPROM.
///
/// A write transaction starts with one or two word-address bytes, after
/// which every byte is stored at the pointer. Writes roll over within the
/// current page; reads auto-increment across the whole array.
#[derive(Debug, Clone)]
pub struct Eeprom24 {
    address: Address,
    eeprom_type: EepromType,
    spec: EepromSpec,
    memory: Vec<u8>,
    pointer: u16,
    high_byte: u8,
    phase: Phase,
    write_protect: bool,
}

impl Eeprom24 {
    pub fn new(address: Address, eeprom_type: EepromType) -> Self {
        let spec = EepromSpec::from_type(eeprom_type);
        Self {
            address,
            eeprom_type,
            spec,
            memory: vec![0xFF; spec.size],
            pointer: 0,
            high_byte: 0,
            phase: Phase::Idle,
            write_protect: false,
        }
    }

    pub fn eeprom_type(&self) -> EepromType {
        self.eeprom_type
    }

    pub fn size(&self) -> usize {
        self.spec.size
    }

    pub fn pointer(&self) -> u16 {
        self.pointer
    }

    pub fn contents(&self) -> &[u8] {
        &self.memory
    }

    /// WP pin. While asserted, data bytes are NACKed.
    pub fn set_write_protect(&mut self, enabled: bool) {
        self.write_protect = enabled;
    }

    fn wrap(&self, offset: usize) -> u16 {
        (offset % self.spec.size) as u16
    }

    fn advance_in_page(&mut self) {
        let page_mask = self.spec.page_size - 1;
        let pointer = self.pointer as usize;
        let next = (pointer & !page_mask) | ((pointer + 1) & page_mask);
        self.pointer = self.wrap(next);
    }
}

impl Peripheral for Eeprom24 {
    fn address(&self) -> Address {
        self.address
    }

    fn set_address(&mut self, address: Address) {
        self.address = address;
    }

    fn kind(&self) -> &'static str {
        "eeprom"
    }

    fn event(&mut self, event: BusEvent) -> Result<(), BusError> {
        self.phase = match event {
            BusEvent::StartSend if self.spec.word_address_bytes == 2 => Phase::WordAddressHigh,
            BusEvent::StartSend => Phase::WordAddressLow,
            BusEvent::StartRecv | BusEvent::Finish | BusEvent::Nack => Phase::Idle,
        };
        Ok(())
    }

    fn send(&mut self, data: u8) -> Result<(), BusError> {
        match self.phase {
            Phase::Idle => Err(BusError::PeripheralNack(self.address)),
            Phase::WordAddressHigh => {
                self.high_byte = data;
                self.phase = Phase::WordAddressLow;
                Ok(())
            }
            Phase::WordAddressLow => {
                let offset = if self.spec.word_address_bytes == 2 {
                    (usize::from(self.high_byte) << 8) | usize::from(data)
                } else {
                    usize::from(data)
                };
                self.pointer = self.wrap(offset);
                self.phase = Phase::Data;
                debug!(address = self.address, pointer = self.pointer, "eeprom word address");
                Ok(())
            }
            Phase::Data => {
                if self.write_protect {
                    return Err(BusError::PeripheralNack(self.address));
                }
                self.memory[self.pointer as usize] = data;
                self.advance_in_page();
                Ok(())
            }
        }
    }

    fn recv(&mut self) -> Option<u8> {
        let data = self.memory[self.pointer as usize];
        self.pointer = self.wrap(self.pointer as usize + 1);
        Some(data)
    }

    /// Word pointer (big endian) followed by the whole array.
    fn save_state(&self) -> Vec<u8> {
        let mut state = Vec::with_capacity(2 + self.memory.len());
        state.extend_from_slice(&self.pointer.to_be_bytes());
        state.extend_from_slice(&self.memory);
        state
    }

    fn load_state(&mut self, state: &[u8]) {
        if state.len() < 2 {
            warn!(address = self.address, len = state.len(), "eeprom state too short");
            return;
        }
        let (pointer, contents) = state.split_at(2);
        let len = contents.len().min(self.memory.len());
        self.memory[..len].copy_from_slice(&contents[..len]);
        self.pointer = self.wrap(usize::from(u16::from_be_bytes([pointer[0], pointer[1]])));
        self.phase = Phase::Idle;
    }
}
