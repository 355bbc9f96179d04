use crate::error::BusError;
use crate::peripheral::{Address, BusEvent, Peripheral};
use tracing::{debug, warn};

const REG_TEMPERATURE: u8 = 0x00;
const REG_CONFIG: u8 = 0x01;
const REG_HYSTERESIS: u8 = 0x02;
const REG_OVERTEMP: u8 = 0x03;
const POINTER_MASK: u8 = 0x03;

const CONFIG_SHUTDOWN: u8 = 0x01;

const DEFAULT_HYSTERESIS_HALF_C: i16 = 75 * 2;
const DEFAULT_OVERTEMP_HALF_C: i16 = 80 * 2;

// pointer, config, then temperature, hysteresis and overtemp as big-endian i16
const STATE_LEN: usize = 8;

/// LM75-style sensor behind a register pointer.
///
/// The first byte of a write transaction selects the register; following
/// bytes write it MSB first. Temperatures are 9-bit two's complement in
/// half-degree steps, left aligned in a 16-bit register.
#[derive(Debug, Clone)]
pub struct TempSensor {
    address: Address,
    pointer: u8,
    pointer_pending: bool,
    byte_index: u8,
    temperature_half_c: i16,
    hysteresis_half_c: i16,
    overtemp_half_c: i16,
    config: u8,
}

impl TempSensor {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            pointer: REG_TEMPERATURE,
            pointer_pending: false,
            byte_index: 0,
            temperature_half_c: 25 * 2,
            hysteresis_half_c: DEFAULT_HYSTERESIS_HALF_C,
            overtemp_half_c: DEFAULT_OVERTEMP_HALF_C,
            config: 0,
        }
    }

    /// Sets the sensed temperature, rounded down to half a degree.
    pub fn set_temperature_milli_c(&mut self, milli_c: i32) {
        let half_c = milli_c.div_euclid(500).clamp(-110, 250);
        self.temperature_half_c = half_c as i16;
    }

    pub fn temperature_milli_c(&self) -> i32 {
        i32::from(self.temperature_half_c) * 500
    }

    pub fn is_shutdown(&self) -> bool {
        self.config & CONFIG_SHUTDOWN != 0
    }

    pub fn config(&self) -> u8 {
        self.config
    }

    fn register_bytes(&self, register: u8) -> [u8; 2] {
        let half_c = match register {
            REG_HYSTERESIS => self.hysteresis_half_c,
            REG_OVERTEMP => self.overtemp_half_c,
            _ => self.temperature_half_c,
        };
        ((half_c << 7) as u16).to_be_bytes()
    }

    fn write_register_byte(&mut self, data: u8) -> Result<(), BusError> {
        let index = self.byte_index;
        self.byte_index = self.byte_index.saturating_add(1);

        let limit = match self.pointer {
            REG_CONFIG if index == 0 => {
                self.config = data;
                return Ok(());
            }
            REG_HYSTERESIS if index < 2 => &mut self.hysteresis_half_c,
            REG_OVERTEMP if index < 2 => &mut self.overtemp_half_c,
            _ => return Err(BusError::PeripheralNack(self.address)),
        };

        let mut raw = ((*limit << 7) as u16).to_be_bytes();
        raw[usize::from(index)] = data;
        *limit = (u16::from_be_bytes(raw) as i16) >> 7;
        Ok(())
    }
}

impl Peripheral for TempSensor {
    fn address(&self) -> Address {
        self.address
    }

    fn set_address(&mut self, address: Address) {
        self.address = address;
    }

    fn kind(&self) -> &'static str {
        "temp_sensor"
    }

    fn event(&mut self, event: BusEvent) -> Result<(), BusError> {
        self.byte_index = 0;
        match event {
            BusEvent::StartSend => {
                self.pointer_pending = true;
                Ok(())
            }
            // no conversion result while shut down
            BusEvent::StartRecv if self.is_shutdown() && self.pointer == REG_TEMPERATURE => {
                Err(BusError::PeripheralNack(self.address))
            }
            BusEvent::StartRecv | BusEvent::Finish | BusEvent::Nack => {
                self.pointer_pending = false;
                Ok(())
            }
        }
    }

    fn send(&mut self, data: u8) -> Result<(), BusError> {
        if self.pointer_pending {
            self.pointer = data & POINTER_MASK;
            self.pointer_pending = false;
            debug!(address = self.address, pointer = self.pointer, "sensor pointer");
            return Ok(());
        }
        self.write_register_byte(data)
    }

    fn recv(&mut self) -> Option<u8> {
        let data = if self.pointer == REG_CONFIG {
            self.config
        } else {
            self.register_bytes(self.pointer)[usize::from(self.byte_index & 1)]
        };
        self.byte_index = self.byte_index.wrapping_add(1);
        Some(data)
    }

    fn save_state(&self) -> Vec<u8> {
        let mut state = Vec::with_capacity(STATE_LEN);
        state.push(self.pointer);
        state.push(self.config);
        for half_c in [
            self.temperature_half_c,
            self.hysteresis_half_c,
            self.overtemp_half_c,
        ] {
            state.extend_from_slice(&half_c.to_be_bytes());
        }
        state
    }

    fn load_state(&mut self, state: &[u8]) {
        if state.len() != STATE_LEN {
            warn!(address = self.address, len = state.len(), "sensor state has wrong size");
            return;
        }
        let word = |at: usize| i16::from_be_bytes([state[at], state[at + 1]]);
        self.pointer = state[0] & POINTER_MASK;
        self.config = state[1];
        self.temperature_half_c = word(2);
        self.hysteresis_half_c = word(4);
        self.overtemp_half_c = word(6);
        self.pointer_pending = false;
        self.byte_index = 0;
    }
}
