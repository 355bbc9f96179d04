#![allow(dead_code)]

use i2cbus::{Address, BusError, BusEvent, Peripheral};
use std::cell::RefCell;
use std::rc::Rc;

/// What a scripted peripheral saw, shared with the test body.
#[derive(Debug, Default)]
pub struct Trace {
    pub match_calls: u32,
    pub events: Vec<BusEvent>,
    pub sent: Vec<u8>,
    pub reads: u32,
}

pub type SharedTrace = Rc<RefCell<Trace>>;

#[derive(Debug, Clone, Copy, Default)]
pub struct Script {
    pub refuse_start_send: bool,
    pub refuse_start_recv: bool,
    pub refuse_send: bool,
    pub write_only: bool,
    pub read_only: bool,
    pub read_value: u8,
}

pub struct ScriptedPeripheral {
    address: Address,
    script: Script,
    trace: SharedTrace,
}

impl ScriptedPeripheral {
    pub fn new(address: Address, script: Script) -> (Self, SharedTrace) {
        let trace = SharedTrace::default();
        (
            Self {
                address,
                script,
                trace: Rc::clone(&trace),
            },
            trace,
        )
    }

    pub fn ok(address: Address) -> (Self, SharedTrace) {
        Self::new(
            address,
            Script {
                read_value: address,
                ..Script::default()
            },
        )
    }
}

impl Peripheral for ScriptedPeripheral {
    fn address(&self) -> Address {
        self.address
    }

    fn set_address(&mut self, address: Address) {
        self.address = address;
    }

    fn kind(&self) -> &'static str {
        "scripted"
    }

    fn matches(&mut self, address: Address, broadcast: bool) -> bool {
        self.trace.borrow_mut().match_calls += 1;
        broadcast || address == self.address
    }

    fn event(&mut self, event: BusEvent) -> Result<(), BusError> {
        self.trace.borrow_mut().events.push(event);
        let refuse = match event {
            BusEvent::StartSend => self.script.refuse_start_send,
            BusEvent::StartRecv => self.script.refuse_start_recv,
            BusEvent::Finish | BusEvent::Nack => false,
        };
        if refuse {
            Err(BusError::PeripheralNack(self.address))
        } else {
            Ok(())
        }
    }

    fn send(&mut self, data: u8) -> Result<(), BusError> {
        if self.script.read_only {
            return Err(BusError::MissingCapability(self.address));
        }
        self.trace.borrow_mut().sent.push(data);
        if self.script.refuse_send {
            Err(BusError::PeripheralNack(self.address))
        } else {
            Ok(())
        }
    }

    fn recv(&mut self) -> Option<u8> {
        if self.script.write_only {
            return None;
        }
        self.trace.borrow_mut().reads += 1;
        Some(self.script.read_value)
    }
}
