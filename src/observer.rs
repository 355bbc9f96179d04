use crate::peripheral::{Address, BusId, TraceKind};

/// External collaborator notified at transaction boundaries.
///
/// `on_transaction_start` is asked exactly once per bus start, before any
/// scan. Returning `true` forces a NACK for that start; an implementation
/// with a one-shot trigger must clear it before returning.
pub trait TransactionObserver {
    fn on_transaction_start(&mut self, bus: BusId) -> bool;

    /// The bus went back to idle.
    fn on_transaction_end(&mut self, bus: BusId);

    /// A snapshot restore left a previously idle bus mid-transaction. No
    /// start was issued, so nothing may be injected here.
    fn on_transaction_resumed(&mut self, _bus: BusId) {}

    /// Tracing hook. Must not feed back into bus state.
    fn on_peripheral_event(&mut self, _bus: BusId, _kind: TraceKind, _address: Address) {}
}

/// Observer that never injects anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFaults;

impl TransactionObserver for NoFaults {
    fn on_transaction_start(&mut self, _bus: BusId) -> bool {
        false
    }

    fn on_transaction_end(&mut self, _bus: BusId) {}
}
