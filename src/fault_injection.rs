use crate::observer::TransactionObserver;
use crate::peripheral::{Address, BusId, TraceKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

/// Per-bus traffic counters. `transactions_since_sample` feeds a
/// transaction-rate histogram and is reset by [`NackInjector::take_rate_sample`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BusTrafficStats {
    pub transactions_started: u32,
    pub transactions_completed: u32,
    pub injected_nacks: u32,
    pub bytes_written: u32,
    pub bytes_read: u32,
    pub transactions_since_sample: u32,
}

/// Totals across every bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct NackInjectionStats {
    pub total_nacks_injected: u32,
    pub total_transactions: u32,
    pub currently_armed: u8,
    pub currently_in_flight: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NackInjectorConfig {
    pub enabled: bool,
    /// Buses armed for a one-shot NACK as soon as the injector is built.
    pub armed_buses: Vec<u32>,
}

impl Default for NackInjectorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            armed_buses: Vec::new(),
        }
    }
}

/// One-shot NACK injection keyed by bus.
///
/// Arming a bus makes its next `start` fail with an injected NACK. The flag
/// is read and cleared inside the bus call path, so the injection fires
/// exactly once.
#[derive(Debug)]
pub struct NackInjector {
    config: NackInjectorConfig,
    pending: BTreeSet<BusId>,
    in_flight: BTreeSet<BusId>,
    traffic: BTreeMap<BusId, BusTrafficStats>,
    stats: NackInjectionStats,
}

impl NackInjector {
    pub fn new() -> Self {
        Self::new_with_config(NackInjectorConfig::default())
    }

    pub fn new_with_config(config: NackInjectorConfig) -> Self {
        let pending = config.armed_buses.iter().copied().map(BusId).collect();
        let mut injector = Self {
            config,
            pending,
            in_flight: BTreeSet::new(),
            traffic: BTreeMap::new(),
            stats: NackInjectionStats::default(),
        };
        injector.refresh_gauges();
        injector
    }

    /// Marks `bus` for a NACK on its next start. Returns false if it was
    /// already armed.
    pub fn arm(&mut self, bus: BusId) -> bool {
        let newly_armed = self.pending.insert(bus);
        if newly_armed {
            info!(bus = %bus, "pending NACK injection");
        }
        self.refresh_gauges();
        newly_armed
    }

    pub fn disarm(&mut self, bus: BusId) -> bool {
        let was_armed = self.pending.remove(&bus);
        self.refresh_gauges();
        was_armed
    }

    pub fn is_armed(&self, bus: BusId) -> bool {
        self.pending.contains(&bus)
    }

    pub fn is_in_flight(&self, bus: BusId) -> bool {
        self.in_flight.contains(&bus)
    }

    /// True if an injection is pending for a bus that currently has a
    /// transaction in flight. Controllers with their own NACK path poll this.
    pub fn should_inject(&self, bus: BusId) -> bool {
        self.config.enabled && self.is_armed(bus) && self.is_in_flight(bus)
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.config.enabled = enabled;
    }

    pub fn get_config(&self) -> &NackInjectorConfig {
        &self.config
    }

    pub fn get_stats(&self) -> &NackInjectionStats {
        &self.stats
    }

    pub fn traffic(&self, bus: BusId) -> BusTrafficStats {
        self.traffic.get(&bus).copied().unwrap_or_default()
    }

    /// Transactions started on `bus` since the previous sample.
    pub fn take_rate_sample(&mut self, bus: BusId) -> u32 {
        self.traffic
            .get_mut(&bus)
            .map(|t| core::mem::take(&mut t.transactions_since_sample))
            .unwrap_or(0)
    }

    fn refresh_gauges(&mut self) {
        self.stats.currently_armed = self.pending.len().min(u8::MAX as usize) as u8;
        self.stats.currently_in_flight = self.in_flight.len().min(u8::MAX as usize) as u8;
    }
}

impl Default for NackInjector {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionObserver for NackInjector {
    fn on_transaction_start(&mut self, bus: BusId) -> bool {
        self.in_flight.insert(bus);

        let traffic = self.traffic.entry(bus).or_default();
        traffic.transactions_started += 1;
        traffic.transactions_since_sample += 1;
        self.stats.total_transactions += 1;

        let inject = self.config.enabled && self.pending.remove(&bus);
        if inject {
            traffic.injected_nacks += 1;
            self.stats.total_nacks_injected += 1;
            info!(bus = %bus, "injecting NACK");
        }

        self.refresh_gauges();
        inject
    }

    fn on_transaction_end(&mut self, bus: BusId) {
        if self.in_flight.remove(&bus) {
            self.traffic.entry(bus).or_default().transactions_completed += 1;
        }
        self.refresh_gauges();
    }

    fn on_transaction_resumed(&mut self, bus: BusId) {
        self.in_flight.insert(bus);
        self.refresh_gauges();
    }

    fn on_peripheral_event(&mut self, bus: BusId, kind: TraceKind, _address: Address) {
        let traffic = self.traffic.entry(bus).or_default();
        match kind {
            TraceKind::Send(_) => traffic.bytes_written += 1,
            TraceKind::Recv(_) => traffic.bytes_read += 1,
            TraceKind::Start(_) | TraceKind::Finish | TraceKind::Nack => {}
        }
    }
}
