mod common;

use common::{Script, ScriptedPeripheral, SharedTrace};
use i2cbus::*;

fn system_with(peripherals: Vec<ScriptedPeripheral>) -> (BusSystem, BusId) {
    let mut system = BusSystem::new();
    let bus = system.create_bus("test");
    for p in peripherals {
        system.add_peripheral(bus, Box::new(p)).unwrap();
    }
    (system, bus)
}

fn three_peripherals(script_0x10: Script) -> (BusSystem, BusId, [SharedTrace; 3]) {
    let (p10, t10) = ScriptedPeripheral::new(0x10, script_0x10);
    let (p20, t20) = ScriptedPeripheral::ok(0x20);
    let (p30, t30) = ScriptedPeripheral::ok(0x30);
    let (system, bus) = system_with(vec![p10, p20, p30]);
    (system, bus, [t10, t20, t30])
}

#[test]
fn test_concrete_three_peripheral_scenario() {
    let (mut system, bus, [t10, t20, t30]) = three_peripherals(Script {
        refuse_start_send: true,
        ..Script::default()
    });

    assert!(system.start_send(bus, 0x20).is_ok());
    assert_eq!(system.matched_addresses(bus), vec![0x20]);

    assert!(system.send(bus, 0xAB).is_ok());
    assert_eq!(t20.borrow().sent, vec![0xAB]);
    assert!(t10.borrow().sent.is_empty());
    assert!(t30.borrow().sent.is_empty());

    system.end(bus).unwrap();
    assert_eq!(
        t20.borrow().events,
        vec![BusEvent::StartSend, BusEvent::Finish]
    );
    assert!(system.matched_addresses(bus).is_empty());
    assert!(!system.is_busy(bus));

    // 0x10 refuses, but a broadcast tolerates partial NACKs
    assert!(system.start_send(bus, BROADCAST_ADDRESS).is_ok());
    let mut members = system.matched_addresses(bus);
    members.sort_unstable();
    assert_eq!(members, vec![0x10, 0x20, 0x30]);
    assert_eq!(t10.borrow().events.last(), Some(&BusEvent::StartSend));
    assert_eq!(t30.borrow().events.last(), Some(&BusEvent::StartSend));
}

#[test]
fn test_unmatched_addresses_report_no_responder() {
    let (mut system, bus, traces) = three_peripherals(Script::default());

    for address in (0x01..=0x7F).filter(|a| ![0x10, 0x20, 0x30].contains(a)) {
        assert_eq!(
            system.start_send(bus, address),
            Err(BusError::NoResponder(address))
        );
        assert!(!system.is_busy(bus));
    }

    for trace in &traces {
        assert!(trace.borrow().events.is_empty());
    }
}

#[test]
fn test_broadcast_always_succeeds() {
    let refuse_everything = Script {
        refuse_start_send: true,
        refuse_start_recv: true,
        ..Script::default()
    };
    let (a, _) = ScriptedPeripheral::new(0x10, refuse_everything);
    let (b, _) = ScriptedPeripheral::new(0x11, refuse_everything);
    let (mut system, bus) = system_with(vec![a, b]);

    assert!(system.start_recv(bus, BROADCAST_ADDRESS).is_ok());
    assert!(system.bus(bus).unwrap().is_broadcast());
    assert_eq!(system.matched_addresses(bus).len(), 2);
}

#[test]
fn test_broadcast_on_empty_bus_fails() {
    let (mut system, bus) = system_with(vec![]);

    assert_eq!(
        system.start_send(bus, BROADCAST_ADDRESS),
        Err(BusError::NoResponder(BROADCAST_ADDRESS))
    );
    assert!(!system.bus(bus).unwrap().is_broadcast());
    assert!(!system.is_busy(bus));
    assert_eq!(system.send(bus, 0x00), Err(BusError::Idle(bus)));

    // a later targeted start must not inherit the failed broadcast
    let (a, _) = ScriptedPeripheral::ok(0x10);
    let (b, _) = ScriptedPeripheral::ok(0x20);
    system.add_peripheral(bus, Box::new(a)).unwrap();
    system.add_peripheral(bus, Box::new(b)).unwrap();

    system.start_send(bus, 0x20).unwrap();
    assert_eq!(system.matched_addresses(bus), vec![0x20]);
    assert!(!system.bus(bus).unwrap().is_broadcast());
}

#[test]
fn test_end_returns_to_idle_and_is_idempotent() {
    let (mut system, bus, [_, t20, _]) = three_peripherals(Script::default());

    system.start_send(bus, BROADCAST_ADDRESS).unwrap();
    system.end(bus).unwrap();
    system.end(bus).unwrap();

    let state = system.bus(bus).unwrap();
    assert!(!state.is_busy());
    assert!(!state.is_broadcast());
    let finishes = t20
        .borrow()
        .events
        .iter()
        .filter(|e| **e == BusEvent::Finish)
        .count();
    assert_eq!(finishes, 1);
}

#[test]
fn test_repeated_start_does_not_rescan() {
    let (p, trace) = ScriptedPeripheral::ok(0x50);
    let (mut system, bus) = system_with(vec![p]);

    system.start_send(bus, 0x50).unwrap();
    system.send(bus, 0x00).unwrap();
    system.start_recv(bus, 0x50).unwrap();

    assert_eq!(trace.borrow().match_calls, 1);
    assert_eq!(
        trace.borrow().events,
        vec![BusEvent::StartSend, BusEvent::StartRecv]
    );
    assert_eq!(system.recv(bus).unwrap(), 0x50);
}

#[test]
fn test_repeated_start_keeps_membership_even_for_other_address() {
    let (p, _) = ScriptedPeripheral::ok(0x50);
    let (q, q_trace) = ScriptedPeripheral::ok(0x51);
    let (mut system, bus) = system_with(vec![p, q]);

    system.start_send(bus, 0x50).unwrap();
    system.start_recv(bus, 0x51).unwrap();

    assert_eq!(system.matched_addresses(bus), vec![0x50]);
    assert!(q_trace.borrow().events.is_empty());
}

#[test]
fn test_fresh_rejection_cleans_up() {
    let (p, trace) = ScriptedPeripheral::new(
        0x50,
        Script {
            refuse_start_send: true,
            ..Script::default()
        },
    );
    let (mut system, bus) = system_with(vec![p]);

    assert_eq!(
        system.start_send(bus, 0x50),
        Err(BusError::PeripheralRejected(0x50))
    );
    assert!(!system.is_busy(bus));
    assert_eq!(
        trace.borrow().events,
        vec![BusEvent::StartSend, BusEvent::Finish]
    );
}

#[test]
fn test_direction_change_rejection_keeps_transaction() {
    let (p, trace) = ScriptedPeripheral::new(
        0x50,
        Script {
            refuse_start_recv: true,
            ..Script::default()
        },
    );
    let (mut system, bus) = system_with(vec![p]);

    system.start_send(bus, 0x50).unwrap();
    assert_eq!(
        system.start_recv(bus, 0x50),
        Err(BusError::PeripheralRejected(0x50))
    );

    // caller owns cleanup
    assert!(system.is_busy(bus));
    assert_eq!(system.matched_addresses(bus), vec![0x50]);
    assert_eq!(
        trace.borrow().events,
        vec![BusEvent::StartSend, BusEvent::StartRecv]
    );

    system.nack(bus).unwrap();
    assert!(system.is_busy(bus));
    system.end(bus).unwrap();
    assert!(!system.is_busy(bus));
    assert_eq!(
        trace.borrow().events,
        vec![
            BusEvent::StartSend,
            BusEvent::StartRecv,
            BusEvent::Nack,
            BusEvent::Finish
        ]
    );
}

#[test]
fn test_send_delivers_to_everyone_despite_failures() {
    let (a, ta) = ScriptedPeripheral::new(
        0x10,
        Script {
            refuse_send: true,
            ..Script::default()
        },
    );
    let (b, _) = ScriptedPeripheral::new(
        0x11,
        Script {
            read_only: true,
            ..Script::default()
        },
    );
    let (c, tc) = ScriptedPeripheral::ok(0x12);
    let (mut system, bus) = system_with(vec![a, b, c]);

    system.start_send(bus, BROADCAST_ADDRESS).unwrap();
    let result = system.send(bus, 0x5A);

    // head of the matched set is the last one scanned
    assert_eq!(result, Err(BusError::MissingCapability(0x11)));
    assert_eq!(ta.borrow().sent, vec![0x5A]);
    assert_eq!(tc.borrow().sent, vec![0x5A]);
}

#[test]
fn test_send_success_only_when_all_ack() {
    let (a, _) = ScriptedPeripheral::ok(0x10);
    let (b, _) = ScriptedPeripheral::ok(0x11);
    let (mut system, bus) = system_with(vec![a, b]);

    system.start_send(bus, BROADCAST_ADDRESS).unwrap();
    assert!(system.send(bus, 0x01).is_ok());
}

#[test]
fn test_recv_reads_only_head() {
    let (a, ta) = ScriptedPeripheral::ok(0x10);
    let (b, tb) = ScriptedPeripheral::ok(0x20);
    let (mut system, bus) = system_with(vec![a, b]);

    assert_eq!(system.recv(bus).unwrap(), NO_DATA);

    system.start_recv(bus, 0x20).unwrap();
    assert_eq!(system.recv(bus).unwrap(), 0x20);
    assert_eq!(tb.borrow().reads, 1);
    assert_eq!(ta.borrow().reads, 0);
}

#[test]
fn test_recv_during_broadcast_floats_high() {
    let (a, ta) = ScriptedPeripheral::ok(0x10);
    let (mut system, bus) = system_with(vec![a]);

    system.start_recv(bus, BROADCAST_ADDRESS).unwrap();
    assert_eq!(system.recv(bus).unwrap(), NO_DATA);
    assert_eq!(ta.borrow().reads, 0);
}

#[test]
fn test_recv_without_read_capability_floats_high() {
    let (a, _) = ScriptedPeripheral::new(
        0x10,
        Script {
            write_only: true,
            ..Script::default()
        },
    );
    let (mut system, bus) = system_with(vec![a]);

    system.start_recv(bus, 0x10).unwrap();
    assert_eq!(system.recv(bus).unwrap(), NO_DATA);
}

#[test]
fn test_broadcast_upgrade_of_open_transaction() {
    let (a, _) = ScriptedPeripheral::ok(0x10);
    let (b, tb) = ScriptedPeripheral::ok(0x20);
    let (mut system, bus) = system_with(vec![a, b]);

    system.start_send(bus, 0x10).unwrap();
    system.start_recv(bus, BROADCAST_ADDRESS).unwrap();

    // flag flips, membership does not
    assert!(system.bus(bus).unwrap().is_broadcast());
    assert_eq!(system.matched_addresses(bus), vec![0x10]);
    assert!(tb.borrow().events.is_empty());
    assert_eq!(system.recv(bus).unwrap(), NO_DATA);

    system.end(bus).unwrap();
    assert!(!system.bus(bus).unwrap().is_broadcast());
}

#[test]
fn test_nack_on_idle_bus_is_noop() {
    let (a, ta) = ScriptedPeripheral::ok(0x10);
    let (mut system, bus) = system_with(vec![a]);

    system.nack(bus).unwrap();
    assert!(ta.borrow().events.is_empty());
    assert!(!system.is_busy(bus));
}

#[test]
fn test_buses_are_independent() {
    let mut system = BusSystem::new();
    let bus_a = system.create_bus("a");
    let bus_b = system.create_bus("b");
    let (pa, _) = ScriptedPeripheral::ok(0x10);
    let (pb, _) = ScriptedPeripheral::ok(0x10);
    system.add_peripheral(bus_a, Box::new(pa)).unwrap();
    system.add_peripheral(bus_b, Box::new(pb)).unwrap();

    system.start_send(bus_a, 0x10).unwrap();
    assert!(system.is_busy(bus_a));
    assert!(!system.is_busy(bus_b));

    system.start_send(bus_b, 0x10).unwrap();
    system.end(bus_a).unwrap();
    assert!(system.is_busy(bus_b));
}

#[test]
fn test_attach_rejects_second_bus() {
    let mut system = BusSystem::new();
    let bus_a = system.create_bus("a");
    let bus_b = system.create_bus("b");
    let (p, _) = ScriptedPeripheral::ok(0x10);
    let id = system.add_peripheral(bus_a, Box::new(p)).unwrap();

    assert_eq!(system.devices().bus_of(id), Some(bus_a));

    let mut devices = i2cbus::registry::PeripheralRegistry::new();
    let (q, _) = ScriptedPeripheral::ok(0x11);
    let q = devices.insert(Box::new(q));
    let mut first = I2cBus::new(bus_a, "a");
    let mut second = I2cBus::new(bus_b, "b");
    first.attach(&mut devices, q).unwrap();
    assert_eq!(
        second.attach(&mut devices, q),
        Err(ConfigError::AlreadyAttached {
            peripheral: q,
            bus: bus_a
        })
    );
}
