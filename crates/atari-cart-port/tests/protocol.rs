//! Bus protocol tests against simulated hardware.
//!
//! The simulated GPIO block and the recording handshake share one event
//! log, so these tests see exactly what the adapter would see, in order.

use atari_cart_port::lines::{ADDRESS_MASK, CART_SELECT, DATA_MASK, DIRECTION_BIT, LOCK_BIT, encode};
use atari_cart_port::sim::{BusEvent, EventLog, RecordingHandshake, SimGpio};
use atari_cart_port::{BusVariant, CartPort, Direction, InternalChips, OpenBus, PortConfig};
use emu_core::{PageTable, Peripheral};
use proptest::prelude::*;

type SimPort = CartPort<SimGpio, RecordingHandshake>;

/// Chip that returns a constant and ignores writes.
struct Fixed(u8);

impl Peripheral for Fixed {
    fn peek(&mut self, _address: u16) -> u8 {
        self.0
    }

    fn poke(&mut self, _address: u16, _value: u8) {}
}

fn port_with(gpio: impl FnOnce(EventLog) -> SimGpio, variant: BusVariant) -> (SimPort, EventLog) {
    let log = EventLog::new();
    let mut table = PageTable::new();
    let config = PortConfig {
        variant,
        ..PortConfig::default()
    };
    let chips = InternalChips {
        riot: Box::new(Fixed(0x80)),
        tia: Box::new(Fixed(0x0E)),
    };
    let port = CartPort::with_parts(
        &mut table,
        &config,
        gpio(log.clone()),
        RecordingHandshake::new(log.clone()),
        chips,
    );
    log.clear();
    (port, log)
}

fn locked_port(fill: u8) -> (SimPort, EventLog) {
    port_with(|log| SimGpio::filled(fill, log), BusVariant::Locked)
}

fn cartridge_address() -> impl Strategy<Value = u16> {
    any::<u16>().prop_map(|a| a | CART_SELECT)
}

fn internal_address() -> impl Strategy<Value = u16> {
    any::<u16>().prop_map(|a| a & !CART_SELECT)
}

// ---------------------------------------------------------------------------
// Worked scenarios
// ---------------------------------------------------------------------------

#[test]
fn first_peek_of_cartridge() {
    let (mut port, log) = locked_port(0xD8);
    assert_eq!(port.peek(0x1000), 0xD8);

    assert_eq!(port.gpio().cartridge_offset(), 0x000);
    assert_eq!(log.latches(), 1);
    assert_eq!(log.cycles(), 1);
    assert!(log.events().contains(&BusEvent::Latch {
        mask: ADDRESS_MASK,
        value: 0x1000,
        locked: true,
    }));
    assert_eq!(port.last_direction(), Direction::Read);
}

#[test]
fn two_pokes_no_direction_wait() {
    let (mut port, log) = locked_port(0);
    assert!(port.poke(0x1000, 0xAB));
    let waits_after_first = log.count(|e| matches!(e, BusEvent::CycleWait { .. }));
    assert!(port.poke(0x1100, 0xCD));

    assert_eq!(log.cycles(), 2);
    assert_eq!(
        log.count(|e| matches!(e, BusEvent::CycleWait { .. })),
        waits_after_first
    );
    assert_eq!(port.gpio().cartridge_offset(), 0x100);
    assert_eq!(port.gpio().address_lines(), 0x1100);
    assert_eq!(port.gpio().data_lines(), 0xCD);
}

#[test]
fn poke_then_peek_same_address() {
    let (mut port, log) = locked_port(0x77);
    port.poke(0x1000, 0xAB);
    log.clear();

    assert_eq!(port.peek(0x1000), 0x77);
    let events = log.events();
    let first_wait = events
        .iter()
        .position(|e| *e == BusEvent::CycleWait { pending: true })
        .expect("turnaround wait");
    let read_mode = events
        .iter()
        .position(|e| *e == BusEvent::Clear(DIRECTION_BIT))
        .expect("direction switch");
    let latch = events
        .iter()
        .position(|e| matches!(e, BusEvent::Latch { .. }))
        .expect("latch");
    assert!(first_wait < read_mode);
    assert!(read_mode < latch);
    assert_eq!(port.stats().turnaround_waits, 2);
}

#[test]
fn peek_then_poke_pays_one_wait() {
    let (mut port, log) = locked_port(0);
    port.peek(0x1000);
    log.clear();
    port.poke(0x1000, 1);
    assert_eq!(log.count(|e| matches!(e, BusEvent::CycleWait { .. })), 1);
}

#[test]
fn consecutive_peeks_wait_only_for_their_own_cycle() {
    let (mut port, log) = locked_port(0x42);
    for addr in [0x1000, 0x1001, 0x1FFF] {
        port.peek(addr);
    }
    // One wait per read, inside the read itself.
    assert_eq!(log.count(|e| matches!(e, BusEvent::CycleWait { .. })), 3);
    assert_eq!(port.stats().turnaround_waits, 0);
}

#[test]
fn open_bus_chips_still_exercise_the_bus() {
    let log = EventLog::new();
    let mut table = PageTable::new();
    let mut port = CartPort::with_parts(
        &mut table,
        &PortConfig::default(),
        SimGpio::filled(0, log.clone()),
        RecordingHandshake::new(log.clone()),
        InternalChips {
            riot: Box::new(OpenBus),
            tia: Box::new(OpenBus),
        },
    );
    log.clear();
    assert_eq!(port.peek(0x0282), 0xFF);
    assert_eq!(port.gpio().data_lines(), 0xFF);
    assert_eq!(log.latches(), 1);
}

#[test]
fn bankswitch_hotspot_sequence_reaches_cartridge() {
    // An F8 cartridge switches bank on any access to $1FF8/$1FF9. The
    // adapter must see each one as its own locked cycle.
    let (mut port, log) = locked_port(0);
    port.peek(0x1FF9);
    port.peek(0x1FF8);
    port.peek(0x1FF9);
    let latched: Vec<u32> = log
        .events()
        .into_iter()
        .filter_map(|e| match e {
            BusEvent::Latch { value, locked: true, .. } => Some(value),
            _ => None,
        })
        .collect();
    assert_eq!(latched, vec![0x1FF9, 0x1FF8, 0x1FF9]);
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn cartridge_peek_is_one_locked_latch_then_one_cycle(addr in cartridge_address(), fill in any::<u8>()) {
        let (mut port, log) = locked_port(fill);
        prop_assert_eq!(port.peek(addr), fill);

        let events = log.events();
        let latches: Vec<usize> = events
            .iter()
            .enumerate()
            .filter(|(_, e)| matches!(e, BusEvent::Latch { locked: true, mask, .. } if *mask == ADDRESS_MASK))
            .map(|(i, _)| i)
            .collect();
        prop_assert_eq!(latches.len(), 1);
        prop_assert_eq!(log.cycles(), 1);
        let begin = events.iter().position(|e| *e == BusEvent::CycleBegin).unwrap();
        let end = events.iter().position(|e| *e == BusEvent::CycleWait { pending: true }).unwrap();
        let sample = events.iter().position(|e| matches!(e, BusEvent::Sample(_))).unwrap();
        prop_assert!(latches[0] < begin && begin < end && end < sample);
        prop_assert_eq!(port.last_direction(), Direction::Read);
    }

    #[test]
    fn internal_accesses_are_mirrored(addr in internal_address(), value in any::<u8>(), write in any::<bool>()) {
        let (mut port, log) = locked_port(0);
        let expected = if write {
            port.poke(addr, value);
            value
        } else {
            port.peek(addr)
        };
        let full = ADDRESS_MASK | DATA_MASK | DIRECTION_BIT;
        let exercised = log.count(|e| matches!(e, BusEvent::Latch { mask, .. } if *mask == full));
        prop_assert_eq!(exercised, 1);
        prop_assert_eq!(log.latches(), 1);
        prop_assert_eq!(port.gpio().data_lines(), expected);
        prop_assert_eq!(u32::from(port.gpio().address_lines()), u32::from(addr) & ADDRESS_MASK);
    }

    #[test]
    fn repeated_poke_is_never_suppressed(addr in any::<u16>(), value in any::<u8>(), n in 1usize..16) {
        let (mut port, log) = locked_port(0);
        for _ in 0..n {
            prop_assert!(port.poke(addr, value));
        }
        prop_assert_eq!(log.cycles(), n);
        prop_assert_eq!(log.latches(), n);
        let all_same = log.events().iter().all(|e| match e {
            BusEvent::Latch { value: v, .. } => *v == encode(addr, value),
            _ => true,
        });
        prop_assert!(all_same);
    }

    #[test]
    fn waits_match_direction_changes(ops in proptest::collection::vec((any::<bool>(), any::<u16>()), 1..40)) {
        let (mut port, log) = port_with(|log| SimGpio::filled(0x5A, log), BusVariant::Locked);
        let mut previous = Direction::Read;
        let mut changes = 0u64;
        let mut cart_reads = 0usize;
        for (write, addr) in ops {
            // Internal peeks are write-style exercises.
            let direction = if write || addr & CART_SELECT == 0 { Direction::Write } else { Direction::Read };
            if direction != previous {
                changes += 1;
            }
            if !write && addr & CART_SELECT != 0 {
                cart_reads += 1;
            }
            previous = direction;
            if write {
                port.poke(addr, 0);
            } else {
                port.peek(addr);
            }
        }
        prop_assert_eq!(port.stats().turnaround_waits, changes);
        let waits = log.count(|e| matches!(e, BusEvent::CycleWait { .. }));
        prop_assert_eq!(waits, usize::try_from(changes).unwrap() + cart_reads);
    }

    #[test]
    fn lock_is_released_after_every_access(addr in any::<u16>(), value in any::<u8>(), write in any::<bool>()) {
        let (mut port, _log) = locked_port(0);
        if write {
            port.poke(addr, value);
        } else {
            port.peek(addr);
        }
        prop_assert!(!port.gpio().is_locked());
        prop_assert_eq!(port.gpio().levels() & LOCK_BIT, 0);
    }
}
