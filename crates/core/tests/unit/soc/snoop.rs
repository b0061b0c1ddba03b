//! Snoop Bus Unit Tests.
//!
//! Exercises the bus-side MESI message semantics directly: `BusRd` holder
//! reporting and downgrades, `BusWr` invalidation with forced write-back,
//! and the byte-granular bypass path.

use m64k_core::common::constants::CACHE_LINE_BYTES;
use m64k_core::soc::snoop::{MesiState, SnoopBus};

#[test]
fn read_line_reports_no_holder_on_cold_bus() {
    let bus = SnoopBus::new(0x8000, 0x1000);
    let (requester, _lines) = bus.subscribe(2);

    let (data, shared) = bus.read_line(requester, 0x8000).unwrap();
    assert!(!shared, "no other holder answered");
    assert_eq!(data, [0u8; CACHE_LINE_BYTES]);
}

#[test]
fn read_line_sees_other_holder_and_downgrades_it() {
    let bus = SnoopBus::new(0, 0x1000);
    let (a, a_lines) = bus.subscribe(2);
    let (b, _b_lines) = bus.subscribe(2);

    // Install a Modified line for A by hand.
    {
        let mut set = a_lines.lock().unwrap();
        let line = &mut set.lines_mut()[0];
        line.tag = 0x40;
        line.state = MesiState::Modified;
        line.data[0] = 0xEE;
    }

    let (data, shared) = bus.read_line(b, 0x40).unwrap();
    assert!(shared, "A held the line");
    assert_eq!(data[0], 0xEE, "Modified holder flushed before fulfilling");
    assert_eq!(
        a_lines.lock().unwrap().lines()[0].state,
        MesiState::Shared,
        "holder downgraded by BusRd"
    );

    // The flush also landed in backing RAM.
    let mut raw = [0u8; 1];
    bus.read_bytes(0x40, &mut raw).unwrap();
    assert_eq!(raw[0], 0xEE);

    // The requester's own snoop is skipped: A re-reading reports B... or
    // in this setup, simply that some other holder exists.
    let (_, shared) = bus.read_line(a, 0x40).unwrap();
    assert!(!shared, "B never installed the line");
}

#[test]
fn claim_line_invalidates_every_other_holder() {
    let bus = SnoopBus::new(0, 0x1000);
    let (_a, a_lines) = bus.subscribe(2);
    let (b, _b_lines) = bus.subscribe(2);

    {
        let mut set = a_lines.lock().unwrap();
        let line = &mut set.lines_mut()[0];
        line.tag = 0x80;
        line.state = MesiState::Modified;
        line.data[3] = 0x77;
    }

    let data = bus.claim_line(b, 0x80).unwrap();
    assert_eq!(data[3], 0x77, "claim returns the freshest content");
    assert_eq!(
        a_lines.lock().unwrap().lines()[0].state,
        MesiState::Invalid,
        "BusWr invalidates other holders"
    );
}

#[test]
fn bypass_bytes_round_trip() {
    let bus = SnoopBus::new(0x100, 0x100);
    bus.write_bytes(0x180, &[1, 2, 3]).unwrap();
    let mut buf = [0u8; 3];
    bus.read_bytes(0x180, &mut buf).unwrap();
    assert_eq!(buf, [1, 2, 3]);
}

#[test]
fn out_of_arena_access_faults() {
    let bus = SnoopBus::new(0x100, 0x100);
    let mut buf = [0u8; 4];
    assert!(bus.read_bytes(0x1FE, &mut buf).is_err());
    assert!(bus.write_bytes(0x200, &[0]).is_err());
}
