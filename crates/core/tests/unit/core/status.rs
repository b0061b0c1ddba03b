//! Status Register Unit Tests.
//!
//! The status register is a plain integer with mask constants and
//! accessor functions; each field is verified independently so no
//! bit-layout assumption goes untested.

use rstest::rstest;

use m64k_core::core::regs::Registers;
use m64k_core::core::status;

#[rstest]
#[case(status::CARRY)]
#[case(status::OVERFLOW)]
#[case(status::ZERO)]
#[case(status::NEGATIVE)]
#[case(status::EXTEND)]
#[case(status::HALT)]
fn each_flag_sets_and_clears_independently(#[case] mask: u64) {
    let mut regs = Registers::new(0);
    assert!(!regs.flag(mask));

    regs.set_flag(mask, true);
    assert!(regs.flag(mask));

    // Every other flag is untouched.
    for other in [
        status::CARRY,
        status::OVERFLOW,
        status::ZERO,
        status::NEGATIVE,
        status::EXTEND,
        status::HALT,
    ] {
        if other != mask {
            assert!(!regs.flag(other), "flag {other:#x} leaked");
        }
    }

    regs.set_flag(mask, false);
    assert!(!regs.flag(mask));
    assert_eq!(regs.status(), 0);
}

#[test]
fn flag_masks_are_distinct_single_bits() {
    let masks = [
        status::CARRY,
        status::OVERFLOW,
        status::ZERO,
        status::NEGATIVE,
        status::EXTEND,
        status::HALT,
    ];
    let mut seen = 0u64;
    for mask in masks {
        assert_eq!(mask.count_ones(), 1, "mask {mask:#x} is a single bit");
        assert_eq!(seen & mask, 0, "mask {mask:#x} overlaps another");
        seen |= mask;
    }
}

#[test]
fn with_is_pure() {
    let s = status::with(0, status::ZERO, true);
    assert_eq!(s, status::ZERO);
    assert_eq!(status::with(s, status::ZERO, false), 0);
    assert!(status::get(s, status::ZERO));
    assert!(!status::get(s, status::CARRY));
}

#[test]
fn halt_flag_halts_the_core_view() {
    let mut regs = Registers::new(0);
    assert!(!regs.halted());
    regs.set_flag(status::HALT, true);
    assert!(regs.halted());
}
