//! Encoding Unit Tests.
//!
//! Byte-exact checks of the instruction encoding against the layout
//! contract, plus the branch-width auto-deduction bounds.

use m64k_core::common::data::OperandSize;
use m64k_core::isa::encode::{
    areg, branch_displacement_size, dreg, encode, encode_branch, Operand, RelOffset, SP_REG,
};
use m64k_core::isa::opcodes;

#[test]
fn move_byte_immediate_reference_bytes() {
    let bytes = encode(
        opcodes::MOVE,
        OperandSize::Byte,
        &[Operand::Reg(dreg(0)), Operand::Imm(0x45)],
    );
    assert_eq!(bytes, vec![0x20, 0x00, 0x03, 0x01, 0x45]);
}

#[test]
fn no_operand_instructions_are_one_byte() {
    for op in [opcodes::NOP, opcodes::BRK, opcodes::RET, opcodes::RTI, opcodes::RTE] {
        assert_eq!(encode(op, OperandSize::Byte, &[]), vec![op]);
    }
}

#[test]
fn absolute_destination_appends_eight_address_bytes() {
    let bytes = encode(
        opcodes::MOVE,
        OperandSize::Word,
        &[Operand::Abs(0x1122_3344_5566_7788), Operand::Imm(0xBEEF)],
    );
    // opcode, meta(word), dst desc (Absolute=0), src desc (Immediate=1),
    // 8 address bytes (LE), 2 immediate bytes (LE).
    assert_eq!(bytes[0], opcodes::MOVE);
    assert_eq!(bytes[1], 0x01);
    assert_eq!(bytes[2], 0x00);
    assert_eq!(bytes[3], 0x01);
    assert_eq!(&bytes[4..12], &0x1122_3344_5566_7788u64.to_le_bytes());
    assert_eq!(&bytes[12..14], &[0xEF, 0xBE]);
    assert_eq!(bytes.len(), 14);
}

#[test]
fn register_relative_indirect_appends_descriptor_byte() {
    // move.q d1, (a2 + d3 << 4)
    let bytes = encode(
        opcodes::MOVE,
        OperandSize::Qword,
        &[
            Operand::Reg(dreg(1)),
            Operand::Ind {
                reg: areg(2),
                rel: RelOffset::Reg {
                    reg: dreg(3),
                    shift: 4,
                },
            },
        ],
    );
    // src descriptor: reg a2 (=10) high nibble, rel Register (1) bits 2-3,
    // mode Indirect (2) bits 0-1.
    assert_eq!(bytes[3], (10 << 4) | (1 << 2) | 2);
    // relative descriptor: index d3 high nibble, shift 4 low nibble.
    assert_eq!(bytes[4], (3 << 4) | 4);
    assert_eq!(bytes.len(), 5);
}

#[test]
fn unified_register_indices() {
    assert_eq!(dreg(0), 0);
    assert_eq!(dreg(7), 7);
    assert_eq!(areg(0), 8);
    assert_eq!(areg(6), 14);
    assert_eq!(SP_REG, 15);
}

// ──────────────────────────────────────────────────────────
// Branch width deduction
// ──────────────────────────────────────────────────────────

/// Widths are picked by signed fit, not by the unsigned magnitudes
/// 255/65535/4294967295 (which would mis-encode negative-half
/// displacements).
#[test]
fn branch_width_bounds_are_signed() {
    assert_eq!(branch_displacement_size(0), OperandSize::Byte);
    assert_eq!(branch_displacement_size(127), OperandSize::Byte);
    assert_eq!(branch_displacement_size(-128), OperandSize::Byte);

    assert_eq!(branch_displacement_size(128), OperandSize::Word);
    assert_eq!(branch_displacement_size(255), OperandSize::Word);
    assert_eq!(branch_displacement_size(-129), OperandSize::Word);
    assert_eq!(branch_displacement_size(32767), OperandSize::Word);

    assert_eq!(branch_displacement_size(32768), OperandSize::Dword);
    assert_eq!(branch_displacement_size(65535), OperandSize::Dword);
    assert_eq!(branch_displacement_size(-40_000), OperandSize::Dword);

    assert_eq!(
        branch_displacement_size(i64::from(i32::MAX) + 1),
        OperandSize::Qword
    );
}

#[test]
fn encode_branch_picks_the_deduced_width() {
    // -129 needs a word; the encoding carries two displacement bytes.
    let bytes = encode_branch(opcodes::BRA, -129);
    assert_eq!(bytes[1] & 0x3, OperandSize::Word.bits());
    assert_eq!(bytes.len(), 1 + 1 + 1 + 2);
    assert_eq!(&bytes[3..5], &(-129i16 as u16).to_le_bytes());
}
