//! Instruction encoding helpers.
//!
//! The emulator consumes binary images produced by an external assembler;
//! these helpers exist so tests and host programs can build small images
//! without one. The byte layout is the authoritative encoding:
//!
//! ```text
//! opcode | [meta] | [dst desc] [src desc] | dst extras | src extras | [immediate]
//! ```
//!
//! where `meta` packs operand size (bits 0-1) and family (bits 4-5), each
//! descriptor byte packs register index (high nibble), relative mode
//! (bits 2-3), and addressing mode (bits 0-1), extras are an 8-byte
//! absolute address and/or a 1-byte relative descriptor per operand, and a
//! trailing operand-sized immediate closes the instruction.

use crate::common::data::{OperandFamily, OperandSize};
use crate::isa::opcodes::{self, OperandLayout};
use crate::isa::operand::{AddrMode, RelMode};

/// An operand as written in assembly source.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operand {
    /// A register in the unified index space (0-7 data, 8-14 address, 15 sp).
    Reg(u8),
    /// An immediate value (source operands only).
    Imm(u64),
    /// An absolute memory address.
    Abs(u64),
    /// Memory addressed through a register with an optional relative offset.
    Ind {
        /// Base register in the unified index space.
        reg: u8,
        /// Relative offset applied to the base.
        rel: RelOffset,
    },
}

/// Relative-offset component of an indirect operand.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelOffset {
    /// No offset.
    None,
    /// `register << shift` offset.
    Reg {
        /// Offset register in the unified index space.
        reg: u8,
        /// Left-shift applied to the offset register (0-15).
        shift: u8,
    },
    /// Signed 8-bit displacement.
    Disp(i8),
}

/// Unified register index for data register `n`.
pub fn dreg(n: u8) -> u8 {
    n & 0x7
}

/// Unified register index for address register `n`.
pub fn areg(n: u8) -> u8 {
    8 + (n & 0x7)
}

/// Unified register index of the stack pointer.
pub const SP_REG: u8 = 15;

/// Picks the narrowest operand size whose signed range holds a branch
/// displacement.
///
/// Displacements are sign-extended at execute time, so the bounds are the
/// signed i8/i16/i32 ranges. The unsigned magnitudes 255 and 65535 would
/// mis-encode every displacement in the negative half of each range.
pub fn branch_displacement_size(disp: i64) -> OperandSize {
    if i64::from(disp as i8) == disp {
        OperandSize::Byte
    } else if i64::from(disp as i16) == disp {
        OperandSize::Word
    } else if i64::from(disp as i32) == disp {
        OperandSize::Dword
    } else {
        OperandSize::Qword
    }
}

/// Encodes one instruction into bytes.
///
/// Operands are given in destination-then-source order, matching the
/// encoding. Instructions without operands ignore `size`.
///
/// # Panics
///
/// Panics if the operand count does not match the opcode's layout or an
/// immediate is used as a destination; encoding is a test/host-side
/// convenience, and a mis-built instruction is a bug at the call site.
pub fn encode(opcode: u8, size: OperandSize, operands: &[Operand]) -> Vec<u8> {
    let layout = opcodes::layout(opcode);
    let mut out = vec![opcode];

    let (dst, src) = match (layout, operands) {
        (Some(OperandLayout::None), []) => return out,
        (Some(OperandLayout::OneRead), [op]) => (None, Some(*op)),
        (Some(OperandLayout::OneWrite), [op]) => (Some(*op), None),
        (Some(OperandLayout::Two), [d, s]) => (Some(*d), Some(*s)),
        _ => panic!("operand count does not match opcode {opcode:#04x}"),
    };
    assert!(
        !matches!(dst, Some(Operand::Imm(_))),
        "immediate destinations are not encodable"
    );

    out.push(size.bits() | (OperandFamily::Integer.bits() << 4));
    for op in [dst, src].into_iter().flatten() {
        out.push(descriptor_byte(op));
    }
    for op in [dst, src].into_iter().flatten() {
        push_extras(&mut out, op);
    }
    if let Some(Operand::Imm(value)) = src {
        out.extend_from_slice(&value.to_le_bytes()[..size.bytes()]);
    }
    out
}

/// Encodes a branch with an auto-deduced displacement width.
pub fn encode_branch(opcode: u8, disp: i64) -> Vec<u8> {
    let size = branch_displacement_size(disp);
    encode(opcode, size, &[Operand::Imm(disp as u64)])
}

fn descriptor_byte(op: Operand) -> u8 {
    let (mode, reg, rel) = match op {
        Operand::Reg(r) => (AddrMode::Register, r, RelMode::None),
        Operand::Imm(_) => (AddrMode::Immediate, 0, RelMode::None),
        Operand::Abs(_) => (AddrMode::Absolute, 0, RelMode::None),
        Operand::Ind { reg, rel } => (
            AddrMode::Indirect,
            reg,
            match rel {
                RelOffset::None => RelMode::None,
                RelOffset::Reg { .. } => RelMode::Register,
                RelOffset::Disp(_) => RelMode::Absolute,
            },
        ),
    };
    ((reg & 0xF) << 4) | (rel.bits() << 2) | mode.bits()
}

fn push_extras(out: &mut Vec<u8>, op: Operand) {
    match op {
        Operand::Abs(addr) => out.extend_from_slice(&addr.to_le_bytes()),
        Operand::Ind { rel, .. } => match rel {
            RelOffset::None => {}
            RelOffset::Reg { reg, shift } => out.push(((reg & 0xF) << 4) | (shift & 0xF)),
            RelOffset::Disp(d) => out.push(d as u8),
        },
        _ => {}
    }
}
