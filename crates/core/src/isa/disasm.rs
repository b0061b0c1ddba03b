//! Rendering of decoded records to assembly-like text.
//!
//! Consumed by the CLI and tests; not part of the core's correctness
//! contract beyond exposing the already-decoded operand record.

use crate::common::data::OperandSize;
use crate::isa::opcodes::{self, OperandLayout};
use crate::isa::operand::{AddrMode, DecoderOutput, OperandSpec, RelMode};

/// Returns the conventional name of a unified register index.
pub fn reg_name(idx: u8) -> String {
    match idx {
        0..=7 => format!("d{idx}"),
        8..=14 => format!("a{}", idx - 8),
        _ => "sp".to_string(),
    }
}

fn size_suffix(size: OperandSize) -> &'static str {
    match size {
        OperandSize::Byte => ".b",
        OperandSize::Word => ".w",
        OperandSize::Dword => ".d",
        OperandSize::Qword => ".q",
    }
}

fn operand_text(spec: OperandSpec, rec: &DecoderOutput, is_dst: bool) -> String {
    let base = match spec.mode {
        AddrMode::Register => reg_name(spec.reg),
        AddrMode::Immediate => format!("#{:#x}", rec.primary),
        AddrMode::Absolute => {
            if is_dst {
                format!("({:#x})", rec.address)
            } else {
                // The source's absolute address is consumed during decode;
                // only the fetched value survives in the record.
                format!("(#{:#x})", rec.primary)
            }
        }
        AddrMode::Indirect => format!("({})", reg_name(spec.reg)),
    };
    match spec.rel {
        RelMode::None => base,
        RelMode::Register => format!("{base}+{}<<{}", reg_name(spec.rel_reg), spec.rel_shift),
        RelMode::Absolute => format!("{base}{:+}", spec.rel_shift as i8),
    }
}

/// Renders one decoded record as text, e.g. `move.b d0, #0x45`.
pub fn render(rec: &DecoderOutput) -> String {
    let mnemonic = opcodes::mnemonic(rec.opcode);
    match opcodes::layout(rec.opcode) {
        Some(OperandLayout::None) | None => mnemonic.to_string(),
        Some(OperandLayout::OneRead) => format!(
            "{mnemonic}{} {}",
            size_suffix(rec.size),
            operand_text(rec.src, rec, false)
        ),
        Some(OperandLayout::OneWrite) => format!(
            "{mnemonic}{} {}",
            size_suffix(rec.size),
            operand_text(rec.dst, rec, true)
        ),
        Some(OperandLayout::Two) => format!(
            "{mnemonic}{} {}, {}",
            size_suffix(rec.size),
            operand_text(rec.dst, rec, true),
            operand_text(rec.src, rec, false)
        ),
    }
}
