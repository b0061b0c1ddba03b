//! Disassembly Unit Tests.

use m64k_core::common::data::{OperandFamily, OperandSize};
use m64k_core::isa::disasm;
use m64k_core::isa::opcodes;
use m64k_core::isa::operand::{AddrMode, DecoderOutput, OperandSpec, RelMode};

fn rec(opcode: u8) -> DecoderOutput {
    DecoderOutput {
        opcode,
        size: OperandSize::Byte,
        family: OperandFamily::Integer,
        ..DecoderOutput::default()
    }
}

#[test]
fn renders_move_immediate() {
    let mut r = rec(opcodes::MOVE);
    r.dst = OperandSpec {
        mode: AddrMode::Register,
        reg: 0,
        ..OperandSpec::default()
    };
    r.src = OperandSpec {
        mode: AddrMode::Immediate,
        ..OperandSpec::default()
    };
    r.primary = 0x45;
    assert_eq!(disasm::render(&r), "move.b d0, #0x45");
}

#[test]
fn renders_no_operand_mnemonics() {
    assert_eq!(disasm::render(&rec(opcodes::NOP)), "nop");
    assert_eq!(disasm::render(&rec(opcodes::RTI)), "rti");
}

#[test]
fn renders_indirect_with_register_offset() {
    let mut r = rec(opcodes::PUSH);
    r.size = OperandSize::Qword;
    r.src = OperandSpec {
        mode: AddrMode::Indirect,
        reg: 8,
        rel: RelMode::Register,
        rel_reg: 3,
        rel_shift: 2,
    };
    assert_eq!(disasm::render(&r), "push.q (a0)+d3<<2");
}

#[test]
fn renders_register_names_across_the_unified_space() {
    assert_eq!(disasm::reg_name(0), "d0");
    assert_eq!(disasm::reg_name(7), "d7");
    assert_eq!(disasm::reg_name(8), "a0");
    assert_eq!(disasm::reg_name(14), "a6");
    assert_eq!(disasm::reg_name(15), "sp");
}
