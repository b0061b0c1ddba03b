//! Instruction executor.
//!
//! Pulls one decoded record per invocation from the dispatch queue and
//! dispatches on opcode to a closed set of handlers. Handlers work on the
//! values captured during decode — the common case performs no additional
//! memory traffic — compute size-correct flags, and write the result to
//! the decoded destination. Unknown opcodes raise the illegal-instruction
//! exception rather than terminating the emulator; writes to
//! immediate-mode destinations are a hard fault.

/// ALU operations and flag computation.
pub mod alu;
mod flow;

use tracing::trace;

use crate::common::error::{CoreError, Exception, HardFaultReason};
use crate::core::status;
use crate::core::Core;
use crate::isa::disasm;
use crate::isa::opcodes;
use crate::isa::operand::{AddrMode, DecoderOutput, TAG_ROOT, WIRE_LEN};
use crate::soc::region::RegionMap;

use self::alu::{AluFlags, ShiftKind};

impl Core {
    /// Consumes at most one dispatch-queue entry and executes it.
    ///
    /// Execution faults are routed through the exception-raise path;
    /// queue-contract violations are emulator bugs and surface as
    /// [`CoreError`].
    pub(crate) fn execute_step(&mut self, soc: &mut RegionMap) -> Result<(), CoreError> {
        let Some(header) = self.queue.peek() else {
            return Ok(());
        };

        if header.tag == TAG_ROOT {
            let (_, payload) = self.queue.pop(WIRE_LEN)?;
            let rec = DecoderOutput::from_bytes(&payload)?;
            trace!(ip = format_args!("{:#x}", rec.ip), instr = %disasm::render(&rec), "execute");
            let fallthrough = rec.ip + u64::from(rec.len);
            self.regs.ip = fallthrough;
            match self.execute_record(&rec, soc) {
                Ok(()) => {
                    self.stats.instructions_retired += 1;
                    if self.regs.ip != fallthrough {
                        let target = self.regs.ip;
                        self.flush_to(target);
                    }
                }
                Err(e) => self.raise_exception(soc, e),
            }
        } else {
            let (header, payload) = self.queue.pop(header.len)?;
            let result = {
                let Self {
                    registry,
                    regs,
                    mmu,
                    ..
                } = self;
                match registry.get_mut(header.tag) {
                    Some(ext) => ext.execute(&payload, regs, mmu, soc),
                    None => Err(Exception::UnknownExtension {
                        opcode: header.tag,
                        ip: regs.ip,
                    }),
                }
            };
            match result {
                Ok(()) => {
                    self.stats.instructions_retired += 1;
                    let target = self.regs.ip;
                    self.flush_to(target);
                }
                Err(e) => self.raise_exception(soc, e),
            }
        }
        Ok(())
    }

    /// Dispatches one root-set record to its handler.
    fn execute_record(&mut self, rec: &DecoderOutput, soc: &mut RegionMap) -> Result<(), Exception> {
        match rec.opcode {
            opcodes::NOP => Ok(()),
            opcodes::BRK => Err(Exception::Breakpoint { ip: rec.ip }),
            opcodes::SYS => self.exec_sys(soc),
            opcodes::MOVE => self.exec_move(rec, soc),
            opcodes::ADD | opcodes::SUB | opcodes::CMP => self.exec_arith(rec, soc),
            opcodes::ASL | opcodes::ASR | opcodes::LSL | opcodes::LSR => self.exec_shift(rec, soc),
            opcodes::PUSH => self.exec_push(rec, soc),
            opcodes::POP => self.exec_pop(rec, soc),
            opcodes::CALL => self.exec_call(rec, soc),
            opcodes::RET => self.exec_ret(soc),
            opcodes::RTI | opcodes::RTE => self.exec_return_from_handler(rec.opcode),
            opcodes::BRA
            | opcodes::BEQ
            | opcodes::BNE
            | opcodes::BCS
            | opcodes::BCC
            | opcodes::BMI
            | opcodes::BPL => self.exec_branch(rec, soc),
            opcode => Err(Exception::IllegalInstruction { opcode, ip: rec.ip }),
        }
    }

    /// `move`: writes the source value; sets zero/negative, clears
    /// carry/overflow, leaves extend untouched.
    fn exec_move(&mut self, rec: &DecoderOutput, soc: &mut RegionMap) -> Result<(), Exception> {
        self.write_destination(rec, rec.primary, soc)?;
        let masked = rec.primary & rec.size.mask();
        self.regs.set_flag(status::ZERO, masked == 0);
        self.regs
            .set_flag(status::NEGATIVE, masked & rec.size.sign_bit() != 0);
        self.regs.set_flag(status::CARRY, false);
        self.regs.set_flag(status::OVERFLOW, false);
        Ok(())
    }

    /// `add`/`sub`/`cmp`: size-masked arithmetic on the decoded values.
    fn exec_arith(&mut self, rec: &DecoderOutput, soc: &mut RegionMap) -> Result<(), Exception> {
        let (dst, src) = (rec.secondary, rec.primary);
        let (result, flags) = match rec.opcode {
            opcodes::ADD => alu::add(dst, src, rec.size),
            _ => alu::sub(dst, src, rec.size),
        };
        if rec.opcode == opcodes::CMP {
            // Compare discards the result and leaves extend untouched.
            self.apply_flags(flags, false);
            return Ok(());
        }
        self.write_destination(rec, result, soc)?;
        self.apply_flags(flags, true);
        Ok(())
    }

    /// Shift family; count in the source operand, value in the destination.
    fn exec_shift(&mut self, rec: &DecoderOutput, soc: &mut RegionMap) -> Result<(), Exception> {
        let kind = match rec.opcode {
            opcodes::ASL => ShiftKind::Asl,
            opcodes::ASR => ShiftKind::Asr,
            opcodes::LSL => ShiftKind::Lsl,
            _ => ShiftKind::Lsr,
        };
        let count = rec.primary;
        let (result, flags) = alu::shift(kind, rec.secondary, count, rec.size);
        self.write_destination(rec, result, soc)?;
        // Extend mirrors carry only when bits actually moved.
        self.apply_flags(flags, count & 0x3F != 0);
        Ok(())
    }

    /// Writes `value` to the decoded destination.
    ///
    /// # Errors
    ///
    /// Hard fault for immediate-mode destinations; memory faults are
    /// forwarded for absolute and indirect destinations.
    fn write_destination(
        &mut self,
        rec: &DecoderOutput,
        value: u64,
        soc: &mut RegionMap,
    ) -> Result<(), Exception> {
        match rec.dst.mode {
            AddrMode::Register => {
                self.regs.set_unified(rec.dst.reg, rec.size, value);
                Ok(())
            }
            AddrMode::Absolute | AddrMode::Indirect => self
                .mmu
                .write_value(soc, rec.address, rec.size, value)
                .map_err(Exception::Memory),
            AddrMode::Immediate => Err(Exception::hard(HardFaultReason::ImmediateDestination)),
        }
    }

    fn apply_flags(&mut self, flags: AluFlags, update_extend: bool) {
        self.regs.set_flag(status::CARRY, flags.carry);
        self.regs.set_flag(status::OVERFLOW, flags.overflow);
        self.regs.set_flag(status::ZERO, flags.zero);
        self.regs.set_flag(status::NEGATIVE, flags.negative);
        if update_extend {
            self.regs.set_flag(status::EXTEND, flags.carry);
        }
    }
}
