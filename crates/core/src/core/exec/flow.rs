//! Control-flow and stack instruction handlers.
//!
//! Branch displacements are sign-extended at the decoded operand width and
//! added to the fall-through address. `call` of long (qword) operand size
//! performs an absolute jump, other sizes a relative one, always after
//! pushing the 8-byte return address. `ret` pops the return address and
//! hard-faults on an empty return stack. RTI/RTE verify the matching
//! active flag in the status control register before restoring; issuing
//! either outside an active handler is a hard fault.

use crate::common::data::{AccessType, OperandSize};
use crate::common::error::{Exception, HardFaultReason};
use crate::core::status;
use crate::core::Core;
use crate::isa::opcodes;
use crate::isa::operand::DecoderOutput;
use crate::soc::region::RegionMap;

impl Core {
    /// Conditional and unconditional branches.
    pub(super) fn exec_branch(
        &mut self,
        rec: &DecoderOutput,
        _soc: &mut RegionMap,
    ) -> Result<(), Exception> {
        let taken = match rec.opcode {
            opcodes::BRA => true,
            opcodes::BEQ => self.regs.flag(status::ZERO),
            opcodes::BNE => !self.regs.flag(status::ZERO),
            opcodes::BCS => self.regs.flag(status::CARRY),
            opcodes::BCC => !self.regs.flag(status::CARRY),
            opcodes::BMI => self.regs.flag(status::NEGATIVE),
            opcodes::BPL => !self.regs.flag(status::NEGATIVE),
            _ => false,
        };
        if taken {
            let disp = rec.size.sign_extend(rec.primary);
            self.regs.ip = self.regs.ip.wrapping_add(disp as u64);
        }
        Ok(())
    }

    /// `call`: push the return address, then jump.
    pub(super) fn exec_call(
        &mut self,
        rec: &DecoderOutput,
        soc: &mut RegionMap,
    ) -> Result<(), Exception> {
        let return_addr = self.regs.ip;
        self.push_qword(soc, return_addr)?;
        self.regs.ip = if rec.size == OperandSize::Qword {
            rec.primary
        } else {
            return_addr.wrapping_add(rec.size.sign_extend(rec.primary) as u64)
        };
        Ok(())
    }

    /// `ret`: pop the return address; hard fault on an empty return stack.
    pub(super) fn exec_ret(&mut self, soc: &mut RegionMap) -> Result<(), Exception> {
        if self.regs.sp() >= self.stack_base {
            return Err(Exception::hard(HardFaultReason::EmptyReturnStack));
        }
        self.regs.ip = self.pop_qword(soc)?;
        Ok(())
    }

    /// `push`: decrement the stack pointer and store the operand.
    pub(super) fn exec_push(
        &mut self,
        rec: &DecoderOutput,
        soc: &mut RegionMap,
    ) -> Result<(), Exception> {
        let sp = self.regs.sp().wrapping_sub(rec.size.bytes() as u64);
        self.mmu
            .write_value(soc, sp, rec.size, rec.primary)
            .map_err(Exception::Memory)?;
        self.regs.set_sp(sp);
        Ok(())
    }

    /// `pop`: load from the stack pointer, then increment it.
    pub(super) fn exec_pop(
        &mut self,
        rec: &DecoderOutput,
        soc: &mut RegionMap,
    ) -> Result<(), Exception> {
        let sp = self.regs.sp();
        let value = self
            .mmu
            .read_value(soc, sp, rec.size, AccessType::Read)
            .map_err(Exception::Memory)?;
        self.regs.set_sp(sp.wrapping_add(rec.size.bytes() as u64));
        self.write_destination(rec, value, soc)
    }

    /// `sys`: invoke the handler registered under the id in `d0`.
    pub(super) fn exec_sys(&mut self, soc: &mut RegionMap) -> Result<(), Exception> {
        let id = self.regs.data(0).qword();
        let Some(mut handler) = self.syscalls.remove(&id) else {
            return Err(Exception::hard(HardFaultReason::UnknownSyscall));
        };
        // The handler is temporarily detached so it can borrow the core's
        // registers and MMU without aliasing the registry.
        let result = handler(&mut self.regs, &mut self.mmu, soc);
        let _ = self.syscalls.insert(id, handler);
        result
    }

    /// `rti`/`rte`: restore the saved snapshot of the active handler.
    pub(super) fn exec_return_from_handler(&mut self, opcode: u8) -> Result<(), Exception> {
        if opcode == opcodes::RTI {
            self.return_from_interrupt()
        } else {
            self.return_from_exception()
        }
    }

    fn push_qword(&mut self, soc: &mut RegionMap, value: u64) -> Result<(), Exception> {
        let sp = self.regs.sp().wrapping_sub(8);
        self.mmu
            .write_value(soc, sp, OperandSize::Qword, value)
            .map_err(Exception::Memory)?;
        self.regs.set_sp(sp);
        Ok(())
    }

    fn pop_qword(&mut self, soc: &mut RegionMap) -> Result<u64, Exception> {
        let sp = self.regs.sp();
        let value = self
            .mmu
            .read_value(soc, sp, OperandSize::Qword, AccessType::Read)
            .map_err(Exception::Memory)?;
        self.regs.set_sp(sp.wrapping_add(8));
        Ok(value)
    }
}
