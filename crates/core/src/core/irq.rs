//! Interrupt and exception delivery.
//!
//! Two independent asynchronous-event state machines live here:
//! 1. **Interrupts:** eight per-line control blocks, each
//!    `Waiting → Flagged → Executing`. `raise_interrupt` is a no-op on a
//!    non-Waiting block or a masked line; `invoke_isr_handlers` runs once
//!    per tick, delivers the first enabled Flagged line in priority
//!    (ascending id) order, and allows at most one active ISR.
//! 2. **Exceptions:** a single control block, `Idle → Raised → Executing`.
//!    Exceptions are synchronous; a nested raise or a masked kind halts
//!    the core — unlike interrupts there is no silent drop, because an
//!    exception signals a fault condition that cannot be deferred.
//!
//! Delivery saves the full register file into the control block and loads
//! the vector-table entry; RTI/RTE restore the snapshot wholesale, which
//! also restores the pre-delivery status control registers.

use tracing::{debug, trace};

use crate::common::data::{AccessType, OperandSize};
use crate::common::error::{Exception, ExceptionKind, HardFaultReason};
use crate::core::regs::{
    CTRL_EXC_MASK, CTRL_EXC_STATUS, CTRL_INT_MASK, CTRL_INT_STATUS, Registers, STATUS_ACTIVE_BIT,
};
use crate::core::status;
use crate::core::Core;
use crate::soc::layout;
use crate::soc::region::RegionMap;

/// Number of interrupt lines (and per-line control blocks).
pub const NUM_IRQ_LINES: usize = 8;

/// State of one interrupt line's control block.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum IsrState {
    /// Nothing pending.
    #[default]
    Waiting,
    /// Raised and awaiting delivery.
    Flagged,
    /// Handler currently running.
    Executing,
}

/// Per-interrupt-line control block: delivery state plus the register-file
/// snapshot saved at handler entry. Created at core initialization, never
/// destroyed.
#[derive(Clone, Debug, Default)]
pub struct IsrControlBlock {
    /// Delivery state.
    pub state: IsrState,
    /// Register file saved at handler entry.
    pub saved: Option<Registers>,
}

/// State of the exception control block.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExcState {
    /// Nothing pending.
    #[default]
    Idle,
    /// Raised, delivery in progress.
    Raised,
    /// Handler currently running.
    Executing,
}

/// The single exception control block.
#[derive(Clone, Debug, Default)]
pub struct ExceptionControlBlock {
    /// Delivery state.
    pub state: ExcState,
    /// Register file saved at handler entry.
    pub saved: Option<Registers>,
    /// Kind being handled.
    pub kind: Option<ExceptionKind>,
}

impl Core {
    /// Raises interrupt line `line`.
    ///
    /// No-op if the line's control block is not Waiting or the
    /// corresponding interrupt-mask bit is disabled; otherwise the block
    /// becomes Flagged for the next `invoke_isr_handlers` scan.
    pub fn raise_interrupt(&mut self, line: usize) {
        let line = line % NUM_IRQ_LINES;
        let enabled = self.regs.ctrl(CTRL_INT_MASK) & (1 << line) != 0;
        let block = &mut self.isr_blocks[line];
        if !enabled || block.state != IsrState::Waiting {
            trace!(line, enabled, state = ?block.state, "interrupt raise ignored");
            return;
        }
        block.state = IsrState::Flagged;
        trace!(line, "interrupt flagged");
    }

    /// Scans for a deliverable interrupt; called once per core tick.
    ///
    /// Delivers the first enabled Flagged line in ascending-id priority
    /// order: saves the register file into the block, loads the
    /// vector-table entry into the instruction pointer, marks the block
    /// Executing, and sets the interrupt-active status bit. At most one
    /// ISR is active at a time; further Flagged lines wait. Delivery is
    /// also deferred while an exception handler is active.
    pub(crate) fn invoke_isr_handlers(&mut self, soc: &mut RegionMap) {
        if self.regs.ctrl(CTRL_INT_STATUS) & STATUS_ACTIVE_BIT != 0
            || self.regs.ctrl(CTRL_EXC_STATUS) & STATUS_ACTIVE_BIT != 0
        {
            return;
        }
        let mask = self.regs.ctrl(CTRL_INT_MASK);
        let Some(line) = (0..NUM_IRQ_LINES)
            .find(|&l| mask & (1 << l) != 0 && self.isr_blocks[l].state == IsrState::Flagged)
        else {
            return;
        };

        let vector_addr = layout::interrupt_vector(self.vector_base, line);
        let vector = match self
            .mmu
            .read_value(soc, vector_addr, OperandSize::Qword, AccessType::Read)
        {
            Ok(v) => v,
            Err(e) => {
                // The vector table itself is unreadable; surface as a
                // memory fault instead of delivering garbage.
                self.raise_exception(soc, Exception::Memory(e));
                return;
            }
        };

        self.isr_blocks[line].saved = Some(self.regs.clone());
        self.isr_blocks[line].state = IsrState::Executing;
        self.regs
            .set_ctrl(CTRL_INT_STATUS, STATUS_ACTIVE_BIT | line as u64);
        self.regs.ip = vector;
        self.stats.interrupts_taken += 1;
        debug!(line, vector = format_args!("{vector:#x}"), "interrupt delivered");
        self.flush_to(vector);
    }

    /// Raises a synchronous exception.
    ///
    /// A nested raise (one already Executing) and a masked kind both halt
    /// the core; otherwise the register file is saved, the matching vector
    /// is loaded, and the exception-active status bit is set.
    pub fn raise_exception(&mut self, soc: &mut RegionMap, exception: Exception) {
        let kind = exception.kind();
        self.stats.exceptions_raised += 1;
        debug!(%exception, ?kind, "exception raised");

        if self.exc_block.state == ExcState::Executing {
            debug!("nested exception is fatal; halting");
            self.halt();
            return;
        }
        if self.regs.ctrl(CTRL_EXC_MASK) & kind.mask_bit() == 0 {
            debug!(?kind, "exception kind disabled; halting");
            self.halt();
            return;
        }

        self.exc_block.state = ExcState::Raised;
        let vector_addr = layout::exception_vector(self.vector_base, kind.vector_index());
        let vector = match self
            .mmu
            .read_value(soc, vector_addr, OperandSize::Qword, AccessType::Read)
        {
            Ok(v) => v,
            Err(_) => {
                // Fault while delivering a fault: nothing left to do.
                self.exc_block.state = ExcState::Idle;
                self.halt();
                return;
            }
        };

        self.exc_block.saved = Some(self.regs.clone());
        self.exc_block.kind = Some(kind);
        self.exc_block.state = ExcState::Executing;
        self.regs.set_ctrl(
            CTRL_EXC_STATUS,
            STATUS_ACTIVE_BIT | kind.vector_index() as u64,
        );
        self.regs.ip = vector;
        self.flush_to(vector);
    }

    /// `rti`: restores the snapshot of the active interrupt handler.
    ///
    /// # Errors
    ///
    /// Hard fault if the interrupt-active status bit is clear or the named
    /// block is not Executing.
    pub(crate) fn return_from_interrupt(&mut self) -> Result<(), Exception> {
        let int_status = self.regs.ctrl(CTRL_INT_STATUS);
        if int_status & STATUS_ACTIVE_BIT == 0 {
            return Err(Exception::hard(HardFaultReason::RtiOutsideHandler));
        }
        let line = (int_status & 0xFF) as usize % NUM_IRQ_LINES;
        let block = &mut self.isr_blocks[line];
        if block.state != IsrState::Executing {
            return Err(Exception::hard(HardFaultReason::RtiOutsideHandler));
        }
        let Some(saved) = block.saved.take() else {
            return Err(Exception::hard(HardFaultReason::RtiOutsideHandler));
        };
        block.state = IsrState::Waiting;
        self.regs = saved;
        trace!(line, ip = format_args!("{:#x}", self.regs.ip), "rti");
        Ok(())
    }

    /// `rte`: restores the snapshot of the active exception handler.
    ///
    /// # Errors
    ///
    /// Hard fault if the exception-active status bit is clear or the block
    /// is not Executing.
    pub(crate) fn return_from_exception(&mut self) -> Result<(), Exception> {
        if self.regs.ctrl(CTRL_EXC_STATUS) & STATUS_ACTIVE_BIT == 0
            || self.exc_block.state != ExcState::Executing
        {
            return Err(Exception::hard(HardFaultReason::RteOutsideHandler));
        }
        let Some(saved) = self.exc_block.saved.take() else {
            return Err(Exception::hard(HardFaultReason::RteOutsideHandler));
        };
        self.exc_block.state = ExcState::Idle;
        self.exc_block.kind = None;
        self.regs = saved;
        trace!(ip = format_args!("{:#x}", self.regs.ip), "rte");
        Ok(())
    }

    /// Sets the halt flag; the core stops ticking until externally reset.
    pub fn halt(&mut self) {
        self.regs.set_flag(status::HALT, true);
    }
}
