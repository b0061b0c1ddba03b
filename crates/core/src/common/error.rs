//! Fault and exception definitions.
//!
//! This module defines the error taxonomy of the core:
//! 1. **Memory faults:** unmapped addresses, capability violations, bulk-copy overflow.
//! 2. **Exceptions:** synchronous conditions raised by decode and execute failures.
//! 3. **Queue errors:** dispatch-queue contract violations (full, empty, corrupt).
//!
//! Decode-time faults are detected before the dispatch queue is touched;
//! execute-time faults go through the same exception-raise path as `brk`, so
//! installed handler code can recover. There are no retry semantics: every
//! fault is either delivered as a synchronous exception or halts the core.

use thiserror::Error;

use super::data::AccessType;

/// A fault produced by the memory subsystem.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum MemFault {
    /// No region owns the address.
    #[error("no region maps address {addr:#x}")]
    Unmapped {
        /// The faulting address.
        addr: u64,
    },

    /// The owning region's capability flags do not permit the access.
    #[error("{access:?} access denied at {addr:#x}")]
    Protection {
        /// The faulting address.
        addr: u64,
        /// The access type that was denied.
        access: AccessType,
    },

    /// A bulk copy would overflow the destination storage.
    ///
    /// Bulk copies abort loudly rather than truncating.
    #[error("bulk copy of {len} bytes overflows backing storage at offset {offset:#x}")]
    CopyOverflow {
        /// Offset at which the copy was attempted.
        offset: u64,
        /// Length of the attempted copy.
        len: usize,
    },
}

/// The architectural exception kinds, one per exception vector slot.
///
/// Vector slots 4 and 5 of the vector table are reserved.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExceptionKind {
    /// Unrecognized opcode, unregistered extension, or malformed addressing mode.
    IllegalInstruction,
    /// Unrecoverable execution fault (empty-stack `ret`, RTI/RTE outside a handler, ...).
    HardFault,
    /// Memory access fault surfaced by the MMU.
    MemoryFault,
    /// `brk` instruction.
    Breakpoint,
}

impl ExceptionKind {
    /// Returns the index of this kind's slot in the exception vector table.
    pub fn vector_index(self) -> usize {
        match self {
            Self::IllegalInstruction => 0,
            Self::HardFault => 1,
            Self::MemoryFault => 2,
            Self::Breakpoint => 3,
        }
    }

    /// Returns the mask bit controlling delivery of this kind.
    pub fn mask_bit(self) -> u64 {
        1u64 << self.vector_index()
    }
}

/// Reason detail carried by a hard fault.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum HardFaultReason {
    /// `ret` executed with an empty return stack.
    #[error("return with empty stack")]
    EmptyReturnStack,
    /// `rti` executed while no interrupt handler is active.
    #[error("rti outside an active interrupt handler")]
    RtiOutsideHandler,
    /// `rte` executed while no exception handler is active.
    #[error("rte outside an active exception handler")]
    RteOutsideHandler,
    /// An instruction named an immediate-mode destination.
    #[error("write to immediate-mode destination")]
    ImmediateDestination,
    /// `sys` named a syscall id with no registered handler.
    #[error("unregistered syscall id")]
    UnknownSyscall,
    /// A dispatch-queue entry failed to deserialize.
    #[error("corrupt dispatch record")]
    CorruptDispatch,
}

/// A synchronous exception, raised by decode or execute failures.
///
/// Every variant maps onto one [`ExceptionKind`] vector slot via
/// [`Exception::kind`]; the payload exists for diagnostics and logging.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum Exception {
    /// The opcode byte names no known instruction.
    #[error("illegal instruction {opcode:#04x} at {ip:#x}")]
    IllegalInstruction {
        /// The unrecognized opcode byte.
        opcode: u8,
        /// Address of the faulting instruction.
        ip: u64,
    },

    /// The opcode byte selects an extension slot with nothing registered.
    #[error("unregistered extension opcode {opcode:#04x} at {ip:#x}")]
    UnknownExtension {
        /// The extension opcode byte.
        opcode: u8,
        /// Address of the faulting instruction.
        ip: u64,
    },

    /// An unrecoverable execution fault.
    #[error("hard fault: {reason}")]
    HardFault {
        /// What went wrong.
        reason: HardFaultReason,
    },

    /// A fault surfaced by the MMU.
    #[error("memory fault: {0}")]
    Memory(#[from] MemFault),

    /// A `brk` instruction was executed.
    #[error("breakpoint at {ip:#x}")]
    Breakpoint {
        /// Address of the `brk` instruction.
        ip: u64,
    },
}

impl Exception {
    /// Returns the vector-table kind this exception is delivered through.
    pub fn kind(&self) -> ExceptionKind {
        match self {
            Self::IllegalInstruction { .. } | Self::UnknownExtension { .. } => {
                ExceptionKind::IllegalInstruction
            }
            Self::HardFault { .. } => ExceptionKind::HardFault,
            Self::Memory(_) => ExceptionKind::MemoryFault,
            Self::Breakpoint { .. } => ExceptionKind::Breakpoint,
        }
    }

    /// Shorthand for constructing a hard fault.
    pub fn hard(reason: HardFaultReason) -> Self {
        Self::HardFault { reason }
    }
}

/// Dispatch-queue contract violations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum QueueError {
    /// Not enough free space for the entry.
    #[error("queue full: need {need} bytes, {free} free")]
    Full {
        /// Bytes required (header + payload).
        need: usize,
        /// Bytes currently free.
        free: usize,
    },

    /// Pop or peek on an empty queue.
    #[error("queue empty")]
    Empty,

    /// The declared payload size does not match what the consumer requested.
    #[error("queue entry declares {declared} bytes, consumer requested {requested}")]
    SizeMismatch {
        /// Size declared in the entry header.
        declared: usize,
        /// Size the consumer asked to pop.
        requested: usize,
    },

    /// A popped payload failed to deserialize.
    #[error("corrupt queue payload")]
    Corrupt,
}

/// Top-level error type returned by core and machine stepping.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A dispatch-queue invariant was violated (indicates an emulator bug).
    #[error("dispatch queue error: {0}")]
    Queue(#[from] QueueError),

    /// A memory fault escaped the exception path (e.g. during machine setup).
    #[error("memory fault: {0}")]
    Memory(#[from] MemFault),
}
