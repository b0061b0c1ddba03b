//! Instruction set definitions: encoding, decoded records, and the
//! extension registry.
//!
//! The root instruction set is a closed opcode space (see [`opcodes`]);
//! opcodes in the reserved extension nibble defer decode, execute, and
//! disassembly to an [`InstructionSet`] implementation registered with the
//! core's [`IsaRegistry`]. The registry is an explicit value owned by each
//! core — there is no process-wide instruction-set state — so multi-core
//! and multi-instance tests stay independent.

/// Instruction encoding helpers (test/host-side assembler convenience).
pub mod encode;
/// Opcode byte values and per-opcode decode properties.
pub mod opcodes;
/// Decoded operand records and their dispatch wire format.
pub mod operand;

/// Rendering of decoded records to assembly-like text.
pub mod disasm;

use thiserror::Error;

use crate::common::error::Exception;
use crate::core::mmu::Mmu;
use crate::core::regs::Registers;
use crate::soc::region::RegionMap;

/// Record produced by an extension decoder: an opaque payload for the
/// matching executor, plus the instruction's encoded length.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtensionRecord {
    /// Opaque payload forwarded through the dispatch queue.
    pub payload: Vec<u8>,
    /// Total encoded length of the instruction in bytes.
    pub len: u8,
}

/// Capability interface implemented by every extension instruction set.
///
/// An implementation owns its own decoder state; the core only routes
/// opcode bytes in the extension nibble to it and forwards the resulting
/// payload from the dispatch queue back to `execute`.
pub trait InstructionSet {
    /// Short name for diagnostics (e.g. `"fp64"`).
    fn name(&self) -> &'static str;

    /// Decodes one instruction starting at `ip` (the extension opcode byte
    /// included), reading through the MMU.
    ///
    /// # Errors
    ///
    /// Returns the exception to raise for a malformed encoding or a decode-
    /// time memory fault.
    fn decode(
        &mut self,
        ip: u64,
        mmu: &mut Mmu,
        soc: &mut RegionMap,
    ) -> Result<ExtensionRecord, Exception>;

    /// Executes one previously decoded payload.
    ///
    /// On success the implementation must leave `regs.ip` at the address
    /// of the next instruction (normally the decoded instruction's start
    /// plus its length); the core refetches from there.
    ///
    /// # Errors
    ///
    /// Returns the exception to raise for an execution fault.
    fn execute(
        &mut self,
        payload: &[u8],
        regs: &mut Registers,
        mmu: &mut Mmu,
        soc: &mut RegionMap,
    ) -> Result<(), Exception>;

    /// Renders a previously decoded payload as assembly-like text.
    fn disassemble(&self, payload: &[u8]) -> String;
}

/// Errors from extension registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The opcode byte is outside the reserved extension nibble.
    #[error("opcode {opcode:#04x} is not in the extension space")]
    NotExtensionOpcode {
        /// The offending opcode byte.
        opcode: u8,
    },
    /// The opcode byte already has a registered extension.
    #[error("extension opcode {opcode:#04x} is already registered")]
    SlotTaken {
        /// The offending opcode byte.
        opcode: u8,
    },
}

/// Per-core registry of extension instruction sets, keyed by the low
/// nibble of the extension opcode byte.
pub struct IsaRegistry {
    slots: [Option<Box<dyn InstructionSet>>; 16],
}

impl IsaRegistry {
    /// Creates an empty registry (root set only).
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| None),
        }
    }

    /// Registers an extension for one opcode byte in the extension nibble.
    ///
    /// # Errors
    ///
    /// Fails if the opcode is outside the extension space or already taken.
    pub fn register(
        &mut self,
        opcode: u8,
        set: Box<dyn InstructionSet>,
    ) -> Result<(), RegistryError> {
        if !opcodes::is_extension(opcode) {
            return Err(RegistryError::NotExtensionOpcode { opcode });
        }
        let slot = &mut self.slots[(opcode & 0xF) as usize];
        if slot.is_some() {
            return Err(RegistryError::SlotTaken { opcode });
        }
        *slot = Some(set);
        Ok(())
    }

    /// Returns whether an extension is registered for the opcode byte.
    pub fn contains(&self, opcode: u8) -> bool {
        opcodes::is_extension(opcode) && self.slots[(opcode & 0xF) as usize].is_some()
    }

    /// Returns the extension registered for the opcode byte, if any.
    pub fn get_mut(&mut self, opcode: u8) -> Option<&mut (dyn InstructionSet + 'static)> {
        if !opcodes::is_extension(opcode) {
            return None;
        }
        self.slots[(opcode & 0xF) as usize].as_deref_mut()
    }
}

impl Default for IsaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for IsaRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self
            .slots
            .iter()
            .flatten()
            .map(|s| s.name())
            .collect();
        f.debug_struct("IsaRegistry").field("extensions", &names).finish()
    }
}
