//! Instruction decoder state machine.
//!
//! One `DecodeSlot` decodes one instruction over several ticks:
//!
//! ```text
//! Idle → DecodeAddrMode → ReadMem → [TwoOpDstReadMem] → Finished
//!   └→ DecodeExtension → Finished          (extension-nibble opcodes)
//! ```
//!
//! Each tick performs exactly one step:
//! (a) fetch the opcode byte and, for a known instruction, the metadata
//!     and operand descriptor bytes — after which the full encoded length
//!     is known; (b) resolve addressing-mode-dependent extra bytes
//!     (absolute addresses, relative descriptors) and the destination's
//!     effective address; (c) read the operand value(s) through the MMU,
//!     with a second read tick for instructions that need the
//!     destination's pre-existing value.
//!
//! An unrecognized opcode or an unregistered extension fails decode with
//! an illegal-instruction exception before anything reaches the dispatch
//! queue. Each slot owns its state and its captured instruction-pointer
//! snapshot, so concurrently decoding slots share no mutable state.

use tracing::trace;

use crate::common::data::{AccessType, OperandFamily, OperandSize};
use crate::common::error::Exception;
use crate::core::mmu::Mmu;
use crate::core::regs::Registers;
use crate::isa::opcodes::{self, OperandLayout};
use crate::isa::operand::{AddrMode, DecoderOutput, OperandSpec, RelMode};
use crate::isa::IsaRegistry;
use crate::soc::region::RegionMap;

/// Decoder state; see the module docs for the transition diagram.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DecodeState {
    /// Waiting to fetch the opcode.
    #[default]
    Idle,
    /// Resolving addressing-mode extra bytes.
    DecodeAddrMode,
    /// Reading the primary operand value.
    ReadMem,
    /// Reading the destination's pre-existing value.
    TwoOpDstReadMem,
    /// Deferring to a registered extension decoder.
    DecodeExtension,
    /// Record complete (or faulted), awaiting retirement.
    Finished,
}

/// What a finished slot hands to retirement.
#[derive(Clone, Debug)]
pub enum SlotOutcome {
    /// A root-set record for the dispatch queue.
    Root(DecoderOutput),
    /// An extension payload for the dispatch queue, tagged by opcode.
    Extension {
        /// The extension opcode byte (also the dispatch tag).
        opcode: u8,
        /// Opaque payload for the extension's executor.
        payload: Vec<u8>,
    },
    /// Decode failed; the exception to raise at retirement.
    Fault(Exception),
}

/// One decoder slot: private state for one in-flight instruction.
#[derive(Debug, Default)]
pub struct DecodeSlot {
    /// Whether the slot holds an in-flight instruction.
    pub active: bool,
    /// Current state.
    pub state: DecodeState,
    /// Sequence id; only the slot matching the retirement id may finalize.
    pub seq: u64,
    /// Captured address of the instruction's first byte.
    pub ip_start: u64,
    fetch_ip: u64,
    opcode: u8,
    layout: OperandLayout,
    size: OperandSize,
    family: OperandFamily,
    dst: OperandSpec,
    src: OperandSpec,
    dst_abs: u64,
    src_abs: u64,
    address: u64,
    primary: u64,
    secondary: u64,
    len: u8,
    len_known: bool,
    outcome: Option<SlotOutcome>,
}

impl DecodeSlot {
    /// Arms the slot for a new instruction at `ip`.
    pub fn begin(&mut self, seq: u64, ip: u64) {
        *self = Self {
            active: true,
            seq,
            ip_start: ip,
            fetch_ip: ip,
            ..Self::default()
        };
    }

    /// Clears the slot.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// The instruction's encoded length, once step (a) has determined it.
    pub fn known_len(&self) -> Option<u8> {
        self.len_known.then_some(self.len)
    }

    /// The finished slot's outcome.
    pub fn outcome(&self) -> Option<&SlotOutcome> {
        self.outcome.as_ref()
    }

    /// Takes the finished slot's outcome for retirement.
    pub fn take_outcome(&mut self) -> Option<SlotOutcome> {
        self.outcome.take()
    }

    /// Performs this slot's one step for the tick.
    pub fn tick(
        &mut self,
        regs: &Registers,
        mmu: &mut Mmu,
        soc: &mut RegionMap,
        registry: &mut IsaRegistry,
    ) {
        if !self.active {
            return;
        }
        match self.state {
            DecodeState::Idle => self.step_opcode(mmu, soc, registry),
            DecodeState::DecodeAddrMode => self.step_addr_modes(regs, mmu, soc),
            DecodeState::ReadMem => self.step_read_primary(regs, mmu, soc),
            DecodeState::TwoOpDstReadMem => self.step_read_secondary(regs, mmu, soc),
            DecodeState::DecodeExtension => self.step_extension(mmu, soc, registry),
            DecodeState::Finished => {}
        }
    }

    /// Step (a): opcode, metadata, and operand descriptor bytes.
    fn step_opcode(&mut self, mmu: &mut Mmu, soc: &mut RegionMap, registry: &mut IsaRegistry) {
        let opcode = match self.fetch(mmu, soc, 1) {
            Ok(v) => v as u8,
            Err(e) => return self.fault(e),
        };
        self.opcode = opcode;

        if opcodes::is_extension(opcode) {
            if registry.contains(opcode) {
                self.state = DecodeState::DecodeExtension;
            } else {
                self.fault(Exception::UnknownExtension {
                    opcode,
                    ip: self.ip_start,
                });
            }
            return;
        }

        let Some(layout) = opcodes::layout(opcode) else {
            return self.fault(Exception::IllegalInstruction {
                opcode,
                ip: self.ip_start,
            });
        };
        self.layout = layout;

        if layout == OperandLayout::None {
            self.len = 1;
            self.len_known = true;
            return self.finish_root();
        }

        let meta = match self.fetch(mmu, soc, 1) {
            Ok(v) => v as u8,
            Err(e) => return self.fault(e),
        };
        self.size = OperandSize::from_bits(meta);
        self.family = OperandFamily::from_bits(meta >> 4);
        if self.family != OperandFamily::Integer {
            // Float/SIMD families live in the extension opcode space.
            return self.fault(Exception::IllegalInstruction {
                opcode,
                ip: self.ip_start,
            });
        }

        let descriptors = if layout == OperandLayout::Two { 2 } else { 1 };
        for i in 0..descriptors {
            let byte = match self.fetch(mmu, soc, 1) {
                Ok(v) => v as u8,
                Err(e) => return self.fault(e),
            };
            let Some(spec) = OperandSpec::from_byte(byte) else {
                // Reserved relative-mode encoding: malformed addressing mode.
                return self.fault(Exception::IllegalInstruction {
                    opcode,
                    ip: self.ip_start,
                });
            };
            match (layout, i) {
                (OperandLayout::Two, 0) | (OperandLayout::OneWrite, 0) => self.dst = spec,
                _ => self.src = spec,
            }
        }

        let imm = if self.has_src() && self.src.mode == AddrMode::Immediate {
            self.size.bytes()
        } else {
            0
        };
        self.len = (1 + 1
            + descriptors
            + self.dst_extra_bytes()
            + self.src_extra_bytes()
            + imm) as u8;
        self.len_known = true;
        self.state = DecodeState::DecodeAddrMode;
        trace!(
            opcode = format_args!("{opcode:#04x}"),
            ip = format_args!("{:#x}", self.ip_start),
            len = self.len,
            "decoded opcode"
        );
    }

    /// Step (b): absolute addresses, relative descriptors, and the
    /// destination's effective address.
    fn step_addr_modes(&mut self, regs: &Registers, mmu: &mut Mmu, soc: &mut RegionMap) {
        if self.has_dst() {
            if self.dst.mode == AddrMode::Absolute {
                match self.fetch(mmu, soc, 8) {
                    Ok(v) => self.dst_abs = v,
                    Err(e) => return self.fault(e),
                }
            }
            if let Err(e) = self.fetch_rel_descriptor(true, mmu, soc) {
                return self.fault(e);
            }
        }
        if self.has_src() {
            if self.src.mode == AddrMode::Absolute {
                match self.fetch(mmu, soc, 8) {
                    Ok(v) => self.src_abs = v,
                    Err(e) => return self.fault(e),
                }
            }
            if let Err(e) = self.fetch_rel_descriptor(false, mmu, soc) {
                return self.fault(e);
            }
        }
        if self.has_dst() {
            self.address = effective_address(regs, self.dst, self.dst_abs);
        }
        self.state = DecodeState::ReadMem;
    }

    /// Step (c): the primary (source) operand value.
    fn step_read_primary(&mut self, regs: &Registers, mmu: &mut Mmu, soc: &mut RegionMap) {
        if self.has_src() {
            let value = match self.src.mode {
                AddrMode::Immediate => {
                    match self.fetch_sized(mmu, soc, self.size) {
                        Ok(v) => v,
                        Err(e) => return self.fault(e),
                    }
                }
                AddrMode::Register => regs.unified(self.src.reg).view(self.size),
                AddrMode::Absolute | AddrMode::Indirect => {
                    let ea = effective_address(regs, self.src, self.src_abs);
                    match mmu.read_value(soc, ea, self.size, AccessType::Read) {
                        Ok(v) => v,
                        Err(e) => return self.fault(Exception::Memory(e)),
                    }
                }
            };
            self.primary = value;
        }
        if opcodes::needs_secondary(self.opcode) {
            self.state = DecodeState::TwoOpDstReadMem;
        } else {
            self.finish_root();
        }
    }

    /// Second read tick: the destination's pre-existing value.
    fn step_read_secondary(&mut self, regs: &Registers, mmu: &mut Mmu, soc: &mut RegionMap) {
        self.secondary = match self.dst.mode {
            AddrMode::Register => regs.unified(self.dst.reg).view(self.size),
            AddrMode::Absolute | AddrMode::Indirect => {
                match mmu.read_value(soc, self.address, self.size, AccessType::Read) {
                    Ok(v) => v,
                    Err(e) => return self.fault(Exception::Memory(e)),
                }
            }
            // An immediate destination is faulted by the executor; there is
            // no stored value to read here.
            AddrMode::Immediate => 0,
        };
        self.finish_root();
    }

    /// Alternate branch: hand the instruction to the extension's decoder
    /// and forward its finished state.
    fn step_extension(&mut self, mmu: &mut Mmu, soc: &mut RegionMap, registry: &mut IsaRegistry) {
        let Some(ext) = registry.get_mut(self.opcode) else {
            // Registration checked at step (a); an unregister mid-decode is
            // an emulator bug, surfaced as the same exception.
            return self.fault(Exception::UnknownExtension {
                opcode: self.opcode,
                ip: self.ip_start,
            });
        };
        match ext.decode(self.ip_start, mmu, soc) {
            Ok(rec) => {
                self.len = rec.len;
                self.len_known = true;
                self.outcome = Some(SlotOutcome::Extension {
                    opcode: self.opcode,
                    payload: rec.payload,
                });
                self.state = DecodeState::Finished;
            }
            Err(e) => self.fault(e),
        }
    }

    fn finish_root(&mut self) {
        self.outcome = Some(SlotOutcome::Root(DecoderOutput {
            opcode: self.opcode,
            size: self.size,
            family: self.family,
            dst: self.dst,
            src: self.src,
            address: self.address,
            primary: self.primary,
            secondary: self.secondary,
            ip: self.ip_start,
            len: self.len,
        }));
        self.state = DecodeState::Finished;
    }

    fn fault(&mut self, e: Exception) {
        trace!(ip = format_args!("{:#x}", self.ip_start), %e, "decode fault");
        self.outcome = Some(SlotOutcome::Fault(e));
        self.state = DecodeState::Finished;
    }

    fn has_dst(&self) -> bool {
        matches!(self.layout, OperandLayout::Two | OperandLayout::OneWrite)
    }

    fn has_src(&self) -> bool {
        matches!(self.layout, OperandLayout::Two | OperandLayout::OneRead)
    }

    fn dst_extra_bytes(&self) -> usize {
        if self.has_dst() { self.dst.extra_bytes() } else { 0 }
    }

    fn src_extra_bytes(&self) -> usize {
        if self.has_src() { self.src.extra_bytes() } else { 0 }
    }

    fn fetch_rel_descriptor(
        &mut self,
        is_dst: bool,
        mmu: &mut Mmu,
        soc: &mut RegionMap,
    ) -> Result<(), Exception> {
        let spec = if is_dst { self.dst } else { self.src };
        let updated = match spec.rel {
            RelMode::None => return Ok(()),
            RelMode::Register => {
                let b = self.fetch(mmu, soc, 1)? as u8;
                OperandSpec {
                    rel_reg: b >> 4,
                    rel_shift: b & 0xF,
                    ..spec
                }
            }
            RelMode::Absolute => {
                let b = self.fetch(mmu, soc, 1)? as u8;
                OperandSpec {
                    rel_shift: b,
                    ..spec
                }
            }
        };
        if is_dst {
            self.dst = updated;
        } else {
            self.src = updated;
        }
        Ok(())
    }

    /// Fetches `n` instruction-stream bytes (little-endian), advancing the
    /// slot's private fetch pointer.
    fn fetch(&mut self, mmu: &mut Mmu, soc: &mut RegionMap, n: usize) -> Result<u64, Exception> {
        let mut buf = [0u8; 8];
        mmu.read(soc, self.fetch_ip, &mut buf[..n], AccessType::Fetch)
            .map_err(Exception::Memory)?;
        self.fetch_ip += n as u64;
        Ok(u64::from_le_bytes(buf))
    }

    fn fetch_sized(
        &mut self,
        mmu: &mut Mmu,
        soc: &mut RegionMap,
        size: OperandSize,
    ) -> Result<u64, Exception> {
        self.fetch(mmu, soc, size.bytes())
    }
}

/// Computes an operand's effective address from its spec, the register
/// file, and any decoded absolute address.
fn effective_address(regs: &Registers, spec: OperandSpec, abs: u64) -> u64 {
    let base = match spec.mode {
        AddrMode::Absolute => abs,
        AddrMode::Indirect => regs.unified(spec.reg).qword(),
        AddrMode::Immediate | AddrMode::Register => 0,
    };
    let offset = match spec.rel {
        RelMode::None => 0i64,
        RelMode::Register => (regs.unified(spec.rel_reg).qword() << spec.rel_shift) as i64,
        RelMode::Absolute => i64::from(spec.rel_shift as i8),
    };
    base.wrapping_add(offset as u64)
}
