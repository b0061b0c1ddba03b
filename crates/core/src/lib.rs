//! m64k emulator library.
//!
//! This crate implements an emulator for the m64k 64-bit CPU architecture:
//! 1. **Core:** multi-tick decode state machine, dispatch queue, executor,
//!    register file, and interrupt/exception delivery.
//! 2. **Memory:** region-mapped address space, per-core MMU, and an L1
//!    cache model speaking MESI over a shared snoop bus.
//! 3. **ISA:** the closed root instruction set plus a per-core extension
//!    registry with decode/execute/disassemble capability hooks.
//! 4. **Simulation:** machine composition, flat/ELF image loading, and
//!    event statistics.

/// Common types and constants (values, sizes, access types, faults).
pub mod common;
/// Machine configuration (defaults, hierarchical config structures).
pub mod config;
/// CPU core (registers, decode, dispatch, execute, cache, MMU, IRQ).
pub mod core;
/// Instruction set (opcodes, operand records, encoding, disassembly, registry).
pub mod isa;
/// Machine composition and image loading.
pub mod sim;
/// System-on-chip building blocks (regions, buses, snoop bus, peripherals).
pub mod soc;
/// Event counters.
pub mod stats;

/// Root configuration type; use `Config::default()` or deserialize from JSON.
pub use crate::config::Config;
/// One emulated CPU core; holds registers, pipeline, MMU, and controllers.
pub use crate::core::Core;
/// A complete machine; construct with `Machine::new(&Config::default())`.
pub use crate::sim::machine::Machine;
