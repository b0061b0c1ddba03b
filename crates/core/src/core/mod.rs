//! CPU core: registers, decode pipeline, dispatch queue, executor, MMU,
//! and the interrupt/exception controllers, composed behind a single
//! tick entry point.
//!
//! A tick is one bounded, synchronous step: deliver at most one pending
//! interrupt, execute at most one dispatched instruction, then advance
//! every decoder slot one state. "Blocking" anywhere in the core means
//! the same step repeats on the next tick; there is no suspension
//! primitive. Given the same initial registers and memory, two runs of
//! the same instruction stream produce identical final state.

/// Per-core cache controller (MESI client side).
pub mod cache;
/// Instruction decoder state machine.
pub mod decode;
/// Dispatch queue between decoder and executor.
pub mod dispatch;
/// Instruction executor.
pub mod exec;
/// Interrupt and exception delivery.
pub mod irq;
/// Memory management unit.
pub mod mmu;
/// Decode pipeline with in-order retirement.
pub mod pipeline;
/// Architectural register file.
pub mod regs;
/// Status flag register bits.
pub mod status;

use std::collections::HashMap;

use crate::common::data::{AccessType, OperandSize};
use crate::common::error::{CoreError, Exception, MemFault};
use crate::config::CoreConfig;
use crate::core::dispatch::DispatchQueue;
use crate::core::irq::{ExceptionControlBlock, IsrControlBlock, NUM_IRQ_LINES};
use crate::core::mmu::Mmu;
use crate::core::pipeline::DecodePipeline;
use crate::core::regs::{CTRL_MMU_CTRL, MMU_CTRL_CACHE_ENABLE, Registers};
use crate::isa::{InstructionSet, IsaRegistry, RegistryError};
use crate::soc::layout;
use crate::soc::region::RegionMap;
use crate::stats::CoreStats;

/// A registered syscall handler.
///
/// Arguments are passed in registers by the convention of the specific
/// syscall; the handler may touch memory through the MMU.
pub type SyscallHandler =
    Box<dyn FnMut(&mut Registers, &mut Mmu, &mut RegionMap) -> Result<(), Exception> + Send>;

/// One emulated CPU core.
pub struct Core {
    /// Architectural register file.
    pub regs: Registers,
    /// This core's MMU (and cache controller).
    pub mmu: Mmu,
    /// Dispatch queue between decode and execute.
    pub queue: DispatchQueue,
    /// Per-line interrupt control blocks.
    pub isr_blocks: [IsrControlBlock; NUM_IRQ_LINES],
    /// The exception control block.
    pub exc_block: ExceptionControlBlock,
    /// Event counters.
    pub stats: CoreStats,
    pipeline: DecodePipeline,
    registry: IsaRegistry,
    syscalls: HashMap<u64, SyscallHandler>,
    vector_base: u64,
    stack_base: u64,
}

impl std::fmt::Debug for Core {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Core")
            .field("ip", &self.regs.ip)
            .field("halted", &self.regs.halted())
            .field("stats", &self.stats)
            .finish()
    }
}

impl Core {
    /// Creates a core with the given id, configuration, and MMU.
    ///
    /// `vector_base` is the RAM address of the memory-mapped control block
    /// (vector table) this core reads its entry points from.
    pub fn new(cpu_id: u64, config: &CoreConfig, mmu: Mmu, vector_base: u64) -> Self {
        Self {
            regs: Registers::new(cpu_id),
            mmu,
            queue: DispatchQueue::new(config.dispatch_capacity),
            isr_blocks: std::array::from_fn(|_| IsrControlBlock::default()),
            exc_block: ExceptionControlBlock::default(),
            stats: CoreStats::default(),
            pipeline: DecodePipeline::new(config.decode_slots),
            registry: IsaRegistry::new(),
            syscalls: HashMap::new(),
            vector_base,
            stack_base: 0,
        }
    }

    /// Advances the core one tick.
    ///
    /// A halted core ticks as a no-op until externally reset.
    ///
    /// # Errors
    ///
    /// Only emulator-internal invariant violations (queue corruption)
    /// surface here; guest faults are delivered as exceptions or halt the
    /// core.
    pub fn tick(&mut self, soc: &mut RegionMap) -> Result<(), CoreError> {
        if self.regs.halted() {
            return Ok(());
        }
        self.stats.ticks += 1;
        self.mmu.cache_enabled =
            self.regs.ctrl(CTRL_MMU_CTRL) & MMU_CTRL_CACHE_ENABLE != 0;

        self.invoke_isr_handlers(soc);
        if self.regs.halted() {
            return Ok(());
        }

        self.execute_step(soc)?;
        if self.regs.halted() {
            return Ok(());
        }

        let Self {
            pipeline,
            regs,
            mmu,
            registry,
            queue,
            ..
        } = self;
        if let Some((exception, fault_ip)) = pipeline.tick(regs, mmu, soc, registry, queue) {
            // Decode faults are raised in program order, before anything
            // reaches the dispatch queue.
            self.stats.decode_faults += 1;
            self.regs.ip = fault_ip;
            self.raise_exception(soc, exception);
        }
        Ok(())
    }

    /// Runs ticks until one more instruction retires, the core halts, or
    /// `max_ticks` elapse. Convenience for hosts and tests.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`Core::tick`].
    pub fn step_instruction(&mut self, soc: &mut RegionMap, max_ticks: u64) -> Result<(), CoreError> {
        let retired = self.stats.instructions_retired;
        for _ in 0..max_ticks {
            self.tick(soc)?;
            if self.stats.instructions_retired > retired || self.regs.halted() {
                break;
            }
        }
        Ok(())
    }

    /// Returns whether the halt flag is set.
    pub fn is_halted(&self) -> bool {
        self.regs.halted()
    }

    /// Reads the initial stack pointer and program counter from the
    /// vector table and redirects the pipeline to the entry point.
    ///
    /// # Errors
    ///
    /// Fails if the vector table is unreadable.
    pub fn reset(&mut self, soc: &mut RegionMap) -> Result<(), MemFault> {
        let sp = self.mmu.read_value(
            soc,
            self.vector_base + layout::INIT_SP,
            OperandSize::Qword,
            AccessType::Read,
        )?;
        let pc = self.mmu.read_value(
            soc,
            self.vector_base + layout::INIT_PC,
            OperandSize::Qword,
            AccessType::Read,
        )?;
        let cpu_id = self.regs.ctrl(regs::CTRL_CPU_ID);
        self.regs = Registers::new(cpu_id);
        self.set_stack(sp);
        self.set_entry(pc);
        Ok(())
    }

    /// Redirects execution to `ip`, flushing the pipeline.
    pub fn set_entry(&mut self, ip: u64) {
        self.regs.ip = ip;
        self.flush_to(ip);
    }

    /// Sets the stack pointer and records it as the empty-stack watermark
    /// used by `ret`.
    pub fn set_stack(&mut self, sp: u64) {
        self.regs.set_sp(sp);
        self.stack_base = sp;
    }

    /// Registers an extension instruction set for one extension opcode.
    ///
    /// # Errors
    ///
    /// Fails if the opcode is outside the extension space or taken.
    pub fn register_extension(
        &mut self,
        opcode: u8,
        set: Box<dyn InstructionSet>,
    ) -> Result<(), RegistryError> {
        self.registry.register(opcode, set)
    }

    /// Registers a syscall handler under a numeric id; replaces any
    /// previous handler for that id.
    pub fn register_syscall(&mut self, id: u64, handler: SyscallHandler) {
        let _ = self.syscalls.insert(id, handler);
    }

    /// Discards every in-flight decode and queued record, restarting
    /// fetch at `ip`. Used after every control-flow redirect.
    pub(crate) fn flush_to(&mut self, ip: u64) {
        self.queue.clear();
        self.pipeline.redirect(ip);
    }
}
