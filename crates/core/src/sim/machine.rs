//! Machine composition: regions, cores, timers, and the coherent bus.
//!
//! A machine is a small number of independent cores sharing one coherent
//! memory bus. Cores are ticked sequentially in index order — cross-core
//! effects happen only through bus messages — so a run is deterministic
//! for a given configuration and image.

use thiserror::Error;

use crate::common::data::{AccessType, OperandSize};
use crate::common::error::{CoreError, MemFault};
use crate::config::Config;
use crate::core::cache::CacheController;
use crate::core::mmu::Mmu;
use crate::core::Core;
use crate::soc::bus::{FlashBus, HardwareBus, HardwareReadHook, HardwareWriteHook, RegionBus};
use crate::soc::layout;
use crate::soc::region::{MemoryRegion, RegionFlags, RegionMap, SocError};
use crate::soc::snoop::SnoopBus;
use crate::soc::timer::Timer;

/// Errors from machine construction and reset.
#[derive(Debug, Error)]
pub enum MachineError {
    /// Region-table construction failed.
    #[error("region setup: {0}")]
    Soc(#[from] SocError),
    /// A memory access during setup or reset failed.
    #[error("memory access: {0}")]
    Memory(#[from] MemFault),
}

/// A complete emulated machine.
pub struct Machine {
    /// The region table shared by every core.
    pub soc: RegionMap,
    /// The cores, ticked in index order.
    pub cores: Vec<Core>,
    /// Peripheral timers; expiring lines are raised on core 0.
    pub timers: Vec<Timer>,
    coherent: SnoopBus,
}

impl std::fmt::Debug for Machine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Machine")
            .field("cores", &self.cores.len())
            .field("regions", &self.soc.regions().len())
            .field("timers", &self.timers.len())
            .finish()
    }
}

impl Machine {
    /// Builds a machine from a configuration: coherent RAM (with the
    /// memory-mapped control block at its base), optional flash, and one
    /// core per `machine.cores` — each with its own cache controller
    /// subscribed to the shared snoop bus.
    ///
    /// # Errors
    ///
    /// Fails if the configured regions overlap or fall outside the
    /// addressable space.
    pub fn new(config: &Config) -> Result<Self, MachineError> {
        let mut soc = RegionMap::new();
        let coherent = SnoopBus::new(config.machine.ram_base, config.machine.ram_size);

        let _ = soc.add_region(MemoryRegion {
            name: "ram".to_string(),
            start: config.machine.ram_base,
            len: config.machine.ram_size as u64,
            flags: RegionFlags::READ
                | RegionFlags::WRITE
                | RegionFlags::EXECUTE
                | RegionFlags::CACHEABLE,
            bus: RegionBus::Coherent(coherent.clone()),
        })?;

        if let Some(flash_base) = config.machine.flash_base {
            let _ = soc.add_region(MemoryRegion {
                name: "flash".to_string(),
                start: flash_base,
                len: config.machine.flash_size as u64,
                flags: RegionFlags::READ | RegionFlags::EXECUTE | RegionFlags::NONVOLATILE,
                bus: RegionBus::Flash(FlashBus::new(flash_base, config.machine.flash_size)),
            })?;
        }

        let cores = (0..config.machine.cores.max(1))
            .map(|id| {
                let cache = config
                    .cache
                    .enabled
                    .then(|| CacheController::attach(&coherent, config.cache.lines));
                Core::new(
                    id as u64,
                    &config.core,
                    Mmu::new(cache),
                    config.machine.ram_base,
                )
            })
            .collect();

        Ok(Self {
            soc,
            cores,
            timers: Vec::new(),
            coherent,
        })
    }

    /// Returns the shared coherent bus (bypass reads/writes, diagnostics).
    pub fn coherent_bus(&self) -> &SnoopBus {
        &self.coherent
    }

    /// Maps a hardware-backed region at `[base, base + len)`.
    ///
    /// # Errors
    ///
    /// Fails if the range collides with an existing region's windows.
    pub fn add_hardware_region(
        &mut self,
        name: &str,
        base: u64,
        len: u64,
        read_hook: HardwareReadHook,
        write_hook: HardwareWriteHook,
    ) -> Result<usize, SocError> {
        self.soc.add_region(MemoryRegion {
            name: name.to_string(),
            start: base,
            len,
            flags: RegionFlags::READ | RegionFlags::WRITE | RegionFlags::HARDWARE,
            bus: RegionBus::Hardware(HardwareBus::new(base, read_hook, write_hook)),
        })
    }

    /// Adds a timer raising `line` every `period` ticks.
    pub fn add_timer(&mut self, period: u64, line: u8) {
        self.timers.push(Timer::new(period, line));
    }

    /// Reads the timer configuration block from RAM and installs a timer
    /// if it is enabled with a nonzero period.
    ///
    /// # Errors
    ///
    /// Fails if the control block is unreadable.
    pub fn load_timer_config(&mut self) -> Result<(), MemFault> {
        let base = self.coherent.base();
        let mmu = &mut self.cores[0].mmu;
        let period = mmu.read_value(
            &mut self.soc,
            base + layout::TIMER_PERIOD,
            OperandSize::Qword,
            AccessType::Read,
        )?;
        let line = mmu.read_value(
            &mut self.soc,
            base + layout::TIMER_LINE,
            OperandSize::Qword,
            AccessType::Read,
        )?;
        let enable = mmu.read_value(
            &mut self.soc,
            base + layout::TIMER_ENABLE,
            OperandSize::Qword,
            AccessType::Read,
        )?;
        if enable != 0 && period != 0 {
            self.add_timer(period, line as u8);
        }
        Ok(())
    }

    /// Resets every core from the vector table and reloads the timer
    /// configuration block.
    ///
    /// # Errors
    ///
    /// Fails if the control block is unreadable.
    pub fn reset(&mut self) -> Result<(), MachineError> {
        for core in &mut self.cores {
            core.reset(&mut self.soc)?;
        }
        self.timers.clear();
        self.load_timer_config()?;
        Ok(())
    }

    /// Bulk-loads an image at `addr`, bypassing the caches (flushing them
    /// first). Aborts loudly if the image would overflow its region.
    ///
    /// # Errors
    ///
    /// Routing and overflow faults from the MMU.
    pub fn load_image(&mut self, addr: u64, image: &[u8]) -> Result<(), MemFault> {
        for core in &mut self.cores {
            let _ = core.mmu.flush()?;
        }
        self.cores[0].mmu.load_image(&mut self.soc, addr, image)
    }

    /// Advances the machine one tick: timers first, then every core in
    /// index order.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`Core::tick`].
    pub fn tick(&mut self) -> Result<(), CoreError> {
        for timer in &mut self.timers {
            if let Some(line) = timer.tick() {
                self.cores[0].raise_interrupt(line as usize);
            }
        }
        for core in &mut self.cores {
            core.tick(&mut self.soc)?;
        }
        Ok(())
    }

    /// Runs until every core halts or `max_ticks` elapse; returns the
    /// number of ticks executed.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`Core::tick`].
    pub fn run(&mut self, max_ticks: u64) -> Result<u64, CoreError> {
        for done in 0..max_ticks {
            if self.all_halted() {
                return Ok(done);
            }
            self.tick()?;
        }
        Ok(max_ticks)
    }

    /// Returns whether every core has halted.
    pub fn all_halted(&self) -> bool {
        self.cores.iter().all(Core::is_halted)
    }

    /// Shared access to core `idx`.
    pub fn core(&self, idx: usize) -> &Core {
        &self.cores[idx]
    }

    /// Mutable access to core `idx`.
    pub fn core_mut(&mut self, idx: usize) -> &mut Core {
        &mut self.cores[idx]
    }
}
