//! Per-region transport buses.
//!
//! Every memory region owns exactly one bus. Three concrete variants exist:
//! 1. **Coherent:** cache-coherent RAM on the shared snoop bus.
//! 2. **Flash:** non-coherent, non-volatile storage with plain byte access.
//! 3. **Hardware:** callback-driven, for host-mapped peripherals.
//!
//! The enum is a closed set on purpose: the MMU dispatches on it and the
//! decode/execute paths stay exhaustively checkable.

use crate::common::error::MemFault;
use crate::soc::memory::MemoryArena;
use crate::soc::snoop::SnoopBus;

/// Read hook of a hardware-mapped region; offsets are region-relative.
pub type HardwareReadHook = Box<dyn FnMut(u64, &mut [u8]) + Send>;
/// Write hook of a hardware-mapped region; offsets are region-relative.
pub type HardwareWriteHook = Box<dyn FnMut(u64, &[u8]) + Send>;

/// Non-coherent flash/ROM storage.
#[derive(Clone, Debug)]
pub struct FlashBus {
    base: u64,
    arena: MemoryArena,
}

impl FlashBus {
    /// Creates blank (zero-filled) flash of `len` bytes based at `base`.
    pub fn new(base: u64, len: usize) -> Self {
        Self {
            base,
            arena: MemoryArena::new(len),
        }
    }

    /// Creates flash holding an initial image, zero-padded to `len`.
    ///
    /// # Errors
    ///
    /// Fails if the image exceeds `len`.
    pub fn with_image(base: u64, len: usize, image: &[u8]) -> Result<Self, MemFault> {
        Ok(Self {
            base,
            arena: MemoryArena::with_image(len, image)?,
        })
    }

    fn read(&self, addr: u64, buf: &mut [u8]) -> Result<(), MemFault> {
        self.arena.read(addr - self.base, buf)
    }

    fn write(&mut self, addr: u64, data: &[u8]) -> Result<(), MemFault> {
        self.arena.write(addr - self.base, data)
    }
}

/// Callback-driven bus for hardware-mapped I/O.
pub struct HardwareBus {
    base: u64,
    read_hook: HardwareReadHook,
    write_hook: HardwareWriteHook,
}

impl HardwareBus {
    /// Creates a hardware bus based at `base` with the given hooks.
    pub fn new(base: u64, read_hook: HardwareReadHook, write_hook: HardwareWriteHook) -> Self {
        Self {
            base,
            read_hook,
            write_hook,
        }
    }
}

impl std::fmt::Debug for HardwareBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HardwareBus").field("base", &self.base).finish()
    }
}

/// The bus owned by one memory region.
#[derive(Debug)]
pub enum RegionBus {
    /// Cache-coherent RAM; a handle onto the machine's shared snoop bus.
    Coherent(SnoopBus),
    /// Non-coherent flash/ROM.
    Flash(FlashBus),
    /// Callback-driven hardware-mapped I/O.
    Hardware(HardwareBus),
}

impl RegionBus {
    /// Byte-granular read at an absolute address.
    ///
    /// For the coherent variant this bypasses every cache; cacheable
    /// traffic goes through the cache controller instead.
    ///
    /// # Errors
    ///
    /// Fails if the range falls outside the bus's storage.
    pub fn read(&mut self, addr: u64, buf: &mut [u8]) -> Result<(), MemFault> {
        match self {
            Self::Coherent(bus) => bus.read_bytes(addr, buf),
            Self::Flash(flash) => flash.read(addr, buf),
            Self::Hardware(hw) => {
                (hw.read_hook)(addr - hw.base, buf);
                Ok(())
            }
        }
    }

    /// Byte-granular write at an absolute address.
    ///
    /// # Errors
    ///
    /// Fails if the range falls outside the bus's storage.
    pub fn write(&mut self, addr: u64, data: &[u8]) -> Result<(), MemFault> {
        match self {
            Self::Coherent(bus) => bus.write_bytes(addr, data),
            Self::Flash(flash) => flash.write(addr, data),
            Self::Hardware(hw) => {
                (hw.write_hook)(addr - hw.base, data);
                Ok(())
            }
        }
    }
}
