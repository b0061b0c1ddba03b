//! Memory regions and the fixed-size region table.
//!
//! A region is a contiguous address range with capability flags and an
//! owned backing bus. Regions are selected by the top address bits: the
//! table is indexed by `addr >> REGION_SHIFT`, making lookup O(1) and
//! keeping ranges non-overlapping by construction (each 256 MiB window
//! belongs to at most one region).

use thiserror::Error;

use crate::common::constants::{REGION_SHIFT, REGION_SLOTS};
use crate::common::data::AccessType;
use crate::common::error::MemFault;
use crate::soc::bus::RegionBus;

/// Region capability flags as explicit bit masks over a plain integer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RegionFlags(u8);

impl RegionFlags {
    /// Readable.
    pub const READ: Self = Self(1 << 0);
    /// Writable.
    pub const WRITE: Self = Self(1 << 1);
    /// Executable (instruction fetch permitted).
    pub const EXECUTE: Self = Self(1 << 2);
    /// Accesses may go through the cache.
    pub const CACHEABLE: Self = Self(1 << 3);
    /// Contents survive reset (flash/ROM).
    pub const NONVOLATILE: Self = Self(1 << 4);
    /// Backed by host callbacks rather than storage.
    pub const HARDWARE: Self = Self(1 << 5);

    /// Combines two flag sets.
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Returns whether every flag in `other` is set.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns whether the flags permit the given access type.
    pub fn permits(self, access: AccessType) -> bool {
        match access {
            AccessType::Fetch => self.contains(Self::EXECUTE),
            AccessType::Read => self.contains(Self::READ),
            AccessType::Write => self.contains(Self::WRITE),
        }
    }
}

impl std::ops::BitOr for RegionFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

/// A contiguous address range with capability flags and a backing bus.
#[derive(Debug)]
pub struct MemoryRegion {
    /// Diagnostic name (e.g. `"ram"`, `"flash"`).
    pub name: String,
    /// First address of the range.
    pub start: u64,
    /// Length of the range in bytes.
    pub len: u64,
    /// Capability flags.
    pub flags: RegionFlags,
    /// Owned backing bus.
    pub bus: RegionBus,
}

impl MemoryRegion {
    /// Returns the first address past the range.
    pub fn end(&self) -> u64 {
        self.start + self.len
    }

    /// Returns whether the range contains `addr`.
    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.start && addr < self.end()
    }
}

/// Errors from region-table construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum SocError {
    /// The range overlaps a window already owned by another region.
    #[error("region [{start:#x}, {start:#x}+{len:#x}) overlaps an existing region's window")]
    Overlap {
        /// Start of the rejected range.
        start: u64,
        /// Length of the rejected range.
        len: u64,
    },
    /// The range extends beyond the addressable window space.
    #[error("region [{start:#x}, {start:#x}+{len:#x}) exceeds the addressable space")]
    OutOfRange {
        /// Start of the rejected range.
        start: u64,
        /// Length of the rejected range.
        len: u64,
    },
    /// Zero-length regions are meaningless.
    #[error("region at {start:#x} has zero length")]
    Empty {
        /// Start of the rejected range.
        start: u64,
    },
}

/// The fixed-size table mapping address windows to regions.
#[derive(Debug)]
pub struct RegionMap {
    slots: [Option<u8>; REGION_SLOTS],
    regions: Vec<MemoryRegion>,
}

impl Default for RegionMap {
    fn default() -> Self {
        Self::new()
    }
}

impl RegionMap {
    /// Creates an empty region table.
    pub fn new() -> Self {
        Self {
            slots: [None; REGION_SLOTS],
            regions: Vec::new(),
        }
    }

    /// Adds a region, claiming every 256 MiB window its range touches.
    ///
    /// # Errors
    ///
    /// Fails if any touched window already belongs to another region, the
    /// range exceeds the addressable space, or the range is empty.
    pub fn add_region(&mut self, region: MemoryRegion) -> Result<usize, SocError> {
        let (start, len) = (region.start, region.len);
        if len == 0 {
            return Err(SocError::Empty { start });
        }
        let first = (start >> REGION_SHIFT) as usize;
        let last = ((start + len - 1) >> REGION_SHIFT) as usize;
        if last >= REGION_SLOTS {
            return Err(SocError::OutOfRange { start, len });
        }
        if self.slots[first..=last].iter().any(Option::is_some) {
            return Err(SocError::Overlap { start, len });
        }
        let id = self.regions.len() as u8;
        for slot in &mut self.slots[first..=last] {
            *slot = Some(id);
        }
        self.regions.push(region);
        Ok(id as usize)
    }

    /// O(1) lookup of the region owning `addr`.
    pub fn region_for(&self, addr: u64) -> Option<&MemoryRegion> {
        let window = (addr >> REGION_SHIFT) as usize;
        let id = *self.slots.get(window)?;
        let region = &self.regions[id? as usize];
        region.contains(addr).then_some(region)
    }

    /// O(1) mutable lookup of the region owning `addr`.
    pub fn region_for_mut(&mut self, addr: u64) -> Option<&mut MemoryRegion> {
        let window = (addr >> REGION_SHIFT) as usize;
        let id = (*self.slots.get(window)?)? as usize;
        if !self.regions[id].contains(addr) {
            return None;
        }
        Some(&mut self.regions[id])
    }

    /// Looks up the region owning `addr` and checks the access capability.
    ///
    /// # Errors
    ///
    /// [`MemFault::Unmapped`] when no region owns the address,
    /// [`MemFault::Protection`] when the region's flags deny the access.
    pub fn check(&self, addr: u64, access: AccessType) -> Result<&MemoryRegion, MemFault> {
        let region = self.region_for(addr).ok_or(MemFault::Unmapped { addr })?;
        if !region.flags.permits(access) {
            return Err(MemFault::Protection { addr, access });
        }
        Ok(region)
    }

    /// Returns the registered regions in insertion order.
    pub fn regions(&self) -> &[MemoryRegion] {
        &self.regions
    }
}
