//! Memory management unit.
//!
//! The MMU is the single gateway for every memory access. Given an
//! address it:
//! 1. Finds the owning region via the top address bits (O(1) table lookup).
//! 2. Checks the region's capability flags against the access type.
//! 3. Routes cacheable accesses through the per-core cache controller and
//!    everything else to the region's bus with byte-granular semantics.
//!
//! Accesses that cross a cache-line or region boundary are split into
//! correctly sized sub-operations. Invalid addresses fail with a
//! distinguishable [`MemFault`] — never by reading indeterminate memory.

use crate::common::constants::CACHE_LINE_BYTES;
use crate::common::data::{AccessType, OperandSize};
use crate::common::error::MemFault;
use crate::core::cache::CacheController;
use crate::soc::region::{RegionFlags, RegionMap};

/// One core's MMU, owning that core's cache controller.
#[derive(Debug)]
pub struct Mmu {
    cache: Option<CacheController>,
    /// Mirrors the cache-enable bit of the MMU control register.
    pub cache_enabled: bool,
}

impl Mmu {
    /// Creates an MMU; pass `None` to run without a cache (all accesses go
    /// straight to the region buses).
    pub fn new(cache: Option<CacheController>) -> Self {
        Self {
            cache,
            cache_enabled: true,
        }
    }

    /// Returns the cache controller, if one is attached.
    pub fn cache(&self) -> Option<&CacheController> {
        self.cache.as_ref()
    }

    /// Mutable access to the cache controller, if one is attached.
    pub fn cache_mut(&mut self) -> Option<&mut CacheController> {
        self.cache.as_mut()
    }

    /// Reads `buf.len()` bytes starting at `addr`.
    ///
    /// # Errors
    ///
    /// [`MemFault::Unmapped`] or [`MemFault::Protection`] on routing
    /// failures; bus faults are forwarded.
    pub fn read(
        &mut self,
        soc: &mut RegionMap,
        addr: u64,
        buf: &mut [u8],
        access: AccessType,
    ) -> Result<(), MemFault> {
        self.split(soc, addr, buf.len(), access, |mmu, soc, chunk_addr, range| {
            let cacheable = mmu.use_cache(soc, chunk_addr);
            let region = soc.region_for_mut(chunk_addr).ok_or(MemFault::Unmapped {
                addr: chunk_addr,
            })?;
            let chunk = &mut buf[range];
            if cacheable {
                if let Some(cache) = mmu.cache.as_mut() {
                    return cache.read(chunk_addr, chunk);
                }
            }
            region.bus.read(chunk_addr, chunk)
        })
    }

    /// Writes `data` starting at `addr`.
    ///
    /// # Errors
    ///
    /// [`MemFault::Unmapped`] or [`MemFault::Protection`] on routing
    /// failures; bus faults are forwarded.
    pub fn write(
        &mut self,
        soc: &mut RegionMap,
        addr: u64,
        data: &[u8],
    ) -> Result<(), MemFault> {
        self.split(
            soc,
            addr,
            data.len(),
            AccessType::Write,
            |mmu, soc, chunk_addr, range| {
                let cacheable = mmu.use_cache(soc, chunk_addr);
                let region = soc.region_for_mut(chunk_addr).ok_or(MemFault::Unmapped {
                    addr: chunk_addr,
                })?;
                let chunk = &data[range];
                if cacheable {
                    if let Some(cache) = mmu.cache.as_mut() {
                        return cache.write(chunk_addr, chunk);
                    }
                }
                region.bus.write(chunk_addr, chunk)
            },
        )
    }

    /// Reads a little-endian value of the given operand width.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`Mmu::read`].
    pub fn read_value(
        &mut self,
        soc: &mut RegionMap,
        addr: u64,
        size: OperandSize,
        access: AccessType,
    ) -> Result<u64, MemFault> {
        let mut buf = [0u8; 8];
        self.read(soc, addr, &mut buf[..size.bytes()], access)?;
        Ok(u64::from_le_bytes(buf))
    }

    /// Writes a little-endian value of the given operand width.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`Mmu::write`].
    pub fn write_value(
        &mut self,
        soc: &mut RegionMap,
        addr: u64,
        size: OperandSize,
        value: u64,
    ) -> Result<(), MemFault> {
        let bytes = value.to_le_bytes();
        self.write(soc, addr, &bytes[..size.bytes()])
    }

    /// Prefetches the line containing `addr` into the cache, if the region
    /// is cacheable; a no-op otherwise.
    ///
    /// # Errors
    ///
    /// Routing failures as in [`Mmu::read`].
    pub fn touch(&mut self, soc: &mut RegionMap, addr: u64) -> Result<(), MemFault> {
        let _ = soc.check(addr, AccessType::Read)?;
        if self.use_cache(soc, addr) {
            if let Some(cache) = self.cache.as_mut() {
                cache.touch(addr)?;
            }
        }
        Ok(())
    }

    /// Writes every Modified cache line back to RAM.
    ///
    /// # Errors
    ///
    /// Forwards bus faults from the write-backs.
    pub fn flush(&mut self) -> Result<u64, MemFault> {
        match self.cache.as_mut() {
            Some(cache) => cache.flush(),
            None => Ok(0),
        }
    }

    /// Bulk copy into memory, bypassing the cache.
    ///
    /// Used by the loader; flushes first so the bypass cannot be overtaken
    /// by stale Modified lines, and aborts loudly if the image would
    /// overflow the destination region.
    ///
    /// # Errors
    ///
    /// Routing and overflow failures; no partial-success retry semantics.
    pub fn load_image(
        &mut self,
        soc: &mut RegionMap,
        addr: u64,
        image: &[u8],
    ) -> Result<(), MemFault> {
        self.flush()?;
        let region = soc.region_for_mut(addr).ok_or(MemFault::Unmapped { addr })?;
        if addr + image.len() as u64 > region.end() {
            return Err(MemFault::CopyOverflow {
                offset: addr,
                len: image.len(),
            });
        }
        region.bus.write(addr, image)
    }

    /// Whether the access at `addr` goes through the cache.
    fn use_cache(&self, soc: &RegionMap, addr: u64) -> bool {
        self.cache_enabled
            && self.cache.is_some()
            && soc
                .region_for(addr)
                .is_some_and(|r| r.flags.contains(RegionFlags::CACHEABLE))
    }

    /// Splits an access at region and (for cacheable chunks) line
    /// boundaries, invoking `op` per chunk with the sub-range of the
    /// caller's buffer.
    fn split<F>(
        &mut self,
        soc: &mut RegionMap,
        addr: u64,
        len: usize,
        access: AccessType,
        mut op: F,
    ) -> Result<(), MemFault>
    where
        F: FnMut(&mut Self, &mut RegionMap, u64, std::ops::Range<usize>) -> Result<(), MemFault>,
    {
        let mut cursor = addr;
        let mut done = 0usize;
        while done < len {
            let region = soc.check(cursor, access)?;
            let region_room = region.end() - cursor;
            let cacheable = region.flags.contains(RegionFlags::CACHEABLE);
            let mut chunk = (len - done).min(region_room as usize);
            if cacheable {
                let line_room = CACHE_LINE_BYTES - (cursor as usize % CACHE_LINE_BYTES);
                chunk = chunk.min(line_room);
            }
            op(self, soc, cursor, done..done + chunk)?;
            cursor += chunk as u64;
            done += chunk;
        }
        Ok(())
    }
}
