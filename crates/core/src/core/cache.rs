//! Per-core cache controller.
//!
//! Sits in front of the coherent snoop bus and owns this core's line
//! directory. Implements the client side of MESI:
//! 1. **Read miss:** `BusRd` broadcast; installs Shared if any other holder
//!    answered, Exclusive otherwise.
//! 2. **Write:** local write on Modified/Exclusive; `BusWr` claim first on
//!    Shared or miss; the line ends Modified.
//! 3. **Eviction:** least-recently-used victim by private recency counter,
//!    written back first when Modified.
//! 4. **Touch and flush:** prefetch without value return, and explicit
//!    write-back of every Modified line.
//!
//! Cached content and backing RAM intentionally diverge between a write
//! and the next flush; that divergence is observable through the bus's
//! bypass reads and is covered by tests.
//!
//! Lock discipline: the directory lock is never held across a bus call
//! (bus before directory is the global order). A controller operation is
//! one bounded, synchronous step; cores are ticked sequentially, so an
//! operation is atomic at machine level.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::trace;

use crate::common::constants::{CACHE_LINE_BYTES, line_base, line_offset};
use crate::common::error::MemFault;
use crate::soc::snoop::{LineSet, MesiState, SnooperId, SnoopBus};

/// Hit/miss/write-back counters for one controller.
#[derive(Clone, Copy, Debug, Default)]
pub struct CacheStats {
    /// Accesses satisfied from a valid line.
    pub hits: u64,
    /// Accesses that required a bus fetch.
    pub misses: u64,
    /// Lines written back (eviction or flush).
    pub write_backs: u64,
}

/// One core's cache controller and line directory.
pub struct CacheController {
    id: SnooperId,
    lines: Arc<Mutex<LineSet>>,
    bus: SnoopBus,
    /// Access counters.
    pub stats: CacheStats,
}

impl std::fmt::Debug for CacheController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheController")
            .field("id", &self.id)
            .field("stats", &self.stats)
            .finish()
    }
}

fn lock(lines: &Mutex<LineSet>) -> MutexGuard<'_, LineSet> {
    lines.lock().unwrap_or_else(PoisonError::into_inner)
}

impl CacheController {
    /// Subscribes a new controller with `line_count` lines to the bus.
    pub fn attach(bus: &SnoopBus, line_count: usize) -> Self {
        let (id, lines) = bus.subscribe(line_count);
        Self {
            id,
            lines,
            bus: bus.clone(),
            stats: CacheStats::default(),
        }
    }

    /// Returns the bus this controller snoops.
    pub fn bus(&self) -> &SnoopBus {
        &self.bus
    }

    /// Reads bytes within a single cache line.
    ///
    /// # Errors
    ///
    /// Fails if the line falls outside the coherent bus's backing arena.
    pub fn read(&mut self, addr: u64, buf: &mut [u8]) -> Result<(), MemFault> {
        let base = line_base(addr);
        let offset = line_offset(addr);
        debug_assert!(offset + buf.len() <= CACHE_LINE_BYTES);

        {
            let mut set = lock(&self.lines);
            if let Some(idx) = set.find(base) {
                buf.copy_from_slice(&set.lines()[idx].data[offset..offset + buf.len()]);
                set.touch(idx);
                self.stats.hits += 1;
                return Ok(());
            }
        }

        self.stats.misses += 1;
        let (data, shared) = self.bus.read_line(self.id, base)?;
        let state = if shared {
            MesiState::Shared
        } else {
            MesiState::Exclusive
        };
        trace!(addr = format_args!("{base:#x}"), ?state, "read miss fill");
        self.install(base, data, state)?;
        buf.copy_from_slice(&data[offset..offset + buf.len()]);
        Ok(())
    }

    /// Writes bytes within a single cache line; the line ends Modified.
    ///
    /// # Errors
    ///
    /// Fails if the line falls outside the coherent bus's backing arena.
    pub fn write(&mut self, addr: u64, data: &[u8]) -> Result<(), MemFault> {
        let base = line_base(addr);
        let offset = line_offset(addr);
        debug_assert!(offset + data.len() <= CACHE_LINE_BYTES);

        let local_state = {
            let mut set = lock(&self.lines);
            match set.find(base) {
                Some(idx) => {
                    let state = set.lines()[idx].state;
                    if matches!(state, MesiState::Modified | MesiState::Exclusive) {
                        let line = &mut set.lines_mut()[idx];
                        line.data[offset..offset + data.len()].copy_from_slice(data);
                        line.state = MesiState::Modified;
                        set.touch(idx);
                        self.stats.hits += 1;
                        return Ok(());
                    }
                    Some(state)
                }
                None => None,
            }
        };

        // Shared upgrade or write miss: claim the line, invalidating every
        // other holder, then install it Modified with the write merged in.
        if local_state.is_some() {
            self.stats.hits += 1;
        } else {
            self.stats.misses += 1;
        }
        let mut line = self.bus.claim_line(self.id, base)?;
        line[offset..offset + data.len()].copy_from_slice(data);
        trace!(addr = format_args!("{base:#x}"), "write claim");
        self.install(base, line, MesiState::Modified)
    }

    /// Prefetches a line without returning data.
    ///
    /// # Errors
    ///
    /// Fails if the line falls outside the coherent bus's backing arena.
    pub fn touch(&mut self, addr: u64) -> Result<(), MemFault> {
        let base = line_base(addr);
        {
            let mut set = lock(&self.lines);
            if let Some(idx) = set.find(base) {
                set.touch(idx);
                self.stats.hits += 1;
                return Ok(());
            }
        }
        self.stats.misses += 1;
        let (data, shared) = self.bus.read_line(self.id, base)?;
        let state = if shared {
            MesiState::Shared
        } else {
            MesiState::Exclusive
        };
        self.install(base, data, state)
    }

    /// Writes every Modified line back to RAM, leaving it Exclusive.
    ///
    /// Calling flush twice in a row performs no writes the second time.
    ///
    /// # Errors
    ///
    /// Fails if a line falls outside the coherent bus's backing arena.
    pub fn flush(&mut self) -> Result<u64, MemFault> {
        let dirty: Vec<(u64, [u8; CACHE_LINE_BYTES])> = {
            let mut set = lock(&self.lines);
            set.lines_mut()
                .iter_mut()
                .filter(|l| l.state == MesiState::Modified)
                .map(|l| {
                    l.state = MesiState::Exclusive;
                    (l.tag, l.data)
                })
                .collect()
        };
        for (tag, data) in &dirty {
            self.bus.write_back(*tag, data)?;
            self.stats.write_backs += 1;
        }
        Ok(dirty.len() as u64)
    }

    /// Returns whether the controller currently holds a valid copy of the
    /// line containing `addr`.
    pub fn contains(&self, addr: u64) -> bool {
        lock(&self.lines).find(line_base(addr)).is_some()
    }

    /// Diagnostic: the MESI state held for the line containing `addr`.
    pub fn line_state(&self, addr: u64) -> MesiState {
        let set = lock(&self.lines);
        set.find(line_base(addr))
            .map_or(MesiState::Invalid, |i| set.lines()[i].state)
    }

    /// Installs a line, evicting the LRU victim (written back if Modified).
    fn install(
        &mut self,
        base: u64,
        data: [u8; CACHE_LINE_BYTES],
        state: MesiState,
    ) -> Result<(), MemFault> {
        let evicted = {
            let mut set = lock(&self.lines);
            // Reuse the slot when the line is already resident (e.g. a
            // Shared copy being upgraded to Modified); never duplicate a tag.
            let idx = set.find(base).unwrap_or_else(|| set.victim());
            let line = &mut set.lines_mut()[idx];
            let evicted = (line.state == MesiState::Modified).then(|| (line.tag, line.data));
            line.tag = base;
            line.state = state;
            line.data = data;
            set.touch(idx);
            evicted
        };
        if let Some((tag, data)) = evicted {
            trace!(addr = format_args!("{tag:#x}"), "evict write-back");
            self.bus.write_back(tag, &data)?;
            self.stats.write_backs += 1;
        }
        Ok(())
    }
}
