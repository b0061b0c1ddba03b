//! Coherent snoop bus implementing the MESI protocol.
//!
//! This module is the shared side of the cache model. It provides:
//! 1. **Backing storage:** the RAM arena every line fill and write-back targets.
//! 2. **Subscription:** per-core line directories registered by opaque handle;
//!    the bus never holds an owning reference back into a controller.
//! 3. **Snoop messages:** `BusRd` (read share) and `BusWr` (claim exclusive),
//!    applied to every other subscriber's directory under one lock.
//! 4. **Bypass access:** byte-granular reads and writes straight to backing
//!    RAM, used for non-cacheable accesses and bulk image loads.
//!
//! The subscriber list and the arena are the only cross-core shared state
//! in the machine, and both sit behind the bus mutex. A controller must
//! never hold its own directory lock across a bus call; bus then directory
//! is the global lock order.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::common::constants::CACHE_LINE_BYTES;
use crate::common::error::MemFault;
use crate::soc::memory::MemoryArena;

/// MESI coherency state of one cache line.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MesiState {
    /// Dirty and exclusively held; backing RAM is stale.
    Modified,
    /// Clean and exclusively held.
    Exclusive,
    /// Clean and possibly held by other caches.
    Shared,
    /// Holds no valid data.
    #[default]
    Invalid,
}

/// One cache line: a line-aligned address tag, MESI state, recency counter,
/// and the line's data bytes.
#[derive(Clone, Debug)]
pub struct CacheLine {
    /// Line-aligned address this line currently represents.
    pub tag: u64,
    /// Coherency state.
    pub state: MesiState,
    /// Private recency counter for LRU victim selection.
    pub recency: u64,
    /// Line contents.
    pub data: [u8; CACHE_LINE_BYTES],
}

impl Default for CacheLine {
    fn default() -> Self {
        Self {
            tag: 0,
            state: MesiState::Invalid,
            recency: 0,
            data: [0; CACHE_LINE_BYTES],
        }
    }
}

/// A controller's line directory, registered with the bus at subscription.
///
/// The owning controller and the bus (during snoops) are the only parties
/// that touch it, always under its mutex.
#[derive(Debug)]
pub struct LineSet {
    lines: Vec<CacheLine>,
    clock: u64,
}

impl LineSet {
    fn new(count: usize) -> Self {
        Self {
            lines: vec![CacheLine::default(); count],
            clock: 0,
        }
    }

    /// Returns the index of the valid line tagged with `line_addr`, if any.
    pub fn find(&self, line_addr: u64) -> Option<usize> {
        self.lines
            .iter()
            .position(|l| l.state != MesiState::Invalid && l.tag == line_addr)
    }

    /// Returns the index of the eviction victim: an invalid line if one
    /// exists, otherwise the least recently used.
    pub fn victim(&self) -> usize {
        self.lines
            .iter()
            .enumerate()
            .find(|(_, l)| l.state == MesiState::Invalid)
            .map_or_else(
                || {
                    self.lines
                        .iter()
                        .enumerate()
                        .min_by_key(|(_, l)| l.recency)
                        .map_or(0, |(i, _)| i)
                },
                |(i, _)| i,
            )
    }

    /// Bumps the recency counter of line `idx`.
    pub fn touch(&mut self, idx: usize) {
        self.clock += 1;
        self.lines[idx].recency = self.clock;
    }

    /// Shared access to the line storage.
    pub fn lines(&self) -> &[CacheLine] {
        &self.lines
    }

    /// Mutable access to the line storage.
    pub fn lines_mut(&mut self) -> &mut [CacheLine] {
        &mut self.lines
    }
}

/// Opaque subscriber handle returned by [`SnoopBus::subscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SnooperId(usize);

struct SnoopShared {
    base: u64,
    arena: MemoryArena,
    peers: Vec<Arc<Mutex<LineSet>>>,
}

/// The coherent bus shared by all cache controllers of a machine.
///
/// Cloning yields another handle to the same bus.
#[derive(Clone)]
pub struct SnoopBus {
    shared: Arc<Mutex<SnoopShared>>,
}

impl std::fmt::Debug for SnoopBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let shared = lock(&self.shared);
        f.debug_struct("SnoopBus")
            .field("base", &shared.base)
            .field("len", &shared.arena.len())
            .field("peers", &shared.peers.len())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SnoopBus {
    /// Creates a coherent bus backed by a zero-filled arena covering
    /// `[base, base + len)`.
    pub fn new(base: u64, len: usize) -> Self {
        Self {
            shared: Arc::new(Mutex::new(SnoopShared {
                base,
                arena: MemoryArena::new(len),
                peers: Vec::new(),
            })),
        }
    }

    /// Returns the base address of the backing arena.
    pub fn base(&self) -> u64 {
        lock(&self.shared).base
    }

    /// Returns the length of the backing arena in bytes.
    pub fn len(&self) -> usize {
        lock(&self.shared).arena.len()
    }

    /// Returns whether the backing arena is zero-sized.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registers a new snooper with `line_count` lines.
    ///
    /// Returns the opaque handle the controller passes to every bus call,
    /// plus the shared directory it owns from here on.
    pub fn subscribe(&self, line_count: usize) -> (SnooperId, Arc<Mutex<LineSet>>) {
        let set = Arc::new(Mutex::new(LineSet::new(line_count)));
        let mut shared = lock(&self.shared);
        shared.peers.push(Arc::clone(&set));
        (SnooperId(shared.peers.len() - 1), set)
    }

    /// `BusRd`: fetches a line for shared reading.
    ///
    /// Every other holder is downgraded to Shared (a Modified holder writes
    /// back first). Returns the line data and whether any other holder
    /// remains, which decides the requester's Shared/Exclusive install state.
    ///
    /// # Errors
    ///
    /// Fails if `line_addr` is outside the backing arena.
    pub fn read_line(
        &self,
        requester: SnooperId,
        line_addr: u64,
    ) -> Result<([u8; CACHE_LINE_BYTES], bool), MemFault> {
        let mut shared = lock(&self.shared);
        let mut any_holder = false;
        let SnoopShared { base, arena, peers } = &mut *shared;
        for (idx, peer) in peers.iter().enumerate() {
            if idx == requester.0 {
                continue;
            }
            let mut set = lock(peer);
            if let Some(i) = set.find(line_addr) {
                let line = &mut set.lines_mut()[i];
                if line.state == MesiState::Modified {
                    arena.write(line_addr - *base, &line.data)?;
                }
                line.state = MesiState::Shared;
                any_holder = true;
            }
        }
        let mut data = [0u8; CACHE_LINE_BYTES];
        arena.read(line_addr - *base, &mut data)?;
        Ok((data, any_holder))
    }

    /// `BusWr`: claims a line for exclusive modification.
    ///
    /// Every other holder is invalidated (a Modified holder writes back
    /// first), then the current line content is returned for the requester
    /// to install in Modified state.
    ///
    /// # Errors
    ///
    /// Fails if `line_addr` is outside the backing arena.
    pub fn claim_line(
        &self,
        requester: SnooperId,
        line_addr: u64,
    ) -> Result<[u8; CACHE_LINE_BYTES], MemFault> {
        let mut shared = lock(&self.shared);
        let SnoopShared { base, arena, peers } = &mut *shared;
        for (idx, peer) in peers.iter().enumerate() {
            if idx == requester.0 {
                continue;
            }
            let mut set = lock(peer);
            if let Some(i) = set.find(line_addr) {
                let line = &mut set.lines_mut()[i];
                if line.state == MesiState::Modified {
                    arena.write(line_addr - *base, &line.data)?;
                }
                line.state = MesiState::Invalid;
            }
        }
        let mut data = [0u8; CACHE_LINE_BYTES];
        arena.read(line_addr - *base, &mut data)?;
        Ok(data)
    }

    /// Writes one line back to backing RAM (eviction or explicit flush).
    ///
    /// # Errors
    ///
    /// Fails if `line_addr` is outside the backing arena.
    pub fn write_back(&self, line_addr: u64, data: &[u8; CACHE_LINE_BYTES]) -> Result<(), MemFault> {
        let mut shared = lock(&self.shared);
        let base = shared.base;
        shared.arena.write(line_addr - base, data)
    }

    /// Byte-granular read straight from backing RAM, bypassing every cache.
    ///
    /// # Errors
    ///
    /// Fails if the range is outside the backing arena.
    pub fn read_bytes(&self, addr: u64, buf: &mut [u8]) -> Result<(), MemFault> {
        let shared = lock(&self.shared);
        let base = shared.base;
        shared.arena.read(addr - base, buf)
    }

    /// Byte-granular write straight to backing RAM, bypassing every cache.
    ///
    /// # Errors
    ///
    /// Fails if the range is outside the backing arena.
    pub fn write_bytes(&self, addr: u64, data: &[u8]) -> Result<(), MemFault> {
        let mut shared = lock(&self.shared);
        let base = shared.base;
        shared.arena.write(addr - base, data)
    }

    /// Diagnostic: the number of subscribers holding `line_addr` in
    /// Modified state. The coherency invariant keeps this at most 1.
    pub fn modified_holders(&self, line_addr: u64) -> usize {
        self.holder_states(line_addr)
            .iter()
            .filter(|s| **s == MesiState::Modified)
            .count()
    }

    /// Diagnostic: the MESI state each subscriber holds for `line_addr`
    /// (Invalid for subscribers without the line).
    pub fn holder_states(&self, line_addr: u64) -> Vec<MesiState> {
        let shared = lock(&self.shared);
        shared
            .peers
            .iter()
            .map(|peer| {
                let set = lock(peer);
                set.find(line_addr)
                    .map_or(MesiState::Invalid, |i| set.lines()[i].state)
            })
            .collect()
    }
}
