//! Architectural constants.
//!
//! Geometry shared by the cache, the snoop bus, and the region table.
//! These are properties of the emulated hardware, not tunables; run-time
//! tunables (line counts, queue capacities) live in [`crate::config`].

/// Size of one cache line in bytes.
///
/// Lines are the unit of transfer on the coherent bus; every cacheable
/// access is split on these boundaries by the MMU.
pub const CACHE_LINE_BYTES: usize = 64;

/// Mask that clears the intra-line offset bits of an address.
pub const LINE_BASE_MASK: u64 = !(CACHE_LINE_BYTES as u64 - 1);

/// Number of address bits covered by one region window (256 MiB).
///
/// The region table is indexed by `addr >> REGION_SHIFT`, giving O(1)
/// region lookup from the top address bits.
pub const REGION_SHIFT: u32 = 28;

/// Number of slots in the region table.
///
/// With 256 MiB windows this covers the low 16 GiB of the address space;
/// anything above is permanently unmapped.
pub const REGION_SLOTS: usize = 64;

/// Returns the line-aligned base address containing `addr`.
#[inline]
pub fn line_base(addr: u64) -> u64 {
    addr & LINE_BASE_MASK
}

/// Returns the byte offset of `addr` within its cache line.
#[inline]
pub fn line_offset(addr: u64) -> usize {
    (addr & !(LINE_BASE_MASK)) as usize
}
