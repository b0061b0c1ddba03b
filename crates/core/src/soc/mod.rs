//! System-on-chip building blocks.
//!
//! This module holds everything outside the core proper:
//! 1. **Regions:** the fixed-size address-window table with capability flags.
//! 2. **Buses:** coherent RAM, flash, and hardware-mapped transports.
//! 3. **Snoop bus:** the MESI coherency fabric shared by all cores.
//! 4. **Layout:** the memory-mapped control block at the base of RAM.
//! 5. **Peripherals:** the countdown timer.

/// Per-region transport buses (coherent RAM, flash, hardware-mapped).
pub mod bus;
/// Memory-mapped control block layout constants.
pub mod layout;
/// Owned byte arena backing RAM and flash.
pub mod memory;
/// Memory regions and the O(1) region table.
pub mod region;
/// Coherent snoop bus implementing MESI.
pub mod snoop;
/// Countdown timer peripheral.
pub mod timer;
