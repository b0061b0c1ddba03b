//! Memory-mapped control block layout at the base of RAM.
//!
//! Host software and the reset path agree on this fixed layout:
//!
//! ```text
//! +0x000  initial stack pointer          (8 bytes)
//! +0x008  initial program counter        (8 bytes)
//! +0x010  exception vectors              (6 x 8 bytes; slots 4-5 reserved)
//! +0x040  interrupt vectors              (8 x 8 bytes)
//! +0x080  exception control block        (0xE0 bytes, host-visible mirror)
//! +0x160  interrupt control blocks       (8 x 0xE0 bytes)
//! +0x860  timer peripheral config        (period, line, enable; 8 bytes each)
//! +0x880  end of reserved control block
//! ```
//!
//! The emulator holds the control blocks natively (saved snapshots never
//! round-trip through emulated RAM); the mirror offsets exist so host
//! tooling can reserve the space and place the peripheral configuration.

/// Offset of the initial stack pointer.
pub const INIT_SP: u64 = 0x000;
/// Offset of the initial program counter.
pub const INIT_PC: u64 = 0x008;

/// Offset of the exception vector table.
pub const EXC_VECTORS: u64 = 0x010;
/// Number of exception vector slots.
pub const EXC_VECTOR_COUNT: usize = 6;

/// Offset of the interrupt vector table.
pub const IRQ_VECTORS: u64 = 0x040;
/// Number of interrupt vector slots (one per line).
pub const IRQ_VECTOR_COUNT: usize = 8;

/// Offset of the host-visible exception control block mirror.
pub const EXC_CONTROL_BLOCK: u64 = 0x080;
/// Offset of the host-visible interrupt control block mirrors.
pub const IRQ_CONTROL_BLOCKS: u64 = 0x160;
/// Size of one host-visible control block mirror.
pub const CONTROL_BLOCK_BYTES: u64 = 0xE0;

/// Offset of the timer peripheral configuration block.
pub const TIMER_CONFIG: u64 = 0x860;
/// Offset of the timer period field (ticks between interrupts; 0 disables).
pub const TIMER_PERIOD: u64 = TIMER_CONFIG;
/// Offset of the timer interrupt line field.
pub const TIMER_LINE: u64 = TIMER_CONFIG + 0x8;
/// Offset of the timer enable field (nonzero enables).
pub const TIMER_ENABLE: u64 = TIMER_CONFIG + 0x10;

/// Total bytes reserved for the control block at the base of RAM.
pub const RESERVED_BYTES: u64 = 0x880;

/// Address of exception vector slot `index`, relative to the RAM base.
pub fn exception_vector(base: u64, index: usize) -> u64 {
    base + EXC_VECTORS + (index as u64) * 8
}

/// Address of interrupt vector slot `line`, relative to the RAM base.
pub fn interrupt_vector(base: u64, line: usize) -> u64 {
    base + IRQ_VECTORS + (line as u64) * 8
}
