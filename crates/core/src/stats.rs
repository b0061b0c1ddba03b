//! Event counters.
//!
//! Per-core counters collected during emulation and reported by the CLI.
//! Cache hit/miss/write-back counters live with the cache controller
//! (`CacheController::stats`); these cover the execution engine.

use std::fmt;

/// Per-core event counters.
#[derive(Clone, Copy, Debug, Default)]
pub struct CoreStats {
    /// Ticks executed (halted ticks excluded).
    pub ticks: u64,
    /// Instructions retired by the executor.
    pub instructions_retired: u64,
    /// Decode faults raised (illegal instruction, unknown extension,
    /// decode-time memory faults).
    pub decode_faults: u64,
    /// Exceptions raised (decode and execute faults combined).
    pub exceptions_raised: u64,
    /// Interrupts delivered to a handler.
    pub interrupts_taken: u64,
}

impl fmt::Display for CoreStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ticks:               {}", self.ticks)?;
        writeln!(f, "instructions:        {}", self.instructions_retired)?;
        writeln!(f, "decode faults:       {}", self.decode_faults)?;
        writeln!(f, "exceptions raised:   {}", self.exceptions_raised)?;
        write!(f, "interrupts taken:    {}", self.interrupts_taken)
    }
}
