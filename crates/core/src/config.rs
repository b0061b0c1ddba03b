//! Configuration for the emulator.
//!
//! This module defines the hierarchical configuration structures used to
//! parameterize a machine. It provides:
//! 1. **Defaults:** baseline hardware constants (memory map, cache, pipeline).
//! 2. **Structures:** machine, core, cache, and timer configuration.
//! 3. **Loading:** JSON deserialization for host tooling, or `Config::default()`.

use serde::Deserialize;

/// Default configuration constants.
mod defaults {
    /// Base address of main RAM; the memory-mapped control block lives here.
    pub const RAM_BASE: u64 = 0x0000_0000;

    /// Main RAM size (16 MiB).
    pub const RAM_SIZE: usize = 16 * 1024 * 1024;

    /// Base address of the flash region (window 1 of the region table).
    pub const FLASH_BASE: u64 = 0x1000_0000;

    /// Flash size (1 MiB).
    pub const FLASH_SIZE: usize = 1024 * 1024;

    /// Number of cores.
    pub const CORES: usize = 1;

    /// Cache lines per core.
    pub const CACHE_LINES: usize = 8;

    /// Decoder slots per core (instructions concurrently mid-decode).
    pub const DECODE_SLOTS: usize = 3;

    /// Dispatch queue capacity in bytes.
    pub const DISPATCH_CAPACITY: usize = 256;
}

/// Root configuration for a machine.
///
/// # Examples
///
/// ```
/// use m64k_core::config::Config;
///
/// let config = Config::default();
/// assert_eq!(config.machine.cores, 1);
/// assert_eq!(config.cache.lines, 8);
///
/// let json = r#"{
///     "machine": { "cores": 2, "ram_size": 1048576 },
///     "cache": { "lines": 4 }
/// }"#;
/// let config = Config::from_json(json).unwrap();
/// assert_eq!(config.machine.cores, 2);
/// assert_eq!(config.cache.lines, 4);
/// assert_eq!(config.core.decode_slots, 3);
/// ```
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Memory map and core count.
    pub machine: MachineConfig,
    /// Per-core pipeline parameters.
    pub core: CoreConfig,
    /// Per-core cache parameters.
    pub cache: CacheConfig,
}

impl Config {
    /// Deserializes a configuration from JSON.
    ///
    /// # Errors
    ///
    /// Forwards `serde_json` parse errors.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Memory map and core count.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct MachineConfig {
    /// Number of cores sharing the coherent bus.
    pub cores: usize,
    /// Main RAM base address.
    pub ram_base: u64,
    /// Main RAM size in bytes.
    pub ram_size: usize,
    /// Flash base address; `None` omits the flash region.
    pub flash_base: Option<u64>,
    /// Flash size in bytes.
    pub flash_size: usize,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            cores: defaults::CORES,
            ram_base: defaults::RAM_BASE,
            ram_size: defaults::RAM_SIZE,
            flash_base: Some(defaults::FLASH_BASE),
            flash_size: defaults::FLASH_SIZE,
        }
    }
}

/// Per-core pipeline parameters.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Decoder slots (instructions concurrently mid-decode).
    pub decode_slots: usize,
    /// Dispatch queue capacity in bytes.
    pub dispatch_capacity: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            decode_slots: defaults::DECODE_SLOTS,
            dispatch_capacity: defaults::DISPATCH_CAPACITY,
        }
    }
}

/// Per-core cache parameters.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable the cache controller.
    pub enabled: bool,
    /// Number of lines per core.
    pub lines: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            lines: defaults::CACHE_LINES,
        }
    }
}
