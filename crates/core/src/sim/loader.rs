//! Binary image loading.
//!
//! The core's collaborator contract with the assembler/linker is minimal:
//! "load N bytes at virtual address A" and "set the initial instruction
//! pointer to E". Two front ends satisfy it:
//! 1. **Flat images:** raw bytes at a caller-supplied address and entry.
//! 2. **ELF files:** segments and entry point read through the `object`
//!    crate; section internals beyond load address, size, and entry are
//!    not interpreted.

use std::fs;
use std::path::Path;

use thiserror::Error;
use tracing::debug;

use object::{Object, ObjectSegment};

use crate::common::error::MemFault;
use crate::sim::machine::Machine;

/// Errors from image loading.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Reading the file from disk failed.
    #[error("read image: {0}")]
    Io(#[from] std::io::Error),
    /// The ELF container could not be parsed.
    #[error("parse image: {0}")]
    Parse(#[from] object::Error),
    /// Placing a segment into emulated memory failed.
    #[error("place image: {0}")]
    Place(#[from] MemFault),
}

/// Where an image's pieces were placed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoadedImage {
    /// Entry point, applied to core 0.
    pub entry: u64,
    /// (address, length) of each loaded piece.
    pub placements: Vec<(u64, usize)>,
}

/// Loads a flat binary image at `addr` and points core 0 at `entry`.
///
/// # Errors
///
/// Fails if the image cannot be placed (unmapped address or overflow).
pub fn load_flat(machine: &mut Machine, addr: u64, image: &[u8], entry: u64) -> Result<LoadedImage, LoadError> {
    machine.load_image(addr, image)?;
    machine.core_mut(0).set_entry(entry);
    debug!(addr = format_args!("{addr:#x}"), len = image.len(), "flat image loaded");
    Ok(LoadedImage {
        entry,
        placements: vec![(addr, image.len())],
    })
}

/// Loads an ELF image: every segment at its load address, entry point to
/// core 0.
///
/// # Errors
///
/// Fails on a malformed container or an unplaceable segment.
pub fn load_elf(machine: &mut Machine, bytes: &[u8]) -> Result<LoadedImage, LoadError> {
    let file = object::File::parse(bytes)?;
    let mut placements = Vec::new();
    for segment in file.segments() {
        let data = segment.data()?;
        if data.is_empty() {
            continue;
        }
        machine.load_image(segment.address(), data)?;
        debug!(
            addr = format_args!("{:#x}", segment.address()),
            len = data.len(),
            "segment loaded"
        );
        placements.push((segment.address(), data.len()));
    }
    let entry = file.entry();
    machine.core_mut(0).set_entry(entry);
    Ok(LoadedImage { entry, placements })
}

/// Reads and loads a flat binary from disk.
///
/// # Errors
///
/// I/O and placement failures.
pub fn load_flat_file(
    machine: &mut Machine,
    path: &Path,
    addr: u64,
    entry: u64,
) -> Result<LoadedImage, LoadError> {
    let image = fs::read(path)?;
    load_flat(machine, addr, &image, entry)
}

/// Reads and loads an ELF file from disk.
///
/// # Errors
///
/// I/O, parse, and placement failures.
pub fn load_elf_file(machine: &mut Machine, path: &Path) -> Result<LoadedImage, LoadError> {
    let bytes = fs::read(path)?;
    load_elf(machine, &bytes)
}
