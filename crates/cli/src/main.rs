//! m64k emulator CLI.
//!
//! This binary loads a binary image and steps the emulated machine. It performs:
//! 1. **Flat run:** load raw bytes at a base address, start at an entry point.
//! 2. **ELF run:** load segments and entry point from an ELF file.
//! 3. **Reporting:** register/flag dump and event statistics after the run.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use m64k_core::config::Config;
use m64k_core::sim::loader;
use m64k_core::Machine;

#[derive(Parser, Debug)]
#[command(
    name = "m64k",
    version,
    about = "m64k CPU emulator",
    long_about = "Load a flat binary or ELF image and step the emulated machine.\n\n\
Examples:\n  m64k run -f program.bin --base 0x1000 --entry 0x1000\n  m64k run -f kernel.elf --elf --ticks 1000000"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run an image until every core halts or the tick budget is spent.
    Run {
        /// Image file to execute.
        #[arg(short, long)]
        file: PathBuf,

        /// Treat the image as an ELF file (load address and entry from headers).
        #[arg(long)]
        elf: bool,

        /// Load address for flat images.
        #[arg(long, default_value_t = 0x1000, value_parser = parse_u64)]
        base: u64,

        /// Entry point for flat images (defaults to the load address).
        #[arg(long, value_parser = parse_u64)]
        entry: Option<u64>,

        /// Initial stack pointer for flat images (defaults to the top of RAM).
        #[arg(long, value_parser = parse_u64)]
        stack: Option<u64>,

        /// Tick budget.
        #[arg(long, default_value_t = 10_000_000)]
        ticks: u64,

        /// Machine configuration file (JSON); defaults are used otherwise.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Dump registers and statistics after the run.
        #[arg(long)]
        dump: bool,
    },
}

fn parse_u64(s: &str) -> Result<u64, String> {
    let s = s.trim();
    let parsed = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16)
    } else {
        s.parse()
    };
    parsed.map_err(|e| format!("invalid number '{s}': {e}"))
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            file,
            elf,
            base,
            entry,
            stack,
            ticks,
            config,
            dump,
        } => cmd_run(&file, elf, base, entry, stack, ticks, config.as_deref(), dump),
    }
}

#[allow(clippy::too_many_arguments)]
fn cmd_run(
    file: &std::path::Path,
    elf: bool,
    base: u64,
    entry: Option<u64>,
    stack: Option<u64>,
    ticks: u64,
    config_path: Option<&std::path::Path>,
    dump: bool,
) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("[!] {msg}");
            return ExitCode::FAILURE;
        }
    };

    let mut machine = match Machine::new(&config) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("[!] machine setup failed: {e}");
            return ExitCode::FAILURE;
        }
    };

    let loaded = if elf {
        loader::load_elf_file(&mut machine, file)
    } else {
        loader::load_flat_file(&mut machine, file, base, entry.unwrap_or(base))
    };
    let loaded = match loaded {
        Ok(l) => l,
        Err(e) => {
            eprintln!("[!] could not load '{}': {e}", file.display());
            return ExitCode::FAILURE;
        }
    };

    if !elf {
        let top_of_ram = config.machine.ram_base + config.machine.ram_size as u64;
        machine.core_mut(0).set_stack(stack.unwrap_or(top_of_ram));
    }

    println!(
        "[m64k] entry {:#x}, {} piece(s) loaded",
        loaded.entry,
        loaded.placements.len()
    );

    let executed = match machine.run(ticks) {
        Ok(n) => n,
        Err(e) => {
            eprintln!("[!] emulation error: {e}");
            return ExitCode::FAILURE;
        }
    };

    println!(
        "[m64k] {} tick(s), halted: {}",
        executed,
        machine.all_halted()
    );

    if dump {
        let core = machine.core(0);
        println!("{}", core.regs);
        println!("{}", core.stats);
        if let Some(cache) = core.mmu.cache() {
            let s = cache.stats;
            println!(
                "cache: {} hit(s), {} miss(es), {} write-back(s)",
                s.hits, s.misses, s.write_backs
            );
        }
    }
    ExitCode::SUCCESS
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config, String> {
    match path {
        None => Ok(Config::default()),
        Some(p) => {
            let text = std::fs::read_to_string(p)
                .map_err(|e| format!("could not read config '{}': {e}", p.display()))?;
            Config::from_json(&text).map_err(|e| format!("bad config '{}': {e}", p.display()))
        }
    }
}
