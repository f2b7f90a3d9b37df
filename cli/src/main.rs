use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, ValueEnum};
use rvjit_vm::{
    constants::{BB_THRESHOLD, DEFAULT_MEMORY_SIZE},
    loader, logger::setup_logger, Cpu, Emulator, EmulatorConfig, ExecMode, Memory,
    UnsupportedPolicy,
};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Interpret every block
    Interp,
    /// Compile hot blocks to native code
    Jit,
}

impl From<Mode> for ExecMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Interp => ExecMode::Interpreter,
            Mode::Jit => ExecMode::Jit,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "rvjit", version, about = "Run an RV32I program with an interpreter or a JIT")]
struct Args {
    #[clap(help = "Program to run (RV32 ELF, or raw words with --raw)")]
    path: PathBuf,

    #[clap(long, value_enum, env = "RVJIT_MODE", default_value = "jit", help = "Execution mode")]
    mode: Mode,

    #[clap(
        long,
        env = "RVJIT_HOT_THRESHOLD",
        default_value_t = BB_THRESHOLD,
        help = "Minimum block length compiled to native code"
    )]
    hot_threshold: usize,

    #[clap(
        long,
        env = "RVJIT_STRICT",
        action = ArgAction::SetTrue,
        help = "Stop on unsupported instructions instead of skipping them"
    )]
    strict: bool,

    #[clap(
        long,
        env = "RVJIT_MEMORY_SIZE",
        default_value_t = DEFAULT_MEMORY_SIZE,
        help = "Guest memory size in bytes"
    )]
    memory_size: usize,

    #[clap(long, action = ArgAction::SetTrue, help = "Treat the input as raw little-endian instruction words")]
    raw: bool,

    #[clap(long, action = ArgAction::SetTrue, help = "Print the register dump after the run")]
    dump: bool,

    #[clap(long, action = ArgAction::SetTrue, help = "Print the effective configuration as JSON and exit")]
    show_config: bool,
}

impl Args {
    fn config(&self) -> EmulatorConfig {
        let policy = if self.strict {
            UnsupportedPolicy::Fault
        } else {
            UnsupportedPolicy::Skip
        };
        EmulatorConfig::new()
            .with_mode(self.mode.into())
            .with_hot_threshold(self.hot_threshold)
            .with_unsupported_policy(policy)
            .with_memory_size(self.memory_size)
    }
}

fn main() -> Result<()> {
    setup_logger();
    let args = Args::parse();
    let config = args.config();

    if args.show_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let bytes = std::fs::read(&args.path)
        .with_context(|| format!("failed to read {}", args.path.display()))?;
    let mut memory = Memory::new(config.memory_size);
    let image = if args.raw {
        loader::load_raw(&bytes, &mut memory)?
    } else {
        loader::load_elf(&bytes, &mut memory)?
    };
    info!(
        instructions = image.instruction_count,
        entry = format_args!("{:#x}", image.entry_offset),
        "program loaded"
    );

    let mut emulator = Emulator::new(config.clone())?;
    let mut cpu = Cpu::configured(&mut memory, image.entry_offset, &config);
    let status = emulator.run_simulation(&mut cpu);

    if args.dump {
        print!("{}", cpu.dump());
    }
    if let Some(code) = cpu.exit_code() {
        info!(code, "guest exit code");
    }

    std::process::exit(status);
}
