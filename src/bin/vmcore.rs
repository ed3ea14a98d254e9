// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 itsakeyfut
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::path::PathBuf;

use clap::Parser;
use log::{error, info, warn};
use vmcore::core::config::{map, ExecutorKind, Platform};
use vmcore::core::cpu::encode;
use vmcore::core::error::{EmulatorError, Result};
use vmcore::core::save_state::SaveStateFile;
use vmcore::core::system::host::FileSectorSource;
use vmcore::core::{Machine, MachineConfig, StopReason};

/// Load address and entry point of the built-in demo program
const DEMO_ADDRESS: u32 = 0x8001_0000;

/// Fixed-hardware console virtual machine
#[derive(Parser)]
#[command(name = "vmcore")]
#[command(about = "Deterministic console VM runner", long_about = None)]
struct Args {
    /// Raw program image to load (omit to run the built-in demo)
    image: Option<PathBuf>,

    /// Where the image is loaded (hex accepted, e.g. 0x80010000)
    #[arg(short = 'a', long, value_parser = parse_address, default_value = "0x80010000")]
    load_address: u32,

    /// Entry point; defaults to the load address
    #[arg(short = 'e', long, value_parser = parse_address)]
    entry: Option<u32>,

    /// Title id used to look up `[overrides.<id>]`; defaults to the image file name
    #[arg(short = 't', long)]
    title: Option<String>,

    /// Boot from the reset vector instead of jumping to the entry point
    #[arg(long)]
    boot_rom: bool,

    /// TOML machine configuration
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Hardware preset
    #[arg(long, value_enum)]
    platform: Option<Platform>,

    /// Execution strategy
    #[arg(short = 'x', long, value_enum)]
    executor: Option<ExecutorKind>,

    /// Disc image (raw 2048-byte sectors)
    #[arg(short = 'd', long)]
    disc: Option<PathBuf>,

    /// Stop at this machine cycle
    #[arg(short = 'n', long, default_value = "1000000")]
    cycles: u64,

    /// Stop after this many frames instead
    #[arg(short = 'f', long)]
    frames: Option<u64>,

    /// Restore a save state before running
    #[arg(long)]
    load_state: Option<PathBuf>,

    /// Write a save state after running
    #[arg(long)]
    save_state: Option<PathBuf>,

    /// Print the final CPU state as JSON
    #[arg(long)]
    dump_registers: bool,
}

fn parse_address(text: &str) -> std::result::Result<u32, String> {
    let trimmed = text.trim();
    let parsed = match trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => trimmed.parse(),
    };
    parsed.map_err(|e| format!("invalid address '{}': {}", text, e))
}

/// Sum 1..=100 into r2, queue it as an audio sample, then idle
fn demo_program() -> Vec<u32> {
    let mut program = vec![
        encode::addiu(2, 0, 0),
        encode::addiu(3, 0, 100),
        // loop:
        encode::addu(2, 2, 3),
        encode::addiu(3, 3, -1),
        encode::bne(3, 0, -3),
        encode::NOP,
    ];
    program.extend(encode::li(9, 0xA000_0000 | map::AUDIO_BASE));
    program.extend([
        encode::sw(2, 9, 0),
        encode::beq(0, 0, -1),
        encode::NOP,
    ]);
    program
}

fn build_config(args: &Args) -> Result<MachineConfig> {
    let mut config = match &args.config {
        Some(path) => MachineConfig::load(path)?,
        None => MachineConfig::default(),
    };
    config.apply_env_overrides()?;
    if let Some(platform) = args.platform {
        config.platform = platform;
    }
    if let Some(executor) = args.executor {
        config.executor = executor;
    }
    Ok(config)
}

fn load_program(machine: &mut Machine, args: &Args) -> Result<()> {
    match &args.image {
        Some(path) => {
            info!("Loading image from: {}", path.display());
            let bytes = std::fs::read(path)?;
            let title = args.title.clone().unwrap_or_else(|| {
                path.file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
                    .unwrap_or_default()
            });
            machine.load_title(&title, &bytes, args.load_address)?;
            if !args.boot_rom {
                machine.set_entry_point(args.entry.unwrap_or(args.load_address));
            }
        }
        None => {
            info!("No image given, running the built-in demo");
            machine.load_program(DEMO_ADDRESS, &demo_program())?;
            machine.set_entry_point(DEMO_ADDRESS);
        }
    }
    Ok(())
}

fn run(machine: &mut Machine, args: &Args) -> Result<()> {
    if let Some(frames) = args.frames {
        let target = machine.frames() + frames;
        while machine.frames() < target {
            let report = machine.run()?;
            if report.reason != StopReason::FrameYield {
                warn!("Run stopped early: {:?}", report.reason);
                break;
            }
        }
        return Ok(());
    }

    let report = machine.run_until(args.cycles)?;
    info!(
        "Stopped: {:?} | {} instructions | {} blocks compiled",
        report.reason, report.instructions, report.blocks_compiled
    );
    Ok(())
}

fn main() -> Result<()> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    // Initialize logger with default level INFO
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    info!("vmcore v{}", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();
    let mut config = build_config(&args)?;
    if args.frames.is_some() {
        config.yield_on_frame = true;
    }

    let mut machine = Machine::new(config)?;
    load_program(&mut machine, &args)?;

    if let Some(path) = &args.disc {
        info!("Inserting disc from: {}", path.display());
        let source = FileSectorSource::open(path).map_err(|e| {
            error!("Failed to open disc image: {}", e);
            EmulatorError::Io(e)
        })?;
        machine.insert_disc(Box::new(source));
    }

    if let Some(path) = &args.load_state {
        let state = SaveStateFile::load_from_file(path)?;
        info!(
            "Restoring '{}' saved at {} (cycle {})",
            state.metadata.label, state.metadata.timestamp, state.metadata.cycles
        );
        machine.deserialize(&state.snapshot)?;
    }

    if let Err(e) = run(&mut machine, &args) {
        error!("Error at PC=0x{:08X}: {}", machine.cpu().pc(), e);
        return Err(e);
    }

    info!("Cycles: {}", machine.cycles());
    info!("Frames: {}", machine.frames());
    info!("Final PC: 0x{:08X}", machine.cpu().pc());
    if let Some(stats) = machine.cache_stats() {
        info!("Code cache: {:?}", stats);
    }

    if let Some(path) = &args.save_state {
        let label = args
            .image
            .as_ref()
            .and_then(|p| p.file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "demo".to_string());
        let file = SaveStateFile::new(machine.serialize()?, label, machine.cycles(), machine.frames());
        file.save_to_file(path)?;
    }

    if args.dump_registers {
        let json = serde_json::to_string_pretty(&machine.cpu().state())
            .map_err(std::io::Error::from)?;
        println!("{}", json);
    }

    Ok(())
}
