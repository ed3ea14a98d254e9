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

//! Machine configuration
//!
//! Configuration is plain data: it can be built in code, parsed from TOML, and
//! overridden from `VMCORE_*` environment variables. It is validated once, when
//! the machine is created.
//!
//! # Example
//!
//! ```
//! use vmcore::core::config::{ExecutorKind, MachineConfig, Platform};
//!
//! let config = MachineConfig::from_toml_str(
//!     r#"
//!     platform = "arcade"
//!     executor = "interpreter"
//!     yield_on_frame = true
//!     "#,
//! )
//! .unwrap();
//!
//! assert_eq!(config.platform, Platform::Arcade);
//! assert_eq!(config.executor, ExecutorKind::Interpreter);
//! assert_eq!(config.layout().ram_size, 32 * 1024 * 1024);
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::error::{ConfigError, EmulatorError, Result};
use crate::core::timing::Cycle;

/// Fixed physical memory map
pub mod map {
    /// Main RAM, mirrored across its window
    pub const RAM_BASE: u32 = 0x0000_0000;
    pub const RAM_WINDOW: u32 = 0x0400_0000;

    pub const VRAM_BASE: u32 = 0x0400_0000;
    pub const VRAM_WINDOW: u32 = 0x0100_0000;

    pub const SOUND_RAM_BASE: u32 = 0x0800_0000;
    pub const SOUND_RAM_WINDOW: u32 = 0x0080_0000;

    /// Device register windows (4 KiB each)
    pub const IRQ_BASE: u32 = 0x1F00_0000;
    pub const TIMER_BASE: u32 = 0x1F00_1000;
    pub const VIDEO_BASE: u32 = 0x1F00_2000;
    pub const INPUT_BASE: u32 = 0x1F00_3000;
    pub const AUDIO_BASE: u32 = 0x1F00_4000;
    pub const DISC_BASE: u32 = 0x1F00_5000;
    pub const DEVICE_WINDOW: u32 = 0x1000;

    pub const FLASH_BASE: u32 = 0x1FA0_0000;
    pub const FLASH_WINDOW: u32 = 0x0002_0000;

    pub const BOOT_ROM_BASE: u32 = 0x1FC0_0000;
    pub const BOOT_ROM_WINDOW: u32 = 0x0020_0000;

    /// Virtual address the CPU starts at after reset (boot ROM through kseg1)
    pub const RESET_VECTOR: u32 = 0xBFC0_0000;
}

const KIB: u32 = 1024;
const MIB: u32 = 1024 * 1024;

/// Hardware variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Platform {
    /// Home console
    Console,
    /// Arcade board with doubled memory
    Arcade,
    /// Compact arcade board with a small boot ROM
    ArcadeCompact,
}

impl Platform {
    /// Region sizes of this variant
    pub fn layout(self) -> MemoryLayout {
        match self {
            Platform::Console => MemoryLayout {
                ram_size: 16 * MIB,
                vram_size: 8 * MIB,
                sound_ram_size: 2 * MIB,
                boot_rom_size: 2 * MIB,
                flash_size: 128 * KIB,
            },
            Platform::Arcade => MemoryLayout {
                ram_size: 32 * MIB,
                vram_size: 16 * MIB,
                sound_ram_size: 8 * MIB,
                boot_rom_size: 2 * MIB,
                flash_size: 32 * KIB,
            },
            Platform::ArcadeCompact => MemoryLayout {
                ram_size: 16 * MIB,
                vram_size: 8 * MIB,
                sound_ram_size: 8 * MIB,
                boot_rom_size: 128 * KIB,
                flash_size: 128 * KIB,
            },
        }
    }
}

/// Sizes of the memory-backed regions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryLayout {
    pub ram_size: u32,
    pub vram_size: u32,
    pub sound_ram_size: u32,
    pub boot_rom_size: u32,
    pub flash_size: u32,
}

/// CPU execution strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutorKind {
    /// Fetch, decode and execute one instruction at a time
    Interpreter,
    /// Translate basic blocks once, compiling register-only runs to host code
    Recompiler,
}

/// Complete machine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineConfig {
    pub platform: Platform,

    /// Overrides the platform's region sizes
    pub memory: Option<MemoryLayout>,

    pub executor: ExecutorKind,

    /// Route kuseg/kseg2 through the TLB instead of the fixed mapping
    pub mmu_enabled: bool,

    /// CPU clock, used for pacing and reporting
    pub clock_hz: u64,

    /// Cycles between frame boundaries
    pub cycles_per_frame: Cycle,

    /// Stop the executor at every frame boundary
    pub yield_on_frame: bool,

    /// Cycles between audio FIFO drains
    pub audio_batch_cycles: Cycle,

    /// Delay between a disc read command and its completion
    pub disc_read_cycles: Cycle,

    /// Total decoded instructions the code cache may hold
    pub code_cache_capacity: usize,

    /// Upper bound on instructions per translated block
    pub max_block_instructions: usize,

    /// Per-title settings, keyed by title id (`[overrides.<id>]` in TOML)
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub overrides: BTreeMap<String, TitleOverrides>,
}

/// Settings a title may override when it is loaded
///
/// Only settings that can change on a running machine are listed; region
/// sizes and timings are fixed when the machine is built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TitleOverrides {
    pub executor: Option<ExecutorKind>,
    pub mmu_enabled: Option<bool>,
    pub yield_on_frame: Option<bool>,
    pub code_cache_capacity: Option<usize>,
    pub max_block_instructions: Option<usize>,
}

impl TitleOverrides {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Write every set field into `config`
    pub fn apply_to(&self, config: &mut MachineConfig) {
        if let Some(executor) = self.executor {
            config.executor = executor;
        }
        if let Some(enabled) = self.mmu_enabled {
            config.mmu_enabled = enabled;
        }
        if let Some(enabled) = self.yield_on_frame {
            config.yield_on_frame = enabled;
        }
        if let Some(capacity) = self.code_cache_capacity {
            config.code_cache_capacity = capacity;
        }
        if let Some(limit) = self.max_block_instructions {
            config.max_block_instructions = limit;
        }
    }
}

impl Default for MachineConfig {
    fn default() -> Self {
        let clock_hz = 200_000_000;
        Self {
            platform: Platform::Console,
            memory: None,
            executor: ExecutorKind::Recompiler,
            mmu_enabled: false,
            clock_hz,
            cycles_per_frame: clock_hz / 60,
            yield_on_frame: false,
            audio_batch_cycles: clock_hz / 240,
            disc_read_cycles: clock_hz / 150,
            code_cache_capacity: 1 << 20,
            max_block_instructions: 64,
            overrides: BTreeMap::new(),
        }
    }
}

impl MachineConfig {
    /// Effective region sizes
    pub fn layout(&self) -> MemoryLayout {
        self.memory.unwrap_or_else(|| self.platform.layout())
    }

    /// Check the configuration for values the machine cannot run with
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.clock_hz == 0 {
            return Err(ConfigError::InvalidTiming("clock_hz must be non-zero".into()));
        }
        if self.cycles_per_frame == 0 {
            return Err(ConfigError::InvalidTiming(
                "cycles_per_frame must be non-zero".into(),
            ));
        }
        if self.audio_batch_cycles == 0 || self.disc_read_cycles == 0 {
            return Err(ConfigError::InvalidTiming(
                "device timings must be non-zero".into(),
            ));
        }
        if self.max_block_instructions == 0 {
            return Err(ConfigError::InvalidCodeCache(
                "max_block_instructions must be at least 1".into(),
            ));
        }
        if self.code_cache_capacity == 0 {
            return Err(ConfigError::InvalidCodeCache(
                "code_cache_capacity must be at least 1".into(),
            ));
        }

        let layout = self.layout();
        let regions = [
            ("ram", layout.ram_size, map::RAM_WINDOW),
            ("vram", layout.vram_size, map::VRAM_WINDOW),
            ("sound_ram", layout.sound_ram_size, map::SOUND_RAM_WINDOW),
            ("boot_rom", layout.boot_rom_size, map::BOOT_ROM_WINDOW),
            ("flash", layout.flash_size, map::FLASH_WINDOW),
        ];
        for (name, size, window) in regions {
            if !size.is_power_of_two() || size < crate::core::memory::PAGE_SIZE || size > window {
                return Err(ConfigError::InvalidRegionSize {
                    name: name.to_string(),
                    size,
                });
            }
        }
        Ok(())
    }

    /// Normalise a title id: trailing whitespace is dropped
    ///
    /// Returns `None` for an empty id.
    pub fn title_key(title: &str) -> Option<&str> {
        let key = title.trim_end();
        (!key.is_empty()).then_some(key)
    }

    /// The configuration for `title`: this one with its overrides applied
    pub fn for_title(&self, title: &str) -> MachineConfig {
        let mut config = self.clone();
        if let Some(overrides) = Self::title_key(title).and_then(|key| self.overrides.get(key)) {
            overrides.apply_to(&mut config);
        }
        config
    }

    /// Parse a TOML document; missing keys take their defaults
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| EmulatorError::ConfigParse(e.to_string()))
    }

    /// Read a TOML configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_toml_str(&text)?;
        log::info!("Loaded configuration from {}", path.as_ref().display());
        Ok(config)
    }

    /// Apply `VMCORE_*` environment overrides
    ///
    /// Recognised variables: `VMCORE_PLATFORM`, `VMCORE_EXECUTOR`,
    /// `VMCORE_MMU`, `VMCORE_YIELD_ON_FRAME`, `VMCORE_CYCLES_PER_FRAME`.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
            value
                .trim()
                .parse()
                .map_err(|_| EmulatorError::ConfigParse(format!("{}={} is not valid", key, value)))
        }

        if let Some(value) = lookup("VMCORE_PLATFORM") {
            self.platform = <Platform as clap::ValueEnum>::from_str(value.trim(), true)
                .map_err(EmulatorError::ConfigParse)?;
        }
        if let Some(value) = lookup("VMCORE_EXECUTOR") {
            self.executor = <ExecutorKind as clap::ValueEnum>::from_str(value.trim(), true)
                .map_err(EmulatorError::ConfigParse)?;
        }
        if let Some(value) = lookup("VMCORE_MMU") {
            self.mmu_enabled = parse("VMCORE_MMU", &value)?;
        }
        if let Some(value) = lookup("VMCORE_YIELD_ON_FRAME") {
            self.yield_on_frame = parse("VMCORE_YIELD_ON_FRAME", &value)?;
        }
        if let Some(value) = lookup("VMCORE_CYCLES_PER_FRAME") {
            self.cycles_per_frame = parse("VMCORE_CYCLES_PER_FRAME", &value)?;
        }
        Ok(())
    }
}
