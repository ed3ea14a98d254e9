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

//! Machine tests
//!
//! - `basic`: construction, reset, lifecycle, memory map changes
//! - `execution`: run targets, frame yields, guest interrupts
//! - `devices`: built-in devices driven by guest code
//! - `snapshots`: serialize/deserialize and requests from other threads

mod execution;
mod snapshots;

use super::*;
use crate::core::config::{ExecutorKind, MemoryLayout};
use crate::core::cpu::encode as asm;

/// Small layout so tests do not allocate tens of megabytes
pub(super) fn small_config(kind: ExecutorKind) -> MachineConfig {
    MachineConfig {
        executor: kind,
        memory: Some(MemoryLayout {
            ram_size: 0x1_0000,
            vram_size: 0x1_0000,
            sound_ram_size: 0x1000,
            boot_rom_size: 0x1000,
            flash_size: 0x1000,
        }),
        cycles_per_frame: 10_000,
        audio_batch_cycles: 500,
        disc_read_cycles: 300,
        ..MachineConfig::default()
    }
}

pub(super) fn machine(kind: ExecutorKind) -> Machine {
    Machine::new(small_config(kind)).unwrap()
}

pub(super) const KINDS: [ExecutorKind; 2] = [ExecutorKind::Interpreter, ExecutorKind::Recompiler];

/// Put `program` at the reset vector
pub(super) fn load_boot(machine: &mut Machine, program: &[u32]) {
    machine.load_program(map::RESET_VECTOR, program).unwrap();
}

/// `r` = kseg1 address of a device window
pub(super) fn device_base(r: u8, base: u32) -> [u32; 2] {
    asm::li(r, 0xA000_0000 | base)
}

pub(super) fn spin() -> [u32; 2] {
    [asm::beq(0, 0, -1), asm::NOP]
}
