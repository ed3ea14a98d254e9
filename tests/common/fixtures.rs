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

//! Test fixtures for common test scenarios

use vmcore::core::config::MemoryLayout;
use vmcore::core::{ExecutorKind, Machine, MachineConfig};

/// Where test programs are loaded (kseg0, physical 0x1000)
#[allow(dead_code)]
pub const CODE: u32 = 0x8000_1000;

/// Both execution strategies
#[allow(dead_code)]
pub const KINDS: [ExecutorKind; 2] = [ExecutorKind::Interpreter, ExecutorKind::Recompiler];

/// Configuration with small regions so tests stay cheap
#[allow(dead_code)]
pub fn test_config(kind: ExecutorKind) -> MachineConfig {
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

/// Create a machine with `program` loaded at [`CODE`] as its entry point
#[allow(dead_code)]
pub fn create_machine_with_program(kind: ExecutorKind, program: &[u32]) -> Machine {
    create_machine_from(test_config(kind), program)
}

#[allow(dead_code)]
pub fn create_machine_from(config: MachineConfig, program: &[u32]) -> Machine {
    let mut machine = Machine::new(config).expect("valid test configuration");
    machine
        .load_program(CODE, program)
        .expect("program fits in RAM");
    machine.set_entry_point(CODE);
    machine
}

/// Register dump plus cycle count, for comparing runs
#[allow(dead_code)]
pub fn trace_point(machine: &Machine) -> (u64, Vec<u32>) {
    let regs = (0..32).map(|r| machine.cpu().reg(r)).collect();
    (machine.cycles(), regs)
}
