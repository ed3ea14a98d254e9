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

//! Executor test modules
//!
//! - `interpreter`: run targets, stepping, event boundaries
//! - `recompiler`: block reuse, invalidation, self-modifying code, cache limits,
//!   host code runs against the interpreter
//! - `control`: stop, snapshot and reset requests from other threads


#[cfg(test)]
mod interpreter;


use super::*;
use crate::core::cpu::encode as asm;
use crate::core::memory::MemoryRegion;

/// Base of the test programs (kseg0, physical 0x1000)
pub const CODE: u32 = 0x8000_1000;

/// Hardware and executor wired to 64 KiB of RAM
pub struct Rig {
    pub hw: Hardware,
    pub executor: Executor,
}

impl Rig {
    pub fn new(kind: ExecutorKind) -> Self {
        Self::with_config(MachineConfig {
            executor: kind,
            ..MachineConfig::default()
        })
    }

    pub fn with_config(config: MachineConfig) -> Self {
        let mut hw = Hardware::new(config.mmu_enabled);
        hw.bus.map(MemoryRegion::ram("ram", 0, 0x1_0000)).unwrap();
        hw.bus
            .map(MemoryRegion::rom("rom", 0x1FC0_0000, 0x1000))
            .unwrap();
        Self {
            hw,
            executor: Executor::init(&config),
        }
    }

    pub fn load(&mut self, vaddr: u32, program: &[u32]) {
        let bytes: Vec<u8> = program.iter().flat_map(|w| w.to_le_bytes()).collect();
        self.hw.bus.write_bytes(vaddr & 0x1FFF_FFFF, &bytes).unwrap();
        self.hw.cpu.set_pc(vaddr);
    }

    pub fn run_until(&mut self, cycle: Cycle) -> RunReport {
        self.executor.run(&mut self.hw, Some(cycle)).unwrap()
    }
}

/// Counts r1 up to 100, storing every value, then spins
pub fn counting_loop() -> Vec<u32> {
    vec![
        asm::ori(2, 0, 100),
        asm::addiu(1, 1, 1),
        asm::sw(1, 0, 0x100),
        asm::bne(1, 2, -3),
        asm::NOP,
        // spin
        asm::beq(0, 0, -1),
        asm::NOP,
    ]
}
