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

//! CPU test modules
//!
//! Tests are organized into the following categories:
//! - `basic`: initialization, reset, register access, state snapshots
//! - `decode`: instruction decoding and classification
//! - `instructions`: integer and FPU instruction semantics
//! - `load_delay`: load delay slot behavior
//! - `exceptions`: exception entry, RFE, interrupts
//! - `tlb`: COP0 TLB instructions and TLB faults







use super::*;
use crate::core::memory::{AddressSpace, MemoryRegion};
use crate::core::mmu::Mmu;

/// Base of the test programs (kseg0, physical 0x1000)
pub const CODE: u32 = 0x8000_1000;

/// General exception vector while BEV is set
pub const BOOT_GENERAL: u32 = 0xBFC0_0180;

/// A CPU wired to 64 KiB of RAM and a boot ROM
pub struct Rig {
    pub cpu: CPU,
    pub mmu: Mmu,
    pub bus: AddressSpace,
}

impl Rig {
    pub fn new() -> Self {
        Self::with_paging(false)
    }

    pub fn with_paging(enabled: bool) -> Self {
        let mut bus = AddressSpace::new();
        bus.map(MemoryRegion::ram("ram", 0, 0x1_0000)).unwrap();
        bus.map(MemoryRegion::rom("rom", 0x1FC0_0000, 0x1000)).unwrap();
        Self {
            cpu: CPU::new(),
            mmu: Mmu::new(enabled),
            bus,
        }
    }

    /// Copy a program to `vaddr` and point the CPU at it
    pub fn load(&mut self, vaddr: u32, program: &[u32]) {
        let bytes: Vec<u8> = program.iter().flat_map(|w| w.to_le_bytes()).collect();
        self.bus.write_bytes(vaddr & 0x1FFF_FFFF, &bytes).unwrap();
        self.cpu.set_pc(vaddr);
    }

    /// Fetch, decode and execute one instruction
    pub fn step(&mut self) -> u32 {
        let mut port = MemoryPort {
            mmu: &mut self.mmu,
            bus: &mut self.bus,
        };
        match self.cpu.fetch(&mut port) {
            Some(word) => self.cpu.execute(decode(word), &mut port),
            None => FETCH_FAULT_CYCLES,
        }
    }

    pub fn run(&mut self, steps: usize) -> u64 {
        (0..steps).map(|_| self.step() as u64).sum()
    }

    pub fn exc_code(&self) -> u32 {
        (self.cpu.cop0_reg(13) >> 2) & 0x1F
    }
}
