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

//! Shared fixtures for address space tests

use crate::core::memory::{AddressSpace, Device, IoContext, MemoryRegion};

pub const RAM_BASE: u32 = 0x0000_0000;
pub const RAM_SIZE: u32 = 0x4000;
pub const ROM_BASE: u32 = 0x1FC0_0000;
pub const ROM_SIZE: u32 = 0x1000;
pub const DEV_BASE: u32 = 0x1F00_1000;

/// 16 KiB of RAM mirrored across 64 KiB plus a 4 KiB ROM
pub fn create_test_space() -> AddressSpace {
    let mut bus = AddressSpace::new();
    bus.map(MemoryRegion::ram("ram", RAM_BASE, RAM_SIZE).with_window(RAM_SIZE * 4))
        .unwrap();
    bus.map(MemoryRegion::rom("rom", ROM_BASE, ROM_SIZE)).unwrap();
    bus
}

/// Device that records every access
#[derive(Default)]
pub struct Recorder {
    pub registers: [u32; 4],
    pub reads: Vec<u32>,
    pub writes: Vec<(u32, u32)>,
}

impl Device for Recorder {
    fn name(&self) -> &str {
        "recorder"
    }

    fn read_register(&mut self, offset: u32, _ctx: &mut IoContext) -> u32 {
        self.reads.push(offset);
        self.registers.get((offset / 4) as usize).copied().unwrap_or(0)
    }

    fn write_register(&mut self, offset: u32, value: u32, ctx: &mut IoContext) {
        self.writes.push((offset, value));
        if let Some(reg) = self.registers.get_mut((offset / 4) as usize) {
            *reg = value;
        }
        if offset == 0xC {
            ctx.schedule(7, value as u64);
        }
    }
}
