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

use super::super::decode::StoreOp;
use super::super::{MemoryPort, CPU};
use crate::core::memory::AccessWidth;

impl CPU {
    // === Store Instructions ===

    /// SB, SH, SW, SWL, SWR
    ///
    /// Format: op rt, offset(base)
    ///
    /// Nothing is written when translation faults.
    pub(super) fn op_store(&mut self, op: StoreOp, rt: u8, base: u8, offset: i16, mem: &mut MemoryPort) {
        let vaddr = self.effective_address(base, offset);
        let value = self.reg(rt);

        match op {
            StoreOp::Sb => self.store(mem, vaddr, AccessWidth::Byte, value),
            StoreOp::Sh => self.store(mem, vaddr, AccessWidth::Half, value),
            StoreOp::Sw => self.store(mem, vaddr, AccessWidth::Word, value),
            StoreOp::Swl | StoreOp::Swr => {
                let Some(paddr) = self.translate_store(mem, vaddr & !3, AccessWidth::Word) else {
                    return;
                };
                let current = mem.bus.read32(paddr);
                let merged = if op == StoreOp::Swl {
                    merge_left(current, value, vaddr & 3)
                } else {
                    merge_right(current, value, vaddr & 3)
                };
                mem.bus.write32(paddr, merged);
            }
        }
    }

    pub(super) fn store(&mut self, mem: &mut MemoryPort, vaddr: u32, width: AccessWidth, value: u32) {
        if let Some(paddr) = self.translate_store(mem, vaddr, width) {
            mem.bus.write(paddr, width, value as u64);
        }
    }
}

/// SWL: store the high bytes of `value` into the low end of the word
fn merge_left(current: u32, value: u32, shift: u32) -> u32 {
    match shift {
        0 => (current & 0xFFFF_FF00) | (value >> 24),
        1 => (current & 0xFFFF_0000) | (value >> 16),
        2 => (current & 0xFF00_0000) | (value >> 8),
        _ => value,
    }
}

/// SWR: store the low bytes of `value` into the high end of the word
fn merge_right(current: u32, value: u32, shift: u32) -> u32 {
    match shift {
        0 => value,
        1 => (current & 0x0000_00FF) | (value << 8),
        2 => (current & 0x0000_FFFF) | (value << 16),
        _ => (current & 0x00FF_FFFF) | (value << 24),
    }
}
