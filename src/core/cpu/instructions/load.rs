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

use super::super::decode::LoadOp;
use super::super::{MemoryPort, CPU};
use crate::core::memory::AccessWidth;

impl CPU {
    // === Load Instructions ===

    /// LB, LBU, LH, LHU, LW, LWL, LWR
    ///
    /// Format: op rt, offset(base)
    ///
    /// The loaded value lands after the following instruction (load delay
    /// slot). A faulting load raises its exception and leaves rt unchanged.
    pub(super) fn op_load(&mut self, op: LoadOp, rt: u8, base: u8, offset: i16, mem: &mut MemoryPort) {
        let vaddr = self.effective_address(base, offset);

        let value = match op {
            LoadOp::Lb => self
                .read_data(mem, vaddr, AccessWidth::Byte)
                .map(|v| v as u8 as i8 as i32 as u32),
            LoadOp::Lbu => self.read_data(mem, vaddr, AccessWidth::Byte),
            LoadOp::Lh => self
                .read_data(mem, vaddr, AccessWidth::Half)
                .map(|v| v as u16 as i16 as i32 as u32),
            LoadOp::Lhu => self.read_data(mem, vaddr, AccessWidth::Half),
            LoadOp::Lw => self.read_data(mem, vaddr, AccessWidth::Word),
            LoadOp::Lwl | LoadOp::Lwr => {
                let Some(word) = self.read_data(mem, vaddr & !3, AccessWidth::Word) else {
                    return;
                };
                let current = self.pending_value(rt);
                Some(if op == LoadOp::Lwl {
                    merge_left(current, word, vaddr & 3)
                } else {
                    merge_right(current, word, vaddr & 3)
                })
            }
        };

        if let Some(value) = value {
            self.set_reg_delayed(rt, value);
        }
    }
}

/// LWL: fill the high bytes of `current` from the word containing the address
fn merge_left(current: u32, word: u32, shift: u32) -> u32 {
    match shift {
        0 => (current & 0x00FF_FFFF) | (word << 24),
        1 => (current & 0x0000_FFFF) | (word << 16),
        2 => (current & 0x0000_00FF) | (word << 8),
        _ => word,
    }
}

/// LWR: fill the low bytes of `current` from the word containing the address
fn merge_right(current: u32, word: u32, shift: u32) -> u32 {
    match shift {
        0 => word,
        1 => (current & 0xFF00_0000) | (word >> 8),
        2 => (current & 0xFFFF_0000) | (word >> 16),
        _ => (current & 0xFFFF_FF00) | (word >> 24),
    }
}
