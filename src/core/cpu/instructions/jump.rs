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

use super::super::CPU;

impl CPU {
    // === Jump Instructions ===

    /// J, JAL
    ///
    /// The target keeps the top four bits of the delay slot address.
    pub(super) fn op_jump(&mut self, target: u32, link: bool) {
        let delay_slot = self.current_pc.wrapping_add(4);
        if link {
            self.set_reg(31, self.current_pc.wrapping_add(8));
        }
        self.next_pc = (delay_slot & 0xF000_0000) | (target << 2);
        self.branch_pending = true;
    }

    /// JR, JALR
    ///
    /// A misaligned target faults when it is fetched, not here.
    pub(super) fn op_jump_reg(&mut self, rs: u8, rd: u8, link: bool) {
        let target = self.reg(rs);
        if link {
            self.set_reg(rd, self.current_pc.wrapping_add(8));
        }
        self.next_pc = target;
        self.branch_pending = true;
    }
}
