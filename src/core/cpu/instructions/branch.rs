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

use super::super::decode::BranchCond;
use super::super::CPU;

impl CPU {
    // === Branch Instructions ===

    /// Conditional branches (BEQ, BNE, BLEZ, BGTZ, BLTZ, BGEZ, BLTZAL, BGEZAL)
    ///
    /// The target is relative to the delay slot: `pc + 4 + (offset << 2)`.
    /// The linking forms write the return address whether or not the branch
    /// is taken.
    pub(super) fn op_branch(&mut self, cond: BranchCond, rs: u8, rt: u8, offset: i16) {
        let a = self.reg(rs);
        let b = self.reg(rt);
        let signed = a as i32;

        let taken = match cond {
            BranchCond::Eq => a == b,
            BranchCond::Ne => a != b,
            BranchCond::Lez => signed <= 0,
            BranchCond::Gtz => signed > 0,
            BranchCond::Ltz | BranchCond::Ltzal => signed < 0,
            BranchCond::Gez | BranchCond::Gezal => signed >= 0,
        };

        if matches!(cond, BranchCond::Ltzal | BranchCond::Gezal) {
            self.set_reg(31, self.current_pc.wrapping_add(8));
        }

        self.branch(taken, offset);
    }

    /// BC1F / BC1T: branch on the FPU condition bit
    pub(super) fn op_bc1(&mut self, on_true: bool, offset: i16) {
        if !self.require_cop1() {
            return;
        }
        let taken = self.fpu.condition() == on_true;
        self.branch(taken, offset);
    }

    fn branch(&mut self, taken: bool, offset: i16) {
        if taken {
            let displacement = ((offset as i32) << 2) as u32;
            self.next_pc = self.current_pc.wrapping_add(4).wrapping_add(displacement);
        }
        self.branch_pending = true;
    }
}
