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

use super::super::decode::{AluOp, ImmOp};
use super::super::CPU;

impl CPU {
    // === Logical Instructions ===

    /// AND, OR, XOR, NOR
    pub(super) fn op_logical(&mut self, op: AluOp, rd: u8, rs: u8, rt: u8) {
        let a = self.reg(rs);
        let b = self.reg(rt);
        let result = match op {
            AluOp::And => a & b,
            AluOp::Or => a | b,
            AluOp::Xor => a ^ b,
            AluOp::Nor => !(a | b),
            _ => return self.op_arithmetic(op, rd, rs, rt),
        };
        self.set_reg(rd, result);
    }

    /// ANDI, ORI, XORI
    ///
    /// The immediate is zero-extended.
    pub(super) fn op_logical_imm(&mut self, op: ImmOp, rt: u8, rs: u8, imm: u16) {
        let a = self.reg(rs);
        let imm = imm as u32;
        let result = match op {
            ImmOp::Andi => a & imm,
            ImmOp::Ori => a | imm,
            ImmOp::Xori => a ^ imm,
            _ => return self.op_arithmetic_imm(op, rt, rs, imm as u16),
        };
        self.set_reg(rt, result);
    }

    /// LUI: Load Upper Immediate
    ///
    /// Format: lui rt, imm
    /// Operation: rt = imm << 16
    pub(super) fn op_lui(&mut self, rt: u8, imm: u16) {
        self.set_reg(rt, (imm as u32) << 16);
    }
}
