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
use super::super::{ExceptionCause, CPU};

impl CPU {
    // === Arithmetic Instructions ===

    /// ADD, ADDU, SUB, SUBU, SLT, SLTU
    ///
    /// Format: op rd, rs, rt
    ///
    /// ADD and SUB raise Overflow on signed overflow and leave rd untouched.
    pub(super) fn op_arithmetic(&mut self, op: AluOp, rd: u8, rs: u8, rt: u8) {
        let a = self.reg(rs);
        let b = self.reg(rt);

        let result = match op {
            AluOp::Add => (a as i32).checked_add(b as i32).map(|v| v as u32),
            AluOp::Addu => Some(a.wrapping_add(b)),
            AluOp::Sub => (a as i32).checked_sub(b as i32).map(|v| v as u32),
            AluOp::Subu => Some(a.wrapping_sub(b)),
            AluOp::Slt => Some(((a as i32) < (b as i32)) as u32),
            AluOp::Sltu => Some((a < b) as u32),
            AluOp::And | AluOp::Or | AluOp::Xor | AluOp::Nor => {
                self.op_logical(op, rd, rs, rt);
                return;
            }
        };

        match result {
            Some(value) => self.set_reg(rd, value),
            None => self.exception(ExceptionCause::Overflow),
        }
    }

    /// ADDI, ADDIU, SLTI, SLTIU
    ///
    /// Format: op rt, rs, imm
    ///
    /// The immediate is sign-extended for all four, including the
    /// "unsigned" forms.
    pub(super) fn op_arithmetic_imm(&mut self, op: ImmOp, rt: u8, rs: u8, imm: u16) {
        let a = self.reg(rs);
        let imm = imm as i16 as i32;

        let result = match op {
            ImmOp::Addi => (a as i32).checked_add(imm).map(|v| v as u32),
            ImmOp::Addiu => Some(a.wrapping_add(imm as u32)),
            ImmOp::Slti => Some(((a as i32) < imm) as u32),
            ImmOp::Sltiu => Some((a < imm as u32) as u32),
            ImmOp::Andi | ImmOp::Ori | ImmOp::Xori => {
                self.op_logical_imm(op, rt, rs, imm as u16);
                return;
            }
        };

        match result {
            Some(value) => self.set_reg(rt, value),
            None => self.exception(ExceptionCause::Overflow),
        }
    }
}
