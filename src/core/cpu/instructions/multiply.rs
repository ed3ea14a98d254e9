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

use super::super::decode::{HiLoOp, MulDivOp};
use super::super::CPU;

impl CPU {
    // === Multiply and Divide ===

    /// MULT, MULTU, DIV, DIVU
    ///
    /// Results go to HI/LO. Division never traps: division by zero and
    /// `i32::MIN / -1` produce the fixed results the hardware does.
    pub(super) fn op_muldiv(&mut self, op: MulDivOp, rs: u8, rt: u8) {
        let a = self.reg(rs);
        let b = self.reg(rt);

        let (hi, lo) = match op {
            MulDivOp::Mult => {
                let product = (a as i32 as i64) * (b as i32 as i64);
                ((product >> 32) as u32, product as u32)
            }
            MulDivOp::Multu => {
                let product = (a as u64) * (b as u64);
                ((product >> 32) as u32, product as u32)
            }
            MulDivOp::Div => {
                let n = a as i32;
                let d = b as i32;
                if d == 0 {
                    // Quotient is -1 for non-negative dividends, +1 otherwise
                    let lo = if n >= 0 { 0xFFFF_FFFF } else { 1 };
                    (n as u32, lo)
                } else if n == i32::MIN && d == -1 {
                    (0, 0x8000_0000)
                } else {
                    ((n % d) as u32, (n / d) as u32)
                }
            }
            MulDivOp::Divu => {
                if b == 0 {
                    (a, 0xFFFF_FFFF)
                } else {
                    (a % b, a / b)
                }
            }
        };

        self.hi = hi;
        self.lo = lo;
    }

    /// MFHI, MTHI, MFLO, MTLO
    pub(super) fn op_hilo(&mut self, op: HiLoOp, reg: u8) {
        match op {
            HiLoOp::Mfhi => self.set_reg(reg, self.hi),
            HiLoOp::Mflo => self.set_reg(reg, self.lo),
            HiLoOp::Mthi => self.hi = self.reg(reg),
            HiLoOp::Mtlo => self.lo = self.reg(reg),
        }
    }
}
