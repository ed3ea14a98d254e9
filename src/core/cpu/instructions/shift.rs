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

use super::super::decode::ShiftOp;
use super::super::CPU;

impl CPU {
    /// SLL, SRL, SRA and their variable forms
    ///
    /// `amount` is already reduced to 0-31.
    pub(super) fn op_shift(&mut self, op: ShiftOp, rd: u8, rt: u8, amount: u32) {
        let value = self.reg(rt);
        let result = match op {
            ShiftOp::Sll => value << amount,
            ShiftOp::Srl => value >> amount,
            // Arithmetic shift keeps the sign bit
            ShiftOp::Sra => ((value as i32) >> amount) as u32,
        };
        self.set_reg(rd, result);
    }
}
