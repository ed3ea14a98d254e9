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

//! Small guest programs used across the integration tests

use vmcore::core::cpu::encode as asm;

/// Count r1 up to 100, storing each value at 0x100, then spin
#[allow(dead_code)]
pub fn counting_loop() -> Vec<u32> {
    vec![
        asm::ori(2, 0, 100),
        asm::addiu(1, 1, 1),
        asm::sw(1, 0, 0x100),
        asm::bne(1, 2, -3),
        asm::NOP,
        asm::beq(0, 0, -1),
        asm::NOP,
    ]
}

/// Register arithmetic with multiply, divide and HI/LO traffic
#[allow(dead_code)]
pub fn arithmetic_mix() -> Vec<u32> {
    let mut program = vec![
        asm::addiu(1, 0, 1234),
        asm::addiu(2, 0, -77),
        asm::mult(1, 2),
        asm::mflo(3),
        asm::mfhi(4),
        asm::divu(1, 2),
        asm::mflo(5),
        asm::mfhi(6),
        asm::sra(7, 2, 3),
        asm::sltu(8, 2, 1),
        asm::nor(9, 1, 2),
    ];
    program.extend([asm::beq(0, 0, -1), asm::NOP]);
    program
}

/// Store words into the program's own next instruction
///
/// The first pass executes `addiu r3, r3, 1`; the program then rewrites
/// that slot with `addiu r3, r3, 100` and jumps back, so a stale
/// translation would leave r3 at 2 instead of 101.
#[allow(dead_code)]
pub fn self_modifying(code_base: u32) -> Vec<u32> {
    let patch = asm::addiu(3, 3, 100);
    let mut program = Vec::new();
    program.extend(asm::li(10, patch));
    program.extend(asm::li(11, code_base + 4 * 4));
    program.extend([
        // slot:
        asm::addiu(3, 3, 1),
        asm::bne(12, 0, 5),
        asm::NOP,
        asm::sw(10, 11, 0),
        asm::ori(12, 0, 1),
        asm::beq(0, 0, -6),
        asm::NOP,
        asm::beq(0, 0, -1),
        asm::NOP,
    ]);
    program
}
