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

//! Custom assertions for machine testing

use vmcore::core::cpu::CPU;
use vmcore::core::Machine;

/// Assert CPU register has expected value
#[allow(dead_code)]
pub fn assert_cpu_reg(cpu: &CPU, reg: u8, expected: u32) {
    let actual = cpu.reg(reg);
    assert_eq!(
        actual, expected,
        "Register ${} mismatch: expected 0x{:08X}, got 0x{:08X}",
        reg, expected, actual
    );
}

/// Assert RAM holds `expected` at physical address `paddr`
#[allow(dead_code)]
pub fn assert_memory_word(machine: &Machine, paddr: u32, expected: u32) {
    let actual = machine.bus().peek32(paddr);
    assert_eq!(
        actual,
        Some(expected),
        "Memory at 0x{:08X} mismatch: expected 0x{:08X}, got {:08X?}",
        paddr,
        expected,
        actual
    );
}

/// Assert two machines are in the same architectural state
#[allow(dead_code)]
pub fn assert_same_state(a: &Machine, b: &Machine) {
    assert_eq!(a.cycles(), b.cycles(), "cycle counts differ");
    assert_eq!(a.cpu().state(), b.cpu().state(), "CPU states differ");
    let ram_a = a.bus().read_bytes(0, 0x1_0000);
    let ram_b = b.bus().read_bytes(0, 0x1_0000);
    assert!(ram_a == ram_b, "RAM contents differ");
}
