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

//! Guest-visible memory behaviour: code invalidation, MMU faults, open bus

mod common;

use common::assertions::{assert_cpu_reg, assert_memory_word};
use common::fixtures::{create_machine_from, create_machine_with_program, test_config, CODE, KINDS};
use common::programs;
use vmcore::core::config::map;
use vmcore::core::cpu::encode as asm;
use vmcore::core::cpu::ExceptionCause;
use vmcore::core::mmu::PageFlags;
use vmcore::core::{ExecutorKind, MachineConfig};

#[test]
fn test_self_modifying_code() {
    for kind in KINDS {
        let mut machine = create_machine_with_program(kind, &programs::self_modifying(CODE));
        machine.run_until(200).unwrap();
        assert_cpu_reg(machine.cpu(), 3, 101);
    }
}

#[test]
fn test_host_image_load_invalidates_code() {
    let mut machine = create_machine_with_program(
        ExecutorKind::Recompiler,
        &[asm::addiu(3, 0, 1), asm::beq(0, 0, -1), asm::NOP],
    );
    machine.run_until(50).unwrap();
    assert_cpu_reg(machine.cpu(), 3, 1);

    machine
        .load_program(CODE, &[asm::addiu(3, 0, 2), asm::beq(0, 0, -1), asm::NOP])
        .unwrap();
    machine.reset(false);
    machine.run_until(100).unwrap();
    assert_cpu_reg(machine.cpu(), 3, 2);
}

fn mmu_config(kind: ExecutorKind) -> MachineConfig {
    MachineConfig {
        mmu_enabled: true,
        ..test_config(kind)
    }
}

/// Refill handler at the boot refill vector: capture BadVAddr, EPC, Cause
fn refill_handler() -> Vec<u32> {
    vec![
        asm::mfc0(20, 8),
        asm::mfc0(21, 14),
        asm::mfc0(22, 13),
        asm::NOP,
        asm::beq(0, 0, -1),
        asm::NOP,
    ]
}

#[test]
fn test_tlb_miss_is_precise() {
    let mut program = vec![asm::addiu(5, 0, 7)];
    program.extend(asm::li(4, 0x0040_0000));
    program.extend([
        asm::lw(5, 4, 0),
        asm::addiu(6, 0, 1),
        asm::beq(0, 0, -1),
        asm::NOP,
    ]);
    let faulting_pc = CODE + 4 * 3;

    for kind in KINDS {
        let mut machine = create_machine_from(mmu_config(kind), &program);
        machine
            .load_program(map::RESET_VECTOR + 0x100, &refill_handler())
            .unwrap();
        machine.run_until(100).unwrap();

        let cpu = machine.cpu();
        assert_cpu_reg(cpu, 20, 0x0040_0000);
        assert_cpu_reg(cpu, 21, faulting_pc);
        assert_eq!((cpu.reg(22) >> 2) & 0x1F, ExceptionCause::TlbLoad as u32);
        // Neither the faulting load nor anything after it took effect
        assert_cpu_reg(cpu, 5, 7);
        assert_cpu_reg(cpu, 6, 0);
    }
}

#[test]
fn test_tlb_mapped_access() {
    let flags = PageFlags::DIRTY | PageFlags::VALID | PageFlags::GLOBAL;
    let mut program = Vec::new();
    program.extend(asm::li(1, 0x0040_0000));
    program.push(asm::mtc0(1, 10));
    program.extend(asm::li(2, 0x2000 | flags.bits()));
    program.push(asm::mtc0(2, 2));
    program.extend([asm::ori(3, 0, 5 << 8), asm::mtc0(3, 0), asm::tlbwi()]);
    program.extend(asm::li(4, 0xCAFE));
    program.extend([
        asm::sw(4, 1, 0x10),
        asm::lw(5, 1, 0x10),
        asm::NOP,
        asm::beq(0, 0, -1),
        asm::NOP,
    ]);

    for kind in KINDS {
        let mut machine = create_machine_from(mmu_config(kind), &program);
        machine.run_until(200).unwrap();
        assert_cpu_reg(machine.cpu(), 5, 0xCAFE);
        assert_memory_word(&machine, 0x2010, 0xCAFE);
        assert_eq!(machine.mmu().stats().misses, 0);
    }
}

#[test]
fn test_open_bus() {
    // kseg1 view of a physical hole between the device windows and flash
    let hole = 0xBE00_0000u32;
    let mut program = Vec::new();
    program.extend(asm::li(1, hole));
    program.extend([
        asm::ori(2, 0, 0x55),
        asm::sw(2, 1, 0),
        asm::lw(3, 1, 0),
        asm::lb(4, 1, 1),
        asm::lhu(5, 1, 2),
        asm::addiu(6, 0, 1),
        asm::beq(0, 0, -1),
        asm::NOP,
    ]);

    for kind in KINDS {
        let mut machine = create_machine_with_program(kind, &program);
        machine.run_until(100).unwrap();
        let cpu = machine.cpu();
        assert_cpu_reg(cpu, 3, 0xFFFF_FFFF);
        assert_cpu_reg(cpu, 4, 0xFFFF_FFFF);
        assert_cpu_reg(cpu, 5, 0xFFFF);
        // No exception: execution carried on past the accesses
        assert_cpu_reg(cpu, 6, 1);
        assert_eq!(machine.bus().peek32(hole & 0x1FFF_FFFF), None);
    }
}
