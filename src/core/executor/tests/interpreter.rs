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

use super::super::*;
use super::{counting_loop, Rig, CODE};
use crate::core::cpu::encode as asm;

#[test]
fn test_run_until_stops_at_target() {
    let mut rig = Rig::new(ExecutorKind::Interpreter);
    rig.load(CODE, &counting_loop());

    let report = rig.run_until(10);
    assert_eq!(report.reason, StopReason::TargetReached);
    assert_eq!(report.instructions, 10);
    assert_eq!(report.cycles, 10);
    assert_eq!(rig.hw.scheduler.current_cycle(), 10);
    assert_eq!(report.blocks_executed, 0);
}

#[test]
fn test_counting_loop_completes() {
    let mut rig = Rig::new(ExecutorKind::Interpreter);
    rig.load(CODE, &counting_loop());

    rig.run_until(1_000);
    assert_eq!(rig.hw.cpu.reg(1), 100);
    assert_eq!(rig.hw.bus.read32(0x100), 100);
    let pc = rig.hw.cpu.pc();
    assert!(pc == CODE + 0x14 || pc == CODE + 0x18, "spinning at 0x{:08X}", pc);
}

#[test]
fn test_step_executes_one_instruction() {
    let mut rig = Rig::new(ExecutorKind::Interpreter);
    rig.load(CODE, &[asm::addiu(1, 0, 5), asm::addiu(1, 1, 5)]);

    let report = rig.executor.step(&mut rig.hw).unwrap();
    assert_eq!(report.reason, StopReason::Stepped);
    assert_eq!(report.instructions, 1);
    assert_eq!(rig.hw.cpu.reg(1), 5);
    assert_eq!(rig.hw.cpu.pc(), CODE + 4);
    assert!(!rig.executor.is_running());
}

#[test]
fn test_event_fires_at_instruction_boundary() {
    let mut rig = Rig::new(ExecutorKind::Interpreter);
    // One 2-cycle load, then 1-cycle instructions
    rig.load(
        CODE,
        &[
            asm::lw(3, 0, 0x100),
            asm::addiu(1, 1, 1),
            asm::addiu(1, 1, 1),
            asm::addiu(1, 1, 1),
            asm::beq(0, 0, -1),
            asm::NOP,
        ],
    );
    let event = rig
        .hw
        .scheduler
        .register_event("stop", Box::new(|_| EventAction::Stop))
        .unwrap();
    rig.hw.scheduler.schedule(event, 3);

    let report = rig.executor.run(&mut rig.hw, None).unwrap();
    assert_eq!(report.reason, StopReason::Event);
    assert_eq!(report.instructions, 2);
    assert_eq!(rig.hw.scheduler.current_cycle(), 3);
    assert_eq!(rig.hw.cpu.reg(1), 1);
}

#[test]
fn test_fetch_fault_costs_a_cycle() {
    let mut rig = Rig::new(ExecutorKind::Interpreter);
    // Nothing is mapped there
    rig.hw.cpu.set_pc(0x8100_0000);
    let report = rig.executor.step(&mut rig.hw).unwrap();
    assert_eq!(report.instructions, 0);
    assert_eq!(report.cycles, 1);
    assert_eq!(rig.hw.cpu.pc(), 0xBFC0_0180);
}
