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

//! Running guest code through the machine

use std::sync::{Arc, Mutex};

use super::*;
use crate::core::cpu::StatusFlags;
use crate::core::interrupt::IrqLine;

#[test]
fn test_run_until_target() {
    for kind in KINDS {
        let mut machine = machine(kind);
        load_boot(&mut machine, &spin());
        let report = machine.run_until(1_000).unwrap();
        assert_eq!(report.reason, StopReason::TargetReached);
        assert_eq!(machine.cycles(), 1_000);
        assert_eq!(report.cycles, 1_000);
    }
}

#[test]
fn test_frame_yield() {
    for kind in KINDS {
        let config = MachineConfig {
            yield_on_frame: true,
            cycles_per_frame: 2_000,
            ..small_config(kind)
        };
        let mut machine = Machine::new(config).unwrap();
        load_boot(&mut machine, &spin());

        let frames = Arc::new(Mutex::new(Vec::new()));
        let sink = frames.clone();
        machine.on_frame(Box::new(move |info| sink.lock().unwrap().push(info.frame)));

        let report = machine.run().unwrap();
        assert_eq!(report.reason, StopReason::FrameYield);
        assert_eq!(machine.cycles(), 2_000);

        machine.run().unwrap();
        assert_eq!(machine.cycles(), 4_000);
        assert_eq!(machine.frames(), 2);
        assert_eq!(*frames.lock().unwrap(), vec![1, 2]);
    }
}

#[test]
fn test_step() {
    let mut machine = machine(ExecutorKind::Recompiler);
    load_boot(&mut machine, &[asm::addiu(3, 0, 5), asm::addiu(3, 3, 1)]);

    let report = machine.step().unwrap();
    assert_eq!(report.reason, StopReason::Stepped);
    assert_eq!(report.instructions, 1);
    assert_eq!(machine.cpu().reg(3), 5);

    machine.step().unwrap();
    assert_eq!(machine.cpu().reg(3), 6);
    assert_eq!(machine.cycles(), 2);
}

/// Timer 0 interrupts every 100 cycles; the handler counts them in r8
fn timer_interrupt_program() -> Vec<u32> {
    let sr = (StatusFlags::BEV | StatusFlags::CU0 | StatusFlags::IM_HW | StatusFlags::IEC).bits();
    let mut program = Vec::new();
    program.extend(device_base(9, map::IRQ_BASE));
    program.extend([asm::ori(10, 0, IrqLine::Timer0.bit()), asm::sw(10, 9, 4)]);
    program.extend(device_base(11, map::TIMER_BASE));
    // target = 100, mode = reset on target | irq on target | repeat
    program.extend([
        asm::ori(12, 0, 100),
        asm::sw(12, 11, 8),
        asm::ori(12, 0, 0x58),
        asm::sw(12, 11, 4),
    ]);
    program.extend(asm::li(13, sr));
    program.push(asm::mtc0(13, 12));
    program.extend(spin());

    // General exception vector with BEV set: 0xBFC00180
    program.resize(0x180 / 4, asm::NOP);
    program.extend([
        asm::addiu(8, 8, 1),
        asm::ori(14, 0, IrqLine::Timer0.bit()),
        asm::sw(14, 9, 0),
        asm::mfc0(26, 14),
        asm::NOP,
        asm::jr(26),
        asm::rfe(),
    ]);
    program
}

#[test]
fn test_guest_handles_timer_interrupts() {
    let mut counts = Vec::new();
    for kind in KINDS {
        let mut machine = machine(kind);
        load_boot(&mut machine, &timer_interrupt_program());
        machine.run_until(1_050).unwrap();
        counts.push(machine.cpu().reg(8));
    }
    assert!(counts[0] >= 8, "only {} interrupts taken", counts[0]);
    assert_eq!(counts[0], counts[1]);
}

#[test]
fn test_fatal_error_recorded() {
    let config = MachineConfig {
        code_cache_capacity: 1,
        ..small_config(ExecutorKind::Recompiler)
    };
    let mut machine = Machine::new(config).unwrap();
    load_boot(&mut machine, &[asm::NOP, asm::NOP, asm::NOP, asm::beq(0, 0, -1), asm::NOP]);

    assert!(matches!(
        machine.run_until(100),
        Err(EmulatorError::Fatal(FatalError::CodeCacheExhausted { .. }))
    ));
    assert!(machine.last_error().is_some());
    assert!(!machine.is_running());

    machine.reset(true);
    assert!(machine.last_error().is_none());
}

#[test]
fn test_take_last_error_clears_it() {
    let config = MachineConfig {
        code_cache_capacity: 1,
        ..small_config(ExecutorKind::Recompiler)
    };
    let mut machine = Machine::new(config).unwrap();
    load_boot(&mut machine, &[asm::NOP, asm::NOP, asm::NOP, asm::beq(0, 0, -1), asm::NOP]);
    assert!(machine.run_until(100).is_err());

    assert!(matches!(
        machine.take_last_error(),
        Some(FatalError::CodeCacheExhausted { .. })
    ));
    assert!(machine.last_error().is_none());
    assert_eq!(machine.take_last_error(), None);
}
