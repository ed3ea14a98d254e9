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

//! Target and overflow interrupts

use super::super::*;
use super::bench;

#[test]
fn test_irq_on_target_fires_at_deadline() {
    let mut bench = bench();
    bench.write(0x08, 1000);
    bench.write(0x04, (IRQ_ON_TARGET | RESET_ON_TARGET) as u32);

    bench.advance_to(999);
    assert_eq!(bench.irq_status(), 0);

    bench.advance_to(1000);
    assert_eq!(bench.irq_status(), IrqLine::Timer0.bit() as u32);
}

#[test]
fn test_one_shot_irq() {
    let mut bench = bench();
    bench.write(0x08, 100);
    bench.write(0x04, (IRQ_ON_TARGET | RESET_ON_TARGET) as u32);

    bench.advance_to(100);
    bench.ack_irqs();
    bench.advance_to(500);
    assert_eq!(bench.irq_status(), 0);
    assert!(bench.device::<Timers>().channel(0).irq_pending());
}

#[test]
fn test_repeat_irq() {
    let mut bench = bench();
    bench.write(0x28, 100);
    bench.write(0x24, (IRQ_ON_TARGET | RESET_ON_TARGET | IRQ_REPEAT) as u32);

    let mut count = 0;
    for cycle in (100..=500).step_by(100) {
        bench.advance_to(cycle);
        if bench.irq_status() & IrqLine::Timer2.bit() as u32 != 0 {
            count += 1;
        }
        bench.ack_irqs();
    }
    assert_eq!(count, 5);
}

#[test]
fn test_irq_on_max() {
    let mut bench = bench();
    bench.write(0x14, (IRQ_ON_MAX | IRQ_REPEAT) as u32);

    bench.advance_to(0xFFFE);
    assert_eq!(bench.irq_status(), 0);
    bench.advance_to(0xFFFF);
    assert_eq!(bench.irq_status(), IrqLine::Timer1.bit() as u32);
    bench.ack_irqs();

    // Next overflow is a full period later
    bench.advance_to(0xFFFF + 0xFFFF);
    assert_eq!(bench.irq_status(), 0);
    bench.advance_to(0xFFFF + 0x1_0000);
    assert_eq!(bench.irq_status(), IrqLine::Timer1.bit() as u32);
}

#[test]
fn test_reached_flags_clear_on_read() {
    let mut bench = bench();
    bench.write(0x08, 50);
    bench.write(0x04, IRQ_ON_TARGET as u32);
    bench.advance_to(60);

    let mode = bench.read(0x04) as u16;
    assert_ne!(mode & REACHED_TARGET, 0);
    assert_ne!(mode & IRQ_FLAG, 0);

    let mode = bench.read(0x04) as u16;
    assert_eq!(mode & REACHED_TARGET, 0);
    assert_ne!(mode & IRQ_FLAG, 0);
}

#[test]
fn test_target_write_reschedules() {
    let mut bench = bench();
    bench.write(0x08, 1000);
    bench.write(0x04, (IRQ_ON_TARGET | RESET_ON_TARGET) as u32);
    bench.advance_to(100);
    bench.write(0x08, 200);

    bench.advance_to(199);
    assert_eq!(bench.irq_status(), 0);
    bench.advance_to(200);
    assert_eq!(bench.irq_status(), IrqLine::Timer0.bit() as u32);
}

#[test]
fn test_divided_clock_deadline() {
    let mut bench = bench();
    bench.write(0x08, 10);
    bench.write(0x04, (IRQ_ON_TARGET | CLOCK_DIV8) as u32);
    bench.advance_to(79);
    assert_eq!(bench.irq_status(), 0);
    bench.advance_to(80);
    assert_ne!(bench.irq_status(), 0);
}

#[test]
fn test_disabling_irq_cancels_event() {
    let mut bench = bench();
    bench.write(0x08, 100);
    bench.write(0x04, IRQ_ON_TARGET as u32);
    assert!(bench.scheduler.next_deadline().is_some());

    bench.write(0x04, 0);
    assert_eq!(bench.scheduler.next_deadline(), None);
}
