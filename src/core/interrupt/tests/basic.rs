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

//! Request and acknowledge behaviour

use super::super::*;

#[test]
fn test_interrupt_request() {
    let mut ic = InterruptController::new();

    ic.request(IrqLine::VBlank);
    assert_eq!(ic.status, IrqLine::VBlank.bit());
    assert_eq!(ic.read_status(), 1);
}

#[test]
fn test_multiple_interrupt_requests() {
    let mut ic = InterruptController::new();

    ic.request(IrqLine::VBlank);
    ic.request(IrqLine::Timer1);

    assert_eq!(ic.status, IrqLine::VBlank.bit() | IrqLine::Timer1.bit());
}

#[test]
fn test_write_one_acknowledges() {
    let mut ic = InterruptController::new();
    ic.request(IrqLine::Timer0);
    ic.request(IrqLine::Disc);

    ic.write_status(IrqLine::Timer0.bit() as u32);
    assert_eq!(ic.read_status(), IrqLine::Disc.bit() as u32);

    // Zero bits leave pending interrupts alone
    ic.write_status(0);
    assert_eq!(ic.read_status(), IrqLine::Disc.bit() as u32);
}

#[test]
fn test_register_offsets() {
    let mut ic = InterruptController::new();
    ic.write_register(I_MASK, 0x7F);
    ic.request(IrqLine::Input);

    assert_eq!(ic.read_register(I_MASK), 0x7F);
    assert_eq!(ic.read_register(I_STAT), 1 << 6);
    assert_eq!(ic.read_register(0x8), 0);
}

#[test]
fn test_state_round_trip() {
    let mut ic = InterruptController::new();
    ic.request(IrqLine::Audio);
    ic.write_mask(0x10);
    let state = ic.state();

    let mut other = InterruptController::new();
    other.restore(state);
    assert!(other.is_pending());
    assert_eq!(other.state(), state);
}

#[test]
fn test_timer_lines() {
    assert_eq!(IrqLine::timer(0), IrqLine::Timer0);
    assert_eq!(IrqLine::timer(1), IrqLine::Timer1);
    assert_eq!(IrqLine::timer(2), IrqLine::Timer2);
}
