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

//! Snapshots and requests from other threads

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use super::*;
use crate::core::error::SerializationError;
use crate::core::save_state::MachineSnapshot;

/// Bump a counter at RAM 0 once per boot, then count r3 up forever
fn counter_program() -> Vec<u32> {
    let mut program = Vec::new();
    program.extend(asm::li(9, 0x8000_0000));
    program.extend([
        asm::lw(10, 9, 0),
        asm::NOP,
        asm::addiu(10, 10, 1),
        asm::sw(10, 9, 0),
        // loop:
        asm::addiu(3, 3, 1),
        asm::beq(0, 0, -2),
        asm::NOP,
    ]);
    program
}

#[test]
fn test_snapshot_round_trip() {
    for kind in KINDS {
        let mut original = machine(kind);
        load_boot(&mut original, &counter_program());
        original.run_until(5_000).unwrap();

        let bytes = original.serialize().unwrap();
        let mut restored = machine(kind);
        restored.deserialize(&bytes).unwrap();

        assert_eq!(restored.cycles(), original.cycles());
        assert_eq!(restored.cpu().state(), original.cpu().state());

        // Both continue identically, frame events included
        original.run_until(25_000).unwrap();
        restored.run_until(25_000).unwrap();
        assert_eq!(restored.frames(), 2);
        assert_eq!(restored.cpu().state(), original.cpu().state());
        assert_eq!(restored.serialize().unwrap(), original.serialize().unwrap());
    }
}

#[test]
fn test_snapshot_across_strategies() {
    let mut interpreted = machine(ExecutorKind::Interpreter);
    load_boot(&mut interpreted, &counter_program());
    interpreted.run_until(1_000).unwrap();

    let mut recompiled = machine(ExecutorKind::Recompiler);
    recompiled
        .deserialize(&interpreted.serialize().unwrap())
        .unwrap();

    interpreted.run_until(3_000).unwrap();
    recompiled.run_until(3_000).unwrap();
    assert_eq!(recompiled.cpu().reg(3), interpreted.cpu().reg(3));
}

#[test]
fn test_bad_snapshot_leaves_machine_untouched() {
    let mut machine = machine(ExecutorKind::Interpreter);
    load_boot(&mut machine, &counter_program());
    machine.run_until(500).unwrap();
    let before = machine.serialize().unwrap();

    let mut truncated = before.clone();
    truncated.truncate(before.len() / 2);
    assert!(machine.deserialize(&truncated).is_err());

    let mut bad_magic = before.clone();
    bad_magic[0] ^= 0xFF;
    assert!(matches!(
        machine.deserialize(&bad_magic),
        Err(EmulatorError::Serialization(SerializationError::BadMagic))
    ));

    // A snapshot of a machine with more RAM does not fit
    let config = MachineConfig {
        memory: Some(MemoryLayout {
            ram_size: 0x2_0000,
            ..small_config(ExecutorKind::Interpreter).layout()
        }),
        ..small_config(ExecutorKind::Interpreter)
    };
    let bigger = Machine::new(config).unwrap();
    assert!(machine.deserialize(&bigger.serialize().unwrap()).is_err());

    assert_eq!(machine.serialize().unwrap(), before);
}

#[test]
fn test_corrupt_schedule_is_rejected() {
    let mut machine = machine(ExecutorKind::Recompiler);
    load_boot(&mut machine, &counter_program());
    machine.run_until(2_000).unwrap();
    let before = machine.serialize().unwrap();

    let mut snapshot = MachineSnapshot::decode(&before).unwrap();
    assert!(snapshot.scheduler.pending.iter().any(|event| event.period.is_some()));
    for event in &mut snapshot.scheduler.pending {
        event.period = Some(0);
    }
    assert!(matches!(
        machine.deserialize(&snapshot.encode().unwrap()),
        Err(EmulatorError::Serialization(SerializationError::InvalidEvent { .. }))
    ));

    let mut snapshot = MachineSnapshot::decode(&before).unwrap();
    snapshot.scheduler.current_cycle = u64::MAX - 1;
    snapshot.scheduler.pending[0].remaining = 1_000;
    assert!(matches!(
        machine.deserialize(&snapshot.encode().unwrap()),
        Err(EmulatorError::Serialization(SerializationError::InvalidEvent { .. }))
    ));

    // Untouched, and still runs to its target
    assert_eq!(machine.serialize().unwrap(), before);
    machine.run_until(4_000).unwrap();
    assert_eq!(machine.cycles(), 4_000);
}

#[test]
fn test_idle_requests_serviced_by_next_run() {
    let mut machine = machine(ExecutorKind::Interpreter);
    load_boot(&mut machine, &counter_program());
    machine.run_until(100).unwrap();
    assert_eq!(machine.bus().peek32(0), Some(1));

    let control = machine.control();
    let reply = control.request_snapshot();
    control.request_reset();
    machine.run_until(200).unwrap();

    let bytes = reply.recv_timeout(Duration::from_secs(5)).unwrap().unwrap();
    assert!(!bytes.is_empty());
    // The soft reset re-ran the boot code over kept memory
    assert_eq!(machine.bus().peek32(0), Some(2));
}

#[test]
fn test_requests_from_another_thread() {
    for kind in KINDS {
        let mut machine = machine(kind);
        load_boot(&mut machine, &counter_program());
        machine.run_until(100).unwrap();
        let control = machine.control();
        let done = Arc::new(AtomicBool::new(false));

        let remote = {
            let control = control.clone();
            let done = done.clone();
            thread::spawn(move || {
                while !control.is_running() {
                    thread::yield_now();
                }
                control.request_reset();
                let snapshot = control
                    .request_snapshot()
                    .recv_timeout(Duration::from_secs(10));
                // Stop is dropped while the run loop is between slices, so repeat it
                while !done.load(Ordering::Acquire) {
                    control.stop();
                    thread::sleep(Duration::from_millis(1));
                }
                snapshot
            })
        };

        let report = machine.run_until(200_000_000).unwrap();
        done.store(true, Ordering::Release);
        let snapshot = remote.join().unwrap().unwrap().unwrap();

        assert_eq!(report.reason, StopReason::Stopped);
        assert!(!machine.is_running());

        let mut copy = Machine::new(small_config(kind)).unwrap();
        copy.deserialize(&snapshot).unwrap();
        assert!(copy.cycles() <= machine.cycles());

        // The reset re-ran the boot code over kept memory
        machine.run_until(machine.cycles() + 100).unwrap();
        assert_eq!(machine.bus().peek32(0), Some(2));
    }
}
