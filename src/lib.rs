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

//! Deterministic execution core for a fixed-hardware console virtual machine
//!
//! The crate runs MIPS-I guest code against a configurable memory map and a
//! set of memory-mapped devices. Guest time is counted in CPU cycles and every
//! device reacts to scheduler events, so two runs from the same state produce
//! the same results regardless of the execution strategy.
//!
//! # Example
//!
//! ```
//! use vmcore::core::cpu::encode;
//! use vmcore::core::{Machine, MachineConfig, StopReason};
//!
//! let mut machine = Machine::new(MachineConfig::default()).unwrap();
//! let program = [
//!     encode::addiu(2, 0, 40),
//!     encode::addiu(2, 2, 2),
//!     encode::beq(0, 0, -1),
//!     encode::NOP,
//! ];
//! machine.load_program(0x8000_1000, &program).unwrap();
//! machine.set_entry_point(0x8000_1000);
//!
//! let report = machine.run_until(100).unwrap();
//! assert_eq!(report.reason, StopReason::TargetReached);
//! assert_eq!(machine.cpu().reg(2), 42);
//! ```

pub mod core;
