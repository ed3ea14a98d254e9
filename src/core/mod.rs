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

//! Core machine components
//!
//! - CPU (MIPS-I with COP0, TLB and a single-precision FPU)
//! - Address space, memory regions and device dispatch
//! - MMU and TLB translation
//! - Event scheduler
//! - Interpreter and block recompiler executors
//! - Built-in devices: interrupts, timers, video clock, input, audio, disc
//! - Snapshots and machine integration

pub mod audio;
pub mod cdrom;
pub mod config;
pub mod controller;
pub mod cpu;
pub mod error;
pub mod executor;
pub mod interrupt;
pub mod memory;
pub mod mmu;
pub mod save_state;
pub mod system;
pub mod timer;
pub mod timing;
pub mod video;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use config::{ExecutorKind, MachineConfig};
pub use cpu::CPU;
pub use error::{EmulatorError, Result};
pub use executor::{ExecutionControl, RunReport, StopReason};
pub use memory::AddressSpace;
pub use system::Machine;
