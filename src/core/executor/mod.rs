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

//! CPU execution strategies
//!
//! The executor drives the CPU in execution units and reports the cycles each
//! unit consumed to the scheduler. Two strategies share one contract:
//!
//! - **Interpreter**: one instruction per unit (fetch, translate, decode, execute)
//! - **Recompiler**: one translated block per unit, its register-only runs
//!   compiled to host code and the rest applied through [`CPU::execute`]
//!
//! Both strategies take interrupts at the same instruction boundaries, and end a unit exactly when the next scheduled
//! event comes due, so a run produces the same guest state with either
//! strategy.
//!
//! # Run Loop
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │ budget = min(next event, run target) - now  (>= 1)   │
//! │ elapsed = strategy.run_unit(budget)                  │
//! │ scheduler.apply_requests(bus.take_requests())        │
//! │ scheduler.advance_to(now + elapsed)  -> fire events  │
//! │ check stop / reset / snapshot requests               │
//! └──────────────────────────────────────────────────────┘
//! ```

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};

use crate::core::config::{ExecutorKind, MachineConfig};
use crate::core::cpu::{decode, MemoryPort, CPU, FETCH_FAULT_CYCLES};
use crate::core::error::Result;
use crate::core::memory::AddressSpace;
use crate::core::mmu::Mmu;
use crate::core::timing::{Cycle, EventAction, Scheduler};

mod block_cache;
mod interpreter;
mod jit;
mod recompiler;

#[cfg(test)]
mod tests;

pub use block_cache::{BlockCache, BlockId, CacheStats, CompiledBlock, NativeSegment};
pub use interpreter::Interpreter;
pub use jit::{JitCompiler, NativeCode};
pub use recompiler::Recompiler;

/// Cycles per unit when nothing is scheduled and no target is set
const IDLE_SLICE: Cycle = 1 << 16;

/// The hardware an executor drives
///
/// Kept separate from the executor so a strategy can borrow the CPU, the MMU
/// and the address space independently.
pub struct Hardware {
    pub cpu: CPU,
    pub mmu: Mmu,
    pub bus: AddressSpace,
    pub scheduler: Scheduler,
}

impl Hardware {
    pub fn new(mmu_enabled: bool) -> Self {
        Self {
            cpu: CPU::new(),
            mmu: Mmu::new(mmu_enabled),
            bus: AddressSpace::new(),
            scheduler: Scheduler::new(),
        }
    }

    /// Split out the CPU and its memory port
    #[inline(always)]
    pub(crate) fn split(&mut self) -> (&mut CPU, MemoryPort<'_>) {
        (
            &mut self.cpu,
            MemoryPort {
                mmu: &mut self.mmu,
                bus: &mut self.bus,
            },
        )
    }
}

/// Executor state shared with control handles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExecState {
    Idle = 0,
    Running = 1,
    Stepping = 2,
}

impl ExecState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ExecState::Running,
            2 => ExecState::Stepping,
            _ => ExecState::Idle,
        }
    }
}

/// Why a run returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// `stop()` was called
    Stopped,
    /// The run target cycle was reached
    TargetReached,
    /// An event handler asked the executor to stop
    Event,
    /// The video clock reached a frame boundary with yielding enabled
    FrameYield,
    /// A single instruction was executed
    Stepped,
    /// A reset or snapshot request is waiting to be serviced
    ControlRequest,
    /// `run` was called while already running
    AlreadyRunning,
}

/// Summary of one call to `run` or `step`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    pub reason: StopReason,
    pub instructions: u64,
    pub cycles: Cycle,
    pub blocks_executed: u64,
    pub blocks_compiled: u64,
}

impl RunReport {
    pub(crate) fn new() -> Self {
        Self {
            reason: StopReason::Stopped,
            instructions: 0,
            cycles: 0,
            blocks_executed: 0,
            blocks_compiled: 0,
        }
    }

    /// Fold another report in (used when a run is resumed after a request)
    pub fn merge(&mut self, other: &RunReport) {
        self.reason = other.reason;
        self.instructions += other.instructions;
        self.cycles += other.cycles;
        self.blocks_executed += other.blocks_executed;
        self.blocks_compiled += other.blocks_compiled;
    }
}

/// Work done by one execution unit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct UnitOutcome {
    pub cycles: Cycle,
    pub instructions: u64,
    pub blocks_executed: u64,
    pub blocks_compiled: u64,
}

/// Sender half of a snapshot request
pub type SnapshotReply = Sender<Result<Vec<u8>>>;

struct ControlInner {
    state: AtomicU8,
    stop: AtomicBool,
    reset: AtomicBool,
    snapshot: AtomicBool,
    replies: Mutex<Vec<SnapshotReply>>,
}

/// Thread-safe handle for controlling a running machine
///
/// Clones share the same state. Requests take effect at the next unit
/// boundary; an instruction or block is never interrupted halfway.
///
/// # Example
///
/// ```
/// use vmcore::core::executor::{ExecState, ExecutionControl};
///
/// let control = ExecutionControl::new();
/// assert_eq!(control.state(), ExecState::Idle);
/// // Stopping an idle executor does nothing
/// control.stop();
/// assert!(!control.is_running());
/// ```
#[derive(Clone)]
pub struct ExecutionControl {
    inner: Arc<ControlInner>,
}

impl ExecutionControl {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ControlInner {
                state: AtomicU8::new(ExecState::Idle as u8),
                stop: AtomicBool::new(false),
                reset: AtomicBool::new(false),
                snapshot: AtomicBool::new(false),
                replies: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn state(&self) -> ExecState {
        ExecState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    pub fn is_running(&self) -> bool {
        self.state() != ExecState::Idle
    }

    /// Ask the executor to stop; ignored while idle
    pub fn stop(&self) {
        if self.is_running() {
            self.inner.stop.store(true, Ordering::Release);
        }
    }

    /// Ask for a soft reset, serviced inside the run loop
    pub fn request_reset(&self) {
        self.inner.reset.store(true, Ordering::Release);
    }

    /// Ask for a snapshot, taken at the next unit boundary
    ///
    /// The encoded snapshot (or the error) arrives on the returned channel.
    /// If the machine is idle the request is serviced by the next run.
    pub fn request_snapshot(&self) -> Receiver<Result<Vec<u8>>> {
        let (tx, rx) = mpsc::channel();
        if let Ok(mut replies) = self.inner.replies.lock() {
            replies.push(tx);
        }
        self.inner.snapshot.store(true, Ordering::Release);
        rx
    }

    pub(crate) fn set_state(&self, state: ExecState) {
        self.inner.state.store(state as u8, Ordering::Release);
    }

    /// Enter Running unless already running
    fn begin(&self, state: ExecState) -> bool {
        self.inner
            .state
            .compare_exchange(
                ExecState::Idle as u8,
                state as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    fn finish(&self) {
        self.inner.stop.store(false, Ordering::Release);
        self.set_state(ExecState::Idle);
    }

    fn take_stop(&self) -> bool {
        self.inner.stop.swap(false, Ordering::AcqRel)
    }

    pub(crate) fn has_requests(&self) -> bool {
        self.inner.reset.load(Ordering::Acquire) || self.inner.snapshot.load(Ordering::Acquire)
    }

    pub(crate) fn take_reset(&self) -> bool {
        self.inner.reset.swap(false, Ordering::AcqRel)
    }

    pub(crate) fn take_snapshot_replies(&self) -> Vec<SnapshotReply> {
        self.inner.snapshot.store(false, Ordering::Release);
        self.inner
            .replies
            .lock()
            .map(|mut replies| std::mem::take(&mut *replies))
            .unwrap_or_default()
    }
}

impl Default for ExecutionControl {
    fn default() -> Self {
        Self::new()
    }
}

enum Strategy {
    Interpreter(Interpreter),
    Recompiler(Recompiler),
}

impl Strategy {
    fn from_config(config: &MachineConfig) -> Self {
        match config.executor {
            ExecutorKind::Interpreter => {
                log::info!("Using Interpreter");
                Strategy::Interpreter(Interpreter::new())
            }
            ExecutorKind::Recompiler => {
                log::info!("Using Recompiler");
                Strategy::Recompiler(Recompiler::new(
                    config.code_cache_capacity,
                    config.max_block_instructions,
                ))
            }
        }
    }
}

/// CPU executor
///
/// Wraps the strategy chosen by [`ExecutorKind`] behind one interface.
pub struct Executor {
    strategy: Strategy,
    control: ExecutionControl,
}

impl Executor {
    /// Build the strategy selected in the configuration
    pub fn init(config: &MachineConfig) -> Self {
        Self {
            strategy: Strategy::from_config(config),
            control: ExecutionControl::new(),
        }
    }

    /// Switch to the strategy selected in `config`
    ///
    /// Control handles stay valid. Nothing changes if the strategy and its
    /// cache limits already match.
    pub fn reconfigure(&mut self, hw: &mut Hardware, config: &MachineConfig) {
        let unchanged = match &self.strategy {
            Strategy::Interpreter(_) => config.executor == ExecutorKind::Interpreter,
            Strategy::Recompiler(recompiler) => {
                config.executor == ExecutorKind::Recompiler
                    && recompiler.cache().capacity() == config.code_cache_capacity
                    && recompiler.max_block_instructions() == config.max_block_instructions
            }
        };
        if unchanged {
            return;
        }
        self.reset_code_cache(hw);
        self.strategy = Strategy::from_config(config);
    }

    pub fn kind(&self) -> ExecutorKind {
        match self.strategy {
            Strategy::Interpreter(_) => ExecutorKind::Interpreter,
            Strategy::Recompiler(_) => ExecutorKind::Recompiler,
        }
    }

    /// Handle for other threads
    pub fn control(&self) -> ExecutionControl {
        self.control.clone()
    }

    pub fn is_running(&self) -> bool {
        self.control.is_running()
    }

    pub fn stop(&self) {
        self.control.stop();
    }

    /// Drop translated code; a hard reset also clears the cache counters
    pub fn reset(&mut self, hw: &mut Hardware, hard: bool) {
        if let Strategy::Recompiler(recompiler) = &mut self.strategy {
            recompiler.reset_code_cache(&mut hw.bus);
            if hard {
                recompiler.reset_stats();
            }
        }
    }

    /// Discard every translated block (no-op for the interpreter)
    pub fn reset_code_cache(&mut self, hw: &mut Hardware) {
        if let Strategy::Recompiler(recompiler) = &mut self.strategy {
            recompiler.reset_code_cache(&mut hw.bus);
        }
    }

    /// Code cache counters, if the strategy has a cache
    pub fn cache_stats(&self) -> Option<CacheStats> {
        match &self.strategy {
            Strategy::Interpreter(_) => None,
            Strategy::Recompiler(recompiler) => Some(recompiler.stats()),
        }
    }

    /// Execute until stopped, until an event asks to stop, or until the
    /// scheduler reaches `until`
    ///
    /// A fatal error stops execution at the failing unit boundary and leaves
    /// the machine in its last consistent state.
    pub fn run(&mut self, hw: &mut Hardware, until: Option<Cycle>) -> Result<RunReport> {
        let mut report = RunReport::new();
        if !self.control.begin(ExecState::Running) {
            log::warn!("run() called while the executor is running");
            report.reason = StopReason::AlreadyRunning;
            return Ok(report);
        }

        let result = self.run_loop(hw, until, &mut report);
        self.control.finish();
        result.map(|reason| {
            report.reason = reason;
            report
        })
    }

    fn run_loop(
        &mut self,
        hw: &mut Hardware,
        until: Option<Cycle>,
        report: &mut RunReport,
    ) -> Result<StopReason> {
        loop {
            if self.control.take_stop() {
                return Ok(StopReason::Stopped);
            }
            if self.control.has_requests() {
                return Ok(StopReason::ControlRequest);
            }

            let now = hw.scheduler.current_cycle();
            if until.is_some_and(|target| now >= target) {
                return Ok(StopReason::TargetReached);
            }

            let mut budget = hw.scheduler.cycles_until_next_event().unwrap_or(IDLE_SLICE);
            if let Some(target) = until {
                budget = budget.min(target - now);
            }
            let budget = budget.max(1);

            let unit = match &mut self.strategy {
                Strategy::Interpreter(interpreter) => interpreter.run_unit(hw, now),
                Strategy::Recompiler(recompiler) => recompiler.run_unit(hw, now, budget)?,
            };
            report.instructions += unit.instructions;
            report.cycles += unit.cycles;
            report.blocks_executed += unit.blocks_executed;
            report.blocks_compiled += unit.blocks_compiled;

            if finish_unit(hw, now, unit.cycles) == EventAction::Stop {
                return Ok(StopReason::Event);
            }
        }
    }

    /// Execute exactly one instruction
    ///
    /// Both strategies step through the interpreter path; events that come
    /// due during the instruction fire before this returns.
    pub fn step(&mut self, hw: &mut Hardware) -> Result<RunReport> {
        let mut report = RunReport::new();
        if !self.control.begin(ExecState::Stepping) {
            report.reason = StopReason::AlreadyRunning;
            return Ok(report);
        }

        let now = hw.scheduler.current_cycle();
        let unit = interpret_one(hw, now);
        let action = finish_unit(hw, now, unit.cycles);
        self.control.finish();

        report.instructions = unit.instructions;
        report.cycles = unit.cycles;
        report.reason = if action == EventAction::Stop {
            StopReason::Event
        } else {
            StopReason::Stepped
        };
        Ok(report)
    }
}

/// Apply queued device requests and fire events up to the end of the unit
fn finish_unit(hw: &mut Hardware, start: Cycle, elapsed: Cycle) -> EventAction {
    let requests = hw.bus.take_requests();
    hw.scheduler.apply_requests(requests);
    hw.scheduler.advance_to(start + elapsed, &mut hw.bus)
}

/// Run one instruction at `pc` through the interpreter path
///
/// Pending interrupts are taken first. A faulting fetch costs
/// [`FETCH_FAULT_CYCLES`] and retires nothing.
pub(crate) fn interpret_one(hw: &mut Hardware, now: Cycle) -> UnitOutcome {
    hw.bus.set_now(now);
    let pending = hw.bus.interrupt_pending();
    let (cpu, mut port) = hw.split();
    cpu.service_interrupts(pending);

    match cpu.fetch(&mut port) {
        Some(word) => {
            let op = decode(word);
            log::trace!("0x{:08X}: {}", cpu.pc(), op);
            UnitOutcome {
                cycles: cpu.execute(op, &mut port) as Cycle,
                instructions: 1,
                ..UnitOutcome::default()
            }
        }
        None => UnitOutcome {
            cycles: FETCH_FAULT_CYCLES as Cycle,
            ..UnitOutcome::default()
        },
    }
}
