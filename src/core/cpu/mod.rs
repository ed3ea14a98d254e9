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

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

use crate::core::config::map::RESET_VECTOR;
use crate::core::memory::AddressSpace;
use crate::core::mmu::{AccessKind, Mmu, PrivilegeMode};

/// Guest CPU (MIPS I with TLB and single-precision FPU)
///
/// # Specifications
/// - Architecture: MIPS I (32-bit), little-endian
/// - Registers: 32 general-purpose registers, HI/LO, COP0, COP1
/// - One branch delay slot and one load delay slot
///
/// The CPU itself never touches memory directly: every access goes through a
/// [`MemoryPort`], which pairs the MMU with the physical address space.
///
/// # Example
/// ```
/// use vmcore::core::cpu::CPU;
///
/// let mut cpu = CPU::new();
/// cpu.set_reg(0, 5);
/// assert_eq!(cpu.reg(0), 0); // r0 is always 0
/// assert_eq!(cpu.pc(), 0xBFC0_0000);
/// ```
#[derive(Debug, Clone)]
pub struct CPU {
    /// General purpose registers (r0-r31)
    ///
    /// r0 is hardwired to always return 0
    regs: [u32; 32],

    /// Address of the next instruction to fetch
    pc: u32,

    /// Address after that (differs from pc + 4 when a branch is pending)
    next_pc: u32,

    /// Address of the instruction currently executing
    current_pc: u32,

    hi: u32,
    lo: u32,

    /// Coprocessor 0 (System Control Unit)
    cop0: COP0,

    fpu: Fpu,

    /// Load that lands after the next instruction
    load_delay: Option<LoadDelay>,

    /// Load landing once the current instruction finishes
    retiring: Option<LoadDelay>,

    /// Register the current instruction wrote directly
    written: Option<u8>,

    /// The instruction just executed was a branch; pc is its delay slot
    branch_pending: bool,

    /// The current instruction sits in a delay slot
    in_delay_slot: bool,
}

/// Pending load delay slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct LoadDelay {
    pub reg: u8,
    pub value: u32,
}

/// Everything the CPU needs to reach memory
///
/// Built fresh for every instruction or block so the CPU, the MMU and the
/// address space can be borrowed independently.
pub struct MemoryPort<'a> {
    pub mmu: &'a mut Mmu,
    pub bus: &'a mut AddressSpace,
}

/// Serializable CPU state
///
/// Used both for save states and for the register dump of the command line
/// front-end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct CpuState {
    pub regs: [u32; 32],
    pub hi: u32,
    pub lo: u32,
    pub pc: u32,
    pub next_pc: u32,
    pub current_pc: u32,
    pub branch_pending: bool,
    pub in_delay_slot: bool,
    pub load_delay: Option<LoadDelay>,
    pub cop0: [u32; 32],
    pub fpu: [u32; 32],
    pub fcr31: u32,
}

// Module declarations
mod cop0;
mod decode;
pub mod encode;
mod fpu;
mod instructions;
#[cfg(test)]
mod tests;

// Re-exports
pub use cop0::{ExceptionCause, StatusFlags};
use cop0::COP0;
pub use decode::{
    decode, AluOp, BranchCond, FpuOp, HiLoOp, ImmOp, LoadOp, MulDivOp, Op, ShiftOp, StoreOp,
};
pub use fpu::FCR0_VALUE;
use fpu::Fpu;

/// Exception vectors
const BOOT_REFILL_VECTOR: u32 = 0xBFC0_0100;
const BOOT_GENERAL_VECTOR: u32 = 0xBFC0_0180;
const REFILL_VECTOR: u32 = 0x8000_0000;
const GENERAL_VECTOR: u32 = 0x8000_0080;

/// Cycles charged when an instruction fetch faults
pub const FETCH_FAULT_CYCLES: u32 = 1;

impl CPU {
    /// Create a CPU in its reset state
    pub fn new() -> Self {
        Self {
            regs: [0u32; 32],
            pc: RESET_VECTOR,
            next_pc: RESET_VECTOR.wrapping_add(4),
            current_pc: RESET_VECTOR,
            hi: 0,
            lo: 0,
            cop0: COP0::new(),
            fpu: Fpu::new(),
            load_delay: None,
            retiring: None,
            written: None,
            branch_pending: false,
            in_delay_slot: false,
        }
    }

    /// Reset CPU to initial state
    ///
    /// Registers clear, COP0 returns to kernel mode with boot vectors and
    /// execution restarts at the reset vector.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Read from general purpose register
    ///
    /// r0 always reads as 0.
    #[inline(always)]
    pub fn reg(&self, index: u8) -> u32 {
        if index == 0 {
            0
        } else {
            self.regs[(index & 0x1F) as usize]
        }
    }

    /// Write to general purpose register
    ///
    /// Writes to r0 are ignored. A direct write cancels a load to the same
    /// register that would otherwise land after this instruction.
    #[inline(always)]
    pub fn set_reg(&mut self, index: u8, value: u32) {
        let index = index & 0x1F;
        if index != 0 {
            self.regs[index as usize] = value;
            self.written = Some(index);
        }
    }

    /// Queue a register write behind the load delay slot
    #[inline(always)]
    pub(crate) fn set_reg_delayed(&mut self, index: u8, value: u32) {
        let index = index & 0x1F;
        self.load_delay = (index != 0).then_some(LoadDelay { reg: index, value });
    }

    /// Value a load merge (LWL/LWR) sees for `index`
    ///
    /// A load still in flight to the same register is forwarded.
    pub(crate) fn pending_value(&self, index: u8) -> u32 {
        match self.retiring {
            Some(load) if load.reg == index => load.value,
            _ => self.reg(index),
        }
    }

    #[inline(always)]
    pub fn pc(&self) -> u32 {
        self.pc
    }

    /// Redirect execution, dropping any pending delay slot
    pub fn set_pc(&mut self, pc: u32) {
        self.pc = pc;
        self.next_pc = pc.wrapping_add(4);
        self.branch_pending = false;
        self.in_delay_slot = false;
    }

    pub fn next_pc(&self) -> u32 {
        self.next_pc
    }

    /// Address of the most recently executed instruction
    pub fn current_pc(&self) -> u32 {
        self.current_pc
    }

    pub fn hi(&self) -> u32 {
        self.hi
    }

    pub fn lo(&self) -> u32 {
        self.lo
    }

    /// Whether the next instruction is a branch delay slot
    pub fn branch_pending(&self) -> bool {
        self.branch_pending
    }

    pub fn load_delay(&self) -> Option<LoadDelay> {
        self.load_delay
    }

    pub fn cop0_reg(&self, index: u8) -> u32 {
        self.cop0.read(index)
    }

    /// Host-side COP0 write (same masking as MTC0)
    pub fn set_cop0_reg(&mut self, index: u8, value: u32) {
        self.cop0.write(index, value);
    }

    pub fn status(&self) -> StatusFlags {
        self.cop0.status()
    }

    pub fn mode(&self) -> PrivilegeMode {
        self.cop0.mode()
    }

    /// Raw bits of FPU register `index`
    pub fn fpu_reg(&self, index: u8) -> u32 {
        self.fpu.raw(index)
    }

    pub fn set_fpu_reg(&mut self, index: u8, value: u32) {
        self.fpu.set_raw(index, value);
    }

    pub fn fpu_control(&self, index: u8) -> u32 {
        self.fpu.read_control(index)
    }

    /// Fetch the instruction at pc
    ///
    /// On a translation fault or a fetch from non-executable memory the
    /// matching exception is raised and `None` returned; the caller then
    /// charges [`FETCH_FAULT_CYCLES`] and continues at the handler.
    pub fn fetch(&mut self, mem: &mut MemoryPort) -> Option<u32> {
        let pc = self.pc;
        let in_delay = self.branch_pending;
        match mem
            .mmu
            .translate_access(pc, 4, AccessKind::Fetch, self.cop0.mode())
        {
            Ok(paddr) => match mem.bus.fetch_code(paddr) {
                Some(word) => Some(word),
                None => {
                    log::debug!("Instruction bus error at 0x{:08X}", pc);
                    self.enter_exception(ExceptionCause::BusErrorInstruction, pc, in_delay, 0);
                    None
                }
            },
            Err(fault) => {
                self.fault_exception(fault, pc, in_delay);
                None
            }
        }
    }

    /// Execute one decoded instruction and return its cycle cost
    ///
    /// The instruction must be the one at `pc`. Exceptions raised by the
    /// instruction redirect `pc` to the handler before this returns.
    pub fn execute(&mut self, op: Op, mem: &mut MemoryPort) -> u32 {
        self.retiring = self.load_delay.take();
        self.written = None;

        self.current_pc = self.pc;
        self.pc = self.next_pc;
        self.next_pc = self.next_pc.wrapping_add(4);
        self.in_delay_slot = self.branch_pending;
        self.branch_pending = false;

        self.dispatch(op, mem);

        if let Some(load) = self.retiring.take() {
            // A direct write or a newer load to the same register wins
            let superseded = self.written == Some(load.reg)
                || self.load_delay.is_some_and(|next| next.reg == load.reg);
            if !superseded {
                self.regs[load.reg as usize] = load.value;
            }
        }

        op.cycles()
    }

    /// No branch delay slot or load delay slot is pending
    ///
    /// Only at such a boundary can a run of register-only instructions be
    /// applied as a whole by [`retire_native`](Self::retire_native).
    pub(crate) fn at_plain_boundary(&self) -> bool {
        !self.branch_pending && self.load_delay.is_none()
    }

    /// Register file handed to compiled host code
    pub(crate) fn native_registers(&mut self) -> (&mut [u32; 32], &mut u32, &mut u32) {
        (&mut self.regs, &mut self.hi, &mut self.lo)
    }

    /// Advance past `count` sequential instructions run as host code
    pub(crate) fn retire_native(&mut self, count: u32) {
        if count == 0 {
            return;
        }
        self.current_pc = self.pc.wrapping_add((count - 1) * 4);
        self.pc = self.current_pc.wrapping_add(4);
        self.next_pc = self.pc.wrapping_add(4);
        self.in_delay_slot = false;
        self.written = None;
    }

    /// Take a pending interrupt before the next instruction
    ///
    /// `hw_pending` is the interrupt controller output. Returns whether the
    /// CPU entered the interrupt handler.
    pub fn service_interrupts(&mut self, hw_pending: bool) -> bool {
        self.cop0.set_hw_interrupt(hw_pending);
        if !self.cop0.interrupt_requested() {
            return false;
        }
        let victim = self.pc;
        let in_delay = self.branch_pending;
        self.enter_exception(ExceptionCause::Interrupt, victim, in_delay, 0);
        true
    }

    /// Raise an exception for the current instruction
    pub(crate) fn exception(&mut self, cause: ExceptionCause) {
        self.exception_with_cop(cause, 0);
    }

    pub(crate) fn exception_with_cop(&mut self, cause: ExceptionCause, coprocessor: u8) {
        let epc_source = self.current_pc;
        let in_delay = self.in_delay_slot;
        self.enter_exception(cause, epc_source, in_delay, coprocessor);
    }

    /// Raise the exception matching a failed translation of the current
    /// instruction's data access
    pub(crate) fn raise_fault(&mut self, fault: crate::core::mmu::Fault) {
        let victim = self.current_pc;
        let in_delay = self.in_delay_slot;
        self.fault_exception(fault, victim, in_delay);
    }

    fn fault_exception(&mut self, fault: crate::core::mmu::Fault, victim: u32, in_delay: bool) {
        use crate::core::mmu::FaultKind;

        let write = fault.access == AccessKind::Write;
        let cause = match fault.kind {
            FaultKind::AddressError | FaultKind::Misaligned if write => {
                ExceptionCause::AddressErrorStore
            }
            FaultKind::AddressError | FaultKind::Misaligned => ExceptionCause::AddressErrorLoad,
            FaultKind::Modified => ExceptionCause::TlbModified,
            _ if write => ExceptionCause::TlbStore,
            _ => ExceptionCause::TlbLoad,
        };

        self.cop0.regs[COP0::BADA] = fault.vaddr;
        if fault.is_tlb() {
            self.cop0.set_tlb_fault(fault.vaddr);
        }

        log::debug!(
            "{:?} fault at 0x{:08X} ({:?}) from pc 0x{:08X}",
            fault.kind,
            fault.vaddr,
            fault.access,
            victim
        );

        self.cop0.enter_exception(cause, Self::epc_for(victim, in_delay), in_delay, 0);
        let vector = if fault.is_refill() {
            self.refill_vector()
        } else {
            self.general_vector()
        };
        self.jump_to_handler(vector);
    }

    fn enter_exception(
        &mut self,
        cause: ExceptionCause,
        victim: u32,
        in_delay: bool,
        coprocessor: u8,
    ) {
        log::trace!(
            "Exception {:?} at 0x{:08X} (delay slot: {})",
            cause,
            victim,
            in_delay
        );
        self.cop0
            .enter_exception(cause, Self::epc_for(victim, in_delay), in_delay, coprocessor);
        let vector = self.general_vector();
        self.jump_to_handler(vector);
    }

    /// EPC points at the branch when the victim is in its delay slot
    fn epc_for(victim: u32, in_delay: bool) -> u32 {
        if in_delay {
            victim.wrapping_sub(4)
        } else {
            victim
        }
    }

    fn general_vector(&self) -> u32 {
        if self.cop0.status().contains(StatusFlags::BEV) {
            BOOT_GENERAL_VECTOR
        } else {
            GENERAL_VECTOR
        }
    }

    fn refill_vector(&self) -> u32 {
        if self.cop0.status().contains(StatusFlags::BEV) {
            BOOT_REFILL_VECTOR
        } else {
            REFILL_VECTOR
        }
    }

    fn jump_to_handler(&mut self, vector: u32) {
        // A load started before the exception still completes
        if let Some(load) = self.load_delay.take() {
            self.regs[load.reg as usize] = load.value;
        }
        self.pc = vector;
        self.next_pc = vector.wrapping_add(4);
        self.branch_pending = false;
        self.in_delay_slot = false;
    }

    /// Snapshot of the architectural state
    pub fn state(&self) -> CpuState {
        CpuState {
            regs: self.regs,
            hi: self.hi,
            lo: self.lo,
            pc: self.pc,
            next_pc: self.next_pc,
            current_pc: self.current_pc,
            branch_pending: self.branch_pending,
            in_delay_slot: self.in_delay_slot,
            load_delay: self.load_delay,
            cop0: self.cop0.regs,
            fpu: self.fpu.regs,
            fcr31: self.fpu.fcr31,
        }
    }

    pub fn restore(&mut self, state: &CpuState) {
        self.regs = state.regs;
        self.regs[0] = 0;
        self.hi = state.hi;
        self.lo = state.lo;
        self.pc = state.pc;
        self.next_pc = state.next_pc;
        self.current_pc = state.current_pc;
        self.branch_pending = state.branch_pending;
        self.in_delay_slot = state.in_delay_slot;
        self.load_delay = state.load_delay.filter(|load| load.reg != 0 && load.reg < 32);
        self.retiring = None;
        self.written = None;
        self.cop0.regs = state.cop0;
        self.fpu.regs = state.fpu;
        self.fpu.fcr31 = state.fcr31;
    }
}

impl Default for CPU {
    fn default() -> Self {
        Self::new()
    }
}
