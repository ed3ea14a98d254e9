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

use bitflags::bitflags;

use crate::core::mmu::{PrivilegeMode, TLB_ENTRIES};

bitflags! {
    /// Status register (SR) bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct StatusFlags: u32 {
        /// Interrupt enable (current)
        const IEC = 1 << 0;
        /// User mode (current)
        const KUC = 1 << 1;
        const IEP = 1 << 2;
        const KUP = 1 << 3;
        const IEO = 1 << 4;
        const KUO = 1 << 5;
        /// Software interrupt masks
        const IM_SW0 = 1 << 8;
        const IM_SW1 = 1 << 9;
        /// Hardware interrupt mask (interrupt controller line)
        const IM_HW = 1 << 10;
        /// Boot exception vectors
        const BEV = 1 << 22;
        const CU0 = 1 << 28;
        const CU1 = 1 << 29;
    }
}

/// Coprocessor 0 (System Control)
///
/// Holds exception state, the status register and the TLB staging
/// registers (Index, Random, EntryHi, EntryLo) used by the TLB instructions.
#[derive(Debug, Clone)]
pub(super) struct COP0 {
    pub(super) regs: [u32; 32],
}

impl COP0 {
    pub const INDEX: usize = 0;
    pub const RANDOM: usize = 1;
    pub const ENTRY_LO: usize = 2;
    pub const CONTEXT: usize = 4;
    /// Bad Virtual Address
    pub const BADA: usize = 8;
    pub const ENTRY_HI: usize = 10;
    /// Status Register
    pub const SR: usize = 12;
    pub const CAUSE: usize = 13;
    /// Exception PC
    pub const EPC: usize = 14;
    /// Processor ID
    pub const PRID: usize = 15;

    /// Power-on status: kernel mode, interrupts off, boot vectors
    pub const RESET_SR: u32 = StatusFlags::BEV.bits() | StatusFlags::CU0.bits();

    /// Lowest index TLBWR may pick; entries below are "wired"
    pub const RANDOM_FLOOR: u32 = 8;

    pub(super) fn new() -> Self {
        let mut cop0 = Self { regs: [0u32; 32] };
        cop0.reset();
        cop0
    }

    pub(super) fn reset(&mut self) {
        self.regs = [0u32; 32];
        self.regs[Self::SR] = Self::RESET_SR;
        self.regs[Self::PRID] = 0x0000_0002;
        self.regs[Self::RANDOM] = (TLB_ENTRIES as u32 - 1) << 8;
    }

    pub(super) fn read(&self, reg: u8) -> u32 {
        self.regs[(reg & 0x1F) as usize]
    }

    /// MTC0 write; read-only fields keep their value
    pub(super) fn write(&mut self, reg: u8, value: u32) {
        let reg = (reg & 0x1F) as usize;
        let writable = match reg {
            Self::INDEX => 0x0000_3F00,
            Self::ENTRY_LO => 0xFFFF_FF80,
            Self::CONTEXT => 0xFFE0_0000,
            Self::ENTRY_HI => 0xFFFF_FFC0,
            Self::SR => 0xF04F_FF3F,
            // Software interrupt pending bits
            Self::CAUSE => 0x0000_0300,
            Self::RANDOM | Self::BADA | Self::EPC | Self::PRID => 0,
            _ => 0xFFFF_FFFF,
        };
        self.regs[reg] = (self.regs[reg] & !writable) | (value & writable);
    }

    #[inline(always)]
    pub(super) fn status(&self) -> StatusFlags {
        StatusFlags::from_bits_retain(self.regs[Self::SR])
    }

    #[inline(always)]
    pub(super) fn mode(&self) -> PrivilegeMode {
        if self.status().contains(StatusFlags::KUC) {
            PrivilegeMode::User
        } else {
            PrivilegeMode::Kernel
        }
    }

    pub(super) fn random_index(&self) -> usize {
        ((self.regs[Self::RANDOM] >> 8) & 0x3F) as usize
    }

    /// Step Random after a TLBWR, wrapping from the floor back to the top
    pub(super) fn step_random(&mut self) {
        let current = self.random_index() as u32;
        let next = if current <= Self::RANDOM_FLOOR {
            TLB_ENTRIES as u32 - 1
        } else {
            current - 1
        };
        self.regs[Self::RANDOM] = next << 8;
    }

    /// Mirror the interrupt controller output into Cause.IP2
    #[inline(always)]
    pub(super) fn set_hw_interrupt(&mut self, pending: bool) {
        if pending {
            self.regs[Self::CAUSE] |= StatusFlags::IM_HW.bits();
        } else {
            self.regs[Self::CAUSE] &= !StatusFlags::IM_HW.bits();
        }
    }

    /// Whether an enabled interrupt is pending
    #[inline(always)]
    pub(super) fn interrupt_requested(&self) -> bool {
        let sr = self.regs[Self::SR];
        let pending = self.regs[Self::CAUSE] & sr & 0x0000_0700;
        sr & StatusFlags::IEC.bits() != 0 && pending != 0
    }

    /// Record exception entry: push the mode stack and fill Cause/EPC
    pub(super) fn enter_exception(
        &mut self,
        cause: ExceptionCause,
        epc: u32,
        in_delay_slot: bool,
        coprocessor: u8,
    ) {
        let sr = self.regs[Self::SR];
        self.regs[Self::SR] = (sr & !0x3F) | ((sr << 2) & 0x3C);

        let mut value = self.regs[Self::CAUSE] & 0x0000_0700;
        value |= (cause as u32) << 2;
        value |= ((coprocessor & 3) as u32) << 28;
        if in_delay_slot {
            value |= 1 << 31;
        }
        self.regs[Self::CAUSE] = value;
        self.regs[Self::EPC] = epc;
    }

    /// Record the faulting address of a TLB exception
    pub(super) fn set_tlb_fault(&mut self, vaddr: u32) {
        let vpn = vaddr & 0xFFFF_F000;
        let bad_vpn = (vpn >> 10) & 0x001F_FFFC;
        self.regs[Self::CONTEXT] = (self.regs[Self::CONTEXT] & 0xFFE0_0000) | bad_vpn;
        self.regs[Self::ENTRY_HI] = (self.regs[Self::ENTRY_HI] & 0x0000_0FC0) | vpn;
    }

    /// RFE: pop the mode stack
    pub(super) fn return_from_exception(&mut self) {
        let sr = self.regs[Self::SR];
        self.regs[Self::SR] = (sr & !0xF) | ((sr >> 2) & 0xF);
    }
}

/// Exception cause codes (Cause.ExcCode)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ExceptionCause {
    Interrupt = 0,
    /// Store to a page without the dirty bit
    TlbModified = 1,
    TlbLoad = 2,
    TlbStore = 3,
    AddressErrorLoad = 4,
    AddressErrorStore = 5,
    BusErrorInstruction = 6,
    BusErrorData = 7,
    Syscall = 8,
    Breakpoint = 9,
    ReservedInstruction = 10,
    CoprocessorUnusable = 11,
    Overflow = 12,
}
