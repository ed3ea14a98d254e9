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

//! COP0 (System Control Coprocessor) instructions

use super::super::{MemoryPort, CPU, COP0};
use crate::core::mmu::{TlbEntry, TLB_ENTRIES};

impl CPU {
    /// MFC0: Move From Coprocessor 0
    ///
    /// Format: mfc0 rt, rd
    ///
    /// Goes through the load delay slot like a memory load.
    pub(super) fn op_mfc0(&mut self, rt: u8, rd: u8) {
        if !self.require_cop0() {
            return;
        }
        let value = self.cop0.read(rd);
        self.set_reg_delayed(rt, value);
    }

    /// MTC0: Move To Coprocessor 0
    ///
    /// Format: mtc0 rt, rd
    ///
    /// Writing EntryHi also switches the MMU to the new ASID.
    pub(super) fn op_mtc0(&mut self, rt: u8, rd: u8, mem: &mut MemoryPort) {
        if !self.require_cop0() {
            return;
        }
        let value = self.reg(rt);
        self.cop0.write(rd, value);
        if rd as usize == COP0::ENTRY_HI {
            mem.mmu.set_asid(entry_hi_asid(self.cop0.regs[COP0::ENTRY_HI]));
        }
    }

    /// RFE: Return From Exception
    ///
    /// Pops the interrupt-enable/mode stack in SR. The jump back to EPC is a
    /// separate JR, normally with RFE in its delay slot.
    pub(super) fn op_rfe(&mut self) {
        if !self.require_cop0() {
            return;
        }
        self.cop0.return_from_exception();
    }

    /// TLBR: read the entry selected by Index into EntryHi/EntryLo
    pub(super) fn op_tlbr(&mut self, mem: &mut MemoryPort) {
        if !self.require_cop0() {
            return;
        }
        let index = self.tlb_index();
        let entry = mem.mmu.read_entry(index);
        self.cop0.regs[COP0::ENTRY_HI] = entry.hi;
        self.cop0.regs[COP0::ENTRY_LO] = entry.lo;
        mem.mmu.set_asid(entry_hi_asid(entry.hi));
    }

    /// TLBWI: write EntryHi/EntryLo to the entry selected by Index
    pub(super) fn op_tlbwi(&mut self, mem: &mut MemoryPort) {
        if !self.require_cop0() {
            return;
        }
        let index = self.tlb_index();
        mem.mmu.write_entry(index, self.staged_entry());
    }

    /// TLBWR: write EntryHi/EntryLo to the entry selected by Random
    ///
    /// Random steps down once per TLBWR so replacement stays deterministic.
    pub(super) fn op_tlbwr(&mut self, mem: &mut MemoryPort) {
        if !self.require_cop0() {
            return;
        }
        let index = self.cop0.random_index();
        mem.mmu.write_entry(index, self.staged_entry());
        self.cop0.step_random();
    }

    /// TLBP: search for EntryHi; Index gets the match or the probe-failure bit
    pub(super) fn op_tlbp(&mut self, mem: &mut MemoryPort) {
        if !self.require_cop0() {
            return;
        }
        self.cop0.regs[COP0::INDEX] = match mem.mmu.probe(self.cop0.regs[COP0::ENTRY_HI]) {
            Some(index) => (index as u32) << 8,
            None => 0x8000_0000,
        };
    }

    fn tlb_index(&self) -> usize {
        ((self.cop0.regs[COP0::INDEX] >> 8) as usize) % TLB_ENTRIES
    }

    fn staged_entry(&self) -> TlbEntry {
        TlbEntry::new(
            self.cop0.regs[COP0::ENTRY_HI],
            self.cop0.regs[COP0::ENTRY_LO],
        )
    }
}

fn entry_hi_asid(entry_hi: u32) -> u8 {
    ((entry_hi >> 6) & 0x3F) as u8
}
