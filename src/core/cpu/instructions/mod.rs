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

//! CPU instruction implementations
//!
//! Organized by instruction type. Every handler works on an already decoded
//! [`Op`] and reports guest faults by raising exceptions, never by returning
//! errors: from the host's point of view a faulting instruction still
//! completes.

use super::decode::{AluOp, ImmOp, Op};
use super::{MemoryPort, CPU};
use crate::core::memory::AccessWidth;
use crate::core::mmu::AccessKind;

// Instruction modules organized by type
mod arithmetic;
mod branch;
mod cop0;
mod cop1;
mod exception;
mod jump;
mod load;
mod logical;
mod multiply;
mod shift;
mod store;

impl CPU {
    /// Route a decoded instruction to its handler
    pub(super) fn dispatch(&mut self, op: Op, mem: &mut MemoryPort) {
        match op {
            Op::Alu { op, rd, rs, rt } => match op {
                AluOp::And | AluOp::Or | AluOp::Xor | AluOp::Nor => {
                    self.op_logical(op, rd, rs, rt)
                }
                _ => self.op_arithmetic(op, rd, rs, rt),
            },
            Op::AluImm { op, rt, rs, imm } => match op {
                ImmOp::Andi | ImmOp::Ori | ImmOp::Xori => self.op_logical_imm(op, rt, rs, imm),
                _ => self.op_arithmetic_imm(op, rt, rs, imm),
            },
            Op::Lui { rt, imm } => self.op_lui(rt, imm),
            Op::Shift { op, rd, rt, sa } => self.op_shift(op, rd, rt, sa as u32),
            Op::ShiftVar { op, rd, rt, rs } => {
                let amount = self.reg(rs) & 0x1F;
                self.op_shift(op, rd, rt, amount)
            }
            Op::MulDiv { op, rs, rt } => self.op_muldiv(op, rs, rt),
            Op::HiLo { op, reg } => self.op_hilo(op, reg),
            Op::Branch {
                cond,
                rs,
                rt,
                offset,
            } => self.op_branch(cond, rs, rt, offset),
            Op::Jump { target, link } => self.op_jump(target, link),
            Op::JumpReg { rs, rd, link } => self.op_jump_reg(rs, rd, link),
            Op::Load {
                op,
                rt,
                base,
                offset,
            } => self.op_load(op, rt, base, offset, mem),
            Op::Store {
                op,
                rt,
                base,
                offset,
            } => self.op_store(op, rt, base, offset, mem),
            Op::Syscall => self.op_syscall(),
            Op::Break => self.op_break(),
            Op::Mfc0 { rt, rd } => self.op_mfc0(rt, rd),
            Op::Mtc0 { rt, rd } => self.op_mtc0(rt, rd, mem),
            Op::Rfe => self.op_rfe(),
            Op::Tlbr => self.op_tlbr(mem),
            Op::Tlbwi => self.op_tlbwi(mem),
            Op::Tlbwr => self.op_tlbwr(mem),
            Op::Tlbp => self.op_tlbp(mem),
            Op::Mfc1 { rt, fs } => self.op_mfc1(rt, fs),
            Op::Mtc1 { rt, fs } => self.op_mtc1(rt, fs),
            Op::Cfc1 { rt, fs } => self.op_cfc1(rt, fs),
            Op::Ctc1 { rt, fs } => self.op_ctc1(rt, fs),
            Op::Lwc1 { ft, base, offset } => self.op_lwc1(ft, base, offset, mem),
            Op::Swc1 { ft, base, offset } => self.op_swc1(ft, base, offset, mem),
            Op::Bc1 { on_true, offset } => self.op_bc1(on_true, offset),
            Op::Fpu { op, fd, fs, ft } => self.op_fpu(op, fd, fs, ft),
            Op::FpuCompare { cond, fs, ft } => self.op_fpu_compare(cond, fs, ft),
            Op::CopUnusable { cop } => self.op_cop_unusable(cop),
            Op::Reserved { word } => self.op_reserved(word),
        }
    }

    /// Effective address of a base+offset access
    #[inline(always)]
    fn effective_address(&self, base: u8, offset: i16) -> u32 {
        self.reg(base).wrapping_add(offset as i32 as u32)
    }

    /// Translate and read; raises the fault exception on failure
    fn read_data(&mut self, mem: &mut MemoryPort, vaddr: u32, width: AccessWidth) -> Option<u32> {
        match mem
            .mmu
            .translate_access(vaddr, width.bytes(), AccessKind::Read, self.cop0.mode())
        {
            Ok(paddr) => Some(mem.bus.read(paddr, width) as u32),
            Err(fault) => {
                self.raise_fault(fault);
                None
            }
        }
    }

    /// Translate for a store; raises the fault exception on failure
    fn translate_store(&mut self, mem: &mut MemoryPort, vaddr: u32, width: AccessWidth) -> Option<u32> {
        match mem
            .mmu
            .translate_access(vaddr, width.bytes(), AccessKind::Write, self.cop0.mode())
        {
            Ok(paddr) => Some(paddr),
            Err(fault) => {
                self.raise_fault(fault);
                None
            }
        }
    }
}
