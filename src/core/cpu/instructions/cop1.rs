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

//! COP1 (floating point) instructions

use super::super::decode::FpuOp;
use super::super::{MemoryPort, CPU};
use crate::core::memory::AccessWidth;

impl CPU {
    /// MFC1: move raw FPU register bits to rt (load-delayed)
    pub(super) fn op_mfc1(&mut self, rt: u8, fs: u8) {
        if !self.require_cop1() {
            return;
        }
        let value = self.fpu.raw(fs);
        self.set_reg_delayed(rt, value);
    }

    pub(super) fn op_mtc1(&mut self, rt: u8, fs: u8) {
        if !self.require_cop1() {
            return;
        }
        let value = self.reg(rt);
        self.fpu.set_raw(fs, value);
    }

    /// CFC1: read an FPU control register (load-delayed)
    pub(super) fn op_cfc1(&mut self, rt: u8, fs: u8) {
        if !self.require_cop1() {
            return;
        }
        let value = self.fpu.read_control(fs);
        self.set_reg_delayed(rt, value);
    }

    pub(super) fn op_ctc1(&mut self, rt: u8, fs: u8) {
        if !self.require_cop1() {
            return;
        }
        let value = self.reg(rt);
        self.fpu.write_control(fs, value);
    }

    /// LWC1: load a word straight into an FPU register
    pub(super) fn op_lwc1(&mut self, ft: u8, base: u8, offset: i16, mem: &mut MemoryPort) {
        if !self.require_cop1() {
            return;
        }
        let vaddr = self.effective_address(base, offset);
        if let Some(value) = self.read_data(mem, vaddr, AccessWidth::Word) {
            self.fpu.set_raw(ft, value);
        }
    }

    pub(super) fn op_swc1(&mut self, ft: u8, base: u8, offset: i16, mem: &mut MemoryPort) {
        if !self.require_cop1() {
            return;
        }
        let vaddr = self.effective_address(base, offset);
        let value = self.fpu.raw(ft);
        self.store(mem, vaddr, AccessWidth::Word, value);
    }

    pub(super) fn op_fpu(&mut self, op: FpuOp, fd: u8, fs: u8, ft: u8) {
        if !self.require_cop1() {
            return;
        }
        self.fpu.execute(op, fd, fs, ft);
    }

    pub(super) fn op_fpu_compare(&mut self, cond: u8, fs: u8, ft: u8) {
        if !self.require_cop1() {
            return;
        }
        self.fpu.compare(cond, fs, ft);
    }
}
