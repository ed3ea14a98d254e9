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

//! Exception-triggering instructions

use super::super::{ExceptionCause, StatusFlags, CPU};
use crate::core::mmu::PrivilegeMode;

impl CPU {
    /// SYSCALL: System Call
    pub(super) fn op_syscall(&mut self) {
        self.exception(ExceptionCause::Syscall);
    }

    /// BREAK: Breakpoint
    pub(super) fn op_break(&mut self) {
        self.exception(ExceptionCause::Breakpoint);
    }

    /// Undefined encodings raise Reserved Instruction
    pub(super) fn op_reserved(&mut self, word: u32) {
        log::debug!(
            "Reserved instruction 0x{:08X} at PC=0x{:08X}",
            word,
            self.current_pc
        );
        self.exception(ExceptionCause::ReservedInstruction);
    }

    /// COP2/COP3 are not fitted and always raise Coprocessor Unusable
    pub(super) fn op_cop_unusable(&mut self, cop: u8) {
        self.exception_with_cop(ExceptionCause::CoprocessorUnusable, cop);
    }

    /// COP0 is always usable in kernel mode, in user mode only with CU0
    pub(super) fn require_cop0(&mut self) -> bool {
        if self.cop0.mode() == PrivilegeMode::Kernel
            || self.cop0.status().contains(StatusFlags::CU0)
        {
            true
        } else {
            self.exception_with_cop(ExceptionCause::CoprocessorUnusable, 0);
            false
        }
    }

    pub(super) fn require_cop1(&mut self) -> bool {
        if self.cop0.status().contains(StatusFlags::CU1) {
            true
        } else {
            self.exception_with_cop(ExceptionCause::CoprocessorUnusable, 1);
            false
        }
    }
}
