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

//! Coprocessor 1 (single-precision floating point)
//!
//! Values live in the register file as raw IEEE-754 bits so that MTC1/MFC1
//! and LWC1/SWC1 move them untouched. Arithmetic is done in host `f32`, which
//! gives the same results on every host since no fused or extended precision
//! operations are used.

use super::decode::FpuOp;

/// Implementation/revision register (FCR0)
pub const FCR0_VALUE: u32 = 0x0000_0300;

/// Compare condition bit in FCR31
const CONDITION_BIT: u32 = 1 << 23;

/// Writable FCR31 bits: rounding mode, flags, enables, condition
const FCR31_MASK: u32 = 0x0183_FFFF;

/// Result of CVT.W.S for NaN or out-of-range inputs
const INVALID_WORD: u32 = 0x7FFF_FFFF;

#[derive(Debug, Clone)]
pub(super) struct Fpu {
    pub(super) regs: [u32; 32],
    pub(super) fcr31: u32,
}

impl Fpu {
    pub(super) fn new() -> Self {
        Self {
            regs: [0; 32],
            fcr31: 0,
        }
    }

    pub(super) fn reset(&mut self) {
        *self = Self::new();
    }

    #[inline(always)]
    pub(super) fn raw(&self, index: u8) -> u32 {
        self.regs[(index & 0x1F) as usize]
    }

    #[inline(always)]
    pub(super) fn set_raw(&mut self, index: u8, value: u32) {
        self.regs[(index & 0x1F) as usize] = value;
    }

    fn single(&self, index: u8) -> f32 {
        f32::from_bits(self.raw(index))
    }

    pub(super) fn condition(&self) -> bool {
        self.fcr31 & CONDITION_BIT != 0
    }

    fn set_condition(&mut self, value: bool) {
        if value {
            self.fcr31 |= CONDITION_BIT;
        } else {
            self.fcr31 &= !CONDITION_BIT;
        }
    }

    /// CFC1
    pub(super) fn read_control(&self, reg: u8) -> u32 {
        match reg {
            0 => FCR0_VALUE,
            31 => self.fcr31,
            _ => 0,
        }
    }

    /// CTC1; only FCR31 is writable
    pub(super) fn write_control(&mut self, reg: u8, value: u32) {
        if reg == 31 {
            self.fcr31 = value & FCR31_MASK;
        }
    }

    pub(super) fn execute(&mut self, op: FpuOp, fd: u8, fs: u8, ft: u8) {
        let a = self.single(fs);
        let b = self.single(ft);
        let result = match op {
            FpuOp::Add => (a + b).to_bits(),
            FpuOp::Sub => (a - b).to_bits(),
            FpuOp::Mul => (a * b).to_bits(),
            FpuOp::Div => (a / b).to_bits(),
            FpuOp::Sqrt => a.sqrt().to_bits(),
            FpuOp::Abs => a.abs().to_bits(),
            // Moves and negation work on the bits, NaN payloads included
            FpuOp::Mov => self.raw(fs),
            FpuOp::Neg => self.raw(fs) ^ 0x8000_0000,
            FpuOp::CvtWS => convert_to_word(a, self.fcr31 & 3),
            FpuOp::CvtSW => (self.raw(fs) as i32 as f32).to_bits(),
        };
        self.set_raw(fd, result);
    }

    /// C.cond.S: bit 0 of `cond` selects unordered, bit 1 equal, bit 2 less
    pub(super) fn compare(&mut self, cond: u8, fs: u8, ft: u8) {
        let a = self.single(fs);
        let b = self.single(ft);
        let result = if a.is_nan() || b.is_nan() {
            cond & 1 != 0
        } else {
            (cond & 2 != 0 && a == b) || (cond & 4 != 0 && a < b)
        };
        self.set_condition(result);
    }
}

/// Round a float to a 32-bit integer using an FCR31 rounding mode
///
/// Mode 0 rounds to nearest even, 1 towards zero, 2 up and 3 down.
pub(super) fn convert_to_word(value: f32, mode: u32) -> u32 {
    let rounded = match mode & 3 {
        0 => value.round_ties_even(),
        1 => value.trunc(),
        2 => value.ceil(),
        _ => value.floor(),
    };
    if rounded.is_nan() || rounded >= 2_147_483_648.0 || rounded < -2_147_483_648.0 {
        INVALID_WORD
    } else {
        rounded as i32 as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fpu_with(values: &[(u8, f32)]) -> Fpu {
        let mut fpu = Fpu::new();
        for &(index, value) in values {
            fpu.set_raw(index, value.to_bits());
        }
        fpu
    }

    #[test]
    fn test_arithmetic() {
        let mut fpu = fpu_with(&[(1, 1.5), (2, 2.25)]);
        fpu.execute(FpuOp::Add, 3, 1, 2);
        assert_eq!(f32::from_bits(fpu.raw(3)), 3.75);
        fpu.execute(FpuOp::Mul, 4, 1, 2);
        assert_eq!(f32::from_bits(fpu.raw(4)), 3.375);
        fpu.execute(FpuOp::Neg, 5, 1, 0);
        assert_eq!(f32::from_bits(fpu.raw(5)), -1.5);
    }

    #[test]
    fn test_rounding_modes() {
        assert_eq!(convert_to_word(2.5, 0), 2);
        assert_eq!(convert_to_word(3.5, 0), 4);
        assert_eq!(convert_to_word(-2.7, 1), (-2i32) as u32);
        assert_eq!(convert_to_word(2.1, 2), 3);
        assert_eq!(convert_to_word(-2.1, 3), (-3i32) as u32);
    }

    #[test]
    fn test_invalid_conversion() {
        assert_eq!(convert_to_word(f32::NAN, 0), INVALID_WORD);
        assert_eq!(convert_to_word(3.0e9, 1), INVALID_WORD);
    }

    #[test]
    fn test_compare_sets_condition() {
        let mut fpu = fpu_with(&[(1, 1.0), (2, 2.0)]);
        // c.lt.s
        fpu.compare(0b100, 1, 2);
        assert!(fpu.condition());
        // c.eq.s
        fpu.compare(0b010, 1, 2);
        assert!(!fpu.condition());

        fpu.set_raw(3, f32::NAN.to_bits());
        // c.un.s
        fpu.compare(0b001, 1, 3);
        assert!(fpu.condition());
    }

    #[test]
    fn test_control_registers() {
        let mut fpu = Fpu::new();
        assert_eq!(fpu.read_control(0), FCR0_VALUE);
        fpu.write_control(31, 0xFFFF_FFFF);
        assert_eq!(fpu.read_control(31), FCR31_MASK);
        fpu.write_control(0, 0x1234);
        assert_eq!(fpu.read_control(0), FCR0_VALUE);
    }
}
