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

//! Instruction encoders
//!
//! Small helpers that build instruction words, used to assemble guest
//! programs in tests, benchmarks and the demo program of the command line
//! front-end. Register operands are plain numbers (0-31).
//!
//! # Example
//!
//! ```
//! use vmcore::core::cpu::encode;
//! use vmcore::core::cpu::{decode, ImmOp, Op};
//!
//! let word = encode::addiu(2, 0, 7);
//! assert_eq!(decode(word), Op::AluImm { op: ImmOp::Addiu, rt: 2, rs: 0, imm: 7 });
//! ```

fn r_type(rs: u8, rt: u8, rd: u8, sa: u8, funct: u32) -> u32 {
    ((rs as u32 & 0x1F) << 21)
        | ((rt as u32 & 0x1F) << 16)
        | ((rd as u32 & 0x1F) << 11)
        | ((sa as u32 & 0x1F) << 6)
        | (funct & 0x3F)
}

fn i_type(opcode: u32, rs: u8, rt: u8, imm: u16) -> u32 {
    (opcode << 26) | ((rs as u32 & 0x1F) << 21) | ((rt as u32 & 0x1F) << 16) | imm as u32
}

fn cop_type(cop: u32, fmt: u32, rt: u8, rd: u8, sa: u8, funct: u32) -> u32 {
    ((0x10 | cop) << 26) | (fmt << 21) | r_type(0, rt, rd, sa, funct)
}

pub const NOP: u32 = 0;

// === Special ===

pub fn sll(rd: u8, rt: u8, sa: u8) -> u32 {
    r_type(0, rt, rd, sa, 0x00)
}

pub fn srl(rd: u8, rt: u8, sa: u8) -> u32 {
    r_type(0, rt, rd, sa, 0x02)
}

pub fn sra(rd: u8, rt: u8, sa: u8) -> u32 {
    r_type(0, rt, rd, sa, 0x03)
}

pub fn sllv(rd: u8, rt: u8, rs: u8) -> u32 {
    r_type(rs, rt, rd, 0, 0x04)
}

pub fn srlv(rd: u8, rt: u8, rs: u8) -> u32 {
    r_type(rs, rt, rd, 0, 0x06)
}

pub fn srav(rd: u8, rt: u8, rs: u8) -> u32 {
    r_type(rs, rt, rd, 0, 0x07)
}

pub fn jr(rs: u8) -> u32 {
    r_type(rs, 0, 0, 0, 0x08)
}

pub fn jalr(rd: u8, rs: u8) -> u32 {
    r_type(rs, 0, rd, 0, 0x09)
}

pub fn syscall() -> u32 {
    0x0000_000C
}

pub fn brk() -> u32 {
    0x0000_000D
}

pub fn mfhi(rd: u8) -> u32 {
    r_type(0, 0, rd, 0, 0x10)
}

pub fn mthi(rs: u8) -> u32 {
    r_type(rs, 0, 0, 0, 0x11)
}

pub fn mflo(rd: u8) -> u32 {
    r_type(0, 0, rd, 0, 0x12)
}

pub fn mtlo(rs: u8) -> u32 {
    r_type(rs, 0, 0, 0, 0x13)
}

pub fn mult(rs: u8, rt: u8) -> u32 {
    r_type(rs, rt, 0, 0, 0x18)
}

pub fn multu(rs: u8, rt: u8) -> u32 {
    r_type(rs, rt, 0, 0, 0x19)
}

pub fn div(rs: u8, rt: u8) -> u32 {
    r_type(rs, rt, 0, 0, 0x1A)
}

pub fn divu(rs: u8, rt: u8) -> u32 {
    r_type(rs, rt, 0, 0, 0x1B)
}

pub fn add(rd: u8, rs: u8, rt: u8) -> u32 {
    r_type(rs, rt, rd, 0, 0x20)
}

pub fn addu(rd: u8, rs: u8, rt: u8) -> u32 {
    r_type(rs, rt, rd, 0, 0x21)
}

pub fn sub(rd: u8, rs: u8, rt: u8) -> u32 {
    r_type(rs, rt, rd, 0, 0x22)
}

pub fn subu(rd: u8, rs: u8, rt: u8) -> u32 {
    r_type(rs, rt, rd, 0, 0x23)
}

pub fn and(rd: u8, rs: u8, rt: u8) -> u32 {
    r_type(rs, rt, rd, 0, 0x24)
}

pub fn or(rd: u8, rs: u8, rt: u8) -> u32 {
    r_type(rs, rt, rd, 0, 0x25)
}

pub fn xor(rd: u8, rs: u8, rt: u8) -> u32 {
    r_type(rs, rt, rd, 0, 0x26)
}

pub fn nor(rd: u8, rs: u8, rt: u8) -> u32 {
    r_type(rs, rt, rd, 0, 0x27)
}

pub fn slt(rd: u8, rs: u8, rt: u8) -> u32 {
    r_type(rs, rt, rd, 0, 0x2A)
}

pub fn sltu(rd: u8, rs: u8, rt: u8) -> u32 {
    r_type(rs, rt, rd, 0, 0x2B)
}

// === Branches and jumps ===

pub fn bltz(rs: u8, offset: i16) -> u32 {
    i_type(0x01, rs, 0x00, offset as u16)
}

pub fn bgez(rs: u8, offset: i16) -> u32 {
    i_type(0x01, rs, 0x01, offset as u16)
}

pub fn bltzal(rs: u8, offset: i16) -> u32 {
    i_type(0x01, rs, 0x10, offset as u16)
}

pub fn bgezal(rs: u8, offset: i16) -> u32 {
    i_type(0x01, rs, 0x11, offset as u16)
}

/// J to an absolute address in the same 256 MiB segment
pub fn j(address: u32) -> u32 {
    (0x02 << 26) | ((address >> 2) & 0x03FF_FFFF)
}

pub fn jal(address: u32) -> u32 {
    (0x03 << 26) | ((address >> 2) & 0x03FF_FFFF)
}

pub fn beq(rs: u8, rt: u8, offset: i16) -> u32 {
    i_type(0x04, rs, rt, offset as u16)
}

pub fn bne(rs: u8, rt: u8, offset: i16) -> u32 {
    i_type(0x05, rs, rt, offset as u16)
}

pub fn blez(rs: u8, offset: i16) -> u32 {
    i_type(0x06, rs, 0, offset as u16)
}

pub fn bgtz(rs: u8, offset: i16) -> u32 {
    i_type(0x07, rs, 0, offset as u16)
}

// === Immediate ===

pub fn addi(rt: u8, rs: u8, imm: i16) -> u32 {
    i_type(0x08, rs, rt, imm as u16)
}

pub fn addiu(rt: u8, rs: u8, imm: i16) -> u32 {
    i_type(0x09, rs, rt, imm as u16)
}

pub fn slti(rt: u8, rs: u8, imm: i16) -> u32 {
    i_type(0x0A, rs, rt, imm as u16)
}

pub fn sltiu(rt: u8, rs: u8, imm: i16) -> u32 {
    i_type(0x0B, rs, rt, imm as u16)
}

pub fn andi(rt: u8, rs: u8, imm: u16) -> u32 {
    i_type(0x0C, rs, rt, imm)
}

pub fn ori(rt: u8, rs: u8, imm: u16) -> u32 {
    i_type(0x0D, rs, rt, imm)
}

pub fn xori(rt: u8, rs: u8, imm: u16) -> u32 {
    i_type(0x0E, rs, rt, imm)
}

pub fn lui(rt: u8, imm: u16) -> u32 {
    i_type(0x0F, 0, rt, imm)
}

/// Load a 32-bit constant (LUI + ORI)
pub fn li(rt: u8, value: u32) -> [u32; 2] {
    [lui(rt, (value >> 16) as u16), ori(rt, rt, value as u16)]
}

// === Loads and stores ===

pub fn lb(rt: u8, base: u8, offset: i16) -> u32 {
    i_type(0x20, base, rt, offset as u16)
}

pub fn lh(rt: u8, base: u8, offset: i16) -> u32 {
    i_type(0x21, base, rt, offset as u16)
}

pub fn lwl(rt: u8, base: u8, offset: i16) -> u32 {
    i_type(0x22, base, rt, offset as u16)
}

pub fn lw(rt: u8, base: u8, offset: i16) -> u32 {
    i_type(0x23, base, rt, offset as u16)
}

pub fn lbu(rt: u8, base: u8, offset: i16) -> u32 {
    i_type(0x24, base, rt, offset as u16)
}

pub fn lhu(rt: u8, base: u8, offset: i16) -> u32 {
    i_type(0x25, base, rt, offset as u16)
}

pub fn lwr(rt: u8, base: u8, offset: i16) -> u32 {
    i_type(0x26, base, rt, offset as u16)
}

pub fn sb(rt: u8, base: u8, offset: i16) -> u32 {
    i_type(0x28, base, rt, offset as u16)
}

pub fn sh(rt: u8, base: u8, offset: i16) -> u32 {
    i_type(0x29, base, rt, offset as u16)
}

pub fn swl(rt: u8, base: u8, offset: i16) -> u32 {
    i_type(0x2A, base, rt, offset as u16)
}

pub fn sw(rt: u8, base: u8, offset: i16) -> u32 {
    i_type(0x2B, base, rt, offset as u16)
}

pub fn swr(rt: u8, base: u8, offset: i16) -> u32 {
    i_type(0x2E, base, rt, offset as u16)
}

pub fn lwc1(ft: u8, base: u8, offset: i16) -> u32 {
    i_type(0x31, base, ft, offset as u16)
}

pub fn swc1(ft: u8, base: u8, offset: i16) -> u32 {
    i_type(0x39, base, ft, offset as u16)
}

// === COP0 ===

pub fn mfc0(rt: u8, rd: u8) -> u32 {
    cop_type(0, 0x00, rt, rd, 0, 0)
}

pub fn mtc0(rt: u8, rd: u8) -> u32 {
    cop_type(0, 0x04, rt, rd, 0, 0)
}

pub fn tlbr() -> u32 {
    cop_type(0, 0x10, 0, 0, 0, 0x01)
}

pub fn tlbwi() -> u32 {
    cop_type(0, 0x10, 0, 0, 0, 0x02)
}

pub fn tlbwr() -> u32 {
    cop_type(0, 0x10, 0, 0, 0, 0x06)
}

pub fn tlbp() -> u32 {
    cop_type(0, 0x10, 0, 0, 0, 0x08)
}

pub fn rfe() -> u32 {
    cop_type(0, 0x10, 0, 0, 0, 0x10)
}

// === COP1 ===

pub fn mfc1(rt: u8, fs: u8) -> u32 {
    cop_type(1, 0x00, rt, fs, 0, 0)
}

pub fn cfc1(rt: u8, fs: u8) -> u32 {
    cop_type(1, 0x02, rt, fs, 0, 0)
}

pub fn mtc1(rt: u8, fs: u8) -> u32 {
    cop_type(1, 0x04, rt, fs, 0, 0)
}

pub fn ctc1(rt: u8, fs: u8) -> u32 {
    cop_type(1, 0x06, rt, fs, 0, 0)
}

pub fn bc1f(offset: i16) -> u32 {
    (0x11 << 26) | (0x08 << 21) | offset as u16 as u32
}

pub fn bc1t(offset: i16) -> u32 {
    (0x11 << 26) | (0x08 << 21) | (1 << 16) | offset as u16 as u32
}

fn fpu_s(fd: u8, fs: u8, ft: u8, funct: u32) -> u32 {
    cop_type(1, 0x10, ft, fs, fd, funct)
}

pub fn add_s(fd: u8, fs: u8, ft: u8) -> u32 {
    fpu_s(fd, fs, ft, 0x00)
}

pub fn sub_s(fd: u8, fs: u8, ft: u8) -> u32 {
    fpu_s(fd, fs, ft, 0x01)
}

pub fn mul_s(fd: u8, fs: u8, ft: u8) -> u32 {
    fpu_s(fd, fs, ft, 0x02)
}

pub fn div_s(fd: u8, fs: u8, ft: u8) -> u32 {
    fpu_s(fd, fs, ft, 0x03)
}

pub fn sqrt_s(fd: u8, fs: u8) -> u32 {
    fpu_s(fd, fs, 0, 0x04)
}

pub fn abs_s(fd: u8, fs: u8) -> u32 {
    fpu_s(fd, fs, 0, 0x05)
}

pub fn mov_s(fd: u8, fs: u8) -> u32 {
    fpu_s(fd, fs, 0, 0x06)
}

pub fn neg_s(fd: u8, fs: u8) -> u32 {
    fpu_s(fd, fs, 0, 0x07)
}

pub fn cvt_w_s(fd: u8, fs: u8) -> u32 {
    fpu_s(fd, fs, 0, 0x24)
}

pub fn cvt_s_w(fd: u8, fs: u8) -> u32 {
    cop_type(1, 0x14, 0, fs, fd, 0x20)
}

/// C.cond.S with the raw condition field (0-15)
pub fn c_s(cond: u8, fs: u8, ft: u8) -> u32 {
    fpu_s(0, fs, ft, 0x30 | (cond as u32 & 0xF))
}

pub fn c_eq_s(fs: u8, ft: u8) -> u32 {
    c_s(0x2, fs, ft)
}

pub fn c_lt_s(fs: u8, ft: u8) -> u32 {
    c_s(0xC, fs, ft)
}

pub fn c_le_s(fs: u8, ft: u8) -> u32 {
    c_s(0xE, fs, ft)
}
