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

//! Instruction decoding
//!
//! [`decode`] turns a 32-bit instruction word into an [`Op`] with its operand
//! fields already extracted. The interpreter decodes every instruction as it
//! is fetched; the recompiler decodes a block once, compiles what it can to
//! host code and keeps the `Op`s for everything else.

use std::fmt;

/// Register-register ALU operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AluOp {
    Add,
    Addu,
    Sub,
    Subu,
    And,
    Or,
    Xor,
    Nor,
    Slt,
    Sltu,
}

/// Register-immediate ALU operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImmOp {
    Addi,
    Addiu,
    Slti,
    Sltiu,
    Andi,
    Ori,
    Xori,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShiftOp {
    Sll,
    Srl,
    Sra,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MulDivOp {
    Mult,
    Multu,
    Div,
    Divu,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HiLoOp {
    Mfhi,
    Mthi,
    Mflo,
    Mtlo,
}

/// Conditional branch kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BranchCond {
    Eq,
    Ne,
    Lez,
    Gtz,
    Ltz,
    Gez,
    /// BLTZAL: link unconditionally, branch if negative
    Ltzal,
    /// BGEZAL: link unconditionally, branch if non-negative
    Gezal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadOp {
    Lb,
    Lbu,
    Lh,
    Lhu,
    Lw,
    Lwl,
    Lwr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Sb,
    Sh,
    Sw,
    Swl,
    Swr,
}

/// Single-precision FPU operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FpuOp {
    Add,
    Sub,
    Mul,
    Div,
    Sqrt,
    Abs,
    Mov,
    Neg,
    /// CVT.W.S: float to word using the current rounding mode
    CvtWS,
    /// CVT.S.W: word to float
    CvtSW,
}

/// A decoded instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Alu { op: AluOp, rd: u8, rs: u8, rt: u8 },
    AluImm { op: ImmOp, rt: u8, rs: u8, imm: u16 },
    Lui { rt: u8, imm: u16 },
    Shift { op: ShiftOp, rd: u8, rt: u8, sa: u8 },
    ShiftVar { op: ShiftOp, rd: u8, rt: u8, rs: u8 },
    MulDiv { op: MulDivOp, rs: u8, rt: u8 },
    HiLo { op: HiLoOp, reg: u8 },
    Branch { cond: BranchCond, rs: u8, rt: u8, offset: i16 },
    Jump { target: u32, link: bool },
    JumpReg { rs: u8, rd: u8, link: bool },
    Load { op: LoadOp, rt: u8, base: u8, offset: i16 },
    Store { op: StoreOp, rt: u8, base: u8, offset: i16 },
    Syscall,
    Break,
    Mfc0 { rt: u8, rd: u8 },
    Mtc0 { rt: u8, rd: u8 },
    Rfe,
    Tlbr,
    Tlbwi,
    Tlbwr,
    Tlbp,
    Mfc1 { rt: u8, fs: u8 },
    Mtc1 { rt: u8, fs: u8 },
    Cfc1 { rt: u8, fs: u8 },
    Ctc1 { rt: u8, fs: u8 },
    Lwc1 { ft: u8, base: u8, offset: i16 },
    Swc1 { ft: u8, base: u8, offset: i16 },
    Bc1 { on_true: bool, offset: i16 },
    Fpu { op: FpuOp, fd: u8, fs: u8, ft: u8 },
    /// C.cond.S; `cond` holds the unordered/equal/less select bits
    FpuCompare { cond: u8, fs: u8, ft: u8 },
    /// Access to a coprocessor that is never present
    CopUnusable { cop: u8 },
    Reserved { word: u32 },
}

/// Decode R-type fields
///
/// Format: | op (6) | rs (5) | rt (5) | rd (5) | shamt (5) | funct (6) |
#[inline(always)]
pub(super) fn decode_r_type(instr: u32) -> (u8, u8, u8, u8, u8) {
    let rs = ((instr >> 21) & 0x1F) as u8;
    let rt = ((instr >> 16) & 0x1F) as u8;
    let rd = ((instr >> 11) & 0x1F) as u8;
    let shamt = ((instr >> 6) & 0x1F) as u8;
    let funct = (instr & 0x3F) as u8;
    (rs, rt, rd, shamt, funct)
}

/// Decode I-type fields
///
/// Format: | op (6) | rs (5) | rt (5) | immediate (16) |
#[inline(always)]
pub(super) fn decode_i_type(instr: u32) -> (u8, u8, u16) {
    let rs = ((instr >> 21) & 0x1F) as u8;
    let rt = ((instr >> 16) & 0x1F) as u8;
    let imm = (instr & 0xFFFF) as u16;
    (rs, rt, imm)
}

/// Decode an instruction word
///
/// # Example
///
/// ```
/// use vmcore::core::cpu::{decode, ImmOp, Op};
///
/// // addiu $v0, $zero, 1
/// assert_eq!(
///     decode(0x2402_0001),
///     Op::AluImm { op: ImmOp::Addiu, rt: 2, rs: 0, imm: 1 }
/// );
/// ```
pub fn decode(word: u32) -> Op {
    let opcode = word >> 26;
    let (rs, rt, imm) = decode_i_type(word);
    let offset = imm as i16;

    match opcode {
        0x00 => decode_special(word),
        0x01 => {
            // Bit 0 selects GEZ, link when rt is 0x10/0x11
            let gez = rt & 1 != 0;
            let link = rt & 0x1E == 0x10;
            let cond = match (gez, link) {
                (false, false) => BranchCond::Ltz,
                (true, false) => BranchCond::Gez,
                (false, true) => BranchCond::Ltzal,
                (true, true) => BranchCond::Gezal,
            };
            Op::Branch { cond, rs, rt: 0, offset }
        }
        0x02 => Op::Jump {
            target: word & 0x03FF_FFFF,
            link: false,
        },
        0x03 => Op::Jump {
            target: word & 0x03FF_FFFF,
            link: true,
        },
        0x04 => Op::Branch { cond: BranchCond::Eq, rs, rt, offset },
        0x05 => Op::Branch { cond: BranchCond::Ne, rs, rt, offset },
        0x06 => Op::Branch { cond: BranchCond::Lez, rs, rt: 0, offset },
        0x07 => Op::Branch { cond: BranchCond::Gtz, rs, rt: 0, offset },
        0x08 => Op::AluImm { op: ImmOp::Addi, rt, rs, imm },
        0x09 => Op::AluImm { op: ImmOp::Addiu, rt, rs, imm },
        0x0A => Op::AluImm { op: ImmOp::Slti, rt, rs, imm },
        0x0B => Op::AluImm { op: ImmOp::Sltiu, rt, rs, imm },
        0x0C => Op::AluImm { op: ImmOp::Andi, rt, rs, imm },
        0x0D => Op::AluImm { op: ImmOp::Ori, rt, rs, imm },
        0x0E => Op::AluImm { op: ImmOp::Xori, rt, rs, imm },
        0x0F => Op::Lui { rt, imm },
        0x10 => decode_cop0(word),
        0x11 => decode_cop1(word),
        0x12 => Op::CopUnusable { cop: 2 },
        0x13 => Op::CopUnusable { cop: 3 },
        0x20 => Op::Load { op: LoadOp::Lb, rt, base: rs, offset },
        0x21 => Op::Load { op: LoadOp::Lh, rt, base: rs, offset },
        0x22 => Op::Load { op: LoadOp::Lwl, rt, base: rs, offset },
        0x23 => Op::Load { op: LoadOp::Lw, rt, base: rs, offset },
        0x24 => Op::Load { op: LoadOp::Lbu, rt, base: rs, offset },
        0x25 => Op::Load { op: LoadOp::Lhu, rt, base: rs, offset },
        0x26 => Op::Load { op: LoadOp::Lwr, rt, base: rs, offset },
        0x28 => Op::Store { op: StoreOp::Sb, rt, base: rs, offset },
        0x29 => Op::Store { op: StoreOp::Sh, rt, base: rs, offset },
        0x2A => Op::Store { op: StoreOp::Swl, rt, base: rs, offset },
        0x2B => Op::Store { op: StoreOp::Sw, rt, base: rs, offset },
        0x2E => Op::Store { op: StoreOp::Swr, rt, base: rs, offset },
        0x31 => Op::Lwc1 { ft: rt, base: rs, offset },
        0x39 => Op::Swc1 { ft: rt, base: rs, offset },
        0x32 | 0x3A => Op::CopUnusable { cop: 2 },
        0x33 | 0x3B => Op::CopUnusable { cop: 3 },
        _ => Op::Reserved { word },
    }
}

fn decode_special(word: u32) -> Op {
    let (rs, rt, rd, sa, funct) = decode_r_type(word);
    match funct {
        0x00 => Op::Shift { op: ShiftOp::Sll, rd, rt, sa },
        0x02 => Op::Shift { op: ShiftOp::Srl, rd, rt, sa },
        0x03 => Op::Shift { op: ShiftOp::Sra, rd, rt, sa },
        0x04 => Op::ShiftVar { op: ShiftOp::Sll, rd, rt, rs },
        0x06 => Op::ShiftVar { op: ShiftOp::Srl, rd, rt, rs },
        0x07 => Op::ShiftVar { op: ShiftOp::Sra, rd, rt, rs },
        0x08 => Op::JumpReg { rs, rd: 0, link: false },
        0x09 => Op::JumpReg { rs, rd, link: true },
        0x0C => Op::Syscall,
        0x0D => Op::Break,
        0x10 => Op::HiLo { op: HiLoOp::Mfhi, reg: rd },
        0x11 => Op::HiLo { op: HiLoOp::Mthi, reg: rs },
        0x12 => Op::HiLo { op: HiLoOp::Mflo, reg: rd },
        0x13 => Op::HiLo { op: HiLoOp::Mtlo, reg: rs },
        0x18 => Op::MulDiv { op: MulDivOp::Mult, rs, rt },
        0x19 => Op::MulDiv { op: MulDivOp::Multu, rs, rt },
        0x1A => Op::MulDiv { op: MulDivOp::Div, rs, rt },
        0x1B => Op::MulDiv { op: MulDivOp::Divu, rs, rt },
        0x20 => Op::Alu { op: AluOp::Add, rd, rs, rt },
        0x21 => Op::Alu { op: AluOp::Addu, rd, rs, rt },
        0x22 => Op::Alu { op: AluOp::Sub, rd, rs, rt },
        0x23 => Op::Alu { op: AluOp::Subu, rd, rs, rt },
        0x24 => Op::Alu { op: AluOp::And, rd, rs, rt },
        0x25 => Op::Alu { op: AluOp::Or, rd, rs, rt },
        0x26 => Op::Alu { op: AluOp::Xor, rd, rs, rt },
        0x27 => Op::Alu { op: AluOp::Nor, rd, rs, rt },
        0x2A => Op::Alu { op: AluOp::Slt, rd, rs, rt },
        0x2B => Op::Alu { op: AluOp::Sltu, rd, rs, rt },
        _ => Op::Reserved { word },
    }
}

fn decode_cop0(word: u32) -> Op {
    let (rs, rt, rd, _, funct) = decode_r_type(word);
    match rs {
        0x00 => Op::Mfc0 { rt, rd },
        0x04 => Op::Mtc0 { rt, rd },
        0x10..=0x1F => match funct {
            0x01 => Op::Tlbr,
            0x02 => Op::Tlbwi,
            0x06 => Op::Tlbwr,
            0x08 => Op::Tlbp,
            0x10 => Op::Rfe,
            _ => Op::Reserved { word },
        },
        _ => Op::Reserved { word },
    }
}

fn decode_cop1(word: u32) -> Op {
    let (fmt, ft, fs, fd, funct) = decode_r_type(word);
    let rt = ft;
    match fmt {
        0x00 => Op::Mfc1 { rt, fs },
        0x02 => Op::Cfc1 { rt, fs },
        0x04 => Op::Mtc1 { rt, fs },
        0x06 => Op::Ctc1 { rt, fs },
        0x08 => Op::Bc1 {
            on_true: ft & 1 != 0,
            offset: (word & 0xFFFF) as u16 as i16,
        },
        // S format
        0x10 => {
            let op = match funct {
                0x00 => FpuOp::Add,
                0x01 => FpuOp::Sub,
                0x02 => FpuOp::Mul,
                0x03 => FpuOp::Div,
                0x04 => FpuOp::Sqrt,
                0x05 => FpuOp::Abs,
                0x06 => FpuOp::Mov,
                0x07 => FpuOp::Neg,
                0x24 => FpuOp::CvtWS,
                0x30..=0x3F => {
                    return Op::FpuCompare {
                        cond: funct & 0x7,
                        fs,
                        ft,
                    }
                }
                _ => return Op::Reserved { word },
            };
            Op::Fpu { op, fd, fs, ft }
        }
        // W format
        0x14 if funct == 0x20 => Op::Fpu {
            op: FpuOp::CvtSW,
            fd,
            fs,
            ft,
        },
        _ => Op::Reserved { word },
    }
}

impl Op {
    /// Cycle cost of the instruction
    ///
    /// Both execution strategies charge exactly this amount per instruction.
    pub fn cycles(&self) -> u32 {
        match self {
            Op::Load { .. } | Op::Lwc1 { .. } => 2,
            Op::MulDiv {
                op: MulDivOp::Mult | MulDivOp::Multu,
                ..
            } => 6,
            Op::MulDiv {
                op: MulDivOp::Div | MulDivOp::Divu,
                ..
            } => 36,
            Op::Fpu {
                op: FpuOp::Div | FpuOp::Sqrt,
                ..
            } => 12,
            Op::Fpu {
                op: FpuOp::Add | FpuOp::Sub | FpuOp::Mul | FpuOp::CvtSW | FpuOp::CvtWS,
                ..
            } => 2,
            _ => 1,
        }
    }

    /// Control transfer with a delay slot
    pub fn is_branch(&self) -> bool {
        matches!(
            self,
            Op::Branch { .. } | Op::Jump { .. } | Op::JumpReg { .. } | Op::Bc1 { .. }
        )
    }

    /// Writes guest memory
    pub fn is_store(&self) -> bool {
        matches!(self, Op::Store { .. } | Op::Swc1 { .. })
    }

    /// Result lands in a GPR only after the following instruction
    pub fn has_load_delay(&self) -> bool {
        matches!(
            self,
            Op::Load { .. } | Op::Mfc0 { .. } | Op::Mfc1 { .. } | Op::Cfc1 { .. }
        )
    }

    /// Changes privilege, translation or exception state
    ///
    /// The recompiler never places these inside a block; they always run
    /// through the interpreter path.
    pub fn needs_interpreter(&self) -> bool {
        matches!(
            self,
            Op::Syscall
                | Op::Break
                | Op::Mfc0 { .. }
                | Op::Mtc0 { .. }
                | Op::Rfe
                | Op::Tlbr
                | Op::Tlbwi
                | Op::Tlbwr
                | Op::Tlbp
                | Op::CopUnusable { .. }
                | Op::Reserved { .. }
        )
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Op::Alu { op, rd, rs, rt } => {
                write!(f, "{} ${}, ${}, ${}", format!("{:?}", op).to_lowercase(), rd, rs, rt)
            }
            Op::AluImm { op, rt, rs, imm } => write!(
                f,
                "{} ${}, ${}, 0x{:04X}",
                format!("{:?}", op).to_lowercase(),
                rt,
                rs,
                imm
            ),
            Op::Lui { rt, imm } => write!(f, "lui ${}, 0x{:04X}", rt, imm),
            Op::Shift { op, rd, rt, sa } => {
                if op == ShiftOp::Sll && rd == 0 && rt == 0 && sa == 0 {
                    return f.write_str("nop");
                }
                write!(f, "{} ${}, ${}, {}", format!("{:?}", op).to_lowercase(), rd, rt, sa)
            }
            Op::ShiftVar { op, rd, rt, rs } => {
                write!(f, "{}v ${}, ${}, ${}", format!("{:?}", op).to_lowercase(), rd, rt, rs)
            }
            Op::MulDiv { op, rs, rt } => {
                write!(f, "{} ${}, ${}", format!("{:?}", op).to_lowercase(), rs, rt)
            }
            Op::HiLo { op, reg } => write!(f, "{} ${}", format!("{:?}", op).to_lowercase(), reg),
            Op::Branch { cond, rs, rt, offset } => write!(
                f,
                "b{} ${}, ${}, {}",
                format!("{:?}", cond).to_lowercase(),
                rs,
                rt,
                offset
            ),
            Op::Jump { target, link } => {
                write!(f, "{} 0x{:07X}", if link { "jal" } else { "j" }, target << 2)
            }
            Op::JumpReg { rs, rd, link } => {
                if link {
                    write!(f, "jalr ${}, ${}", rd, rs)
                } else {
                    write!(f, "jr ${}", rs)
                }
            }
            Op::Load { op, rt, base, offset } => write!(
                f,
                "{} ${}, {}(${})",
                format!("{:?}", op).to_lowercase(),
                rt,
                offset,
                base
            ),
            Op::Store { op, rt, base, offset } => write!(
                f,
                "{} ${}, {}(${})",
                format!("{:?}", op).to_lowercase(),
                rt,
                offset,
                base
            ),
            Op::Syscall => f.write_str("syscall"),
            Op::Break => f.write_str("break"),
            Op::Mfc0 { rt, rd } => write!(f, "mfc0 ${}, $cop0_{}", rt, rd),
            Op::Mtc0 { rt, rd } => write!(f, "mtc0 ${}, $cop0_{}", rt, rd),
            Op::Rfe => f.write_str("rfe"),
            Op::Tlbr => f.write_str("tlbr"),
            Op::Tlbwi => f.write_str("tlbwi"),
            Op::Tlbwr => f.write_str("tlbwr"),
            Op::Tlbp => f.write_str("tlbp"),
            Op::Mfc1 { rt, fs } => write!(f, "mfc1 ${}, $f{}", rt, fs),
            Op::Mtc1 { rt, fs } => write!(f, "mtc1 ${}, $f{}", rt, fs),
            Op::Cfc1 { rt, fs } => write!(f, "cfc1 ${}, $fcr{}", rt, fs),
            Op::Ctc1 { rt, fs } => write!(f, "ctc1 ${}, $fcr{}", rt, fs),
            Op::Lwc1 { ft, base, offset } => write!(f, "lwc1 $f{}, {}(${})", ft, offset, base),
            Op::Swc1 { ft, base, offset } => write!(f, "swc1 $f{}, {}(${})", ft, offset, base),
            Op::Bc1 { on_true, offset } => {
                write!(f, "bc1{} {}", if on_true { "t" } else { "f" }, offset)
            }
            Op::Fpu { op, fd, fs, ft } => write!(
                f,
                "{}.s $f{}, $f{}, $f{}",
                format!("{:?}", op).to_lowercase(),
                fd,
                fs,
                ft
            ),
            Op::FpuCompare { cond, fs, ft } => write!(f, "c.{}.s $f{}, $f{}", cond, fs, ft),
            Op::CopUnusable { cop } => write!(f, "cop{}", cop),
            Op::Reserved { word } => write!(f, "illegal 0x{:08X}", word),
        }
    }
}
