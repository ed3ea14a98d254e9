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

//! Host code generation
//!
//! Runs of register-only guest instructions (ALU, shifts, LUI, multiply and
//! divide, HI/LO moves) are lowered to native functions with Cranelift. A
//! compiled run receives pointers to the general register file, HI and LO.
//! Guest registers live in SSA values while it runs, and only the registers
//! the run changed are written back when it returns.
//!
//! Everything else in a block (memory access, control transfer, coprocessor
//! instructions and the trapping ADD/ADDI/SUB) goes through
//! [`CPU::execute`](crate::core::cpu::CPU::execute).

use std::fmt;

use cranelift_codegen::ir::condcodes::IntCC;
use cranelift_codegen::ir::{types, AbiParam, InstBuilder, MemFlags, Value};
use cranelift_codegen::settings::{self, Configurable};
use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext};
use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::{default_libcall_names, Module};

use crate::core::cpu::{AluOp, HiLoOp, ImmOp, MulDivOp, Op, ShiftOp};

/// General registers, HI, LO
type Entry = unsafe extern "C" fn(*mut u32, *mut u32, *mut u32);

/// Whether `op` can be part of a compiled run
///
/// These instructions never fault, never touch memory and never redirect
/// the program counter.
pub fn is_native(op: &Op) -> bool {
    match op {
        Op::Alu { op, .. } => !matches!(op, AluOp::Add | AluOp::Sub),
        Op::AluImm { op, .. } => *op != ImmOp::Addi,
        Op::Lui { .. }
        | Op::Shift { .. }
        | Op::ShiftVar { .. }
        | Op::MulDiv { .. }
        | Op::HiLo { .. } => true,
        _ => false,
    }
}

/// Entry point of one compiled run
#[derive(Clone, Copy)]
pub struct NativeCode(Entry);

impl NativeCode {
    /// Run the compiled instructions against a register file
    ///
    /// # Safety
    ///
    /// The [`JitCompiler`] that produced this code must not have been
    /// released.
    pub(crate) unsafe fn call(&self, regs: &mut [u32; 32], hi: &mut u32, lo: &mut u32) {
        // SAFETY: generated code only reads and writes the 32 words behind
        // `regs` and the single words behind `hi` and `lo`, all of which are
        // exclusively borrowed for the duration of the call.
        unsafe { (self.0)(regs.as_mut_ptr(), hi, lo) }
    }
}

impl fmt::Debug for NativeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeCode({:p})", self.0 as *const ())
    }
}

/// Cranelift JIT backend
///
/// All functions share one [`JITModule`]. Code memory is only returned to
/// the system by [`release`](Self::release), so the recompiler releases the
/// whole compiler whenever it discards its blocks.
pub struct JitCompiler {
    module: JITModule,
    functions: usize,
}

// SAFETY: the module's raw pointers all refer to code and data memory the
// module itself owns; none of it is tied to the creating thread. The
// compiler is only used through `&mut` by the recompiler that owns it.
unsafe impl Send for JitCompiler {}

impl JitCompiler {
    /// Build a compiler for the host ISA
    pub fn new() -> Result<Self, String> {
        let mut flags = settings::builder();
        flags
            .set("opt_level", "speed")
            .map_err(|e| e.to_string())?;
        flags.set("is_pic", "false").map_err(|e| e.to_string())?;
        flags
            .set("use_colocated_libcalls", "false")
            .map_err(|e| e.to_string())?;

        let isa = cranelift_native::builder()
            .map_err(|msg| format!("host ISA not supported: {}", msg))?
            .finish(settings::Flags::new(flags))
            .map_err(|e| e.to_string())?;
        log::debug!("JIT target: {}", isa.triple());

        let module = JITModule::new(JITBuilder::with_isa(isa, default_libcall_names()));
        Ok(Self {
            module,
            functions: 0,
        })
    }

    /// Functions compiled since creation, live or not
    pub fn functions(&self) -> usize {
        self.functions
    }

    /// Compile a run of instructions accepted by [`is_native`]
    pub fn compile(&mut self, ops: &[Op]) -> Result<NativeCode, String> {
        let pointer = self.module.target_config().pointer_type();
        let mut ctx = self.module.make_context();
        ctx.func.signature = self.module.make_signature();
        for _ in 0..3 {
            ctx.func.signature.params.push(AbiParam::new(pointer));
        }

        let mut builder_ctx = FunctionBuilderContext::new();
        let mut builder = FunctionBuilder::new(&mut ctx.func, &mut builder_ctx);
        let entry = builder.create_block();
        builder.append_block_params_for_function_params(entry);
        builder.switch_to_block(entry);
        builder.seal_block(entry);
        let params = builder.block_params(entry);
        let (regs, hi, lo) = (params[0], params[1], params[2]);

        let mut lowering = Lowering::new(&mut builder, regs, hi, lo);
        for &op in ops {
            lowering.lower(op)?;
        }
        lowering.finish();
        builder.finalize();

        let id = self
            .module
            .declare_anonymous_function(&ctx.func.signature)
            .map_err(|e| e.to_string())?;
        self.module
            .define_function(id, &mut ctx)
            .map_err(|e| e.to_string())?;
        self.module.clear_context(&mut ctx);
        self.module
            .finalize_definitions()
            .map_err(|e| e.to_string())?;

        let code = self.module.get_finalized_function(id);
        self.functions += 1;
        // SAFETY: the function was defined above with three pointer
        // parameters, no results and the host's default calling convention,
        // which is exactly the ABI of `Entry`.
        let entry = unsafe { std::mem::transmute::<*const u8, Entry>(code) };
        Ok(NativeCode(entry))
    }

    /// Free every compiled function
    ///
    /// # Safety
    ///
    /// No [`NativeCode`] produced by this compiler may be called afterwards.
    pub unsafe fn release(self) {
        unsafe { self.module.free_memory() }
    }
}

/// Translation state for one run
struct Lowering<'a, 'f> {
    builder: &'a mut FunctionBuilder<'f>,
    regs_ptr: Value,
    hi_ptr: Value,
    lo_ptr: Value,
    regs: [Option<Value>; 32],
    dirty: u32,
    hi: Option<Value>,
    lo: Option<Value>,
    hi_dirty: bool,
    lo_dirty: bool,
}

impl<'a, 'f> Lowering<'a, 'f> {
    fn new(builder: &'a mut FunctionBuilder<'f>, regs_ptr: Value, hi_ptr: Value, lo_ptr: Value) -> Self {
        Self {
            builder,
            regs_ptr,
            hi_ptr,
            lo_ptr,
            regs: [None; 32],
            dirty: 0,
            hi: None,
            lo: None,
            hi_dirty: false,
            lo_dirty: false,
        }
    }

    fn constant(&mut self, value: u32) -> Value {
        self.builder.ins().iconst(types::I32, i64::from(value))
    }

    fn gpr(&mut self, index: u8) -> Value {
        let index = (index & 0x1F) as usize;
        if index == 0 {
            return self.constant(0);
        }
        if let Some(value) = self.regs[index] {
            return value;
        }
        let value = self.builder.ins().load(
            types::I32,
            MemFlags::trusted(),
            self.regs_ptr,
            (index * 4) as i32,
        );
        self.regs[index] = Some(value);
        value
    }

    fn set_gpr(&mut self, index: u8, value: Value) {
        let index = (index & 0x1F) as usize;
        if index != 0 {
            self.regs[index] = Some(value);
            self.dirty |= 1 << index;
        }
    }

    fn hi(&mut self) -> Value {
        match self.hi {
            Some(value) => value,
            None => {
                let value = self
                    .builder
                    .ins()
                    .load(types::I32, MemFlags::trusted(), self.hi_ptr, 0);
                self.hi = Some(value);
                value
            }
        }
    }

    fn lo(&mut self) -> Value {
        match self.lo {
            Some(value) => value,
            None => {
                let value = self
                    .builder
                    .ins()
                    .load(types::I32, MemFlags::trusted(), self.lo_ptr, 0);
                self.lo = Some(value);
                value
            }
        }
    }

    fn set_hi(&mut self, value: Value) {
        self.hi = Some(value);
        self.hi_dirty = true;
    }

    fn set_lo(&mut self, value: Value) {
        self.lo = Some(value);
        self.lo_dirty = true;
    }

    /// 0 or 1, like SLT
    fn compare(&mut self, cond: IntCC, a: Value, b: Value) -> Value {
        let flag = self.builder.ins().icmp(cond, a, b);
        self.builder.ins().uextend(types::I32, flag)
    }

    fn shift(&mut self, op: ShiftOp, value: Value, amount: Value) -> Value {
        let mask = self.constant(0x1F);
        let amount = self.builder.ins().band(amount, mask);
        match op {
            ShiftOp::Sll => self.builder.ins().ishl(value, amount),
            ShiftOp::Srl => self.builder.ins().ushr(value, amount),
            ShiftOp::Sra => self.builder.ins().sshr(value, amount),
        }
    }

    fn lower(&mut self, op: Op) -> Result<(), String> {
        match op {
            Op::Alu { op: alu, rd, rs, rt } => {
                let a = self.gpr(rs);
                let b = self.gpr(rt);
                let value = match alu {
                    AluOp::Addu => self.builder.ins().iadd(a, b),
                    AluOp::Subu => self.builder.ins().isub(a, b),
                    AluOp::And => self.builder.ins().band(a, b),
                    AluOp::Or => self.builder.ins().bor(a, b),
                    AluOp::Xor => self.builder.ins().bxor(a, b),
                    AluOp::Nor => {
                        let or = self.builder.ins().bor(a, b);
                        self.builder.ins().bnot(or)
                    }
                    AluOp::Slt => self.compare(IntCC::SignedLessThan, a, b),
                    AluOp::Sltu => self.compare(IntCC::UnsignedLessThan, a, b),
                    AluOp::Add | AluOp::Sub => return Err(unsupported(op)),
                };
                self.set_gpr(rd, value);
            }
            Op::AluImm { op: imm_op, rt, rs, imm } => {
                let a = self.gpr(rs);
                let value = match imm_op {
                    ImmOp::Addiu | ImmOp::Slti | ImmOp::Sltiu => {
                        let signed = self.constant(imm as i16 as i32 as u32);
                        match imm_op {
                            ImmOp::Addiu => self.builder.ins().iadd(a, signed),
                            ImmOp::Slti => self.compare(IntCC::SignedLessThan, a, signed),
                            _ => self.compare(IntCC::UnsignedLessThan, a, signed),
                        }
                    }
                    ImmOp::Andi | ImmOp::Ori | ImmOp::Xori => {
                        let unsigned = self.constant(imm as u32);
                        match imm_op {
                            ImmOp::Andi => self.builder.ins().band(a, unsigned),
                            ImmOp::Ori => self.builder.ins().bor(a, unsigned),
                            _ => self.builder.ins().bxor(a, unsigned),
                        }
                    }
                    ImmOp::Addi => return Err(unsupported(op)),
                };
                self.set_gpr(rt, value);
            }
            Op::Lui { rt, imm } => {
                let value = self.constant((imm as u32) << 16);
                self.set_gpr(rt, value);
            }
            Op::Shift { op: shift, rd, rt, sa } => {
                let value = self.gpr(rt);
                let amount = self.constant(sa as u32);
                let result = self.shift(shift, value, amount);
                self.set_gpr(rd, result);
            }
            Op::ShiftVar { op: shift, rd, rt, rs } => {
                let value = self.gpr(rt);
                let amount = self.gpr(rs);
                let result = self.shift(shift, value, amount);
                self.set_gpr(rd, result);
            }
            Op::MulDiv { op: muldiv, rs, rt } => {
                let a = self.gpr(rs);
                let b = self.gpr(rt);
                let (hi, lo) = self.muldiv(muldiv, a, b);
                self.set_hi(hi);
                self.set_lo(lo);
            }
            Op::HiLo { op: hilo, reg } => match hilo {
                HiLoOp::Mfhi => {
                    let value = self.hi();
                    self.set_gpr(reg, value);
                }
                HiLoOp::Mflo => {
                    let value = self.lo();
                    self.set_gpr(reg, value);
                }
                HiLoOp::Mthi => {
                    let value = self.gpr(reg);
                    self.set_hi(value);
                }
                HiLoOp::Mtlo => {
                    let value = self.gpr(reg);
                    self.set_lo(value);
                }
            },
            _ => return Err(unsupported(op)),
        }
        Ok(())
    }

    /// HI and LO after a multiply or divide
    ///
    /// Division never traps: the divisor is replaced by 1 where the hardware
    /// result is fixed (division by zero, `i32::MIN / -1`) and the fixed
    /// values are selected afterwards.
    fn muldiv(&mut self, op: MulDivOp, a: Value, b: Value) -> (Value, Value) {
        match op {
            MulDivOp::Mult => {
                let hi = self.builder.ins().smulhi(a, b);
                let lo = self.builder.ins().imul(a, b);
                (hi, lo)
            }
            MulDivOp::Multu => {
                let hi = self.builder.ins().umulhi(a, b);
                let lo = self.builder.ins().imul(a, b);
                (hi, lo)
            }
            MulDivOp::Div => {
                let zero = self.constant(0);
                let one = self.constant(1);
                let all_ones = self.constant(0xFFFF_FFFF);
                let min = self.constant(0x8000_0000);

                let by_zero = self.builder.ins().icmp(IntCC::Equal, b, zero);
                let is_min = self.builder.ins().icmp(IntCC::Equal, a, min);
                let is_minus_one = self.builder.ins().icmp(IntCC::Equal, b, all_ones);
                let overflow = self.builder.ins().band(is_min, is_minus_one);
                let fixed = self.builder.ins().bor(by_zero, overflow);
                let divisor = self.builder.ins().select(fixed, one, b);

                // i32::MIN / 1 already gives the overflow result (LO = MIN, HI = 0)
                let quotient = self.builder.ins().sdiv(a, divisor);
                let remainder = self.builder.ins().srem(a, divisor);

                let non_negative = self
                    .builder
                    .ins()
                    .icmp(IntCC::SignedGreaterThanOrEqual, a, zero);
                let zero_quotient = self.builder.ins().select(non_negative, all_ones, one);
                let lo = self.builder.ins().select(by_zero, zero_quotient, quotient);
                let hi = self.builder.ins().select(by_zero, a, remainder);
                (hi, lo)
            }
            MulDivOp::Divu => {
                let zero = self.constant(0);
                let one = self.constant(1);
                let all_ones = self.constant(0xFFFF_FFFF);

                let by_zero = self.builder.ins().icmp(IntCC::Equal, b, zero);
                let divisor = self.builder.ins().select(by_zero, one, b);
                let quotient = self.builder.ins().udiv(a, divisor);
                let remainder = self.builder.ins().urem(a, divisor);
                let lo = self.builder.ins().select(by_zero, all_ones, quotient);
                let hi = self.builder.ins().select(by_zero, a, remainder);
                (hi, lo)
            }
        }
    }

    /// Write back changed registers and return
    fn finish(self) {
        for index in 1..32 {
            if self.dirty & (1 << index) != 0 {
                if let Some(value) = self.regs[index] {
                    self.builder.ins().store(
                        MemFlags::trusted(),
                        value,
                        self.regs_ptr,
                        (index * 4) as i32,
                    );
                }
            }
        }
        if self.hi_dirty {
            if let Some(value) = self.hi {
                self.builder
                    .ins()
                    .store(MemFlags::trusted(), value, self.hi_ptr, 0);
            }
        }
        if self.lo_dirty {
            if let Some(value) = self.lo {
                self.builder
                    .ins()
                    .store(MemFlags::trusted(), value, self.lo_ptr, 0);
            }
        }
        self.builder.ins().return_(&[]);
    }
}

fn unsupported(op: Op) -> String {
    format!("'{}' has no host lowering", op)
}
