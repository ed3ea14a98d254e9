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

//! Block translating strategy
//!
//! Straight-line guest code is decoded into a [`CompiledBlock`] and its
//! register-only runs are compiled to host code by the [`JitCompiler`]. A
//! block runs up to and including a branch and its delay slot, never crosses
//! a page, and stops before any instruction that changes privilege,
//! translation or exception state. Those run through the interpreter path,
//! as do the memory, control transfer and coprocessor instructions inside a
//! block.
//!
//! A cached block is reused only while its virtual page still translates to
//! the physical page it was read from and that page has not been written
//! since. While a block runs, it ends early when:
//!
//! - the next scheduled event (or the run target) comes due
//! - an instruction touched a device register
//! - a store wrote to the block's own code page
//! - an exception or interrupt redirected the program counter
//!
//! so the instruction boundaries where events fire and interrupts are taken
//! match the interpreter exactly. A compiled run is entered only when the
//! whole run fits in the remaining budget and no delay slot is pending;
//! otherwise its instructions are executed one at a time.

use std::ops::Range;

use super::block_cache::{BlockCache, BlockId, CacheStats, CompiledBlock, NativeSegment};
use super::jit::{self, JitCompiler};
use super::{interpret_one, Hardware, UnitOutcome};
use crate::core::cpu::{decode, Op};
use crate::core::error::{FatalError, Result};
use crate::core::memory::{AddressSpace, PAGE_SIZE};
use crate::core::mmu::AccessKind;
use crate::core::timing::Cycle;

/// Compiled functions (live or stale) per cache slot before the JIT memory
/// is reclaimed
const STALE_CODE_FACTOR: usize = 4;

pub struct Recompiler {
    cache: BlockCache,
    jit: Option<JitCompiler>,
    max_block_instructions: usize,
    native_instructions: u64,
    fallback_instructions: u64,
}

impl Recompiler {
    pub fn new(capacity: usize, max_block_instructions: usize) -> Self {
        Self {
            cache: BlockCache::new(capacity),
            jit: None,
            max_block_instructions: max_block_instructions.max(1),
            native_instructions: 0,
            fallback_instructions: 0,
        }
    }

    pub fn cache(&self) -> &BlockCache {
        &self.cache
    }

    pub fn max_block_instructions(&self) -> usize {
        self.max_block_instructions
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            native_instructions: self.native_instructions,
            fallback_instructions: self.fallback_instructions,
            ..self.cache.stats()
        }
    }

    pub(super) fn reset_code_cache(&mut self, bus: &mut AddressSpace) {
        if !self.cache.is_empty() {
            log::debug!("Discarding {} translated blocks", self.cache.len());
        }
        self.cache.flush();
        self.release_code();
        bus.clear_code_pages();
    }

    pub(super) fn reset_stats(&mut self) {
        self.cache.reset_stats();
        self.native_instructions = 0;
        self.fallback_instructions = 0;
    }

    /// Free all host code; the cache must hold no blocks
    fn release_code(&mut self) {
        debug_assert!(self.cache.is_empty());
        if let Some(jit) = self.jit.take() {
            log::debug!("Releasing {} compiled functions", jit.functions());
            // SAFETY: the cache is empty, so no block refers to this code
            unsafe { jit.release() };
        }
    }

    /// Decode the block starting at `vaddr` (physical `paddr`)
    ///
    /// Returns `None` when the first instruction has to be interpreted.
    fn decode_block(&self, bus: &mut AddressSpace, vaddr: u32, paddr: u32) -> Option<CompiledBlock> {
        bus.mark_code_page(paddr);
        let generation = bus.page_generation(paddr);

        let mut ops = Vec::new();
        let mut addr = paddr;
        let mut in_delay_slot = false;
        while let Some(word) = bus.fetch_code(addr) {
            let op = decode(word);
            if op.needs_interpreter() {
                break;
            }
            ops.push((op, op.cycles()));
            if in_delay_slot || ops.len() >= self.max_block_instructions {
                break;
            }
            in_delay_slot = op.is_branch();

            addr = addr.wrapping_add(4);
            if addr % PAGE_SIZE == 0 {
                break;
            }
        }

        if ops.is_empty() {
            return None;
        }
        Some(CompiledBlock {
            vaddr,
            paddr,
            generation,
            ops,
            segments: Vec::new(),
        })
    }

    /// Compile the register-only runs of `block` to host code
    fn compile_segments(&mut self, block: &mut CompiledBlock) -> Result<()> {
        let runs = native_runs(&block.ops);
        if runs.is_empty() {
            return Ok(());
        }

        let pc = block.vaddr;
        let jit = match &mut self.jit {
            Some(jit) => jit,
            slot => slot.insert(
                JitCompiler::new().map_err(|reason| FatalError::Translation { pc, reason })?,
            ),
        };

        for run in runs {
            let ops: Vec<Op> = block.ops[run.clone()].iter().map(|&(op, _)| op).collect();
            let code = jit.compile(&ops).map_err(|reason| FatalError::Translation {
                pc: pc.wrapping_add(run.start as u32 * 4),
                reason,
            })?;
            let costs = &block.ops[run.clone()];
            let cycles: u64 = costs.iter().map(|&(_, cost)| cost as u64).sum();
            let last = costs.last().map_or(0, |&(_, cost)| cost as u64);
            block.segments.push(NativeSegment {
                start: run.start,
                len: run.len(),
                lead_cycles: cycles - last,
                cycles,
                code,
            });
        }
        Ok(())
    }

    /// Find a valid block for `pc`, translating it if needed
    ///
    /// `Ok(None)` means the instruction at `pc` must be interpreted: its fetch
    /// faults or it is not translatable.
    pub(super) fn find_block(&mut self, hw: &mut Hardware, pc: u32) -> Result<Option<(BlockId, bool)>> {
        if pc & 3 != 0 {
            return Ok(None);
        }
        let Ok(paddr) = hw.mmu.translate(pc, AccessKind::Fetch, hw.cpu.mode()) else {
            return Ok(None);
        };

        if let Some(id) = self.cache.lookup(pc) {
            let valid = self.cache.get(id).is_some_and(|block| {
                block.paddr == paddr && hw.bus.page_generation(paddr) == block.generation
            });
            if valid {
                return Ok(Some((id, false)));
            }
            self.cache.invalidate(id);
        }

        let Some(mut block) = self.decode_block(&mut hw.bus, pc, paddr) else {
            return Ok(None);
        };

        // Blocks dropped by a flush take their host code with them
        let stale_limit = self.cache.capacity().saturating_mul(STALE_CODE_FACTOR);
        let flushed = self.cache.ensure_room(pc, block.ops.len())?;
        if flushed || self.jit.as_ref().is_some_and(|jit| jit.functions() > stale_limit) {
            self.cache.flush();
            self.release_code();
        }

        self.compile_segments(&mut block)?;
        log::trace!(
            "Translated block at 0x{:08X} ({} instructions, {} native runs)",
            pc,
            block.ops.len(),
            block.segments.len()
        );
        let id = self.cache.insert(block)?;
        Ok(Some((id, true)))
    }

    pub(super) fn run_unit(&mut self, hw: &mut Hardware, now: Cycle, budget: Cycle) -> Result<UnitOutcome> {
        hw.bus.set_now(now);
        let pending = hw.bus.interrupt_pending();
        hw.cpu.service_interrupts(pending);

        let pc = hw.cpu.pc();
        let Some((id, compiled)) = self.find_block(hw, pc)? else {
            return Ok(interpret_one(hw, now));
        };
        let Some(block) = self.cache.get(id) else {
            return Ok(interpret_one(hw, now));
        };

        let code_page = block.paddr;
        let generation = block.generation;
        let io_before = hw.bus.io_accesses();
        let mut segments = block.segments.iter().peekable();
        let mut elapsed: Cycle = 0;
        let mut retired = 0;
        let mut index = 0;

        while index < block.ops.len() {
            if index > 0 {
                if hw.cpu.pc() != block.vaddr.wrapping_add(index as u32 * 4) {
                    break;
                }
                hw.bus.set_now(now + elapsed);
                let pending = hw.bus.interrupt_pending();
                if hw.cpu.service_interrupts(pending) {
                    break;
                }
            }

            if let Some(segment) = segments.next_if(|segment| segment.start == index) {
                if hw.cpu.at_plain_boundary() && elapsed + segment.lead_cycles < budget {
                    let (regs, hi, lo) = hw.cpu.native_registers();
                    // SAFETY: host code is released only after the cache
                    // holding this block has been flushed
                    unsafe { segment.code.call(regs, hi, lo) };
                    hw.cpu.retire_native(segment.len as u32);

                    elapsed += segment.cycles;
                    retired += segment.len as u64;
                    self.native_instructions += segment.len as u64;
                    index += segment.len;
                    if elapsed >= budget {
                        break;
                    }
                    continue;
                }
            }

            let (op, cost) = block.ops[index];
            let (cpu, mut port) = hw.split();
            cpu.execute(op, &mut port);
            elapsed += cost as Cycle;
            retired += 1;
            self.fallback_instructions += 1;
            index += 1;

            if elapsed >= budget || hw.bus.io_accesses() != io_before {
                break;
            }
            if op.is_store() && hw.bus.page_generation(code_page) != generation {
                log::debug!("Block at 0x{:08X} modified its own code", block.vaddr);
                break;
            }
        }

        Ok(UnitOutcome {
            cycles: elapsed,
            instructions: retired,
            blocks_executed: 1,
            blocks_compiled: compiled as u64,
        })
    }
}

impl Drop for Recompiler {
    fn drop(&mut self) {
        self.cache.flush();
        self.release_code();
    }
}

/// Maximal runs of instructions that can be compiled to host code
///
/// An instruction in a branch delay slot, or right after an instruction with
/// a load delay slot, is left to `CPU::execute` so that each run starts at a
/// plain instruction boundary.
pub(super) fn native_runs(ops: &[(Op, u32)]) -> Vec<Range<usize>> {
    let mut runs = Vec::new();
    let mut start = None;
    for (index, (op, _)) in ops.iter().enumerate() {
        let follows_delay = index > 0 && {
            let previous = ops[index - 1].0;
            previous.is_branch() || previous.has_load_delay()
        };
        let eligible = jit::is_native(op) && !follows_delay;
        match (eligible, start) {
            (true, None) => start = Some(index),
            (false, Some(first)) => {
                runs.push(first..index);
                start = None;
            }
            _ => {}
        }
    }
    if let Some(first) = start {
        runs.push(first..ops.len());
    }
    runs
}
