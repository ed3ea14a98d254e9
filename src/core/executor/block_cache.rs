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

//! Translated block storage
//!
//! Blocks live in an arena and are found through their guest virtual start
//! address. A block never crosses a page, so one translation and one page
//! generation describe everything it depends on.

use std::collections::HashMap;

use super::jit::NativeCode;
use crate::core::cpu::Op;
use crate::core::error::FatalError;

/// Index of a block in the arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(pub usize);

/// Instructions `start..start + len` of a block, compiled to host code
#[derive(Debug, Clone)]
pub struct NativeSegment {
    pub start: usize,
    pub len: usize,
    /// Cycles of every instruction but the last
    pub lead_cycles: u64,
    pub cycles: u64,
    pub code: NativeCode,
}

/// A translated run of straight-line guest code
#[derive(Debug, Clone)]
pub struct CompiledBlock {
    /// Guest virtual address of the first instruction
    pub vaddr: u32,
    /// Physical address the block was translated from
    pub paddr: u32,
    /// Write generation of the code page at translation time
    pub generation: u32,
    /// Decoded instructions with their cycle cost
    pub ops: Vec<(Op, u32)>,
    /// Host code for the register-only runs, in block order
    pub segments: Vec<NativeSegment>,
}

impl CompiledBlock {
    /// Guest bytes covered
    pub fn byte_len(&self) -> u32 {
        self.ops.len() as u32 * 4
    }

    /// Sum of the per-instruction cycle costs
    pub fn cycles(&self) -> u64 {
        self.ops.iter().map(|&(_, cycles)| cycles as u64).sum()
    }
}

/// Cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub blocks: usize,
    pub instructions: usize,
    pub compiled: u64,
    pub invalidated: u64,
    pub flushes: u64,
    /// Instructions retired by host code
    pub native_instructions: u64,
    /// Block instructions retired through `CPU::execute`
    pub fallback_instructions: u64,
}

/// Arena of translated blocks indexed by guest address
///
/// Capacity is measured in decoded instructions. When a new block does not
/// fit, the whole cache is flushed; a block larger than the whole cache is a
/// fatal error.
#[derive(Debug)]
pub struct BlockCache {
    blocks: Vec<Option<CompiledBlock>>,
    free: Vec<usize>,
    by_vaddr: HashMap<u32, BlockId>,
    capacity: usize,
    used: usize,
    stats: CacheStats,
}

impl BlockCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            blocks: Vec::new(),
            free: Vec::new(),
            by_vaddr: HashMap::new(),
            capacity,
            used: 0,
            stats: CacheStats::default(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.by_vaddr.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_vaddr.is_empty()
    }

    pub fn lookup(&self, vaddr: u32) -> Option<BlockId> {
        self.by_vaddr.get(&vaddr).copied()
    }

    pub fn get(&self, id: BlockId) -> Option<&CompiledBlock> {
        self.blocks.get(id.0).and_then(|slot| slot.as_ref())
    }

    /// Make room for a block of `needed` instructions
    ///
    /// Returns whether the cache had to be flushed.
    pub fn ensure_room(&mut self, pc: u32, needed: usize) -> Result<bool, FatalError> {
        if needed > self.capacity {
            return Err(FatalError::CodeCacheExhausted {
                pc,
                needed,
                capacity: self.capacity,
            });
        }
        if self.used + needed <= self.capacity {
            return Ok(false);
        }
        log::debug!(
            "Code cache full ({} of {} slots), flushing",
            self.used,
            self.capacity
        );
        self.flush();
        Ok(true)
    }

    /// Store a block, replacing any block at the same address
    pub fn insert(&mut self, block: CompiledBlock) -> Result<BlockId, FatalError> {
        if let Some(old) = self.lookup(block.vaddr) {
            self.invalidate(old);
        }
        let needed = block.ops.len();
        self.ensure_room(block.vaddr, needed)?;

        self.used += needed;
        self.stats.compiled += 1;
        let vaddr = block.vaddr;
        let id = match self.free.pop() {
            Some(index) => {
                self.blocks[index] = Some(block);
                BlockId(index)
            }
            None => {
                self.blocks.push(Some(block));
                BlockId(self.blocks.len() - 1)
            }
        };
        self.by_vaddr.insert(vaddr, id);
        Ok(id)
    }

    /// Drop one block
    pub fn invalidate(&mut self, id: BlockId) {
        let Some(block) = self.blocks.get_mut(id.0).and_then(Option::take) else {
            return;
        };
        log::trace!("Invalidated block at 0x{:08X}", block.vaddr);
        self.used -= block.ops.len();
        self.stats.invalidated += 1;
        if self.by_vaddr.get(&block.vaddr) == Some(&id) {
            self.by_vaddr.remove(&block.vaddr);
        }
        self.free.push(id.0);
    }

    /// Drop every block
    pub fn flush(&mut self) {
        self.blocks.clear();
        self.free.clear();
        self.by_vaddr.clear();
        self.used = 0;
        self.stats.flushes += 1;
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            blocks: self.by_vaddr.len(),
            instructions: self.used,
            ..self.stats
        }
    }

    pub fn reset_stats(&mut self) {
        self.stats = CacheStats::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cpu::{decode, encode};

    fn block(vaddr: u32, len: usize) -> CompiledBlock {
        CompiledBlock {
            vaddr,
            paddr: vaddr & 0x1FFF_FFFF,
            generation: 0,
            ops: vec![(decode(encode::NOP), 1); len],
            segments: Vec::new(),
        }
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut cache = BlockCache::new(16);
        let id = cache.insert(block(0x8000_1000, 4)).unwrap();
        assert_eq!(cache.lookup(0x8000_1000), Some(id));
        assert_eq!(cache.get(id).unwrap().byte_len(), 16);
        assert_eq!(cache.stats().instructions, 4);
        assert!(cache.lookup(0x8000_1004).is_none());
    }

    #[test]
    fn test_invalidate_reuses_slot() {
        let mut cache = BlockCache::new(16);
        let first = cache.insert(block(0x8000_1000, 4)).unwrap();
        cache.invalidate(first);
        assert!(cache.is_empty());
        assert_eq!(cache.stats().instructions, 0);

        let second = cache.insert(block(0x8000_2000, 2)).unwrap();
        assert_eq!(second, first);
        assert_eq!(cache.lookup(0x8000_2000), Some(second));
    }

    #[test]
    fn test_replacing_block_at_same_address() {
        let mut cache = BlockCache::new(16);
        cache.insert(block(0x8000_1000, 4)).unwrap();
        cache.insert(block(0x8000_1000, 6)).unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().instructions, 6);
    }

    #[test]
    fn test_full_cache_flushes() {
        let mut cache = BlockCache::new(8);
        cache.insert(block(0x8000_1000, 5)).unwrap();
        cache.insert(block(0x8000_2000, 5)).unwrap();
        assert!(cache.lookup(0x8000_1000).is_none());
        assert!(cache.lookup(0x8000_2000).is_some());
        assert_eq!(cache.stats().flushes, 1);
    }

    #[test]
    fn test_ensure_room_reports_flush() {
        let mut cache = BlockCache::new(8);
        cache.insert(block(0x8000_1000, 6)).unwrap();
        assert!(!cache.ensure_room(0x8000_2000, 2).unwrap());
        assert!(cache.ensure_room(0x8000_2000, 3).unwrap());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_oversized_block_is_fatal() {
        let mut cache = BlockCache::new(2);
        let err = cache.insert(block(0x8000_1000, 3)).unwrap_err();
        assert_eq!(
            err,
            FatalError::CodeCacheExhausted {
                pc: 0x8000_1000,
                needed: 3,
                capacity: 2
            }
        );
        assert!(cache.is_empty());
    }
}
