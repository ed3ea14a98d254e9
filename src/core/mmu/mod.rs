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

//! Virtual to physical address translation
//!
//! The guest uses the MIPS segment layout:
//!
//! | Segment | Virtual Range           | Mode   | Translation                  |
//! |---------|-------------------------|--------|------------------------------|
//! | kuseg   | 0x00000000-0x7FFFFFFF   | any    | TLB (fixed when paging off)  |
//! | kseg0   | 0x80000000-0x9FFFFFFF   | kernel | fixed, cached                |
//! | kseg1   | 0xA0000000-0xBFFFFFFF   | kernel | fixed, uncached              |
//! | kseg2   | 0xC0000000-0xFFFFFFFF   | kernel | TLB (fixed when paging off)  |
//!
//! Mapped lookups first consult a small fully-associative translation cache
//! (the micro-TLB) and fall back to the 64-entry TLB the guest maintains.
//! The micro-TLB is flushed whenever the TLB or the current ASID changes, so a
//! hit always agrees with a full lookup.
//!
//! Translation never mutates guest-visible state. Faults are returned to the
//! CPU, which raises the matching exception before the access has any effect.

use bincode::{Decode, Encode};

use crate::core::error::SerializationError;
use crate::core::memory::PHYS_MASK;

mod tlb;

#[cfg(test)]
mod tests;

pub use tlb::{PageFlags, TlbEntry, MICRO_TLB_ENTRIES, TLB_ENTRIES};

/// Kind of memory access being translated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessKind {
    Fetch,
    Read,
    Write,
}

/// CPU privilege level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrivilegeMode {
    Kernel,
    User,
}

/// Why a translation failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultKind {
    /// No TLB entry matches
    TlbMiss,
    /// Matching entry is not valid
    Invalid,
    /// Write to a page without the dirty (writable) bit
    Modified,
    /// Instruction fetch from a no-execute page
    NoExecute,
    /// Segment not accessible in the current mode
    AddressError,
    /// Address not aligned to the access size
    Misaligned,
}

/// A failed translation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fault {
    pub kind: FaultKind,
    pub vaddr: u32,
    pub access: AccessKind,
}

impl Fault {
    /// Whether the fault is serviced by the user TLB refill vector
    pub fn is_refill(&self) -> bool {
        self.kind == FaultKind::TlbMiss && self.vaddr < 0x8000_0000
    }

    /// Whether the fault comes from the TLB (as opposed to segment or alignment checks)
    pub fn is_tlb(&self) -> bool {
        matches!(
            self.kind,
            FaultKind::TlbMiss | FaultKind::Invalid | FaultKind::Modified | FaultKind::NoExecute
        )
    }
}

/// Snapshot form of the MMU
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct MmuState {
    pub entries: Vec<TlbEntry>,
    pub asid: u8,
}

/// Lookup counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MmuStats {
    pub micro_hits: u64,
    pub table_hits: u64,
    pub misses: u64,
}

#[derive(Debug, Clone, Copy)]
struct MicroEntry {
    vpn: u32,
    asid: u8,
    global: bool,
    pfn: u32,
    flags: PageFlags,
}

/// Memory management unit
///
/// # Example
///
/// ```
/// use vmcore::core::mmu::{AccessKind, Mmu, PageFlags, PrivilegeMode, TlbEntry};
///
/// let mut mmu = Mmu::new(true);
/// mmu.write_entry(0, TlbEntry::mapping(0x0040_0000, 0, 0x0001_0000, PageFlags::VALID));
///
/// let paddr = mmu
///     .translate(0x0040_0123, AccessKind::Read, PrivilegeMode::User)
///     .unwrap();
/// assert_eq!(paddr, 0x0001_0123);
///
/// // The page is not writable
/// assert!(mmu
///     .translate(0x0040_0123, AccessKind::Write, PrivilegeMode::User)
///     .is_err());
/// ```
#[derive(Debug, Clone)]
pub struct Mmu {
    /// Paging for kuseg/kseg2; otherwise they map like kseg0
    enabled: bool,
    entries: [TlbEntry; TLB_ENTRIES],
    asid: u8,
    micro: [Option<MicroEntry>; MICRO_TLB_ENTRIES],
    micro_next: usize,
    stats: MmuStats,
}

impl Mmu {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            entries: [TlbEntry::default(); TLB_ENTRIES],
            asid: 0,
            micro: [None; MICRO_TLB_ENTRIES],
            micro_next: 0,
            stats: MmuStats::default(),
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Clear the TLB and the translation cache
    pub fn reset(&mut self) {
        self.entries = [TlbEntry::default(); TLB_ENTRIES];
        self.asid = 0;
        self.flush();
    }

    /// Switch paging for kuseg/kseg2 on or off
    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled != enabled {
            self.enabled = enabled;
            self.flush();
        }
    }

    /// Drop every cached translation
    pub fn flush(&mut self) {
        self.micro = [None; MICRO_TLB_ENTRIES];
        self.micro_next = 0;
    }

    pub fn asid(&self) -> u8 {
        self.asid
    }

    /// Switch address space
    pub fn set_asid(&mut self, asid: u8) {
        let asid = asid & 0x3F;
        if asid != self.asid {
            self.asid = asid;
            self.flush();
        }
    }

    pub fn stats(&self) -> MmuStats {
        self.stats
    }

    /// Translate and check alignment for a `size`-byte access
    #[inline]
    pub fn translate_access(
        &mut self,
        vaddr: u32,
        size: u32,
        access: AccessKind,
        mode: PrivilegeMode,
    ) -> Result<u32, Fault> {
        if vaddr & (size - 1) != 0 {
            return Err(Fault {
                kind: FaultKind::Misaligned,
                vaddr,
                access,
            });
        }
        self.translate(vaddr, access, mode)
    }

    /// Translate a virtual address
    #[inline]
    pub fn translate(
        &mut self,
        vaddr: u32,
        access: AccessKind,
        mode: PrivilegeMode,
    ) -> Result<u32, Fault> {
        if mode == PrivilegeMode::User && vaddr >= 0x8000_0000 {
            return Err(Fault {
                kind: FaultKind::AddressError,
                vaddr,
                access,
            });
        }

        match vaddr >> 29 {
            // kseg0 / kseg1
            4 | 5 => Ok(vaddr & PHYS_MASK),
            _ if !self.enabled => Ok(vaddr & PHYS_MASK),
            _ => self.lookup(vaddr, access),
        }
    }

    fn lookup(&mut self, vaddr: u32, access: AccessKind) -> Result<u32, Fault> {
        let vpn = vaddr >> 12;
        let asid = self.asid;

        let cached = self
            .micro
            .iter()
            .flatten()
            .find(|e| e.vpn == vpn && (e.global || e.asid == asid))
            .copied();

        let entry = match cached {
            Some(entry) => {
                self.stats.micro_hits += 1;
                entry
            }
            None => {
                let Some(found) = self.entries.iter().find(|e| e.matches(vpn, asid)) else {
                    self.stats.misses += 1;
                    return Err(Fault {
                        kind: FaultKind::TlbMiss,
                        vaddr,
                        access,
                    });
                };
                self.stats.table_hits += 1;
                let entry = MicroEntry {
                    vpn,
                    asid: found.asid(),
                    global: found.flags().contains(PageFlags::GLOBAL),
                    pfn: found.pfn(),
                    flags: found.flags(),
                };
                self.micro[self.micro_next] = Some(entry);
                self.micro_next = (self.micro_next + 1) % MICRO_TLB_ENTRIES;
                entry
            }
        };

        let kind = if !entry.flags.contains(PageFlags::VALID) {
            Some(FaultKind::Invalid)
        } else if access == AccessKind::Write && !entry.flags.contains(PageFlags::DIRTY) {
            Some(FaultKind::Modified)
        } else if access == AccessKind::Fetch && entry.flags.contains(PageFlags::NO_EXEC) {
            Some(FaultKind::NoExecute)
        } else {
            None
        };

        match kind {
            Some(kind) => Err(Fault { kind, vaddr, access }),
            None => Ok(((entry.pfn << 12) | (vaddr & 0xFFF)) & PHYS_MASK),
        }
    }

    /// Read a TLB entry (TLBR)
    pub fn read_entry(&self, index: usize) -> TlbEntry {
        self.entries[index % TLB_ENTRIES]
    }

    /// Write a TLB entry (TLBWI/TLBWR)
    pub fn write_entry(&mut self, index: usize, entry: TlbEntry) {
        let index = index % TLB_ENTRIES;
        log::trace!(
            "TLB[{}] <- hi=0x{:08X} lo=0x{:08X}",
            index,
            entry.hi,
            entry.lo
        );
        self.entries[index] = entry;
        self.flush();
    }

    /// Find the entry matching EntryHi's VPN and ASID (TLBP)
    pub fn probe(&self, entry_hi: u32) -> Option<usize> {
        let probe = TlbEntry::new(entry_hi, 0);
        self.entries
            .iter()
            .position(|e| e.matches(probe.vpn(), probe.asid()))
    }

    pub fn state(&self) -> MmuState {
        MmuState {
            entries: self.entries.to_vec(),
            asid: self.asid,
        }
    }

    pub fn validate(state: &MmuState) -> Result<(), SerializationError> {
        if state.entries.len() != TLB_ENTRIES {
            return Err(SerializationError::Decode(format!(
                "expected {} TLB entries, found {}",
                TLB_ENTRIES,
                state.entries.len()
            )));
        }
        Ok(())
    }

    /// Restore TLB contents accepted by [`validate`](Self::validate)
    ///
    /// The translation cache is always flushed.
    pub fn restore(&mut self, state: &MmuState) {
        for (entry, saved) in self.entries.iter_mut().zip(&state.entries) {
            *entry = *saved;
        }
        self.asid = state.asid & 0x3F;
        self.flush();
    }
}

impl Default for Mmu {
    fn default() -> Self {
        Self::new(false)
    }
}
