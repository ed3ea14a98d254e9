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

//! TLB entry format
//!
//! Entries use the R3000 register layout so TLBR/TLBWI can move them to and
//! from COP0 without conversion:
//!
//! ```text
//! EntryHi: | VPN (31:12) | ASID (11:6) | 0 (5:0) |
//! EntryLo: | PFN (31:12) | N | D | V | G | X | 0 (6:0) |
//!                         11  10  9   8   7
//! ```
//!
//! Bit 7 (reserved on the R3000) marks a page as not executable.

use bincode::{Decode, Encode};
use bitflags::bitflags;

/// Number of guest-visible TLB entries
pub const TLB_ENTRIES: usize = 64;

/// Number of entries in the translation cache in front of the TLB
pub const MICRO_TLB_ENTRIES: usize = 4;

const HI_MASK: u32 = 0xFFFF_FFC0;
const LO_MASK: u32 = 0xFFFF_FF80;

bitflags! {
    /// Page attribute bits of EntryLo
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PageFlags: u32 {
        const NONCACHEABLE = 1 << 11;
        /// Page is writable
        const DIRTY = 1 << 10;
        const VALID = 1 << 9;
        /// Matches regardless of ASID
        const GLOBAL = 1 << 8;
        const NO_EXEC = 1 << 7;
    }
}

/// One TLB entry in raw EntryHi/EntryLo form
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Encode, Decode)]
pub struct TlbEntry {
    pub hi: u32,
    pub lo: u32,
}

impl TlbEntry {
    pub fn new(hi: u32, lo: u32) -> Self {
        Self {
            hi: hi & HI_MASK,
            lo: lo & LO_MASK,
        }
    }

    /// Build an entry from its fields
    pub fn mapping(vaddr: u32, asid: u8, paddr: u32, flags: PageFlags) -> Self {
        Self::new(
            (vaddr & 0xFFFF_F000) | (((asid & 0x3F) as u32) << 6),
            (paddr & 0xFFFF_F000) | flags.bits(),
        )
    }

    #[inline(always)]
    pub fn vpn(&self) -> u32 {
        self.hi >> 12
    }

    #[inline(always)]
    pub fn asid(&self) -> u8 {
        ((self.hi >> 6) & 0x3F) as u8
    }

    #[inline(always)]
    pub fn pfn(&self) -> u32 {
        self.lo >> 12
    }

    #[inline(always)]
    pub fn flags(&self) -> PageFlags {
        PageFlags::from_bits_truncate(self.lo)
    }

    /// Whether this entry translates `vpn` for address space `asid`
    #[inline(always)]
    pub fn matches(&self, vpn: u32, asid: u8) -> bool {
        self.vpn() == vpn && (self.flags().contains(PageFlags::GLOBAL) || self.asid() == asid)
    }
}
