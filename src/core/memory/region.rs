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

//! Memory region descriptors
//!
//! A region is a contiguous range of the physical address space backed either by
//! host memory (RAM, ROM, flash) or by a device handler. A region may be mapped
//! into a window larger than itself, in which case the window mirrors it.

use bitflags::bitflags;

use super::io_device::DeviceId;
use super::PAGE_SIZE;

bitflags! {
    /// Access widths a region accepts
    ///
    /// Accesses using any other width behave like unmapped memory.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AccessWidths: u8 {
        const BYTE = 1 << 0;
        const HALF = 1 << 1;
        const WORD = 1 << 2;
        const DOUBLE = 1 << 3;

        /// Widths the CPU can issue (8/16/32-bit)
        const CPU = Self::BYTE.bits() | Self::HALF.bits() | Self::WORD.bits();
    }
}

/// Width of a single memory access
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessWidth {
    Byte,
    Half,
    Word,
    Double,
}

impl AccessWidth {
    /// Access size in bytes
    #[inline(always)]
    pub const fn bytes(self) -> u32 {
        match self {
            AccessWidth::Byte => 1,
            AccessWidth::Half => 2,
            AccessWidth::Word => 4,
            AccessWidth::Double => 8,
        }
    }

    /// Mask covering the value bits of this width
    #[inline(always)]
    pub const fn mask(self) -> u64 {
        match self {
            AccessWidth::Byte => 0xFF,
            AccessWidth::Half => 0xFFFF,
            AccessWidth::Word => 0xFFFF_FFFF,
            AccessWidth::Double => u64::MAX,
        }
    }

    #[inline(always)]
    pub(crate) const fn flag(self) -> AccessWidths {
        match self {
            AccessWidth::Byte => AccessWidths::BYTE,
            AccessWidth::Half => AccessWidths::HALF,
            AccessWidth::Word => AccessWidths::WORD,
            AccessWidth::Double => AccessWidths::DOUBLE,
        }
    }
}

/// What backs a region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionKind {
    /// Volatile RAM, cleared on hard reset
    Ram,
    /// Read-only memory; guest writes are dropped
    Rom,
    /// Writable memory that survives resets
    Flash,
    /// Register window of an attached device
    Device(DeviceId),
    /// Built-in interrupt controller registers
    Interrupts,
}

impl RegionKind {
    /// Whether this kind stores its contents in host memory
    pub fn is_memory(self) -> bool {
        matches!(self, RegionKind::Ram | RegionKind::Rom | RegionKind::Flash)
    }
}

/// A physical memory region
///
/// # Example
///
/// ```
/// use vmcore::core::memory::MemoryRegion;
///
/// // 16 MiB of RAM mirrored four times across a 64 MiB window
/// let ram = MemoryRegion::ram("ram", 0x0000_0000, 16 * 1024 * 1024)
///     .with_window(64 * 1024 * 1024);
/// assert_eq!(ram.window(), 64 * 1024 * 1024);
/// ```
#[derive(Debug, Clone)]
pub struct MemoryRegion {
    name: String,
    base: u32,
    size: u32,
    window: u32,
    widths: AccessWidths,
    kind: RegionKind,
    pub(super) data: Vec<u8>,
}

impl MemoryRegion {
    fn memory(name: &str, base: u32, size: u32, kind: RegionKind) -> Self {
        Self {
            name: name.to_string(),
            base,
            size,
            window: size,
            widths: AccessWidths::all(),
            kind,
            data: vec![0u8; size as usize],
        }
    }

    /// Zero-filled RAM
    pub fn ram(name: &str, base: u32, size: u32) -> Self {
        Self::memory(name, base, size, RegionKind::Ram)
    }

    /// Read-only memory, filled with the erased value (all ones)
    pub fn rom(name: &str, base: u32, size: u32) -> Self {
        let mut region = Self::memory(name, base, size, RegionKind::Rom);
        region.data.fill(0xFF);
        region
    }

    /// Persistent writable memory, filled with the erased value
    pub fn flash(name: &str, base: u32, size: u32) -> Self {
        let mut region = Self::memory(name, base, size, RegionKind::Flash);
        region.data.fill(0xFF);
        region
    }

    /// Register window routed to an attached device
    pub fn device(name: &str, base: u32, size: u32, device: DeviceId) -> Self {
        Self {
            name: name.to_string(),
            base,
            size,
            window: size,
            widths: AccessWidths::CPU,
            kind: RegionKind::Device(device),
            data: Vec::new(),
        }
    }

    pub(crate) fn interrupts(base: u32) -> Self {
        Self {
            name: "interrupts".to_string(),
            base,
            size: PAGE_SIZE,
            window: PAGE_SIZE,
            widths: AccessWidths::CPU,
            kind: RegionKind::Interrupts,
            data: Vec::new(),
        }
    }

    /// Map the region into a larger window that mirrors it
    pub fn with_window(mut self, window: u32) -> Self {
        self.window = window;
        self
    }

    /// Restrict the access widths the region accepts
    pub fn with_widths(mut self, widths: AccessWidths) -> Self {
        self.widths = widths;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    /// Size of the mapped window (a multiple of `size`)
    pub fn window(&self) -> u32 {
        self.window
    }

    /// Last physical address covered by the window (inclusive)
    pub fn end(&self) -> u32 {
        self.base.wrapping_add(self.window).wrapping_sub(1)
    }

    pub fn widths(&self) -> AccessWidths {
        self.widths
    }

    pub fn kind(&self) -> RegionKind {
        self.kind
    }

    /// Backing bytes (empty for device regions)
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Offset into the backing for a physical address inside the window
    #[inline(always)]
    pub(super) fn offset_of(&self, paddr: u32) -> u32 {
        paddr.wrapping_sub(self.base) & (self.size - 1)
    }

    #[inline(always)]
    pub(super) fn accepts(&self, width: AccessWidth) -> bool {
        self.widths.contains(width.flag())
    }

    pub(super) fn read_backing(&self, offset: u32, width: AccessWidth) -> u64 {
        let start = offset as usize;
        let len = width.bytes() as usize;
        // Accesses are naturally aligned and sizes are powers of two, so a
        // wide access never runs past the end of the backing.
        let mut bytes = [0u8; 8];
        bytes[..len].copy_from_slice(&self.data[start..start + len]);
        u64::from_le_bytes(bytes)
    }

    pub(super) fn write_backing(&mut self, offset: u32, width: AccessWidth, value: u64) {
        let start = offset as usize;
        let len = width.bytes() as usize;
        self.data[start..start + len].copy_from_slice(&value.to_le_bytes()[..len]);
    }
}
