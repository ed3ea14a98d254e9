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

//! Physical address space
//!
//! The address space maps the 29-bit physical address space onto memory
//! regions. Lookup goes through a flat page table with one slot per 4 KiB
//! page, so every access costs one table read regardless of how many regions
//! are mapped.
//!
//! # Default Memory Map
//!
//! | Physical Address Range | Region        | Access |
//! |------------------------|---------------|--------|
//! | 0x00000000-0x03FFFFFF  | RAM (mirrored)| R/W    |
//! | 0x04000000-0x04FFFFFF  | Video RAM     | R/W    |
//! | 0x08000000-0x087FFFFF  | Sound RAM     | R/W    |
//! | 0x1F000000-0x1F005FFF  | I/O devices   | R/W    |
//! | 0x1FA00000-0x1FA1FFFF  | Flash         | R/W    |
//! | 0x1FC00000-0x1FDFFFFF  | Boot ROM      | R only |
//!
//! # Open Bus
//!
//! Reads from unmapped addresses return [`OPEN_BUS`] truncated to the access
//! width and writes are dropped. Neither faults nor mutates anything. An
//! access using a width the region does not accept behaves the same way.
//!
//! # Example
//!
//! ```
//! use vmcore::core::memory::{AddressSpace, MemoryRegion};
//!
//! let mut bus = AddressSpace::new();
//! bus.map(MemoryRegion::ram("ram", 0x0000_0000, 0x1000).with_window(0x4000))
//!     .unwrap();
//!
//! bus.write32(0x0000_0010, 0x12345678);
//! // The window mirrors the region
//! assert_eq!(bus.read32(0x0000_1010), 0x12345678);
//! // Unmapped space reads as open bus
//! assert_eq!(bus.read32(0x0800_0000), 0xFFFF_FFFF);
//! ```

use std::any::Any;

use bitflags::bitflags;

use crate::core::error::{ConfigError, EmulatorError, Result};
use crate::core::interrupt::{InterruptController, I_STAT};
use crate::core::timing::{Cycle, EventAction, EventDispatcher, EventRequest};

mod io_device;
mod region;

#[cfg(test)]
mod tests;

pub use io_device::{decode_device_state, encode_device_state, Device, DeviceId, IoContext};
pub use region::{AccessWidth, AccessWidths, MemoryRegion, RegionKind};

/// Page size shift (4 KiB pages)
pub const PAGE_SHIFT: u32 = 12;

/// Page size in bytes
pub const PAGE_SIZE: u32 = 1 << PAGE_SHIFT;

/// Mask applied to every physical address (29-bit physical space)
pub const PHYS_MASK: u32 = 0x1FFF_FFFF;

/// Number of physical pages
pub const PAGE_COUNT: usize = (PHYS_MASK as usize + 1) >> PAGE_SHIFT;

/// Value returned by reads that hit nothing
pub const OPEN_BUS: u64 = u64::MAX;

bitflags! {
    /// Per-page tracking state
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    struct PageState: u8 {
        /// Next write is trapped and recorded
        const PROTECTED = 1 << 0;
        /// Written since it was protected
        const DIRTY = 1 << 1;
        /// Holds translated code; writes bump the page generation
        const CODE = 1 << 2;
    }
}

/// Index of a mapped region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegionId(pub usize);

/// The machine's physical address space
pub struct AddressSpace {
    /// Mapped regions, indexed by `RegionId`; `None` once unmapped
    regions: Vec<Option<MemoryRegion>>,

    /// One slot per physical page: 0 = unmapped, otherwise region index + 1
    page_table: Vec<u16>,

    /// Tracking state, indexed by canonical page
    page_state: Vec<PageState>,

    /// Write generation of code pages, indexed by canonical page
    generations: Vec<u32>,

    devices: Vec<Box<dyn Device>>,

    irq: InterruptController,

    /// Scheduler requests queued by device handlers
    requests: Vec<EventRequest>,

    /// Cycle reported to device handlers
    now: Cycle,

    /// Count of device and controller accesses
    io_accesses: u64,
}

impl AddressSpace {
    /// Create an empty address space (everything is open bus)
    pub fn new() -> Self {
        Self {
            regions: Vec::new(),
            page_table: vec![0; PAGE_COUNT],
            page_state: vec![PageState::empty(); PAGE_COUNT],
            generations: vec![0; PAGE_COUNT],
            devices: Vec::new(),
            irq: InterruptController::new(),
            requests: Vec::new(),
            now: 0,
            io_accesses: 0,
        }
    }

    // === Mapping ===

    /// Map a region
    ///
    /// The region size must be a power of two of at least one page, its window
    /// a multiple of the size, its base page aligned, and it may not overlap
    /// any mapped region.
    pub fn map(&mut self, region: MemoryRegion) -> std::result::Result<RegionId, ConfigError> {
        let name = region.name().to_string();
        let (base, size, window) = (region.base(), region.size(), region.window());

        if !size.is_power_of_two() || size < PAGE_SIZE {
            return Err(ConfigError::InvalidRegionSize { name, size });
        }
        if window < size || window % size != 0 {
            return Err(ConfigError::InvalidWindow { name, size, window });
        }
        if base % PAGE_SIZE != 0 {
            return Err(ConfigError::MisalignedRegion { name, base });
        }
        if base > PHYS_MASK || base as u64 + window as u64 > PHYS_MASK as u64 + 1 {
            return Err(ConfigError::OutOfRange { name, base });
        }
        if region.widths().is_empty() {
            return Err(ConfigError::NoAccessWidths(name));
        }
        if let RegionKind::Device(id) = region.kind() {
            if id.0 >= self.devices.len() {
                return Err(ConfigError::UnknownDevice(id.0));
            }
        }

        let first = (base >> PAGE_SHIFT) as usize;
        let last = first + (window >> PAGE_SHIFT) as usize;
        if let Some(&slot) = self.page_table[first..last].iter().find(|&&slot| slot != 0) {
            let existing = self.regions[slot as usize - 1]
                .as_ref()
                .map(|r| r.name().to_string())
                .unwrap_or_default();
            return Err(ConfigError::Overlap { name, existing });
        }
        if self.regions.len() >= u16::MAX as usize {
            return Err(ConfigError::OutOfRange { name, base });
        }

        let id = RegionId(self.regions.len());
        let slot = (id.0 + 1) as u16;
        self.page_table[first..last].fill(slot);
        log::debug!(
            "Mapped '{}' at 0x{:08X}-0x{:08X} ({:?})",
            name,
            base,
            region.end(),
            region.kind()
        );
        self.regions.push(Some(region));
        Ok(id)
    }

    /// Unmap the region whose window starts at `base`
    pub fn unmap(&mut self, base: u32) -> std::result::Result<MemoryRegion, ConfigError> {
        let base = base & PHYS_MASK;
        let index = self
            .regions
            .iter()
            .position(|r| r.as_ref().is_some_and(|r| r.base() == base))
            .ok_or(ConfigError::NoSuchRegion(base))?;
        let region = self.regions[index]
            .take()
            .ok_or(ConfigError::NoSuchRegion(base))?;

        let first = (region.base() >> PAGE_SHIFT) as usize;
        let last = first + (region.window() >> PAGE_SHIFT) as usize;
        self.page_table[first..last].fill(0);
        for page in first..last {
            if self.page_state[page].contains(PageState::CODE) {
                self.generations[page] = self.generations[page].wrapping_add(1);
            }
            self.page_state[page] = PageState::empty();
        }
        log::debug!("Unmapped '{}' at 0x{:08X}", region.name(), base);
        Ok(region)
    }

    /// Region covering a physical address
    pub fn region_at(&self, paddr: u32) -> Option<&MemoryRegion> {
        self.slot_of(paddr & PHYS_MASK)
            .and_then(|index| self.regions[index].as_ref())
    }

    /// Mapped region by name
    pub fn region_by_name(&self, name: &str) -> Option<&MemoryRegion> {
        self.regions.iter().flatten().find(|r| r.name() == name)
    }

    /// Mapped regions in mapping order
    pub fn regions(&self) -> impl Iterator<Item = &MemoryRegion> {
        self.regions.iter().flatten()
    }

    /// Memory-backed regions in mapping order
    pub fn memory_regions(&self) -> impl Iterator<Item = &MemoryRegion> {
        self.regions().filter(|r| r.kind().is_memory())
    }

    pub(crate) fn memory_regions_mut(&mut self) -> impl Iterator<Item = &mut MemoryRegion> {
        self.regions
            .iter_mut()
            .flatten()
            .filter(|r| r.kind().is_memory())
    }

    #[inline(always)]
    fn slot_of(&self, paddr: u32) -> Option<usize> {
        match self.page_table[(paddr >> PAGE_SHIFT) as usize] {
            0 => None,
            slot => Some(slot as usize - 1),
        }
    }

    /// Canonical page of a memory-backed address (mirrors fold onto the base)
    fn canonical_page(&self, paddr: u32) -> Option<usize> {
        let region = self.region_at(paddr)?;
        if !region.kind().is_memory() {
            return None;
        }
        let canonical = region.base() + region.offset_of(paddr & PHYS_MASK);
        Some((canonical >> PAGE_SHIFT) as usize)
    }

    // === Devices ===

    /// Attach a device; map its registers with [`MemoryRegion::device`]
    pub fn attach_device(&mut self, device: Box<dyn Device>) -> DeviceId {
        let id = DeviceId(self.devices.len());
        log::debug!("Attached device '{}' as {:?}", device.name(), id);
        self.devices.push(device);
        id
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// Attached devices in attach order
    pub fn devices(&self) -> impl Iterator<Item = &dyn Device> {
        self.devices.iter().map(|d| d.as_ref())
    }

    pub(crate) fn devices_mut(&mut self) -> &mut [Box<dyn Device>] {
        &mut self.devices
    }

    /// Concrete view of an attached device
    pub fn device<T: Device>(&self, id: DeviceId) -> Option<&T> {
        let device: &dyn Device = self.devices.get(id.0)?.as_ref();
        (device as &dyn Any).downcast_ref::<T>()
    }

    /// Mutable concrete view of an attached device
    pub fn device_mut<T: Device>(&mut self, id: DeviceId) -> Option<&mut T> {
        let device: &mut dyn Device = self.devices.get_mut(id.0)?.as_mut();
        (device as &mut dyn Any).downcast_mut::<T>()
    }

    /// First attached device of type `T`
    pub fn find_device_mut<T: Device>(&mut self) -> Option<&mut T> {
        self.devices.iter_mut().find_map(|device| {
            let device: &mut dyn Device = device.as_mut();
            (device as &mut dyn Any).downcast_mut::<T>()
        })
    }

    /// Let every device arm its initial events
    pub(crate) fn start_devices(&mut self) {
        for (index, device) in self.devices.iter_mut().enumerate() {
            let mut ctx = IoContext::new(self.now, DeviceId(index), &mut self.irq, &mut self.requests);
            device.start(&mut ctx);
        }
    }

    /// Reset the interrupt controller and every device
    pub(crate) fn reset_devices(&mut self, hard: bool) {
        self.irq.reset();
        for device in &mut self.devices {
            device.reset(hard);
        }
        self.requests.clear();
    }

    pub fn irq(&self) -> &InterruptController {
        &self.irq
    }

    pub fn irq_mut(&mut self) -> &mut InterruptController {
        &mut self.irq
    }

    /// Hardware interrupt line into the CPU
    #[inline(always)]
    pub fn interrupt_pending(&self) -> bool {
        self.irq.is_pending()
    }

    /// Set the cycle reported to device handlers
    #[inline(always)]
    pub(crate) fn set_now(&mut self, now: Cycle) {
        self.now = now;
    }

    /// Number of device register accesses so far
    #[inline(always)]
    pub fn io_accesses(&self) -> u64 {
        self.io_accesses
    }

    /// Drain scheduler requests queued by device handlers
    pub fn take_requests(&mut self) -> Vec<EventRequest> {
        std::mem::take(&mut self.requests)
    }

    fn device_read(&mut self, id: DeviceId, offset: u32, width: AccessWidth) -> u64 {
        self.io_accesses += 1;
        let Some(device) = self.devices.get_mut(id.0) else {
            return OPEN_BUS & width.mask();
        };
        let mut ctx = IoContext::new(self.now, id, &mut self.irq, &mut self.requests);
        match width {
            AccessWidth::Byte => device.read_register8(offset, &mut ctx) as u64,
            AccessWidth::Half => device.read_register16(offset, &mut ctx) as u64,
            AccessWidth::Word => device.read_register(offset, &mut ctx) as u64,
            AccessWidth::Double => {
                let lo = device.read_register(offset, &mut ctx) as u64;
                let hi = device.read_register(offset + 4, &mut ctx) as u64;
                lo | (hi << 32)
            }
        }
    }

    fn device_write(&mut self, id: DeviceId, offset: u32, width: AccessWidth, value: u64) {
        self.io_accesses += 1;
        let Some(device) = self.devices.get_mut(id.0) else {
            return;
        };
        let mut ctx = IoContext::new(self.now, id, &mut self.irq, &mut self.requests);
        match width {
            AccessWidth::Byte => device.write_register8(offset, value as u8, &mut ctx),
            AccessWidth::Half => device.write_register16(offset, value as u16, &mut ctx),
            AccessWidth::Word => device.write_register(offset, value as u32, &mut ctx),
            AccessWidth::Double => {
                device.write_register(offset, value as u32, &mut ctx);
                device.write_register(offset + 4, (value >> 32) as u32, &mut ctx);
            }
        }
    }

    fn interrupts_read(&mut self, offset: u32, width: AccessWidth) -> u64 {
        self.io_accesses += 1;
        let shift = (offset & 3) * 8;
        ((self.irq.read_register(offset & !3) >> shift) as u64) & width.mask()
    }

    fn interrupts_write(&mut self, offset: u32, width: AccessWidth, value: u64) {
        self.io_accesses += 1;
        let aligned = offset & !3;
        let shift = (offset & 3) * 8;
        let bits = ((value & width.mask()) as u32) << shift;
        if aligned == I_STAT {
            // Only the written lanes can acknowledge anything
            self.irq.write_register(aligned, bits);
        } else {
            let lane = (width.mask() as u32) << shift;
            let current = self.irq.read_register(aligned);
            self.irq.write_register(aligned, (current & !lane) | bits);
        }
    }

    // === Access ===

    /// Read `width` bytes at a physical address
    ///
    /// The upper three address bits are ignored and the address is aligned
    /// down to the access width.
    pub fn read(&mut self, paddr: u32, width: AccessWidth) -> u64 {
        let paddr = paddr & PHYS_MASK & !(width.bytes() - 1);
        let Some(index) = self.slot_of(paddr) else {
            log::trace!("Open bus read at 0x{:08X}", paddr);
            return OPEN_BUS & width.mask();
        };
        let Some(region) = self.regions[index].as_ref() else {
            return OPEN_BUS & width.mask();
        };
        if !region.accepts(width) {
            log::trace!("{:?} read not accepted by '{}'", width, region.name());
            return OPEN_BUS & width.mask();
        }

        let offset = region.offset_of(paddr);
        match region.kind() {
            RegionKind::Ram | RegionKind::Rom | RegionKind::Flash => {
                region.read_backing(offset, width)
            }
            RegionKind::Device(id) => self.device_read(id, offset, width),
            RegionKind::Interrupts => self.interrupts_read(offset, width),
        }
    }

    /// Write `width` bytes at a physical address
    ///
    /// Writes to unmapped space, to read-only memory, or with a width the
    /// region does not accept are dropped.
    pub fn write(&mut self, paddr: u32, width: AccessWidth, value: u64) {
        let paddr = paddr & PHYS_MASK & !(width.bytes() - 1);
        let Some(index) = self.slot_of(paddr) else {
            log::trace!("Dropped write to unmapped 0x{:08X}", paddr);
            return;
        };
        let Some(region) = self.regions[index].as_ref() else {
            return;
        };
        if !region.accepts(width) {
            log::trace!("{:?} write not accepted by '{}'", width, region.name());
            return;
        }

        let offset = region.offset_of(paddr);
        let canonical = ((region.base() + offset) >> PAGE_SHIFT) as usize;
        match region.kind() {
            RegionKind::Ram | RegionKind::Flash => {
                self.note_write(canonical);
                if let Some(region) = self.regions[index].as_mut() {
                    region.write_backing(offset, width, value);
                }
            }
            RegionKind::Rom => {
                log::debug!("Dropped write to read-only 0x{:08X}", paddr);
            }
            RegionKind::Device(id) => self.device_write(id, offset, width, value),
            RegionKind::Interrupts => self.interrupts_write(offset, width, value),
        }
    }

    #[inline(always)]
    fn note_write(&mut self, page: usize) {
        let state = &mut self.page_state[page];
        if state.is_empty() {
            return;
        }
        if state.contains(PageState::PROTECTED) {
            state.remove(PageState::PROTECTED);
            state.insert(PageState::DIRTY);
            log::trace!("Write trap on page 0x{:08X}", (page as u32) << PAGE_SHIFT);
        }
        if state.contains(PageState::CODE) {
            self.generations[page] = self.generations[page].wrapping_add(1);
        }
    }

    pub fn read8(&mut self, paddr: u32) -> u8 {
        self.read(paddr, AccessWidth::Byte) as u8
    }

    pub fn read16(&mut self, paddr: u32) -> u16 {
        self.read(paddr, AccessWidth::Half) as u16
    }

    pub fn read32(&mut self, paddr: u32) -> u32 {
        self.read(paddr, AccessWidth::Word) as u32
    }

    pub fn read64(&mut self, paddr: u32) -> u64 {
        self.read(paddr, AccessWidth::Double)
    }

    pub fn write8(&mut self, paddr: u32, value: u8) {
        self.write(paddr, AccessWidth::Byte, value as u64);
    }

    pub fn write16(&mut self, paddr: u32, value: u16) {
        self.write(paddr, AccessWidth::Half, value as u64);
    }

    pub fn write32(&mut self, paddr: u32, value: u32) {
        self.write(paddr, AccessWidth::Word, value as u64);
    }

    pub fn write64(&mut self, paddr: u32, value: u64) {
        self.write(paddr, AccessWidth::Double, value);
    }

    /// Side-effect free word read of memory-backed storage
    ///
    /// Returns `None` for device registers and unmapped space.
    pub fn peek32(&self, paddr: u32) -> Option<u32> {
        let paddr = paddr & PHYS_MASK & !3;
        let region = self.region_at(paddr)?;
        if !region.kind().is_memory() {
            return None;
        }
        Some(region.read_backing(region.offset_of(paddr), AccessWidth::Word) as u32)
    }

    /// Instruction fetch: memory-backed storage that accepts word accesses
    #[inline(always)]
    pub fn fetch_code(&self, paddr: u32) -> Option<u32> {
        let index = self.slot_of(paddr & PHYS_MASK)?;
        let region = self.regions[index].as_ref()?;
        if !region.kind().is_memory() || !region.accepts(AccessWidth::Word) {
            return None;
        }
        let offset = region.offset_of(paddr & PHYS_MASK & !3);
        Some(region.read_backing(offset, AccessWidth::Word) as u32)
    }

    /// Copy host bytes into memory-backed storage
    ///
    /// Used for loading images; read-only regions are written too. The whole
    /// range is checked before anything is written.
    pub fn write_bytes(&mut self, paddr: u32, bytes: &[u8]) -> Result<()> {
        let paddr = paddr & PHYS_MASK;
        let out_of_range = || EmulatorError::ImageOutOfRange {
            address: paddr,
            size: bytes.len(),
        };
        if paddr as u64 + bytes.len() as u64 > PHYS_MASK as u64 + 1 {
            return Err(out_of_range());
        }

        let mut addr = paddr;
        let end = paddr as u64 + bytes.len() as u64;
        while (addr as u64) < end {
            if self.canonical_page(addr).is_none() {
                return Err(out_of_range());
            }
            addr = (addr & !(PAGE_SIZE - 1)).wrapping_add(PAGE_SIZE);
            if addr == 0 {
                break;
            }
        }

        for (i, &byte) in bytes.iter().enumerate() {
            let addr = paddr + i as u32;
            let Some(index) = self.slot_of(addr) else {
                return Err(out_of_range());
            };
            let Some(region) = self.regions[index].as_mut() else {
                return Err(out_of_range());
            };
            let offset = region.offset_of(addr);
            region.data[offset as usize] = byte;
            let page = ((region.base() + offset) >> PAGE_SHIFT) as usize;
            if self.page_state[page].contains(PageState::CODE) {
                self.generations[page] = self.generations[page].wrapping_add(1);
            }
        }
        Ok(())
    }

    /// Copy memory-backed storage out to the host
    pub fn read_bytes(&self, paddr: u32, len: usize) -> Option<Vec<u8>> {
        (0..len)
            .map(|i| {
                let addr = (paddr & PHYS_MASK).checked_add(i as u32)?;
                let region = self.region_at(addr)?;
                if !region.kind().is_memory() {
                    return None;
                }
                region.data.get(region.offset_of(addr) as usize).copied()
            })
            .collect()
    }

    /// Zero every RAM region (flash and ROM keep their contents)
    pub(crate) fn clear_ram(&mut self) {
        for region in self.regions.iter_mut().flatten() {
            if region.kind() == RegionKind::Ram {
                region.data.fill(0);
            }
        }
        for (page, state) in self.page_state.iter().enumerate() {
            if state.contains(PageState::CODE) {
                self.generations[page] = self.generations[page].wrapping_add(1);
            }
        }
    }

    // === Dirty tracking ===

    fn for_each_page(&mut self, addr: u32, size: u32, mut f: impl FnMut(&mut PageState)) {
        if size == 0 {
            return;
        }
        let start = addr & PHYS_MASK & !(PAGE_SIZE - 1);
        let end = (addr as u64 & PHYS_MASK as u64) + size as u64;
        let mut page_addr = start as u64;
        while page_addr < end && page_addr <= PHYS_MASK as u64 {
            if let Some(page) = self.canonical_page(page_addr as u32) {
                f(&mut self.page_state[page]);
            }
            page_addr += PAGE_SIZE as u64;
        }
    }

    /// Trap the next write to every page in the range
    pub fn protect_range(&mut self, addr: u32, size: u32) {
        self.for_each_page(addr, size, |state| state.insert(PageState::PROTECTED));
    }

    /// Stop trapping writes to the range
    pub fn unprotect_range(&mut self, addr: u32, size: u32) {
        self.for_each_page(addr, size, |state| state.remove(PageState::PROTECTED));
    }

    /// Whether the page holding `paddr` is write-protected
    pub fn is_protected(&self, paddr: u32) -> bool {
        self.canonical_page(paddr)
            .is_some_and(|page| self.page_state[page].contains(PageState::PROTECTED))
    }

    /// Pages written since they were protected, clearing the dirty marks
    ///
    /// Returned as canonical page base addresses in ascending order.
    pub fn take_dirty_pages(&mut self) -> Vec<u32> {
        let mut dirty = Vec::new();
        for (page, state) in self.page_state.iter_mut().enumerate() {
            if state.contains(PageState::DIRTY) {
                state.remove(PageState::DIRTY);
                dirty.push((page as u32) << PAGE_SHIFT);
            }
        }
        dirty
    }

    // === Code tracking ===

    /// Record that the page holding `paddr` contains translated code
    pub fn mark_code_page(&mut self, paddr: u32) {
        if let Some(page) = self.canonical_page(paddr) {
            self.page_state[page].insert(PageState::CODE);
        }
    }

    /// Forget every code mark
    pub fn clear_code_pages(&mut self) {
        for state in &mut self.page_state {
            state.remove(PageState::CODE);
        }
    }

    /// Write generation of the page holding `paddr`
    ///
    /// Bumped by every write to a page marked as code.
    #[inline(always)]
    pub fn page_generation(&self, paddr: u32) -> u32 {
        self.canonical_page(paddr)
            .map(|page| self.generations[page])
            .unwrap_or(0)
    }

    /// Canonical base address of the page holding `paddr`
    pub fn canonical_page_base(&self, paddr: u32) -> Option<u32> {
        self.canonical_page(paddr).map(|page| (page as u32) << PAGE_SHIFT)
    }
}

impl Default for AddressSpace {
    fn default() -> Self {
        Self::new()
    }
}

impl EventDispatcher for AddressSpace {
    fn dispatch_device(&mut self, device: DeviceId, tag: u32, now: Cycle) -> EventAction {
        self.now = now;
        let Some(handler) = self.devices.get_mut(device.0) else {
            log::warn!("Event for missing device {:?}", device);
            return EventAction::Continue;
        };
        let mut ctx = IoContext::new(now, device, &mut self.irq, &mut self.requests);
        handler.on_event(tag, &mut ctx)
    }

    fn take_requests(&mut self) -> Vec<EventRequest> {
        std::mem::take(&mut self.requests)
    }
}
