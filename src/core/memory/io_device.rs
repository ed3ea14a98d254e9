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

//! Memory-mapped device interface
//!
//! Devices are attached to the [`AddressSpace`](super::AddressSpace) and mapped
//! through a [`MemoryRegion::device`](super::MemoryRegion::device) window. The
//! address space translates physical addresses to window-relative offsets and
//! routes every access of an accepted width to the device.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              Address Space                  │
//! ├─────────────────────────────────────────────┤
//! │  page_table[paddr >> 12] -> region          │
//! │                                             │
//! │  region.kind == Device(id) {                │
//! │    devices[id].read_register(offset, ctx)   │
//! │  }                                          │
//! └─────────────────────────────────────────────┘
//!           ▲                   ▲
//!           │                   │
//!    ┌──────┴──────┐    ┌──────┴──────┐
//!    │   Timers    │    │ Video clock │
//!    │  (Device)   │    │  (Device)   │
//!    └─────────────┘    └─────────────┘
//! ```
//!
//! Handlers never call back into the executor. Anything that must happen later
//! (a completion interrupt, a timer expiry) is requested through the
//! [`IoContext`] and picked up by the scheduler at the next instruction boundary.
//!
//! # Example
//!
//! ```
//! use vmcore::core::memory::{Device, IoContext};
//!
//! struct Latch {
//!     value: u32,
//! }
//!
//! impl Device for Latch {
//!     fn name(&self) -> &str {
//!         "latch"
//!     }
//!
//!     fn read_register(&mut self, _offset: u32, _ctx: &mut IoContext) -> u32 {
//!         self.value
//!     }
//!
//!     fn write_register(&mut self, _offset: u32, value: u32, _ctx: &mut IoContext) {
//!         self.value = value;
//!     }
//! }
//! ```

use std::any::Any;

use crate::core::interrupt::{InterruptController, IrqLine};
use crate::core::timing::{Cycle, EventAction, EventRequest, RequestKind};

/// Index of an attached device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(pub usize);

/// Side channel handed to device handlers
///
/// Gives access to the current cycle, the interrupt controller, and a queue of
/// scheduler requests tagged with the calling device.
pub struct IoContext<'a> {
    now: Cycle,
    device: DeviceId,
    irq: &'a mut InterruptController,
    requests: &'a mut Vec<EventRequest>,
}

impl<'a> IoContext<'a> {
    pub(crate) fn new(
        now: Cycle,
        device: DeviceId,
        irq: &'a mut InterruptController,
        requests: &'a mut Vec<EventRequest>,
    ) -> Self {
        Self {
            now,
            device,
            irq,
            requests,
        }
    }

    /// Current machine cycle
    ///
    /// Inside an event handler this is the event's deadline.
    pub fn now(&self) -> Cycle {
        self.now
    }

    /// Id of the device being served
    pub fn device(&self) -> DeviceId {
        self.device
    }

    /// Assert an interrupt line
    pub fn raise_irq(&mut self, line: IrqLine) {
        self.irq.request(line);
    }

    /// Schedule this device's event `tag` to fire `delay` cycles from now
    ///
    /// Replaces any pending instance of the same event.
    pub fn schedule(&mut self, tag: u32, delay: Cycle) {
        let deadline = self.now.saturating_add(delay);
        self.schedule_at(tag, deadline);
    }

    /// Schedule this device's event `tag` at an absolute cycle
    pub fn schedule_at(&mut self, tag: u32, deadline: Cycle) {
        self.requests.push(EventRequest {
            device: self.device,
            tag,
            kind: RequestKind::Schedule(deadline),
        });
    }

    /// Cancel this device's event `tag`
    pub fn cancel(&mut self, tag: u32) {
        self.requests.push(EventRequest {
            device: self.device,
            tag,
            kind: RequestKind::Cancel,
        });
    }
}

/// Trait for memory-mapped devices
///
/// Devices implement the 32-bit register accessors. The 8-bit and 16-bit
/// variants default to read-modify-write on the containing word.
///
/// # Register Access
///
/// Offsets are relative to the start of the device's mapped region:
///
/// - Device window: `0x1F001000 - 0x1F001FFF`
/// - Physical address: `0x1F001014`
/// - Offset passed to device: `0x14`
///
/// # Thread Safety
///
/// Devices must be `Send` so the whole machine can be moved into an emulation
/// thread. They are never accessed from two threads at once.
pub trait Device: Any + Send {
    /// Unique device name, used to match devices in save states
    fn name(&self) -> &str;

    /// Read a 32-bit register
    fn read_register(&mut self, offset: u32, ctx: &mut IoContext) -> u32;

    /// Write a 32-bit register
    fn write_register(&mut self, offset: u32, value: u32, ctx: &mut IoContext);

    /// Read a 16-bit register
    ///
    /// Default implementation extracts the halfword from the containing word.
    fn read_register16(&mut self, offset: u32, ctx: &mut IoContext) -> u16 {
        let word = self.read_register(offset & !3, ctx);
        let shift = (offset & 2) * 8;
        (word >> shift) as u16
    }

    /// Write a 16-bit register
    ///
    /// Default implementation performs a read-modify-write of the containing word.
    fn write_register16(&mut self, offset: u32, value: u16, ctx: &mut IoContext) {
        let aligned = offset & !3;
        let shift = (offset & 2) * 8;
        let word = self.read_register(aligned, ctx);
        let merged = (word & !(0xFFFF << shift)) | ((value as u32) << shift);
        self.write_register(aligned, merged, ctx);
    }

    /// Read an 8-bit register
    fn read_register8(&mut self, offset: u32, ctx: &mut IoContext) -> u8 {
        let word = self.read_register(offset & !3, ctx);
        let shift = (offset & 3) * 8;
        (word >> shift) as u8
    }

    /// Write an 8-bit register
    fn write_register8(&mut self, offset: u32, value: u8, ctx: &mut IoContext) {
        let aligned = offset & !3;
        let shift = (offset & 3) * 8;
        let word = self.read_register(aligned, ctx);
        let merged = (word & !(0xFF << shift)) | ((value as u32) << shift);
        self.write_register(aligned, merged, ctx);
    }

    /// Arm initial events after attach or reset
    fn start(&mut self, _ctx: &mut IoContext) {}

    /// Handle one of this device's scheduled events
    fn on_event(&mut self, _tag: u32, _ctx: &mut IoContext) -> EventAction {
        EventAction::Continue
    }

    /// Return to power-on (`hard`) or soft-reset state
    fn reset(&mut self, _hard: bool) {}

    /// Serialize device state for snapshots
    fn save_state(&self) -> Vec<u8> {
        Vec::new()
    }

    /// Restore device state produced by [`Device::save_state`]
    fn load_state(&mut self, data: &[u8]) -> std::result::Result<(), String> {
        if data.is_empty() {
            Ok(())
        } else {
            Err(format!("unexpected {} bytes of state", data.len()))
        }
    }
}

/// Encode a device state struct with the snapshot codec
pub fn encode_device_state<T: bincode::Encode>(state: &T) -> Vec<u8> {
    // Plain structs of integers and vectors cannot fail to encode.
    bincode::encode_to_vec(state, bincode::config::standard()).unwrap_or_default()
}

/// Decode a device state struct, rejecting trailing bytes
pub fn decode_device_state<T: bincode::Decode<()>>(data: &[u8]) -> std::result::Result<T, String> {
    let (state, consumed): (T, usize) =
        bincode::decode_from_slice(data, bincode::config::standard()).map_err(|e| e.to_string())?;
    if consumed != data.len() {
        return Err(format!(
            "state is {} bytes but {} were consumed",
            data.len(),
            consumed
        ));
    }
    Ok(state)
}
