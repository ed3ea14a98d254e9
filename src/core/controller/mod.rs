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

//! Input port
//!
//! The frontend stages button and analog state through an [`InputHandle`]
//! from any thread. The guest only sees that state after it writes the latch
//! register, so input enters the machine at a deterministic point in guest
//! time.
//!
//! ## Registers
//!
//! - `+0x0`: Latch. A write copies the staged input; a read returns the
//!   number of latches so far
//! - `+0x4`: Buttons (active-low, bit = 0 means pressed)
//! - `+0x8`: Analog axes, one byte each (RX, RY, LX, LY)
//! - `+0xC`: Control, bit 0 raises the INPUT interrupt on latch

use std::sync::{Arc, Mutex, MutexGuard};

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

use crate::core::interrupt::IrqLine;
use crate::core::memory::{decode_device_state, encode_device_state, Device, IoContext};

#[cfg(test)]
mod tests;

/// Button bits of the digital pad
pub mod buttons {
    pub const SELECT: u32 = 1 << 0;
    pub const L3: u32 = 1 << 1;
    pub const R3: u32 = 1 << 2;
    pub const START: u32 = 1 << 3;
    pub const UP: u32 = 1 << 4;
    pub const RIGHT: u32 = 1 << 5;
    pub const DOWN: u32 = 1 << 6;
    pub const LEFT: u32 = 1 << 7;
    pub const L2: u32 = 1 << 8;
    pub const R2: u32 = 1 << 9;
    pub const L1: u32 = 1 << 10;
    pub const R1: u32 = 1 << 11;
    pub const TRIANGLE: u32 = 1 << 12;
    pub const CIRCLE: u32 = 1 << 13;
    pub const CROSS: u32 = 1 << 14;
    pub const SQUARE: u32 = 1 << 15;

    /// All buttons released
    pub const NONE_PRESSED: u32 = 0xFFFF;
}

const REG_LATCH: u32 = 0x0;
const REG_BUTTONS: u32 = 0x4;
const REG_ANALOG: u32 = 0x8;
const REG_CONTROL: u32 = 0xC;

const CONTROL_LATCH_IRQ: u32 = 1 << 0;

/// Analog stick centre
const ANALOG_CENTER: u8 = 0x80;

/// Pad state as the guest sees it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct InputState {
    pub buttons: u32,
    pub analog: [u8; 4],
}

impl Default for InputState {
    fn default() -> Self {
        Self {
            buttons: buttons::NONE_PRESSED,
            analog: [ANALOG_CENTER; 4],
        }
    }
}

/// Shared staging area for host input
///
/// # Example
///
/// ```
/// use vmcore::core::controller::{buttons, InputHandle};
///
/// let input = InputHandle::new();
/// input.press_button(buttons::CROSS);
/// assert_eq!(input.get_buttons() & buttons::CROSS, 0);
/// ```
#[derive(Debug, Clone, Default)]
pub struct InputHandle {
    staged: Arc<Mutex<InputState>>,
}

impl InputHandle {
    pub fn new() -> Self {
        Self::default()
    }

    fn staged(&self) -> MutexGuard<'_, InputState> {
        self.staged
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn press_button(&self, button: u32) {
        self.staged().buttons &= !button;
    }

    pub fn release_button(&self, button: u32) {
        self.staged().buttons |= button;
    }

    pub fn set_button_state(&self, button: u32, pressed: bool) {
        if pressed {
            self.press_button(button);
        } else {
            self.release_button(button);
        }
    }

    pub fn get_buttons(&self) -> u32 {
        self.staged().buttons
    }

    /// Set one analog axis (0-3)
    pub fn set_axis(&self, axis: usize, value: u8) {
        if let Some(slot) = self.staged().analog.get_mut(axis) {
            *slot = value;
        }
    }

    pub fn snapshot(&self) -> InputState {
        *self.staged()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
struct PortState {
    latched: InputState,
    control: u32,
    latches: u32,
}

/// Memory-mapped input port
#[derive(Debug)]
pub struct InputPort {
    handle: InputHandle,
    latched: InputState,
    control: u32,
    latches: u32,
}

impl InputPort {
    pub fn new(handle: InputHandle) -> Self {
        Self {
            handle,
            latched: InputState::default(),
            control: 0,
            latches: 0,
        }
    }

    pub fn handle(&self) -> InputHandle {
        self.handle.clone()
    }

    /// State the guest currently sees
    pub fn latched(&self) -> InputState {
        self.latched
    }

    fn latch(&mut self, ctx: &mut IoContext) {
        self.latched = self.handle.snapshot();
        self.latches = self.latches.wrapping_add(1);
        log::trace!(
            "Input latched: buttons=0x{:04X} at cycle {}",
            self.latched.buttons,
            ctx.now()
        );
        if self.control & CONTROL_LATCH_IRQ != 0 {
            ctx.raise_irq(IrqLine::Input);
        }
    }
}

impl Device for InputPort {
    fn name(&self) -> &str {
        "input"
    }

    fn read_register(&mut self, offset: u32, _ctx: &mut IoContext) -> u32 {
        match offset {
            REG_LATCH => self.latches,
            REG_BUTTONS => self.latched.buttons,
            REG_ANALOG => u32::from_le_bytes(self.latched.analog),
            REG_CONTROL => self.control,
            _ => 0,
        }
    }

    fn write_register(&mut self, offset: u32, value: u32, ctx: &mut IoContext) {
        match offset {
            REG_LATCH => self.latch(ctx),
            REG_CONTROL => self.control = value & CONTROL_LATCH_IRQ,
            _ => log::debug!("Ignored input write +0x{:X} = 0x{:08X}", offset, value),
        }
    }

    fn reset(&mut self, _hard: bool) {
        self.latched = InputState::default();
        self.control = 0;
        self.latches = 0;
    }

    fn save_state(&self) -> Vec<u8> {
        encode_device_state(&PortState {
            latched: self.latched,
            control: self.control,
            latches: self.latches,
        })
    }

    fn load_state(&mut self, data: &[u8]) -> std::result::Result<(), String> {
        let state: PortState = decode_device_state(data)?;
        self.latched = state.latched;
        self.control = state.control;
        self.latches = state.latches;
        Ok(())
    }
}
