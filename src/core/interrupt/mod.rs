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

//! Interrupt Controller
//!
//! Collects interrupt requests from every device and drives the CPU's
//! hardware interrupt input (Cause.IP2).
//!
//! ## Registers
//!
//! - **I_STAT** (offset 0x0): Interrupt status register (R/W)
//!   - Reading returns current interrupt flags
//!   - Writing 1 to a bit acknowledges that interrupt (clears the bit)
//!
//! - **I_MASK** (offset 0x4): Interrupt mask register (R/W)
//!   - 1 = interrupt enabled, 0 = interrupt masked
//!
//! ## Interrupt Sources (Bit Positions)
//!
//! ```text
//! Bit  | Source   | Description
//! -----|----------|----------------------------------
//! 0    | VBLANK   | Frame boundary from the video clock
//! 1    | TIMER0   | Timer 0 target reached
//! 2    | TIMER1   | Timer 1 target reached
//! 3    | TIMER2   | Timer 2 target reached
//! 4    | AUDIO    | Audio FIFO drained
//! 5    | DISC     | Disc sector ready
//! 6    | INPUT    | Input latched
//! ```

use bincode::{Decode, Encode};

/// Interrupt request lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum IrqLine {
    VBlank = 0,
    Timer0 = 1,
    Timer1 = 2,
    Timer2 = 3,
    Audio = 4,
    Disc = 5,
    Input = 6,
}

impl IrqLine {
    /// Bit of this line in I_STAT / I_MASK
    #[inline(always)]
    pub const fn bit(self) -> u16 {
        1 << (self as u8)
    }

    /// Timer line for channel `n` (0-2)
    pub fn timer(n: usize) -> Self {
        match n {
            0 => IrqLine::Timer0,
            1 => IrqLine::Timer1,
            _ => IrqLine::Timer2,
        }
    }
}

/// Register offsets inside the controller window
pub const I_STAT: u32 = 0x0;
pub const I_MASK: u32 = 0x4;

/// Snapshot form of the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct InterruptState {
    pub status: u16,
    pub mask: u16,
}

/// Interrupt controller
///
/// # Example
///
/// ```
/// use vmcore::core::interrupt::{InterruptController, IrqLine};
///
/// let mut ic = InterruptController::new();
///
/// ic.request(IrqLine::VBlank);
/// assert!(!ic.is_pending()); // masked
///
/// ic.write_mask(IrqLine::VBlank.bit() as u32);
/// assert!(ic.is_pending());
///
/// // Acknowledge (write 1 to clear)
/// ic.write_status(IrqLine::VBlank.bit() as u32);
/// assert!(!ic.is_pending());
/// ```
#[derive(Debug, Default)]
pub struct InterruptController {
    status: u16,
    mask: u16,
}

impl InterruptController {
    /// Create a controller with all interrupts cleared and masked
    pub fn new() -> Self {
        Self { status: 0, mask: 0 }
    }

    /// Latch an interrupt request
    pub fn request(&mut self, line: IrqLine) {
        self.status |= line.bit();
        log::trace!("IRQ requested: {:?}, status=0x{:04X}", line, self.status);
    }

    /// Whether any unmasked interrupt is active
    #[inline(always)]
    pub fn is_pending(&self) -> bool {
        (self.status & self.mask) != 0
    }

    pub fn read_status(&self) -> u32 {
        self.status as u32
    }

    /// Write I_STAT: every 1 bit acknowledges the matching interrupt
    pub fn write_status(&mut self, value: u32) {
        self.status &= !(value as u16);
        log::trace!("IRQ acknowledged, status=0x{:04X}", self.status);
    }

    pub fn read_mask(&self) -> u32 {
        self.mask as u32
    }

    pub fn write_mask(&mut self, value: u32) {
        self.mask = value as u16;
    }

    pub(crate) fn read_register(&self, offset: u32) -> u32 {
        match offset & !3 {
            I_STAT => self.read_status(),
            I_MASK => self.read_mask(),
            _ => 0,
        }
    }

    pub(crate) fn write_register(&mut self, offset: u32, value: u32) {
        match offset & !3 {
            I_STAT => self.write_status(value),
            I_MASK => self.write_mask(value),
            _ => log::debug!("Write to unknown IRQ register +0x{:X}", offset),
        }
    }

    /// Clear status and mask
    pub fn reset(&mut self) {
        self.status = 0;
        self.mask = 0;
    }

    pub fn state(&self) -> InterruptState {
        InterruptState {
            status: self.status,
            mask: self.mask,
        }
    }

    pub fn restore(&mut self, state: InterruptState) {
        self.status = state.status;
        self.mask = state.mask;
    }
}

#[cfg(test)]
mod tests;
