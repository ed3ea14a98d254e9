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

//! Video clock
//!
//! Rendering happens outside the core. What the guest and the host still need
//! is the frame cadence: a periodic frame event that raises VBLANK, counts
//! frames and tells the frontend a frame boundary was crossed.
//!
//! ## Registers
//!
//! - `+0x0`: Frame counter (read-only, low 32 bits)
//! - `+0x4`: Frame period in cycles (read-only)
//! - `+0x8`: Control, bit 0 enables the VBLANK interrupt

use std::fmt;

use bincode::{Decode, Encode};

use crate::core::interrupt::IrqLine;
use crate::core::memory::{decode_device_state, encode_device_state, Device, IoContext};
use crate::core::timing::{Cycle, EventAction};

/// Scheduler tag of the frame event
pub const FRAME_EVENT: u32 = 0;

/// Scheduler name of the frame event
pub const FRAME_EVENT_NAME: &str = "video.frame";

const REG_FRAME_COUNT: u32 = 0x0;
const REG_FRAME_PERIOD: u32 = 0x4;
const REG_CONTROL: u32 = 0x8;

const CONTROL_VBLANK_IRQ: u32 = 1 << 0;

/// Passed to the frame subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    /// Frames completed so far, this one included
    pub frame: u64,
    /// Cycle of the frame boundary
    pub cycle: Cycle,
}

/// Frame-boundary subscriber
pub type FrameCallback = Box<dyn FnMut(FrameInfo) + Send>;

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
struct VideoState {
    frames: u64,
    control: u32,
}

/// Frame clock device
pub struct VideoClock {
    period: Cycle,
    frames: u64,
    control: u32,
    yield_on_frame: bool,
    /// Set when a frame event asked the executor to stop
    yielded: bool,
    on_frame: Option<FrameCallback>,
}

impl VideoClock {
    pub fn new(period: Cycle, yield_on_frame: bool) -> Self {
        Self {
            period,
            frames: 0,
            control: CONTROL_VBLANK_IRQ,
            yield_on_frame,
            yielded: false,
            on_frame: None,
        }
    }

    pub fn period(&self) -> Cycle {
        self.period
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Replace the frame subscriber
    pub fn set_on_frame(&mut self, callback: FrameCallback) {
        self.on_frame = Some(callback);
    }

    pub fn set_yield_on_frame(&mut self, enabled: bool) {
        self.yield_on_frame = enabled;
    }

    /// Whether the last stop was a frame yield; clears the flag
    pub fn take_yield(&mut self) -> bool {
        std::mem::take(&mut self.yielded)
    }
}

impl fmt::Debug for VideoClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VideoClock")
            .field("period", &self.period)
            .field("frames", &self.frames)
            .field("control", &self.control)
            .field("yield_on_frame", &self.yield_on_frame)
            .finish_non_exhaustive()
    }
}

impl Device for VideoClock {
    fn name(&self) -> &str {
        "video"
    }

    fn read_register(&mut self, offset: u32, _ctx: &mut IoContext) -> u32 {
        match offset {
            REG_FRAME_COUNT => self.frames as u32,
            REG_FRAME_PERIOD => self.period as u32,
            REG_CONTROL => self.control,
            _ => 0,
        }
    }

    fn write_register(&mut self, offset: u32, value: u32, _ctx: &mut IoContext) {
        match offset {
            REG_CONTROL => self.control = value & CONTROL_VBLANK_IRQ,
            _ => log::debug!("Ignored video write +0x{:X} = 0x{:08X}", offset, value),
        }
    }

    fn start(&mut self, ctx: &mut IoContext) {
        ctx.schedule(FRAME_EVENT, self.period);
    }

    fn on_event(&mut self, _tag: u32, ctx: &mut IoContext) -> EventAction {
        self.frames += 1;
        if self.control & CONTROL_VBLANK_IRQ != 0 {
            ctx.raise_irq(IrqLine::VBlank);
        }
        log::trace!("Frame {} at cycle {}", self.frames, ctx.now());

        let info = FrameInfo {
            frame: self.frames,
            cycle: ctx.now(),
        };
        if let Some(callback) = self.on_frame.as_mut() {
            callback(info);
        }

        if self.yield_on_frame {
            self.yielded = true;
            EventAction::Stop
        } else {
            EventAction::Continue
        }
    }

    fn reset(&mut self, _hard: bool) {
        self.frames = 0;
        self.control = CONTROL_VBLANK_IRQ;
        self.yielded = false;
    }

    fn save_state(&self) -> Vec<u8> {
        encode_device_state(&VideoState {
            frames: self.frames,
            control: self.control,
        })
    }

    fn load_state(&mut self, data: &[u8]) -> std::result::Result<(), String> {
        let state: VideoState = decode_device_state(data)?;
        self.frames = state.frames;
        self.control = state.control;
        self.yielded = false;
        Ok(())
    }
}
