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

//! Audio FIFO
//!
//! The guest pushes stereo sample pairs into a FIFO. A periodic sample-clock
//! event drains the FIFO into the host [`AudioSink`] in batches and raises
//! the AUDIO interrupt so the guest can refill it.
//!
//! ## Registers
//!
//! - `+0x0`: Data (write-only). Low halfword left, high halfword right
//! - `+0x4`: Status. Bits 0-15 fill level in frames, bit 16 overflow
//!   (cleared on read)
//! - `+0x8`: Control, bit 0 enables the AUDIO interrupt

use std::collections::VecDeque;

use bincode::{Decode, Encode};

use crate::core::interrupt::IrqLine;
use crate::core::memory::{decode_device_state, encode_device_state, Device, IoContext};
use crate::core::system::host::AudioSink;
use crate::core::timing::{Cycle, EventAction};

/// Scheduler tag of the drain event
pub const DRAIN_EVENT: u32 = 0;

/// Scheduler name of the drain event
pub const DRAIN_EVENT_NAME: &str = "audio.drain";

/// FIFO capacity in stereo frames
pub const FIFO_CAPACITY: usize = 4096;

const REG_DATA: u32 = 0x0;
const REG_STATUS: u32 = 0x4;
const REG_CONTROL: u32 = 0x8;

const STATUS_OVERFLOW: u32 = 1 << 16;
const CONTROL_IRQ: u32 = 1 << 0;

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
struct FifoState {
    fifo: Vec<(i16, i16)>,
    control: u32,
    overflow: bool,
}

/// Sample FIFO device
pub struct AudioFifo {
    batch_cycles: Cycle,
    fifo: VecDeque<(i16, i16)>,
    control: u32,
    overflow: bool,
    sink: Box<dyn AudioSink>,
    /// Reused interleave buffer
    scratch: Vec<i16>,
}

impl AudioFifo {
    /// FIFO drained every \`batch_cycles\` into \`sink\`
    pub fn new(batch_cycles: Cycle, sink: Box<dyn AudioSink>) -> Self {
        Self {
            batch_cycles,
            fifo: VecDeque::with_capacity(FIFO_CAPACITY),
            control: 0,
            overflow: false,
            sink,
            scratch: Vec::with_capacity(FIFO_CAPACITY * 2),
        }
    }

    pub fn set_sink(&mut self, sink: Box<dyn AudioSink>) {
        self.sink = sink;
    }

    /// Queued frames
    pub fn len(&self) -> usize {
        self.fifo.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fifo.is_empty()
    }

    fn push(&mut self, value: u32) {
        if self.fifo.len() >= FIFO_CAPACITY {
            self.overflow = true;
            log::warn!("Audio FIFO overflow, sample dropped");
            return;
        }
        self.fifo.push_back((value as u16 as i16, (value >> 16) as u16 as i16));
    }

    fn drain(&mut self) {
        if self.fifo.is_empty() {
            return;
        }
        self.scratch.clear();
        for (left, right) in self.fifo.drain(..) {
            self.scratch.push(left);
            self.scratch.push(right);
        }
        self.sink.push_samples(&self.scratch);
    }
}

impl Device for AudioFifo {
    fn name(&self) -> &str {
        "audio"
    }

    fn read_register(&mut self, offset: u32, _ctx: &mut IoContext) -> u32 {
        match offset {
            REG_STATUS => {
                let mut status = self.fifo.len() as u32;
                if std::mem::take(&mut self.overflow) {
                    status |= STATUS_OVERFLOW;
                }
                status
            }
            REG_CONTROL => self.control,
            _ => 0,
        }
    }

    fn write_register(&mut self, offset: u32, value: u32, _ctx: &mut IoContext) {
        match offset {
            REG_DATA => self.push(value),
            REG_CONTROL => self.control = value & CONTROL_IRQ,
            _ => log::debug!("Ignored audio write +0x{:X} = 0x{:08X}", offset, value),
        }
    }

    fn start(&mut self, ctx: &mut IoContext) {
        ctx.schedule(DRAIN_EVENT, self.batch_cycles);
    }

    fn on_event(&mut self, _tag: u32, ctx: &mut IoContext) -> EventAction {
        self.drain();
        if self.control & CONTROL_IRQ != 0 {
            ctx.raise_irq(IrqLine::Audio);
        }
        EventAction::Continue
    }

    fn reset(&mut self, _hard: bool) {
        self.fifo.clear();
        self.control = 0;
        self.overflow = false;
    }

    fn save_state(&self) -> Vec<u8> {
        encode_device_state(&FifoState {
            fifo: self.fifo.iter().copied().collect(),
            control: self.control,
            overflow: self.overflow,
        })
    }

    fn load_state(&mut self, data: &[u8]) -> std::result::Result<(), String> {
        let state: FifoState = decode_device_state(data)?;
        if state.fifo.len() > FIFO_CAPACITY {
            return Err(format!("{} queued frames exceed the FIFO", state.fifo.len()));
        }
        self.fifo = state.fifo.into();
        self.control = state.control;
        self.overflow = state.overflow;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::system::host::{BufferedAudioSink, NullAudioSink};
    use crate::core::testing::DeviceBench;

    const BATCH: Cycle = 500;

    fn bench() -> (DeviceBench, BufferedAudioSink) {
        let sink = BufferedAudioSink::new();
        let bench = DeviceBench::new(
            Box::new(AudioFifo::new(BATCH, Box::new(sink.clone()))),
            &[(DRAIN_EVENT_NAME, DRAIN_EVENT, Some(BATCH))],
        );
        (bench, sink)
    }

    fn pair(left: i16, right: i16) -> u32 {
        (left as u16 as u32) | ((right as u16 as u32) << 16)
    }

    #[test]
    fn test_samples_reach_sink_on_drain() {
        let (mut bench, sink) = bench();
        bench.write(REG_DATA, pair(100, -100));
        bench.write(REG_DATA, pair(-32768, 32767));
        assert_eq!(bench.read(REG_STATUS), 2);

        bench.advance_to(BATCH - 1);
        assert_eq!(sink.buffer_level(), 0);

        bench.advance_to(BATCH);
        assert_eq!(sink.take_samples(), vec![(100, -100), (-32768, 32767)]);
        assert_eq!(bench.read(REG_STATUS), 0);
    }

    #[test]
    fn test_drain_irq() {
        let (mut bench, _sink) = bench();
        bench.advance_to(BATCH);
        assert_eq!(bench.irq_status(), 0);

        bench.write(REG_CONTROL, CONTROL_IRQ);
        bench.advance_to(BATCH * 2);
        assert_eq!(bench.irq_status(), IrqLine::Audio.bit() as u32);
    }

    #[test]
    fn test_overflow_flag() {
        let (mut bench, _sink) = bench();
        for i in 0..=FIFO_CAPACITY {
            bench.write(REG_DATA, i as u32);
        }
        let status = bench.read(REG_STATUS);
        assert_eq!(status & 0xFFFF, FIFO_CAPACITY as u32);
        assert_ne!(status & STATUS_OVERFLOW, 0);
        assert_eq!(bench.read(REG_STATUS) & STATUS_OVERFLOW, 0);
    }

    #[test]
    fn test_state_round_trip() {
        let (mut bench, _sink) = bench();
        bench.write(REG_DATA, pair(1, 2));
        bench.write(REG_CONTROL, CONTROL_IRQ);

        let saved = bench.device::<AudioFifo>().save_state();
        let mut fifo = AudioFifo::new(BATCH, Box::new(NullAudioSink));
        fifo.load_state(&saved).unwrap();
        assert_eq!(fifo.len(), 1);
        assert_eq!(fifo.control, CONTROL_IRQ);
    }
}
