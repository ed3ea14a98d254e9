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

//! Timer/Counter Implementation
//!
//! Three 16-bit counters driven by the CPU clock. Counters are not ticked:
//! each channel remembers the value it had at a reference cycle and derives
//! the current value from the elapsed time. The only scheduled work is one
//! event per channel at the next cycle where an interrupt condition is met.
//!
//! ## Register Layout
//!
//! Each timer has 3 registers at 16-byte intervals:
//! - `0x1F001000 + (n * 0x10)`: Counter value (R/W)
//! - `0x1F001004 + (n * 0x10)`: Mode register (R/W)
//! - `0x1F001008 + (n * 0x10)`: Target value (R/W)
//!
//! ## Mode Register Format
//!
//! ```text
//! 12:    Reached max value (0xFFFF) - Read-only, reset on read
//! 11:    Reached target value - Read-only, reset on read
//! 10:    IRQ flag - Read-only, cleared by a mode write
//! 8:     Clock source (0 = system clock, 1 = system clock / 8)
//! 6:     IRQ repeat mode (0=one-shot, 1=repeat)
//! 5:     IRQ on max value (0xFFFF)
//! 4:     IRQ on target
//! 3:     Reset counter to 0 when target reached
//! ```

use bincode::{Decode, Encode};

use crate::core::interrupt::IrqLine;
use crate::core::memory::{decode_device_state, encode_device_state, Device, IoContext};
use crate::core::timing::{Cycle, EventAction};

#[cfg(test)]
mod tests;

/// Number of timer channels
pub const CHANNELS: usize = 3;

const RESET_ON_TARGET: u16 = 1 << 3;
const IRQ_ON_TARGET: u16 = 1 << 4;
const IRQ_ON_MAX: u16 = 1 << 5;
const IRQ_REPEAT: u16 = 1 << 6;
const CLOCK_DIV8: u16 = 1 << 8;
const IRQ_FLAG: u16 = 1 << 10;
const REACHED_TARGET: u16 = 1 << 11;
const REACHED_MAX: u16 = 1 << 12;

/// Mode bits the guest can write
const MODE_WRITABLE: u16 = 0x017F;

/// Counter period without reset-on-target
const WRAP: u32 = 0x1_0000;

/// A single timer channel
#[derive(Debug, Clone, Default, PartialEq, Eq, Encode, Decode)]
pub struct TimerChannel {
    /// Counter value at `base_cycle`
    counter: u16,

    /// Cycle the counter value was last synchronized at
    base_cycle: Cycle,

    mode: u16,

    target: u16,

    /// Read-only status bits (IRQ flag, reached target/max)
    flags: u16,
}

impl TimerChannel {
    pub fn new() -> Self {
        Self::default()
    }

    fn divider(&self) -> Cycle {
        if self.mode & CLOCK_DIV8 != 0 {
            8
        } else {
            1
        }
    }

    fn resets_on_target(&self) -> bool {
        self.mode & RESET_ON_TARGET != 0 && self.target != 0
    }

    /// Counter value after `ticks` increments from `counter`
    fn counter_after(&self, ticks: u64) -> u16 {
        let counter = self.counter as u64;
        let target = self.target as u64;
        if self.resets_on_target() {
            if counter < target {
                return ((counter + ticks) % target) as u16;
            }
            // Runs up to 0xFFFF and wraps before the target applies
            let to_wrap = WRAP as u64 - counter;
            if ticks < to_wrap {
                return (counter + ticks) as u16;
            }
            return ((ticks - to_wrap) % target) as u16;
        }
        ((counter + ticks) % WRAP as u64) as u16
    }

    /// Ticks until the counter next equals `value`, from `counter`
    fn ticks_until(&self, value: u16) -> Option<u64> {
        let counter = self.counter as u64;
        let value = value as u64;
        if self.resets_on_target() {
            let target = self.target as u64;
            if value == target {
                return Some(if counter < target {
                    target - counter
                } else {
                    WRAP as u64 - counter + target
                });
            }
            // Below the target the counter never gets past it
            if counter < target {
                return None;
            }
        }
        Some(if value > counter {
            value - counter
        } else {
            WRAP as u64 - counter + value
        })
    }

    /// Bring `counter` up to date with cycle `now`
    fn sync(&mut self, now: Cycle) {
        let divider = self.divider();
        let ticks = now.saturating_sub(self.base_cycle) / divider;
        self.counter = self.counter_after(ticks);
        self.base_cycle += ticks * divider;
    }

    /// Cycle of the next interrupt condition and which conditions it meets
    fn next_deadline(&self) -> Option<(Cycle, u16)> {
        let mut best: Option<(u64, u16)> = None;
        let mut consider = |ticks: Option<u64>, flag: u16| {
            if let Some(ticks) = ticks {
                best = match best {
                    Some((t, f)) if t == ticks => Some((t, f | flag)),
                    Some((t, f)) if t < ticks => Some((t, f)),
                    _ => Some((ticks, flag)),
                };
            }
        };
        if self.mode & IRQ_ON_TARGET != 0 {
            consider(self.ticks_until(self.target), REACHED_TARGET);
        }
        if self.mode & IRQ_ON_MAX != 0 {
            consider(self.ticks_until(0xFFFF), REACHED_MAX);
        }
        best.map(|(ticks, flags)| (self.base_cycle + ticks * self.divider(), flags))
    }

    /// Current counter value at cycle `now`
    pub fn read_counter(&mut self, now: Cycle) -> u16 {
        self.sync(now);
        self.counter
    }

    pub fn write_counter(&mut self, now: Cycle, value: u16) {
        self.sync(now);
        self.counter = value;
    }

    /// Reading the mode clears the reached flags
    pub fn read_mode(&mut self, now: Cycle) -> u16 {
        self.sync(now);
        let value = self.mode | self.flags;
        self.flags &= !(REACHED_TARGET | REACHED_MAX);
        value
    }

    /// Writing the mode restarts the counter and clears all flags
    pub fn write_mode(&mut self, now: Cycle, value: u16) {
        self.mode = value & MODE_WRITABLE;
        self.counter = 0;
        self.base_cycle = now;
        self.flags = 0;
        log::debug!(
            "Timer mode 0x{:04X}: target_irq={} max_irq={} div8={}",
            self.mode,
            self.mode & IRQ_ON_TARGET != 0,
            self.mode & IRQ_ON_MAX != 0,
            self.mode & CLOCK_DIV8 != 0
        );
    }

    pub fn read_target(&self) -> u16 {
        self.target
    }

    pub fn write_target(&mut self, now: Cycle, value: u16) {
        self.sync(now);
        self.target = value;
    }

    /// Whether the channel has raised its interrupt since the last mode write
    pub fn irq_pending(&self) -> bool {
        self.flags & IRQ_FLAG != 0
    }

    /// Serve a due interrupt condition; returns whether to raise the line
    fn expire(&mut self, now: Cycle) -> bool {
        let Some((deadline, reached)) = self.next_deadline() else {
            return false;
        };
        if deadline > now {
            return false;
        }
        self.sync(now);
        self.flags |= reached;

        let raise = self.flags & IRQ_FLAG == 0 || self.mode & IRQ_REPEAT != 0;
        self.flags |= IRQ_FLAG;
        raise
    }
}

/// Snapshot form of the timer block
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
struct TimersState {
    channels: Vec<TimerChannel>,
}

/// Timer block with three channels
///
/// Channel `n` owns scheduler event tag `n`.
///
/// # Example
///
/// ```
/// use vmcore::core::timer::Timers;
///
/// let timers = Timers::new();
/// assert_eq!(timers.channel(0).read_target(), 0);
/// ```
#[derive(Debug, Default)]
pub struct Timers {
    channels: [TimerChannel; CHANNELS],
}

impl Timers {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline(always)]
    pub fn channel(&self, index: usize) -> &TimerChannel {
        &self.channels[index]
    }

    /// Event names, indexed by channel
    pub const EVENT_NAMES: [&'static str; CHANNELS] = ["timer0", "timer1", "timer2"];

    /// Re-arm or cancel the channel's event after a register change
    fn reschedule(&self, index: usize, ctx: &mut IoContext) {
        match self.channels[index].next_deadline() {
            Some((deadline, _)) => {
                log::trace!("Timer {} next interrupt at cycle {}", index, deadline);
                ctx.schedule_at(index as u32, deadline)
            }
            None => ctx.cancel(index as u32),
        }
    }
}

impl Device for Timers {
    fn name(&self) -> &str {
        "timers"
    }

    fn read_register(&mut self, offset: u32, ctx: &mut IoContext) -> u32 {
        let index = (offset >> 4) as usize;
        let now = ctx.now();
        let Some(channel) = self.channels.get_mut(index) else {
            return 0;
        };
        match offset & 0xF {
            0x0 => channel.read_counter(now) as u32,
            0x4 => channel.read_mode(now) as u32,
            0x8 => channel.read_target() as u32,
            _ => 0,
        }
    }

    fn write_register(&mut self, offset: u32, value: u32, ctx: &mut IoContext) {
        let index = (offset >> 4) as usize;
        let now = ctx.now();
        let Some(channel) = self.channels.get_mut(index) else {
            log::debug!("Write to unknown timer register +0x{:X}", offset);
            return;
        };
        match offset & 0xF {
            0x0 => channel.write_counter(now, value as u16),
            0x4 => channel.write_mode(now, value as u16),
            0x8 => channel.write_target(now, value as u16),
            _ => return,
        }
        self.reschedule(index, ctx);
    }

    fn on_event(&mut self, tag: u32, ctx: &mut IoContext) -> EventAction {
        let index = tag as usize;
        let Some(channel) = self.channels.get_mut(index) else {
            return EventAction::Continue;
        };
        if channel.expire(ctx.now()) {
            log::trace!("Timer {} IRQ at cycle {}", index, ctx.now());
            ctx.raise_irq(IrqLine::timer(index));
        }
        self.reschedule(index, ctx);
        EventAction::Continue
    }

    fn reset(&mut self, _hard: bool) {
        self.channels = Default::default();
    }

    fn save_state(&self) -> Vec<u8> {
        encode_device_state(&TimersState {
            channels: self.channels.to_vec(),
        })
    }

    fn load_state(&mut self, data: &[u8]) -> std::result::Result<(), String> {
        let state: TimersState = decode_device_state(data)?;
        if state.channels.len() != CHANNELS {
            return Err(format!("expected {} channels", CHANNELS));
        }
        self.channels.clone_from_slice(&state.channels);
        Ok(())
    }
}
