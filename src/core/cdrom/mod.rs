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

//! Disc port
//!
//! Reads 2048-byte sectors from a host [`SectorSource`] into a data FIFO the
//! guest drains one word at a time. A read takes a fixed number of cycles,
//! modelled as a one-shot scheduler event; completion raises the DISC
//! interrupt.
//!
//! # Registers
//!
//! | Offset | Name    | Access | Description                         |
//! |--------|---------|--------|-------------------------------------|
//! | 0x0    | LBA     | R/W    | Sector to read next                 |
//! | 0x4    | COMMAND | W      | See [`command`]                     |
//! | 0x8    | STATUS  | R      | See [`status`]                      |
//! | 0xC    | DATA    | R      | Next FIFO word, little-endian       |
//! | 0x10   | SECTORS | R      | Sector count of the inserted disc   |
//!
//! # Example
//!
//! ```rust
//! use vmcore::core::cdrom::DiscPort;
//! use vmcore::core::system::host::MemorySectorSource;
//!
//! let mut port = DiscPort::new(1000);
//! port.insert_disc(Box::new(MemorySectorSource::new(vec![0; 4096])));
//! assert_eq!(port.sector_count(), 2);
//! ```

use bincode::{Decode, Encode};

use crate::core::memory::{decode_device_state, encode_device_state, Device, IoContext};
use crate::core::system::host::{SectorSource, SECTOR_SIZE};
use crate::core::timing::{Cycle, EventAction};

mod commands;
#[cfg(test)]
mod tests;

/// Scheduler tag of the read-completion event
pub const READ_EVENT: u32 = 0;

/// Scheduler name of the read-completion event
pub const READ_EVENT_NAME: &str = "disc.read";

const REG_LBA: u32 = 0x0;
const REG_COMMAND: u32 = 0x4;
const REG_STATUS: u32 = 0x8;
const REG_DATA: u32 = 0xC;
const REG_SECTORS: u32 = 0x10;

/// Command codes written to COMMAND
pub mod command {
    /// Read the sector at LBA, then advance LBA
    pub const READ: u32 = 0x01;
    /// Cancel a pending read and empty the FIFO
    pub const ABORT: u32 = 0x02;
}

/// STATUS bits
pub mod status {
    pub const BUSY: u32 = 1 << 0;
    pub const DATA_READY: u32 = 1 << 1;
    pub const ERROR: u32 = 1 << 2;
    pub const NO_DISC: u32 = 1 << 3;
}

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
struct PortState {
    lba: u32,
    status: u32,
    pending_lba: Option<u32>,
    data: Vec<u8>,
    data_index: usize,
}

/// Sector reader device
pub struct DiscPort {
    read_cycles: Cycle,
    source: Option<Box<dyn SectorSource>>,
    lba: u32,
    status: u32,
    /// Sector being read while BUSY
    pending_lba: Option<u32>,
    data: Vec<u8>,
    data_index: usize,
}

impl DiscPort {
    /// Port whose reads complete `read_cycles` after the command
    pub fn new(read_cycles: Cycle) -> Self {
        Self {
            read_cycles,
            source: None,
            lba: 0,
            status: status::NO_DISC,
            pending_lba: None,
            data: Vec::with_capacity(SECTOR_SIZE),
            data_index: 0,
        }
    }

    pub fn insert_disc(&mut self, source: Box<dyn SectorSource>) {
        log::info!("Disc inserted ({} sectors)", source.sector_count());
        self.source = Some(source);
        self.status &= !status::NO_DISC;
    }

    pub fn eject(&mut self) -> Option<Box<dyn SectorSource>> {
        self.status |= status::NO_DISC;
        self.source.take()
    }

    pub fn sector_count(&self) -> u32 {
        self.source.as_ref().map_or(0, |source| source.sector_count())
    }

    pub fn status(&self) -> u32 {
        self.status
    }

    /// Bytes left in the data FIFO
    pub fn data_remaining(&self) -> usize {
        self.data.len() - self.data_index
    }

    fn pop_word(&mut self) -> u32 {
        let mut bytes = [0u8; 4];
        for byte in &mut bytes {
            if let Some(&value) = self.data.get(self.data_index) {
                *byte = value;
                self.data_index += 1;
            }
        }
        if self.data_remaining() == 0 {
            self.status &= !status::DATA_READY;
        }
        u32::from_le_bytes(bytes)
    }
}

impl std::fmt::Debug for DiscPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscPort")
            .field("lba", &self.lba)
            .field("status", &self.status)
            .field("pending_lba", &self.pending_lba)
            .field("data_remaining", &self.data_remaining())
            .finish_non_exhaustive()
    }
}

impl Device for DiscPort {
    fn name(&self) -> &str {
        "disc"
    }

    fn read_register(&mut self, offset: u32, _ctx: &mut IoContext) -> u32 {
        match offset {
            REG_LBA => self.lba,
            REG_STATUS => self.status,
            REG_DATA => self.pop_word(),
            REG_SECTORS => self.sector_count(),
            _ => 0,
        }
    }

    fn write_register(&mut self, offset: u32, value: u32, ctx: &mut IoContext) {
        match offset {
            REG_LBA => self.lba = value,
            REG_COMMAND => self.execute_command(value, ctx),
            _ => log::debug!("Ignored disc write +0x{:X} = 0x{:08X}", offset, value),
        }
    }

    fn on_event(&mut self, _tag: u32, ctx: &mut IoContext) -> EventAction {
        self.complete_read(ctx);
        EventAction::Continue
    }

    fn reset(&mut self, _hard: bool) {
        self.lba = 0;
        self.pending_lba = None;
        self.data.clear();
        self.data_index = 0;
        self.status = if self.source.is_some() {
            0
        } else {
            status::NO_DISC
        };
    }

    fn save_state(&self) -> Vec<u8> {
        encode_device_state(&PortState {
            lba: self.lba,
            status: self.status,
            pending_lba: self.pending_lba,
            data: self.data.clone(),
            data_index: self.data_index,
        })
    }

    fn load_state(&mut self, data: &[u8]) -> std::result::Result<(), String> {
        let state: PortState = decode_device_state(data)?;
        if state.data.len() > SECTOR_SIZE || state.data_index > state.data.len() {
            return Err("data FIFO out of range".to_string());
        }
        self.lba = state.lba;
        self.pending_lba = state.pending_lba;
        self.data = state.data;
        self.data_index = state.data_index;
        // Disc presence belongs to the host, not the snapshot
        self.status = state.status & !status::NO_DISC;
        if self.source.is_none() {
            self.status |= status::NO_DISC;
        }
        Ok(())
    }
}
