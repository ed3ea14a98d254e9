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

//! Command execution and read completion

use super::{command, status, DiscPort, READ_EVENT};
use crate::core::interrupt::IrqLine;
use crate::core::memory::IoContext;
use crate::core::system::host::SECTOR_SIZE;

impl DiscPort {
    pub(super) fn execute_command(&mut self, command: u32, ctx: &mut IoContext) {
        log::trace!("Disc command 0x{:02X} at cycle {}", command, ctx.now());
        match command {
            command::READ => self.start_read(ctx),
            command::ABORT => {
                self.pending_lba = None;
                self.data.clear();
                self.data_index = 0;
                self.status &= !(status::BUSY | status::DATA_READY | status::ERROR);
                ctx.cancel(READ_EVENT);
            }
            _ => log::warn!("Unknown disc command 0x{:02X}", command),
        }
    }

    fn start_read(&mut self, ctx: &mut IoContext) {
        if self.status & status::BUSY != 0 {
            log::warn!("Disc read issued while busy, ignored");
            return;
        }
        self.status &= !status::ERROR;
        if self.source.is_none() {
            self.status |= status::ERROR | status::NO_DISC;
            ctx.raise_irq(IrqLine::Disc);
            return;
        }
        self.status |= status::BUSY;
        self.pending_lba = Some(self.lba);
        ctx.schedule(READ_EVENT, self.read_cycles);
    }

    pub(super) fn complete_read(&mut self, ctx: &mut IoContext) {
        let Some(lba) = self.pending_lba.take() else {
            return;
        };
        self.status &= !status::BUSY;

        let mut sector = [0u8; SECTOR_SIZE];
        let result = match self.source.as_mut() {
            Some(source) => source.read_sector(lba, &mut sector),
            None => Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no disc inserted",
            )),
        };

        match result {
            Ok(()) => {
                self.data.clear();
                self.data.extend_from_slice(&sector);
                self.data_index = 0;
                self.status |= status::DATA_READY;
                self.lba = lba.wrapping_add(1);
                log::trace!("Disc sector {} ready at cycle {}", lba, ctx.now());
            }
            Err(e) => {
                log::warn!("Disc read of sector {} failed: {}", lba, e);
                self.status |= status::ERROR;
            }
        }
        ctx.raise_irq(IrqLine::Disc);
    }
}
