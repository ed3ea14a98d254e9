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

//! Shared fixtures for device unit tests

use crate::core::memory::{AddressSpace, Device, DeviceId, MemoryRegion};
use crate::core::timing::{Cycle, EventAction, Scheduler};

/// Where the device under test is mapped
pub(crate) const DEVICE_BASE: u32 = 0x1F00_1000;

/// One device wired to an address space and a scheduler
pub(crate) struct DeviceBench {
    pub bus: AddressSpace,
    pub scheduler: Scheduler,
    pub id: DeviceId,
}

impl DeviceBench {
    /// Attach `device`, register its events and let it arm them
    ///
    /// Every interrupt line is unmasked.
    pub fn new(device: Box<dyn Device>, events: &[(&str, u32, Option<Cycle>)]) -> Self {
        let mut bus = AddressSpace::new();
        let mut scheduler = Scheduler::new();
        let id = bus.attach_device(device);
        bus.map(MemoryRegion::device("device", DEVICE_BASE, 0x1000, id))
            .unwrap();
        for &(name, tag, period) in events {
            scheduler.register_device_event(name, id, tag, period).unwrap();
        }
        bus.irq_mut().write_mask(0xFFFF);
        bus.start_devices();
        scheduler.apply_requests(bus.take_requests());
        Self { bus, scheduler, id }
    }

    pub fn read(&mut self, offset: u32) -> u32 {
        self.bus.set_now(self.scheduler.current_cycle());
        let value = self.bus.read32(DEVICE_BASE + offset);
        self.scheduler.apply_requests(self.bus.take_requests());
        value
    }

    pub fn write(&mut self, offset: u32, value: u32) {
        self.bus.set_now(self.scheduler.current_cycle());
        self.bus.write32(DEVICE_BASE + offset, value);
        self.scheduler.apply_requests(self.bus.take_requests());
    }

    pub fn advance_to(&mut self, cycle: Cycle) -> EventAction {
        self.scheduler.advance_to(cycle, &mut self.bus)
    }

    pub fn device<T: Device>(&self) -> &T {
        self.bus.device::<T>(self.id).unwrap()
    }

    pub fn device_mut<T: Device>(&mut self) -> &mut T {
        self.bus.device_mut::<T>(self.id).unwrap()
    }

    /// I_STAT bits
    pub fn irq_status(&self) -> u32 {
        self.bus.irq().read_status()
    }

    pub fn ack_irqs(&mut self) {
        self.bus.irq_mut().write_status(0xFFFF);
    }
}
