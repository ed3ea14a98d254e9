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

//! System integration module
//!
//! [`Machine`] owns the hardware, the executor and the built-in devices, and
//! is the only surface a frontend needs: construct it from a
//! [`MachineConfig`], load an image, run it, snapshot it.
//!
//! # Built-in Devices
//!
//! | Window       | Device                                   | Events                  |
//! |--------------|------------------------------------------|-------------------------|
//! | `0x1F000000` | Interrupt controller                     |                         |
//! | `0x1F001000` | [`Timers`]                               | `timer0`..`timer2`      |
//! | `0x1F002000` | [`VideoClock`]                           | `video.frame` (periodic)|
//! | `0x1F003000` | [`InputPort`]                            |                         |
//! | `0x1F004000` | [`AudioFifo`]                            | `audio.drain` (periodic)|
//! | `0x1F005000` | [`DiscPort`]                             | `disc.read`             |
//!
//! # Example
//!
//! ```
//! use vmcore::core::config::{ExecutorKind, MachineConfig};
//! use vmcore::core::cpu::encode;
//! use vmcore::core::system::Machine;
//!
//! let config = MachineConfig {
//!     executor: ExecutorKind::Interpreter,
//!     ..Default::default()
//! };
//! let mut machine = Machine::new(config).unwrap();
//!
//! // addiu r2, r0, 7; spin
//! let program = [encode::addiu(2, 0, 7), encode::beq(0, 0, -1), encode::NOP];
//! machine.load_program(0x8000_1000, &program).unwrap();
//! machine.set_entry_point(0x8000_1000);
//!
//! machine.run_until(100).unwrap();
//! assert_eq!(machine.cpu().reg(2), 7);
//! ```

pub mod host;
mod lifecycle;
#[cfg(test)]
mod tests;

pub use lifecycle::{LifecycleCallback, LifecycleEvent, LifecycleManager, ListenerId};

use host::{AudioSink, NullAudioSink, SectorSource};

use crate::core::audio::{AudioFifo, DRAIN_EVENT, DRAIN_EVENT_NAME};
use crate::core::cdrom::{DiscPort, READ_EVENT, READ_EVENT_NAME};
use crate::core::config::{map, MachineConfig};
use crate::core::controller::{InputHandle, InputPort};
use crate::core::cpu::CPU;
use crate::core::error::{EmulatorError, FatalError, Result};
use crate::core::executor::{
    CacheStats, ExecutionControl, Executor, Hardware, RunReport, StopReason,
};
use crate::core::memory::{AddressSpace, Device, DeviceId, MemoryRegion, RegionId};
use crate::core::mmu::Mmu;
use crate::core::save_state::MachineSnapshot;
use crate::core::timer::Timers;
use crate::core::timing::{Cycle, EventId, Scheduler};
use crate::core::video::{FrameCallback, VideoClock, FRAME_EVENT, FRAME_EVENT_NAME};

/// Ids of the built-in devices
#[derive(Debug, Clone, Copy)]
struct BuiltinDevices {
    timers: DeviceId,
    video: DeviceId,
    input: DeviceId,
    audio: DeviceId,
    disc: DeviceId,
}

/// Complete virtual machine
///
/// # Reset Semantics
///
/// - A hard reset is a power cycle: RAM is zeroed, video memory protection is
///   dropped, the cycle counter restarts at zero and execution begins at the
///   reset vector.
/// - A soft reset keeps memory and the cycle counter, resets the CPU and the
///   devices, and resumes at the entry point set with
///   [`Machine::set_entry_point`] (the reset vector if none was set).
pub struct Machine {
    /// Configuration the machine was built with
    base_config: MachineConfig,
    /// `base_config` with the loaded title's overrides applied
    config: MachineConfig,
    title: Option<String>,
    hw: Hardware,
    executor: Executor,
    devices: BuiltinDevices,
    input: InputHandle,
    lifecycle: LifecycleManager,
    entry_point: Option<u32>,
    started: bool,
    last_error: Option<FatalError>,
}

impl Machine {
    /// Build and power on a machine
    ///
    /// # Errors
    ///
    /// Returns [`EmulatorError::Config`] if the configuration is invalid.
    pub fn new(config: MachineConfig) -> Result<Self> {
        config.validate()?;
        let layout = config.layout();
        log::info!(
            "Creating {:?} machine: {} MiB RAM, {} MiB VRAM",
            config.platform,
            layout.ram_size >> 20,
            layout.vram_size >> 20
        );

        let mut hw = Hardware::new(config.mmu_enabled);
        let bus = &mut hw.bus;
        bus.map(MemoryRegion::ram("ram", map::RAM_BASE, layout.ram_size).with_window(map::RAM_WINDOW))?;
        bus.map(MemoryRegion::ram("vram", map::VRAM_BASE, layout.vram_size).with_window(map::VRAM_WINDOW))?;
        bus.map(
            MemoryRegion::ram("sound_ram", map::SOUND_RAM_BASE, layout.sound_ram_size)
                .with_window(map::SOUND_RAM_WINDOW),
        )?;
        bus.map(MemoryRegion::interrupts(map::IRQ_BASE))?;
        bus.map(
            MemoryRegion::flash("flash", map::FLASH_BASE, layout.flash_size)
                .with_window(map::FLASH_WINDOW),
        )?;
        bus.map(
            MemoryRegion::rom("boot_rom", map::BOOT_ROM_BASE, layout.boot_rom_size)
                .with_window(map::BOOT_ROM_WINDOW),
        )?;

        let input = InputHandle::new();
        let devices = BuiltinDevices {
            timers: attach_builtin(bus, Box::new(Timers::new()), map::TIMER_BASE)?,
            video: attach_builtin(
                bus,
                Box::new(VideoClock::new(config.cycles_per_frame, config.yield_on_frame)),
                map::VIDEO_BASE,
            )?,
            input: attach_builtin(bus, Box::new(InputPort::new(input.clone())), map::INPUT_BASE)?,
            audio: attach_builtin(
                bus,
                Box::new(AudioFifo::new(config.audio_batch_cycles, Box::new(NullAudioSink))),
                map::AUDIO_BASE,
            )?,
            disc: attach_builtin(bus, Box::new(DiscPort::new(config.disc_read_cycles)), map::DISC_BASE)?,
        };

        let scheduler = &mut hw.scheduler;
        for (tag, name) in Timers::EVENT_NAMES.iter().enumerate() {
            scheduler.register_device_event(name, devices.timers, tag as u32, None)?;
        }
        scheduler.register_device_event(
            FRAME_EVENT_NAME,
            devices.video,
            FRAME_EVENT,
            Some(config.cycles_per_frame),
        )?;
        scheduler.register_device_event(
            DRAIN_EVENT_NAME,
            devices.audio,
            DRAIN_EVENT,
            Some(config.audio_batch_cycles),
        )?;
        scheduler.register_device_event(READ_EVENT_NAME, devices.disc, READ_EVENT, None)?;

        let executor = Executor::init(&config);
        let mut machine = Self {
            base_config: config.clone(),
            config,
            title: None,
            hw,
            executor,
            devices,
            input,
            lifecycle: LifecycleManager::new(),
            entry_point: None,
            started: false,
            last_error: None,
        };
        machine.power_cycle(true);
        Ok(machine)
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    /// Id of the loaded title, if one was loaded with [`Machine::load_title`]
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// Make `config` the effective configuration
    ///
    /// Only what [`TitleOverrides`](crate::core::config::TitleOverrides) covers
    /// takes effect; the rest was fixed when the machine was built.
    fn apply_config(&mut self, config: MachineConfig) {
        self.executor.reconfigure(&mut self.hw, &config);
        self.hw.mmu.set_enabled(config.mmu_enabled);
        if let Some(video) = self.hw.bus.device_mut::<VideoClock>(self.devices.video) {
            video.set_yield_on_frame(config.yield_on_frame);
        }
        self.config = config;
    }

    // === Lifecycle ===

    /// Reset the machine; see the type-level docs for hard vs soft
    pub fn reset(&mut self, hard: bool) {
        log::info!("{} reset", if hard { "Hard" } else { "Soft" });
        self.power_cycle(hard);
        self.lifecycle.broadcast(LifecycleEvent::Reset);
    }

    fn power_cycle(&mut self, hard: bool) {
        let hw = &mut self.hw;
        hw.cpu.reset();
        hw.mmu.reset();
        hw.scheduler.reset(hard);
        hw.bus.reset_devices(hard);
        if hard {
            hw.bus.clear_ram();
            hw.bus
                .unprotect_range(map::VRAM_BASE, self.config.layout().vram_size);
            self.entry_point = None;
            self.last_error = None;
        } else if let Some(pc) = self.entry_point {
            hw.cpu.set_pc(pc);
        }
        self.executor.reset(hw, hard);

        hw.bus.set_now(hw.scheduler.current_cycle());
        hw.bus.start_devices();
        let requests = hw.bus.take_requests();
        hw.scheduler.apply_requests(requests);
    }

    /// Run until stopped or until an event asks to stop
    pub fn run(&mut self) -> Result<RunReport> {
        self.run_inner(None)
    }

    /// Run until the machine cycle reaches `cycle`
    ///
    /// Execution stops at the first unit boundary at or after `cycle`.
    pub fn run_until(&mut self, cycle: Cycle) -> Result<RunReport> {
        self.run_inner(Some(cycle))
    }

    fn run_inner(&mut self, until: Option<Cycle>) -> Result<RunReport> {
        self.lifecycle.broadcast(if self.started {
            LifecycleEvent::Resume
        } else {
            LifecycleEvent::Start
        });
        self.started = true;

        let mut total = RunReport::new();
        let result = loop {
            let report = match self.executor.run(&mut self.hw, until) {
                Ok(report) => report,
                Err(e) => break Err(self.record_error(e)),
            };
            total.merge(&report);

            match report.reason {
                StopReason::ControlRequest => self.service_requests(),
                StopReason::Event if self.take_frame_yield() => {
                    total.reason = StopReason::FrameYield;
                    break Ok(total);
                }
                _ => break Ok(total),
            }
        };

        self.lifecycle.broadcast(LifecycleEvent::Pause);
        result
    }

    /// Execute one instruction through the interpreter path
    pub fn step(&mut self) -> Result<RunReport> {
        let result = self.executor.step(&mut self.hw);
        let report = result.map_err(|e| self.record_error(e))?;
        if report.reason == StopReason::Event && self.take_frame_yield() {
            return Ok(RunReport {
                reason: StopReason::FrameYield,
                ..report
            });
        }
        Ok(report)
    }

    /// Ask a running executor to stop at the next unit boundary
    pub fn stop(&self) {
        self.executor.stop();
    }

    pub fn is_running(&self) -> bool {
        self.executor.is_running()
    }

    /// Handle for stopping, resetting or snapshotting from other threads
    pub fn control(&self) -> ExecutionControl {
        self.executor.control()
    }

    /// Serve reset and snapshot requests left by control handles
    fn service_requests(&mut self) {
        let control = self.executor.control();
        if control.take_reset() {
            self.reset(false);
        }
        for reply in control.take_snapshot_replies() {
            // The requester may have given up waiting
            let _ = reply.send(self.serialize());
        }
    }

    fn record_error(&mut self, error: EmulatorError) -> EmulatorError {
        if let EmulatorError::Fatal(fatal) = &error {
            log::error!("Executor stopped: {}", fatal);
            self.last_error = Some(fatal.clone());
        }
        error
    }

    /// The fatal error that ended the last run, if any
    pub fn last_error(&self) -> Option<&FatalError> {
        self.last_error.as_ref()
    }

    /// Take the fatal error that ended the last run, clearing it
    pub fn take_last_error(&mut self) -> Option<FatalError> {
        self.last_error.take()
    }

    /// Shut the current title down
    ///
    /// Listeners get [`LifecycleEvent::Terminate`] if the title ever ran.
    /// The machine is then hard reset and goes back to the configuration it
    /// was built with, ready for the next title.
    pub fn terminate(&mut self) {
        if std::mem::take(&mut self.started) {
            self.lifecycle.broadcast(LifecycleEvent::Terminate);
        }
        log::info!("Terminating title {:?}", self.title.as_deref().unwrap_or("<none>"));
        self.power_cycle(true);
        self.title = None;
        self.apply_config(self.base_config.clone());
    }

    pub fn lifecycle_mut(&mut self) -> &mut LifecycleManager {
        &mut self.lifecycle
    }

    // === Memory ===

    /// Copy an image into memory at `load_address`
    ///
    /// Unmapped kseg0/kseg1 addresses are accepted and reduced to physical
    /// ones. Read-only regions may be loaded.
    pub fn load_image(&mut self, bytes: &[u8], load_address: u32) -> Result<()> {
        self.hw.bus.write_bytes(load_address, bytes)?;
        log::info!(
            "Loaded {} bytes at 0x{:08X}",
            bytes.len(),
            load_address
        );
        Ok(())
    }

    /// Load a title's image, applying its configuration overrides first
    ///
    /// `title` identifies the image (for example a product code); trailing
    /// whitespace is ignored. Overrides come from the `overrides` table of the
    /// configuration the machine was built with.
    ///
    /// # Errors
    ///
    /// Returns [`EmulatorError::Config`] if the overridden configuration is
    /// invalid; the machine is left unchanged in that case.
    pub fn load_title(&mut self, title: &str, bytes: &[u8], load_address: u32) -> Result<()> {
        match MachineConfig::title_key(title) {
            Some(key) => {
                let config = self.base_config.for_title(key);
                config.validate()?;
                if let Some(overrides) = self.base_config.overrides.get(key) {
                    log::info!("Title [{}]: applying overrides {:?}", key, overrides);
                } else {
                    log::info!("Title [{}]", key);
                }
                self.apply_config(config);
                self.title = Some(key.to_string());
            }
            None => {
                log::warn!("Empty title id, loading without overrides");
                self.apply_config(self.base_config.clone());
                self.title = None;
            }
        }
        self.load_image(bytes, load_address)
    }

    /// Load instruction words (little-endian) at `load_address`
    pub fn load_program(&mut self, load_address: u32, words: &[u32]) -> Result<()> {
        let bytes: Vec<u8> = words.iter().flat_map(|word| word.to_le_bytes()).collect();
        self.load_image(&bytes, load_address)
    }

    /// Jump to `pc` now and after every soft reset
    pub fn set_entry_point(&mut self, pc: u32) {
        self.entry_point = Some(pc);
        self.hw.cpu.set_pc(pc);
    }

    pub fn map_region(&mut self, region: MemoryRegion) -> Result<RegionId> {
        let id = self.hw.bus.map(region)?;
        self.executor.reset_code_cache(&mut self.hw);
        Ok(id)
    }

    pub fn unmap_region(&mut self, base: u32) -> Result<MemoryRegion> {
        let region = self.hw.bus.unmap(base)?;
        self.executor.reset_code_cache(&mut self.hw);
        Ok(region)
    }

    // === Snapshots ===

    /// Snapshot the whole machine
    pub fn serialize(&self) -> Result<Vec<u8>> {
        Ok(MachineSnapshot::capture(&self.hw).encode()?)
    }

    /// Restore a snapshot produced by [`Machine::serialize`]
    ///
    /// On error the machine is left exactly as it was.
    pub fn deserialize(&mut self, bytes: &[u8]) -> Result<()> {
        let snapshot = MachineSnapshot::decode(bytes)?;
        let executor = &mut self.executor;
        snapshot.apply_with(&mut self.hw, |hw| {
            hw.mmu.flush();
            executor.reset_code_cache(hw);
        })?;
        self.last_error = None;
        log::info!(
            "Restored snapshot at cycle {}",
            self.hw.scheduler.current_cycle()
        );
        Ok(())
    }

    // === Devices ===

    /// Attach a device; map it with [`Machine::map_region`]
    ///
    /// Its `start` hook runs at the next reset.
    pub fn attach_device(&mut self, device: Box<dyn Device>) -> DeviceId {
        self.hw.bus.attach_device(device)
    }

    /// Register event `tag` of `device` under `name`
    pub fn register_device_event(
        &mut self,
        device: DeviceId,
        tag: u32,
        name: &str,
        period: Option<Cycle>,
    ) -> Result<EventId> {
        if device.0 >= self.hw.bus.device_count() {
            return Err(crate::core::error::ConfigError::UnknownDevice(device.0).into());
        }
        Ok(self
            .hw
            .scheduler
            .register_device_event(name, device, tag, period)?)
    }

    /// Subscribe to frame boundaries
    pub fn on_frame(&mut self, callback: FrameCallback) {
        if let Some(video) = self.hw.bus.device_mut::<VideoClock>(self.devices.video) {
            video.set_on_frame(callback);
        }
    }

    pub fn set_audio_sink(&mut self, sink: Box<dyn AudioSink>) {
        if let Some(audio) = self.hw.bus.device_mut::<AudioFifo>(self.devices.audio) {
            audio.set_sink(sink);
        }
    }

    pub fn insert_disc(&mut self, source: Box<dyn SectorSource>) {
        if let Some(disc) = self.hw.bus.device_mut::<DiscPort>(self.devices.disc) {
            disc.insert_disc(source);
        }
    }

    /// Host side of the input port
    pub fn input(&self) -> InputHandle {
        self.input.clone()
    }

    pub fn input_device(&self) -> DeviceId {
        self.devices.input
    }

    /// Whether the last event stop came from the video clock yielding
    fn take_frame_yield(&mut self) -> bool {
        self.hw
            .bus
            .device_mut::<VideoClock>(self.devices.video)
            .is_some_and(|video| video.take_yield())
    }

    // === Accessors ===

    pub fn cpu(&self) -> &CPU {
        &self.hw.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut CPU {
        &mut self.hw.cpu
    }

    pub fn mmu(&self) -> &Mmu {
        &self.hw.mmu
    }

    pub fn mmu_mut(&mut self) -> &mut Mmu {
        &mut self.hw.mmu
    }

    pub fn bus(&self) -> &AddressSpace {
        &self.hw.bus
    }

    pub fn bus_mut(&mut self) -> &mut AddressSpace {
        &mut self.hw.bus
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.hw.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut Scheduler {
        &mut self.hw.scheduler
    }

    /// Current machine cycle
    pub fn cycles(&self) -> Cycle {
        self.hw.scheduler.current_cycle()
    }

    /// Frames completed since the last hard reset
    pub fn frames(&self) -> u64 {
        self.hw
            .bus
            .device::<VideoClock>(self.devices.video)
            .map_or(0, |video| video.frames())
    }

    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.executor.cache_stats()
    }
}

impl Drop for Machine {
    fn drop(&mut self) {
        if self.started {
            self.lifecycle.broadcast(LifecycleEvent::Terminate);
        }
    }
}

fn attach_builtin(bus: &mut AddressSpace, device: Box<dyn Device>, base: u32) -> Result<DeviceId> {
    let name = device.name().to_string();
    let id = bus.attach_device(device);
    bus.map(MemoryRegion::device(&name, base, map::DEVICE_WINDOW, id))?;
    Ok(id)
}
