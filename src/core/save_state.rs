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

//! Machine snapshots
//!
//! A snapshot captures everything that influences future execution: the
//! register file, every memory-backed region, the TLB, pending scheduler
//! events and the state of each device. Host-side caches (decoded blocks,
//! the micro-TLB) are not part of it and are rebuilt after a restore.
//!
//! # Snapshot Format
//!
//! ```text
//! offset 0  "VMCS"              magic
//! offset 4  u32 little-endian   format version
//! offset 8  bincode payload     MachineSnapshot (standard config)
//! ```
//!
//! The payload must be consumed exactly; trailing bytes are rejected.
//!
//! # Restoring
//!
//! [`MachineSnapshot::apply`] validates the whole snapshot against the target
//! machine before touching it. The only step that can still fail afterwards is
//! a device rejecting its own state, and in that case every device already
//! updated is rolled back.
//!
//! # Save State Files
//!
//! [`SaveStateFile`] wraps a snapshot with a timestamp and a label for the
//! command line front-end. The timestamp lives outside the snapshot bytes so
//! that two snapshots of the same machine state are byte-identical.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use bincode::{config, Decode, Encode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::cpu::CpuState;
use crate::core::error::{Result, SerializationError};
use crate::core::executor::Hardware;
use crate::core::interrupt::InterruptState;
use crate::core::memory::{decode_device_state, encode_device_state};
use crate::core::mmu::{Mmu, MmuState};
use crate::core::timing::SchedulerState;

/// Leading bytes of every snapshot
pub const SNAPSHOT_MAGIC: [u8; 4] = *b"VMCS";

/// Snapshot format version
///
/// Increment whenever the payload layout changes.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Magic plus version
const HEADER_LEN: usize = 8;

/// Name under which the interrupt controller is stored
const IRQ_STATE_NAME: &str = "irq";

/// Contents of one memory-backed region
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct RegionState {
    pub name: String,
    pub base: u32,
    pub data: Vec<u8>,
}

/// Opaque state of one device
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct DeviceState {
    pub name: String,
    pub data: Vec<u8>,
}

/// Complete machine state
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct MachineSnapshot {
    pub cpu: CpuState,
    /// Memory-backed regions in mapping order
    pub memory: Vec<RegionState>,
    pub mmu: MmuState,
    pub scheduler: SchedulerState,
    /// Interrupt controller first, then attached devices in attach order
    pub devices: Vec<DeviceState>,
}

impl MachineSnapshot {
    /// Capture the current state of `hw`
    pub fn capture(hw: &Hardware) -> Self {
        let memory = hw
            .bus
            .memory_regions()
            .map(|region| RegionState {
                name: region.name().to_string(),
                base: region.base(),
                data: region.data().to_vec(),
            })
            .collect();

        let mut devices = vec![DeviceState {
            name: IRQ_STATE_NAME.to_string(),
            data: encode_device_state(&hw.bus.irq().state()),
        }];
        devices.extend(hw.bus.devices().map(|device| DeviceState {
            name: device.name().to_string(),
            data: device.save_state(),
        }));

        Self {
            cpu: hw.cpu.state(),
            memory,
            mmu: hw.mmu.state(),
            scheduler: hw.scheduler.state(),
            devices,
        }
    }

    /// Serialize with header
    pub fn encode(&self) -> std::result::Result<Vec<u8>, SerializationError> {
        let payload = bincode::encode_to_vec(self, config::standard())
            .map_err(|e| SerializationError::Encode(e.to_string()))?;

        let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
        bytes.extend_from_slice(&SNAPSHOT_MAGIC);
        bytes.extend_from_slice(&SNAPSHOT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&payload);
        Ok(bytes)
    }

    /// Parse and check the header and payload framing
    pub fn decode(bytes: &[u8]) -> std::result::Result<Self, SerializationError> {
        if bytes.len() < HEADER_LEN {
            return Err(SerializationError::Truncated(bytes.len()));
        }
        if bytes[..4] != SNAPSHOT_MAGIC {
            return Err(SerializationError::BadMagic);
        }
        let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        if version != SNAPSHOT_VERSION {
            return Err(SerializationError::VersionMismatch {
                expected: SNAPSHOT_VERSION,
                got: version,
            });
        }

        let payload = &bytes[HEADER_LEN..];
        let (snapshot, consumed): (Self, usize) =
            bincode::decode_from_slice(payload, config::standard())
                .map_err(|e| SerializationError::Decode(e.to_string()))?;
        if consumed != payload.len() {
            return Err(SerializationError::SizeMismatch {
                expected: payload.len(),
                consumed,
            });
        }
        Ok(snapshot)
    }

    /// Check that this snapshot fits the machine `hw`
    ///
    /// Covers everything except the per-device payloads, which only the
    /// devices themselves can judge.
    pub fn validate(&self, hw: &Hardware) -> std::result::Result<(), SerializationError> {
        let regions: Vec<_> = hw.bus.memory_regions().collect();
        if regions.len() != self.memory.len() {
            return Err(SerializationError::RegionMismatch(format!(
                "snapshot has {} memory regions, machine has {}",
                self.memory.len(),
                regions.len()
            )));
        }
        for (region, saved) in regions.iter().zip(&self.memory) {
            if region.name() != saved.name
                || region.base() != saved.base
                || region.data().len() != saved.data.len()
            {
                return Err(SerializationError::RegionMismatch(format!(
                    "'{}' at 0x{:08X} ({} bytes) does not match '{}' at 0x{:08X} ({} bytes)",
                    saved.name,
                    saved.base,
                    saved.data.len(),
                    region.name(),
                    region.base(),
                    region.data().len()
                )));
            }
        }

        Mmu::validate(&self.mmu)?;
        hw.scheduler.validate(&self.scheduler)?;

        let names: Vec<&str> = std::iter::once(IRQ_STATE_NAME)
            .chain(hw.bus.devices().map(|device| device.name()))
            .collect();
        let saved: Vec<&str> = self.devices.iter().map(|d| d.name.as_str()).collect();
        if names != saved {
            return Err(SerializationError::DeviceMismatch(format!(
                "snapshot has devices {:?}, machine has {:?}",
                saved, names
            )));
        }
        Ok(())
    }

    /// Validate, then overwrite the state of `hw`
    ///
    /// Only the MMU's own translation cache is flushed; see
    /// [`apply_with`](Self::apply_with) for host caches.
    pub fn apply(&self, hw: &mut Hardware) -> std::result::Result<(), SerializationError> {
        self.apply_with(hw, |_| {})
    }

    /// Validate, then overwrite the state of `hw`
    ///
    /// `flush` runs once memory, CPU and MMU state are in place and before
    /// the scheduler queue is rebuilt. Nothing is mutated unless the whole
    /// snapshot is accepted.
    pub fn apply_with(
        &self,
        hw: &mut Hardware,
        flush: impl FnOnce(&mut Hardware),
    ) -> std::result::Result<(), SerializationError> {
        self.validate(hw)?;

        // Devices first: they are the only step that can still fail
        let irq: InterruptState = decode_device_state(&self.devices[0].data).map_err(|reason| {
            SerializationError::DeviceState {
                device: IRQ_STATE_NAME.to_string(),
                reason,
            }
        })?;
        load_devices(hw, &self.devices[1..])?;
        hw.bus.irq_mut().restore(irq);

        for (region, saved) in hw.bus.memory_regions_mut().zip(&self.memory) {
            region.data_mut().copy_from_slice(&saved.data);
        }
        hw.cpu.restore(&self.cpu);
        hw.mmu.restore(&self.mmu);
        flush(hw);
        hw.scheduler.restore(&self.scheduler);
        Ok(())
    }
}

/// Load every device state, rolling all of them back if one fails
fn load_devices(
    hw: &mut Hardware,
    states: &[DeviceState],
) -> std::result::Result<(), SerializationError> {
    let devices = hw.bus.devices_mut();
    let backup: Vec<Vec<u8>> = devices.iter().map(|device| device.save_state()).collect();

    for (index, saved) in states.iter().enumerate() {
        if let Err(reason) = devices[index].load_state(&saved.data) {
            log::warn!("Device '{}' rejected its state: {}", saved.name, reason);
            for (device, previous) in devices[..index].iter_mut().zip(&backup) {
                if let Err(e) = device.load_state(previous) {
                    log::error!("Device '{}' failed to roll back: {}", device.name(), e);
                }
            }
            return Err(SerializationError::DeviceState {
                device: saved.name.clone(),
                reason,
            });
        }
    }
    Ok(())
}

/// Save state file metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct SaveStateMetadata {
    /// When the state was written
    #[bincode(with_serde)]
    pub timestamp: DateTime<Utc>,

    /// Free-form description, typically the image name
    pub label: String,

    /// Machine cycle at save time
    pub cycles: u64,

    /// Frames completed at save time
    pub frames: u64,
}

/// A snapshot on disk
#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub struct SaveStateFile {
    pub metadata: SaveStateMetadata,
    /// Snapshot bytes as produced by `Machine::serialize`
    pub snapshot: Vec<u8>,
}

impl SaveStateFile {
    /// Wrap snapshot bytes, stamping the current time
    pub fn new(snapshot: Vec<u8>, label: impl Into<String>, cycles: u64, frames: u64) -> Self {
        Self {
            metadata: SaveStateMetadata {
                timestamp: Utc::now(),
                label: label.into(),
                cycles,
                frames,
            },
            snapshot,
        }
    }

    /// Write the file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The file cannot be created or written
    /// - Encoding fails
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let encoded = bincode::encode_to_vec(self, config::standard())
            .map_err(|e| SerializationError::Encode(e.to_string()))?;
        let mut file = File::create(path.as_ref())?;
        file.write_all(&encoded)?;
        log::info!(
            "Saved state '{}' ({} bytes) to {}",
            self.metadata.label,
            encoded.len(),
            path.as_ref().display()
        );
        Ok(())
    }

    /// Read a file written by [`SaveStateFile::save_to_file`]
    ///
    /// The embedded snapshot header is checked here as well, so a file from
    /// an incompatible version is rejected before it reaches a machine.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path.as_ref())?;
        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer)?;

        let (state, consumed): (Self, usize) =
            bincode::decode_from_slice(&buffer, config::standard())
                .map_err(|e| SerializationError::Decode(e.to_string()))?;
        if consumed != buffer.len() {
            return Err(SerializationError::SizeMismatch {
                expected: buffer.len(),
                consumed,
            }
            .into());
        }
        MachineSnapshot::decode(&state.snapshot)?;
        Ok(state)
    }
}
