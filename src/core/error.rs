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

/// Machine error types
///
/// Guest-visible faults (TLB misses, address errors, overflow traps) never
/// appear here: the CPU turns them into guest exceptions. Everything in this
/// module is a host-level condition reported to the driver.
use thiserror::Error;

/// Result type for machine operations
pub type Result<T> = std::result::Result<T, EmulatorError>;

/// Main error type for the machine
#[derive(Error, Debug)]
pub enum EmulatorError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Save state error: {0}")]
    Serialization(#[from] SerializationError),

    #[error("Fatal executor error: {0}")]
    Fatal(#[from] FatalError),

    #[error("Image of {size} bytes does not fit at 0x{address:08X}")]
    ImageOutOfRange { address: u32, size: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    ConfigParse(String),
}

/// Invalid machine or memory map configuration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Region '{name}' has invalid size 0x{size:X} (must be a power of two of at least 4 KiB)")]
    InvalidRegionSize { name: String, size: u32 },

    #[error("Region '{name}' window 0x{window:X} is not a multiple of its size 0x{size:X}")]
    InvalidWindow { name: String, size: u32, window: u32 },

    #[error("Region '{name}' base 0x{base:08X} is not aligned to its window")]
    MisalignedRegion { name: String, base: u32 },

    #[error("Region '{name}' at 0x{base:08X} lies outside the physical address space")]
    OutOfRange { name: String, base: u32 },

    #[error("Region '{name}' overlaps region '{existing}'")]
    Overlap { name: String, existing: String },

    #[error("No region is mapped at 0x{0:08X}")]
    NoSuchRegion(u32),

    #[error("Region '{0}' declares no access widths")]
    NoAccessWidths(String),

    #[error("Event '{0}' is already registered")]
    DuplicateEvent(String),

    #[error("Unknown device id {0}")]
    UnknownDevice(usize),

    #[error("Invalid timing configuration: {0}")]
    InvalidTiming(String),

    #[error("Invalid code cache configuration: {0}")]
    InvalidCodeCache(String),
}

/// Save state encode/decode failures
///
/// Every variant is detected before any machine state is touched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SerializationError {
    #[error("Not a machine snapshot (bad magic)")]
    BadMagic,

    #[error("Snapshot version mismatch: expected {expected}, got {got}")]
    VersionMismatch { expected: u32, got: u32 },

    #[error("Snapshot is truncated ({0} bytes)")]
    Truncated(usize),

    #[error("Failed to encode snapshot: {0}")]
    Encode(String),

    #[error("Failed to decode snapshot: {0}")]
    Decode(String),

    #[error("Snapshot size mismatch: payload is {expected} bytes but {consumed} were consumed")]
    SizeMismatch { expected: usize, consumed: usize },

    #[error("Memory layout mismatch: {0}")]
    RegionMismatch(String),

    #[error("Snapshot references unknown event '{0}'")]
    UnknownEvent(String),

    #[error("Snapshot event '{name}' is invalid: {reason}")]
    InvalidEvent { name: String, reason: String },

    #[error("Device layout mismatch: {0}")]
    DeviceMismatch(String),

    #[error("Device '{device}' rejected its state: {reason}")]
    DeviceState { device: String, reason: String },
}

/// Host-level executor failures
///
/// These stop the executor and leave the machine in its last consistent state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FatalError {
    #[error("Code cache exhausted: block at 0x{pc:08X} needs {needed} slots, capacity is {capacity}")]
    CodeCacheExhausted {
        pc: u32,
        needed: usize,
        capacity: usize,
    },

    #[error("Block translation failed at 0x{pc:08X}: {reason}")]
    Translation { pc: u32, reason: String },
}
