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

//! Host-side interfaces
//!
//! The core never talks to audio hardware or disc images directly. The audio
//! FIFO pushes its samples into an [`AudioSink`] and the disc port pulls
//! sectors from a [`SectorSource`]; frontends supply the implementations.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Bytes per disc sector
pub const SECTOR_SIZE: usize = 2048;

/// Receiver of interleaved stereo samples (left, right, left, ...)
pub trait AudioSink: Send {
    fn push_samples(&mut self, samples: &[i16]);
}

/// Sink that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullAudioSink;

impl AudioSink for NullAudioSink {
    fn push_samples(&mut self, _samples: &[i16]) {}
}

/// Sink that queues stereo frames for a frontend to consume
///
/// Clones share the same queue, so one clone can be handed to the machine
/// while the frontend keeps another.
///
/// # Example
///
/// ```
/// use vmcore::core::system::host::{AudioSink, BufferedAudioSink};
///
/// let sink = BufferedAudioSink::new();
/// let mut machine_side = sink.clone();
/// machine_side.push_samples(&[100, -100, 200, -200]);
///
/// assert_eq!(sink.buffer_level(), 2);
/// assert_eq!(sink.take_samples(), vec![(100, -100), (200, -200)]);
/// ```
#[derive(Debug, Default, Clone)]
pub struct BufferedAudioSink {
    sample_queue: Arc<Mutex<VecDeque<(i16, i16)>>>,
}

impl BufferedAudioSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn queue(&self) -> MutexGuard<'_, VecDeque<(i16, i16)>> {
        self.sample_queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Number of queued stereo frames
    pub fn buffer_level(&self) -> usize {
        self.queue().len()
    }

    /// Drain every queued frame
    pub fn take_samples(&self) -> Vec<(i16, i16)> {
        self.queue().drain(..).collect()
    }
}

impl AudioSink for BufferedAudioSink {
    fn push_samples(&mut self, samples: &[i16]) {
        let mut queue = self.queue();
        queue.extend(samples.chunks_exact(2).map(|pair| (pair[0], pair[1])));
    }
}

/// Provider of 2048-byte disc sectors
pub trait SectorSource: Send {
    /// Number of readable sectors
    fn sector_count(&self) -> u32;

    /// Read sector `lba` into `buf`
    fn read_sector(&mut self, lba: u32, buf: &mut [u8; SECTOR_SIZE]) -> io::Result<()>;
}

fn out_of_range(lba: u32, count: u32) -> io::Error {
    io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("sector {} beyond end of disc ({} sectors)", lba, count),
    )
}

/// Disc image held in memory
///
/// A trailing partial sector is padded with zeros.
#[derive(Debug, Clone, Default)]
pub struct MemorySectorSource {
    data: Vec<u8>,
}

impl MemorySectorSource {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }
}

impl SectorSource for MemorySectorSource {
    fn sector_count(&self) -> u32 {
        self.data.len().div_ceil(SECTOR_SIZE) as u32
    }

    fn read_sector(&mut self, lba: u32, buf: &mut [u8; SECTOR_SIZE]) -> io::Result<()> {
        if lba >= self.sector_count() {
            return Err(out_of_range(lba, self.sector_count()));
        }
        let start = lba as usize * SECTOR_SIZE;
        let end = (start + SECTOR_SIZE).min(self.data.len());
        buf.fill(0);
        buf[..end - start].copy_from_slice(&self.data[start..end]);
        Ok(())
    }
}

/// Raw 2048-byte-per-sector image file
#[derive(Debug)]
pub struct FileSectorSource {
    file: File,
    sectors: u32,
}

impl FileSectorSource {
    /// Open an image; its size must be a whole number of sectors
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::open(path.as_ref())?;
        let len = file.metadata()?.len();
        if len % SECTOR_SIZE as u64 != 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("image size {} is not a multiple of {}", len, SECTOR_SIZE),
            ));
        }
        let sectors = u32::try_from(len / SECTOR_SIZE as u64)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "image too large"))?;
        log::info!(
            "Opened disc image {} ({} sectors)",
            path.as_ref().display(),
            sectors
        );
        Ok(Self { file, sectors })
    }
}

impl SectorSource for FileSectorSource {
    fn sector_count(&self) -> u32 {
        self.sectors
    }

    fn read_sector(&mut self, lba: u32, buf: &mut [u8; SECTOR_SIZE]) -> io::Result<()> {
        if lba >= self.sectors {
            return Err(out_of_range(lba, self.sectors));
        }
        self.file
            .seek(SeekFrom::Start(lba as u64 * SECTOR_SIZE as u64))?;
        self.file.read_exact(buf)
    }
}
