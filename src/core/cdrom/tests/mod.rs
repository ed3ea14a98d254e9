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

use super::*;
use crate::core::system::host::MemorySectorSource;
use crate::core::testing::DeviceBench;


const READ_CYCLES: Cycle = 200;

/// Three sectors, each filled with its own index
fn disc_image() -> Vec<u8> {
    (0..3u8)
        .flat_map(|sector| std::iter::repeat_n(sector, SECTOR_SIZE))
        .collect()
}

fn bench_with_disc() -> DeviceBench {
    let mut port = DiscPort::new(READ_CYCLES);
    port.insert_disc(Box::new(MemorySectorSource::new(disc_image())));
    DeviceBench::new(Box::new(port), &[(READ_EVENT_NAME, READ_EVENT, None)])
}

fn bench_without_disc() -> DeviceBench {
    DeviceBench::new(
        Box::new(DiscPort::new(READ_CYCLES)),
        &[(READ_EVENT_NAME, READ_EVENT, None)],
    )
}
