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

//! Mapping validation and mirroring

use super::helpers::*;
use crate::core::error::ConfigError;
use crate::core::memory::*;

#[test]
fn test_mirrored_window() {
    let mut bus = create_test_space();

    bus.write32(0x10, 0xA5A5A5A5);
    for mirror in 0..4 {
        assert_eq!(bus.read32(mirror * RAM_SIZE + 0x10), 0xA5A5A5A5);
    }
}

#[test]
fn test_region_lookup() {
    let bus = create_test_space();

    assert_eq!(bus.region_at(0x0000_8000).unwrap().name(), "ram");
    assert_eq!(bus.region_at(0xBFC0_0000).unwrap().name(), "rom");
    assert!(bus.region_at(0x0800_0000).is_none());
    assert_eq!(bus.region_by_name("rom").unwrap().base(), ROM_BASE);
}

#[test]
fn test_overlap_rejected() {
    let mut bus = create_test_space();

    let result = bus.map(MemoryRegion::ram("clash", 0x0000_8000, 0x1000));
    assert_eq!(
        result,
        Err(ConfigError::Overlap {
            name: "clash".to_string(),
            existing: "ram".to_string()
        })
    );
}

#[test]
fn test_invalid_size_rejected() {
    let mut bus = AddressSpace::new();

    assert!(matches!(
        bus.map(MemoryRegion::ram("small", 0, 0x800)),
        Err(ConfigError::InvalidRegionSize { .. })
    ));
    assert!(matches!(
        bus.map(MemoryRegion::ram("odd", 0, 0x3000)),
        Err(ConfigError::InvalidRegionSize { .. })
    ));
}

#[test]
fn test_invalid_window_rejected() {
    let mut bus = AddressSpace::new();

    assert!(matches!(
        bus.map(MemoryRegion::ram("ram", 0, 0x2000).with_window(0x3000)),
        Err(ConfigError::InvalidWindow { .. })
    ));
}

#[test]
fn test_misaligned_base_rejected() {
    let mut bus = AddressSpace::new();

    assert!(matches!(
        bus.map(MemoryRegion::ram("ram", 0x0000_0800, 0x1000)),
        Err(ConfigError::MisalignedRegion { .. })
    ));
}

#[test]
fn test_out_of_range_rejected() {
    let mut bus = AddressSpace::new();

    assert!(matches!(
        bus.map(MemoryRegion::ram("ram", 0x1FFF_F000, 0x2000)),
        Err(ConfigError::OutOfRange { .. })
    ));
}

#[test]
fn test_unknown_device_rejected() {
    let mut bus = AddressSpace::new();

    assert_eq!(
        bus.map(MemoryRegion::device("dev", DEV_BASE, 0x1000, DeviceId(3))),
        Err(ConfigError::UnknownDevice(3))
    );
}

#[test]
fn test_width_restriction_is_open_bus() {
    let mut bus = AddressSpace::new();
    bus.map(MemoryRegion::ram("wordonly", 0, 0x1000).with_widths(AccessWidths::WORD))
        .unwrap();

    bus.write32(0x0, 0x11223344);
    bus.write8(0x0, 0x99);
    assert_eq!(bus.read32(0x0), 0x11223344);
    assert_eq!(bus.read8(0x0), 0xFF);
}

#[test]
fn test_unmap() {
    let mut bus = create_test_space();
    bus.write32(0x0, 7);

    let region = bus.unmap(RAM_BASE).unwrap();
    assert_eq!(region.name(), "ram");
    assert_eq!(bus.read32(0x0), 0xFFFF_FFFF);

    assert_eq!(bus.unmap(RAM_BASE).unwrap_err(), ConfigError::NoSuchRegion(0));

    // The window can be reused afterwards
    bus.map(MemoryRegion::ram("ram2", RAM_BASE, 0x1000)).unwrap();
    assert_eq!(bus.read32(0x0), 0);
}

#[test]
fn test_memory_regions_in_mapping_order() {
    let mut bus = create_test_space();
    bus.map(MemoryRegion::flash("flash", 0x1FA0_0000, 0x1000)).unwrap();

    let names: Vec<&str> = bus.memory_regions().map(|r| r.name()).collect();
    assert_eq!(names, vec!["ram", "rom", "flash"]);
}
