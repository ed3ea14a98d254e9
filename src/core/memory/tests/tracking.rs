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

//! Write-trap dirty tracking and code generations

use super::helpers::*;

#[test]
fn test_protected_page_traps_first_write() {
    let mut bus = create_test_space();
    bus.protect_range(0x1000, 0x2000);

    assert!(bus.is_protected(0x1000));
    assert!(bus.is_protected(0x2FFF));
    assert!(!bus.is_protected(0x3000));

    bus.write32(0x1004, 1);
    // The write completes and lifts the protection
    assert_eq!(bus.read32(0x1004), 1);
    assert!(!bus.is_protected(0x1000));
    assert!(bus.is_protected(0x2000));

    assert_eq!(bus.take_dirty_pages(), vec![0x1000]);
    assert!(bus.take_dirty_pages().is_empty());
}

#[test]
fn test_protection_follows_mirrors() {
    let mut bus = create_test_space();
    bus.protect_range(0x0000, 0x1000);

    // Same backing page through the second mirror
    bus.write8(RAM_SIZE + 0x10, 0xEE);
    assert_eq!(bus.take_dirty_pages(), vec![0x0000]);
}

#[test]
fn test_unprotect_range() {
    let mut bus = create_test_space();
    bus.protect_range(0x0, RAM_SIZE);
    bus.unprotect_range(0x0, RAM_SIZE);

    bus.write32(0x0, 1);
    assert!(bus.take_dirty_pages().is_empty());
}

#[test]
fn test_code_page_generation_bumps_on_write() {
    let mut bus = create_test_space();
    let generation = bus.page_generation(0x2000);

    // Writes to unmarked pages are not tracked
    bus.write32(0x2000, 1);
    assert_eq!(bus.page_generation(0x2000), generation);

    bus.mark_code_page(0x2000);
    bus.write32(0x2010, 2);
    assert_eq!(bus.page_generation(0x2000), generation + 1);

    // A mirror write hits the same canonical page
    bus.write32(RAM_SIZE * 2 + 0x2010, 3);
    assert_eq!(bus.page_generation(0x2000), generation + 2);
    assert_eq!(bus.canonical_page_base(RAM_SIZE * 2 + 0x2010), Some(0x2000));
}

#[test]
fn test_image_load_bumps_code_generation() {
    let mut bus = create_test_space();
    bus.mark_code_page(0x0);
    let generation = bus.page_generation(0x0);

    bus.write_bytes(0x0, &[0; 8]).unwrap();
    assert!(bus.page_generation(0x0) != generation);
}

#[test]
fn test_clear_code_pages() {
    let mut bus = create_test_space();
    bus.mark_code_page(0x0);
    bus.clear_code_pages();
    let generation = bus.page_generation(0x0);

    bus.write32(0x0, 1);
    assert_eq!(bus.page_generation(0x0), generation);
}

#[test]
fn test_fetch_code_only_from_memory() {
    let mut bus = create_test_space();
    bus.write32(0x80, 0x2402_0001);

    assert_eq!(bus.fetch_code(0x80), Some(0x2402_0001));
    assert_eq!(bus.fetch_code(0x0100_0000), None);
}
