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

const RW: PageFlags = PageFlags::VALID.union(PageFlags::DIRTY);

fn paged() -> Mmu {
    let mut mmu = Mmu::new(true);
    mmu.write_entry(0, TlbEntry::mapping(0x0040_0000, 1, 0x0010_0000, RW));
    mmu.write_entry(1, TlbEntry::mapping(0x0040_1000, 1, 0x0010_1000, PageFlags::VALID));
    mmu.write_entry(2, TlbEntry::mapping(0x0040_2000, 1, 0x0010_2000, RW | PageFlags::NO_EXEC));
    mmu.write_entry(3, TlbEntry::mapping(0x0040_3000, 1, 0x0010_3000, PageFlags::DIRTY));
    mmu.write_entry(4, TlbEntry::mapping(0xC000_0000, 0, 0x0020_0000, RW | PageFlags::GLOBAL));
    mmu.set_asid(1);
    mmu
}

fn fault(mmu: &mut Mmu, vaddr: u32, access: AccessKind, mode: PrivilegeMode) -> FaultKind {
    mmu.translate(vaddr, access, mode).unwrap_err().kind
}

#[test]
fn test_kseg0_kseg1_are_direct() {
    let mut mmu = paged();
    assert_eq!(
        mmu.translate(0x8001_2345, AccessKind::Read, PrivilegeMode::Kernel),
        Ok(0x0001_2345)
    );
    assert_eq!(
        mmu.translate(0xBFC0_0000, AccessKind::Fetch, PrivilegeMode::Kernel),
        Ok(0x1FC0_0000)
    );
}

#[test]
fn test_unpaged_kuseg_is_direct() {
    let mut mmu = Mmu::new(false);
    assert_eq!(
        mmu.translate(0x0001_0000, AccessKind::Write, PrivilegeMode::User),
        Ok(0x0001_0000)
    );
    assert_eq!(
        mmu.translate(0xC000_1000, AccessKind::Read, PrivilegeMode::Kernel),
        Ok(0x0000_1000)
    );
}

#[test]
fn test_user_mode_cannot_touch_kernel_segments() {
    let mut mmu = Mmu::new(false);
    assert_eq!(
        fault(&mut mmu, 0x8000_0000, AccessKind::Read, PrivilegeMode::User),
        FaultKind::AddressError
    );
    assert_eq!(
        fault(&mut mmu, 0xC000_0000, AccessKind::Fetch, PrivilegeMode::User),
        FaultKind::AddressError
    );
}

#[test]
fn test_mapped_translation() {
    let mut mmu = paged();
    assert_eq!(
        mmu.translate(0x0040_0ABC, AccessKind::Write, PrivilegeMode::User),
        Ok(0x0010_0ABC)
    );
    assert_eq!(
        mmu.translate(0xC000_0010, AccessKind::Read, PrivilegeMode::Kernel),
        Ok(0x0020_0010)
    );
}

#[test]
fn test_fault_kinds() {
    let mut mmu = paged();
    let user = PrivilegeMode::User;

    assert_eq!(fault(&mut mmu, 0x0050_0000, AccessKind::Read, user), FaultKind::TlbMiss);
    assert_eq!(fault(&mut mmu, 0x0040_1000, AccessKind::Write, user), FaultKind::Modified);
    assert_eq!(fault(&mut mmu, 0x0040_2000, AccessKind::Fetch, user), FaultKind::NoExecute);
    assert_eq!(fault(&mut mmu, 0x0040_3000, AccessKind::Read, user), FaultKind::Invalid);

    // Read-only page still reads, no-exec page still loads
    assert!(mmu.translate(0x0040_1000, AccessKind::Read, user).is_ok());
    assert!(mmu.translate(0x0040_2000, AccessKind::Read, user).is_ok());
}

#[test]
fn test_fault_reports_address_and_access() {
    let mut mmu = paged();
    let fault = mmu
        .translate(0x0050_0123, AccessKind::Write, PrivilegeMode::User)
        .unwrap_err();
    assert_eq!(fault.vaddr, 0x0050_0123);
    assert_eq!(fault.access, AccessKind::Write);
    assert!(fault.is_refill());
    assert!(fault.is_tlb());

    let mut mmu = paged();
    let fault = mmu
        .translate(0xC010_0000, AccessKind::Read, PrivilegeMode::Kernel)
        .unwrap_err();
    assert_eq!(fault.kind, FaultKind::TlbMiss);
    assert!(!fault.is_refill());
}

#[test]
fn test_misaligned_access() {
    let mut mmu = paged();
    let fault = mmu
        .translate_access(0x0040_0002, 4, AccessKind::Read, PrivilegeMode::User)
        .unwrap_err();
    assert_eq!(fault.kind, FaultKind::Misaligned);
    assert!(!fault.is_tlb());

    assert!(mmu
        .translate_access(0x0040_0002, 2, AccessKind::Read, PrivilegeMode::User)
        .is_ok());
}

#[test]
fn test_asid_isolation() {
    let mut mmu = paged();
    mmu.set_asid(2);
    assert_eq!(
        fault(&mut mmu, 0x0040_0000, AccessKind::Read, PrivilegeMode::User),
        FaultKind::TlbMiss
    );
    // Global entries ignore the ASID
    assert!(mmu
        .translate(0xC000_0000, AccessKind::Read, PrivilegeMode::Kernel)
        .is_ok());
}

#[test]
fn test_micro_tlb_hits_after_first_lookup() {
    let mut mmu = paged();
    mmu.translate(0x0040_0000, AccessKind::Read, PrivilegeMode::User)
        .unwrap();
    mmu.translate(0x0040_0004, AccessKind::Read, PrivilegeMode::User)
        .unwrap();

    let stats = mmu.stats();
    assert_eq!(stats.table_hits, 1);
    assert_eq!(stats.micro_hits, 1);
}

#[test]
fn test_tlb_write_invalidates_cached_translation() {
    let mut mmu = paged();
    assert_eq!(
        mmu.translate(0x0040_0000, AccessKind::Read, PrivilegeMode::User),
        Ok(0x0010_0000)
    );

    mmu.write_entry(0, TlbEntry::mapping(0x0040_0000, 1, 0x0030_0000, RW));
    assert_eq!(
        mmu.translate(0x0040_0000, AccessKind::Read, PrivilegeMode::User),
        Ok(0x0030_0000)
    );
}

#[test]
fn test_micro_tlb_round_robin() {
    let mut mmu = Mmu::new(true);
    for i in 0..6u32 {
        mmu.write_entry(
            i as usize,
            TlbEntry::mapping(0x0100_0000 + i * 0x1000, 0, 0x0100_0000 + i * 0x1000, RW),
        );
    }
    for i in 0..6u32 {
        mmu.translate(0x0100_0000 + i * 0x1000, AccessKind::Read, PrivilegeMode::Kernel)
            .unwrap();
    }
    // All six went to the table; the first two have been evicted since
    assert_eq!(mmu.stats().table_hits, 6);
    mmu.translate(0x0100_5000, AccessKind::Read, PrivilegeMode::Kernel)
        .unwrap();
    assert_eq!(mmu.stats().micro_hits, 1);
    mmu.translate(0x0100_0000, AccessKind::Read, PrivilegeMode::Kernel)
        .unwrap();
    assert_eq!(mmu.stats().table_hits, 7);
}

#[test]
fn test_probe() {
    let mmu = paged();
    assert_eq!(mmu.probe(0x0040_1000 | (1 << 6)), Some(1));
    assert_eq!(mmu.probe(0x0040_1000 | (2 << 6)), None);
    assert_eq!(mmu.probe(0xC000_0000 | (9 << 6)), Some(4));
}

#[test]
fn test_state_round_trip() {
    let mmu = paged();
    let state = mmu.state();

    let mut restored = Mmu::new(true);
    Mmu::validate(&state).unwrap();
    restored.restore(&state);
    assert_eq!(restored.asid(), 1);
    assert_eq!(restored.read_entry(0), mmu.read_entry(0));
    assert_eq!(
        restored.translate(0x0040_0004, AccessKind::Read, PrivilegeMode::User),
        Ok(0x0010_0004)
    );
}

#[test]
fn test_restore_rejects_wrong_entry_count() {
    let state = MmuState {
        entries: vec![TlbEntry::default(); 3],
        asid: 0,
    };
    assert!(Mmu::validate(&state).is_err());
}
