/*
 *  Copyright (C) 2025  Markus Elias Gerber
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  You should have received a copy of the GNU General Public License
 *  along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

use rand::{rngs::SmallRng, SeedableRng};

use super::{load_demand, rand_bytes, read_page, test_config, write_page, TEST_PAGE_SIZE};
use crate::{get_test_vm, FaultResolution};

#[test]
fn test_clock_evicts_in_sweep_order() {
    let vm = get_test_vm("test_clock_evicts_in_sweep_order", test_config(2, 0));
    let mut rand = SmallRng::seed_from_u64(7385138513857);
    let content = rand_bytes(&mut rand, 3 * TEST_PAGE_SIZE);
    let space = load_demand(&vm, content.clone());
    assert_eq!(space.page_count(), 4);

    assert_eq!(read_page(&space, 0), &content[0..64]);
    assert_eq!(read_page(&space, 1), &content[64..128]);
    vm.check_frame_accounting().unwrap();
    assert_eq!(vm.stats().unwrap().free_frames, 0);

    // both frames were used, so the sweep clears both bits and takes frame 0
    assert_eq!(space.handle_page_fault(2 * 64 + 5).unwrap(), FaultResolution::Resolved);
    vm.check_frame_accounting().unwrap();

    let table = space.page_table().unwrap();
    assert!(!table[0].is_valid());
    assert_eq!(table[0].swap_slot(), None);
    assert!(table[1].is_valid());
    assert!(!table[1].is_used());
    assert!(table[2].is_valid());
    assert_eq!(table[2].ppn(), 0);

    let stats = vm.stats().unwrap();
    assert_eq!(stats.evictions, 1);
    assert_eq!(stats.swap_outs, 0);
    assert_eq!(stats.page_faults, 3);

    // clean pages are loaded from the executable again
    assert_eq!(read_page(&space, 0), &content[0..64]);
    vm.check_frame_accounting().unwrap();

    let table = space.page_table().unwrap();
    assert!(!table[1].is_valid(), "page 1 lost its second chance");
    assert!(table[0].is_valid());
    assert_eq!(table[0].ppn(), 1);
    assert_eq!(read_page(&space, 2), &content[128..192]);
}

#[test]
fn test_dirty_pages_go_through_swap() {
    let vm = get_test_vm("test_dirty_pages_go_through_swap", test_config(2, 0));
    let mut rand = SmallRng::seed_from_u64(1298375612);
    let space = load_demand(&vm, vec![0u8; 3 * TEST_PAGE_SIZE]);

    let pages: Vec<Vec<u8>> = (0..3).map(|_| rand_bytes(&mut rand, TEST_PAGE_SIZE)).collect();
    for (vpn, page) in pages.iter().enumerate() {
        write_page(&space, vpn, page);
        vm.check_frame_accounting().unwrap();
    }

    // page 0 was written, so it had to be swapped out
    let table = space.page_table().unwrap();
    assert!(!table[0].is_valid());
    assert!(table[0].is_dirty());
    assert_eq!(table[0].swap_slot(), Some(0));

    let stats = vm.stats().unwrap();
    assert_eq!(stats.swap_outs, 1);
    assert_eq!(stats.swap_slots_in_use, 1);

    // page 1 gets evicted into a fresh slot, slot 0 is released by the swap in
    assert_eq!(read_page(&space, 0), pages[0]);
    vm.check_frame_accounting().unwrap();

    let table = space.page_table().unwrap();
    assert!(table[0].is_valid());
    assert!(table[0].is_dirty(), "swapped in pages only exist in memory");
    assert_eq!(table[0].swap_slot(), None);
    assert_eq!(table[1].swap_slot(), Some(1));

    let stats = vm.stats().unwrap();
    assert_eq!(stats.swap_outs, 2);
    assert_eq!(stats.swap_ins, 1);
    assert_eq!(stats.swap_slots_in_use, 1);

    // page 2 reuses slot 0
    assert_eq!(read_page(&space, 1), pages[1]);
    vm.check_frame_accounting().unwrap();

    let table = space.page_table().unwrap();
    assert_eq!(table[2].swap_slot(), Some(0));

    let stats = vm.stats().unwrap();
    assert_eq!(stats.swap_outs, 3);
    assert_eq!(stats.swap_ins, 2);
    assert_eq!(stats.swap_slots_in_use, 1);
    assert_eq!(stats.swap_slots_allocated, 2);

    assert_eq!(read_page(&space, 2), pages[2]);
    vm.check_frame_accounting().unwrap();
}

#[test]
fn test_random_workload_keeps_frames_exclusive() {
    use rand::Rng;

    let vm = get_test_vm("test_random_workload_keeps_frames_exclusive", test_config(5, 2));
    let mut rand = SmallRng::seed_from_u64(8754653216549);

    let mut spaces = Vec::new();
    let mut shadows = Vec::new();
    for pages in [4usize, 6] {
        let content = rand_bytes(&mut rand, pages * TEST_PAGE_SIZE);
        let space = load_demand(&vm, content.clone());

        // stack and argument pages start zeroed
        let mut shadow = content;
        shadow.resize(space.page_count() * TEST_PAGE_SIZE, 0);

        spaces.push(space);
        shadows.push(shadow);
    }

    for _ in 0..400 {
        let index = rand.gen_range(0..spaces.len());
        let space = &spaces[index];
        let shadow = &mut shadows[index];

        let start = rand.gen_range(0..shadow.len());
        let len = rand.gen_range(1..3 * TEST_PAGE_SIZE);
        let end = (start + len).min(shadow.len());

        if rand.gen_bool(0.5) {
            let data = rand_bytes(&mut rand, len);
            let written = space.write_virtual_memory(start as i32, &data, 0, len);
            assert_eq!(written, end - start);
            shadow[start..end].copy_from_slice(&data[..written]);
        } else {
            let mut data = vec![0u8; len];
            let read = space.read_virtual_memory(start as i32, &mut data, 0, len);
            assert_eq!(read, end - start);
            assert_eq!(&data[..read], &shadow[start..end]);
        }

        vm.check_frame_accounting().unwrap();
    }

    for (space, shadow) in spaces.iter().zip(shadows.iter()) {
        let mut data = vec![0u8; shadow.len()];
        assert_eq!(space.read_virtual_memory_all(0, &mut data), shadow.len());
        assert_eq!(&data, shadow);
    }

    let stats = vm.stats().unwrap();
    assert!(stats.evictions > 0);
    assert!(stats.swap_ins > 0);
    assert_eq!(stats.pinned_frames, 0);
}
