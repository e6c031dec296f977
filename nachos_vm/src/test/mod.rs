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

mod eviction;

use std::sync::Arc;

use rand::{rngs::SmallRng, RngCore};

use crate::{
    modules::{
        executable::InMemoryExecutableModule,
        swap_storage::{FileSwapStorageModule, SwapStorageModule},
    },
    AddressSpace, PagingMode, VMConfig, VirtualMemory,
};

pub(crate) type TestVM = VirtualMemory<FileSwapStorageModule>;
pub(crate) type TestSpace = AddressSpace<FileSwapStorageModule>;

pub(crate) const TEST_PAGE_SIZE: usize = 64;

pub(crate) fn test_config(frame_count: usize, stack_pages: usize) -> VMConfig {
    VMConfig {
        page_size: TEST_PAGE_SIZE,
        frame_count,
        stack_pages,
    }
}

pub(crate) fn rand_bytes(rand: &mut SmallRng, len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    rand.fill_bytes(&mut bytes);
    bytes
}

/// Executable with a single writable `.data` section
pub(crate) fn data_executable(content: Vec<u8>) -> Box<InMemoryExecutableModule> {
    Box::new(InMemoryExecutableModule::new(TEST_PAGE_SIZE).with_section(".data", content, false))
}

pub(crate) fn load_demand<S: SwapStorageModule>(
    vm: &Arc<VirtualMemory<S>>,
    content: Vec<u8>,
) -> AddressSpace<S> {
    AddressSpace::load(vm.clone(), data_executable(content), &[], PagingMode::Demand).unwrap()
}

/// Reads the whole page `vpn` and checks the amount of bytes transferred
pub(crate) fn read_page<S: SwapStorageModule>(space: &AddressSpace<S>, vpn: usize) -> Vec<u8> {
    let mut page = vec![0u8; TEST_PAGE_SIZE];
    let read = space.read_virtual_memory_all((vpn * TEST_PAGE_SIZE) as i32, &mut page);
    assert_eq!(read, TEST_PAGE_SIZE, "could not read page {}", vpn);
    page
}

pub(crate) fn write_page<S: SwapStorageModule>(space: &AddressSpace<S>, vpn: usize, data: &[u8]) {
    assert_eq!(data.len(), TEST_PAGE_SIZE);
    let written = space.write_virtual_memory_all((vpn * TEST_PAGE_SIZE) as i32, data);
    assert_eq!(written, TEST_PAGE_SIZE, "could not write page {}", vpn);
}
