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

mod address_space;
mod frame_allocator;
mod inverted_page_table;
mod swap_store;
mod translation_entry;
mod util;
mod virtual_memory;
mod vm_config;

pub mod modules;

#[cfg(test)]
mod test;

pub use address_space::{
    AddressSpace, ExceptionCause, ExceptionOutcome, FaultResolution, LoadError, PagingMode,
    ProcessImage,
};
pub use inverted_page_table::ProcessId;
pub use translation_entry::TranslationEntry;
pub use virtual_memory::{VMStats, VirtualMemory};
pub use vm_config::{
    VMConfig, VirtAddr, DEFAULT_FRAME_COUNT, DEFAULT_PAGE_SIZE, DEFAULT_STACK_PAGES,
};

#[cfg(test)]
pub(crate) fn get_test_vm(
    test_name: &str,
    config: VMConfig,
) -> std::sync::Arc<VirtualMemory<modules::swap_storage::FileSwapStorageModule>> {
    let _ = env_logger::builder().is_test(true).try_init();

    let storage = modules::swap_storage::test::get_test_storage(test_name);
    std::sync::Arc::new(VirtualMemory::new(config, storage))
}
