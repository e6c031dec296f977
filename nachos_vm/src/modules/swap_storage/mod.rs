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

mod file_storage;
mod memory_storage;

pub use file_storage::FileSwapStorageModule;
pub use memory_storage::MemorySwapStorageModule;

/// Byte addressable backing file for evicted pages.
///
/// The content has no header or metadata, it only makes sense together with the
/// translation entries that reference it.
pub trait SwapStorageModule: Send {
    /// Reads the region `[offset, offset + dest.len())` into `dest`.
    ///
    /// If this call fails, it could be that already some data was written to `dest`.
    fn read(&mut self, offset: usize, dest: &mut [u8]) -> Result<(), ()>;

    /// Writes the region `src` back to the underlying storage `[offset, offset + src.len())`.
    ///
    /// Writing past the current end grows the storage.
    fn write(&mut self, offset: usize, src: &[u8]) -> Result<(), ()>;

    /// Returns the current size in bytes of this storage
    fn get_size(&self) -> usize;
}

#[cfg(test)]
pub(crate) mod test {
    use super::{FileSwapStorageModule, SwapStorageModule};

    pub(crate) fn get_test_storage(test_name: &str) -> FileSwapStorageModule {
        FileSwapStorageModule::new(format!("/tmp/{}.swap", test_name)).unwrap()
    }

    pub(crate) fn gen_number(i: usize) -> u8 {
        (i * 3 + (i % 3) * 7 + (i % 11) * 51) as u8
    }

    pub(super) const SWAP_STORAGE_NORMAL_TEST_SIZE: usize = 4096;

    /// test if write saves all data and read restores all of it
    pub(super) fn test_swap_storage_normal<T: SwapStorageModule>(mut module: T) {
        const SUB_TEST_SIZE: usize = SWAP_STORAGE_NORMAL_TEST_SIZE / 32;

        // generate some data
        let mut source_slice = [0u8; SWAP_STORAGE_NORMAL_TEST_SIZE];
        for i in 0..SWAP_STORAGE_NORMAL_TEST_SIZE {
            source_slice[i] = gen_number(i);
        }

        // write back to front, so that the first write already grows the storage
        for i in (0..SWAP_STORAGE_NORMAL_TEST_SIZE / SUB_TEST_SIZE).rev() {
            let offset = i * SUB_TEST_SIZE;
            module
                .write(offset, &source_slice[offset..offset + SUB_TEST_SIZE])
                .unwrap();
        }
        assert_eq!(module.get_size(), SWAP_STORAGE_NORMAL_TEST_SIZE);

        let mut test_slice = [0u8; SUB_TEST_SIZE];
        for i in 0..SWAP_STORAGE_NORMAL_TEST_SIZE / SUB_TEST_SIZE {
            let offset = i * SUB_TEST_SIZE;
            module.read(offset, &mut test_slice).unwrap();

            for x in 0..SUB_TEST_SIZE {
                assert_eq!(test_slice[x], source_slice[offset + x]);
            }
        }
    }

    /// reading past the end is an error, overwriting does not change the size
    pub(super) fn test_swap_storage_bounds<T: SwapStorageModule>(mut module: T) {
        assert_eq!(module.get_size(), 0);

        let mut buffer = [0u8; 16];
        module.read(0, &mut buffer).expect_err("storage is empty");

        module.write(16, &[7u8; 16]).unwrap();
        assert_eq!(module.get_size(), 32);

        // gap before the first write reads as zeros
        module.read(0, &mut buffer).unwrap();
        assert_eq!(buffer, [0u8; 16]);

        module.write(0, &[1u8; 16]).unwrap();
        assert_eq!(module.get_size(), 32);

        module.read(16, &mut buffer).unwrap();
        assert_eq!(buffer, [7u8; 16]);

        module.read(24, &mut buffer).expect_err("reads past the end");
    }
}
