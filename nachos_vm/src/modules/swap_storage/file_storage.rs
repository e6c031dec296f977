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

use std::{
    fs::{remove_file, File},
    io::{Read, Seek, SeekFrom, Write},
    mem::ManuallyDrop,
    path::Path,
};

use log::error;

use super::SwapStorageModule;

/// Swap file on the host file system.
///
/// The file is truncated when the module is created and removed once it is dropped,
/// as its content is meaningless without the page tables of the running processes.
pub struct FileSwapStorageModule {
    /// underlying swap file
    file: ManuallyDrop<File>,

    /// path of file, save for deleting file later
    file_path: String,

    /// cached file size, so no `metadata` call necessary
    file_size: usize,
}

impl FileSwapStorageModule {
    /// Creates a new, empty swap file at `filepath`
    pub fn new(filepath: String) -> std::io::Result<Self> {
        let file = File::options()
            .read(true)
            .write(true)
            .truncate(true)
            .create(true)
            .open(filepath.clone())?;

        Ok(Self {
            file: ManuallyDrop::new(file),
            file_path: filepath,
            file_size: 0,
        })
    }
}

impl SwapStorageModule for FileSwapStorageModule {
    fn read(&mut self, offset: usize, dest: &mut [u8]) -> Result<(), ()> {
        if offset + dest.len() > self.file_size {
            error!(
                "illegal swap read, offset: {}, len: {}, file_size: {}",
                offset,
                dest.len(),
                self.file_size
            );
            return Err(());
        }

        self.file
            .seek(SeekFrom::Start(offset as u64))
            .map_err(|e| error!("could not seek in swap file: {}", e))?;
        self.file
            .read_exact(dest)
            .map_err(|e| error!("could not read from swap file: {}", e))?;

        Ok(())
    }

    fn write(&mut self, offset: usize, src: &[u8]) -> Result<(), ()> {
        self.file
            .seek(SeekFrom::Start(offset as u64))
            .map_err(|e| error!("could not seek in swap file: {}", e))?;
        self.file
            .write_all(src)
            .map_err(|e| error!("could not write to swap file: {}", e))?;

        self.file_size = self.file_size.max(offset + src.len());
        Ok(())
    }

    fn get_size(&self) -> usize {
        self.file_size
    }
}

impl Drop for FileSwapStorageModule {
    fn drop(&mut self) {
        // drop and close file before removing
        // note that after this call, file should never be accessed again...
        unsafe {
            ManuallyDrop::drop(&mut self.file);
        }

        if Path::new(self.file_path.as_str()).exists() {
            let _ = remove_file(self.file_path.as_str());
        }
    }
}

#[cfg(test)]
mod test {
    use std::path::Path;

    use super::super::test::{test_swap_storage_bounds, test_swap_storage_normal};
    use super::FileSwapStorageModule;

    #[test]
    fn test_file_swap_storage_normal() {
        let storage =
            FileSwapStorageModule::new("/tmp/test_file_swap_storage_normal.swap".into()).unwrap();
        test_swap_storage_normal(storage);
    }

    #[test]
    fn test_file_swap_storage_bounds() {
        let storage =
            FileSwapStorageModule::new("/tmp/test_file_swap_storage_bounds.swap".into()).unwrap();
        test_swap_storage_bounds(storage);
    }

    #[test]
    fn test_file_swap_storage_removed_on_drop() {
        const PATH: &str = "/tmp/test_file_swap_storage_removed_on_drop.swap";

        let storage = FileSwapStorageModule::new(PATH.into()).unwrap();
        assert!(Path::new(PATH).exists());

        drop(storage);
        assert!(!Path::new(PATH).exists());
    }
}
