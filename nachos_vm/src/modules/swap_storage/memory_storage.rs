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

use log::error;

use super::SwapStorageModule;

/// Swap storage that lives in host memory
#[derive(Default)]
pub struct MemorySwapStorageModule {
    data: Vec<u8>,
}

impl MemorySwapStorageModule {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SwapStorageModule for MemorySwapStorageModule {
    fn read(&mut self, offset: usize, dest: &mut [u8]) -> Result<(), ()> {
        let src = self.data.get(offset..offset + dest.len()).ok_or_else(|| {
            error!(
                "illegal swap read, offset: {}, len: {}, size: {}",
                offset,
                dest.len(),
                self.data.len()
            )
        })?;

        dest.copy_from_slice(src);
        Ok(())
    }

    fn write(&mut self, offset: usize, src: &[u8]) -> Result<(), ()> {
        let end = offset + src.len();
        if end > self.data.len() {
            self.data.resize(end, 0);
        }

        self.data[offset..end].copy_from_slice(src);
        Ok(())
    }

    fn get_size(&self) -> usize {
        self.data.len()
    }
}
