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

use static_assertions::const_assert;

/// A virtual address as it is stored in a register of the simulated processor.
///
/// Addresses handed in by user programs can be negative, which is why this is signed.
pub type VirtAddr = i32;

pub const DEFAULT_PAGE_SIZE: usize = 0x400;
pub const DEFAULT_FRAME_COUNT: usize = 32;
pub const DEFAULT_STACK_PAGES: usize = 8;

const_assert!(DEFAULT_PAGE_SIZE.is_power_of_two());
const_assert!(DEFAULT_FRAME_COUNT > 0);

/// Machine parameters the virtual memory manager is booted with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VMConfig {
    /// Size of a virtual page and of a physical frame in bytes
    pub page_size: usize,

    /// Number of physical frames in main memory
    pub frame_count: usize,

    /// How many pages every process reserves for its user stack
    pub stack_pages: usize,
}

impl Default for VMConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            frame_count: DEFAULT_FRAME_COUNT,
            stack_pages: DEFAULT_STACK_PAGES,
        }
    }
}

impl VMConfig {
    pub(crate) fn validate(&self) {
        assert!(
            self.page_size.is_power_of_two(),
            "page size has to be a power of two (got {})",
            self.page_size
        );
        assert!(
            self.page_size >= 8,
            "page size is too small (got {})",
            self.page_size
        );
        assert!(self.frame_count > 0, "at least one physical frame is required");
    }

    /// Total size of main memory in bytes
    #[inline]
    pub fn memory_size(&self) -> usize {
        self.page_size * self.frame_count
    }

    #[inline]
    pub fn page_from_address(&self, vaddr: usize) -> usize {
        vaddr / self.page_size
    }

    #[inline]
    pub fn offset_from_address(&self, vaddr: usize) -> usize {
        vaddr % self.page_size
    }

    #[inline]
    pub fn make_address(&self, page: usize, offset: usize) -> usize {
        debug_assert!(offset < self.page_size);
        page * self.page_size + offset
    }
}

#[cfg(test)]
mod test {
    use super::VMConfig;

    #[test]
    fn test_address_split() {
        let config = VMConfig {
            page_size: 128,
            frame_count: 4,
            stack_pages: 0,
        };

        for vaddr in [0, 1, 127, 128, 129, 1000, 4095] {
            let page = config.page_from_address(vaddr);
            let offset = config.offset_from_address(vaddr);

            assert!(offset < config.page_size);
            assert_eq!(config.make_address(page, offset), vaddr);
        }

        assert_eq!(config.memory_size(), 512);
    }

    #[test]
    #[should_panic]
    fn test_reject_odd_page_size() {
        VMConfig {
            page_size: 1000,
            frame_count: 4,
            stack_pages: 0,
        }
        .validate();
    }
}
