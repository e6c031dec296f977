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

mod memory;

pub use memory::InMemoryExecutableModule;

use crate::VirtAddr;

/// A loadable section of an executable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionInfo {
    pub name: String,

    /// Virtual page the section starts at
    pub first_vpn: usize,

    /// Length of the section in pages
    pub page_count: usize,

    pub read_only: bool,
}

impl SectionInfo {
    #[inline]
    pub fn contains(&self, vpn: usize) -> bool {
        vpn >= self.first_vpn && vpn < self.first_vpn + self.page_count
    }
}

/// Parsed executable that pages of an address space are loaded from.
///
/// The executable stays open for the whole lifetime of the address space and is
/// closed when it is dropped.
pub trait ExecutableModule: Send {
    fn sections(&self) -> &[SectionInfo];

    /// Initial program counter
    fn entry_point(&self) -> VirtAddr;

    /// Fills `dest` with the on-disk content of page `page_index` of section `section`.
    ///
    /// `dest` is exactly one page big.
    fn load_page(&mut self, section: usize, page_index: usize, dest: &mut [u8]) -> Result<(), ()>;
}
