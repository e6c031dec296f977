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

use log::{error, trace};

use super::{ExecutableModule, SectionInfo};
use crate::{util::ceil_div, VirtAddr};

/// Executable whose sections are kept in host memory.
///
/// Sections are laid out back to back in the order they are added,
/// the last page of every section is padded with zeros.
pub struct InMemoryExecutableModule {
    page_size: usize,
    entry_point: VirtAddr,
    sections: Vec<SectionInfo>,
    contents: Vec<Vec<u8>>,
}

impl InMemoryExecutableModule {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size,
            entry_point: 0,
            sections: Vec::new(),
            contents: Vec::new(),
        }
    }

    /// Appends a section right after the previous one
    pub fn with_section(self, name: &str, content: Vec<u8>, read_only: bool) -> Self {
        let first_vpn = self
            .sections
            .last()
            .map(|section| section.first_vpn + section.page_count)
            .unwrap_or(0);

        self.with_section_at(name, first_vpn, content, read_only)
    }

    /// Adds a section that starts at `first_vpn`
    pub fn with_section_at(
        mut self,
        name: &str,
        first_vpn: usize,
        content: Vec<u8>,
        read_only: bool,
    ) -> Self {
        self.sections.push(SectionInfo {
            name: name.to_string(),
            first_vpn,
            page_count: ceil_div(content.len(), self.page_size),
            read_only,
        });
        self.contents.push(content);
        self
    }

    pub fn with_entry_point(mut self, entry_point: VirtAddr) -> Self {
        self.entry_point = entry_point;
        self
    }
}

impl ExecutableModule for InMemoryExecutableModule {
    fn sections(&self) -> &[SectionInfo] {
        &self.sections
    }

    fn entry_point(&self) -> VirtAddr {
        self.entry_point
    }

    fn load_page(&mut self, section: usize, page_index: usize, dest: &mut [u8]) -> Result<(), ()> {
        let (info, content) = match (self.sections.get(section), self.contents.get(section)) {
            (Some(info), Some(content)) => (info, content),
            _ => {
                error!("executable has no section {}", section);
                return Err(());
            }
        };

        if page_index >= info.page_count || dest.len() != self.page_size {
            error!(
                "illegal page load: section {} has {} pages, requested page {} into {} bytes",
                info.name,
                info.page_count,
                page_index,
                dest.len()
            );
            return Err(());
        }

        trace!("Load page {} of section {}", page_index, info.name);

        let start = page_index * self.page_size;
        let end = content.len().min(start + self.page_size);
        let len = end - start;

        dest[..len].copy_from_slice(&content[start..end]);
        dest[len..].fill(0);

        Ok(())
    }
}
