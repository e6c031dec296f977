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

use super::{AddressSpace, FaultResolution, PagingMode};
use crate::{
    modules::{eviction::EvictionModule, swap_storage::SwapStorageModule},
    VirtAddr,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AccessKind {
    Read,
    Write,
}

impl<S: SwapStorageModule, E: EvictionModule> AddressSpace<S, E> {
    /// Copies up to `length` bytes starting at `vaddr` into `data[offset..]`.
    ///
    /// Stops at the first page that cannot be made resident and returns the
    /// number of bytes that were copied.
    pub fn read_virtual_memory(
        &self,
        vaddr: VirtAddr,
        data: &mut [u8],
        offset: usize,
        length: usize,
    ) -> usize {
        let Some(length) = clip_length(data.len(), offset, length) else {
            return 0;
        };

        self.transfer(vaddr, length, AccessKind::Read, |memory, done| {
            let start = offset + done;
            data[start..start + memory.len()].copy_from_slice(memory);
        })
    }

    /// Copies up to `length` bytes from `data[offset..]` to `vaddr`.
    ///
    /// Stops at the first page that cannot be made resident or is read only
    /// and returns the number of bytes that were copied.
    pub fn write_virtual_memory(
        &self,
        vaddr: VirtAddr,
        data: &[u8],
        offset: usize,
        length: usize,
    ) -> usize {
        let Some(length) = clip_length(data.len(), offset, length) else {
            return 0;
        };

        self.transfer(vaddr, length, AccessKind::Write, |memory, done| {
            let start = offset + done;
            memory.copy_from_slice(&data[start..start + memory.len()]);
        })
    }

    #[inline]
    pub fn read_virtual_memory_all(&self, vaddr: VirtAddr, data: &mut [u8]) -> usize {
        let length = data.len();
        self.read_virtual_memory(vaddr, data, 0, length)
    }

    #[inline]
    pub fn write_virtual_memory_all(&self, vaddr: VirtAddr, data: &[u8]) -> usize {
        self.write_virtual_memory(vaddr, data, 0, data.len())
    }

    /// Reads a null terminated string of at most `max_length` bytes (without the terminator)
    pub fn read_virtual_memory_string(
        &self,
        vaddr: VirtAddr,
        max_length: usize,
    ) -> Option<String> {
        // no string can be longer than the address space
        let size = self.page_count * self.vm.config().page_size;
        let mut bytes = vec![0u8; max_length.min(size).checked_add(1)?];
        let read = self.read_virtual_memory_all(vaddr, &mut bytes);

        let end = bytes[..read].iter().position(|b| *b == 0)?;
        bytes.truncate(end);
        String::from_utf8(bytes).ok()
    }

    /// Walks the pages of `vaddr..vaddr + length` and hands the resident part of
    /// every page to `copy` together with the number of bytes copied so far.
    fn transfer<F: FnMut(&mut [u8], usize)>(
        &self,
        vaddr: VirtAddr,
        length: usize,
        kind: AccessKind,
        mut copy: F,
    ) -> usize {
        if vaddr < 0 {
            trace!("{} accessed negative address {:#x}", self.pid, vaddr);
            return 0;
        }

        let config = *self.vm.config();
        let demand = self.mode == PagingMode::Demand;

        let Ok(mut state) = self.vm.lock() else {
            return 0;
        };

        let mut addr = vaddr as usize;
        let mut done = 0;

        while done < length {
            let vpn = config.page_from_address(addr);
            let page_offset = config.offset_from_address(addr);

            if vpn >= self.page_count || !self.loaded {
                break;
            }

            let Some(mut entry) = state.entry(self.pid, vpn) else {
                break;
            };

            if !entry.is_valid() {
                if !demand {
                    break;
                }

                match self.fault_in(state, vpn) {
                    Ok((guard, FaultResolution::Resolved)) => state = guard,
                    Ok((_, resolution)) => {
                        trace!(
                            "Stop access of {} at page {}: {:?}",
                            self.pid,
                            vpn,
                            resolution
                        );
                        break;
                    }
                    Err(()) => {
                        error!(
                            "Page fault of {} on page {} failed, stopping after {} bytes",
                            self.pid, vpn, done
                        );
                        break;
                    }
                }

                match state.entry(self.pid, vpn) {
                    Some(resolved) if resolved.is_valid() => entry = resolved,
                    _ => break,
                }
            }

            if kind == AccessKind::Write && entry.is_read_only() {
                trace!("{} tried to write read only page {}", self.pid, vpn);
                break;
            }

            let frame = entry.ppn();
            let amount = (config.page_size - page_offset).min(length - done);

            if demand {
                self.vm.pin(&mut state, frame);
            }

            let start = config.make_address(frame, page_offset);
            copy(&mut state.memory[start..start + amount], done);

            if let Some(entry) = state.entry_mut(self.pid, vpn) {
                entry.mark_used();
                if kind == AccessKind::Write {
                    entry.mark_dirty();
                }
            }

            if demand {
                self.vm.unpin(&mut state, frame);
            }

            done += amount;
            addr += amount;
        }

        done
    }
}

/// Number of bytes of `length` that fit into a buffer of `len` bytes starting at `offset`
fn clip_length(len: usize, offset: usize, length: usize) -> Option<usize> {
    if offset > len {
        return None;
    }
    Some(length.min(len - offset))
}

#[cfg(test)]
mod test {
    use super::clip_length;

    #[test]
    fn test_clip_length() {
        assert_eq!(clip_length(10, 0, 4), Some(4));
        assert_eq!(clip_length(10, 8, 4), Some(2));
        assert_eq!(clip_length(10, 10, 4), Some(0));
        assert_eq!(clip_length(10, 11, 4), None);
    }
}
