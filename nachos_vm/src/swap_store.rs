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

use log::{debug, trace};

use crate::modules::swap_storage::SwapStorageModule;

/// Page granular slot bookkeeping on top of a [`SwapStorageModule`].
///
/// Slot `i` occupies the bytes `[i * page_size, (i + 1) * page_size)`.
pub(crate) struct SwapStore<S: SwapStorageModule> {
    storage: S,
    page_size: usize,

    /// first slot that was never handed out
    next_slot: usize,

    /// slots that were handed out before and are free again
    free_slots: Vec<usize>,
}

impl<S: SwapStorageModule> SwapStore<S> {
    pub(crate) fn new(storage: S, page_size: usize) -> Self {
        Self {
            storage,
            page_size,
            next_slot: 0,
            free_slots: Vec::new(),
        }
    }

    pub(crate) fn allocate_slot(&mut self) -> usize {
        let slot = match self.free_slots.pop() {
            Some(slot) => slot,
            None => {
                let slot = self.next_slot;
                self.next_slot += 1;
                slot
            }
        };

        debug!("Allocated swap slot {}", slot);
        slot
    }

    pub(crate) fn free_slot(&mut self, slot: usize) {
        debug_assert!(slot < self.next_slot, "slot {} was never allocated", slot);
        debug_assert!(
            !self.free_slots.contains(&slot),
            "slot {} was freed twice",
            slot
        );

        self.free_slots.push(slot);
        debug!("Freed swap slot {}", slot);
    }

    pub(crate) fn write_page(&mut self, slot: usize, src: &[u8]) -> Result<(), ()> {
        debug_assert_eq!(src.len(), self.page_size);
        trace!("Write page to swap slot {}", slot);

        self.storage.write(slot * self.page_size, src)
    }

    pub(crate) fn read_page(&mut self, slot: usize, dest: &mut [u8]) -> Result<(), ()> {
        debug_assert_eq!(dest.len(), self.page_size);
        trace!("Read page from swap slot {}", slot);

        self.storage.read(slot * self.page_size, dest)
    }

    /// How many slots currently hold content
    #[inline]
    pub(crate) fn slots_in_use(&self) -> usize {
        self.next_slot - self.free_slots.len()
    }

    /// How many slots were ever handed out
    #[inline]
    pub(crate) fn slots_allocated(&self) -> usize {
        self.next_slot
    }

    pub(crate) fn is_free(&self, slot: usize) -> bool {
        slot >= self.next_slot || self.free_slots.contains(&slot)
    }
}
