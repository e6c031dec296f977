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

use core::fmt::Debug;

const VALID: u8 = 1 << 0;
const READ_ONLY: u8 = 1 << 1;
const USED: u8 = 1 << 2;
const DIRTY: u8 = 1 << 3;

/*
The bit usage is as follows:
|Bit|Usage|
0    Valid (page is resident in the frame `ppn`)
1    Read Only (page belongs to a read only section)
2    Used (page was accessed since the clock hand passed it last)
3    Dirty (page was modified since it was loaded, or its only copy lives in swap)
4-7  [Unused]
*/

#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct PageStatus {
    bit_list: u8,
}

macro_rules! generate_functions {
    ($bit: ident, $get_name: ident, $set_name: ident) => {
        #[inline]
        pub(crate) fn $get_name(&self) -> bool {
            self.is_set($bit)
        }

        #[allow(unused)]
        #[inline]
        pub(crate) fn $set_name(&mut self, val: bool) {
            self.set($bit, val);
        }
    };
}

impl PageStatus {
    #[inline]
    fn is_set(&self, bitmask: u8) -> bool {
        (self.bit_list & bitmask) != 0
    }

    #[inline]
    fn set(&mut self, bitmask: u8, state: bool) {
        if state {
            // set
            self.bit_list |= bitmask;
        } else {
            // unset
            self.bit_list &= !bitmask;
        }
    }

    generate_functions!(VALID, is_valid, set_valid);
    generate_functions!(READ_ONLY, is_read_only, set_read_only);
    generate_functions!(USED, is_used, set_used);
    generate_functions!(DIRTY, is_dirty, set_dirty);
}

impl Debug for PageStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PageStatus")
            .field("valid", &self.is_valid())
            .field("read_only", &self.is_read_only())
            .field("used", &self.is_used())
            .field("dirty", &self.is_dirty())
            .finish()
    }
}

/// Mapping record of a single virtual page.
///
/// While the entry is valid, `ppn` names the frame the page lives in.
/// Once a dirty page gets evicted, `swap_slot` remembers where its content went;
/// an invalid entry without a swap slot is recreated from the executable or zero filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranslationEntry {
    vpn: usize,
    ppn: usize,
    status: PageStatus,
    swap_slot: Option<usize>,
}

impl TranslationEntry {
    /// Entry of a page that was never made resident
    pub(crate) const fn unmapped(vpn: usize) -> Self {
        Self {
            vpn,
            ppn: 0,
            status: PageStatus { bit_list: 0 },
            swap_slot: None,
        }
    }

    /// Entry of a page that was loaded up front
    pub(crate) fn preloaded(vpn: usize, ppn: usize, read_only: bool) -> Self {
        let mut status = PageStatus::default();
        status.set_valid(true);
        status.set_read_only(read_only);

        Self {
            vpn,
            ppn,
            status,
            swap_slot: None,
        }
    }

    /// Entry of a page that was just loaded by the fault handler
    pub(crate) fn faulted_in(vpn: usize, ppn: usize, read_only: bool) -> Self {
        let mut entry = Self::preloaded(vpn, ppn, read_only);
        entry.status.set_used(true);
        entry
    }

    /// Entry of a page that was just read back from swap.
    ///
    /// The swap slot is released afterwards, so main memory holds the only copy
    /// and the page has to stay dirty.
    pub(crate) fn swapped_in(vpn: usize, ppn: usize) -> Self {
        let mut entry = Self::faulted_in(vpn, ppn, false);
        entry.status.set_dirty(true);
        entry
    }

    /// Marks this entry as not resident anymore.
    ///
    /// `swap_slot` is the slot its dirty content was written to, if any.
    pub(crate) fn invalidate(&mut self, swap_slot: Option<usize>) {
        debug_assert!(self.swap_slot.is_none());

        self.status.set_valid(false);
        self.status.set_used(false);
        self.status.set_dirty(swap_slot.is_some());
        self.swap_slot = swap_slot;
    }

    /// Forgets any swap slot reference, returning it
    pub(crate) fn take_swap_slot(&mut self) -> Option<usize> {
        let slot = self.swap_slot.take();
        if slot.is_some() {
            self.status.set_dirty(false);
        }
        slot
    }

    #[inline]
    pub(crate) fn mark_used(&mut self) {
        self.status.set_used(true);
    }

    #[inline]
    pub(crate) fn mark_dirty(&mut self) {
        self.status.set_dirty(true);
    }

    /// Clears the used bit and returns its previous state
    #[inline]
    pub(crate) fn test_and_clear_used(&mut self) -> bool {
        let used = self.status.is_used();
        self.status.set_used(false);
        used
    }

    #[inline]
    pub fn vpn(&self) -> usize {
        self.vpn
    }

    /// Physical frame of this page, only meaningful while the entry is valid
    #[inline]
    pub fn ppn(&self) -> usize {
        self.ppn
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.status.is_valid()
    }

    #[inline]
    pub fn is_read_only(&self) -> bool {
        self.status.is_read_only()
    }

    #[inline]
    pub fn is_used(&self) -> bool {
        self.status.is_used()
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.status.is_dirty()
    }

    #[inline]
    pub fn swap_slot(&self) -> Option<usize> {
        self.swap_slot
    }
}
