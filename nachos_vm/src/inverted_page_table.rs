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

use core::fmt::Display;

use log::trace;

/// Identifies an address space registered at a [`crate::VirtualMemory`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcessId(pub(crate) usize);

impl Display for ProcessId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Process[{}]", self.0)
    }
}

/// Back reference from a frame to the translation entry mapping it.
///
/// This is only an id, the page table itself is looked up in the process table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FrameOwner {
    pub(crate) pid: ProcessId,
    pub(crate) vpn: usize,
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct IptEntry {
    pub(crate) owner: Option<FrameOwner>,

    /// Frame is currently copied from or to and may not be evicted
    pub(crate) pinned: bool,

    /// Frame belongs to an eagerly loaded address space and may never be evicted
    pub(crate) wired: bool,
}

/// One entry per physical frame
pub(crate) struct InvertedPageTable {
    entries: Vec<IptEntry>,
    pin_count: usize,
    wired_count: usize,
}

impl InvertedPageTable {
    pub(crate) fn new(frame_count: usize) -> Self {
        Self {
            entries: vec![IptEntry::default(); frame_count],
            pin_count: 0,
            wired_count: 0,
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub(crate) fn owner(&self, frame: usize) -> Option<FrameOwner> {
        self.entries[frame].owner
    }

    /// Records `owner` as the only translation entry mapping `frame`
    pub(crate) fn set_owner(&mut self, frame: usize, owner: FrameOwner, wired: bool) {
        let entry = &mut self.entries[frame];
        debug_assert!(entry.owner.is_none(), "frame {} is still owned", frame);
        debug_assert!(!entry.pinned);

        entry.owner = Some(owner);
        entry.wired = wired;
        if wired {
            self.wired_count += 1;
        }
    }

    /// Removes the owner of `frame` and returns it
    pub(crate) fn clear(&mut self, frame: usize) -> Option<FrameOwner> {
        let entry = &mut self.entries[frame];
        debug_assert!(!entry.pinned, "pinned frame {} can not be released", frame);

        if entry.wired {
            entry.wired = false;
            self.wired_count -= 1;
        }

        entry.owner.take()
    }

    pub(crate) fn pin(&mut self, frame: usize) {
        let entry = &mut self.entries[frame];
        debug_assert!(!entry.pinned, "frame {} is already pinned", frame);

        entry.pinned = true;
        self.pin_count += 1;
        trace!("Pinned frame {} (pin count: {})", frame, self.pin_count);
    }

    pub(crate) fn unpin(&mut self, frame: usize) {
        let entry = &mut self.entries[frame];
        debug_assert!(entry.pinned, "frame {} is not pinned", frame);

        entry.pinned = false;
        self.pin_count -= 1;
        trace!("Unpinned frame {} (pin count: {})", frame, self.pin_count);
    }

    #[inline]
    pub(crate) fn is_evictable(&self, frame: usize) -> bool {
        let entry = &self.entries[frame];
        !entry.pinned && !entry.wired
    }

    #[inline]
    pub(crate) fn pin_count(&self) -> usize {
        self.pin_count
    }

    #[inline]
    pub(crate) fn wired_count(&self) -> usize {
        self.wired_count
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (usize, &IptEntry)> {
        self.entries.iter().enumerate()
    }
}

#[cfg(test)]
mod test {
    use super::{FrameOwner, InvertedPageTable, ProcessId};

    #[test]
    fn test_pin_and_wire_counters() {
        let mut ipt = InvertedPageTable::new(4);
        let owner = FrameOwner {
            pid: ProcessId(1),
            vpn: 0,
        };

        ipt.set_owner(0, owner, false);
        ipt.set_owner(1, FrameOwner { vpn: 1, ..owner }, true);
        assert_eq!(ipt.wired_count(), 1);
        assert!(ipt.is_evictable(0));
        assert!(!ipt.is_evictable(1));

        ipt.pin(0);
        assert_eq!(ipt.pin_count(), 1);
        assert!(!ipt.is_evictable(0));

        ipt.unpin(0);
        assert_eq!(ipt.pin_count(), 0);
        assert!(ipt.is_evictable(0));

        assert_eq!(ipt.clear(1), Some(FrameOwner { vpn: 1, ..owner }));
        assert_eq!(ipt.wired_count(), 0);
        assert_eq!(ipt.clear(1), None);
        assert_eq!(ipt.owner(0), Some(owner));
    }
}
