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

use log::{debug, error, trace};

use super::{find_section, AddressSpace};
use crate::{
    modules::{eviction::EvictionModule, swap_storage::SwapStorageModule},
    translation_entry::TranslationEntry,
    virtual_memory::StateGuard,
    VirtAddr,
};

/// What the fault handler did about a faulting address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultResolution {
    /// The page is resident now
    Resolved,

    /// The address does not belong to the address space, the page stays invalid
    Illegal,

    /// Every frame is wired by eagerly loaded address spaces, the page stays invalid
    OutOfFrames,
}

/// Trap causes of the simulated processor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionCause {
    Syscall,
    PageFault { bad_vaddr: VirtAddr },
    TlbMiss { bad_vaddr: VirtAddr },
    ReadOnly { bad_vaddr: VirtAddr },
    BusError { bad_vaddr: VirtAddr },
    AddressError { bad_vaddr: VirtAddr },
    Overflow,
    IllegalInstruction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionOutcome {
    /// The trap was a page fault and went through the fault handler
    PageFault(FaultResolution),

    /// Nothing the virtual memory manager is responsible for
    Unhandled(ExceptionCause),
}

impl<S: SwapStorageModule, E: EvictionModule> AddressSpace<S, E> {
    /// Entry point of the trap dispatcher.
    ///
    /// Page faults are resolved, every other cause is handed back.
    pub fn handle_exception(&self, cause: ExceptionCause) -> Result<ExceptionOutcome, ()> {
        match cause {
            ExceptionCause::PageFault { bad_vaddr } => self
                .handle_page_fault(bad_vaddr)
                .map(ExceptionOutcome::PageFault),
            cause => Ok(ExceptionOutcome::Unhandled(cause)),
        }
    }

    /// Makes the page containing `vaddr` resident.
    ///
    /// `Err(())` means the swap store failed and the process cannot continue.
    pub fn handle_page_fault(&self, vaddr: VirtAddr) -> Result<FaultResolution, ()> {
        let Some(vpn) = self.vpn_of(vaddr) else {
            debug!("{} faulted on illegal address {:#x}", self.pid, vaddr);
            return Ok(FaultResolution::Illegal);
        };

        let state = self.vm.lock()?;
        let (_state, resolution) = self.fault_in(state, vpn)?;
        Ok(resolution)
    }

    /// Virtual page of `vaddr`, if it lies inside of this address space
    pub(super) fn vpn_of(&self, vaddr: VirtAddr) -> Option<usize> {
        if vaddr < 0 || !self.loaded {
            return None;
        }

        let vpn = self.vm.config().page_from_address(vaddr as usize);
        if vpn < self.page_count {
            Some(vpn)
        } else {
            None
        }
    }

    /// Loads page `vpn` into a frame, evicting another page if necessary.
    ///
    /// The lock may be released in between while waiting for a pinned frame,
    /// which is why the guard is handed back.
    pub(super) fn fault_in<'a>(
        &'a self,
        mut state: StateGuard<'a, S, E>,
        vpn: usize,
    ) -> Result<(StateGuard<'a, S, E>, FaultResolution), ()> {
        let entry = state.entry(self.pid, vpn).ok_or(())?;
        if entry.is_valid() {
            return Ok((state, FaultResolution::Resolved));
        }

        state.counters.page_faults += 1;
        trace!("Page fault on page {} of {}", vpn, self.pid);

        let (mut state, frame) = self.vm.obtain_frame(state)?;
        let Some(frame) = frame else {
            return Ok((state, FaultResolution::OutOfFrames));
        };

        // someone else could have resolved the fault while we waited for a frame
        let entry = state.entry(self.pid, vpn).ok_or(())?;
        if entry.is_valid() {
            state.frames.release(frame);
            return Ok((state, FaultResolution::Resolved));
        }

        let resolved = if let Some(slot) = entry.swap_slot() {
            if state.swap_in(slot, frame).is_err() {
                error!(
                    "Could not swap in page {} of {} from slot {}",
                    vpn, self.pid, slot
                );
                state.frames.release(frame);
                return Err(());
            }

            if let Some(entry) = state.entry_mut(self.pid, vpn) {
                entry.take_swap_slot();
            }
            TranslationEntry::swapped_in(vpn, frame)
        } else {
            let mut executable = match self.lock_executable() {
                Ok(executable) => executable,
                Err(()) => {
                    state.frames.release(frame);
                    return Err(());
                }
            };

            match find_section(executable.sections(), vpn) {
                Some((index, section)) => {
                    let read_only = section.read_only;
                    let page_index = vpn - section.first_vpn;

                    if executable
                        .load_page(index, page_index, state.frame_mut(frame))
                        .is_err()
                    {
                        error!("Could not load page {} of {}", vpn, self.pid);
                        state.frames.release(frame);
                        return Err(());
                    }

                    TranslationEntry::faulted_in(vpn, frame, read_only)
                }
                None => {
                    // stack and argument pages
                    state.frame_mut(frame).fill(0);
                    TranslationEntry::faulted_in(vpn, frame, false)
                }
            }
        };

        if state.install(self.pid, resolved, false).is_err() {
            state.frames.release(frame);
            return Err(());
        }

        trace!("Resolved page {} of {} into frame {}", vpn, self.pid, frame);
        Ok((state, FaultResolution::Resolved))
    }
}
