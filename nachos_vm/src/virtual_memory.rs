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
    collections::{HashMap, HashSet},
    sync::{Condvar, Mutex, MutexGuard},
};

use log::{debug, error, info, trace, warn};

use crate::{
    frame_allocator::FrameAllocator,
    inverted_page_table::{FrameOwner, InvertedPageTable, ProcessId},
    modules::{
        eviction::{ClockEvictionModule, EvictionModule, EvictionView, SweepStep},
        swap_storage::SwapStorageModule,
    },
    swap_store::SwapStore,
    translation_entry::TranslationEntry,
    util::frame_range,
    VMConfig,
};

pub(crate) type StateGuard<'a, S, E> = MutexGuard<'a, VMState<S, E>>;

/// Snapshot of the bookkeeping of a [`VirtualMemory`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VMStats {
    pub free_frames: usize,
    pub pinned_frames: usize,
    pub wired_frames: usize,
    pub swap_slots_in_use: usize,
    pub swap_slots_allocated: usize,
    pub processes: usize,
    pub page_faults: u64,
    pub evictions: u64,
    pub swap_outs: u64,
    pub swap_ins: u64,
}

/// Page table of a registered address space together with the frames it owns
#[derive(Default)]
pub(crate) struct ProcessPages {
    pub(crate) page_table: Vec<TranslationEntry>,
    pub(crate) owned_frames: Vec<usize>,
}

#[derive(Default)]
pub(crate) struct VMCounters {
    pub(crate) page_faults: u64,
    pub(crate) evictions: u64,
    pub(crate) swap_outs: u64,
    pub(crate) swap_ins: u64,
}

/// Everything that is shared between all address spaces.
///
/// Only accessible through the lock of [`VirtualMemory`].
pub(crate) struct VMState<S: SwapStorageModule, E: EvictionModule> {
    page_size: usize,

    /// main memory of the simulated machine
    pub(crate) memory: Vec<u8>,
    pub(crate) frames: FrameAllocator,
    pub(crate) ipt: InvertedPageTable,
    pub(crate) swap: SwapStore<S>,
    eviction: E,
    pub(crate) processes: HashMap<ProcessId, ProcessPages>,
    next_pid: usize,
    pub(crate) counters: VMCounters,
}

impl<S: SwapStorageModule, E: EvictionModule> VMState<S, E> {
    #[inline]
    pub(crate) fn frame_mut(&mut self, frame: usize) -> &mut [u8] {
        &mut self.memory[frame_range(frame, self.page_size)]
    }

    /// Copy of the translation entry of `vpn`, if the page table has one
    pub(crate) fn entry(&self, pid: ProcessId, vpn: usize) -> Option<TranslationEntry> {
        self.processes
            .get(&pid)
            .and_then(|pages| pages.page_table.get(vpn))
            .copied()
    }

    pub(crate) fn entry_mut(
        &mut self,
        pid: ProcessId,
        vpn: usize,
    ) -> Option<&mut TranslationEntry> {
        self.processes
            .get_mut(&pid)
            .and_then(|pages| pages.page_table.get_mut(vpn))
    }

    /// Makes `entry` the translation of its page and records `entry.ppn()` as owned by it
    pub(crate) fn install(
        &mut self,
        pid: ProcessId,
        entry: TranslationEntry,
        wired: bool,
    ) -> Result<(), ()> {
        debug_assert!(entry.is_valid());

        let pages = self.processes.get_mut(&pid).ok_or(())?;
        let slot = pages.page_table.get_mut(entry.vpn()).ok_or(())?;
        debug_assert!(!slot.is_valid(), "page {} is already mapped", entry.vpn());

        *slot = entry;
        pages.owned_frames.push(entry.ppn());
        self.ipt.set_owner(
            entry.ppn(),
            FrameOwner {
                pid,
                vpn: entry.vpn(),
            },
            wired,
        );

        trace!(
            "Mapped page {} of {} to frame {}",
            entry.vpn(),
            pid,
            entry.ppn()
        );
        Ok(())
    }

    /// Returns all frames and swap slots of `pid` and invalidates its page table
    pub(crate) fn release_process(&mut self, pid: ProcessId) -> Result<usize, ()> {
        let pages = self.processes.get_mut(&pid).ok_or(())?;
        let owned_frames = core::mem::take(&mut pages.owned_frames);
        let released = owned_frames.len();

        for entry in pages.page_table.iter_mut() {
            if let Some(slot) = entry.take_swap_slot() {
                self.swap.free_slot(slot);
            }
            entry.invalidate(None);
        }

        for frame in owned_frames {
            let owner = self.ipt.clear(frame);
            debug_assert_eq!(owner.map(|owner| owner.pid), Some(pid));
            self.frames.release(frame);
        }

        Ok(released)
    }

    /// Reads the content of `slot` into `frame` and frees the slot
    pub(crate) fn swap_in(&mut self, slot: usize, frame: usize) -> Result<(), ()> {
        let range = frame_range(frame, self.page_size);
        self.swap.read_page(slot, &mut self.memory[range])?;
        self.swap.free_slot(slot);
        self.counters.swap_ins += 1;

        debug!("Swapped slot {} into frame {}", slot, frame);
        Ok(())
    }

    fn sweep_step(&mut self) -> SweepStep {
        let mut view = FrameScan {
            ipt: &self.ipt,
            processes: &mut self.processes,
        };
        self.eviction.step(&mut view)
    }

    /// Frees `frame`, writing its content to swap if it is dirty.
    ///
    /// Afterwards the frame is neither owned nor part of the free list.
    fn evict(&mut self, frame: usize) -> Result<(), ()> {
        let page_size = self.page_size;

        if let Some(owner) = self.ipt.owner(frame) {
            let pages = self.processes.get_mut(&owner.pid).ok_or_else(|| {
                error!("frame {} is owned by unknown {}", frame, owner.pid);
            })?;
            let entry = pages.page_table.get_mut(owner.vpn).ok_or(())?;
            debug_assert!(entry.is_valid());
            debug_assert_eq!(entry.ppn(), frame);

            let swap_slot = if entry.is_dirty() {
                let slot = self.swap.allocate_slot();
                let content = &self.memory[frame_range(frame, page_size)];

                if self.swap.write_page(slot, content).is_err() {
                    error!(
                        "could not swap out page {} of {} from frame {}",
                        owner.vpn, owner.pid, frame
                    );
                    self.swap.free_slot(slot);
                    return Err(());
                }

                self.counters.swap_outs += 1;
                Some(slot)
            } else {
                None
            };

            entry.invalidate(swap_slot);
            pages.owned_frames.retain(|owned| *owned != frame);

            debug!(
                "Evicted page {} of {} from frame {} (swap slot: {:?})",
                owner.vpn, owner.pid, frame, swap_slot
            );
        }

        self.ipt.clear(frame);
        self.counters.evictions += 1;
        Ok(())
    }
}

/// Eviction view over the inverted page table,
/// resolving its back references through the process table
struct FrameScan<'a> {
    ipt: &'a InvertedPageTable,
    processes: &'a mut HashMap<ProcessId, ProcessPages>,
}

impl EvictionView for FrameScan<'_> {
    fn frame_count(&self) -> usize {
        self.ipt.len()
    }

    fn is_evictable(&self, frame: usize) -> bool {
        self.ipt.is_evictable(frame)
    }

    fn pinned_count(&self) -> usize {
        self.ipt.pin_count()
    }

    fn unevictable_count(&self) -> usize {
        self.ipt.pin_count() + self.ipt.wired_count()
    }

    fn test_and_clear_used(&mut self, frame: usize) -> bool {
        let Some(owner) = self.ipt.owner(frame) else {
            return false;
        };

        self.processes
            .get_mut(&owner.pid)
            .and_then(|pages| pages.page_table.get_mut(owner.vpn))
            .map(|entry| entry.test_and_clear_used())
            .unwrap_or(false)
    }
}

/// The virtual memory manager shared by all address spaces of the system.
///
/// Main memory, the free frame pool, the inverted page table, the eviction state,
/// the swap store and the page tables of all registered address spaces are
/// protected by a single lock.
pub struct VirtualMemory<S: SwapStorageModule, E: EvictionModule = ClockEvictionModule> {
    config: VMConfig,
    state: Mutex<VMState<S, E>>,

    /// signalled whenever a frame is unpinned or released
    unpinned: Condvar,
}

impl<S: SwapStorageModule, E: EvictionModule> VirtualMemory<S, E> {
    pub fn new(config: VMConfig, swap_storage: S) -> Self {
        config.validate();

        info!(
            "Booting virtual memory with {} frames of {} bytes",
            config.frame_count, config.page_size
        );

        Self {
            config,
            state: Mutex::new(VMState {
                page_size: config.page_size,
                memory: vec![0u8; config.memory_size()],
                frames: FrameAllocator::new(config.frame_count),
                ipt: InvertedPageTable::new(config.frame_count),
                swap: SwapStore::new(swap_storage, config.page_size),
                eviction: E::new(config.frame_count),
                processes: HashMap::new(),
                next_pid: 0,
                counters: VMCounters::default(),
            }),
            unpinned: Condvar::new(),
        }
    }

    #[inline]
    pub fn config(&self) -> &VMConfig {
        &self.config
    }

    pub(crate) fn lock(&self) -> Result<StateGuard<'_, S, E>, ()> {
        self.state.lock().map_err(|_| {
            error!(
                "Virtual memory state is poisoned! \
                This normally happens if a thread panics while holding the lock!"
            );
        })
    }

    pub(crate) fn register_process(&self) -> Result<ProcessId, ()> {
        let mut state = self.lock()?;
        let pid = ProcessId(state.next_pid);
        state.next_pid += 1;
        state.processes.insert(pid, ProcessPages::default());

        debug!("Registered {}", pid);
        Ok(pid)
    }

    pub(crate) fn unregister_process(&self, pid: ProcessId) -> Result<(), ()> {
        let mut state = self.lock()?;
        let pages = state.processes.remove(&pid).ok_or(())?;
        debug_assert!(pages.owned_frames.is_empty());
        debug_assert!(pages.page_table.iter().all(|e| e.swap_slot().is_none()));

        debug!("Unregistered {}", pid);
        Ok(())
    }

    /// Takes a free frame, or evicts one if there is none left.
    ///
    /// Blocks while every frame is pinned. Returns `None` if no frame can ever be freed.
    pub(crate) fn obtain_frame<'a>(
        &'a self,
        mut state: StateGuard<'a, S, E>,
    ) -> Result<(StateGuard<'a, S, E>, Option<usize>), ()> {
        loop {
            // also checked after every wakeup, an exiting process could have released frames
            if let Some(frame) = state.frames.acquire() {
                return Ok((state, Some(frame)));
            }

            match state.sweep_step() {
                SweepStep::Selected(frame) => {
                    state.evict(frame)?;
                    return Ok((state, Some(frame)));
                }
                SweepStep::Skipped(frame) => {
                    trace!("Skip frame {}", frame);
                }
                SweepStep::SecondChance(_) => {}
                SweepStep::Blocked => {
                    warn!(
                        "All {} frames are pinned, waiting for a frame to be unpinned",
                        self.config.frame_count
                    );
                    state = self
                        .unpinned
                        .wait(state)
                        .map_err(|_| error!("Virtual memory state got poisoned while waiting"))?;
                }
                SweepStep::Exhausted => {
                    warn!("No frame can be evicted, all frames are wired");
                    return Ok((state, None));
                }
            }
        }
    }

    /// Forbids the eviction of `frame` until [`VirtualMemory::unpin`] is called
    #[inline]
    pub(crate) fn pin(&self, state: &mut VMState<S, E>, frame: usize) {
        state.ipt.pin(frame);
    }

    /// Releases a pin and wakes up one thread that waits for an evictable frame
    #[inline]
    pub(crate) fn unpin(&self, state: &mut VMState<S, E>, frame: usize) {
        state.ipt.unpin(frame);
        self.unpinned.notify_one();
    }

    /// Wakes up all waiting threads, as frames went back to the free pool
    pub(crate) fn notify_frames_released(&self) {
        self.unpinned.notify_all();
    }

    pub fn stats(&self) -> Result<VMStats, ()> {
        let state = self.lock()?;

        Ok(VMStats {
            free_frames: state.frames.free_count(),
            pinned_frames: state.ipt.pin_count(),
            wired_frames: state.ipt.wired_count(),
            swap_slots_in_use: state.swap.slots_in_use(),
            swap_slots_allocated: state.swap.slots_allocated(),
            processes: state.processes.len(),
            page_faults: state.counters.page_faults,
            evictions: state.counters.evictions,
            swap_outs: state.counters.swap_outs,
            swap_ins: state.counters.swap_ins,
        })
    }

    /// Checks that every frame is either free or mapped by exactly one valid
    /// translation entry, which is recorded as its owner, and that every swap slot
    /// in use is referenced by exactly one invalid entry.
    ///
    /// The first violation found is logged.
    pub fn check_frame_accounting(&self) -> Result<(), ()> {
        let state = self.lock()?;
        Self::find_accounting_error(&state).map_err(|msg| {
            error!("Frame accounting is broken: {}", msg);
        })
    }

    fn find_accounting_error(state: &VMState<S, E>) -> Result<(), String> {

        for (frame, ipt_entry) in state.ipt.iter() {
            let is_free = state.frames.contains(frame);

            match (is_free, ipt_entry.owner) {
                (true, Some(owner)) => {
                    return Err(format!(
                        "frame {} is free but owned by page {} of {}",
                        frame, owner.vpn, owner.pid
                    ));
                }
                (false, None) => {
                    return Err(format!("frame {} is neither free nor owned", frame));
                }
                (true, None) => {
                    if ipt_entry.pinned || ipt_entry.wired {
                        return Err(format!("free frame {} is pinned or wired", frame));
                    }
                }
                (false, Some(owner)) => {
                    let pages = state.processes.get(&owner.pid).ok_or_else(|| {
                        format!("frame {} is owned by unknown {}", frame, owner.pid)
                    })?;
                    let entry = pages.page_table.get(owner.vpn).ok_or_else(|| {
                        format!("frame {} is owned by a page out of range", frame)
                    })?;

                    if !entry.is_valid() || entry.ppn() != frame {
                        return Err(format!(
                            "frame {} is owned by page {} of {} which maps {:?}",
                            frame, owner.vpn, owner.pid, entry
                        ));
                    }
                    if !pages.owned_frames.contains(&frame) {
                        return Err(format!(
                            "frame {} is missing in the frame list of {}",
                            frame, owner.pid
                        ));
                    }
                }
            }
        }

        let pinned = state.ipt.iter().filter(|(_, e)| e.pinned).count();
        if pinned != state.ipt.pin_count() {
            return Err(format!(
                "pin count is {} but {} frames are pinned",
                state.ipt.pin_count(),
                pinned
            ));
        }

        let mut slots = HashSet::new();
        for (pid, pages) in state.processes.iter() {
            if pages.owned_frames.len()
                != pages.page_table.iter().filter(|e| e.is_valid()).count()
            {
                return Err(format!(
                    "{} owns {} frames but has a different number of valid pages",
                    pid,
                    pages.owned_frames.len()
                ));
            }

            for entry in pages.page_table.iter() {
                if entry.is_valid() {
                    let owner = state.ipt.owner(entry.ppn());
                    if owner
                        != Some(FrameOwner {
                            pid: *pid,
                            vpn: entry.vpn(),
                        })
                    {
                        return Err(format!(
                            "page {} of {} maps frame {} which is owned by {:?}",
                            entry.vpn(),
                            pid,
                            entry.ppn(),
                            owner
                        ));
                    }
                } else if let Some(slot) = entry.swap_slot() {
                    if state.swap.is_free(slot) || !slots.insert(slot) {
                        return Err(format!(
                            "swap slot {} of page {} of {} is free or shared",
                            slot,
                            entry.vpn(),
                            pid
                        ));
                    }
                }
            }
        }

        if slots.len() != state.swap.slots_in_use() {
            return Err(format!(
                "{} swap slots are in use, but {} are referenced",
                state.swap.slots_in_use(),
                slots.len()
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
impl<S: SwapStorageModule, E: EvictionModule> VirtualMemory<S, E> {
    pub(crate) fn pin_frame(&self, frame: usize) {
        let mut state = self.lock().unwrap();
        self.pin(&mut state, frame);
    }

    pub(crate) fn unpin_frame(&self, frame: usize) {
        let mut state = self.lock().unwrap();
        self.unpin(&mut state, frame);
    }
}

#[cfg(test)]
mod test {
    use super::VirtualMemory;
    use crate::{
        modules::{eviction::ClockEvictionModule, swap_storage::MemorySwapStorageModule},
        VMConfig,
    };

    #[test]
    fn test_fresh_state() {
        let config = VMConfig {
            page_size: 64,
            frame_count: 4,
            stack_pages: 1,
        };
        let vm: VirtualMemory<MemorySwapStorageModule, ClockEvictionModule> =
            VirtualMemory::new(config, MemorySwapStorageModule::new());

        let stats = vm.stats().unwrap();
        assert_eq!(stats.free_frames, 4);
        assert_eq!(stats.pinned_frames, 0);
        assert_eq!(stats.swap_slots_in_use, 0);
        assert_eq!(stats.processes, 0);
        vm.check_frame_accounting().unwrap();

        let a = vm.register_process().unwrap();
        let b = vm.register_process().unwrap();
        assert_ne!(a, b);
        assert_eq!(vm.stats().unwrap().processes, 2);

        vm.unregister_process(a).unwrap();
        vm.unregister_process(a).expect_err("already unregistered");
        assert_eq!(vm.stats().unwrap().processes, 1);
    }

    #[test]
    fn test_obtain_frame_prefers_free_frames() {
        let config = VMConfig {
            page_size: 64,
            frame_count: 2,
            stack_pages: 0,
        };
        let vm: VirtualMemory<MemorySwapStorageModule> =
            VirtualMemory::new(config, MemorySwapStorageModule::new());

        let state = vm.lock().unwrap();
        let (state, first) = vm.obtain_frame(state).unwrap();
        let (mut state, second) = vm.obtain_frame(state).unwrap();
        assert_eq!(first, Some(0));
        assert_eq!(second, Some(1));

        // released frames are handed out again before sweeping
        state.frames.release(1);
        let (_state, third) = vm.obtain_frame(state).unwrap();
        assert_eq!(third, Some(1));
    }

    #[test]
    fn test_accounting_detects_lost_frames() {
        let config = VMConfig {
            page_size: 64,
            frame_count: 2,
            stack_pages: 0,
        };
        let vm: VirtualMemory<MemorySwapStorageModule> =
            VirtualMemory::new(config, MemorySwapStorageModule::new());
        vm.check_frame_accounting().unwrap();

        // a frame that is neither free nor owned by any page
        let frame = vm.lock().unwrap().frames.acquire().unwrap();
        vm.check_frame_accounting()
            .expect_err("frame left the pool without an owner");

        vm.lock().unwrap().frames.release(frame);
        vm.check_frame_accounting().unwrap();

        vm.pin_frame(frame);
        vm.check_frame_accounting()
            .expect_err("free frame is pinned");
        vm.unpin_frame(frame);
        vm.check_frame_accounting().unwrap();
    }
}
