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

mod access;
mod fault;

pub use fault::{ExceptionCause, ExceptionOutcome, FaultResolution};

use std::sync::Arc;

use log::{debug, error, info, warn};
use try_lock::{Locked, TryLock};

use crate::{
    inverted_page_table::ProcessId,
    modules::{
        eviction::{ClockEvictionModule, EvictionModule},
        executable::{ExecutableModule, SectionInfo},
        swap_storage::SwapStorageModule,
    },
    translation_entry::TranslationEntry,
    virtual_memory::{VMState, VirtualMemory},
    VirtAddr,
};

/// Size of a pointer in the argument vector
const ARGV_POINTER_SIZE: usize = 4;

/// How the pages of an address space are made resident
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagingMode {
    /// Every page gets a frame when the process starts. These frames are never evicted.
    Eager,

    /// Pages get a frame on their first access and may be evicted afterwards
    Demand,
}

/// Reasons why a process image could not be set up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadError {
    /// Sections do not cover the virtual pages `0..n` without gaps
    FragmentedExecutable,

    /// The argument vector does not fit into a single page
    ArgumentsTooLong,

    /// The address space does not fit into the virtual address range
    AddressSpaceTooLarge,

    /// Not enough free frames to load all pages up front
    InsufficientMemory,

    /// The executable refused to deliver one of its pages
    ExecutableUnreadable,

    /// The argument vector could not be written into the argument page
    ArgumentSetupFailed,

    /// The registry could not be locked
    RegistryUnavailable,
}

/// Initial register state and argument location of a loaded process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessImage {
    pub initial_pc: VirtAddr,
    pub initial_sp: VirtAddr,
    pub argc: usize,

    /// Address of the argument pointer array
    pub argv: VirtAddr,
}

/// The virtual address space of a single user process.
///
/// Its page table lives inside of the [`VirtualMemory`] it was loaded into, so that
/// eviction can reach it through the inverted page table.
/// Dropping the address space returns all of its frames and swap slots.
pub struct AddressSpace<S: SwapStorageModule, E: EvictionModule = ClockEvictionModule> {
    vm: Arc<VirtualMemory<S, E>>,
    pid: ProcessId,
    mode: PagingMode,

    /// section pages + stack pages + argument page
    page_count: usize,

    /// Only ever locked while the registry lock is held, so locking always succeeds
    executable: TryLock<Box<dyn ExecutableModule>>,

    loaded: bool,
    image: ProcessImage,
}

impl<S: SwapStorageModule, E: EvictionModule> AddressSpace<S, E> {
    /// Creates the address space of a new process, loads its sections
    /// according to `mode` and copies `args` into the argument page.
    pub fn load(
        vm: Arc<VirtualMemory<S, E>>,
        executable: Box<dyn ExecutableModule>,
        args: &[&str],
        mode: PagingMode,
    ) -> Result<Self, LoadError> {
        let config = *vm.config();

        let section_pages = contiguous_page_count(executable.sections()).ok_or_else(|| {
            warn!("Executable sections are not contiguous");
            LoadError::FragmentedExecutable
        })?;

        let args_size: usize = args
            .iter()
            .map(|arg| ARGV_POINTER_SIZE + arg.len() + 1)
            .sum();
        if args_size > config.page_size {
            warn!(
                "Arguments need {} bytes, but only {} fit into the argument page",
                args_size, config.page_size
            );
            return Err(LoadError::ArgumentsTooLong);
        }

        let page_count = section_pages + config.stack_pages + 1;
        if page_count
            .checked_mul(config.page_size)
            .map_or(true, |size| size > VirtAddr::MAX as usize)
        {
            return Err(LoadError::AddressSpaceTooLarge);
        }

        let pid = vm
            .register_process()
            .map_err(|_| LoadError::RegistryUnavailable)?;

        let initial_sp = ((section_pages + config.stack_pages) * config.page_size) as VirtAddr;
        let argv = ((page_count - 1) * config.page_size) as VirtAddr;

        let mut space = Self {
            image: ProcessImage {
                initial_pc: executable.entry_point(),
                initial_sp,
                argc: args.len(),
                argv,
            },
            vm,
            pid,
            mode,
            page_count,
            executable: TryLock::new(executable),
            loaded: false,
        };

        // from here on dropping `space` releases everything taken so far
        space.load_sections()?;
        space.write_arguments(args)?;

        info!(
            "Loaded {} with {} pages ({:?}, {} arguments)",
            space.pid,
            space.page_count,
            space.mode,
            args.len()
        );
        Ok(space)
    }

    /// Sets up the page table.
    ///
    /// Eagerly loaded address spaces get all of their frames here, demand paged
    /// ones start with every page invalid.
    pub fn load_sections(&mut self) -> Result<(), LoadError> {
        if self.loaded {
            debug!("{} is already loaded", self.pid);
            return Ok(());
        }

        match self.mode {
            PagingMode::Eager => self.load_eagerly()?,
            PagingMode::Demand => self.create_page_table()?,
        }

        self.loaded = true;
        Ok(())
    }

    fn create_page_table(&self) -> Result<(), LoadError> {
        let mut state = self.vm.lock().map_err(|_| LoadError::RegistryUnavailable)?;
        let pages = state
            .processes
            .get_mut(&self.pid)
            .ok_or(LoadError::RegistryUnavailable)?;

        pages.page_table = (0..self.page_count).map(TranslationEntry::unmapped).collect();
        Ok(())
    }

    fn load_eagerly(&self) -> Result<(), LoadError> {
        let mut state = self.vm.lock().map_err(|_| LoadError::RegistryUnavailable)?;

        if state.frames.free_count() < self.page_count {
            warn!(
                "{} needs {} frames, but only {} are free",
                self.pid,
                self.page_count,
                state.frames.free_count()
            );
            return Err(LoadError::InsufficientMemory);
        }

        state
            .processes
            .get_mut(&self.pid)
            .ok_or(LoadError::RegistryUnavailable)?
            .page_table = (0..self.page_count).map(TranslationEntry::unmapped).collect();

        let result = self.fill_frames(&mut state);
        if result.is_err() && state.release_process(self.pid).is_err() {
            error!("Could not roll back the partial load of {}", self.pid);
        }
        result
    }

    /// Gives every page a wired frame and loads its content
    fn fill_frames(&self, state: &mut VMState<S, E>) -> Result<(), LoadError> {
        let mut executable = self
            .lock_executable()
            .map_err(|_| LoadError::ExecutableUnreadable)?;

        for vpn in 0..self.page_count {
            let frame = state
                .frames
                .acquire()
                .ok_or(LoadError::InsufficientMemory)?;

            let read_only = match find_section(executable.sections(), vpn) {
                Some((index, section)) => {
                    let read_only = section.read_only;
                    let page_index = vpn - section.first_vpn;

                    if executable
                        .load_page(index, page_index, state.frame_mut(frame))
                        .is_err()
                    {
                        error!("Could not load page {} of {}", vpn, self.pid);
                        state.frames.release(frame);
                        return Err(LoadError::ExecutableUnreadable);
                    }

                    read_only
                }
                None => {
                    state.frame_mut(frame).fill(0);
                    false
                }
            };

            state
                .install(
                    self.pid,
                    TranslationEntry::preloaded(vpn, frame, read_only),
                    true,
                )
                .map_err(|_| LoadError::RegistryUnavailable)?;
        }

        Ok(())
    }

    /// Lays out `args` in the argument page: first the pointer array,
    /// then the null terminated strings
    fn write_arguments(&self, args: &[&str]) -> Result<(), LoadError> {
        let mut buffer = Vec::with_capacity(self.vm.config().page_size);
        let mut string_addr = self.image.argv as usize + args.len() * ARGV_POINTER_SIZE;

        for arg in args {
            buffer.extend_from_slice(&(string_addr as u32).to_le_bytes());
            string_addr += arg.len() + 1;
        }
        for arg in args {
            buffer.extend_from_slice(arg.as_bytes());
            buffer.push(0);
        }

        let written = self.write_virtual_memory_all(self.image.argv, &buffer);
        if written != buffer.len() {
            warn!(
                "Could only write {} of {} argument bytes for {}",
                written,
                buffer.len(),
                self.pid
            );
            return Err(LoadError::ArgumentSetupFailed);
        }

        Ok(())
    }

    /// Returns every frame and swap slot of this address space.
    ///
    /// Does nothing if the sections are not loaded.
    pub fn unload_sections(&mut self) -> Result<(), ()> {
        if !self.loaded {
            return Ok(());
        }

        let released = {
            let mut state = self.vm.lock()?;
            state.release_process(self.pid)?
        };
        self.loaded = false;

        // waiters in the eviction sweep can take one of the free frames now
        self.vm.notify_frames_released();

        info!("Unloaded {} ({} frames released)", self.pid, released);
        Ok(())
    }

    /// Snapshot of the page table
    pub fn page_table(&self) -> Result<Vec<TranslationEntry>, ()> {
        let state = self.vm.lock()?;
        let pages = state.processes.get(&self.pid).ok_or(())?;
        Ok(pages.page_table.clone())
    }

    #[inline]
    pub fn pid(&self) -> ProcessId {
        self.pid
    }

    #[inline]
    pub fn mode(&self) -> PagingMode {
        self.mode
    }

    #[inline]
    pub fn page_count(&self) -> usize {
        self.page_count
    }

    #[inline]
    pub fn image(&self) -> &ProcessImage {
        &self.image
    }

    #[inline]
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    #[inline]
    pub fn vm(&self) -> &Arc<VirtualMemory<S, E>> {
        &self.vm
    }

    fn lock_executable(&self) -> Result<Locked<'_, Box<dyn ExecutableModule>>, ()> {
        self.executable.try_lock().ok_or_else(|| {
            error!("Executable of {} is already in use", self.pid);
        })
    }
}

impl<S: SwapStorageModule, E: EvictionModule> Drop for AddressSpace<S, E> {
    fn drop(&mut self) {
        if self.unload_sections().is_err() {
            error!("Could not unload {}", self.pid);
        }
        if self.vm.unregister_process(self.pid).is_err() {
            error!("Could not unregister {}", self.pid);
        }
    }
}

/// Number of pages covered by `sections`, if they are laid out back to back starting at page 0
fn contiguous_page_count(sections: &[SectionInfo]) -> Option<usize> {
    let mut next_vpn = 0;
    for section in sections {
        if section.first_vpn != next_vpn {
            return None;
        }
        next_vpn += section.page_count;
    }

    Some(next_vpn)
}

fn find_section(sections: &[SectionInfo], vpn: usize) -> Option<(usize, &SectionInfo)> {
    sections
        .iter()
        .enumerate()
        .find(|(_, section)| section.contains(vpn))
}

#[cfg(test)]
mod test {
    use super::{contiguous_page_count, find_section};
    use crate::modules::executable::SectionInfo;

    fn section(first_vpn: usize, page_count: usize) -> SectionInfo {
        SectionInfo {
            name: format!(".s{}", first_vpn),
            first_vpn,
            page_count,
            read_only: false,
        }
    }

    #[test]
    fn test_contiguous_sections() {
        assert_eq!(contiguous_page_count(&[]), Some(0));
        assert_eq!(
            contiguous_page_count(&[section(0, 2), section(2, 3)]),
            Some(5)
        );
        assert_eq!(contiguous_page_count(&[section(1, 2)]), None);
        assert_eq!(contiguous_page_count(&[section(0, 2), section(3, 1)]), None);
    }

    #[test]
    fn test_find_section() {
        let sections = [section(0, 2), section(2, 3)];
        assert_eq!(find_section(&sections, 1).map(|(i, _)| i), Some(0));
        assert_eq!(find_section(&sections, 4).map(|(i, _)| i), Some(1));
        assert!(find_section(&sections, 5).is_none());
    }
}
