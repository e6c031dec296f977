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

mod clock;

pub use clock::ClockEvictionModule;

/// Outcome of examining a single frame during an eviction sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepStep {
    /// Frame is pinned or wired, the sweep moved on
    Skipped(usize),

    /// Frame was used recently, its used bit was cleared and the sweep moved on
    SecondChance(usize),

    /// Frame was chosen as victim
    Selected(usize),

    /// Every frame is pinned or wired, but some pin will be released eventually.
    /// The caller has to wait for an unpin and step again.
    Blocked,

    /// Every frame is wired and nothing is pinned, so no frame will ever become evictable
    Exhausted,
}

/// The state of main memory an [`EvictionModule`] looks at
pub trait EvictionView {
    fn frame_count(&self) -> usize;

    /// Neither pinned nor wired
    fn is_evictable(&self, frame: usize) -> bool;

    /// Frames that are currently pinned
    fn pinned_count(&self) -> usize;

    /// Frames that are pinned or wired
    fn unevictable_count(&self) -> usize;

    /// Clears the used bit of the page that lives in `frame` and returns its previous state
    fn test_and_clear_used(&mut self, frame: usize) -> bool;
}

/// Chooses which frame to free if no free frame is left
pub trait EvictionModule: Send {
    fn new(frame_count: usize) -> Self;

    /// Examines exactly one frame.
    ///
    /// Callers repeat this until [`SweepStep::Selected`], [`SweepStep::Blocked`] or
    /// [`SweepStep::Exhausted`] is returned.
    fn step<V: EvictionView>(&mut self, view: &mut V) -> SweepStep;
}
