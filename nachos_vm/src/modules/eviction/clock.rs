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

use log::trace;

use super::{EvictionModule, EvictionView, SweepStep};

/// Second chance eviction.
///
/// The clock hand survives between sweeps, so consecutive evictions continue
/// where the last one stopped.
pub struct ClockEvictionModule {
    curr_frame: usize,
    frame_count: usize,
}

impl ClockEvictionModule {
    /// Frame the clock hand points to
    pub fn cursor(&self) -> usize {
        self.curr_frame
    }

    #[inline]
    fn advance(&mut self) {
        self.curr_frame = (self.curr_frame + 1) % self.frame_count;
    }
}

impl EvictionModule for ClockEvictionModule {
    fn new(frame_count: usize) -> Self {
        debug_assert!(frame_count > 0);

        Self {
            curr_frame: 0,
            frame_count,
        }
    }

    fn step<V: EvictionView>(&mut self, view: &mut V) -> SweepStep {
        debug_assert_eq!(view.frame_count(), self.frame_count);
        let frame = self.curr_frame;

        if !view.is_evictable(frame) {
            if view.unevictable_count() == self.frame_count {
                // no progress possible, keep the hand where it is
                if view.pinned_count() == 0 {
                    return SweepStep::Exhausted;
                }
                return SweepStep::Blocked;
            }

            self.advance();
            return SweepStep::Skipped(frame);
        }

        if view.test_and_clear_used(frame) {
            trace!("Frame {} gets a second chance", frame);
            self.advance();
            return SweepStep::SecondChance(frame);
        }

        self.advance();
        SweepStep::Selected(frame)
    }
}
