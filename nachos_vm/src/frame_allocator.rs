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

use log::debug;

/// Pool of physical frames which are not mapped by any translation entry.
///
/// Frames are handed out in LIFO order.
pub(crate) struct FrameAllocator {
    free_frames: Vec<usize>,
}

impl FrameAllocator {
    pub(crate) fn new(frame_count: usize) -> Self {
        // reversed, so that frame 0 is handed out first
        Self {
            free_frames: (0..frame_count).rev().collect(),
        }
    }

    pub(crate) fn acquire(&mut self) -> Option<usize> {
        let frame = self.free_frames.pop();
        if let Some(frame) = frame {
            debug!(
                "Acquired frame {} ({} free frames left)",
                frame,
                self.free_frames.len()
            );
        }
        frame
    }

    pub(crate) fn release(&mut self, frame: usize) {
        debug_assert!(
            !self.free_frames.contains(&frame),
            "frame {} was released twice",
            frame
        );

        self.free_frames.push(frame);
        debug!(
            "Released frame {} ({} free frames)",
            frame,
            self.free_frames.len()
        );
    }

    #[inline]
    pub(crate) fn free_count(&self) -> usize {
        self.free_frames.len()
    }

    pub(crate) fn contains(&self, frame: usize) -> bool {
        self.free_frames.contains(&frame)
    }
}
