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

use core::ops::Range;

/// efficient way to calculate: ceil(x / y)
pub(crate) fn ceil_div(x: usize, y: usize) -> usize {
    (x + y - 1) / y
}

/// Byte range of `frame` inside of main memory
#[inline]
pub(crate) fn frame_range(frame: usize, page_size: usize) -> Range<usize> {
    let start = frame * page_size;
    start..start + page_size
}

#[cfg(test)]
mod test {
    use crate::util::{ceil_div, frame_range};

    #[test]
    fn test_ceil_div() {
        // just test a bunch of different values
        for y in 1..100 {
            for x in 0..y * 3 {
                let expected_value = if x % y == 0 { x / y } else { (x / y) + 1 };

                assert_eq!(ceil_div(x, y), expected_value);
            }
        }
    }

    #[test]
    fn test_frame_range() {
        assert_eq!(frame_range(0, 64), 0..64);
        assert_eq!(frame_range(3, 64), 192..256);
    }
}
