//! Hash-range arithmetic over the fixed key space
//!
//! All tenant data is keyed into `[0, RANGE_MAX)`. These routines compute
//! the equal sub-ranges used at tenant creation, the halves used when a hot
//! partition is split, and the split factor used to rank split candidates.

/// Size of the hash-key space. Ranges are `u64` values in `[0, RANGE_MAX)`.
pub const RANGE_MAX: u64 = 1 << 32;

/// Pure range math; no state.
pub struct RangePartitioner;

impl RangePartitioner {
    /// Returns the i-th of `count` equal contiguous sub-ranges of the full
    /// space, as an inclusive `(min, max)` pair. The last sub-range absorbs
    /// any integer-division remainder up to `RANGE_MAX - 1`.
    pub fn range(i: u64, count: u64) -> (u64, u64) {
        debug_assert!(count > 0 && i < count);
        let size = RANGE_MAX / count;
        let min = i * size;
        let max = if i + 1 == count {
            RANGE_MAX - 1
        } else {
            (i + 1) * size - 1
        };
        (min, max)
    }

    /// Halves an inclusive range into two contiguous inclusive sub-ranges.
    /// When the range size is odd the left half takes the extra unit.
    ///
    /// Callers must not pass `max < min`; the result would be degenerate.
    pub fn split_range(min: u64, max: u64) -> ((u64, u64), (u64, u64)) {
        debug_assert!(min <= max);
        let size = max - min + 1;
        let left_size = size - size / 2;
        let left = (min, min + left_size - 1);
        let right = (min + left_size, max);
        (left, right)
    }

    /// Returns how many ranges of this size tile the whole space,
    /// `RANGE_MAX / (max - min + 1)`.
    ///
    /// A smaller split factor means a larger range, so candidates with the
    /// smallest factor are the highest-priority split targets.
    pub fn range_split(min: u64, max: u64) -> u64 {
        debug_assert!(min <= max);
        RANGE_MAX / (max - min + 1)
    }
}
