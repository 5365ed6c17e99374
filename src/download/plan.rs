//! Range planning: partitions `[0, size)` into fixed-width segments.

use super::constants::MAX_SEGMENTS;
use super::engine::EngineError;

/// One planned byte range with an inclusive end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    /// Position in the plan, stable across runs with the same size and chunk size.
    pub index: usize,
    /// First byte offset.
    pub start: u64,
    /// Last byte offset (inclusive).
    pub end: u64,
}

#[allow(clippy::len_without_is_empty)]
impl Segment {
    /// Number of bytes covered. Never zero.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }
}

/// Splits `[0, size)` into consecutive segments of `chunk_size` bytes.
///
/// The last segment may be shorter. Returns an empty plan when either argument
/// is zero. Pure: identical inputs always yield identical boundaries, which is
/// what makes persisted segment indices meaningful after a restart.
///
/// # Errors
///
/// Returns [`EngineError::TooManySegments`] when the plan would hold more than
/// [`MAX_SEGMENTS`] entries. Nothing is allocated in that case.
pub fn plan_segments(size: u64, chunk_size: u64) -> Result<Vec<Segment>, EngineError> {
    if size == 0 || chunk_size == 0 {
        return Ok(Vec::new());
    }
    let count = size.div_ceil(chunk_size);
    if count > MAX_SEGMENTS {
        return Err(EngineError::TooManySegments {
            size,
            chunk_size,
            count,
        });
    }

    let mut segments = Vec::with_capacity(segment_count(size, chunk_size));
    let mut start = 0;
    while start < size {
        let end = size.min(start.saturating_add(chunk_size)) - 1;
        segments.push(Segment {
            index: segments.len(),
            start,
            end,
        });
        start = end + 1;
    }
    Ok(segments)
}

/// Number of segments [`plan_segments`] produces for the same inputs.
#[must_use]
pub fn segment_count(size: u64, chunk_size: u64) -> usize {
    if chunk_size == 0 {
        return 0;
    }
    usize::try_from(size.div_ceil(chunk_size)).unwrap_or(usize::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;

    fn assert_partition(size: u64, chunk: u64) {
        let segments = plan_segments(size, chunk).unwrap();
        assert_eq!(segments.len(), segment_count(size, chunk));
        assert_eq!(segments[0].start, 0);
        assert_eq!(segments[segments.len() - 1].end, size - 1);
        for (i, pair) in segments.windows(2).enumerate() {
            assert_eq!(pair[0].end + 1, pair[1].start, "gap or overlap at {i}");
        }
        for (i, segment) in segments.iter().enumerate() {
            assert_eq!(segment.index, i);
            assert!(segment.len() <= chunk);
            assert!(segment.len() > 0);
        }
        assert_eq!(segments.iter().map(Segment::len).sum::<u64>(), size);
    }

    #[test]
    fn test_plan_partitions_range_for_many_shapes() {
        for size in [1, 2, 7, 8, 9, 100, 1023, 1024, 1025, 65_537] {
            for chunk in [1, 2, 3, 8, 1024, 100_000] {
                assert_partition(size, chunk);
            }
        }
    }

    #[test]
    fn test_plan_hundred_megabytes_in_eight_megabyte_chunks() {
        let segments = plan_segments(100 * MIB, 8 * MIB).unwrap();
        assert_eq!(segments.len(), 13);
        assert_eq!(segments[12].start, 96 * MIB);
        assert_eq!(segments[12].len(), 4 * MIB);
    }

    #[test]
    fn test_plan_exact_multiple_has_no_short_tail() {
        let segments = plan_segments(16, 4).unwrap();
        assert_eq!(segments.len(), 4);
        assert!(segments.iter().all(|s| s.len() == 4));
    }

    #[test]
    fn test_plan_is_deterministic() {
        assert_eq!(
            plan_segments(12_345, 678).unwrap(),
            plan_segments(12_345, 678).unwrap()
        );
    }

    #[test]
    fn test_plan_chunk_larger_than_size_is_single_segment() {
        let segments = plan_segments(10, 100).unwrap();
        assert_eq!(
            segments,
            vec![Segment {
                index: 0,
                start: 0,
                end: 9
            }]
        );
    }

    #[test]
    fn test_plan_zero_inputs_are_empty() {
        assert!(plan_segments(0, 8).unwrap().is_empty());
        assert!(plan_segments(8, 0).unwrap().is_empty());
        assert_eq!(segment_count(8, 0), 0);
    }

    #[test]
    fn test_plan_near_u64_max_does_not_overflow() {
        let segments = plan_segments(u64::MAX, u64::MAX / 2 + 1).unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[1].end, u64::MAX - 1);
    }

    #[test]
    fn test_plan_rejects_huge_declared_size_without_allocating() {
        let error = plan_segments(1 << 62, 8 * MIB).unwrap_err();
        match error {
            EngineError::TooManySegments {
                size,
                chunk_size,
                count,
            } => {
                assert_eq!(size, 1 << 62);
                assert_eq!(chunk_size, 8 * MIB);
                assert_eq!(count, 1 << 39);
            }
            other => panic!("expected TooManySegments, got {other:?}"),
        }
    }

    #[test]
    fn test_plan_accepts_exactly_the_segment_limit() {
        assert_eq!(
            plan_segments(MAX_SEGMENTS, 1).unwrap().len() as u64,
            MAX_SEGMENTS
        );
        assert!(plan_segments(MAX_SEGMENTS + 1, 1).is_err());
    }
}
