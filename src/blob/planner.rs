//! Size limits and fragment planning.

use crate::error::{BlobError, Result};

/// How a blob of `total_size` bytes is cut into fragments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    pub total_size: u64,
    /// Payload bytes per fragment; only the last fragment may be shorter.
    pub chunk_size: u64,
    pub fragment_count: u32,
}

impl ChunkPlan {
    /// Length of fragment `index` (1-based), or `None` outside `1..=fragment_count`.
    pub fn fragment_len(&self, index: u32) -> Option<u64> {
        if index == 0 || index > self.fragment_count {
            return None;
        }
        let offset = u64::from(index - 1) * self.chunk_size;
        Some((self.total_size - offset).min(self.chunk_size))
    }
}

/// Plans the fragments for a blob.
///
/// `per_chunk_ceiling` must already be reduced by the key overhead of the
/// blob's name (see [`chunk_ceiling`]).
pub fn plan(total_size: u64, per_chunk_ceiling: u64, max_blob_size: u64) -> Result<ChunkPlan> {
    if total_size == 0 {
        return Err(BlobError::EmptyBlob);
    }
    if total_size > max_blob_size {
        return Err(BlobError::BlobTooLarge {
            size: total_size,
            max: max_blob_size,
        });
    }
    if per_chunk_ceiling == 0 {
        return Err(BlobError::InvalidChunkPlan(
            "chunk ceiling must be positive".to_string(),
        ));
    }

    let count = total_size.div_ceil(per_chunk_ceiling);
    let fragment_count = u32::try_from(count).map_err(|_| {
        BlobError::InvalidChunkPlan(format!("{} fragments exceed the flags field", count))
    })?;

    Ok(ChunkPlan {
        total_size,
        chunk_size: per_chunk_ceiling,
        fragment_count,
    })
}

/// Payload room per fragment once the cache's item overhead and the key
/// length are subtracted from the value ceiling.
pub fn chunk_ceiling(value_ceiling: usize, reserved_overhead: usize, name_len: usize) -> Result<u64> {
    value_ceiling
        .checked_sub(reserved_overhead)
        .and_then(|room| room.checked_sub(name_len))
        .filter(|room| *room > 0)
        .map(|room| room as u64)
        .ok_or_else(|| {
            BlobError::InvalidChunkPlan(format!(
                "value ceiling {} leaves no room after {} bytes of overhead and a {} byte name",
                value_ceiling, reserved_overhead, name_len
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;

    #[test]
    fn test_plan_rejects_empty_blob() {
        assert!(matches!(plan(0, 100, 1000), Err(BlobError::EmptyBlob)));
    }

    #[test]
    fn test_plan_size_boundary() {
        assert!(plan(1000, 100, 1000).is_ok());
        assert!(matches!(
            plan(1001, 100, 1000),
            Err(BlobError::BlobTooLarge {
                size: 1001,
                max: 1000
            })
        ));
    }

    #[test]
    fn test_plan_exact_multiple() {
        let plan = plan(300, 100, 1000).unwrap();
        assert_eq!(plan.fragment_count, 3);
        assert_eq!(plan.fragment_len(3), Some(100));
    }

    #[test]
    fn test_plan_rounds_remainder_up() {
        let plan = plan(301, 100, 1000).unwrap();
        assert_eq!(plan.fragment_count, 4);
        assert_eq!(plan.fragment_len(4), Some(1));
        assert_eq!(plan.fragment_len(5), None);
        assert_eq!(plan.fragment_len(0), None);
    }

    #[test]
    fn test_plan_single_fragment() {
        let plan = plan(1, 100, 1000).unwrap();
        assert_eq!(plan.fragment_count, 1);
        assert_eq!(plan.fragment_len(1), Some(1));
    }

    #[test]
    fn test_plan_megabyte_scenario() {
        let ceiling = MIB - 62;
        assert_eq!(ceiling, 1_048_514);

        let plan = plan(2_500_000, ceiling, 100 * MIB).unwrap();
        assert_eq!(plan.fragment_count, 3);
        assert_eq!(plan.fragment_len(1), Some(1_048_514));
        assert_eq!(plan.fragment_len(2), Some(1_048_514));
        assert_eq!(plan.fragment_len(3), Some(403_908));
    }

    #[test]
    fn test_plan_zero_ceiling() {
        assert!(matches!(
            plan(10, 0, 100),
            Err(BlobError::InvalidChunkPlan(_))
        ));
    }

    #[test]
    fn test_plan_fragment_count_overflow() {
        let too_many = u64::from(u32::MAX) + 1;
        assert!(matches!(
            plan(too_many, 1, u64::MAX),
            Err(BlobError::InvalidChunkPlan(_))
        ));
    }

    #[test]
    fn test_chunk_ceiling_subtracts_overhead_and_name() {
        assert_eq!(chunk_ceiling(1024 * 1024, 62, 0).unwrap(), 1_048_514);
        assert_eq!(chunk_ceiling(1024 * 1024, 62, 14).unwrap(), 1_048_500);
        assert!(chunk_ceiling(100, 62, 38).is_err());
        assert!(chunk_ceiling(50, 62, 0).is_err());
    }
}
