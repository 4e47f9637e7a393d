use ahash::RandomState;
use core::hash::BuildHasher;

/// Maps keys to bucket indices with fixed seeds, so placement is stable
/// across runs.
pub struct BucketHasher {
    inner: RandomState,
    mask: usize,
}

impl BucketHasher {
    /// `buckets` must be a power of two
    pub fn new(buckets: usize) -> Self {
        debug_assert!(buckets.is_power_of_two());
        let inner = RandomState::with_seeds(
            0x6a65_6170_6361_6368,
            0x0522_a25a_e9c7_69f9,
            0xeed2_797b_9571_bc75,
            0x4feb_29c1_fbbd_59d0,
        );
        Self {
            inner,
            mask: buckets - 1,
        }
    }

    #[inline]
    pub fn bucket(&self, key: &[u8]) -> usize {
        (self.inner.hash_one(key) as usize) & self.mask
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stable_and_in_range() {
        let hasher = BucketHasher::new(64);
        let a = hasher.bucket(b"some-key");
        assert_eq!(a, BucketHasher::new(64).bucket(b"some-key"));
        for i in 0..1000u32 {
            assert!(hasher.bucket(&i.to_le_bytes()) < 64);
        }
    }

    #[test]
    fn test_single_bucket() {
        let hasher = BucketHasher::new(1);
        assert_eq!(hasher.bucket(b"anything"), 0);
    }
}
