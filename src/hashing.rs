use serde::{Deserialize, Serialize};

use crate::config::{HashPolicy, SessionConfig};

const MULTIPLIER_ONE: u64 = 0x9e37_79b9_7f4a_7c15;
const MULTIPLIER_TWO: u64 = 0xda94_2042_e4dd_58b5;

/// Multiply-xorshift mixer.
fn mix(mut x: u64, multiplier: u64) -> u64 {
    x = x.wrapping_mul(multiplier);
    x ^= x >> 29;
    x = x.wrapping_mul(multiplier);
    x ^ (x >> 32)
}

/// Yields `count` hashes of a key by double hashing: the `i`-th hash is
/// `h1 + i * h2`. The second hash is forced odd so consecutive hashes never
/// coincide.
pub struct HashIter {
    h1: u64,
    h2: u64,
    i: u32,
    count: u32,
}

impl Iterator for HashIter {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        if self.i == self.count {
            return None;
        }
        let r = self.h1.wrapping_add((self.i as u64).wrapping_mul(self.h2));
        self.i += 1;
        Some(mix(r, MULTIPLIER_ONE))
    }
}

impl HashIter {
    pub fn from(key: u32, count: u32, seed: u64) -> HashIter {
        let h1 = mix(key as u64 ^ seed, MULTIPLIER_ONE);
        let h2 = mix((key as u64).rotate_left(32) ^ seed, MULTIPLIER_TWO) | 1;
        HashIter { h1, h2, i: 0, count }
    }
}

/// Maps a key to `K` bucket indices. Deterministic, so every table built from
/// the same configuration agrees on where each key lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketHasher {
    num_buckets: usize,
    num_hashes: u32,
    policy: HashPolicy,
    seed: u64,
}

impl BucketHasher {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            num_buckets: config.num_buckets,
            num_hashes: config.num_hashes,
            policy: config.hash_policy,
            seed: config.hash_seed,
        }
    }

    pub fn num_buckets(&self) -> usize {
        self.num_buckets
    }

    pub fn num_hashes(&self) -> u32 {
        self.num_hashes
    }

    /// The bucket chosen by hash function `hash_index` for `key`.
    pub fn bucket(&self, key: u32, hash_index: u32) -> usize {
        let h = HashIter::from(key, hash_index + 1, self.seed)
            .last()
            .unwrap_or_default();
        self.reduce(h, hash_index)
    }

    fn reduce(&self, h: u64, hash_index: u32) -> usize {
        match self.policy {
            HashPolicy::Shared => (h % self.num_buckets as u64) as usize,
            HashPolicy::Disjoint => {
                let per_hash = self.num_buckets / self.num_hashes as usize;
                (h % per_hash as u64) as usize + hash_index as usize * per_hash
            }
        }
    }

    /// All `K` bucket indices of `key`, in hash-function order. An index may
    /// repeat under the shared policy.
    pub fn indexes(&self, key: u32) -> Vec<usize> {
        HashIter::from(key, self.num_hashes, self.seed)
            .enumerate()
            .map(|(i, h)| self.reduce(h, i as u32))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher(policy: HashPolicy) -> BucketHasher {
        BucketHasher::new(&SessionConfig::default()
            .with_buckets(99)
            .with_hashes(3)
            .with_hash_policy(policy))
    }

    #[test]
    fn test_indexes() {
        let h = hasher(HashPolicy::Shared);
        let indexes = h.indexes(1234);
        assert_eq!(indexes.len(), 3);
        assert_eq!(indexes, h.indexes(1234), "indexes are deterministic");
        for (i, &idx) in indexes.iter().enumerate() {
            assert!(idx < 99);
            assert_eq!(idx, h.bucket(1234, i as u32));
        }
    }

    #[test]
    fn test_disjoint_ranges() {
        let h = hasher(HashPolicy::Disjoint);
        for key in 0..1000 {
            for (i, idx) in h.indexes(key).into_iter().enumerate() {
                assert!(idx >= i * 33 && idx < (i + 1) * 33, "{} {}", key, i);
            }
        }
    }

    #[test]
    fn test_seed_changes_indexes() {
        let config = SessionConfig::default().with_buckets(1 << 20);
        let h1 = BucketHasher::new(&config);
        let h2 = BucketHasher::new(&config.with_hash_seed(111));
        assert_ne!(h1.indexes(1234), h2.indexes(1234));
    }

    #[test]
    fn test_spread() {
        // Every bucket of a small table is reachable.
        let h = hasher(HashPolicy::Shared);
        let mut hit = vec![false; 99];
        for key in 0..2000 {
            for idx in h.indexes(key) {
                hit[idx] = true;
            }
        }
        assert!(hit.into_iter().all(|x| x));
    }
}
