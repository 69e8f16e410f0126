use serde::{Deserialize, Serialize};

use crate::arithmetic::is_prime;
use crate::{Error, Result};

// Session defaults
const DEFAULT_NUM_BUCKETS: usize = 1000;
const DEFAULT_NUM_HASHES: u32 = 2;
const DEFAULT_FINGERPRINT_BITS: u32 = 16;
/// The largest prime below 2^16.
const DEFAULT_MODULUS: u32 = 65521;
const DEFAULT_DEGREE: usize = 20;
const DEFAULT_PACKET_BYTES: usize = 16;

/// How the `K` hash functions share the bucket table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HashPolicy {
    /// Every hash function may land anywhere in the table.
    Shared,
    /// Hash function `i` only lands in the `i`-th contiguous slice of the
    /// table. Requires the table size to be a multiple of `K`.
    Disjoint,
}

/// Parameters fixed for the lifetime of a comparison. Both observers must use
/// identical configurations for their sketches to be differenced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub num_buckets: usize,
    pub num_hashes: u32,
    /// Width `W` of a fingerprint in bits.
    pub fingerprint_bits: u32,
    /// Prime modulus of the field used by power sums and bucket sums.
    pub modulus: u32,
    /// Number of power sums `D`, the most drops a power sum sketch decodes.
    pub degree: usize,
    pub hash_policy: HashPolicy,
    pub hash_seed: u64,
    /// Fixed length of every packet buffer.
    pub packet_bytes: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            num_buckets: DEFAULT_NUM_BUCKETS,
            num_hashes: DEFAULT_NUM_HASHES,
            fingerprint_bits: DEFAULT_FINGERPRINT_BITS,
            modulus: DEFAULT_MODULUS,
            degree: DEFAULT_DEGREE,
            hash_policy: HashPolicy::Shared,
            hash_seed: 0,
            packet_bytes: DEFAULT_PACKET_BYTES,
        }
    }
}

impl SessionConfig {
    pub fn with_buckets(mut self, num_buckets: usize) -> Self {
        self.num_buckets = num_buckets;
        self
    }

    pub fn with_hashes(mut self, num_hashes: u32) -> Self {
        self.num_hashes = num_hashes;
        self
    }

    pub fn with_fingerprint_bits(mut self, bits: u32) -> Self {
        self.fingerprint_bits = bits;
        self
    }

    pub fn with_modulus(mut self, modulus: u32) -> Self {
        self.modulus = modulus;
        self
    }

    pub fn with_degree(mut self, degree: usize) -> Self {
        self.degree = degree;
        self
    }

    pub fn with_hash_policy(mut self, policy: HashPolicy) -> Self {
        self.hash_policy = policy;
        self
    }

    pub fn with_hash_seed(mut self, seed: u64) -> Self {
        self.hash_seed = seed;
        self
    }

    pub fn with_packet_bytes(mut self, packet_bytes: usize) -> Self {
        self.packet_bytes = packet_bytes;
        self
    }

    /// Checks that the parameters describe a usable session.
    pub fn validate(&self) -> Result<()> {
        if self.num_buckets == 0 {
            return Err(Error::InvalidConfig("table needs at least one bucket".into()));
        }
        if self.num_hashes == 0 {
            return Err(Error::InvalidConfig("need at least one hash function".into()));
        }
        if self.fingerprint_bits == 0 || self.fingerprint_bits > 32 {
            return Err(Error::InvalidConfig(format!(
                "fingerprint width must be 1..=32 bits, got {}",
                self.fingerprint_bits
            )));
        }
        if self.degree == 0 {
            return Err(Error::InvalidConfig("power sum degree must be positive".into()));
        }
        if !is_prime(self.modulus) {
            return Err(Error::InvalidConfig(format!("modulus {} is not prime", self.modulus)));
        }
        if self.degree as u64 >= self.modulus as u64 {
            return Err(Error::InvalidConfig(format!(
                "power sum degree {} must be below the modulus {}",
                self.degree, self.modulus
            )));
        }
        if self.hash_policy == HashPolicy::Disjoint
            && self.num_buckets % self.num_hashes as usize != 0
        {
            return Err(Error::InvalidConfig(format!(
                "{} buckets cannot be split into {} disjoint ranges",
                self.num_buckets, self.num_hashes
            )));
        }
        if self.packet_bytes * 8 < self.fingerprint_bits as usize {
            return Err(Error::InvalidConfig(format!(
                "{}-byte packets cannot hold a {}-bit fingerprint",
                self.packet_bytes, self.fingerprint_bits
            )));
        }
        Ok(())
    }

    /// Buckets owned by each hash function under the disjoint policy, or the
    /// whole table under the shared policy.
    pub fn buckets_per_hash(&self) -> usize {
        match self.hash_policy {
            HashPolicy::Shared => self.num_buckets,
            HashPolicy::Disjoint => self.num_buckets / self.num_hashes as usize,
        }
    }

    /// Rejects any difference between two configurations that would make
    /// combining their sketches meaningless.
    pub fn ensure_compatible(&self, other: &Self) -> Result<()> {
        if self.num_buckets != other.num_buckets {
            return Err(Error::mismatch(format!(
                "table sizes {} and {}", self.num_buckets, other.num_buckets)));
        }
        if self.num_hashes != other.num_hashes
            || self.hash_policy != other.hash_policy
            || self.hash_seed != other.hash_seed
        {
            return Err(Error::mismatch("hash schemes differ"));
        }
        if self.modulus != other.modulus {
            return Err(Error::mismatch(format!(
                "moduli {} and {}", self.modulus, other.modulus)));
        }
        if self.fingerprint_bits != other.fingerprint_bits {
            return Err(Error::mismatch("fingerprint widths differ"));
        }
        if self.degree != other.degree {
            return Err(Error::mismatch(format!(
                "power sum degrees {} and {}", self.degree, other.degree)));
        }
        Ok(())
    }
}
