//! Bucket tables: counting Bloom filters, invertible Bloom lookup tables, and
//! tables of modular key sums, all sharing one hashing and differencing
//! implementation.
mod cell;
mod peel;

pub use cell::{Cell, CountCell, KeyedCell, SumCell, XorCell};
pub use peel::Peeled;

use serde::{Deserialize, Serialize};

use crate::arithmetic::Field;
use crate::config::SessionConfig;
use crate::fingerprint::{Fingerprint, Fingerprinter};
use crate::hashing::BucketHasher;
use crate::{Error, Result};

/// Counting Bloom filter: a count per bucket.
pub type CountingTable = BucketTable<CountCell>;
/// Invertible Bloom lookup table: a count and XOR of keys per bucket.
pub type InvertibleTable = BucketTable<XorCell>;
/// A count and a modular sum of keys per bucket.
pub type SummingTable = BucketTable<SumCell>;

/// An array of `N` cells into which every key is added at its `K` bucket
/// indices. The table remembers the configuration and fingerprint offset it
/// was built with so that it refuses to combine with an incompatible table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketTable<C> {
    config: SessionConfig,
    offset: usize,
    cells: Vec<C>,
}

impl<C: Cell> BucketTable<C> {
    /// Creates an empty table for the session. Packets are fingerprinted at
    /// bit `offset`.
    pub fn new(config: SessionConfig, offset: usize) -> Result<Self> {
        config.validate()?;
        let fingerprinter = Fingerprinter::from_config(&config)?;
        match fingerprinter.max_offset(config.packet_bytes) {
            Some(max) if offset <= max => {}
            _ => {
                return Err(Error::InvalidConfig(format!(
                    "offset {} does not fit a {}-bit fingerprint in {}-byte packets",
                    offset, config.fingerprint_bits, config.packet_bytes,
                )));
            }
        }
        Ok(Self {
            cells: vec![C::default(); config.num_buckets],
            config,
            offset,
        })
    }

    /// Clones the table where all cells are empty.
    pub fn empty_clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            offset: self.offset,
            cells: vec![C::default(); self.cells.len()],
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn num_buckets(&self) -> usize {
        self.cells.len()
    }

    pub fn num_hashes(&self) -> u32 {
        self.config.num_hashes
    }

    pub fn cells(&self) -> &[C] {
        &self.cells
    }

    pub fn field(&self) -> Field {
        Field::new(self.config.modulus)
    }

    pub fn hasher(&self) -> BucketHasher {
        BucketHasher::new(&self.config)
    }

    /// Bucket indices of `key`, one per hash function.
    pub fn indexes(&self, key: u32) -> Vec<usize> {
        self.hasher().indexes(self.canonical_key(key))
    }

    /// The form in which the table records `key`. Summing tables keep keys
    /// modulo the field.
    pub fn canonical_key(&self, key: u32) -> u32 {
        C::canonical_key(key, &self.field())
    }

    /// Fingerprint of a packet at the table's offset.
    pub fn fingerprint(&self, packet: &[u8]) -> Result<Fingerprint> {
        Fingerprinter::from_config(&self.config)?.extract(packet, self.offset)
    }

    /// Adds the key at each of its bucket indices. A key that maps to the
    /// same bucket twice is added there twice.
    pub fn insert(&mut self, key: u32) {
        let field = self.field();
        for idx in self.indexes(key) {
            self.cells[idx].insert(key, &field);
        }
    }

    /// Exactly reverses [`insert`](Self::insert).
    pub fn delete(&mut self, key: u32) {
        let field = self.field();
        for idx in self.indexes(key) {
            self.cells[idx].delete(key, &field);
        }
    }

    /// Fingerprints and inserts a packet, returning its fingerprint.
    pub fn insert_packet(&mut self, packet: &[u8]) -> Result<Fingerprint> {
        let key = self.fingerprint(packet)?;
        self.insert(key);
        Ok(key)
    }

    pub fn delete_packet(&mut self, packet: &[u8]) -> Result<Fingerprint> {
        let key = self.fingerprint(packet)?;
        self.delete(key);
        Ok(key)
    }

    /// Whether every bucket of the key holds at least one element. A key that
    /// fails this was certainly not inserted.
    pub fn contains(&self, key: u32) -> bool {
        self.indexes(key).into_iter().all(|idx| self.cells[idx].count() != 0)
    }

    /// Total count over all buckets, which is `K` times the number of keys.
    pub fn total_count(&self) -> i64 {
        self.cells.iter().map(|c| c.count()).sum()
    }

    /// Number of keys the table holds.
    pub fn num_keys(&self) -> i64 {
        self.total_count() / self.config.num_hashes as i64
    }

    pub fn is_empty(&self) -> bool {
        self.cells.iter().all(|c| c.is_empty())
    }

    /// Errors with [`Error::StructuralMismatch`] unless both tables were built
    /// from the same session at the same offset.
    pub fn ensure_compatible(&self, other: &Self) -> Result<()> {
        self.config.ensure_compatible(&other.config)?;
        if self.offset != other.offset {
            return Err(Error::mismatch(format!(
                "fingerprint offsets {} and {}",
                self.offset, other.offset
            )));
        }
        Ok(())
    }

    /// Bucket-wise subtraction. After `sent.sub_assign(&received)` the table
    /// holds the keys that were sent but not received.
    pub fn sub_assign(&mut self, rhs: &Self) -> Result<()> {
        self.ensure_compatible(rhs)?;
        let field = self.field();
        for (cell, other) in self.cells.iter_mut().zip(&rhs.cells) {
            cell.sub_assign(other, &field);
        }
        Ok(())
    }

    /// Bucket-wise addition, merging the keys of two tables.
    pub fn add_assign(&mut self, rhs: &Self) -> Result<()> {
        self.ensure_compatible(rhs)?;
        let field = self.field();
        for (cell, other) in self.cells.iter_mut().zip(&rhs.cells) {
            cell.add_assign(other, &field);
        }
        Ok(())
    }

    /// Returns `self - rhs` without modifying either table.
    pub fn subtract(&self, rhs: &Self) -> Result<Self> {
        let mut diff = self.clone();
        diff.sub_assign(rhs)?;
        Ok(diff)
    }

    /// Checks that a difference table could have come from removing packets:
    /// no bucket has a negative count and no empty bucket carries key
    /// material.
    pub fn check_difference(&self) -> Result<()> {
        if self.cells.iter().any(|c| c.count() < 0) {
            debug!("difference has negative counts, more packets received than sent");
            return Err(Error::Infeasible);
        }
        match self.cells.iter().position(|c| !c.is_consistent()) {
            Some(bucket) => Err(Error::InconsistentBucket { bucket }),
            None => Ok(()),
        }
    }
}
