use std::fmt::Debug;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::arithmetic::Field;

/// One bucket of a bucket table. Counts are signed so that the difference of
/// two tables can expose buckets that lost more keys than they ever held.
pub trait Cell: Copy + Default + PartialEq + Eq + Debug + Serialize + DeserializeOwned {
    /// Short name used in logs.
    const NAME: &'static str;

    fn count(&self) -> i64;

    fn insert(&mut self, key: u32, field: &Field);

    fn delete(&mut self, key: u32, field: &Field);

    fn add_assign(&mut self, rhs: &Self, field: &Field);

    fn sub_assign(&mut self, rhs: &Self, field: &Field);

    /// The key as the bucket records it. Keys with the same canonical form
    /// are indistinguishable to the table, so they also hash alike.
    fn canonical_key(key: u32, _field: &Field) -> u32 {
        key
    }

    /// Sum of the keys in the bucket reduced modulo the field, if tracked.
    fn modular_sum(&self) -> Option<u32> {
        None
    }

    /// Whether every field of the bucket is zero.
    fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// A bucket holding no keys must hold no key material either.
    fn is_consistent(&self) -> bool {
        self.count() != 0 || self.is_empty()
    }
}

/// A cell that can name its key when it holds exactly one.
pub trait KeyedCell: Cell {
    /// The key of the only element. Meaningful only when the count is 1.
    fn key(&self) -> u32;
}

/// Counting Bloom filter bucket.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountCell {
    pub count: i64,
}

impl Cell for CountCell {
    const NAME: &'static str = "counting";

    fn count(&self) -> i64 {
        self.count
    }

    fn insert(&mut self, _key: u32, _field: &Field) {
        self.count += 1;
    }

    fn delete(&mut self, _key: u32, _field: &Field) {
        self.count -= 1;
    }

    fn add_assign(&mut self, rhs: &Self, _field: &Field) {
        self.count += rhs.count;
    }

    fn sub_assign(&mut self, rhs: &Self, _field: &Field) {
        self.count -= rhs.count;
    }
}

/// Invertible Bloom lookup table bucket: a count and the XOR of all keys.
/// XOR is its own inverse, so insert and delete toggle the key the same way.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct XorCell {
    pub count: i64,
    pub key_sum: u32,
}

impl Cell for XorCell {
    const NAME: &'static str = "invertible";

    fn count(&self) -> i64 {
        self.count
    }

    fn insert(&mut self, key: u32, _field: &Field) {
        self.count += 1;
        self.key_sum ^= key;
    }

    fn delete(&mut self, key: u32, _field: &Field) {
        self.count -= 1;
        self.key_sum ^= key;
    }

    fn add_assign(&mut self, rhs: &Self, _field: &Field) {
        self.count += rhs.count;
        self.key_sum ^= rhs.key_sum;
    }

    fn sub_assign(&mut self, rhs: &Self, _field: &Field) {
        self.count -= rhs.count;
        self.key_sum ^= rhs.key_sum;
    }
}

impl KeyedCell for XorCell {
    fn key(&self) -> u32 {
        self.key_sum
    }
}

/// Bucket holding a count and the sum of its keys in the field. Unlike the
/// XOR sum, the modular sum is linear, so the reconciliation model can
/// constrain it.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SumCell {
    pub count: i64,
    pub sum: u32,
}

impl Cell for SumCell {
    const NAME: &'static str = "summing";

    fn count(&self) -> i64 {
        self.count
    }

    fn insert(&mut self, key: u32, field: &Field) {
        self.count += 1;
        self.sum = field.add(self.sum, field.reduce(key as u64));
    }

    fn delete(&mut self, key: u32, field: &Field) {
        self.count -= 1;
        self.sum = field.sub(self.sum, field.reduce(key as u64));
    }

    fn add_assign(&mut self, rhs: &Self, field: &Field) {
        self.count += rhs.count;
        self.sum = field.add(self.sum, rhs.sum);
    }

    fn sub_assign(&mut self, rhs: &Self, field: &Field) {
        self.count -= rhs.count;
        self.sum = field.sub(self.sum, rhs.sum);
    }

    fn canonical_key(key: u32, field: &Field) -> u32 {
        field.reduce(key as u64)
    }

    fn modular_sum(&self) -> Option<u32> {
        Some(self.sum)
    }
}

impl KeyedCell for SumCell {
    fn key(&self) -> u32 {
        self.sum
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIELD: Field = Field::new(65521);

    #[test]
    fn xor_cell_toggles() {
        let mut cell = XorCell::default();
        cell.insert(0xabcd, &FIELD);
        cell.insert(0x1234, &FIELD);
        assert_eq!(cell.count(), 2);
        assert_eq!(cell.key(), 0xabcd ^ 0x1234);
        cell.delete(0xabcd, &FIELD);
        assert_eq!(cell.count(), 1);
        assert_eq!(cell.key(), 0x1234);
        cell.delete(0x1234, &FIELD);
        assert!(cell.is_empty());
    }

    #[test]
    fn sum_cell_wraps_in_field() {
        let mut cell = SumCell::default();
        cell.insert(65520, &FIELD);
        cell.insert(3, &FIELD);
        assert_eq!(cell.modular_sum(), Some(2));
        cell.delete(65520, &FIELD);
        assert_eq!(cell.key(), 3);
    }

    #[test]
    fn consistency() {
        assert!(CountCell::default().is_consistent());
        assert!(XorCell { count: 2, key_sum: 0 }.is_consistent());
        assert!(!XorCell { count: 0, key_sum: 7 }.is_consistent());
        assert!(!SumCell { count: 0, sum: 7 }.is_consistent());
        assert!(SumCell { count: -1, sum: 7 }.is_consistent());
        assert_eq!(CountCell { count: 3 }.modular_sum(), None);
    }

    #[test]
    fn sub_then_add_is_identity() {
        let a = SumCell { count: 3, sum: 10 };
        let b = SumCell { count: 5, sum: 20 };
        let mut c = a;
        c.sub_assign(&b, &FIELD);
        assert_eq!(c, SumCell { count: -2, sum: 65511 });
        c.add_assign(&b, &FIELD);
        assert_eq!(c, a);
    }
}
