//! Tables of modular inverses used by Newton's identities.
//!
//! A table depends only on the field modulus and the power sum degree, so it
//! is computed once per configuration and shared read-only afterwards.
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;

use crate::arithmetic::Field;

type InverseTableCache = HashMap<(u32, usize), Arc<[u32]>>;

static INVERSE_TABLES: Lazy<Mutex<InverseTableCache>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Returns the table whose `i`-th entry is the inverse of `i + 1` in the
/// field, for `i` in `0..degree`.
///
/// Indices that are multiples of the modulus have no inverse and map to zero;
/// this only happens when `degree >= modulus`, which decoding never reaches
/// because a field of size `p` cannot hold more than `p` distinct roots.
pub fn inverse_table(field: &Field, degree: usize) -> Arc<[u32]> {
    let key = (field.modulus(), degree);
    let mut cache = match INVERSE_TABLES.lock() {
        Ok(cache) => cache,
        // Entries are only ever inserted whole, so a poisoned cache is intact.
        Err(poisoned) => poisoned.into_inner(),
    };
    cache
        .entry(key)
        .or_insert_with(|| {
            debug!("computing inverse table for GF({}) up to {}", key.0, key.1);
            (1..=degree as u64)
                .map(|i| field.inv(field.reduce(i)).unwrap_or(0))
                .collect()
        })
        .clone()
}
