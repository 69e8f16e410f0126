use std::time::Instant;

use super::{BucketTable, KeyedCell};

/// Result of peeling a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Peeled<C> {
    /// Every key was recovered and the table emptied out.
    Complete(Vec<u32>),
    /// No pure bucket remains but the table is not empty. `residual` holds
    /// the keys that were not recovered.
    Stalled {
        recovered: Vec<u32>,
        residual: BucketTable<C>,
    },
}

impl<C> Peeled<C> {
    /// Keys recovered so far, in the order they were peeled.
    pub fn recovered(&self) -> &[u32] {
        match self {
            Peeled::Complete(keys) => keys,
            Peeled::Stalled { recovered, .. } => recovered,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, Peeled::Complete(_))
    }
}

impl<C: KeyedCell> BucketTable<C> {
    /// A bucket is pure when it holds exactly one key and that key hashes back
    /// to the bucket. The second check catches buckets whose count is 1 only
    /// because a negative entry cancelled a positive one.
    fn pure_key(&self, idx: usize) -> Option<u32> {
        let cell = &self.cells[idx];
        if cell.count() != 1 {
            return None;
        }
        let key = cell.key();
        if self.indexes(key).contains(&idx) {
            Some(key)
        } else {
            None
        }
    }

    /// Repeatedly removes the key of some pure bucket from all of its
    /// buckets. Passes scan the buckets in index order; a pass that recovers
    /// nothing ends the loop. Counts only ever decrease, so at most one key is
    /// recovered per bucket.
    pub fn peel(mut self) -> Peeled<C> {
        let t1 = Instant::now();
        let mut recovered = vec![];
        let mut passes = 0;
        loop {
            passes += 1;
            let mut progress = false;
            for idx in 0..self.cells.len() {
                if let Some(key) = self.pure_key(idx) {
                    self.delete(key);
                    recovered.push(key);
                    progress = true;
                }
            }
            if !progress {
                break;
            }
        }
        debug!(
            "peeled {} keys from {} table in {} passes: {:?}",
            recovered.len(),
            C::NAME,
            passes,
            Instant::now() - t1,
        );
        if self.is_empty() {
            Peeled::Complete(recovered)
        } else {
            Peeled::Stalled { recovered, residual: self }
        }
    }
}
