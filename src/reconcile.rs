//! Decoding a difference table into the indices of the dropped packets.
//!
//! Keys are first peeled off the difference. Whatever peeling cannot resolve,
//! and every key of a table without key material, is left to the exact
//! reconciliation model over the candidate packets that remain.
use std::collections::{HashMap, VecDeque};
use std::time::Instant;

use crate::fingerprint::Fingerprint;
use crate::ilp::{ReconciliationModel, Solver};
use crate::table::{BucketTable, Cell, CountCell, Peeled, SumCell, XorCell};
use crate::{Error, Result};

/// Bucket tables the reconciler can decode.
pub trait Decode: Cell {
    /// Peels as many keys as the cell type allows.
    fn peel(table: BucketTable<Self>) -> Peeled<Self>;
}

impl Decode for CountCell {
    fn peel(table: BucketTable<Self>) -> Peeled<Self> {
        if table.is_empty() {
            Peeled::Complete(vec![])
        } else {
            Peeled::Stalled { recovered: vec![], residual: table }
        }
    }
}

impl Decode for XorCell {
    fn peel(table: BucketTable<Self>) -> Peeled<Self> {
        table.peel()
    }
}

impl Decode for SumCell {
    fn peel(table: BucketTable<Self>) -> Peeled<Self> {
        table.peel()
    }
}

/// The dropped packets, as ascending indices into the candidate list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recovery {
    pub indices: Vec<usize>,
    /// How many were recovered by peeling.
    pub peeled: usize,
    /// How many were recovered by solving the model.
    pub solved: usize,
}

/// Assigns recovered keys to candidate packets. Each key takes the lowest
/// candidate index with that fingerprint not already taken.
struct CandidateIndex {
    by_key: HashMap<Fingerprint, VecDeque<usize>>,
}

impl CandidateIndex {
    fn new(candidates: &[Fingerprint]) -> Self {
        let mut by_key: HashMap<Fingerprint, VecDeque<usize>> = HashMap::new();
        for (i, &key) in candidates.iter().enumerate() {
            by_key.entry(key).or_default().push_back(i);
        }
        Self { by_key }
    }

    fn take(&mut self, key: Fingerprint) -> Result<usize> {
        self.by_key
            .get_mut(&key)
            .and_then(|indices| indices.pop_front())
            .ok_or(Error::SpuriousRecovery { fingerprint: key })
    }

    /// Candidates not yet taken, in ascending order.
    fn remaining(&self) -> Vec<usize> {
        let mut remaining: Vec<usize> = self.by_key.values().flatten().copied().collect();
        remaining.sort_unstable();
        remaining
    }
}

/// Decodes the difference table `diff` into the indices of the `expected`
/// dropped packets among `candidates`, the fingerprints of every packet that
/// could have been dropped.
pub fn reconcile<C: Decode, S: Solver + ?Sized>(
    diff: &BucketTable<C>,
    candidates: &[Fingerprint],
    expected: usize,
    solver: &mut S,
) -> Result<Recovery> {
    let t1 = Instant::now();
    diff.check_difference()?;

    let canonical: Vec<Fingerprint> =
        candidates.iter().map(|&key| diff.canonical_key(key)).collect();
    let mut index = CandidateIndex::new(&canonical);
    let peeled = C::peel(diff.clone());
    let t2 = Instant::now();
    let mut indices = peeled
        .recovered()
        .iter()
        .map(|&key| index.take(key))
        .collect::<Result<Vec<_>>>()?;
    let n_peeled = indices.len();

    let residual = match peeled {
        Peeled::Complete(_) => {
            if n_peeled != expected {
                return Err(Error::CardinalityMismatch { expected, found: n_peeled });
            }
            indices.sort_unstable();
            debug!("peeled all {} packets: {:?}", n_peeled, t2 - t1);
            return Ok(Recovery { indices, peeled: n_peeled, solved: 0 });
        }
        Peeled::Stalled { residual, .. } => residual,
    };
    residual.check_difference()?;
    let remaining_expected = expected
        .checked_sub(n_peeled)
        .ok_or(Error::CardinalityMismatch { expected, found: n_peeled })?;

    let remaining = index.remaining();
    let remaining_keys: Vec<Fingerprint> = remaining.iter().map(|&i| candidates[i]).collect();
    debug!(
        "peeling stalled after {} packets, solving for {} among {} candidates",
        n_peeled,
        remaining_expected,
        remaining.len(),
    );
    let model = ReconciliationModel::build(&residual, &remaining_keys, remaining_expected)?;
    let selection = model.solve(solver).map_err(|e| match e {
        Error::CardinalityMismatch { found, .. } => Error::CardinalityMismatch {
            expected,
            found: found + n_peeled,
        },
        e => e,
    })?;
    let t3 = Instant::now();
    let n_solved = selection.len();
    indices.extend(selection.into_iter().map(|i| remaining[i]));
    indices.sort_unstable();
    debug!(
        "reconciled {} packets (peel {:?}, model {:?})",
        indices.len(),
        t2 - t1,
        t3 - t2,
    );
    Ok(Recovery { indices, peeled: n_peeled, solved: n_solved })
}

/// Decodes the packets of the sender's `log` that are missing from the
/// receiver's table. The sender's table is rebuilt from the log with the
/// receiver's configuration and offset.
pub fn reconcile_log<C: Decode, B: AsRef<[u8]>, S: Solver + ?Sized>(
    log: &[B],
    received: &BucketTable<C>,
    solver: &mut S,
) -> Result<Recovery> {
    let mut sent = received.empty_clone();
    let mut candidates = Vec::with_capacity(log.len());
    for packet in log {
        candidates.push(sent.insert_packet(packet.as_ref())?);
    }
    let expected = log.len() as i64 - received.num_keys();
    if expected < 0 {
        warn!("receiver saw {} more packets than were sent", -expected);
        return Err(Error::Infeasible);
    }
    let diff = sent.subtract(received)?;
    reconcile(&diff, &candidates, expected as usize, solver)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::fingerprint::Fingerprinter;
    use crate::ilp::tests::distinct_bucket_keys;
    use crate::ilp::BacktrackingSolver;
    use crate::table::{CountingTable, InvertibleTable, SummingTable};

    fn one_hash_config() -> SessionConfig {
        SessionConfig::default().with_buckets(10).with_hashes(1)
    }

    #[test]
    fn test_counting_table_single_drop() {
        let keys = distinct_bucket_keys(&one_hash_config());
        let mut sent = CountingTable::new(one_hash_config(), 0).unwrap();
        let mut received = sent.empty_clone();
        for (i, &key) in keys.iter().enumerate() {
            sent.insert(key);
            if i != 3 {
                received.insert(key);
            }
        }
        let diff = sent.subtract(&received).unwrap();
        let recovery = reconcile(&diff, &keys, 1, &mut BacktrackingSolver::default()).unwrap();
        assert_eq!(recovery, Recovery { indices: vec![3], peeled: 0, solved: 1 });
    }

    #[test]
    fn test_counting_table_wrong_expectation() {
        let keys = distinct_bucket_keys(&one_hash_config());
        let mut diff = CountingTable::new(one_hash_config(), 0).unwrap();
        diff.insert(keys[3]);
        let err = reconcile(&diff, &keys, 2, &mut BacktrackingSolver::default()).unwrap_err();
        assert!(matches!(err, Error::CardinalityMismatch { expected: 2, found: 1 }));
        assert!(err.is_too_few());
        assert!(!err.is_too_many());
    }

    #[test]
    fn test_counting_table_found_too_many() {
        let mut diff = CountingTable::new(one_hash_config(), 0).unwrap();
        diff.insert(5);
        let err = reconcile(&diff, &[5, 6], 0, &mut BacktrackingSolver::default()).unwrap_err();
        assert!(matches!(err, Error::CardinalityMismatch { expected: 0, found: 1 }));
        assert!(err.is_too_many());
        assert!(!err.is_too_few());
    }

    #[test]
    fn test_peeled_too_many() {
        let mut diff = InvertibleTable::new(one_hash_config(), 0).unwrap();
        diff.insert(77);
        let err = reconcile(&diff, &[5, 77], 0, &mut BacktrackingSolver::default()).unwrap_err();
        assert!(matches!(err, Error::CardinalityMismatch { expected: 0, found: 1 }));
        assert!(err.is_too_many());
    }

    #[test]
    fn test_empty_difference() {
        let diff = InvertibleTable::new(one_hash_config(), 0).unwrap();
        let recovery = reconcile(&diff, &[1, 2, 3], 0, &mut BacktrackingSolver::default()).unwrap();
        assert!(recovery.indices.is_empty());
        let diff = CountingTable::new(one_hash_config(), 0).unwrap();
        let recovery = reconcile(&diff, &[1, 2, 3], 0, &mut BacktrackingSolver::default()).unwrap();
        assert!(recovery.indices.is_empty());
    }

    #[test]
    fn test_peel_then_solve() {
        let config = SessionConfig::default().with_buckets(40).with_hashes(1);
        let table = InvertibleTable::new(config, 0).unwrap();
        let bucket = table.indexes(0)[0];
        let pair = (1..100_000).find(|&k| table.indexes(k)[0] == bucket).unwrap();
        let single = (1..100_000).find(|&k| table.indexes(k)[0] != bucket).unwrap();
        let other = (single + 1..100_000).find(|&k| table.indexes(k)[0] != bucket).unwrap();

        let mut diff = table.clone();
        for key in [0, pair, single] {
            diff.insert(key);
        }
        let candidates = vec![other, 0, single, pair];
        let recovery = reconcile(&diff, &candidates, 3, &mut BacktrackingSolver::default()).unwrap();
        assert_eq!(recovery, Recovery { indices: vec![1, 2, 3], peeled: 1, solved: 2 });
    }

    #[test]
    fn test_duplicate_fingerprints_take_lowest_index() {
        let mut diff = InvertibleTable::new(one_hash_config(), 0).unwrap();
        diff.insert(77);
        let candidates = vec![5, 77, 9, 77];
        let recovery = reconcile(&diff, &candidates, 1, &mut BacktrackingSolver::default()).unwrap();
        assert_eq!(recovery.indices, vec![1]);
    }

    #[test]
    fn test_summing_table_keys_above_modulus() {
        let mut diff = SummingTable::new(one_hash_config(), 0).unwrap();
        assert_eq!(diff.indexes(65522), diff.indexes(1));
        diff.insert(65522);
        let candidates = vec![5, 65522];
        let recovery = reconcile(&diff, &candidates, 1, &mut BacktrackingSolver::default()).unwrap();
        assert_eq!(recovery, Recovery { indices: vec![1], peeled: 1, solved: 0 });
    }

    #[test]
    fn test_reconcile_log_window_above_modulus() {
        let config = one_hash_config().with_packet_bytes(4);
        let log = vec![vec![0x01, 0x00, 0x00, 0x00], vec![0xf2, 0xff, 0x01, 0x00]];
        let table = SummingTable::new(config.clone(), 0).unwrap();
        assert_eq!(table.fingerprint(&log[0]).unwrap(), 1);
        assert_eq!(table.fingerprint(&log[1]).unwrap(), 1);

        let offset = Fingerprinter::from_config(&config).unwrap().choose_offset(&log).unwrap();
        assert_eq!(offset, 1);
        let mut received = SummingTable::new(config, offset).unwrap();
        received.insert_packet(&log[0]).unwrap();
        let recovery = reconcile_log(&log, &received, &mut BacktrackingSolver::default())
            .unwrap();
        assert_eq!(recovery, Recovery { indices: vec![1], peeled: 1, solved: 0 });
    }

    #[test]
    fn test_spurious_recovery() {
        let mut diff = InvertibleTable::new(one_hash_config(), 0).unwrap();
        diff.insert(77);
        let err = reconcile(&diff, &[1, 2, 3], 1, &mut BacktrackingSolver::default()).unwrap_err();
        assert!(matches!(err, Error::SpuriousRecovery { fingerprint: 77 }));
    }

    #[test]
    fn test_inconsistent_difference() {
        let mut sent = InvertibleTable::new(one_hash_config(), 0).unwrap();
        let mut received = sent.empty_clone();
        sent.insert(5);
        received.insert(5);
        received.insert(6);
        let diff = sent.subtract(&received).unwrap();
        assert!(matches!(
            reconcile(&diff, &[5, 6], 0, &mut BacktrackingSolver::default()),
            Err(Error::Infeasible)
        ));
    }

    fn gen_packets(n: usize, seed: u64) -> Vec<Vec<u8>> {
        use rand::{Rng, SeedableRng};
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(seed);
        (0..n).map(|_| (0..16).map(|_| rng.gen()).collect()).collect()
    }

    #[test]
    fn test_reconcile_log() {
        let packets = gen_packets(500, 42);
        let config = SessionConfig::default()
            .with_buckets(200)
            .with_hashes(2)
            .with_fingerprint_bits(32)
            .with_modulus(4294967291);
        let dropped = [7, 123, 124, 300, 499];
        let mut received = SummingTable::new(config, 0).unwrap();
        for (i, packet) in packets.iter().enumerate() {
            if !dropped.contains(&i) {
                received.insert_packet(packet).unwrap();
            }
        }
        let recovery = reconcile_log(&packets, &received, &mut BacktrackingSolver::default())
            .unwrap();
        assert_eq!(recovery.indices, dropped.to_vec());
    }

    #[test]
    fn test_reconcile_log_receiver_saw_extra() {
        let packets = gen_packets(5, 43);
        let mut received = CountingTable::new(one_hash_config(), 0).unwrap();
        for packet in packets.iter().chain(packets.iter().take(1)) {
            received.insert_packet(packet).unwrap();
        }
        assert!(matches!(
            reconcile_log(&packets, &received, &mut BacktrackingSolver::default()),
            Err(Error::Infeasible)
        ));
    }
}
