#![cfg_attr(docsrs, feature(doc_cfg))]

//! _dropsketch_ infers which packets were dropped between two observation
//! points without either side transmitting its full packet list.
//!
//! Each observer summarizes the packets it saw in a compact sketch. The
//! sender's sketch minus the receiver's sketch is a sketch of the dropped
//! packets, which is then decoded back into indices of the sender's log.
//! Three sketches are provided:
//!
//! - A [`CountingTable`] holds a count per bucket. It is the smallest, but
//!   decoding always requires solving a [`ReconciliationModel`].
//! - An [`InvertibleTable`] or [`SummingTable`] also holds a sum of the keys
//!   in each bucket, so most drops are recovered by peeling pure buckets.
//!   The model resolves whatever peeling leaves behind.
//! - A [`FinalizedAccumulator`] holds the first `D` power sums of the keys
//!   in a prime field. Up to `D` drops are recovered algebraically as the
//!   roots of a polynomial.
//!
//! Keys are `W`-bit fingerprints read from the packets at a bit offset
//! chosen per session; see [`Fingerprinter`]. Both sketches of a
//! comparison must share one [`SessionConfig`] and one offset.
//!
//! # Examples
//!
//! ```
//! use dropsketch::{reconcile_log, BacktrackingSolver, SessionConfig, SummingTable};
//!
//! let config = SessionConfig::default().with_packet_bytes(4);
//! let log: Vec<Vec<u8>> = (0..50u32).map(|i| (i * 7919).to_le_bytes().to_vec()).collect();
//!
//! let mut received = SummingTable::new(config, 0).unwrap();
//! for (i, packet) in log.iter().enumerate() {
//!     if i != 17 && i != 33 {
//!         received.insert_packet(packet).unwrap();
//!     }
//! }
//! let recovery = reconcile_log(&log, &received, &mut BacktrackingSolver::default()).unwrap();
//! assert_eq!(recovery.indices, vec![17, 33]);
//! ```

#[macro_use]
extern crate log;

#[macro_use]
mod macros;

mod error;
pub use error::{Error, Result};

pub mod config;
pub use config::{HashPolicy, SessionConfig};

/// Prime field arithmetic and polynomial evaluation.
pub mod arithmetic {
    mod evaluator;
    mod modint;

    pub use evaluator::*;
    pub use modint::{is_prime, Field};
}

pub(crate) mod precompute;

pub mod fingerprint;
pub use fingerprint::{Fingerprint, Fingerprinter};

pub mod hashing;
pub use hashing::BucketHasher;

pub mod table;
pub use table::{
    BucketTable, CountingTable, InvertibleTable, Peeled, SummingTable,
};

pub mod power_sum;
pub use power_sum::{BufferingAccumulator, FinalizedAccumulator, PowerSumAccumulator};

pub mod ilp;
pub use ilp::{BacktrackingSolver, ReconciliationModel, Solver, Uniqueness};

cfg_glpk! {
    pub use ilp::GlpkSolver;
}

pub mod reconcile;
pub use reconcile::{reconcile, reconcile_log, Decode, Recovery};

pub mod snapshot;
pub use snapshot::Snapshot;

#[cfg(test)]
mod tests {
    use super::*;
    use rand::seq::index::sample;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    const PACKET_BYTES: usize = 16;

    fn config() -> SessionConfig {
        SessionConfig::default()
            .with_buckets(1000)
            .with_hashes(2)
            .with_fingerprint_bits(32)
            .with_modulus(4294967291)
            .with_packet_bytes(PACKET_BYTES)
    }

    fn gen_packets_with_seed(n: usize, seed: u64) -> Vec<Vec<u8>> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        (0..n)
            .map(|_| (0..PACKET_BYTES).map(|_| rng.gen()).collect())
            .collect()
    }

    /// The receiver sees every logged packet except `num_dropped` random
    /// ones. If `malicious`, it also reports a packet that was never sent in
    /// place of one it did receive.
    fn received_packets(
        log: &[Vec<u8>],
        num_dropped: usize,
        malicious: bool,
        seed: u64,
    ) -> (Vec<Vec<u8>>, Vec<usize>) {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut dropped = sample(&mut rng, log.len(), num_dropped + 1).into_vec();
        let malicious_i = dropped.pop().unwrap();
        dropped.sort();
        let mut received = vec![];
        for (i, packet) in log.iter().enumerate() {
            if malicious && i == malicious_i {
                received.push(vec![0xff; PACKET_BYTES]);
            } else if !dropped.contains(&i) {
                received.push(packet.clone());
            }
        }
        (received, dropped)
    }

    fn base_table_test<C: Decode>(num_logged: usize, num_dropped: usize, malicious: bool) {
        let log = gen_packets_with_seed(num_logged, 1);
        let (received, dropped) = received_packets(&log, num_dropped, malicious, 2);
        let mut table = BucketTable::<C>::new(config(), 0).unwrap();
        for packet in &received {
            table.insert_packet(packet).unwrap();
        }
        let result = reconcile_log(&log, &table, &mut BacktrackingSolver::default());
        if malicious {
            assert!(result.is_err(), "{:?}", result);
        } else {
            assert_eq!(result.unwrap().indices, dropped);
        }
    }

    fn base_power_sum_test(num_logged: usize, num_dropped: usize, malicious: bool) {
        let log = gen_packets_with_seed(num_logged, 3);
        let (received, dropped) = received_packets(&log, num_dropped, malicious, 4);
        let mut sent = PowerSumAccumulator::new(config()).unwrap();
        let mut seen = PowerSumAccumulator::new(config()).unwrap();
        for packet in &log {
            sent.insert(packet).unwrap();
        }
        for packet in &received {
            seen.insert(packet).unwrap();
        }
        sent.finalize(None).unwrap();
        let offset = sent.as_finalized().unwrap().offset();
        seen.finalize(Some(offset)).unwrap();
        let result = sent.subtract(&seen).and_then(|diff| diff.decode_with_log(&log));
        if malicious {
            assert!(result.is_err(), "{:?}", result);
        } else {
            assert_eq!(result.unwrap(), dropped);
        }
    }

    #[test]
    fn counting_none_dropped() {
        base_table_test::<table::CountCell>(100, 0, false);
    }

    #[test]
    fn counting_one_dropped() {
        base_table_test::<table::CountCell>(100, 1, false);
    }

    #[test]
    fn counting_three_dropped() {
        base_table_test::<table::CountCell>(100, 3, false);
    }

    #[test]
    fn counting_one_malicious_and_one_dropped() {
        base_table_test::<table::CountCell>(100, 1, true);
    }

    #[test]
    fn invertible_none_dropped() {
        base_table_test::<table::XorCell>(1000, 0, false);
    }

    #[test]
    fn invertible_many_dropped() {
        base_table_test::<table::XorCell>(1000, 20, false);
    }

    #[test]
    fn invertible_one_malicious_and_many_dropped() {
        base_table_test::<table::XorCell>(1000, 20, true);
    }

    #[test]
    fn summing_many_dropped() {
        base_table_test::<table::SumCell>(1000, 20, false);
    }

    #[test]
    fn summing_one_malicious_and_none_dropped() {
        base_table_test::<table::SumCell>(1000, 0, true);
    }

    #[test]
    fn power_sum_none_dropped() {
        base_power_sum_test(1000, 0, false);
    }

    #[test]
    fn power_sum_threshold_dropped() {
        base_power_sum_test(1000, 20, false);
    }

    #[test]
    fn power_sum_one_malicious_and_one_dropped() {
        base_power_sum_test(1000, 1, true);
    }

    #[test]
    fn power_sum_over_threshold() {
        let log = gen_packets_with_seed(100, 5);
        let (received, _) = received_packets(&log, 21, false, 6);
        let mut sent = BufferingAccumulator::new(config()).unwrap();
        let mut seen = BufferingAccumulator::new(config()).unwrap();
        log.iter().for_each(|p| sent.insert(p).unwrap());
        received.iter().for_each(|p| seen.insert(p).unwrap());
        let sent = sent.finalize(Some(0)).unwrap();
        let seen = seen.finalize(Some(0)).unwrap();
        let diff = sent.subtract(&seen).unwrap();
        assert!(matches!(
            diff.decode_with_log(&log),
            Err(Error::ThresholdExceeded { count: 21, threshold: 20 })
        ));
    }
}
