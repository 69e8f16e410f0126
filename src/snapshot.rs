//! Persisted sketches.
//!
//! A snapshot is the bincode encoding of a table or finalized accumulator,
//! including the session configuration and fingerprint offset it was built
//! with. Decoding re-validates both, so a corrupted or foreign snapshot is
//! rejected instead of being differenced against a live sketch.
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::SessionConfig;
use crate::fingerprint::Fingerprinter;
use crate::power_sum::FinalizedAccumulator;
use crate::table::{BucketTable, Cell};
use crate::{Error, Result};

/// A sketch that can be written to and restored from bytes.
pub trait Snapshot: Serialize + DeserializeOwned {
    fn config(&self) -> &SessionConfig;

    fn offset(&self) -> usize;

    /// Checks the internal consistency of a decoded sketch.
    fn check(&self) -> Result<()>;

    fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let sketch: Self = bincode::deserialize(bytes)?;
        sketch.config().validate()?;
        let max_offset = Fingerprinter::from_config(sketch.config())?
            .max_offset(sketch.config().packet_bytes);
        if max_offset.map_or(true, |max| sketch.offset() > max) {
            return Err(Error::InvalidConfig(format!(
                "snapshot offset {} out of range",
                sketch.offset()
            )));
        }
        sketch.check()?;
        Ok(sketch)
    }

    /// Like [`from_bytes`](Snapshot::from_bytes), but also requires the
    /// snapshot to belong to the given session.
    fn from_bytes_for(bytes: &[u8], config: &SessionConfig) -> Result<Self> {
        let sketch = Self::from_bytes(bytes)?;
        config.ensure_compatible(sketch.config())?;
        Ok(sketch)
    }
}

impl<C: Cell> Snapshot for BucketTable<C> {
    fn config(&self) -> &SessionConfig {
        BucketTable::config(self)
    }

    fn offset(&self) -> usize {
        BucketTable::offset(self)
    }

    fn check(&self) -> Result<()> {
        if self.cells().len() != self.config().num_buckets {
            return Err(Error::mismatch(format!(
                "snapshot has {} buckets, configuration {}",
                self.cells().len(),
                self.config().num_buckets,
            )));
        }
        let modulus = self.config().modulus;
        match self
            .cells()
            .iter()
            .position(|c| c.modular_sum().map_or(false, |sum| sum >= modulus))
        {
            Some(bucket) => Err(Error::InconsistentBucket { bucket }),
            None => Ok(()),
        }
    }
}

impl Snapshot for FinalizedAccumulator {
    fn config(&self) -> &SessionConfig {
        FinalizedAccumulator::config(self)
    }

    fn offset(&self) -> usize {
        FinalizedAccumulator::offset(self)
    }

    fn check(&self) -> Result<()> {
        if self.power_sums().len() != self.config().degree {
            return Err(Error::mismatch(format!(
                "snapshot has {} power sums, configuration {}",
                self.power_sums().len(),
                self.config().degree,
            )));
        }
        if self.power_sums().iter().any(|&p| p >= self.config().modulus) {
            return Err(Error::InvalidConfig("power sum outside the field".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{InvertibleTable, SummingTable};

    fn config() -> SessionConfig {
        SessionConfig::default().with_buckets(30).with_hashes(3)
    }

    #[test]
    fn table_snapshot() {
        let mut table = InvertibleTable::new(config(), 4).unwrap();
        for key in [3, 1000, 60000] {
            table.insert(key);
        }
        let bytes = table.to_bytes().unwrap();
        let restored = InvertibleTable::from_bytes(&bytes).unwrap();
        assert_eq!(restored, table);
        assert_eq!(restored.offset(), 4);
    }

    #[test]
    fn snapshot_for_other_session() {
        let table = SummingTable::new(config(), 0).unwrap();
        let bytes = table.to_bytes().unwrap();
        assert!(SummingTable::from_bytes_for(&bytes, &config()).is_ok());
        assert!(matches!(
            SummingTable::from_bytes_for(&bytes, &config().with_hash_seed(1)),
            Err(Error::StructuralMismatch { .. })
        ));
    }

    #[test]
    fn accumulator_snapshot() {
        let acc = FinalizedAccumulator::from_fingerprints(
            SessionConfig::default(), 8, &[10, 20, 30]).unwrap();
        let bytes = acc.to_bytes().unwrap();
        let restored = FinalizedAccumulator::from_bytes(&bytes).unwrap();
        assert_eq!(restored, acc);
        assert_eq!(restored.decode_by_trial().unwrap(), vec![10, 20, 30]);
    }

    #[test]
    fn truncated_snapshot() {
        let table = InvertibleTable::new(config(), 0).unwrap();
        let bytes = table.to_bytes().unwrap();
        assert!(matches!(
            InvertibleTable::from_bytes(&bytes[..bytes.len() - 3]),
            Err(Error::Codec(_))
        ));
    }

    #[test]
    fn wrong_sketch_type() {
        // An accumulator's bytes do not decode as a table of the session.
        let acc = FinalizedAccumulator::from_fingerprints(config(), 0, &[1, 2]).unwrap();
        let bytes = acc.to_bytes().unwrap();
        assert!(InvertibleTable::from_bytes(&bytes).is_err());
    }
}
