//! Power sum accumulator.
//!
//! The accumulator holds the first `D` power sums of a multiset of
//! fingerprints in GF(p). Power sums are additive over multisets, so the
//! power sums of the dropped packets are the sender's minus the receiver's,
//! and Newton's identities turn them into the coefficients of the monic
//! polynomial whose roots are the dropped fingerprints.
//!
//! Fingerprints are only meaningful once the bit offset is fixed, so an
//! accumulator first buffers raw packets and computes its power sums once,
//! when it is finalized with the session's offset.
use std::collections::HashMap;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::arithmetic::{self, CoefficientVector, Field};
use crate::config::SessionConfig;
use crate::fingerprint::{Fingerprint, Fingerprinter};
use crate::precompute::inverse_table;
use crate::{Error, Result};

/// Accumulator that still accepts packets. No power sums exist yet.
#[derive(Debug, Clone)]
pub struct BufferingAccumulator {
    config: SessionConfig,
    packets: Vec<Vec<u8>>,
}

/// Accumulator whose power sums have been computed. Accepts no further
/// packets, but can be subtracted and decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizedAccumulator {
    config: SessionConfig,
    offset: usize,
    /// `power_sums[i]` is the sum of `x^(i+1)` over the multiset.
    power_sums: Vec<u32>,
    /// Number of elements. Negative when more was subtracted than inserted.
    count: i64,
}

/// Either phase of an accumulator, for owners that cannot track the phase in
/// the type. Calling an operation of the wrong phase returns
/// [`Error::Misuse`] and leaves the accumulator untouched.
#[derive(Debug, Clone)]
pub enum PowerSumAccumulator {
    Buffering(BufferingAccumulator),
    Finalized(FinalizedAccumulator),
}

fn power_sums_of(field: &Field, degree: usize, keys: &[Fingerprint]) -> Vec<u32> {
    let mut power_sums = vec![0; degree];
    for &key in keys {
        let x = field.reduce(key as u64);
        let mut y = x;
        for sum in power_sums.iter_mut() {
            *sum = field.add(*sum, y);
            y = field.mul(y, x);
        }
    }
    power_sums
}

impl BufferingAccumulator {
    pub fn new(config: SessionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, packets: vec![] })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Buffers a copy of the packet. Packets shorter than the session's
    /// packet length are rejected.
    pub fn insert(&mut self, packet: &[u8]) -> Result<()> {
        if packet.len() < self.config.packet_bytes {
            return Err(Error::PacketTooShort {
                len: packet.len(),
                needed: self.config.packet_bytes,
            });
        }
        self.packets.push(packet.to_vec());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    pub fn packets(&self) -> &[Vec<u8>] {
        &self.packets
    }

    /// The offset that minimizes fingerprint collisions among the buffered
    /// packets.
    pub fn choose_offset(&self) -> Result<usize> {
        Fingerprinter::from_config(&self.config)?.choose_offset(&self.packets)
    }

    fn compute(&self, offset: Option<usize>) -> Result<FinalizedAccumulator> {
        let t1 = Instant::now();
        let offset = match offset {
            Some(offset) => offset,
            None => self.choose_offset()?,
        };
        let keys = Fingerprinter::from_config(&self.config)?
            .extract_all(&self.packets, offset)?;
        let t2 = Instant::now();
        let field = Field::new(self.config.modulus);
        let power_sums = power_sums_of(&field, self.config.degree, &keys);
        let t3 = Instant::now();
        debug!(
            "finalized {} packets at offset {}: fingerprints {:?}, power sums {:?}",
            keys.len(),
            offset,
            t2 - t1,
            t3 - t2,
        );
        Ok(FinalizedAccumulator {
            config: self.config.clone(),
            offset,
            power_sums,
            count: keys.len() as i64,
        })
    }

    /// Fingerprints every buffered packet at `offset` and accumulates its
    /// first `D` powers. With no offset, the collision-minimizing offset of
    /// the buffered packets is used. The receiving observer must pass the
    /// offset the sending observer chose.
    pub fn finalize(self, offset: Option<usize>) -> Result<FinalizedAccumulator> {
        self.compute(offset)
    }
}

impl FinalizedAccumulator {
    /// Builds a finalized accumulator directly from fingerprints.
    pub fn from_fingerprints(
        config: SessionConfig,
        offset: usize,
        keys: &[Fingerprint],
    ) -> Result<Self> {
        config.validate()?;
        let field = Field::new(config.modulus);
        let power_sums = power_sums_of(&field, config.degree, keys);
        Ok(Self { config, offset, power_sums, count: keys.len() as i64 })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn power_sums(&self) -> &[u32] {
        &self.power_sums
    }

    pub fn count(&self) -> i64 {
        self.count
    }

    /// Maximum number of elements a difference can hold and still decode.
    pub fn threshold(&self) -> usize {
        self.config.degree
    }

    pub fn field(&self) -> Field {
        Field::new(self.config.modulus)
    }

    /// Errors unless both accumulators were finalized for the same session at
    /// the same offset.
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

    pub fn sub_assign(&mut self, rhs: &Self) -> Result<()> {
        self.ensure_compatible(rhs)?;
        let field = self.field();
        for (sum, other) in self.power_sums.iter_mut().zip(&rhs.power_sums) {
            *sum = field.sub(*sum, *other);
        }
        self.count -= rhs.count;
        Ok(())
    }

    /// Power sums of the multiset difference `self - rhs`.
    pub fn subtract(&self, rhs: &Self) -> Result<Self> {
        let mut diff = self.clone();
        diff.sub_assign(rhs)?;
        Ok(diff)
    }

    /// Newton's identities over the first `n` power sums, giving the `n`
    /// non-leading coefficients of the monic degree-`n` polynomial.
    fn newton(&self, n: usize) -> CoefficientVector {
        let field = self.field();
        let inverses = inverse_table(&field, self.config.degree);
        let p = &self.power_sums;
        let mut coeffs: CoefficientVector = vec![0; n];
        if n == 0 {
            return coeffs;
        }
        coeffs[0] = field.neg(p[0]);
        for i in 1..n {
            let mut acc = p[i];
            for j in 0..i {
                acc = field.add(acc, field.mul(p[j], coeffs[i - j - 1]));
            }
            coeffs[i] = field.mul(field.neg(acc), inverses[i]);
        }
        coeffs
    }

    /// The `D` coefficients of the degree-`D` polynomial encoded by all of
    /// the power sums. When the multiset has `n < D` elements the trailing
    /// `D - n` coefficients are zero.
    pub fn recover_coefficients(&self) -> CoefficientVector {
        self.newton(self.config.degree)
    }

    /// Coefficients of the polynomial whose roots are exactly the elements
    /// of the multiset, one per element.
    pub fn coefficients(&self) -> Result<CoefficientVector> {
        let n = self.num_elements()?;
        Ok(self.newton(n))
    }

    fn num_elements(&self) -> Result<usize> {
        if self.count < 0 {
            warn!("power sum difference has {} elements", self.count);
            return Err(Error::Infeasible);
        }
        let n = self.count as usize;
        if n > self.config.degree {
            return Err(Error::ThresholdExceeded { count: n, threshold: self.config.degree });
        }
        Ok(n)
    }

    /// Errors with [`Error::SpuriousRecovery`] unless the recovered
    /// fingerprints reproduce every power sum, including those beyond the
    /// `n` that determined the polynomial.
    fn check_recovered(&self, keys: &[Fingerprint]) -> Result<()> {
        let expected = power_sums_of(&self.field(), self.config.degree, keys);
        if expected != self.power_sums {
            let fingerprint = keys.first().copied().unwrap_or_default();
            warn!("recovered fingerprints do not reproduce the power sums");
            return Err(Error::SpuriousRecovery { fingerprint });
        }
        Ok(())
    }

    /// Decodes the difference against the sender's packet log, returning
    /// the indices of the packets whose fingerprints are roots of the
    /// polynomial. A root of multiplicity `m` matches at most `m` packets, the
    /// first ones in log order.
    pub fn decode_with_log<B: AsRef<[u8]>>(&self, log: &[B]) -> Result<Vec<usize>> {
        let t1 = Instant::now();
        let n = self.num_elements()?;
        let coeffs = self.newton(n);
        let field = self.field();
        let fingerprinter = Fingerprinter::from_config(&self.config)?;

        let mut remaining: HashMap<Fingerprint, usize> = HashMap::new();
        let mut indices = vec![];
        let mut keys = vec![];
        for (i, packet) in log.iter().enumerate() {
            if indices.len() == n {
                break;
            }
            let key = fingerprinter.extract(packet.as_ref(), self.offset)?;
            let left = remaining
                .entry(key)
                .or_insert_with(|| arithmetic::root_multiplicity(&field, &coeffs, key));
            if *left > 0 {
                *left -= 1;
                indices.push(i);
                keys.push(key);
            }
        }
        let t2 = Instant::now();
        if indices.len() < n {
            warn!("matched {} of {} roots against the log", indices.len(), n);
            return Err(Error::CardinalityMismatch { expected: n, found: indices.len() });
        }
        self.check_recovered(&keys)?;
        debug!("decoded {} packets from a log of {}: {:?}", n, log.len(), t2 - t1);
        Ok(indices)
    }

    /// Decodes the difference without a log by evaluating the polynomial at
    /// every field element. Returns the fingerprints in ascending order, each
    /// repeated by its multiplicity. Only practical for small moduli.
    pub fn decode_by_trial(&self) -> Result<Vec<Fingerprint>> {
        let n = self.num_elements()?;
        let coeffs = self.newton(n);
        let field = self.field();
        let mut keys = vec![];
        for root in arithmetic::find_roots_by_trial(&field, &coeffs) {
            let m = arithmetic::root_multiplicity(&field, &coeffs, root);
            keys.extend(std::iter::repeat(root).take(m));
        }
        if keys.len() != n {
            // The polynomial does not split into linear factors over the field.
            return Err(Error::CardinalityMismatch { expected: n, found: keys.len() });
        }
        self.check_recovered(&keys)?;
        Ok(keys)
    }
}

impl PowerSumAccumulator {
    pub fn new(config: SessionConfig) -> Result<Self> {
        Ok(PowerSumAccumulator::Buffering(BufferingAccumulator::new(config)?))
    }

    pub fn is_finalized(&self) -> bool {
        matches!(self, PowerSumAccumulator::Finalized(_))
    }

    pub fn insert(&mut self, packet: &[u8]) -> Result<()> {
        match self {
            PowerSumAccumulator::Buffering(acc) => acc.insert(packet),
            PowerSumAccumulator::Finalized(_) => {
                Err(Error::Misuse("insert into a finalized accumulator"))
            }
        }
    }

    pub fn finalize(&mut self, offset: Option<usize>) -> Result<()> {
        let finalized = match self {
            PowerSumAccumulator::Buffering(acc) => acc.compute(offset)?,
            PowerSumAccumulator::Finalized(_) => {
                return Err(Error::Misuse("accumulator is already finalized"));
            }
        };
        *self = PowerSumAccumulator::Finalized(finalized);
        Ok(())
    }

    pub fn as_finalized(&self) -> Result<&FinalizedAccumulator> {
        match self {
            PowerSumAccumulator::Finalized(acc) => Ok(acc),
            PowerSumAccumulator::Buffering(_) => {
                Err(Error::Misuse("accumulator has not been finalized"))
            }
        }
    }

    pub fn power_sums(&self) -> Result<&[u32]> {
        Ok(self.as_finalized()?.power_sums())
    }

    pub fn subtract(&self, rhs: &Self) -> Result<FinalizedAccumulator> {
        self.as_finalized()?.subtract(rhs.as_finalized()?)
    }
}
