//! Fingerprints are `W`-bit windows of raw packet bytes, reduced into the
//! prime field the sketches compute in.
//!
//! Both observers must read the window at the same bit offset. The offset is
//! chosen once per session, before any sketch is finalized, as the one that
//! produces the fewest duplicate fingerprints across the observed packets.
use std::collections::HashSet;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::config::SessionConfig;
use crate::{Error, Result};

pub type Fingerprint = u32;

/// Reads fingerprints of a fixed width from packet buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprinter {
    bits: u32,
    modulus: u32,
}

impl Fingerprinter {
    /// Creates an extractor for `bits`-wide fingerprints whose values are later
    /// used as elements of GF(`modulus`).
    pub fn new(bits: u32, modulus: u32) -> Result<Self> {
        if bits == 0 || bits > 32 {
            return Err(Error::InvalidConfig(format!(
                "fingerprint width must be 1..=32 bits, got {}",
                bits
            )));
        }
        if modulus < 2 {
            return Err(Error::InvalidConfig(format!("modulus {} is too small", modulus)));
        }
        Ok(Self { bits, modulus })
    }

    pub fn from_config(config: &SessionConfig) -> Result<Self> {
        Self::new(config.fingerprint_bits, config.modulus)
    }

    pub fn bits(&self) -> u32 {
        self.bits
    }

    /// The modulus, when the window can hold it. It would alias zero in the
    /// field, so it is never emitted.
    pub fn reserved(&self) -> Option<u32> {
        if (self.modulus as u64) < (1u64 << self.bits) {
            Some(self.modulus)
        } else {
            None
        }
    }

    /// Largest valid offset for a buffer of `packet_bytes` bytes.
    pub fn max_offset(&self, packet_bytes: usize) -> Option<usize> {
        (8 * packet_bytes).checked_sub(self.bits as usize)
    }

    /// Reads `W` bits starting at bit `offset`. Bits are numbered from the
    /// least significant bit of byte 0 upwards, so bit `8 * i + j` is bit `j`
    /// of byte `i`.
    ///
    /// The result is always below the modulus. A window at or above it is
    /// reduced, except that nonzero multiples of the modulus become
    /// `modulus - 1`. Windows that reduce to the same value are the same
    /// fingerprint, and count as collisions when choosing an offset.
    pub fn extract(&self, buffer: &[u8], offset: usize) -> Result<Fingerprint> {
        let needed = (offset + self.bits as usize + 7) / 8;
        if buffer.len() < needed {
            return Err(Error::PacketTooShort { len: buffer.len(), needed });
        }
        let mut value: u64 = 0;
        let mut filled = 0;
        let mut idx = offset / 8;
        let mut skip = offset % 8;
        while filled < self.bits as usize {
            value |= ((buffer[idx] >> skip) as u64) << filled;
            filled += 8 - skip;
            skip = 0;
            idx += 1;
        }
        let mask = (1u64 << self.bits) - 1;
        let window = (value & mask) as u32;
        if window < self.modulus {
            return Ok(window);
        }
        match window % self.modulus {
            0 => Ok(self.modulus - 1),
            residue => Ok(residue),
        }
    }

    /// Extracts the fingerprints of every buffer at the same offset.
    pub fn extract_all<B: AsRef<[u8]>>(
        &self,
        buffers: &[B],
        offset: usize,
    ) -> Result<Vec<Fingerprint>> {
        buffers.iter().map(|b| self.extract(b.as_ref(), offset)).collect()
    }

    /// Number of buffers whose fingerprint at `offset` duplicates an earlier
    /// buffer's fingerprint.
    pub fn count_collisions<B: AsRef<[u8]>>(
        &self,
        buffers: &[B],
        offset: usize,
    ) -> Result<usize> {
        let mut seen = HashSet::with_capacity(buffers.len());
        let mut collisions = 0;
        for buffer in buffers {
            if !seen.insert(self.extract(buffer.as_ref(), offset)?) {
                collisions += 1;
            }
        }
        Ok(collisions)
    }

    /// Scans every offset at which a window fits inside the shortest buffer
    /// and returns the one with the fewest collisions. The scan stops at the
    /// first collision-free offset; ties go to the lowest offset.
    pub fn choose_offset<B: AsRef<[u8]>>(&self, buffers: &[B]) -> Result<usize> {
        let t1 = Instant::now();
        let shortest = buffers.iter().map(|b| b.as_ref().len()).min().unwrap_or(0);
        let max_offset = match self.max_offset(shortest) {
            Some(max_offset) => max_offset,
            None if buffers.is_empty() => return Ok(0),
            None => {
                return Err(Error::PacketTooShort {
                    len: shortest,
                    needed: (self.bits as usize + 7) / 8,
                })
            }
        };
        let mut best_offset = 0;
        let mut best_collisions = usize::MAX;
        for offset in 0..=max_offset {
            let collisions = self.count_collisions(buffers, offset)?;
            if collisions < best_collisions {
                best_offset = offset;
                best_collisions = collisions;
            }
            if collisions == 0 {
                break;
            }
        }
        debug!(
            "offset {} leads to {} collisions among {} packets: {:?}",
            best_offset,
            best_collisions,
            buffers.len(),
            Instant::now() - t1,
        );
        Ok(best_offset)
    }
}
