use thiserror::Error;

/// Errors raised while building, combining, or decoding sketches.
#[derive(Debug, Error)]
pub enum Error {
    /// Two sketches that must share a configuration do not.
    #[error("structural mismatch: {what}")]
    StructuralMismatch { what: String },

    /// A decode recovered a different number of packets than expected.
    #[error("expected {expected} dropped packets, recovered {found}")]
    CardinalityMismatch { expected: usize, found: usize },

    /// No 0/1 assignment over the candidates reproduces the difference.
    #[error("reconciliation model is infeasible")]
    Infeasible,

    /// A recovered fingerprint does not belong to any candidate packet.
    #[error("recovered fingerprint {fingerprint} matches no sent packet")]
    SpuriousRecovery { fingerprint: u32 },

    /// An operation was called in a state that does not support it.
    #[error("misuse: {0}")]
    Misuse(&'static str),

    /// A bucket is internally inconsistent, e.g. zero count but nonzero sum.
    #[error("bucket {bucket} is inconsistent")]
    InconsistentBucket { bucket: usize },

    /// The power sum difference represents more elements than it can decode.
    #[error("{count} elements exceed the power sum threshold {threshold}")]
    ThresholdExceeded { count: usize, threshold: usize },

    #[error("packet of {len} bytes is shorter than the required {needed}")]
    PacketTooShort { len: usize, needed: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The external solver failed for a reason other than infeasibility.
    #[error("solver error: {0}")]
    Solver(String),

    #[error("snapshot codec: {0}")]
    Codec(#[from] bincode::Error),
}

impl Error {
    pub(crate) fn mismatch(what: impl Into<String>) -> Self {
        Error::StructuralMismatch { what: what.into() }
    }

    /// The decode found fewer packets than expected.
    pub fn is_too_few(&self) -> bool {
        matches!(self, Error::CardinalityMismatch { expected, found } if found < expected)
    }

    /// The decode found more packets than expected.
    pub fn is_too_many(&self) -> bool {
        matches!(self, Error::CardinalityMismatch { expected, found } if found > expected)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
