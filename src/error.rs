use thiserror::Error;

/// Errors raised by the ensemble aggregator.
#[derive(Debug, Error)]
pub enum EnsembleError {
    /// Aggregation was invoked with zero samples.
    #[error("no samples were supplied to the ensemble")]
    EmptySourceList,

    /// A sample's grid shape disagrees with the reference established by the
    /// first sample. Fatal: statistics across heterogeneous grids are
    /// meaningless, so no partial ensemble is retained.
    #[error("sample {index} has grid shape {found:?}, expected {expected:?}")]
    DimensionMismatch {
        index: usize,
        expected: (usize, usize),
        found: (usize, usize),
    },

    /// A field accessor was invoked with a key not present in the field table
    /// in either orientation.
    #[error("unrecognized field key {0:?}")]
    InvalidFieldKey(String),

    /// A field write was invoked before any aggregation produced fields.
    #[error("ensemble has no computed fields")]
    NoComputedFields,
}
