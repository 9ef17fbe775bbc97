//! Error types for resource accessors.

use thiserror::Error;

/// Errors raised while interpreting resource contents.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// A build produced more than the single runnable artifact expected.
    #[error("build has more than a single expected artifact ({0})")]
    MultipleArtifacts(usize),

    /// A label carries a value that cannot be interpreted.
    #[error("invalid value '{value}' for label {label}")]
    InvalidLabel { label: &'static str, value: String },
}
