use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("octant overflow: {0}")]
    Overflow(String),
    #[error("hit target missing: {0}")]
    HitTargetMissing(String),
    #[error("path {path} rejected: {reason}")]
    Validation { path: String, reason: String },
    #[error("storage error: {0}")]
    Storage(String),
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Prefix a storage failure with the mutation step that produced it.
    /// Every other variant passes through untouched.
    pub fn in_step(self, step: &str) -> Self {
        match self {
            Error::Storage(message) => Error::Storage(format!("{step}: {message}")),
            other => other,
        }
    }
}
