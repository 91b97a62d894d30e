#![forbid(unsafe_code)]

use nf_storage::StoreError;
use std::fmt;

#[derive(Debug)]
pub enum EngineError {
    Store(StoreError),
    GenerationFailed { detail: String },
}

impl EngineError {
    /// Stable machine-readable code for callers that match on strings.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Store(err) => err.code(),
            Self::GenerationFailed { .. } => "GENERATION_FAILED",
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Store(err) => write!(f, "{err}"),
            Self::GenerationFailed { detail } => write!(f, "draft generation failed: {detail}"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            Self::GenerationFailed { .. } => None,
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}
