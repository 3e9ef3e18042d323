//! Error taxonomy
//!
//! Stage failures are per-provider and never fatal to the run: the
//! orchestrator records them in the provider's outcome and keeps going.
//! Merge conflicts and ambiguous mappings are data, not errors.

use thiserror::Error;

/// Errors raised by cleaner/converter/validator implementations
#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("exchange format error: {0}")]
    Exchange(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Internal(String),
}

/// A provider pipeline failure, tagged with the stage it occurred in
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("cleaning failed: {0}")]
    Cleaning(#[source] CapabilityError),

    #[error("conversion failed: {0}")]
    Conversion(#[source] CapabilityError),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("configured {kind} '{name}' is not registered")]
    MissingCapability { kind: &'static str, name: String },

    #[error("provider timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("provider cancelled")]
    Cancelled,
}

/// Errors loading the provider registry
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registry parse error: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid provider identifier '{0}': must be non-empty, without spaces or dashes")]
    InvalidIdentifier(String),

    #[error("duplicate provider identifier '{0}'")]
    DuplicateIdentifier(String),
}
