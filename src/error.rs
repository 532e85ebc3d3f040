use thiserror::Error;

/// Errors surfaced from the configuration and trace front ends.
///
/// Core invariant violations are not represented here: per the error
/// handling design, a broken invariant is a corrupted simulation and is
/// reported via [`crate::system::CacheSystem`]'s internal diagnostic dump,
/// which logs state and aborts rather than returning a recoverable `Result`.
#[derive(Debug, Error)]
pub enum Error {
    #[error("config file not found: {0}")]
    ConfigNotFound(std::path::PathBuf),

    #[error("could not parse config line {line}: {text:?}")]
    ConfigParse { line: usize, text: String },

    #[error("{key} must be a power of two, got {value}")]
    NotPowerOfTwo { key: &'static str, value: usize },

    #[error("{key} ({value}) must be >= block_size ({block_size})")]
    SizeSmallerThanBlock {
        key: &'static str,
        value: usize,
        block_size: usize,
    },

    #[error("unknown cache scope {0:?}, expected one of all/L1L2/L3")]
    UnknownCacheScope(String),

    #[error("trace line {line} could not be parsed: {text:?}")]
    TraceParse { line: usize, text: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
