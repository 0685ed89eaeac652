//! Driver error types.

use thiserror::Error;

use crate::chain::ChainId;

/// Invalid driver configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Message budget range has `min > max`.
    #[error("invalid message range: min {min} > max {max}")]
    InvalidMessageRange {
        /// Lower bound.
        min: u64,
        /// Upper bound.
        max: u64,
    },

    /// Delay range has `min > max`.
    #[error("invalid delay range: min {min}ms > max {max}ms")]
    InvalidDelayRange {
        /// Lower bound in milliseconds.
        min: u64,
        /// Upper bound in milliseconds.
        max: u64,
    },

    /// A fetch limit of zero would never issue a fetch.
    #[error("max outstanding fetches must be at least 1")]
    ZeroFetchLimit,
}

/// Errors from driver operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    /// Configuration was rejected at construction.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// Prefixes are frozen and the session already exists.
    #[error("sync session already initialized")]
    AlreadyInitialized,

    /// A publish step fired before the session was opened.
    #[error("sync session is not open")]
    SessionNotOpen,

    /// A publish timer referenced a chain that does not exist.
    #[error("unknown publish chain: {0}")]
    UnknownChain(ChainId),
}

impl DriverError {
    /// Returns true if this error is fatal (unrecoverable).
    ///
    /// Fatal errors indicate misuse by the runtime. A late or duplicated timer
    /// is transient and can be ignored.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Config(_) | Self::AlreadyInitialized | Self::SessionNotOpen => true,
            Self::UnknownChain(_) => false,
        }
    }
}
