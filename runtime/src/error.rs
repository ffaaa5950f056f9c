//! Error taxonomy for the acquisition engine.
//!
//! The transport layer produces exactly one of three [`FetchError`] tags and
//! every caller switches on them explicitly. Only `NonRetriable` may end a
//! cycle early; the other two always resolve to a degraded placeholder.

use crate::acquisition::task::OutcomeTally;
use crate::config::ConfigError;
use crate::lock::LockError;
use thiserror::Error;

/// Why a single upstream attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Timeout, connection failure, 5xx, rate limiting, or a response that
    /// could not be decoded.
    #[error("transient: {0}")]
    Transient(String),

    /// Authorization failure or rejected credentials.
    #[error("non-retriable: {0}")]
    NonRetriable(String),

    /// The upstream answered with an error payload that is not about
    /// credentials. Asking again gets the same answer.
    #[error("malformed: {0}")]
    Malformed(String),
}

impl FetchError {
    /// Only transient failures are worth another attempt.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    pub fn reason(&self) -> &str {
        match self {
            Self::Transient(r) | Self::NonRetriable(r) | Self::Malformed(r) => r,
        }
    }

    /// Short tag used in attempt logs.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Transient(_) => "transient",
            Self::NonRetriable(_) => "non_retriable",
            Self::Malformed(_) => "malformed",
        }
    }
}

/// Orchestrator-level failure. Individual entity failures never produce this;
/// only a non-retriable outcome does.
#[derive(Debug, Error)]
pub enum EnrichError {
    #[error("{task} failed: {reason}")]
    NonRetriable {
        task: String,
        reason: String,
        /// Outcomes recorded before the batch was abandoned.
        tally: OutcomeTally,
    },
}

/// Anything that stops the process before (or instead of) running cycles.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("{0:#}")]
    Other(#[from] anyhow::Error),
}

/// Process exit codes. Stable so wrappers (systemd, cron) can branch on them.
pub mod exit_codes {
    pub const OK: i32 = 0;
    pub const FAILURE: i32 = 1;
    pub const BAD_CONFIG: i32 = 2;
    pub const ALREADY_RUNNING: i32 = 3;
}

impl StartupError {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => exit_codes::BAD_CONFIG,
            Self::Lock(LockError::AlreadyRunning { .. }) => exit_codes::ALREADY_RUNNING,
            Self::Lock(_) | Self::Other(_) => exit_codes::FAILURE,
        }
    }
}
