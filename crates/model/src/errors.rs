//! Error and retry-policy types for the ForkGuard domain.
//!
//! [`HostError`] is the error every port trait returns: it classifies a
//! hosting-platform failure without exposing transport details. [`ForkGuardError`]
//! covers conditions that halt a routine run.
//!
//! Divergence is deliberately absent from both enums: it is a
//! [`crate::SyncOutcome`], not a failure.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::BranchRef;

// ---------------------------------------------------------------------------
// Retry semantics
// ---------------------------------------------------------------------------

/// Whether an error condition is safe to retry and, if so, after what delay.
///
/// Every run reads fresh state before mutating anything, so a failed run is
/// retried by simply running again on the next schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RetryPolicy {
    /// The operation may be retried.
    Retryable {
        /// Minimum back-off before the next attempt, when the platform supplied one.
        after: Option<Duration>,
    },
    /// Retrying without human intervention will fail the same way.
    NonRetryable,
}

// ---------------------------------------------------------------------------
// Port errors
// ---------------------------------------------------------------------------

/// Failure reported by a hosting-platform port.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum HostError {
    /// The platform could not be reached or the connection failed mid-request.
    #[error("hosting platform unreachable: {message}")]
    Transport { message: String },

    /// The credential was rejected or lacks the required permission.
    #[error("not authorized: {message}")]
    Unauthorized { message: String },

    /// The addressed repository, ref, or object does not exist.
    #[error("not found: {resource}")]
    NotFound { resource: String },

    /// The write was rejected because the target changed underneath us
    /// (non-fast-forward ref update, stale object).
    #[error("conflicting update: {message}")]
    Conflict { message: String },

    /// The platform throttled the request.
    #[error("rate limited by hosting platform")]
    RateLimited { retry_after: Option<Duration> },

    /// The platform returned a response the adapter does not understand.
    #[error("malformed response: {message}")]
    Malformed { message: String },

    /// Any other non-success response.
    #[error("unexpected response (status {status}): {message}")]
    Unexpected { status: u16, message: String },
}

impl HostError {
    /// Returns whether re-running the operation can succeed.
    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            Self::Transport { .. } | Self::Conflict { .. } => RetryPolicy::Retryable { after: None },
            Self::RateLimited { retry_after } => RetryPolicy::Retryable { after: *retry_after },
            Self::Unexpected { status, .. } if *status >= 500 => RetryPolicy::Retryable { after: None },
            Self::Unauthorized { .. }
            | Self::NotFound { .. }
            | Self::Malformed { .. }
            | Self::Unexpected { .. } => RetryPolicy::NonRetryable,
        }
    }
}

// ---------------------------------------------------------------------------
// Run-level errors
// ---------------------------------------------------------------------------

/// Errors that halt a routine run.
///
/// A run either completes its classification fully or fails with one of these
/// before mutating any ref.
#[derive(Debug, Error)]
pub enum ForkGuardError {
    /// A hosting-platform call failed.
    #[error(transparent)]
    Host(#[from] HostError),

    /// A ref moved between our read and our write.
    ///
    /// Safe to retry: the next run re-reads fresh state and recomputes the outcome.
    #[error("{branch} changed while the run was in progress; re-run to recompute")]
    ConcurrentModification { branch: BranchRef },

    /// A required credential is absent.
    #[error("missing credential: set the '{secret}' secret")]
    MissingCredential { secret: String },

    /// The configuration is invalid; produced at load time.
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// The persisted tag baseline could not be read or written.
    #[error("tag baseline error: {message}")]
    Baseline { message: String },
}

impl ForkGuardError {
    /// Returns whether re-running the whole routine can succeed.
    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            Self::Host(e) => e.retry_policy(),
            Self::ConcurrentModification { .. } => RetryPolicy::Retryable { after: None },
            Self::MissingCredential { .. } | Self::Configuration { .. } | Self::Baseline { .. } => {
                RetryPolicy::NonRetryable
            }
        }
    }
}
