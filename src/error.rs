//! Error types for sync runs
//!
//! Errors are classified by recoverability:
//! - Retryable: network issues, timeouts, server errors
//! - NonRetryable: malformed payloads, store failures
//! - RequiresUserAction: bad configuration, missing bundled assets

use thiserror::Error;

use crate::db::DbError;
use crate::sync::apply::ApplyError;
use crate::sync::fetch::FetchError;
use crate::sync::reconcile::ReconcileError;

/// Error aborting a sync phase.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Fetching {group} failed: {source}")]
    Fetch {
        group: &'static str,
        #[source]
        source: FetchError,
    },

    #[error("Reconciling {group} failed: {source}")]
    Reconcile {
        group: &'static str,
        #[source]
        source: ReconcileError,
    },

    #[error("Applying {group} failed: {source}")]
    Apply {
        group: &'static str,
        #[source]
        source: ApplyError,
    },

    #[error("Database error: {0}")]
    Store(#[from] DbError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Sync cancelled")]
    Cancelled,

    #[error("Sync worker is not running")]
    WorkerStopped,
}

impl SyncError {
    /// Returns true if a later run may succeed without any change
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Fetch { source, .. } => source.is_transient(),
            SyncError::Cancelled => true,
            _ => false,
        }
    }

    /// Returns true if this error requires user action to resolve
    pub fn requires_user_action(&self) -> bool {
        matches!(
            self,
            SyncError::Configuration(_)
                | SyncError::Fetch {
                    source: FetchError::AssetMissing(_) | FetchError::Asset { .. },
                    ..
                }
        )
    }

    /// Get a user-friendly recovery suggestion
    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            SyncError::Fetch {
                source: FetchError::AssetMissing(_) | FetchError::Asset { .. },
                ..
            } => "Check that assetsDir in ~/.confsched/config.json points at the bundled snapshots.",
            SyncError::Fetch { .. } if self.is_retryable() => {
                "Check your internet connection and try again."
            }
            SyncError::Fetch { .. } => "The schedule server returned unexpected data. Try again later.",
            SyncError::Reconcile { .. } => {
                "The schedule data could not be read. Try again after the next update."
            }
            SyncError::Apply { .. } | SyncError::Store(_) => {
                "Check disk space and permissions for ~/.confsched/."
            }
            SyncError::Configuration(_) => "Check your configuration in ~/.confsched/config.json",
            SyncError::Cancelled => "Start the sync again.",
            SyncError::WorkerStopped => "Restart the application.",
        }
    }
}

/// Serializable error representation reported to status listeners
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncFailure {
    pub message: String,
    pub error_type: ErrorType,
    pub can_retry: bool,
    pub recovery_suggestion: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorType {
    Retryable,
    NonRetryable,
    RequiresUserAction,
}

impl From<&SyncError> for SyncFailure {
    fn from(err: &SyncError) -> Self {
        let error_type = if err.requires_user_action() {
            ErrorType::RequiresUserAction
        } else if err.is_retryable() {
            ErrorType::Retryable
        } else {
            ErrorType::NonRetryable
        };

        SyncFailure {
            message: err.to_string(),
            error_type,
            can_retry: err.is_retryable(),
            recovery_suggestion: err.recovery_suggestion().to_string(),
        }
    }
}
