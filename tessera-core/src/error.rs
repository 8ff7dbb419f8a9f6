//! Error types for TESSERA operations
//!
//! Persistence failures are [`StoreError`]s, cache failures are
//! [`CacheError`]s. The repository surfaces only [`RepoError`]: a kind, a
//! human message and, for store failures, the underlying cause. Cache errors
//! never reach callers.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::identity::EntityId;

// ============================================================================
// ERROR KIND
// ============================================================================

/// Category of a repository failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Nil id, empty bulk filter, and similar caller mistakes
    InvalidInput,
    NotFound,
    /// Unique constraint violated on insert
    Duplicate,
    /// Optimistic-lock version mismatch
    Conflict,
    CreateFailed,
    CreateBatchFailed,
    UpdateFailed,
    DeleteFailed,
    SoftDeleteFailed,
    RestoreFailed,
    FindFailed,
    CountFailed,
    ExistsCheckFailed,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "INVALID_INPUT",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Duplicate => "DUPLICATE",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::CreateFailed => "CREATE_FAILED",
            ErrorKind::CreateBatchFailed => "CREATE_BATCH_FAILED",
            ErrorKind::UpdateFailed => "UPDATE_FAILED",
            ErrorKind::DeleteFailed => "DELETE_FAILED",
            ErrorKind::SoftDeleteFailed => "SOFT_DELETE_FAILED",
            ErrorKind::RestoreFailed => "RESTORE_FAILED",
            ErrorKind::FindFailed => "FIND_FAILED",
            ErrorKind::CountFailed => "COUNT_FAILED",
            ErrorKind::ExistsCheckFailed => "EXISTS_CHECK_FAILED",
        }
    }

    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "Invalid input",
            ErrorKind::NotFound => "Entity not found",
            ErrorKind::Duplicate => "Entity already exists",
            ErrorKind::Conflict => "Entity was modified concurrently",
            ErrorKind::CreateFailed => "Failed to create entity",
            ErrorKind::CreateBatchFailed => "Failed to create entity batch",
            ErrorKind::UpdateFailed => "Failed to update entity",
            ErrorKind::DeleteFailed => "Failed to delete entity",
            ErrorKind::SoftDeleteFailed => "Failed to soft delete entity",
            ErrorKind::RestoreFailed => "Failed to restore entity",
            ErrorKind::FindFailed => "Failed to query entities",
            ErrorKind::CountFailed => "Failed to count entities",
            ErrorKind::ExistsCheckFailed => "Failed to check entity existence",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// STORE / CACHE ERRORS
// ============================================================================

/// Persistence layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Unique violation in {collection}: {reason}")]
    UniqueViolation { collection: String, reason: String },

    #[error("Store backend error: {reason}")]
    Backend { reason: String },

    #[error("Serialization failed: {reason}")]
    Serialization { reason: String },

    #[error("Transaction failed: {reason}")]
    Transaction { reason: String },

    #[error("Store operation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Store lock poisoned")]
    LockPoisoned,
}

impl StoreError {
    pub fn backend(reason: impl fmt::Display) -> Self {
        StoreError::Backend {
            reason: reason.to_string(),
        }
    }

    pub fn serialization(reason: impl fmt::Display) -> Self {
        StoreError::Serialization {
            reason: reason.to_string(),
        }
    }
}

/// Result type for persistence calls.
pub type StoreResult<T> = Result<T, StoreError>;

/// Cache layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache backend error: {reason}")]
    Backend { reason: String },

    #[error("Cache serialization failed: {reason}")]
    Serialization { reason: String },

    #[error("Cache operation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Cache I/O error: {reason}")]
    Io { reason: String },

    #[error("Invalid cache pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// Result type for cache calls.
pub type CacheResult<T> = Result<T, CacheError>;

// ============================================================================
// REPOSITORY ERROR
// ============================================================================

/// Error returned by every repository operation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct RepoError {
    pub kind: ErrorKind,
    pub message: String,
    #[source]
    pub cause: Option<StoreError>,
}

impl RepoError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            cause: None,
        }
    }

    /// Error of `kind` carrying the kind's default message.
    pub fn from_kind(kind: ErrorKind) -> Self {
        Self::new(kind, kind.default_message())
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, message)
    }

    pub fn nil_id(collection: &str) -> Self {
        Self::invalid_input(format!("{collection}: id must not be nil"))
    }

    pub fn not_found(collection: &str, id: EntityId) -> Self {
        Self::new(ErrorKind::NotFound, format!("{collection} {id} not found"))
    }

    pub fn conflict(collection: &str, id: EntityId, expected: i64, actual: i64) -> Self {
        Self::new(
            ErrorKind::Conflict,
            format!("{collection} {id}: version {expected} is stale (stored version {actual})"),
        )
    }

    /// Wrap a store failure. A unique violation on a single create is `DUPLICATE`.
    pub fn store_failure(kind: ErrorKind, cause: StoreError) -> Self {
        let kind = match cause {
            StoreError::UniqueViolation { .. } if kind == ErrorKind::CreateFailed => {
                ErrorKind::Duplicate
            }
            _ => kind,
        };
        Self {
            kind,
            message: format!("{}: {}", kind.default_message(), cause),
            cause: Some(cause),
        }
    }

    pub fn is_conflict(&self) -> bool {
        self.kind == ErrorKind::Conflict
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.cause, Some(StoreError::Timeout { .. }))
    }
}

/// Result type for repository operations.
pub type RepoResult<T> = Result<T, RepoError>;
