//! Error taxonomy and operation deadlines.
//!
//! Every fallible core operation returns [`MemoryError`]. Callers can branch
//! on [`MemoryError::kind`] without matching variants, and [`MemoryError::hint`]
//! carries a remediation message suitable for surfacing to an agent.

use std::time::{Duration, Instant};

pub type Result<T> = std::result::Result<T, MemoryError>;

/// The error taxonomy of the engine.
///
/// `NotFoundForUser` is deliberately absent: an id owned by a different user
/// is reported as plain `NotFound` so existence is never disclosed across
/// tenants. Use [`MemoryError::not_found_for_user`] at ownership checks.
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    /// Malformed caller input: empty content, NaN vectors, dim mismatch,
    /// unparsable patterns. Non-retryable.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The referenced id does not exist (or is not visible to the caller).
    #[error("not found: {0}")]
    NotFound(String),

    /// A fact update attempted to change immutable columns (subject,
    /// predicate, object). A new fact is required instead.
    #[error("conflicting fact update: {0}")]
    ConflictingFact(String),

    /// The storage or embedding backend failed at the transport level.
    /// Retryable with bounded backoff.
    #[error("backend unavailable: {message}")]
    BackendUnavailable {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The operation's deadline passed. Partial writes are not rolled back;
    /// inserts are at-least-once under id uniqueness.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// An internal invariant was violated (e.g. a waypoint centroid went
    /// NaN). Callers must not swallow this.
    #[error("internal error: {0}")]
    Internal(String),
}

impl MemoryError {
    /// Stable machine-readable kind string.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::NotFound(_) => "not_found",
            Self::ConflictingFact(_) => "conflicting_fact",
            Self::BackendUnavailable { .. } => "backend_unavailable",
            Self::DeadlineExceeded => "deadline_exceeded",
            Self::Internal(_) => "internal",
        }
    }

    /// Whether a caller may retry the operation verbatim.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::BackendUnavailable { .. })
    }

    /// Remediation hint for agent-facing surfaces.
    pub fn hint(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "fix the request parameters and retry",
            Self::NotFound(_) => "verify the id and the user scope",
            Self::ConflictingFact(_) => {
                "subject/predicate/object are immutable; insert a new fact instead"
            }
            Self::BackendUnavailable { .. } => "retry with backoff; check storage health",
            Self::DeadlineExceeded => "raise the deadline or narrow the query",
            Self::Internal(_) => "report this; the store may need an integrity check",
        }
    }

    /// Ownership-mismatch constructor: the row exists but belongs to a
    /// different user. Always reads as `NotFound`.
    pub fn not_found_for_user(id: &str) -> Self {
        Self::NotFound(id.to_string())
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            message: message.into(),
            source: None,
        }
    }
}

impl From<rusqlite::Error> for MemoryError {
    fn from(e: rusqlite::Error) -> Self {
        match e {
            rusqlite::Error::QueryReturnedNoRows => Self::NotFound("no rows".into()),
            other => Self::BackendUnavailable {
                message: "sqlite operation failed".into(),
                source: Some(Box::new(other)),
            },
        }
    }
}

impl From<serde_json::Error> for MemoryError {
    fn from(e: serde_json::Error) -> Self {
        Self::Internal(format!("serialization failed: {e}"))
    }
}

/// An absolute operation deadline, checked at suspension points.
///
/// Crossing the deadline aborts further storage calls; side effects already
/// persisted stay persisted.
#[derive(Debug, Clone, Copy)]
pub struct Deadline(Instant);

impl Deadline {
    pub fn after(d: Duration) -> Self {
        Self(Instant::now() + d)
    }

    pub fn at(instant: Instant) -> Self {
        Self(instant)
    }

    pub fn expired(&self) -> bool {
        Instant::now() >= self.0
    }

    /// Error if the deadline has passed. Call between pipeline stages.
    pub fn check(&self) -> Result<()> {
        if self.expired() {
            Err(MemoryError::DeadlineExceeded)
        } else {
            Ok(())
        }
    }
}

/// Check an optional deadline.
pub fn check_deadline(deadline: Option<Deadline>) -> Result<()> {
    match deadline {
        Some(d) => d.check(),
        None => Ok(()),
    }
}
