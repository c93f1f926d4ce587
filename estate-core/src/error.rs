//! Error types shared by the store, the repository and the session layer.

use thiserror::Error;

use crate::task::Field;

/// Failure of a single store primitive (read, cell write, append).
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("store transport failed: {0}")]
    Transport(String),

    #[error("store rejected the request: {0}")]
    Rejected(String),

    #[error("cell ({row}, {col}) is outside the table")]
    OutOfRange { row: usize, col: usize },

    #[error("store data is malformed: {0}")]
    Malformed(String),
}

/// The table could not be opened at all.
#[derive(Debug, Clone, Error)]
pub enum ConnectionError {
    #[error("store location is not configured")]
    MissingLocation,

    #[error("store credentials are missing or invalid: {0}")]
    Credentials(String),

    #[error("could not reach {location}: {source}")]
    Unreachable {
        location: String,
        #[source]
        source: StoreError,
    },

    #[error("table at {0} has no header row")]
    NoHeader(String),
}

/// A stored row whose contents break the task model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("row {row}, column '{field}': {reason}")]
pub struct RowFault {
    /// 1-based physical row (header is row 1).
    pub row: usize,
    pub field: Field,
    pub reason: String,
}

#[derive(Debug, Clone, Error)]
pub enum RepoError {
    /// Reading the table failed; callers show the last good snapshot.
    #[error("failed to fetch tasks: {0}")]
    Fetch(#[source] StoreError),

    #[error("task {0} not found")]
    NotFound(String),

    /// A write failed part way. Some earlier field writes may have landed.
    #[error("update of task {id} failed part way; the row holds an unknown prefix of the change: {source}")]
    PartialFailure {
        id: String,
        #[source]
        source: StoreError,
    },

    #[error("failed to append task: {0}")]
    Append(#[source] StoreError),

    #[error("stored task is corrupt: {0}")]
    Corrupt(#[from] RowFault),

    #[error("invalid task: {0}")]
    Invalid(String),
}

impl RepoError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RepoError::NotFound(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("'{0}' is not a valid email address")]
    InvalidEmail(String),

    #[error("{email} is signed in as a viewer; this action needs an admin")]
    Forbidden { email: String },
}
