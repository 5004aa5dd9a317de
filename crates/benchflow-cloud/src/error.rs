//! Cloud error taxonomy
//!
//! Cloud control planes fail in categorically different ways and the
//! orchestration core reacts differently to each: transient failures are
//! retried in place, capacity and quota failures are surfaced so a caller
//! can retry the whole run elsewhere, transitional statuses only drive
//! polling, and unknown statuses are fatal immediately.

use thiserror::Error;

/// Errors raised by resource operations and the policies around them.
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Creation failed but repeating the call with the same idempotency
    /// token may succeed (rate limit, eventual consistency).
    #[error("Retryable creation failure: {0}")]
    RetryableCreation(String),

    /// Creation failed because a dependency had to change first (e.g. a
    /// full dedicated host was replaced); the retry must carry a fresh
    /// idempotency token or the control plane will dedup it away.
    #[error("Creation failed, retry requires a new idempotency token: {0}")]
    RetryableCreationWithNewToken(String),

    #[error("Retryable deletion failure: {0}")]
    RetryableDeletion(String),

    /// The zone/region cannot satisfy the request right now. Retrying in
    /// place is futile; the whole run should move elsewhere.
    #[error("Insufficient capacity: {0}")]
    InsufficientCapacity(String),

    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    /// The resource is still changing state. Not a failure; drives the
    /// poll loop only.
    #[error("Resource is still transitioning: {0}")]
    Transitional(String),

    /// The provider reported a status the implementation does not know.
    /// Never treated as success or absence.
    #[error("Unknown resource status: {0}")]
    UnknownStatus(String),

    #[error("Resource creation failed: {0}")]
    CreationFailed(String),

    #[error("Resource deletion failed: {0}")]
    DeletionFailed(String),

    /// A bounded retry policy ran out of attempts; wraps the last error.
    #[error("Retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<CloudError> },

    #[error("No provider registered for {kind} on cloud {cloud}")]
    ProviderNotFound { cloud: String, kind: String },

    /// Aggregate failure from a parallel batch; names every failed task.
    #[error("{0}")]
    Parallel(ParallelFailures),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CloudError {
    /// Whether a retry policy may re-invoke the failed operation as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CloudError::RetryableCreation(_) | CloudError::RetryableDeletion(_)
        )
    }

    /// Whether the error only means "still changing, poll again".
    pub fn is_transitional(&self) -> bool {
        matches!(self, CloudError::Transitional(_))
    }
}

/// One failed task out of a parallel batch.
#[derive(Debug)]
pub struct TaskFailure {
    /// Label of the failed task, usually the resource it operated on.
    pub label: String,
    pub error: CloudError,
}

/// Every failure collected from one parallel batch.
#[derive(Debug)]
pub struct ParallelFailures(pub Vec<TaskFailure>);

impl ParallelFailures {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for ParallelFailures {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} parallel task(s) failed: ", self.0.len())?;
        for (i, failure) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}: {}", failure.label, failure.error)?;
        }
        Ok(())
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;
