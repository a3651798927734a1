use thiserror::Error;

/// Errors surfaced by the core, per the error-handling table: dispatch
/// errors propagate to callers, listener errors never do (they are
/// logged and turned into ack/nack decisions instead).
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("broker channel unavailable")]
    ChannelUnavailable,

    #[error("submission {0} is not in the expected status for this operation")]
    IllegalState(u64),

    #[error("submission id {0} exceeds the 63-bit decimal message_id budget")]
    SubmissionIdOverflow(u64),

    #[error("no language config for language id {0}")]
    UnknownLanguage(u64),

    #[error("task {0} has no test cases")]
    TaskNotReady(u64),

    #[error("malformed message: {0}")]
    MalformedMessage(String),

    #[error("submission {0} already evaluated")]
    AlreadyEvaluated(u64),

    #[error("transient store error: {0}")]
    TransientStoreError(String),

    #[error("handler panicked: {0}")]
    Panic(String),

    #[error("submission {0} not found")]
    SubmissionNotFound(u64),

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Broker(#[from] lapin::Error),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl CoreError {
    /// Reclassifies a freshly-surfaced `Database` error: connection-level
    /// sqlx failures — the kind a bounded requeue can plausibly outlast —
    /// become `TransientStoreError`. Everything else that `Database`
    /// wraps (constraint violations, decode failures, a missing row) is
    /// a permanent defect, not a hiccup, and is left as `Database` so the
    /// listener does not waste requeue attempts retrying it.
    pub fn classify_transient(self) -> Self {
        match self {
            CoreError::Database(e) if is_transient_sqlx_error(&e) => {
                CoreError::TransientStoreError(e.to_string())
            }
            other => other,
        }
    }
}

fn is_transient_sqlx_error(e: &sqlx::Error) -> bool {
    matches!(
        e,
        sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
    )
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_timeout_is_classified_transient() {
        let classified = CoreError::Database(sqlx::Error::PoolTimedOut).classify_transient();
        assert!(matches!(classified, CoreError::TransientStoreError(_)));
    }

    #[test]
    fn row_not_found_stays_permanent() {
        let classified = CoreError::Database(sqlx::Error::RowNotFound).classify_transient();
        assert!(matches!(classified, CoreError::Database(_)));
    }

    #[test]
    fn non_database_errors_pass_through_unchanged() {
        let classified = CoreError::IllegalState(42).classify_transient();
        assert!(matches!(classified, CoreError::IllegalState(42)));
    }
}
