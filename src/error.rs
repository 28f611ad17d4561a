//! Error types for the stream consumer/producer

use thiserror::Error;

use crate::client::ServiceError;

/// Main error type surfaced by [`ShardStream`](crate::ShardStream) operations.
#[derive(Debug, Error)]
pub enum StreamError {
    /// A discovery, iterator, or fetch call against the shard service failed
    /// (after any configured retries).
    #[error("shard service failure: {0}")]
    Service(#[from] ServiceError),

    /// A `put`/`put_batch` request was rejected outright. Partial batch
    /// failures are not errors; they are reported in the
    /// [`PutRecordsOutcome`](crate::PutRecordsOutcome).
    #[error("failed to publish record: {0}")]
    Publish(#[source] ServiceError),

    /// The checkpoint store failed. When raised from the read loop the
    /// affected record was already delivered, so a restart may redeliver it.
    #[error("checkpoint failure: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type for stream operations.
pub type Result<T> = std::result::Result<T, StreamError>;

/// Error type for checkpoint store operations.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("failed to persist checkpoint: {0}")]
    Save(String),

    #[error("failed to load checkpoints: {0}")]
    Load(String),

    /// The backing store could not be reached at all. Kept distinct from
    /// `Save`/`Load` so callers can tell an outage from a rejected write.
    #[error("checkpoint backend unavailable: {0}")]
    Unavailable(String),
}

/// A record payload that is present but does not parse as JSON.
///
/// Per-record and non-fatal: the read loop keeps yielding subsequent records,
/// this error only comes out of [`Record::payload_json`](crate::Record::payload_json)
/// for the offending one.
#[derive(Debug, Error)]
#[error("cannot decode JSON payload: {source}")]
pub struct MalformedPayload {
    #[from]
    source: serde_json::Error,
}
