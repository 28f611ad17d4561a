//! The shard service boundary: discovery, iterators, fetch, and publishing.
//!
//! This is the only network-facing seam in the crate. The read loop talks to
//! a [`ShardService`] and never to the wire directly; the AWS Kinesis client
//! implements the trait below, and tests swap in
//! [`MockShardService`](crate::testing::MockShardService).

use async_trait::async_trait;
use aws_sdk_kinesis::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_kinesis::types::{PutRecordsRequestEntry, ShardIteratorType};
use aws_sdk_kinesis::Client;
use aws_smithy_types::Blob;
use aws_smithy_types_convert::date_time::DateTimeExt;
use bytes::Bytes;
use thiserror::Error;

use crate::record::{PutOutcomeEntry, PutRecordEntry, PutRecordsOutcome, Record};

/// Where to start reading a shard that has no checkpoint yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IteratorPolicy {
    /// From the oldest record the backend still retains (TRIM_HORIZON).
    #[default]
    Oldest,
    /// From records arriving after the iterator is issued (LATEST).
    Latest,
}

/// Errors raised by [`ShardService`] calls.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The shard iterator aged out before it was used. Recoverable by
    /// re-deriving an iterator from the shard's checkpoint.
    #[error("shard iterator expired")]
    ExpiredIterator,

    #[error("throughput exceeded")]
    Throttled,

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failure: {0}")]
    Connection(String),

    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    #[error("invalid request: {0}")]
    InvalidArgument(String),

    #[error("service error: {0}")]
    Other(String),
}

impl ServiceError {
    /// Whether retrying the same call can reasonably succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ServiceError::Throttled | ServiceError::Timeout(_) | ServiceError::Connection(_)
        )
    }
}

/// Capability performing shard discovery, iterator acquisition, batch fetch,
/// and publishing against the streaming backend.
///
/// The read loop treats this as an opaque RPC client: auth, endpoints, and
/// wire formats all live behind it.
#[async_trait]
pub trait ShardService: Send + Sync {
    /// Enumerate the stream's current shards. Pagination is handled
    /// internally; the returned list is fully materialized.
    async fn list_shards(&self, stream_name: &str) -> Result<Vec<String>, ServiceError>;

    /// Acquire an iterator for a shard. With a `position`, the iterator is
    /// placed immediately after that sequence; otherwise `policy` decides.
    async fn get_shard_iterator(
        &self,
        stream_name: &str,
        shard_id: &str,
        position: Option<&str>,
        policy: IteratorPolicy,
    ) -> Result<String, ServiceError>;

    /// Fetch up to `limit` records. Returns the records in shard order plus
    /// the iterator to continue from; an empty batch with a live iterator is
    /// normal and means the shard has no new data. `None` for the next
    /// iterator means the shard is closed and fully consumed.
    async fn get_records(
        &self,
        iterator: &str,
        limit: usize,
    ) -> Result<(Vec<Record>, Option<String>), ServiceError>;

    /// Publish a single record keyed by `partition_key`.
    async fn put_record(
        &self,
        stream_name: &str,
        partition_key: &str,
        data: Bytes,
    ) -> Result<(), ServiceError>;

    /// Publish a batch in one request, preserving entry order. Partial
    /// failures come back in the outcome, not as an `Err`.
    async fn put_records(
        &self,
        stream_name: &str,
        entries: Vec<PutRecordEntry>,
    ) -> Result<PutRecordsOutcome, ServiceError>;
}

fn classify<E>(err: SdkError<E>) -> ServiceError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let detail = DisplayErrorContext(&err).to_string();
    match err.code() {
        Some("ExpiredIteratorException") => ServiceError::ExpiredIterator,
        Some("ProvisionedThroughputExceededException")
        | Some("LimitExceededException")
        | Some("KMSThrottlingException") => ServiceError::Throttled,
        Some("ResourceNotFoundException") => ServiceError::ResourceNotFound(detail),
        Some("ValidationException") | Some("InvalidArgumentException") => {
            ServiceError::InvalidArgument(detail)
        }
        _ => match &err {
            SdkError::TimeoutError(_) => ServiceError::Timeout(detail),
            SdkError::DispatchFailure(_) => ServiceError::Connection(detail),
            _ => ServiceError::Other(detail),
        },
    }
}

fn from_wire(record: &aws_sdk_kinesis::types::Record) -> Record {
    let arrival = record
        .approximate_arrival_timestamp()
        .and_then(|ts| ts.to_chrono_utc().ok());
    Record::new(
        record.sequence_number(),
        record.partition_key(),
        arrival,
        record.data().as_ref().to_vec(),
    )
}

#[async_trait]
impl ShardService for Client {
    async fn list_shards(&self, stream_name: &str) -> Result<Vec<String>, ServiceError> {
        let mut shard_ids = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            // The API requires exactly one of stream name or pagination token.
            let request = match next_token.take() {
                Some(token) => self.list_shards().next_token(token),
                None => self.list_shards().stream_name(stream_name),
            };
            let response = request.send().await.map_err(classify)?;
            shard_ids.extend(
                response
                    .shards()
                    .iter()
                    .map(|shard| shard.shard_id().to_string()),
            );
            match response.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => break,
            }
        }
        Ok(shard_ids)
    }

    async fn get_shard_iterator(
        &self,
        stream_name: &str,
        shard_id: &str,
        position: Option<&str>,
        policy: IteratorPolicy,
    ) -> Result<String, ServiceError> {
        let iterator_type = match (position, policy) {
            (Some(_), _) => ShardIteratorType::AfterSequenceNumber,
            (None, IteratorPolicy::Oldest) => ShardIteratorType::TrimHorizon,
            (None, IteratorPolicy::Latest) => ShardIteratorType::Latest,
        };

        let mut request = self
            .get_shard_iterator()
            .stream_name(stream_name)
            .shard_id(shard_id)
            .shard_iterator_type(iterator_type);
        if let Some(sequence) = position {
            request = request.starting_sequence_number(sequence);
        }

        let response = request.send().await.map_err(classify)?;
        response
            .shard_iterator()
            .map(str::to_string)
            .ok_or_else(|| {
                ServiceError::Other(format!("no shard iterator returned for {shard_id}"))
            })
    }

    async fn get_records(
        &self,
        iterator: &str,
        limit: usize,
    ) -> Result<(Vec<Record>, Option<String>), ServiceError> {
        let response = self
            .get_records()
            .shard_iterator(iterator)
            .limit(i32::try_from(limit).unwrap_or(i32::MAX))
            .send()
            .await
            .map_err(classify)?;

        let records = response.records().iter().map(from_wire).collect();
        let next_iterator = response.next_shard_iterator().map(str::to_string);
        Ok((records, next_iterator))
    }

    async fn put_record(
        &self,
        stream_name: &str,
        partition_key: &str,
        data: Bytes,
    ) -> Result<(), ServiceError> {
        self.put_record()
            .stream_name(stream_name)
            .partition_key(partition_key)
            .data(Blob::new(data.to_vec()))
            .send()
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn put_records(
        &self,
        stream_name: &str,
        entries: Vec<PutRecordEntry>,
    ) -> Result<PutRecordsOutcome, ServiceError> {
        let mut request_entries = Vec::with_capacity(entries.len());
        for entry in &entries {
            let request_entry = PutRecordsRequestEntry::builder()
                .partition_key(&entry.partition_key)
                .data(Blob::new(entry.data.to_vec()))
                .build()
                .map_err(|e| ServiceError::InvalidArgument(e.to_string()))?;
            request_entries.push(request_entry);
        }

        let response = self
            .put_records()
            .stream_name(stream_name)
            .set_records(Some(request_entries))
            .send()
            .await
            .map_err(classify)?;

        let entries = response
            .records()
            .iter()
            .map(|result| match result.error_code() {
                Some(code) => PutOutcomeEntry::Rejected {
                    code: code.to_string(),
                    message: result.error_message().unwrap_or_default().to_string(),
                },
                None => PutOutcomeEntry::Accepted {
                    sequence_number: result.sequence_number().unwrap_or_default().to_string(),
                    shard_id: result.shard_id().unwrap_or_default().to_string(),
                },
            })
            .collect();

        Ok(PutRecordsOutcome {
            entries,
            failed: response.failed_record_count().unwrap_or(0).max(0) as usize,
        })
    }
}
