//! Test doubles for the service and checkpointer seams.
//!
//! [`MockShardService`] replays queued responses and records every request it
//! sees; when a queue is empty it falls back to benign defaults (no shards,
//! empty fetches with a live iterator) so tests only script what they care
//! about.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::checkpoint::Checkpointer;
use crate::client::{IteratorPolicy, ServiceError, ShardService};
use crate::error::CheckpointError;
use crate::record::{PutOutcomeEntry, PutRecordEntry, PutRecordsOutcome, Record};

/// Record with an arrival timestamp of now.
pub fn test_record(sequence: &str, partition_key: &str, data: impl AsRef<[u8]>) -> Record {
    Record::new(
        sequence,
        partition_key,
        Some(Utc::now()),
        data.as_ref().to_vec(),
    )
}

/// Record whose payload is the JSON encoding of `value`.
pub fn json_record<T: Serialize>(sequence: &str, partition_key: &str, value: &T) -> Record {
    let data = serde_json::to_vec(value).expect("failed to encode test payload");
    Record::new(sequence, partition_key, Some(Utc::now()), data)
}

/// One recorded `get_shard_iterator` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IteratorRequest {
    pub shard_id: String,
    pub position: Option<String>,
    pub policy: IteratorPolicy,
}

type FetchResponse = Result<(Vec<Record>, Option<String>), ServiceError>;

/// Scripted [`ShardService`] double.
#[derive(Debug, Default, Clone)]
pub struct MockShardService {
    list_shards_responses: Arc<Mutex<VecDeque<Result<Vec<String>, ServiceError>>>>,
    get_iterator_responses: Arc<Mutex<VecDeque<Result<String, ServiceError>>>>,
    get_records_responses: Arc<Mutex<VecDeque<FetchResponse>>>,
    put_responses: Arc<Mutex<VecDeque<Result<(), ServiceError>>>>,
    put_batch_responses: Arc<Mutex<VecDeque<Result<PutRecordsOutcome, ServiceError>>>>,

    list_shards_calls: Arc<AtomicUsize>,
    iterator_requests: Arc<Mutex<Vec<IteratorRequest>>>,
    fetched_iterators: Arc<Mutex<Vec<String>>>,
    put_requests: Arc<Mutex<Vec<(String, Bytes)>>>,
    put_batch_requests: Arc<Mutex<Vec<Vec<PutRecordEntry>>>>,
}

impl MockShardService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mock_list_shards(&self, response: Result<Vec<String>, ServiceError>) {
        self.list_shards_responses.lock().push_back(response);
    }

    /// Shorthand for a successful shard listing.
    pub fn mock_shards(&self, shard_ids: &[&str]) {
        self.mock_list_shards(Ok(shard_ids.iter().map(|s| s.to_string()).collect()));
    }

    pub fn mock_get_iterator(&self, response: Result<String, ServiceError>) {
        self.get_iterator_responses.lock().push_back(response);
    }

    pub fn mock_get_records(&self, response: FetchResponse) {
        self.get_records_responses.lock().push_back(response);
    }

    /// Shorthand for a successful fetch continuing on the same iterator.
    pub fn mock_records(&self, iterator: &str, records: Vec<Record>) {
        self.mock_get_records(Ok((records, Some(iterator.to_string()))));
    }

    pub fn mock_put(&self, response: Result<(), ServiceError>) {
        self.put_responses.lock().push_back(response);
    }

    pub fn mock_put_batch(&self, response: Result<PutRecordsOutcome, ServiceError>) {
        self.put_batch_responses.lock().push_back(response);
    }

    pub fn list_shards_calls(&self) -> usize {
        self.list_shards_calls.load(Ordering::SeqCst)
    }

    pub fn iterator_requests(&self) -> Vec<IteratorRequest> {
        self.iterator_requests.lock().clone()
    }

    /// Iterators passed to `get_records`, in call order.
    pub fn fetched_iterators(&self) -> Vec<String> {
        self.fetched_iterators.lock().clone()
    }

    /// `(partition_key, data)` pairs from single-record publishes.
    pub fn put_requests(&self) -> Vec<(String, Bytes)> {
        self.put_requests.lock().clone()
    }

    pub fn put_batch_requests(&self) -> Vec<Vec<PutRecordEntry>> {
        self.put_batch_requests.lock().clone()
    }
}

#[async_trait]
impl ShardService for MockShardService {
    async fn list_shards(&self, _stream_name: &str) -> Result<Vec<String>, ServiceError> {
        self.list_shards_calls.fetch_add(1, Ordering::SeqCst);
        self.list_shards_responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(vec![]))
    }

    async fn get_shard_iterator(
        &self,
        _stream_name: &str,
        shard_id: &str,
        position: Option<&str>,
        policy: IteratorPolicy,
    ) -> Result<String, ServiceError> {
        self.iterator_requests.lock().push(IteratorRequest {
            shard_id: shard_id.to_string(),
            position: position.map(str::to_string),
            policy,
        });
        self.get_iterator_responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(format!("iterator-{shard_id}")))
    }

    async fn get_records(
        &self,
        iterator: &str,
        _limit: usize,
    ) -> Result<(Vec<Record>, Option<String>), ServiceError> {
        self.fetched_iterators.lock().push(iterator.to_string());
        self.get_records_responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok((vec![], Some(iterator.to_string()))))
    }

    async fn put_record(
        &self,
        _stream_name: &str,
        partition_key: &str,
        data: Bytes,
    ) -> Result<(), ServiceError> {
        self.put_requests
            .lock()
            .push((partition_key.to_string(), data));
        self.put_responses.lock().pop_front().unwrap_or(Ok(()))
    }

    async fn put_records(
        &self,
        _stream_name: &str,
        entries: Vec<PutRecordEntry>,
    ) -> Result<PutRecordsOutcome, ServiceError> {
        let count = entries.len();
        self.put_batch_requests.lock().push(entries);
        self.put_batch_responses.lock().pop_front().unwrap_or_else(|| {
            let entries = (0..count)
                .map(|i| PutOutcomeEntry::Accepted {
                    sequence_number: format!("{i}"),
                    shard_id: "shardId-000000000000".to_string(),
                })
                .collect();
            Ok(PutRecordsOutcome { entries, failed: 0 })
        })
    }
}

/// Scripted [`Checkpointer`] double backed by a plain map; queued responses
/// override the map for as many calls as are scripted.
#[derive(Debug, Default, Clone)]
pub struct MockCheckpointer {
    checkpoints: Arc<Mutex<HashMap<String, String>>>,
    checkpoint_responses: Arc<Mutex<VecDeque<Result<(), CheckpointError>>>>,
    get_responses: Arc<Mutex<VecDeque<Result<Option<String>, CheckpointError>>>>,
    save_count: Arc<AtomicUsize>,
}

impl MockCheckpointer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate a shard position, as if a previous run committed it.
    pub fn seed(&self, shard_id: &str, position: &str) {
        self.checkpoints
            .lock()
            .insert(shard_id.to_string(), position.to_string());
    }

    pub fn mock_checkpoint(&self, response: Result<(), CheckpointError>) {
        self.checkpoint_responses.lock().push_back(response);
    }

    pub fn mock_get_checkpoint(&self, response: Result<Option<String>, CheckpointError>) {
        self.get_responses.lock().push_back(response);
    }

    pub fn save_count(&self) -> usize {
        self.save_count.load(Ordering::SeqCst)
    }

    pub fn stored(&self) -> HashMap<String, String> {
        self.checkpoints.lock().clone()
    }
}

#[async_trait]
impl Checkpointer for MockCheckpointer {
    async fn checkpoint(&self, shard_id: &str, position: &str) -> Result<(), CheckpointError> {
        if let Some(response) = self.checkpoint_responses.lock().pop_front() {
            return response;
        }
        self.checkpoints
            .lock()
            .insert(shard_id.to_string(), position.to_string());
        self.save_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get_checkpoint(&self, shard_id: &str) -> Result<Option<String>, CheckpointError> {
        if let Some(response) = self.get_responses.lock().pop_front() {
            return response;
        }
        Ok(self.checkpoints.lock().get(shard_id).cloned())
    }

    async fn get_all_checkpoints(&self) -> Result<HashMap<String, String>, CheckpointError> {
        Ok(self.checkpoints.lock().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_service_replays_queued_responses() -> anyhow::Result<()> {
        let service = MockShardService::new();
        service.mock_shards(&["shard-1"]);
        service.mock_records("it-1", vec![test_record("1", "key", b"data")]);

        let shards = service.list_shards("any").await?;
        assert_eq!(shards, vec!["shard-1".to_string()]);
        assert_eq!(service.list_shards_calls(), 1);

        let (records, next) = service.get_records("it-1", 100).await?;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].sequence_number(), "1");
        assert_eq!(next.as_deref(), Some("it-1"));

        // Unscripted fetch falls back to an empty batch on the same iterator.
        let (records, next) = service.get_records("it-1", 100).await?;
        assert!(records.is_empty());
        assert_eq!(next.as_deref(), Some("it-1"));
        assert_eq!(service.fetched_iterators().len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn mock_service_records_iterator_requests() -> anyhow::Result<()> {
        let service = MockShardService::new();
        let iterator = service
            .get_shard_iterator("orders", "shard-1", Some("42"), IteratorPolicy::Oldest)
            .await?;
        assert_eq!(iterator, "iterator-shard-1");

        let requests = service.iterator_requests();
        assert_eq!(
            requests,
            vec![IteratorRequest {
                shard_id: "shard-1".to_string(),
                position: Some("42".to_string()),
                policy: IteratorPolicy::Oldest,
            }]
        );
        Ok(())
    }

    #[tokio::test]
    async fn mock_checkpointer_failure_overrides_the_map() -> anyhow::Result<()> {
        let store = MockCheckpointer::new();
        store.mock_checkpoint(Err(CheckpointError::Save("scripted".to_string())));

        assert!(store.checkpoint("shard-1", "1").await.is_err());
        assert_eq!(store.save_count(), 0);

        store.checkpoint("shard-1", "2").await?;
        assert_eq!(store.stored().get("shard-1").map(String::as_str), Some("2"));
        Ok(())
    }

    #[test]
    fn json_record_encodes_the_payload() {
        let record = json_record("1", "key", &serde_json::json!({"id": 7}));
        let value: serde_json::Value = record.payload_json().unwrap().unwrap();
        assert_eq!(value["id"], 7);
    }
}
