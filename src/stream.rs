//! The stream handle and its pull-model read loop.
//!
//! [`ShardStream`] is the long-lived handle for one named stream: it owns the
//! shard cache, the checkpointer, and the stop signal, and it publishes.
//! [`StreamReader`] is a consuming cursor obtained from [`ShardStream::read`];
//! each call to [`StreamReader::next`] yields one record, walking the shards
//! round-robin and sleeping between full passes.
//!
//! Delivery is at-least-once. A record's position is committed at the start
//! of the *following* `next()` call, so a consumer that crashes mid-record
//! sees that record again after restart, while one that drains and stops
//! cleanly resumes exactly after the last record it was handed.

use bytes::Bytes;
use std::collections::{HashSet, VecDeque};
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::checkpoint::{Checkpointer, InMemoryCheckpointer};
use crate::client::{IteratorPolicy, ServiceError, ShardService};
use crate::error::{Result, StreamError};
use crate::record::{PutRecordEntry, PutRecordsOutcome, Record};
use crate::retry::{Backoff, RetryConfig};

/// Tuning for one stream handle.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Name of the stream to read and publish on.
    pub stream_name: String,
    /// Maximum records requested per fetch.
    pub batch_size: usize,
    /// Pause between full passes over the shards once they are drained.
    pub read_interval: Duration,
    /// How long the discovered shard list stays valid before the next pass
    /// re-lists shards.
    pub shard_sync_interval: Duration,
    /// Starting position for shards with no checkpoint.
    pub iterator_policy: IteratorPolicy,
    /// Retry budget for transient fetch failures.
    pub fetch_retry: RetryConfig,
}

impl StreamConfig {
    pub fn new(stream_name: impl Into<String>) -> Self {
        Self {
            stream_name: stream_name.into(),
            batch_size: 10_000,
            read_interval: Duration::from_secs(1),
            shard_sync_interval: Duration::from_secs(60),
            iterator_policy: IteratorPolicy::default(),
            fetch_retry: RetryConfig::default(),
        }
    }
}

#[derive(Debug, Default)]
struct ShardCache {
    shards: Vec<String>,
    last_synced: Option<Instant>,
}

/// Handle for one named stream: consuming, publishing, and shutdown.
///
/// Readers come from [`read`](Self::read); any number may be created, though
/// they share checkpoints and therefore should not run concurrently against
/// the same shards. [`stop`](Self::stop) asks every reader to wind down at
/// its next record boundary.
pub struct ShardStream<C: ShardService, S: Checkpointer = InMemoryCheckpointer> {
    config: StreamConfig,
    client: C,
    checkpointer: S,
    shard_cache: Mutex<ShardCache>,
    stop: watch::Sender<bool>,
}

impl<C: ShardService> ShardStream<C> {
    /// Stream handle with a fresh in-memory checkpointer. Positions do not
    /// survive the process; use [`with_checkpointer`](Self::with_checkpointer)
    /// for durable resume.
    pub fn new(config: StreamConfig, client: C) -> Self {
        Self::with_checkpointer(config, client, InMemoryCheckpointer::new())
    }
}

impl<C: ShardService, S: Checkpointer> ShardStream<C, S> {
    pub fn with_checkpointer(config: StreamConfig, client: C, checkpointer: S) -> Self {
        let (stop, _) = watch::channel(false);
        Self {
            config,
            client,
            checkpointer,
            shard_cache: Mutex::new(ShardCache::default()),
            stop,
        }
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn checkpointer(&self) -> &S {
        &self.checkpointer
    }

    /// Begin consuming. The reader starts from each shard's checkpoint, or
    /// from the configured [`IteratorPolicy`] where none exists.
    pub fn read(&self) -> StreamReader<'_, C, S> {
        StreamReader {
            stream: self,
            cursors: Vec::new(),
            next_cursor: 0,
            buffered: VecDeque::new(),
            buffered_shard: String::new(),
            pending_commit: None,
            finished: HashSet::new(),
            stop_rx: self.stop.subscribe(),
            started: false,
            cycles: 0,
        }
    }

    /// Ask readers to stop. Cooperative: a reader mid-`next()` finishes its
    /// current await first, and one more `next()` call is needed to flush the
    /// final record's checkpoint.
    pub fn stop(&self) {
        info!(stream = %self.config.stream_name, "stop requested");
        self.stop.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.stop.subscribe().borrow()
    }

    /// Publish one record. `partition_key` decides the shard; records sharing
    /// a key stay ordered relative to each other.
    pub async fn put(&self, partition_key: &str, data: impl Into<Bytes>) -> Result<()> {
        self.client
            .put_record(&self.config.stream_name, partition_key, data.into())
            .await
            .map_err(StreamError::Publish)?;
        trace!(
            stream = %self.config.stream_name,
            partition_key = %partition_key,
            "published record"
        );
        Ok(())
    }

    /// Publish a batch in one request. An `Ok` outcome may still carry
    /// per-entry rejections; check [`PutRecordsOutcome::has_failures`] and
    /// resubmit the rejected entries if needed.
    pub async fn put_batch(&self, entries: Vec<PutRecordEntry>) -> Result<PutRecordsOutcome> {
        let count = entries.len();
        let outcome = self
            .client
            .put_records(&self.config.stream_name, entries)
            .await
            .map_err(StreamError::Publish)?;
        debug!(
            stream = %self.config.stream_name,
            submitted = count,
            failed = outcome.failed,
            "published batch"
        );
        Ok(outcome)
    }

    /// Shard ids for this stream, re-listed only when the cached copy has
    /// outlived `shard_sync_interval`.
    async fn current_shards(&self) -> Result<Vec<String>> {
        let mut cache = self.shard_cache.lock().await;
        let fresh = cache
            .last_synced
            .map_or(false, |at| at.elapsed() < self.config.shard_sync_interval);
        if !fresh {
            let shards = self.client.list_shards(&self.config.stream_name).await?;
            debug!(
                stream = %self.config.stream_name,
                count = shards.len(),
                "refreshed shard list"
            );
            cache.shards = shards;
            cache.last_synced = Some(Instant::now());
        }
        Ok(cache.shards.clone())
    }

    /// Fresh iterator for a shard, derived from its checkpoint when one
    /// exists so no committed record is replayed.
    async fn derive_iterator(&self, shard_id: &str) -> Result<String> {
        let position = self.checkpointer.get_checkpoint(shard_id).await?;
        let iterator = self
            .client
            .get_shard_iterator(
                &self.config.stream_name,
                shard_id,
                position.as_deref(),
                self.config.iterator_policy,
            )
            .await?;
        Ok(iterator)
    }
}

struct ShardCursor {
    shard_id: String,
    iterator: String,
}

/// Pull cursor over a stream's records.
///
/// Borrow from the parent [`ShardStream`]; drop it to abandon the read
/// position (the checkpointer keeps the durable one).
pub struct StreamReader<'a, C: ShardService, S: Checkpointer> {
    stream: &'a ShardStream<C, S>,
    /// Shards in discovery order; each holds the iterator to continue from.
    cursors: Vec<ShardCursor>,
    next_cursor: usize,
    /// Records fetched but not yet yielded, all from `buffered_shard`.
    buffered: VecDeque<Record>,
    buffered_shard: String,
    /// Position of the last yielded record, committed on the next call.
    pending_commit: Option<(String, String)>,
    /// Closed shards already drained. They can linger in the shard listing
    /// until retention expires, so remember not to re-track them.
    finished: HashSet<String>,
    stop_rx: watch::Receiver<bool>,
    started: bool,
    cycles: u64,
}

impl<C: ShardService, S: Checkpointer> StreamReader<'_, C, S> {
    /// The next record, or `Ok(None)` once [`ShardStream::stop`] has been
    /// observed. Blocks through empty passes until a record arrives.
    ///
    /// Commits the previously yielded record's position before doing anything
    /// else, so calling `next()` once more after `stop()` both flushes the
    /// final checkpoint and confirms shutdown.
    pub async fn next(&mut self) -> Result<Option<Record>> {
        if let Some((shard_id, position)) = self.pending_commit.take() {
            if let Err(e) = self.stream.checkpointer.checkpoint(&shard_id, &position).await {
                // Leave the commit pending so a later call can retry it.
                self.pending_commit = Some((shard_id, position));
                return Err(e.into());
            }
        }

        loop {
            if *self.stop_rx.borrow() {
                info!(stream = %self.stream.config.stream_name, "reader stopped");
                return Ok(None);
            }

            if let Some(record) = self.buffered.pop_front() {
                self.pending_commit = Some((
                    self.buffered_shard.clone(),
                    record.sequence_number().to_string(),
                ));
                return Ok(Some(record));
            }

            if self.next_cursor < self.cursors.len() {
                self.fetch_from_cursor().await?;
                continue;
            }

            // Full pass complete: every shard was polled once and nothing is
            // buffered. Idle before starting over.
            if self.started {
                self.cycles += 1;
                trace!(cycle = self.cycles, "pass complete, idling");
                tokio::select! {
                    _ = tokio::time::sleep(self.stream.config.read_interval) => {}
                    _ = self.stop_rx.changed() => {}
                }
                if *self.stop_rx.borrow() {
                    continue;
                }
            }
            self.started = true;
            self.sync_cursors().await?;
            self.next_cursor = 0;
        }
    }

    /// Poll the cursor at `next_cursor` once and buffer whatever it returns.
    async fn fetch_from_cursor(&mut self) -> Result<()> {
        let index = self.next_cursor;
        let shard_id = self.cursors[index].shard_id.clone();
        let iterator = self.cursors[index].iterator.clone();

        let (records, next_iterator) = self.fetch(&shard_id, iterator).await?;
        match next_iterator {
            Some(iterator) => {
                self.cursors[index].iterator = iterator;
                self.next_cursor += 1;
            }
            None => {
                // Closed shard, fully drained. Drop the cursor; next_cursor
                // now points at the following shard.
                info!(shard_id = %shard_id, "shard closed and consumed, releasing");
                self.finished.insert(shard_id.clone());
                self.cursors.remove(index);
            }
        }

        if !records.is_empty() {
            trace!(shard_id = %shard_id, count = records.len(), "buffered records");
        }
        self.buffered_shard = shard_id;
        self.buffered.extend(records);
        Ok(())
    }

    /// One fetch against a shard, absorbing an expired iterator and retrying
    /// transient failures within the configured budget.
    async fn fetch(
        &mut self,
        shard_id: &str,
        mut iterator: String,
    ) -> Result<(Vec<Record>, Option<String>)> {
        let config = &self.stream.config;
        let backoff = config.fetch_retry.backoff();
        let mut retries = 0u32;
        let mut renewed = false;

        loop {
            match self
                .stream
                .client
                .get_records(&iterator, config.batch_size)
                .await
            {
                Ok(batch) => return Ok(batch),
                Err(ServiceError::ExpiredIterator) if !renewed => {
                    renewed = true;
                    warn!(shard_id = %shard_id, "shard iterator expired, renewing from checkpoint");
                    iterator = self.stream.derive_iterator(shard_id).await?;
                }
                Err(e) if e.is_transient() && config.fetch_retry.allows_retry(retries) => {
                    let delay = backoff.delay(retries);
                    retries += 1;
                    warn!(
                        shard_id = %shard_id,
                        retry = retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient fetch failure, backing off"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        // On stop, hand back an empty batch with the same
                        // iterator; the loop top observes the signal.
                        _ = self.stop_rx.changed() => return Ok((Vec::new(), Some(iterator))),
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Reconcile cursors with the current shard list: drop shards that are
    /// gone, bootstrap ones that appeared.
    async fn sync_cursors(&mut self) -> Result<()> {
        let shards = self.stream.current_shards().await?;

        self.cursors.retain(|cursor| {
            let keep = shards.contains(&cursor.shard_id);
            if !keep {
                warn!(shard_id = %cursor.shard_id, "shard no longer listed, releasing");
            }
            keep
        });

        for shard_id in shards {
            if self.finished.contains(&shard_id)
                || self.cursors.iter().any(|c| c.shard_id == shard_id)
            {
                continue;
            }
            let iterator = self.stream.derive_iterator(&shard_id).await?;
            debug!(shard_id = %shard_id, "tracking shard");
            self.cursors.push(ShardCursor { shard_id, iterator });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = StreamConfig::new("orders");
        assert_eq!(config.stream_name, "orders");
        assert_eq!(config.batch_size, 10_000);
        assert_eq!(config.read_interval, Duration::from_secs(1));
        assert_eq!(config.shard_sync_interval, Duration::from_secs(60));
        assert_eq!(config.iterator_policy, IteratorPolicy::Oldest);
        assert_eq!(config.fetch_retry.max_retries, Some(3));
    }
}
