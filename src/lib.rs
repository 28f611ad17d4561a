//! Shardstream - consuming and publishing on sharded append-only logs
//!
//! This crate reads AWS Kinesis-style streams through a pull-model reader
//! with per-shard checkpointing, and publishes records singly or in batches.
//! Delivery is at-least-once: a record's position is committed once the
//! caller comes back for the next one, so an interrupted consumer replays
//! from the last record it finished rather than losing or skipping data.
//!
//! ```no_run
//! use shardstream::{ShardStream, StreamConfig};
//!
//! # async fn run() -> shardstream::Result<()> {
//! let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
//! let client = aws_sdk_kinesis::Client::new(&aws_config);
//!
//! let stream = ShardStream::new(StreamConfig::new("orders"), client);
//! let mut reader = stream.read();
//! while let Some(record) = reader.next().await? {
//!     println!("{}: {} bytes", record.partition_key(), record.data().len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod checkpoint;
pub mod client;
pub mod error;
pub mod record;
pub mod registry;
pub mod retry;
pub mod stream;

// Test doubles, also used by downstream crates' integration tests.
pub mod testing;

pub use error::{CheckpointError, MalformedPayload, Result, StreamError};
pub use record::{PutOutcomeEntry, PutRecordEntry, PutRecordsOutcome, Record};
pub use stream::{ShardStream, StreamConfig, StreamReader};

// Re-export main traits
pub use crate::checkpoint::Checkpointer;
pub use crate::client::{IteratorPolicy, ServiceError, ShardService};
pub use crate::retry::{Backoff, ExponentialBackoff, RetryConfig};

// Re-export implementations
pub use crate::checkpoint::dynamodb::DynamoDbCheckpointer;
pub use crate::checkpoint::memory::InMemoryCheckpointer;
pub use crate::registry::{CheckpointerConfig, StreamRegistry};
