//! Checkpoint storage: per-shard "last processed" positions
//!
//! A checkpointer has pure key-value semantics and knows nothing about the
//! stream protocol. Overwriting unconditionally is conformant; ordering
//! discipline (only ever committing newer positions) is the read loop's job.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::CheckpointError;

pub mod dynamodb;
pub mod memory;

pub use dynamodb::DynamoDbCheckpointer;
pub use memory::InMemoryCheckpointer;

/// Persists and retrieves the last-processed sequence position per shard.
///
/// One checkpointer instance serves one stream; give each stream its own
/// table, prefix, or map so shard positions from different streams never mix.
#[async_trait]
pub trait Checkpointer: Send + Sync {
    /// Durably record that everything up to and including `position` on
    /// `shard_id` has been processed.
    async fn checkpoint(&self, shard_id: &str, position: &str) -> Result<(), CheckpointError>;

    /// The last committed position for a shard, or `None` if the shard has
    /// never been checkpointed (read from the stream's configured start).
    async fn get_checkpoint(&self, shard_id: &str) -> Result<Option<String>, CheckpointError>;

    /// Snapshot of every known shard position. The returned map is a copy;
    /// mutating it does not affect the store.
    async fn get_all_checkpoints(&self) -> Result<HashMap<String, String>, CheckpointError>;
}

#[async_trait]
impl<T: Checkpointer + ?Sized> Checkpointer for Box<T> {
    async fn checkpoint(&self, shard_id: &str, position: &str) -> Result<(), CheckpointError> {
        (**self).checkpoint(shard_id, position).await
    }

    async fn get_checkpoint(&self, shard_id: &str) -> Result<Option<String>, CheckpointError> {
        (**self).get_checkpoint(shard_id).await
    }

    async fn get_all_checkpoints(&self) -> Result<HashMap<String, String>, CheckpointError> {
        (**self).get_all_checkpoints().await
    }
}

#[async_trait]
impl<T: Checkpointer + ?Sized> Checkpointer for Arc<T> {
    async fn checkpoint(&self, shard_id: &str, position: &str) -> Result<(), CheckpointError> {
        (**self).checkpoint(shard_id, position).await
    }

    async fn get_checkpoint(&self, shard_id: &str) -> Result<Option<String>, CheckpointError> {
        (**self).get_checkpoint(shard_id).await
    }

    async fn get_all_checkpoints(&self) -> Result<HashMap<String, String>, CheckpointError> {
        (**self).get_all_checkpoints().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn boxed_checkpointer_forwards() -> anyhow::Result<()> {
        let store: Box<dyn Checkpointer> = Box::new(InMemoryCheckpointer::new());
        store.checkpoint("shard-1", "42").await?;
        assert_eq!(
            store.get_checkpoint("shard-1").await?,
            Some("42".to_string())
        );
        Ok(())
    }

    #[tokio::test]
    async fn arc_checkpointer_forwards() -> anyhow::Result<()> {
        let store = Arc::new(InMemoryCheckpointer::new());
        store.checkpoint("shard-1", "7").await?;
        assert_eq!(store.get_all_checkpoints().await?.len(), 1);
        Ok(())
    }
}
