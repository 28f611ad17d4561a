use async_trait::async_trait;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::RwLock;
use tracing::{debug, trace};

use crate::checkpoint::Checkpointer;
use crate::error::CheckpointError;

/// In-memory checkpointer. No persistence; intended for development, tests,
/// and as the default when no durable store is configured.
#[derive(Debug, Default, Clone)]
pub struct InMemoryCheckpointer {
    checkpoints: Arc<RwLock<HashMap<String, String>>>,
}

impl InMemoryCheckpointer {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Checkpointer for InMemoryCheckpointer {
    async fn checkpoint(&self, shard_id: &str, position: &str) -> Result<(), CheckpointError> {
        trace!(
            shard_id = %shard_id,
            position = %position,
            "saving checkpoint to memory"
        );
        self.checkpoints
            .write()
            .await
            .insert(shard_id.to_string(), position.to_string());
        Ok(())
    }

    async fn get_checkpoint(&self, shard_id: &str) -> Result<Option<String>, CheckpointError> {
        let checkpoint = self.checkpoints.read().await.get(shard_id).cloned();
        debug!(
            shard_id = %shard_id,
            checkpoint = ?checkpoint,
            "retrieved checkpoint from memory"
        );
        Ok(checkpoint)
    }

    async fn get_all_checkpoints(&self) -> Result<HashMap<String, String>, CheckpointError> {
        Ok(self.checkpoints.read().await.clone())
    }
}
