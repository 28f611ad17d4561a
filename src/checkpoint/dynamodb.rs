//! DynamoDB-backed checkpointer: one row per shard, keyed by a prefixed
//! shard id. There is no concurrency control on the table, so only one
//! consumer process should write a given shard key at a time.

use async_trait::async_trait;
use aws_sdk_dynamodb::error::{DisplayErrorContext, SdkError};
use aws_sdk_dynamodb::{types::AttributeValue, Client as DynamoClient};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, trace};

use crate::checkpoint::Checkpointer;
use crate::error::CheckpointError;
use crate::retry::{ExponentialBackoff, RetryConfig, RetryHandle};

/// Durable checkpointer backed by a DynamoDB table.
///
/// The full table is scanned lazily on first access and cached for the rest
/// of the process lifetime; commits write through to both the table and the
/// cache. Writes are retried with backoff before the error is surfaced.
#[derive(Debug)]
pub struct DynamoDbCheckpointer {
    client: DynamoClient,
    table_name: String,
    key_attribute: String,
    position_attribute: String,
    key_prefix: String,
    retry_config: RetryConfig,
    backoff: ExponentialBackoff,
    cache: RwLock<Option<HashMap<String, String>>>,
}

fn classify<E>(err: SdkError<E>, fallback: fn(String) -> CheckpointError) -> CheckpointError
where
    E: std::error::Error + Send + Sync + 'static,
{
    let detail = DisplayErrorContext(&err).to_string();
    match &err {
        SdkError::DispatchFailure(_) | SdkError::TimeoutError(_) => {
            CheckpointError::Unavailable(detail)
        }
        _ => fallback(detail),
    }
}

impl DynamoDbCheckpointer {
    pub fn builder() -> DynamoDbCheckpointerBuilder {
        DynamoDbCheckpointerBuilder::new()
    }

    pub fn new(client: DynamoClient, table_name: impl Into<String>) -> Self {
        DynamoDbCheckpointerBuilder::new()
            .with_client(client)
            .with_table_name(table_name)
            .build()
    }

    fn prefixed_key(&self, shard_id: &str) -> String {
        format!("{}{}", self.key_prefix, shard_id)
    }

    /// Scan the table into the cache if this is the first access.
    async fn ensure_loaded(&self) -> Result<(), CheckpointError> {
        if self.cache.read().await.is_some() {
            return Ok(());
        }

        let mut guard = self.cache.write().await;
        if guard.is_some() {
            return Ok(());
        }

        let mut table = HashMap::new();
        let mut pages = self
            .client
            .scan()
            .table_name(&self.table_name)
            .into_paginator()
            .items()
            .send();

        while let Some(item) = pages.next().await {
            let item = item.map_err(|e| classify(e, CheckpointError::Load))?;
            let Some(key) = item.get(&self.key_attribute).and_then(|v| v.as_s().ok()) else {
                continue;
            };
            let Some(position) = item
                .get(&self.position_attribute)
                .and_then(|v| v.as_s().ok())
            else {
                continue;
            };
            // Rows written under a different prefix belong to another stream.
            let Some(shard_id) = key.strip_prefix(&self.key_prefix) else {
                continue;
            };
            table.insert(shard_id.to_string(), position.clone());
        }

        debug!(
            table = %self.table_name,
            count = table.len(),
            "loaded checkpoint table from DynamoDB"
        );
        *guard = Some(table);
        Ok(())
    }
}

#[async_trait]
impl Checkpointer for DynamoDbCheckpointer {
    async fn checkpoint(&self, shard_id: &str, position: &str) -> Result<(), CheckpointError> {
        let key = self.prefixed_key(shard_id);
        trace!(
            shard_id = %shard_id,
            key = %key,
            position = %position,
            "saving checkpoint to DynamoDB"
        );

        let mut retry = RetryHandle::new(self.retry_config.clone(), self.backoff.clone());
        retry
            .run(|| {
                let request = self
                    .client
                    .put_item()
                    .table_name(&self.table_name)
                    .item(&self.key_attribute, AttributeValue::S(key.clone()))
                    .item(
                        &self.position_attribute,
                        AttributeValue::S(position.to_string()),
                    );
                async move {
                    request
                        .send()
                        .await
                        .map_err(|e| classify(e, CheckpointError::Save))
                }
            })
            .await?;

        if let Some(cache) = self.cache.write().await.as_mut() {
            cache.insert(shard_id.to_string(), position.to_string());
        }
        Ok(())
    }

    async fn get_checkpoint(&self, shard_id: &str) -> Result<Option<String>, CheckpointError> {
        self.ensure_loaded().await?;
        let checkpoint = self
            .cache
            .read()
            .await
            .as_ref()
            .and_then(|cache| cache.get(shard_id).cloned());
        debug!(
            shard_id = %shard_id,
            checkpoint = ?checkpoint,
            "retrieved checkpoint from DynamoDB cache"
        );
        Ok(checkpoint)
    }

    async fn get_all_checkpoints(&self) -> Result<HashMap<String, String>, CheckpointError> {
        self.ensure_loaded().await?;
        Ok(self.cache.read().await.clone().unwrap_or_default())
    }
}

/// Builder for [`DynamoDbCheckpointer`].
#[derive(Debug, Default)]
pub struct DynamoDbCheckpointerBuilder {
    client: Option<DynamoClient>,
    table_name: Option<String>,
    key_attribute: Option<String>,
    position_attribute: Option<String>,
    key_prefix: Option<String>,
    retry_config: Option<RetryConfig>,
}

impl DynamoDbCheckpointerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(mut self, client: DynamoClient) -> Self {
        self.client = Some(client);
        self
    }

    pub fn with_table_name(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = Some(table_name.into());
        self
    }

    /// Attribute holding the (prefixed) shard key. Defaults to `shard_id`.
    pub fn with_key_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.key_attribute = Some(attribute.into());
        self
    }

    /// Attribute holding the position. Defaults to `sequence_number`.
    pub fn with_position_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.position_attribute = Some(attribute.into());
        self
    }

    /// Prefix applied to every shard key, separating streams that share a
    /// table. Defaults to the empty string.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }

    pub fn with_retry_config(mut self, config: RetryConfig) -> Self {
        self.retry_config = Some(config);
        self
    }

    pub fn build(self) -> DynamoDbCheckpointer {
        let retry_config = self.retry_config.unwrap_or_default();
        let backoff = retry_config.backoff();
        DynamoDbCheckpointer {
            client: self.client.expect("DynamoDB client is required"),
            table_name: self.table_name.expect("table name is required"),
            key_attribute: self.key_attribute.unwrap_or_else(|| "shard_id".to_string()),
            position_attribute: self
                .position_attribute
                .unwrap_or_else(|| "sequence_number".to_string()),
            key_prefix: self.key_prefix.unwrap_or_default(),
            retry_config,
            backoff,
            cache: RwLock::new(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_credential_types::Credentials;
    use aws_sdk_dynamodb::config::Builder;

    fn create_test_client() -> DynamoClient {
        let creds = Credentials::new("test", "test", None, None, "test");
        let config = Builder::new()
            .credentials_provider(creds)
            .region(aws_config::Region::new("us-east-1"))
            .build();
        DynamoClient::from_conf(config)
    }

    #[test]
    fn prefixed_key_joins_prefix_and_shard() {
        let store = DynamoDbCheckpointer::builder()
            .with_client(create_test_client())
            .with_table_name("checkpoints")
            .with_key_prefix("orders-stream:")
            .build();

        assert_eq!(store.prefixed_key("shard-1"), "orders-stream:shard-1");
    }

    #[test]
    fn builder_applies_schema_defaults() {
        let store = DynamoDbCheckpointer::new(create_test_client(), "checkpoints");
        assert_eq!(store.key_attribute, "shard_id");
        assert_eq!(store.position_attribute, "sequence_number");
        assert_eq!(store.key_prefix, "");
    }
}
