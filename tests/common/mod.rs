// tests/common/mod.rs
use shardstream::{RetryConfig, StreamConfig};
use std::sync::Once;
use std::time::Duration;

static INIT_LOGGING: Once = Once::new();

/// Route crate logs through the test writer; RUST_LOG overrides the default.
pub fn init_logging() {
    INIT_LOGGING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "shardstream=debug".into());
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Stream config with intervals and backoff shrunk for fast tests.
pub fn test_config() -> StreamConfig {
    let mut config = StreamConfig::new("test-stream");
    config.batch_size = 100;
    config.read_interval = Duration::from_millis(10);
    config.shard_sync_interval = Duration::from_secs(60);
    config.fetch_retry = RetryConfig {
        max_retries: Some(2),
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(5),
        jitter_factor: 0.0,
    };
    config
}
