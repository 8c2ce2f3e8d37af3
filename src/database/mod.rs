// src/database/mod.rs
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::checkpoint::CheckpointStore;
use crate::types::MatchRecord;

pub mod postgres;

pub use postgres::PostgresStore;

/// Durable storage for matched certificates and scan checkpoints.
#[async_trait]
pub trait MatchStore: Send + Sync {
    /// Insert one matched certificate. An index already stored for the
    /// same log is skipped, so redelivery is harmless here.
    async fn insert_match(&self, log_uri: &str, record: &MatchRecord) -> Result<()>;

    /// Last saved checkpoint for a log, `None` when never scanned.
    async fn load_checkpoint(&self, log_uri: &str) -> Result<Option<i64>>;

    /// Upsert the checkpoint for a log.
    async fn save_checkpoint(&self, log_uri: &str, last_index: i64) -> Result<()>;

    /// Health check.
    async fn ping(&self) -> Result<()>;
}

/// `CheckpointStore` view over a `MatchStore`, fixed to one log URI.
pub struct DbCheckpointStore {
    store: Arc<dyn MatchStore>,
    log_uri: String,
}

impl DbCheckpointStore {
    pub fn new(store: Arc<dyn MatchStore>, log_uri: String) -> Self {
        Self { store, log_uri }
    }
}

#[async_trait]
impl CheckpointStore for DbCheckpointStore {
    async fn load(&self) -> Result<Option<i64>> {
        self.store.load_checkpoint(&self.log_uri).await
    }

    async fn save(&self, last_index: i64) -> Result<()> {
        self.store.save_checkpoint(&self.log_uri, last_index).await
    }
}
