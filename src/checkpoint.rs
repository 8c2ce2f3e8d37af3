// src/checkpoint.rs
//! Resume-position persistence
//!
//! One record per log URI. The controller is the only writer and its
//! cursor never moves backwards, so the persisted index is monotonically
//! non-decreasing across a run. Absence of a record means "never scanned",
//! not an error.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Storage for the last persisted scan position of a single log.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Last saved index, `None` when no checkpoint exists yet.
    async fn load(&self) -> Result<Option<i64>>;

    /// Upsert the checkpoint for this log.
    async fn save(&self, last_index: i64) -> Result<()>;
}

/// One persisted checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub last_index: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// TOML-file checkpoint store, keyed by log URI so several monitors can
/// share one state file.
pub struct FileCheckpointStore {
    state_file_path: PathBuf,
    log_uri: String,
    records: Mutex<HashMap<String, CheckpointRecord>>,
}

impl FileCheckpointStore {
    /// Open the store, loading existing records if the file is present.
    pub async fn new(state_file: PathBuf, log_uri: String) -> Result<Self> {
        let mut records = HashMap::new();

        if state_file.exists() {
            info!("Loading checkpoints from {:?}", state_file);

            let contents = fs::read_to_string(&state_file)
                .await
                .context("Failed to read checkpoint file")?;

            let loaded: HashMap<String, CheckpointRecord> =
                toml::from_str(&contents).context("Failed to parse checkpoint file")?;

            info!("Loaded checkpoints for {} logs", loaded.len());
            records = loaded;
        } else {
            info!(
                "Checkpoint file {:?} does not exist, starting fresh",
                state_file
            );
        }

        Ok(Self {
            state_file_path: state_file,
            log_uri,
            records: Mutex::new(records),
        })
    }

    /// Write all records to the file, tmp + rename for atomicity.
    async fn persist(&self, records: &HashMap<String, CheckpointRecord>) -> Result<()> {
        debug!(
            "Saving checkpoints for {} logs to {:?}",
            records.len(),
            self.state_file_path
        );

        let toml_string =
            toml::to_string(records).context("Failed to serialize checkpoints to TOML")?;

        let temp_path = self.state_file_path.with_extension("tmp");

        fs::write(&temp_path, toml_string)
            .await
            .context("Failed to write checkpoint temporary file")?;

        fs::rename(&temp_path, &self.state_file_path)
            .await
            .context("Failed to rename checkpoint temporary file")?;

        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn load(&self) -> Result<Option<i64>> {
        let records = self.records.lock().await;
        Ok(records.get(&self.log_uri).map(|r| r.last_index))
    }

    async fn save(&self, last_index: i64) -> Result<()> {
        let mut records = self.records.lock().await;

        let now = Utc::now();
        records
            .entry(self.log_uri.clone())
            .and_modify(|r| {
                r.last_index = last_index;
                r.updated_at = now;
            })
            .or_insert_with(|| CheckpointRecord {
                last_index,
                created_at: now,
                updated_at: now,
            });

        self.persist(&records).await
    }
}
