// src/sink/store.rs
//! Database persistence sink

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use super::EventSink;
use crate::database::MatchStore;
use crate::types::{LogEntry, MatchRecord};

/// Writes one row per matched entry. Redelivered indexes are absorbed
/// by the store's conflict handling, which keeps at-least-once delivery
/// idempotent on this path.
pub struct StoreSink {
    store: Arc<dyn MatchStore>,
    log_uri: String,
}

impl StoreSink {
    pub fn new(store: Arc<dyn MatchStore>, log_uri: String) -> Self {
        Self { store, log_uri }
    }
}

#[async_trait]
impl EventSink for StoreSink {
    fn name(&self) -> &'static str {
        "store"
    }

    async fn deliver(&mut self, entry: &LogEntry) -> Result<()> {
        let record = MatchRecord::from_entry(entry);
        self.store.insert_match(&self.log_uri, &record).await?;

        debug!("Stored {} entry {}", entry.kind, entry.index);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EntryKind;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeStore {
        inserted: Mutex<Vec<(String, MatchRecord)>>,
        fail: bool,
    }

    #[async_trait]
    impl MatchStore for FakeStore {
        async fn insert_match(&self, log_uri: &str, record: &MatchRecord) -> Result<()> {
            if self.fail {
                anyhow::bail!("database unavailable");
            }
            self.inserted
                .lock()
                .unwrap()
                .push((log_uri.to_string(), record.clone()));
            Ok(())
        }

        async fn load_checkpoint(&self, _log_uri: &str) -> Result<Option<i64>> {
            Ok(None)
        }

        async fn save_checkpoint(&self, _log_uri: &str, _last_index: i64) -> Result<()> {
            Ok(())
        }

        async fn ping(&self) -> Result<()> {
            Ok(())
        }
    }

    fn sample_entry() -> LogEntry {
        LogEntry {
            index: 9,
            kind: EntryKind::Certificate,
            subject_cn: Some("db.example.com".to_string()),
            issuer_cn: None,
            dns_names: Vec::new(),
            serial: "05".to_string(),
            not_before: None,
            not_after: None,
            sha256: "beef".to_string(),
            raw_der: vec![0x30],
        }
    }

    #[tokio::test]
    async fn test_deliver_inserts_record_for_log() {
        let store = Arc::new(FakeStore::default());
        let mut sink = StoreSink::new(store.clone(), "https://log.example/a".to_string());

        sink.deliver(&sample_entry()).await.unwrap();

        let inserted = store.inserted.lock().unwrap();
        assert_eq!(inserted.len(), 1);
        assert_eq!(inserted[0].0, "https://log.example/a");
        assert_eq!(inserted[0].1.log_index, 9);
        assert_eq!(inserted[0].1.sha256, "beef");
    }

    #[tokio::test]
    async fn test_deliver_surfaces_store_errors() {
        let store = Arc::new(FakeStore {
            fail: true,
            ..Default::default()
        });
        let mut sink = StoreSink::new(store, "https://log.example/a".to_string());

        assert!(sink.deliver(&sample_entry()).await.is_err());
    }
}
