// src/sink/redis.rs
//! Redis pub/sub sink
//!
//! Publishes every match to a channel for live subscribers and, when a
//! queue is configured, LPUSHes the same payload to a capped list so
//! consumers that were offline can catch up.

use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::Serialize;
use tracing::{debug, info};

use super::EventSink;
use crate::config::RedisConfig;
use crate::types::{LogEntry, MatchRecord};

pub struct RedisSink {
    config: RedisConfig,
    conn: ConnectionManager,
    log_uri: String,
}

/// Message published to Redis
#[derive(Debug, Serialize)]
struct RedisEventMessage<'a> {
    /// Always "ct_match"
    event_type: &'static str,
    log_uri: &'a str,
    #[serde(flatten)]
    record: &'a MatchRecord,
}

impl RedisSink {
    /// Connect and verify with a PING before the sink is registered.
    /// The connection manager reconnects on its own afterwards.
    pub async fn connect(config: RedisConfig, log_uri: String) -> Result<Self> {
        info!("Connecting to Redis...");

        let client = redis::Client::open(config.url.as_str()).context("Invalid Redis URL")?;
        let manager = ConnectionManager::new(client)
            .await
            .context("Failed to connect to Redis")?;

        // Test connection
        let mut conn = manager.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .context("Redis ping failed")?;

        info!("Redis connected successfully");

        Ok(Self {
            config,
            conn: manager,
            log_uri,
        })
    }
}

#[async_trait]
impl EventSink for RedisSink {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn deliver(&mut self, entry: &LogEntry) -> Result<()> {
        let record = MatchRecord::from_entry(entry);
        let message = RedisEventMessage {
            event_type: "ct_match",
            log_uri: &self.log_uri,
            record: &record,
        };
        let payload = serde_json::to_string(&message)?;

        // Publish to channel (for real-time subscribers)
        let subscribers: i64 = self
            .conn
            .publish(&self.config.channel, &payload)
            .await
            .context("Redis publish failed")?;
        debug!(
            "Published entry {} to channel {} ({} subscribers)",
            entry.index, self.config.channel, subscribers
        );

        // Also push to the catch-up queue, trimmed to its cap
        if let Some(ref queue_name) = self.config.queue_name {
            self.conn
                .lpush::<_, _, ()>(queue_name, &payload)
                .await
                .context("Redis queue push failed")?;
            self.conn
                .ltrim::<_, ()>(queue_name, 0, (self.config.max_queue_size - 1) as isize)
                .await
                .context("Redis queue trim failed")?;

            debug!("Pushed entry {} to queue {}", entry.index, queue_name);
        }

        Ok(())
    }
}
