// src/database/postgres.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use tracing::{debug, info};

use super::MatchStore;
use crate::types::MatchRecord;

/// PostgreSQL-backed match and checkpoint storage.
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        info!("Connecting to PostgreSQL database");

        // sqlx 0.8.x rejects the 'channel_binding' parameter that some
        // hosted providers put in their connection strings
        let cleaned_url = Self::clean_connection_string(database_url);

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(&cleaned_url)
            .await
            .context("Failed to connect to PostgreSQL database")?;

        info!("Connected to PostgreSQL successfully");

        Ok(Self { pool })
    }

    /// Remove connection string parameters sqlx does not recognize.
    fn clean_connection_string(url_str: &str) -> String {
        use url::Url;

        if let Ok(mut url) = Url::parse(url_str) {
            let unsupported_params = ["channel_binding"];

            let cleaned_pairs: Vec<(String, String)> = url
                .query_pairs()
                .filter(|(key, _)| !unsupported_params.contains(&key.as_ref()))
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();

            url.query_pairs_mut().clear();
            for (key, value) in cleaned_pairs {
                url.query_pairs_mut().append_pair(&key, &value);
            }

            url.to_string()
        } else {
            url_str.to_string()
        }
    }

    /// Create the schema when it does not exist yet.
    pub async fn migrate(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS checkpoints (
                log_uri TEXT PRIMARY KEY,
                last_index BIGINT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create checkpoints table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS matched_certificates (
                id BIGSERIAL PRIMARY KEY,
                log_uri TEXT NOT NULL,
                log_index BIGINT NOT NULL,
                kind TEXT NOT NULL,
                subject_cn TEXT,
                issuer_cn TEXT,
                dns_names TEXT[] NOT NULL,
                serial TEXT NOT NULL,
                not_before BIGINT,
                not_after BIGINT,
                sha256 TEXT NOT NULL,
                pem TEXT NOT NULL,
                seen_at BIGINT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                UNIQUE (log_uri, log_index)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create matched_certificates table")?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_matched_certificates_sha256
            ON matched_certificates(sha256)
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create index on sha256")?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_matched_certificates_seen_at
            ON matched_certificates(seen_at DESC)
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create index on seen_at")?;

        info!("Database migrations completed successfully");

        Ok(())
    }

    /// Close the connection pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl MatchStore for PostgresStore {
    async fn insert_match(&self, log_uri: &str, record: &MatchRecord) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO matched_certificates (
                log_uri, log_index, kind, subject_cn, issuer_cn, dns_names,
                serial, not_before, not_after, sha256, pem, seen_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (log_uri, log_index) DO NOTHING
            "#,
        )
        .bind(log_uri)
        .bind(record.log_index)
        .bind(record.kind.to_string())
        .bind(&record.subject_cn)
        .bind(&record.issuer_cn)
        .bind(&record.dns_names)
        .bind(&record.serial)
        .bind(record.not_before)
        .bind(record.not_after)
        .bind(&record.sha256)
        .bind(&record.pem)
        .bind(record.seen_at)
        .execute(&self.pool)
        .await
        .context("Failed to insert match into database")?;

        if result.rows_affected() == 0 {
            debug!("Match at index {} already stored, skipped", record.log_index);
        } else {
            debug!("Saved match at index {} to database", record.log_index);
        }

        Ok(())
    }

    async fn load_checkpoint(&self, log_uri: &str) -> Result<Option<i64>> {
        let row = sqlx::query(
            r#"
            SELECT last_index FROM checkpoints WHERE log_uri = $1
            "#,
        )
        .bind(log_uri)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to load checkpoint")?;

        Ok(row.map(|r| r.get::<i64, _>("last_index")))
    }

    async fn save_checkpoint(&self, log_uri: &str, last_index: i64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO checkpoints (log_uri, last_index, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (log_uri)
            DO UPDATE SET last_index = $2, updated_at = NOW()
            "#,
        )
        .bind(log_uri)
        .bind(last_index)
        .execute(&self.pool)
        .await
        .context("Failed to save checkpoint")?;

        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .context("Database ping failed")?;

        Ok(())
    }
}
