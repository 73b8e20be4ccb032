use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::sqlite::SqlitePool;
use std::future::Future;
use std::pin::Pin;

/// Runtime-detected model capabilities. Flags only ever move from unset to set.
pub trait ModelCapabilityStore: Send + Sync {
    fn is_reasoning_detected<'a>(
        &'a self,
        model_key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + 'a>>;

    fn mark_reasoning_detected<'a>(
        &'a self,
        model_key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}

pub struct SqliteCapabilityStore {
    pool: SqlitePool,
}

impl SqliteCapabilityStore {
    pub async fn new(pool: SqlitePool) -> Result<Self> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS model_capabilities (
                 model_key          TEXT PRIMARY KEY,
                 reasoning_detected INTEGER NOT NULL DEFAULT 0,
                 detected_at        TEXT NOT NULL
             )",
        )
        .execute(&pool)
        .await
        .context("create model_capabilities table")?;

        Ok(Self { pool })
    }
}

impl ModelCapabilityStore for SqliteCapabilityStore {
    fn is_reasoning_detected<'a>(
        &'a self,
        model_key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + 'a>> {
        Box::pin(async move {
            let row: Option<(i64,)> = sqlx::query_as(
                "SELECT reasoning_detected FROM model_capabilities WHERE model_key = $1",
            )
            .bind(model_key)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("read capabilities for {model_key}"))?;
            Ok(row.is_some_and(|(flag,)| flag != 0))
        })
    }

    fn mark_reasoning_detected<'a>(
        &'a self,
        model_key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            // First detection time is kept on repeat marks.
            sqlx::query(
                "INSERT INTO model_capabilities (model_key, reasoning_detected, detected_at)
                 VALUES ($1, 1, $2)
                 ON CONFLICT(model_key) DO UPDATE SET reasoning_detected = 1",
            )
            .bind(model_key)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await
            .with_context(|| format!("mark {model_key} reasoning-capable"))?;
            Ok(())
        })
    }
}
