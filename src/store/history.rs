use crate::core::{ImageRef, Message, MessageMarker, Role, SearchResult};
use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use std::future::Future;
use std::pin::Pin;

/// Conversation persistence.
///
/// `save_message` is an upsert: the orchestrator calls it once per streamed
/// delta with the same id and ever longer content.
pub trait HistoryStore: Send + Sync {
    fn save_message<'a>(
        &'a self,
        message: &'a Message,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

    fn delete_message<'a>(
        &'a self,
        id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + 'a>>;

    fn clear_all<'a>(&'a self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

    /// All messages, oldest first.
    fn get_all_messages<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Message>>> + Send + 'a>>;
}

pub struct SqliteHistoryStore {
    pool: SqlitePool,
}

impl SqliteHistoryStore {
    pub async fn new(pool: SqlitePool) -> Result<Self> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS messages (
                 id             TEXT PRIMARY KEY,
                 role           TEXT NOT NULL,
                 text           TEXT NOT NULL,
                 images         TEXT NOT NULL DEFAULT '[]',
                 reasoning_text TEXT,
                 quoted_text    TEXT,
                 model_name     TEXT,
                 timestamp      TEXT NOT NULL,
                 pending        INTEGER NOT NULL DEFAULT 0,
                 search_results TEXT NOT NULL DEFAULT '[]',
                 ocr_text       TEXT,
                 marker         TEXT
             )",
        )
        .execute(&pool)
        .await
        .context("create messages table")?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_messages_timestamp ON messages(timestamp)")
            .execute(&pool)
            .await
            .context("create messages index")?;

        Ok(Self { pool })
    }
}

fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    // Fixed width keeps lexical order equal to chronological order.
    timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn map_message_row(row: &SqliteRow) -> Result<Message> {
    let role_raw: String = row.try_get("role")?;
    let images_raw: String = row.try_get("images")?;
    let search_raw: String = row.try_get("search_results")?;
    let timestamp_raw: String = row.try_get("timestamp")?;
    let marker_raw: Option<String> = row.try_get("marker")?;
    let pending: i64 = row.try_get("pending")?;

    let images: Vec<ImageRef> =
        serde_json::from_str(&images_raw).context("deserialize message images")?;
    let search_results: Vec<SearchResult> =
        serde_json::from_str(&search_raw).context("deserialize message search results")?;
    let timestamp = DateTime::parse_from_rfc3339(&timestamp_raw)
        .with_context(|| format!("invalid message timestamp: {timestamp_raw}"))?
        .with_timezone(&Utc);
    let marker = marker_raw
        .map(|value| {
            value
                .parse::<MessageMarker>()
                .map_err(|_| anyhow::anyhow!("unknown message marker: {value}"))
        })
        .transpose()?;

    Ok(Message {
        id: row.try_get("id")?,
        role: role_raw
            .parse::<Role>()
            .map_err(|_| anyhow::anyhow!("unknown message role: {role_raw}"))?,
        text: row.try_get("text")?,
        images,
        reasoning_text: row.try_get("reasoning_text")?,
        quoted_text: row.try_get("quoted_text")?,
        model_name: row.try_get("model_name")?,
        timestamp,
        pending: pending != 0,
        search_results,
        ocr_text: row.try_get("ocr_text")?,
        marker,
    })
}

impl HistoryStore for SqliteHistoryStore {
    fn save_message<'a>(
        &'a self,
        message: &'a Message,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let images = serde_json::to_string(&message.images)?;
            let search_results = serde_json::to_string(&message.search_results)?;

            sqlx::query(
                "INSERT INTO messages
                     (id, role, text, images, reasoning_text, quoted_text, model_name,
                      timestamp, pending, search_results, ocr_text, marker)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                 ON CONFLICT(id) DO UPDATE SET
                     text           = excluded.text,
                     images         = excluded.images,
                     reasoning_text = excluded.reasoning_text,
                     quoted_text    = excluded.quoted_text,
                     model_name     = excluded.model_name,
                     pending        = excluded.pending,
                     search_results = excluded.search_results,
                     ocr_text       = excluded.ocr_text,
                     marker         = excluded.marker",
            )
            .bind(&message.id)
            .bind(message.role.to_string())
            .bind(&message.text)
            .bind(images)
            .bind(&message.reasoning_text)
            .bind(&message.quoted_text)
            .bind(&message.model_name)
            .bind(format_timestamp(&message.timestamp))
            .bind(i64::from(message.pending))
            .bind(search_results)
            .bind(&message.ocr_text)
            .bind(message.marker.map(|marker| marker.to_string()))
            .execute(&self.pool)
            .await
            .with_context(|| format!("save message {}", message.id))?;
            Ok(())
        })
    }

    fn delete_message<'a>(
        &'a self,
        id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + 'a>> {
        Box::pin(async move {
            let result = sqlx::query("DELETE FROM messages WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected() > 0)
        })
    }

    fn clear_all<'a>(&'a self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            sqlx::query("DELETE FROM messages")
                .execute(&self.pool)
                .await
                .context("clear messages")?;
            Ok(())
        })
    }

    fn get_all_messages<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Message>>> + Send + 'a>> {
        Box::pin(async move {
            let rows = sqlx::query(
                "SELECT id, role, text, images, reasoning_text, quoted_text, model_name,
                        timestamp, pending, search_results, ocr_text, marker
                 FROM messages
                 ORDER BY timestamp ASC, rowid ASC",
            )
            .fetch_all(&self.pool)
            .await
            .context("query messages")?;

            rows.iter().map(map_message_row).collect()
        })
    }
}
