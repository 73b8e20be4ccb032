use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;
use std::future::Future;
use std::pin::Pin;
use uuid::Uuid;

/// Token accounting sink. Called once per frame that carries usage, so
/// vendors reporting cumulative usage produce several rows per stream.
pub trait UsageRecorder: Send + Sync {
    fn log_usage<'a>(
        &'a self,
        provider: &'a str,
        model: &'a str,
        input_tokens: u64,
        output_tokens: u64,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageSummary {
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_estimated_cost_micros: i64,
    pub record_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelUsage {
    pub provider: String,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub estimated_cost_micros: i64,
    pub record_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelPricing {
    pub model_pattern: String,
    pub input_cost_per_million: f64,
    pub output_cost_per_million: f64,
}

impl ModelPricing {
    fn new(model_pattern: &str, input_cost_per_million: f64, output_cost_per_million: f64) -> Self {
        Self {
            model_pattern: model_pattern.to_string(),
            input_cost_per_million,
            output_cost_per_million,
        }
    }

    #[must_use]
    pub fn estimate_cost_micros(&self, input_tokens: u64, output_tokens: u64) -> i64 {
        let input_cost = i128::from(input_tokens)
            * i128::from(micros_per_million(self.input_cost_per_million))
            / 1_000_000;
        let output_cost = i128::from(output_tokens)
            * i128::from(micros_per_million(self.output_cost_per_million))
            / 1_000_000;
        i64::try_from(input_cost + output_cost).unwrap_or(i64::MAX)
    }
}

fn micros_per_million(cost_per_million: f64) -> i64 {
    let scaled = (cost_per_million * 1_000_000.0).round();
    format!("{scaled:.0}").parse::<i64>().unwrap_or_default()
}

/// USD list prices per million tokens for common models.
#[must_use]
pub fn default_pricing() -> Vec<ModelPricing> {
    vec![
        ModelPricing::new("gpt-4o", 2.5, 10.0),
        ModelPricing::new("gpt-4o-mini", 0.15, 0.6),
        ModelPricing::new("gpt-4.1", 2.0, 8.0),
        ModelPricing::new("gpt-4.1-mini", 0.4, 1.6),
        ModelPricing::new("o3-mini", 1.1, 4.4),
        ModelPricing::new("claude-sonnet-4", 3.0, 15.0),
        ModelPricing::new("claude-3-5-haiku", 0.8, 4.0),
        ModelPricing::new("claude-opus-4", 15.0, 75.0),
        ModelPricing::new("gemini-2.0-flash", 0.1, 0.4),
        ModelPricing::new("gemini-2.5-pro", 1.25, 10.0),
        ModelPricing::new("deepseek-chat", 0.27, 1.1),
        ModelPricing::new("deepseek-reasoner", 0.55, 2.19),
    ]
}

/// Most specific pricing entry whose pattern occurs in `model`.
#[must_use]
pub fn lookup_pricing<'a>(model: &str, pricing_table: &'a [ModelPricing]) -> Option<&'a ModelPricing> {
    pricing_table
        .iter()
        .filter(|pricing| model.contains(&pricing.model_pattern))
        .max_by_key(|pricing| pricing.model_pattern.len())
}

pub struct SqliteUsageRecorder {
    pool: SqlitePool,
    pricing: Vec<ModelPricing>,
}

impl SqliteUsageRecorder {
    pub async fn new(pool: SqlitePool) -> Result<Self> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS usage_records (
                 id                    TEXT PRIMARY KEY,
                 provider              TEXT NOT NULL,
                 model                 TEXT NOT NULL,
                 input_tokens          INTEGER NOT NULL,
                 output_tokens         INTEGER NOT NULL,
                 estimated_cost_micros INTEGER,
                 created_at            TEXT NOT NULL
             )",
        )
        .execute(&pool)
        .await
        .context("create usage_records table")?;

        Ok(Self {
            pool,
            pricing: default_pricing(),
        })
    }

    #[must_use]
    pub fn with_pricing(mut self, pricing: Vec<ModelPricing>) -> Self {
        self.pricing = pricing;
        self
    }

    pub async fn summary(&self) -> Result<UsageSummary> {
        let (input, output, cost, count): (i64, i64, i64, i64) = sqlx::query_as(
            "SELECT COALESCE(SUM(input_tokens), 0),
                    COALESCE(SUM(output_tokens), 0),
                    COALESCE(SUM(estimated_cost_micros), 0),
                    COUNT(*)
             FROM usage_records",
        )
        .fetch_one(&self.pool)
        .await
        .context("summarize usage")?;

        Ok(UsageSummary {
            total_input_tokens: to_u64(input),
            total_output_tokens: to_u64(output),
            total_estimated_cost_micros: cost,
            record_count: to_u64(count),
        })
    }

    pub async fn summary_by_model(&self) -> Result<Vec<ModelUsage>> {
        let rows: Vec<(String, String, i64, i64, i64, i64)> = sqlx::query_as(
            "SELECT provider, model,
                    SUM(input_tokens), SUM(output_tokens),
                    COALESCE(SUM(estimated_cost_micros), 0), COUNT(*)
             FROM usage_records
             GROUP BY provider, model
             ORDER BY provider, model",
        )
        .fetch_all(&self.pool)
        .await
        .context("summarize usage by model")?;

        Ok(rows
            .into_iter()
            .map(|(provider, model, input, output, cost, count)| ModelUsage {
                provider,
                model,
                input_tokens: to_u64(input),
                output_tokens: to_u64(output),
                estimated_cost_micros: cost,
                record_count: to_u64(count),
            })
            .collect())
    }
}

fn to_u64(value: i64) -> u64 {
    u64::try_from(value).unwrap_or_default()
}

impl UsageRecorder for SqliteUsageRecorder {
    fn log_usage<'a>(
        &'a self,
        provider: &'a str,
        model: &'a str,
        input_tokens: u64,
        output_tokens: u64,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let cost = lookup_pricing(model, &self.pricing)
                .map(|pricing| pricing.estimate_cost_micros(input_tokens, output_tokens));

            sqlx::query(
                "INSERT INTO usage_records
                     (id, provider, model, input_tokens, output_tokens, estimated_cost_micros, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(Uuid::new_v4().to_string())
            .bind(provider)
            .bind(model)
            .bind(i64::try_from(input_tokens).unwrap_or(i64::MAX))
            .bind(i64::try_from(output_tokens).unwrap_or(i64::MAX))
            .bind(cost)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await
            .context("insert usage record")?;
            Ok(())
        })
    }
}
