use crate::pipeline::RunSummary;
use anyhow::Context;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Succeeded,
    Failed,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
        }
    }
}

fn count(v: usize) -> i32 {
    i32::try_from(v).unwrap_or(i32::MAX)
}

/// Appends one row to `news_analysis_runs` and returns its id.
pub async fn record_run(
    pool: &sqlx::PgPool,
    summary: &RunSummary,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    status: RunStatus,
    error: Option<&str>,
) -> anyhow::Result<uuid::Uuid> {
    let id = uuid::Uuid::new_v4();
    sqlx::query(
        "INSERT INTO news_analysis_runs \
         (id, started_at, finished_at, status, companies, articles_rated, article_failures, \
          companies_without_sentiment, company_failures, error) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
    )
    .bind(id)
    .bind(started_at)
    .bind(finished_at)
    .bind(status.as_str())
    .bind(count(summary.companies))
    .bind(count(summary.articles_rated))
    .bind(count(summary.article_failures))
    .bind(count(summary.companies_without_sentiment))
    .bind(count(summary.company_failures))
    .bind(error)
    .execute(pool)
    .await
    .context("insert news_analysis_runs failed")?;

    tracing::info!(run_id = %id, status = status.as_str(), "analysis run recorded");
    Ok(id)
}
