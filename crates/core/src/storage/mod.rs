use anyhow::Context;

pub mod history;
pub mod lock;
pub mod news;
pub mod runs;
pub mod stocks;

pub async fn migrate(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("sqlx migrations failed")?;
    Ok(())
}

/// Rows per multi-row INSERT, from `HISTORY_UPSERT_BATCH` (default 500).
pub(crate) fn batch_size() -> anyhow::Result<usize> {
    let chunk_size: usize = std::env::var("HISTORY_UPSERT_BATCH")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(500);
    anyhow::ensure!(chunk_size >= 1, "HISTORY_UPSERT_BATCH must be >= 1");
    Ok(chunk_size)
}
