use crate::domain::market::{HistoryPeriod, PriceBar};
use crate::storage::batch_size;
use anyhow::Context;

/// Bars for one company, keyed by its stored title.
#[derive(Debug, Clone)]
pub struct CompanyHistory {
    pub title: String,
    pub bars: Vec<PriceBar>,
}

/// Truncates the period's table and bulk-inserts all bars in one transaction.
pub async fn replace_history(
    pool: &sqlx::PgPool,
    period: HistoryPeriod,
    series: &[CompanyHistory],
) -> anyhow::Result<u64> {
    let rows: Vec<(&str, &PriceBar)> = series
        .iter()
        .flat_map(|s| s.bars.iter().map(move |b| (s.title.as_str(), b)))
        .collect();
    anyhow::ensure!(!rows.is_empty(), "no {period} history to store");

    let table = period.table();
    let mut tx = pool.begin().await.context("begin transaction failed")?;

    sqlx::query(&format!("TRUNCATE {table} RESTART IDENTITY"))
        .persistent(false)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("clear {table} failed"))?;

    let mut affected: u64 = 0;
    let mut batch_idx: usize = 0;
    for chunk in rows.chunks(batch_size()?) {
        batch_idx += 1;
        let t0 = std::time::Instant::now();
        let mut qb = sqlx::QueryBuilder::new(format!(
            "INSERT INTO {table} (title, open, high, low, close, volume, date) "
        ));
        qb.push_values(chunk, |mut b, (title, bar)| {
            b.push_bind(*title)
                .push_bind(bar.open)
                .push_bind(bar.high)
                .push_bind(bar.low)
                .push_bind(bar.close)
                .push_bind(bar.volume)
                .push_bind(bar.date);
        });

        let res = qb
            .build()
            .persistent(false)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("batch insert {table} failed"))?;
        affected += res.rows_affected();

        tracing::debug!(
            %period,
            batch_idx,
            batch_size = chunk.len(),
            elapsed_ms = t0.elapsed().as_millis(),
            "history batch insert"
        );
    }

    tx.commit().await.context("commit transaction failed")?;
    Ok(affected)
}
