use crate::domain::market::StockQuote;
use crate::storage::batch_size;
use anyhow::Context;

/// Replaces the listing wholesale. News and compound rows reference stocks,
/// so they are cleared in the same transaction.
pub async fn replace_stocks(pool: &sqlx::PgPool, quotes: &[StockQuote]) -> anyhow::Result<u64> {
    anyhow::ensure!(!quotes.is_empty(), "no company data to store");

    let mut tx = pool.begin().await.context("begin transaction failed")?;

    sqlx::query("TRUNCATE stock_compound, stock_news, stocks RESTART IDENTITY")
        .persistent(false)
        .execute(&mut *tx)
        .await
        .context("clear stocks and dependents failed")?;

    let mut affected: u64 = 0;
    for chunk in quotes.chunks(batch_size()?) {
        let mut qb = sqlx::QueryBuilder::new(
            "INSERT INTO stocks (symbol, title, last, high, low, volume, change, change_pct, growth) ",
        );
        qb.push_values(chunk, |mut b, q| {
            b.push_bind(q.company.symbol.trim())
                .push_bind(q.company.name.trim())
                .push_bind(q.last)
                .push_bind(q.high)
                .push_bind(q.low)
                .push_bind(q.volume)
                .push_bind(q.change)
                .push_bind(q.change_pct)
                .push_bind(q.growth);
        });

        let res = qb
            .build()
            .persistent(false)
            .execute(&mut *tx)
            .await
            .context("batch insert stocks failed")?;
        affected += res.rows_affected();
    }

    tx.commit().await.context("commit transaction failed")?;
    tracing::info!(stocks = affected, "companies updated");
    Ok(affected)
}
