use crate::domain::sentiment::{CompoundSentiment, RatedArticle};
use crate::storage::batch_size;
use anyhow::{Context, Result};

/// Per-company persistence of analysis results. Both operations delete the
/// company's existing rows and insert the new ones atomically; an unknown
/// company is a warning and writes nothing.
#[async_trait::async_trait]
pub trait SentimentStore: Send + Sync {
    async fn replace_company_news(&self, company: &str, articles: &[RatedArticle]) -> Result<u64>;

    async fn replace_compound_sentiment(
        &self,
        company: &str,
        sentiment: CompoundSentiment,
    ) -> Result<u64>;
}

#[derive(Debug, Clone)]
pub struct PgSentimentStore {
    pool: sqlx::PgPool,
}

impl PgSentimentStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

async fn find_stock_id(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    company: &str,
) -> Result<Option<i32>> {
    let ids: Vec<i32> = sqlx::query_scalar("SELECT id FROM stocks WHERE title = $1 ORDER BY id")
        .bind(company)
        .fetch_all(&mut **tx)
        .await
        .with_context(|| format!("lookup stock id failed for {company}"))?;
    Ok(pick_stock_id(company, &ids))
}

/// Rows are keyed by company name; when several listings share a name (share
/// classes such as GOOG/GOOGL) the lowest id wins.
fn pick_stock_id(company: &str, ids: &[i32]) -> Option<i32> {
    if ids.len() > 1 {
        tracing::warn!(%company, matches = ids.len(), ?ids, "company name matches several stocks; using the first");
    }
    ids.first().copied()
}

#[async_trait::async_trait]
impl SentimentStore for PgSentimentStore {
    async fn replace_company_news(&self, company: &str, articles: &[RatedArticle]) -> Result<u64> {
        let mut tx = self.pool.begin().await.context("begin transaction failed")?;

        let Some(stock_id) = find_stock_id(&mut tx, company).await? else {
            tracing::warn!(%company, "stock not found in stocks table; news not stored");
            return Ok(0);
        };

        sqlx::query("DELETE FROM stock_news WHERE stock_id = $1")
            .bind(stock_id)
            .execute(&mut *tx)
            .await
            .context("delete stock_news failed")?;

        let mut affected: u64 = 0;
        for chunk in articles.chunks(batch_size()?) {
            let mut qb = sqlx::QueryBuilder::new(
                "INSERT INTO stock_news (stock_id, title, link, summary, decrease, increase, informativeness) ",
            );
            qb.push_values(chunk, |mut b, a| {
                b.push_bind(stock_id)
                    .push_bind(a.title.trim())
                    .push_bind(a.link.as_str())
                    .push_bind(a.summary.as_str())
                    .push_bind(a.rating.decrease)
                    .push_bind(a.rating.increase)
                    .push_bind(a.rating.informativeness);
            });

            let res = qb
                .build()
                .persistent(false)
                .execute(&mut *tx)
                .await
                .context("batch insert stock_news failed")?;
            affected += res.rows_affected();
        }

        tx.commit().await.context("commit transaction failed")?;
        tracing::info!(%company, rows = affected, "stock news replaced");
        Ok(affected)
    }

    async fn replace_compound_sentiment(
        &self,
        company: &str,
        sentiment: CompoundSentiment,
    ) -> Result<u64> {
        let mut tx = self.pool.begin().await.context("begin transaction failed")?;

        let Some(stock_id) = find_stock_id(&mut tx, company).await? else {
            tracing::warn!(%company, "stock not found in stocks table; compound not stored");
            return Ok(0);
        };

        sqlx::query("DELETE FROM stock_compound WHERE stock_id = $1")
            .bind(stock_id)
            .execute(&mut *tx)
            .await
            .context("delete stock_compound failed")?;

        let res = sqlx::query(
            "INSERT INTO stock_compound (stock_id, fall_probability, rise_probability) \
             VALUES ($1, $2, $3)",
        )
        .bind(stock_id)
        .bind(sentiment.fall_probability)
        .bind(sentiment.rise_probability)
        .execute(&mut *tx)
        .await
        .context("insert stock_compound failed")?;

        tx.commit().await.context("commit transaction failed")?;
        tracing::info!(
            %company,
            fall = sentiment.fall_probability,
            rise = sentiment.rise_probability,
            "stock compound replaced"
        );
        Ok(res.rows_affected())
    }
}

/// Stand-in used by `--dry-run`: logs what would be written and touches nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunStore;

#[async_trait::async_trait]
impl SentimentStore for DryRunStore {
    async fn replace_company_news(&self, company: &str, articles: &[RatedArticle]) -> Result<u64> {
        for a in articles {
            tracing::info!(
                %company,
                title = %a.title,
                link = %a.link,
                decrease = a.rating.decrease,
                increase = a.rating.increase,
                informativeness = a.rating.informativeness,
                "dry run: rated article"
            );
        }
        Ok(articles.len() as u64)
    }

    async fn replace_compound_sentiment(
        &self,
        company: &str,
        sentiment: CompoundSentiment,
    ) -> Result<u64> {
        tracing::info!(
            %company,
            fall = sentiment.fall_probability,
            rise = sentiment.rise_probability,
            "dry run: compound sentiment"
        );
        Ok(1)
    }
}
