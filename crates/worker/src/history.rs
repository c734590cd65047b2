use stockpulse_core::domain::market::{Company, HistoryPeriod};
use stockpulse_core::ingest::chart::ChartClient;
use stockpulse_core::storage::history::{replace_history, CompanyHistory};

/// Fetches every history period for `companies` and replaces the matching
/// tables. `pool = None` only fetches and logs. A failed period is logged and
/// the next one is still refreshed.
pub async fn refresh_history(
    pool: Option<&sqlx::PgPool>,
    chart: &ChartClient,
    companies: &[Company],
) -> u64 {
    let mut stored: u64 = 0;

    for period in HistoryPeriod::ALL {
        let mut series: Vec<CompanyHistory> = Vec::with_capacity(companies.len());
        for company in companies {
            match chart.fetch_chart(&company.symbol, period).await {
                Ok(c) => series.push(CompanyHistory {
                    title: company.name.clone(),
                    bars: c.bars,
                }),
                Err(err) => tracing::warn!(
                    symbol = %company.symbol,
                    %period,
                    error = %err,
                    "history fetch failed; company skipped"
                ),
            }
            tokio::time::sleep(chart.req_delay()).await;
        }

        let bars: usize = series.iter().map(|s| s.bars.len()).sum();
        let Some(pool) = pool else {
            tracing::info!(%period, companies = series.len(), bars, dry_run = true, "history fetched");
            continue;
        };

        match replace_history(pool, period, &series).await {
            Ok(n) => {
                stored += n;
                tracing::info!(%period, table = period.table(), rows = n, "history replaced");
            }
            Err(err) => tracing::error!(%period, error = %err, "history refresh failed"),
        }
    }

    stored
}
