use stockpulse_core::domain::market::{HistoryPeriod, ListingRow, StockQuote};
use stockpulse_core::ingest::chart::{build_quote, ChartClient};

/// Completes listing rows with the latest price, day range and volume from the
/// chart endpoint. Rows whose chart cannot be fetched or lacks a price are
/// dropped with a warning.
pub async fn collect_quotes(chart: &ChartClient, rows: Vec<ListingRow>) -> Vec<StockQuote> {
    let mut quotes = Vec::with_capacity(rows.len());

    for row in rows {
        let symbol = row.company.symbol.clone();
        match chart.fetch_chart(&symbol, HistoryPeriod::Day).await {
            Ok(c) => match build_quote(row, &c) {
                Some(q) => quotes.push(q),
                None => tracing::warn!(%symbol, "chart has no price data; company skipped"),
            },
            Err(err) => tracing::warn!(%symbol, error = %err, "quote fetch failed; company skipped"),
        }
        tokio::time::sleep(chart.req_delay()).await;
    }

    tracing::info!(quotes = quotes.len(), "listing quotes collected");
    quotes
}
