use crate::domain::market::{Company, ListingRow};
use crate::ingest::http::{build_client, env_secs, random_user_agent, selector};
use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};

const DEFAULT_LISTING_URL: &str = "https://finance.yahoo.com/most-active/";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

static ROW: Lazy<Selector> = Lazy::new(|| selector("table tbody tr"));
static SYMBOL_CELL: Lazy<Selector> = Lazy::new(|| selector(r#"td[aria-label="Symbol"]"#));
static QUOTE_LINK: Lazy<Selector> = Lazy::new(|| selector(r#"a[data-test="quoteLink"]"#));
static NAME_CELL: Lazy<Selector> = Lazy::new(|| selector(r#"td[aria-label="Name"]"#));
static CHANGE_CELL: Lazy<Selector> = Lazy::new(|| selector(r#"td[aria-label="Change"]"#));
static CHANGE_PCT_CELL: Lazy<Selector> = Lazy::new(|| selector(r#"td[aria-label="% Change"]"#));

#[derive(Debug, Clone)]
pub struct ListingClient {
    http: reqwest::Client,
    url: String,
}

impl ListingClient {
    pub fn from_env() -> Result<Self> {
        let url = std::env::var("LISTING_URL")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LISTING_URL.to_string());
        let http = build_client(env_secs("LISTING_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS))?;
        Ok(Self { http, url })
    }

    pub async fn fetch_listing(&self) -> Result<Vec<ListingRow>> {
        tracing::info!(url = %self.url, "fetching listing page");
        let res = self
            .http
            .get(&self.url)
            .header(reqwest::header::USER_AGENT, random_user_agent())
            .send()
            .await
            .context("listing request failed")?
            .error_for_status()
            .context("listing page returned an error status")?;
        let html = res.text().await.context("failed to read listing page")?;

        let rows = parse_listing(&html)?;
        tracing::info!(companies = rows.len(), "parsed listing page");
        Ok(rows)
    }
}

pub fn parse_listing(html: &str) -> Result<Vec<ListingRow>> {
    let doc = Html::parse_document(html);
    let mut out = Vec::new();
    let mut seen_rows = 0usize;

    for row in doc.select(&ROW) {
        seen_rows += 1;
        let Some(symbol) = symbol_of(row) else {
            tracing::warn!(row = seen_rows, "listing row without symbol; skipping");
            continue;
        };
        let Some(name) = cell_text(row, &NAME_CELL).map(|n| normalize_company_name(&n)) else {
            tracing::warn!(%symbol, "listing row without company name; skipping");
            continue;
        };

        let change_raw = cell_text(row, &CHANGE_CELL).unwrap_or_default();
        let change_pct_raw = cell_text(row, &CHANGE_PCT_CELL).unwrap_or_default();

        out.push(ListingRow {
            company: Company { symbol, name },
            change: parse_unsigned(&change_raw),
            change_pct: parse_unsigned(&change_pct_raw),
            growth: change_raw.starts_with('+'),
        });
    }

    anyhow::ensure!(seen_rows > 0, "no rows found in the listing table");
    Ok(out)
}

fn symbol_of(row: ElementRef<'_>) -> Option<String> {
    row.select(&QUOTE_LINK)
        .next()
        .map(element_text)
        .or_else(|| cell_text(row, &SYMBOL_CELL))
        .filter(|s| !s.is_empty())
}

fn cell_text(row: ElementRef<'_>, sel: &Selector) -> Option<String> {
    row.select(sel)
        .next()
        .map(element_text)
        .filter(|s| !s.is_empty())
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// Drops the sign and formatting: "+1,234.5" -> 1234.5, "-2.10%" -> 2.1.
fn parse_unsigned(raw: &str) -> f64 {
    raw.trim()
        .trim_start_matches(['+', '-'])
        .trim_end_matches('%')
        .replace(',', "")
        .parse::<f64>()
        .unwrap_or(0.0)
}

pub fn normalize_company_name(name: &str) -> String {
    name.replace(", Inc.", "").replace(" Inc.", "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
<html><body><table><tbody>
  <tr>
    <td aria-label="Symbol"><a data-test="quoteLink" href="/quote/NVDA">NVDA</a></td>
    <td aria-label="Name">NVIDIA Corporation</td>
    <td aria-label="Change"><span>+3.21</span></td>
    <td aria-label="% Change"><span>+2.75%</span></td>
  </tr>
  <tr>
    <td aria-label="Symbol"><a data-test="quoteLink" href="/quote/AAPL">AAPL</a></td>
    <td aria-label="Name">Apple Inc.</td>
    <td aria-label="Change"><span>-1,010.50</span></td>
    <td aria-label="% Change"><span>-0.40%</span></td>
  </tr>
  <tr>
    <td aria-label="Symbol"></td>
    <td aria-label="Name">Ghost Row</td>
  </tr>
</tbody></table></body></html>"#;

    #[test]
    fn parses_listing_rows() {
        let rows = parse_listing(PAGE).unwrap();
        assert_eq!(rows.len(), 2);

        assert_eq!(rows[0].company.symbol, "NVDA");
        assert_eq!(rows[0].company.name, "NVIDIA Corporation");
        assert_eq!(rows[0].change, 3.21);
        assert_eq!(rows[0].change_pct, 2.75);
        assert!(rows[0].growth);

        assert_eq!(rows[1].company.name, "Apple");
        assert_eq!(rows[1].change, 1010.5);
        assert_eq!(rows[1].change_pct, 0.4);
        assert!(!rows[1].growth);
    }

    #[test]
    fn empty_table_is_an_error() {
        assert!(parse_listing("<table><tbody></tbody></table>").is_err());
    }

    #[test]
    fn strips_inc_suffixes() {
        assert_eq!(normalize_company_name("Tesla, Inc."), "Tesla");
        assert_eq!(normalize_company_name("Apple Inc."), "Apple");
        assert_eq!(normalize_company_name("Intel Corporation"), "Intel Corporation");
    }
}
