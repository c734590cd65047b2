use crate::domain::market::Company;
use crate::domain::sentiment::Article;
use crate::ingest::http::{build_client, env_secs, random_user_agent, selector};
use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde::Deserialize;

const DEFAULT_SEARCH_BASE_URL: &str = "https://query2.finance.yahoo.com";
const DEFAULT_ARTICLE_TIMEOUT_SECS: u64 = 40;
const DEFAULT_NEWS_COUNT: u32 = 10;
const MIN_PARAGRAPHS: usize = 2;

static READ_MORE: Lazy<Selector> = Lazy::new(|| selector("a.caas-readmore"));
static LEAD_TITLE: Lazy<Selector> = Lazy::new(|| selector("h1#caas-lead-header-undefined"));
static ANY_TITLE: Lazy<Selector> = Lazy::new(|| selector("h1"));
static BODY_PARAGRAPHS: Lazy<[Selector; 3]> = Lazy::new(|| {
    [
        selector("div.caas-body p"),
        selector("div.morpheusGridBody p"),
        selector("article p"),
    ]
});

/// Where candidate articles for a company come from.
#[async_trait::async_trait]
pub trait ArticleSource: Send + Sync {
    async fn list_article_links(&self, company: &Company) -> Result<Vec<String>>;

    /// `Ok(None)` when the page exists but carries no usable article.
    async fn fetch_article(&self, company: &Company, link: &str) -> Result<Option<Article>>;
}

#[derive(Debug, Clone)]
pub struct YahooNewsSource {
    search_http: reqwest::Client,
    article_http: reqwest::Client,
    search_base_url: String,
    news_count: u32,
}

impl YahooNewsSource {
    pub fn from_env() -> Result<Self> {
        let search_base_url = std::env::var("YAHOO_SEARCH_BASE_URL")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SEARCH_BASE_URL.to_string());
        let news_count = std::env::var("NEWS_COUNT")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_NEWS_COUNT);

        Ok(Self {
            search_http: build_client(env_secs("YAHOO_SEARCH_TIMEOUT_SECS", 30))?,
            article_http: build_client(env_secs(
                "ARTICLE_FETCH_TIMEOUT_SECS",
                DEFAULT_ARTICLE_TIMEOUT_SECS,
            ))?,
            search_base_url,
            news_count,
        })
    }
}

#[async_trait::async_trait]
impl ArticleSource for YahooNewsSource {
    async fn list_article_links(&self, company: &Company) -> Result<Vec<String>> {
        let url = format!("{}/v1/finance/search", self.search_base_url.trim_end_matches('/'));
        let news_count = self.news_count.to_string();
        let text = self
            .search_http
            .get(url)
            .header(reqwest::header::USER_AGENT, random_user_agent())
            .query(&[
                ("q", company.symbol.as_str()),
                ("quotesCount", "0"),
                ("newsCount", news_count.as_str()),
            ])
            .send()
            .await
            .with_context(|| format!("news search failed for {}", company.symbol))?
            .error_for_status()
            .with_context(|| format!("news search returned an error for {}", company.symbol))?
            .text()
            .await
            .context("failed to read news search response")?;

        parse_search_links(&text)
    }

    async fn fetch_article(&self, company: &Company, link: &str) -> Result<Option<Article>> {
        let res = self
            .article_http
            .get(link)
            .header(reqwest::header::USER_AGENT, random_user_agent())
            .send()
            .await
            .with_context(|| format!("article request failed: {link}"))?;

        let status = res.status();
        if !status.is_success() {
            tracing::warn!(company = %company.name, %link, %status, "article page unavailable");
            return Ok(None);
        }
        let html = res.text().await.context("failed to read article page")?;

        Ok(extract_article(&html).map(|(title, text)| Article {
            company: company.name.clone(),
            link: link.to_string(),
            title,
            text,
        }))
    }
}

pub fn parse_search_links(raw: &str) -> Result<Vec<String>> {
    let parsed: SearchResponse =
        serde_json::from_str(raw).context("news search response is not valid JSON")?;

    let mut links: Vec<String> = Vec::with_capacity(parsed.news.len());
    for item in parsed.news {
        let link = item.link.trim().to_string();
        if !link.is_empty() && !links.contains(&link) {
            links.push(link);
        }
    }
    Ok(links)
}

/// Pulls (title, body text) out of an article page. Returns `None` for
/// collapsed "read more" stubs, pages without a headline, and bodies shorter
/// than two paragraphs.
pub fn extract_article(html: &str) -> Option<(String, String)> {
    let doc = Html::parse_document(html);

    if doc.select(&READ_MORE).next().is_some() {
        return None;
    }

    let title = doc
        .select(&LEAD_TITLE)
        .next()
        .or_else(|| doc.select(&ANY_TITLE).next())
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())?;

    for sel in BODY_PARAGRAPHS.iter() {
        let paragraphs: Vec<String> = doc
            .select(sel)
            .map(|p| p.text().collect::<String>().trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        if paragraphs.len() >= MIN_PARAGRAPHS {
            return Some((title, paragraphs.join(" ")));
        }
    }

    None
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    news: Vec<SearchNewsItem>,
}

#[derive(Debug, Deserialize)]
struct SearchNewsItem {
    #[serde(default)]
    link: String,
}
