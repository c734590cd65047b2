use crate::analysis::aggregate::aggregate;
use crate::analysis::analyzer::ArticleAnalyzer;
use crate::domain::market::Company;
use crate::domain::sentiment::{CompanyRatingBatch, RatedArticle};
use crate::ingest::news::ArticleSource;
use crate::llm::LlmClient;
use crate::storage::news::SentimentStore;
use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineOptions {
    /// `None` analyzes every link the source returns.
    pub max_articles_per_company: Option<usize>,
}

impl PipelineOptions {
    pub fn from_env() -> Self {
        Self {
            max_articles_per_company: std::env::var("NEWS_MAX_ARTICLES_PER_COMPANY")
                .ok()
                .and_then(|s| s.parse::<usize>().ok())
                .filter(|n| *n >= 1),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub companies: usize,
    pub articles_rated: usize,
    pub article_failures: usize,
    pub companies_without_sentiment: usize,
    pub company_failures: usize,
}

/// Rated articles for one company plus the number of articles that failed.
#[derive(Debug, Clone)]
pub struct CompanyAnalysis {
    pub batch: CompanyRatingBatch,
    pub article_failures: usize,
}

pub struct NewsPipeline<C> {
    analyzer: ArticleAnalyzer<C>,
    source: Arc<dyn ArticleSource>,
    store: Arc<dyn SentimentStore>,
    options: PipelineOptions,
}

impl<C: LlmClient> NewsPipeline<C> {
    pub fn new(
        analyzer: ArticleAnalyzer<C>,
        source: Arc<dyn ArticleSource>,
        store: Arc<dyn SentimentStore>,
    ) -> Self {
        Self {
            analyzer,
            source,
            store,
            options: PipelineOptions::default(),
        }
    }

    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    /// Rates every usable article for `company`. Only a failure to list links
    /// is an error; per-article problems are logged and counted.
    pub async fn analyze_company(&self, company: &Company) -> Result<CompanyAnalysis> {
        let mut links = self
            .source
            .list_article_links(company)
            .await
            .with_context(|| format!("listing news links failed for {}", company.name))?;
        if let Some(max) = self.options.max_articles_per_company {
            links.truncate(max);
        }
        tracing::info!(company = %company.name, links = links.len(), "analyzing company news");

        let mut batch = CompanyRatingBatch::new(company.name.clone());
        let mut article_failures = 0usize;

        for link in &links {
            let article = match self.source.fetch_article(company, link).await {
                Ok(Some(article)) => article,
                Ok(None) => {
                    tracing::info!(company = %company.name, %link, "no usable article; skipped");
                    continue;
                }
                Err(err) => {
                    article_failures += 1;
                    tracing::warn!(
                        company = %company.name,
                        %link,
                        error = %err,
                        "article fetch failed; skipped"
                    );
                    continue;
                }
            };

            match self.analyzer.analyze(&article.text, &company.name).await {
                Ok((summary, rating)) => {
                    tracing::info!(
                        company = %company.name,
                        %link,
                        decrease = rating.decrease,
                        increase = rating.increase,
                        informativeness = rating.informativeness,
                        "article rated"
                    );
                    batch.push(RatedArticle {
                        title: article.title,
                        link: article.link,
                        summary,
                        rating,
                    });
                }
                Err(err) => {
                    article_failures += 1;
                    tracing::warn!(
                        company = %company.name,
                        %link,
                        attempts = err.attempts(),
                        error = %err,
                        "article analysis failed; skipped"
                    );
                }
            }
        }

        Ok(CompanyAnalysis {
            batch,
            article_failures,
        })
    }

    pub async fn run(&self, companies: &[Company]) -> RunSummary {
        let mut summary = RunSummary::default();

        for company in companies {
            summary.companies += 1;

            let analysis = match self.analyze_company(company).await {
                Ok(a) => a,
                Err(err) => {
                    summary.company_failures += 1;
                    tracing::error!(company = %company.name, error = %err, "company analysis failed");
                    continue;
                }
            };
            summary.articles_rated += analysis.batch.articles.len();
            summary.article_failures += analysis.article_failures;

            if let Err(err) = self.persist(&analysis.batch, &mut summary).await {
                summary.company_failures += 1;
                tracing::error!(company = %company.name, error = %err, "persisting company results failed");
            }
        }

        tracing::info!(
            companies = summary.companies,
            articles_rated = summary.articles_rated,
            article_failures = summary.article_failures,
            companies_without_sentiment = summary.companies_without_sentiment,
            company_failures = summary.company_failures,
            "news analysis finished"
        );
        summary
    }

    async fn persist(&self, batch: &CompanyRatingBatch, summary: &mut RunSummary) -> Result<()> {
        self.store
            .replace_company_news(&batch.company, &batch.articles)
            .await?;

        match aggregate(&batch.ratings()) {
            Ok(sentiment) => {
                self.store
                    .replace_compound_sentiment(&batch.company, sentiment)
                    .await?;
            }
            Err(err) => {
                summary.companies_without_sentiment += 1;
                tracing::warn!(company = %batch.company, error = %err, "compound sentiment skipped");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::sentiment::{Article, CompoundSentiment};
    use crate::llm::dispatch::testing::{dispatcher, RecordingSleeper, Scripted, ScriptedClient};
    use std::collections::HashMap;
    use std::sync::Mutex;

    enum Page {
        Body(&'static str),
        Missing,
        Broken,
    }

    #[derive(Default)]
    struct FakeSource {
        links: HashMap<&'static str, Vec<&'static str>>,
        pages: HashMap<&'static str, Page>,
    }

    #[async_trait::async_trait]
    impl ArticleSource for FakeSource {
        async fn list_article_links(&self, company: &Company) -> Result<Vec<String>> {
            match self.links.get(company.symbol.as_str()) {
                Some(links) => Ok(links.iter().map(|l| l.to_string()).collect()),
                None => Err(anyhow::anyhow!("search unavailable")),
            }
        }

        async fn fetch_article(&self, company: &Company, link: &str) -> Result<Option<Article>> {
            match self.pages.get(link) {
                Some(Page::Body(text)) => Ok(Some(Article {
                    company: company.name.clone(),
                    link: link.to_string(),
                    title: format!("title of {link}"),
                    text: text.to_string(),
                })),
                Some(Page::Missing) | None => Ok(None),
                Some(Page::Broken) => Err(anyhow::anyhow!("timed out")),
            }
        }
    }

    #[derive(Default)]
    struct FakeStore {
        news: Mutex<Vec<(String, Vec<RatedArticle>)>>,
        compound: Mutex<Vec<(String, CompoundSentiment)>>,
        fail_news: bool,
    }

    #[async_trait::async_trait]
    impl SentimentStore for FakeStore {
        async fn replace_company_news(&self, company: &str, articles: &[RatedArticle]) -> Result<u64> {
            if self.fail_news {
                anyhow::bail!("connection reset");
            }
            self.news
                .lock()
                .unwrap()
                .push((company.to_string(), articles.to_vec()));
            Ok(articles.len() as u64)
        }

        async fn replace_compound_sentiment(
            &self,
            company: &str,
            sentiment: CompoundSentiment,
        ) -> Result<u64> {
            self.compound
                .lock()
                .unwrap()
                .push((company.to_string(), sentiment));
            Ok(1)
        }
    }

    fn company(symbol: &str, name: &str) -> Company {
        Company {
            symbol: symbol.to_string(),
            name: name.to_string(),
        }
    }

    fn reply(text: &str) -> Scripted {
        Scripted::Reply(text.to_string())
    }

    fn pipeline(
        script: Vec<Scripted>,
        source: FakeSource,
        store: Arc<FakeStore>,
    ) -> NewsPipeline<ScriptedClient> {
        let (dispatcher, _pool) = dispatcher(ScriptedClient::new(script), RecordingSleeper::default());
        NewsPipeline::new(ArticleAnalyzer::new(dispatcher), Arc::new(source), store)
    }

    #[tokio::test]
    async fn rates_articles_and_stores_compound() {
        let source = FakeSource {
            links: HashMap::from([("NVDA", vec!["l1", "l2"]), ("ACME", vec![])]),
            pages: HashMap::from([
                ("l1", Page::Body("Revenue beat estimates.")),
                ("l2", Page::Body("Guidance was cut.")),
            ]),
        };
        let store = Arc::new(FakeStore::default());
        let p = pipeline(
            vec![
                reply("Strong quarter. (decrease 20% | increase 80%) (Informativeness: 100%)"),
                reply("Weak outlook. (increase 40% | decrease 60%) (Informativeness: 50%)"),
            ],
            source,
            store.clone(),
        );

        let summary = p
            .run(&[company("NVDA", "NVIDIA Corporation"), company("ACME", "Acme")])
            .await;

        assert_eq!(
            summary,
            RunSummary {
                companies: 2,
                articles_rated: 2,
                article_failures: 0,
                companies_without_sentiment: 1,
                company_failures: 0,
            }
        );

        let news = store.news.lock().unwrap();
        assert_eq!(news.len(), 2);
        assert_eq!(news[0].0, "NVIDIA Corporation");
        assert_eq!(news[0].1.len(), 2);
        assert_eq!(news[0].1[0].link, "l1");
        assert_eq!(news[0].1[1].rating.decrease, 60);
        assert!(news[1].1.is_empty());

        let compound = store.compound.lock().unwrap();
        assert_eq!(compound.len(), 1);
        assert_eq!(compound[0].0, "NVIDIA Corporation");
        assert_eq!(compound[0].1.fall_probability, 33.33);
        assert_eq!(compound[0].1.rise_probability, 66.67);
    }

    #[tokio::test]
    async fn article_failures_do_not_stop_the_company() {
        let source = FakeSource {
            links: HashMap::from([("NVDA", vec!["broken", "missing", "bad", "good"])]),
            pages: HashMap::from([
                ("broken", Page::Broken),
                ("missing", Page::Missing),
                ("bad", Page::Body("First article.")),
                ("good", Page::Body("Second article.")),
            ]),
        };
        let store = Arc::new(FakeStore::default());
        let p = pipeline(
            vec![
                Scripted::Fail("invalid request".to_string()),
                reply("(decrease 10% | increase 90%) (Informativeness: 70%)"),
            ],
            source,
            store.clone(),
        );

        let summary = p.run(&[company("NVDA", "NVIDIA Corporation")]).await;
        assert_eq!(summary.articles_rated, 1);
        assert_eq!(summary.article_failures, 2);
        assert_eq!(summary.company_failures, 0);

        let compound = store.compound.lock().unwrap();
        assert_eq!(compound[0].1.fall_probability, 10.0);
        assert_eq!(compound[0].1.rise_probability, 90.0);
    }

    #[tokio::test]
    async fn zero_informativeness_skips_compound_but_keeps_news() {
        let source = FakeSource {
            links: HashMap::from([("NVDA", vec!["l1"])]),
            pages: HashMap::from([("l1", Page::Body("Nothing new."))]),
        };
        let store = Arc::new(FakeStore::default());
        let p = pipeline(
            vec![reply("(decrease 50% | increase 50%) (Informativeness: 0%)")],
            source,
            store.clone(),
        );

        let summary = p.run(&[company("NVDA", "NVIDIA Corporation")]).await;
        assert_eq!(summary.companies_without_sentiment, 1);
        assert_eq!(store.news.lock().unwrap()[0].1.len(), 1);
        assert!(store.compound.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn company_failures_are_isolated() {
        let source = FakeSource {
            links: HashMap::from([("NVDA", vec!["l1"])]),
            pages: HashMap::from([("l1", Page::Body("Text."))]),
        };
        let store = Arc::new(FakeStore::default());
        let p = pipeline(
            vec![reply("(decrease 30% | increase 70%) (Informativeness: 80%)")],
            source,
            store.clone(),
        );

        // UNKN has no search results configured, so listing links fails.
        let summary = p
            .run(&[company("UNKN", "Unknown"), company("NVDA", "NVIDIA Corporation")])
            .await;
        assert_eq!(summary.companies, 2);
        assert_eq!(summary.company_failures, 1);
        assert_eq!(summary.articles_rated, 1);
        assert_eq!(store.compound.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn store_failure_counts_as_company_failure() {
        let source = FakeSource {
            links: HashMap::from([("NVDA", vec!["l1"])]),
            pages: HashMap::from([("l1", Page::Body("Text."))]),
        };
        let store = Arc::new(FakeStore {
            fail_news: true,
            ..FakeStore::default()
        });
        let p = pipeline(
            vec![reply("(decrease 30% | increase 70%) (Informativeness: 80%)")],
            source,
            store.clone(),
        );

        let summary = p.run(&[company("NVDA", "NVIDIA Corporation")]).await;
        assert_eq!(summary.company_failures, 1);
        assert!(store.compound.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn article_limit_truncates_links() {
        let source = FakeSource {
            links: HashMap::from([("NVDA", vec!["l1", "l2", "l3"])]),
            pages: HashMap::from([
                ("l1", Page::Body("One.")),
                ("l2", Page::Body("Two.")),
                ("l3", Page::Body("Three.")),
            ]),
        };
        let store = Arc::new(FakeStore::default());
        let p = pipeline(
            vec![reply("(Informativeness: 60%)"), reply("(Informativeness: 60%)")],
            source,
            store,
        )
        .with_options(PipelineOptions {
            max_articles_per_company: Some(2),
        });

        let analysis = p
            .analyze_company(&company("NVDA", "NVIDIA Corporation"))
            .await
            .unwrap();
        assert_eq!(analysis.batch.articles.len(), 2);
        assert_eq!(analysis.article_failures, 0);
    }
}
