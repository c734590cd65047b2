use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use stockpulse_core::analysis::analyzer::ArticleAnalyzer;
use stockpulse_core::config::Settings;
use stockpulse_core::domain::market::{Company, StockQuote};
use stockpulse_core::ingest::chart::ChartClient;
use stockpulse_core::ingest::listing::ListingClient;
use stockpulse_core::ingest::news::{ArticleSource, YahooNewsSource};
use stockpulse_core::llm::anthropic::AnthropicClient;
use stockpulse_core::llm::dispatch::{Dispatcher, RetryPolicy};
use stockpulse_core::llm::pool::ModelPool;
use stockpulse_core::pipeline::{NewsPipeline, PipelineOptions, RunSummary};
use stockpulse_core::storage::news::{DryRunStore, PgSentimentStore, SentimentStore};
use stockpulse_core::storage::runs::{record_run, RunStatus};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod history;
mod market;

const RUN_LOCK_JOB: &str = "stock-news-scrape";

#[derive(Debug, Parser)]
#[command(name = "stockpulse_worker")]
struct Args {
    /// Scrape and analyze without writing to the database.
    #[arg(long)]
    dry_run: bool,

    /// Leave the price history tables untouched.
    #[arg(long)]
    skip_history: bool,

    /// Skip news analysis and compound sentiment.
    #[arg(long)]
    skip_news: bool,

    /// Only process the first N companies of the listing.
    #[arg(long)]
    max_companies: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    if let Err(err) = run(&args, &settings).await {
        sentry_anyhow::capture_anyhow(&err);
        tracing::error!(error = %err, "scrape run failed");
        return Err(err);
    }
    Ok(())
}

async fn run(args: &Args, settings: &Settings) -> anyhow::Result<()> {
    if !args.skip_news {
        settings.require_anthropic_api_key()?;
    }

    let listing = ListingClient::from_env()?;
    let chart = ChartClient::from_env()?;

    let mut rows = listing.fetch_listing().await?;
    if let Some(max) = args.max_companies {
        rows.truncate(max);
    }
    let quotes = market::collect_quotes(&chart, rows).await;
    anyhow::ensure!(!quotes.is_empty(), "no company quotes could be completed");
    let companies: Vec<Company> = quotes.iter().map(|q| q.company.clone()).collect();

    if args.dry_run {
        tracing::info!(companies = companies.len(), dry_run = true, "listing scraped");
        if !args.skip_history {
            history::refresh_history(None, &chart, &companies).await;
        }
        if !args.skip_news {
            let pipeline = build_pipeline(settings, Arc::new(DryRunStore))?;
            pipeline.run(&companies).await;
        }
        return Ok(());
    }

    let db_url = settings.require_database_url()?;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await
        .context("connect DATABASE_URL failed")?;

    stockpulse_core::storage::migrate(&pool).await?;

    let Some(lock) = stockpulse_core::storage::lock::try_acquire_run_lock(&pool, RUN_LOCK_JOB).await?
    else {
        tracing::warn!(job = RUN_LOCK_JOB, "run lock not acquired; another run in progress");
        return Ok(());
    };

    let outcome = run_with_db(args, settings, &pool, &chart, &quotes, &companies).await;

    if let Err(err) = lock.release().await {
        tracing::warn!(error = %err, "run lock release failed");
    }
    outcome
}

async fn run_with_db(
    args: &Args,
    settings: &Settings,
    pool: &sqlx::PgPool,
    chart: &ChartClient,
    quotes: &[StockQuote],
    companies: &[Company],
) -> anyhow::Result<()> {
    let started_at = chrono::Utc::now();

    let result: anyhow::Result<RunSummary> = async {
        stockpulse_core::storage::stocks::replace_stocks(pool, quotes).await?;

        if !args.skip_history {
            let rows = history::refresh_history(Some(pool), chart, companies).await;
            tracing::info!(rows, "history refresh finished");
        }

        if args.skip_news {
            return Ok(RunSummary::default());
        }
        let store: Arc<dyn SentimentStore> = Arc::new(PgSentimentStore::new(pool.clone()));
        let pipeline = build_pipeline(settings, store)?;
        Ok(pipeline.run(companies).await)
    }
    .await;

    let finished_at = chrono::Utc::now();
    let (summary, status, error) = match &result {
        Ok(summary) => (summary.clone(), RunStatus::Succeeded, None),
        Err(err) => (RunSummary::default(), RunStatus::Failed, Some(format!("{err:#}"))),
    };
    if let Err(err) = record_run(pool, &summary, started_at, finished_at, status, error.as_deref()).await {
        tracing::warn!(error = %err, "recording run failed");
    }

    result.map(|_| ())
}

fn build_pipeline(
    settings: &Settings,
    store: Arc<dyn SentimentStore>,
) -> anyhow::Result<NewsPipeline<AnthropicClient>> {
    let settings = settings.clone();
    let models = Arc::new(ModelPool::new(
        ModelPool::<AnthropicClient>::capacity_from_env(),
        move || AnthropicClient::from_settings(&settings),
    ));
    let dispatcher = Dispatcher::new(models, RetryPolicy::from_env());
    let source: Arc<dyn ArticleSource> = Arc::new(YahooNewsSource::from_env()?);

    Ok(NewsPipeline::new(ArticleAnalyzer::new(dispatcher), source, store)
        .with_options(PipelineOptions::from_env()))
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
