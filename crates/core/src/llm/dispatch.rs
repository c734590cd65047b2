use crate::llm::error::{is_rate_limited, DispatchError};
use crate::llm::pool::ModelPool;
use crate::llm::LlmClient;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_MAX_ATTEMPTS: u32 = 6;
const DEFAULT_INITIAL_BACKOFF_SECS: u64 = 10;
const DEFAULT_BACKOFF_STEP_SECS: u64 = 5;
const DEFAULT_COOLDOWN_SECS: u64 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub backoff_step: Duration,
    pub cooldown: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff: Duration::from_secs(DEFAULT_INITIAL_BACKOFF_SECS),
            backoff_step: Duration::from_secs(DEFAULT_BACKOFF_STEP_SECS),
            cooldown: Duration::from_secs(DEFAULT_COOLDOWN_SECS),
        }
    }
}

impl RetryPolicy {
    pub fn from_env() -> Self {
        let mut out = Self::default();

        if let Some(n) = env_parse::<u32>("MODEL_MAX_ATTEMPTS").filter(|n| *n >= 1) {
            out.max_attempts = n;
        }
        if let Some(n) = env_parse::<u64>("MODEL_BACKOFF_INITIAL_SECS") {
            out.initial_backoff = Duration::from_secs(n);
        }
        if let Some(n) = env_parse::<u64>("MODEL_BACKOFF_STEP_SECS") {
            out.backoff_step = Duration::from_secs(n);
        }
        if let Some(n) = env_parse::<u64>("MODEL_COOLDOWN_SECS") {
            out.cooldown = Duration::from_secs(n);
        }

        out
    }

    /// Delay after the `n`-th rate-limited attempt (1-based).
    pub fn backoff_delay(&self, n: u32) -> Duration {
        self.initial_backoff + self.backoff_step * n.saturating_sub(1)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse::<T>().ok())
}

#[async_trait::async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait::async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Each attempt takes a handle from the pool and returns it before the outcome
/// is inspected. Rate-limited attempts back off and retry; any other error is
/// returned at once.
pub struct Dispatcher<C> {
    pool: Arc<ModelPool<C>>,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl<C: LlmClient> Dispatcher<C> {
    pub fn new(pool: Arc<ModelPool<C>>, policy: RetryPolicy) -> Self {
        Self {
            pool,
            policy,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn dispatch(&self, request: &str) -> Result<String, DispatchError> {
        let mut rate_limited: u32 = 0;

        for attempt in 1..=self.policy.max_attempts {
            let client = self.pool.acquire().await?;
            let provider = client.provider();
            tracing::info!(attempt, provider, "sending analysis request to model");

            let outcome = client.generate(request).await;
            self.pool.release(client).await;

            match outcome {
                Ok(text) if !text.trim().is_empty() => {
                    tracing::info!(attempt, provider, "model analysis completed");
                    self.sleeper.sleep(self.policy.cooldown).await;
                    return Ok(text);
                }
                Ok(_) => {
                    tracing::warn!(attempt, provider, "model returned an empty response; retrying");
                }
                Err(err) if is_rate_limited(&err) => {
                    rate_limited += 1;
                    if attempt == self.policy.max_attempts {
                        tracing::warn!(attempt, provider, error = %err, "rate limited on final attempt");
                        break;
                    }
                    let backoff = self.policy.backoff_delay(rate_limited);
                    tracing::warn!(
                        attempt,
                        provider,
                        ?backoff,
                        "model backend rate limited; retrying after backoff"
                    );
                    self.sleeper.sleep(backoff).await;
                }
                Err(err) => {
                    tracing::error!(attempt, provider, error = %err, "model request failed");
                    return Err(DispatchError::Backend {
                        attempt,
                        source: err,
                    });
                }
            }
        }

        tracing::error!(
            attempts = self.policy.max_attempts,
            "max retries reached; unable to complete model analysis"
        );
        Err(DispatchError::Exhausted {
            attempts: self.policy.max_attempts,
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::llm::error::LlmDiagnosticsError;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Debug, Clone)]
    pub enum Scripted {
        Reply(String),
        RateLimited,
        Fail(String),
        /// A 200 reply whose body could not be decoded.
        Undecodable(String),
    }

    /// Replays a shared script; every clone draws from the same queue and
    /// records the prompts it was given.
    #[derive(Debug, Clone, Default)]
    pub struct ScriptedClient {
        script: Arc<Mutex<VecDeque<Scripted>>>,
        pub prompts: Arc<Mutex<Vec<String>>>,
    }

    impl ScriptedClient {
        pub fn new(script: Vec<Scripted>) -> Self {
            Self {
                script: Arc::new(Mutex::new(script.into())),
                prompts: Arc::default(),
            }
        }

        pub fn remaining(&self) -> usize {
            self.script.lock().unwrap().len()
        }
    }

    #[async_trait::async_trait]
    impl LlmClient for ScriptedClient {
        fn provider(&self) -> &'static str {
            "scripted"
        }

        async fn generate(&self, prompt: &str) -> anyhow::Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(Scripted::Reply(text)) => Ok(text),
                Some(Scripted::RateLimited) => Err(LlmDiagnosticsError {
                    provider: "scripted",
                    stage: "http",
                    status: Some(429),
                    detail: "status=429 Too Many Requests".to_string(),
                    raw_output: None,
                }
                .into()),
                Some(Scripted::Fail(msg)) => Err(anyhow::anyhow!(msg)),
                Some(Scripted::Undecodable(body)) => Err(LlmDiagnosticsError {
                    provider: "scripted",
                    stage: "decode",
                    status: Some(200),
                    detail: "failed to decode response JSON".to_string(),
                    raw_output: Some(body),
                }
                .into()),
                None => Err(anyhow::anyhow!("script exhausted")),
            }
        }
    }

    #[derive(Debug, Clone, Default)]
    pub struct RecordingSleeper {
        pub slept: Arc<Mutex<Vec<Duration>>>,
    }

    impl RecordingSleeper {
        pub fn secs(&self) -> Vec<u64> {
            self.slept.lock().unwrap().iter().map(|d| d.as_secs()).collect()
        }
    }

    #[async_trait::async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.slept.lock().unwrap().push(duration);
        }
    }

    pub fn dispatcher(
        client: ScriptedClient,
        sleeper: RecordingSleeper,
    ) -> (Dispatcher<ScriptedClient>, Arc<ModelPool<ScriptedClient>>) {
        let pool = Arc::new(ModelPool::new(3, move || Ok(client.clone())));
        let dispatcher =
            Dispatcher::new(pool.clone(), RetryPolicy::default()).with_sleeper(Arc::new(sleeper));
        (dispatcher, pool)
    }
}
