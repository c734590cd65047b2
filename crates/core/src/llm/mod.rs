pub mod anthropic;
pub mod dispatch;
pub mod error;
pub mod pool;

/// One usable session with a generative model backend.
///
/// Failures are surfaced as `anyhow::Error`; a throttled request must carry an
/// [`error::LlmDiagnosticsError`] with status 429 (or mention the provider's
/// rate-limit marker) so the dispatcher can tell it apart from a hard failure.
#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    fn provider(&self) -> &'static str;

    async fn generate(&self, prompt: &str) -> anyhow::Result<String>;
}
