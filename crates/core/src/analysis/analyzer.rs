use crate::analysis::parser::{PatternParser, RatingParser};
use crate::domain::sentiment::Rating;
use crate::llm::dispatch::Dispatcher;
use crate::llm::error::DispatchError;
use crate::llm::LlmClient;
use crate::text;

/// Runs one article through normalize -> model -> parse.
pub struct ArticleAnalyzer<C> {
    dispatcher: Dispatcher<C>,
    parser: Box<dyn RatingParser>,
}

impl<C: LlmClient> ArticleAnalyzer<C> {
    pub fn new(dispatcher: Dispatcher<C>) -> Self {
        Self {
            dispatcher,
            parser: Box::new(PatternParser),
        }
    }

    pub fn with_parser(mut self, parser: Box<dyn RatingParser>) -> Self {
        self.parser = parser;
        self
    }

    /// Returns the cleaned model summary and the parsed rating. Only dispatcher
    /// failures surface as errors; unparseable output falls back to defaults.
    pub async fn analyze(
        &self,
        article_text: &str,
        company: &str,
    ) -> Result<(String, Rating), DispatchError> {
        let normalized = text::normalize(article_text);
        tracing::debug!(
            %company,
            raw_len = article_text.len(),
            normalized_len = normalized.len(),
            "article text normalized"
        );

        let request = analysis_prompt(company, &normalized);
        let response = self.dispatcher.dispatch(&request).await?;

        let rating = self.parser.parse_rating(&response);
        let summary = self.parser.clean_summary(&response);
        Ok((summary, rating))
    }
}

pub fn analysis_prompt(company: &str, article: &str) -> String {
    format!(
        "I have several financial articles about {company}. Analyze the following one and respond with: \
3 sentences that best describe what the article is about; a forecast based on this news of the chance \
the stock price will go down and the chance it will go up, in the exact format \
'(decrease 30% | increase 70%)' where the two values total 100%; and how useful this article is for \
predicting the rise or fall of the stock, in the exact format '(Informativeness: 50%)'. \
Here is the article:\n\n{article}"
    )
}
