use serde::{Deserialize, Serialize};

/// Fallback used for both forecast sides and informativeness when the model
/// output does not carry the expected pattern.
pub const DEFAULT_PERCENT: i32 = 50;

/// Article text as pulled from a news page. Lives for one analysis pass.
#[derive(Debug, Clone)]
pub struct Article {
    pub company: String,
    pub link: String,
    pub title: String,
    pub text: String,
}

/// Per-article forecast on the 0..=100 percentage-point scale.
///
/// `decrease + increase` is expected to be 100 but the model does not always
/// comply, so nothing here enforces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rating {
    pub decrease: i32,
    pub increase: i32,
    pub informativeness: i32,
}

impl Default for Rating {
    fn default() -> Self {
        Self {
            decrease: DEFAULT_PERCENT,
            increase: DEFAULT_PERCENT,
            informativeness: DEFAULT_PERCENT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatedArticle {
    pub title: String,
    pub link: String,
    pub summary: String,
    pub rating: Rating,
}

/// All rated articles for one company, in the order they were analyzed.
#[derive(Debug, Clone, Default)]
pub struct CompanyRatingBatch {
    pub company: String,
    pub articles: Vec<RatedArticle>,
}

impl CompanyRatingBatch {
    pub fn new(company: impl Into<String>) -> Self {
        Self {
            company: company.into(),
            articles: Vec::new(),
        }
    }

    pub fn push(&mut self, article: RatedArticle) {
        self.articles.push(article);
    }

    pub fn ratings(&self) -> Vec<Rating> {
        self.articles.iter().map(|a| a.rating).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.articles.is_empty()
    }
}

/// Informativeness-weighted forecast for one company, same percentage-point
/// scale as [`Rating`], rounded to 2 decimals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompoundSentiment {
    pub fall_probability: f64,
    pub rise_probability: f64,
}
