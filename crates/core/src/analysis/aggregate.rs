use crate::domain::market::round2;
use crate::domain::sentiment::{CompoundSentiment, Rating};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AggregateError {
    #[error("no informative ratings among {ratings} article ratings")]
    NoInformativeRatings { ratings: usize },
}

/// Informativeness-weighted average of the per-article forecasts.
///
/// Output stays on the 0..=100 rating scale, rounded to 2 decimals. A zero
/// total weight (including an empty list) is an error rather than a 0/0.
pub fn aggregate(ratings: &[Rating]) -> Result<CompoundSentiment, AggregateError> {
    let mut rise: i64 = 0;
    let mut fall: i64 = 0;
    let mut weight: i64 = 0;

    for r in ratings {
        let w = i64::from(r.informativeness.max(0));
        rise += i64::from(r.increase) * w;
        fall += i64::from(r.decrease) * w;
        weight += w;
    }

    if weight == 0 {
        return Err(AggregateError::NoInformativeRatings {
            ratings: ratings.len(),
        });
    }

    let weight = weight as f64;
    Ok(CompoundSentiment {
        fall_probability: round2(fall as f64 / weight),
        rise_probability: round2(rise as f64 / weight),
    })
}
