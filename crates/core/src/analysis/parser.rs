use crate::domain::sentiment::{Rating, DEFAULT_PERCENT};
use once_cell::sync::Lazy;
use regex::Regex;

static DECREASE_FIRST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\(\s*decrease\s*:?\s*(\d+)\s*%\s*\|\s*increase\s*:?\s*(\d+)\s*%\s*\)")
        .expect("static regex")
});
static INCREASE_FIRST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\(\s*increase\s*:?\s*(\d+)\s*%\s*\|\s*decrease\s*:?\s*(\d+)\s*%\s*\)")
        .expect("static regex")
});
static INFORMATIVENESS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\(\s*informativeness\s*:\s*(\d+)\s*%\s*\)").expect("static regex")
});

static BRACKETED: Lazy<Regex> = Lazy::new(|| Regex::new(r"\([^()\n]*\)").expect("static regex"));
static HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^[ \t]*#{1,6}[ \t]*").expect("static regex"));
static EMPHASIS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*+|__").expect("static regex"));
static ENUMERATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*\d+\.(?:[ \t]+|$)").expect("static regex"));
static SPACE_BEFORE_PUNCT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[ \t]+([.,;:!?])").expect("static regex"));
static TRAILING_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)[ \t]+$").expect("static regex"));
static BLANK_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n(?:[ \t]*\n)+").expect("static regex"));

/// Matching strategy for model output.
pub trait RatingParser: Send + Sync {
    fn parse_rating(&self, response: &str) -> Rating;

    fn clean_summary(&self, response: &str) -> String;
}

/// Regex-based parser for the "(decrease P% | increase Q%)" /
/// "(informativeness: I%)" contract stated in the analysis prompt.
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternParser;

impl RatingParser for PatternParser {
    fn parse_rating(&self, response: &str) -> Rating {
        parse_rating(response)
    }

    fn clean_summary(&self, response: &str) -> String {
        clean_summary(response)
    }
}

pub fn parse_rating(response: &str) -> Rating {
    let (decrease, increase) = parse_forecast(response);
    let informativeness = match INFORMATIVENESS
        .captures(response)
        .and_then(|c| parse_percent(&c[1]))
    {
        Some(v) => v,
        None => {
            tracing::warn!("informativeness pattern not found; defaulting to {DEFAULT_PERCENT}");
            DEFAULT_PERCENT
        }
    };

    tracing::info!(decrease, increase, informativeness, "parsed model rating");
    Rating {
        decrease,
        increase,
        informativeness,
    }
}

fn parse_forecast(response: &str) -> (i32, i32) {
    if let Some(c) = DECREASE_FIRST.captures(response) {
        if let (Some(d), Some(i)) = (parse_percent(&c[1]), parse_percent(&c[2])) {
            return (d, i);
        }
    }

    if let Some(c) = INCREASE_FIRST.captures(response) {
        if let (Some(i), Some(d)) = (parse_percent(&c[1]), parse_percent(&c[2])) {
            return (d, i);
        }
    }

    tracing::warn!("forecast pattern not found; defaulting to {DEFAULT_PERCENT}/{DEFAULT_PERCENT}");
    (DEFAULT_PERCENT, DEFAULT_PERCENT)
}

fn parse_percent(digits: &str) -> Option<i32> {
    let value = digits.parse::<u64>().ok()?;
    if value > 100 {
        tracing::warn!(value, "percentage above 100 in model output; clamping");
        return Some(100);
    }
    Some(value as i32)
}

/// Strips asides, markdown markers and list numbering; collapses blank lines.
pub fn clean_summary(response: &str) -> String {
    let s = BRACKETED.replace_all(response, "");
    let s = HEADING.replace_all(&s, "");
    let s = EMPHASIS.replace_all(&s, "");
    let s = ENUMERATION.replace_all(&s, "");
    let s = SPACE_BEFORE_PUNCT.replace_all(&s, "${1}");
    let s = TRAILING_WS.replace_all(&s, "");
    let s = BLANK_RUNS.replace_all(&s, "\n");
    s.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_decrease_first_forecast() {
        let r = parse_rating("Outlook is good. (decrease 30% | increase 70%) (Informativeness: 80%)");
        assert_eq!(r.decrease, 30);
        assert_eq!(r.increase, 70);
        assert_eq!(r.informativeness, 80);
    }

    #[test]
    fn normalizes_increase_first_order() {
        let r = parse_rating("(increase 70% | decrease 30%)");
        assert_eq!((r.decrease, r.increase), (30, 70));
    }

    #[test]
    fn matching_is_case_insensitive() {
        let r = parse_rating("(DECREASE 45% | Increase 55%)\n(INFORMATIVENESS: 10%)");
        assert_eq!((r.decrease, r.increase, r.informativeness), (45, 55, 10));
    }

    #[test]
    fn decrease_first_wins_when_both_present() {
        let r = parse_rating("(increase 90% | decrease 10%) ... (decrease 40% | increase 60%)");
        assert_eq!((r.decrease, r.increase), (40, 60));
    }

    #[test]
    fn defaults_when_patterns_missing() {
        let r = parse_rating("The article is mostly about product launches.");
        assert_eq!(r, Rating::default());
        assert_eq!((r.decrease, r.increase, r.informativeness), (50, 50, 50));
    }

    #[test]
    fn informativeness_defaults_independently() {
        let r = parse_rating("(decrease 25% | increase 75%)");
        assert_eq!((r.decrease, r.increase, r.informativeness), (25, 75, 50));
    }

    #[test]
    fn malformed_sum_is_kept_as_is() {
        let r = parse_rating("(decrease 30% | increase 30%)");
        assert_eq!((r.decrease, r.increase), (30, 30));
    }

    #[test]
    fn values_above_one_hundred_are_clamped() {
        let r = parse_rating("(decrease 150% | increase 0%) (informativeness: 999999999999999999999%)");
        assert_eq!((r.decrease, r.increase), (100, 0));
        // Too large to parse falls back to the default.
        assert_eq!(r.informativeness, 50);
    }

    #[test]
    fn tolerates_extra_whitespace() {
        let r = parse_rating("( decrease 35 % |  increase 65% )  (Informativeness:40%)");
        assert_eq!((r.decrease, r.increase, r.informativeness), (35, 65, 40));
    }

    #[test]
    fn cleans_markdown_summary() {
        let raw = "## Analysis\n\n1. **Apple** beat earnings estimates (per Reuters).\n2. Margins expanded.\n\n\n3. Guidance was raised.\n\n(decrease 20% | increase 80%)\n(Informativeness: 70%)\n";
        assert_eq!(
            clean_summary(raw),
            "Analysis\nApple beat earnings estimates.\nMargins expanded.\nGuidance was raised."
        );
    }

    #[test]
    fn keeps_decimals_at_line_start() {
        assert_eq!(clean_summary("3.5 billion in revenue"), "3.5 billion in revenue");
    }

    #[test]
    fn cleaning_empty_text_is_empty() {
        assert_eq!(clean_summary("  \n\n "), "");
    }
}
