use crate::text::stopwords::is_stopword;
use once_cell::sync::Lazy;
use regex::Regex;

static UPDATED_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\(Updated - [A-Za-z]+ \d{1,2}, \d{4} \d{1,2}:\d{2} [AP]M [A-Z]{2,4}\)\s*Investing\.com\s*[-—]+\s*",
    )
    .expect("static regex")
});
static SINGLE_WORD_PAREN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\(\w+\)").expect("static regex"));
static EXCHANGE_TICKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\(\s*(?:NASDAQ|NYSE American|NYSE|AMEX|OTC|OTCQX|TSX|LSE)\s*:\s*[A-Z0-9.\-]+\s*\)")
        .expect("static regex")
});
static PUNCTUATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s]").expect("static regex"));
static SENTENCE_END_SPACING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([.!?])(\w)").expect("static regex"));

const WIRE_PREFIXES: &[&str] = &[
    "Investing.com -- ",
    "Investing.com-- ",
    "Investing.com — ",
    "Investing.com - ",
    "SAN FRANCISCO--(BUSINESS WIRE)--",
    "SAN FRANCISCO - ",
    "TAIPEI  - ",
    "U.Today - ",
];

// Tokens that end in a period without ending the sentence.
const ABBREVIATIONS: &[&str] = &[
    "mr", "mrs", "ms", "dr", "prof", "sr", "jr", "st", "inc", "corp", "co", "ltd", "plc", "vs",
    "etc", "jan", "feb", "mar", "apr", "jun", "jul", "aug", "sep", "sept", "oct", "nov", "dec",
    "no", "est",
];

/// Words that take a single-letter designator ("Plan B", "Class A"). A letter
/// after one of these ends the sentence instead of reading as an initial.
const DESIGNATORS: &[&str] = &[
    "plan", "class", "series", "round", "tier", "grade", "type", "phase", "part", "section",
    "vitamin", "option",
];

pub fn normalize(raw: &str) -> String {
    let text = strip_boilerplate(raw);
    let text = delete_superfluous(&text);

    split_sentences(&text)
        .iter()
        .map(|s| normalize_sentence(s))
        .collect::<Vec<_>>()
        .join(". ")
}

pub fn strip_boilerplate(text: &str) -> String {
    let mut out = UPDATED_PREFIX.replace_all(text, "").into_owned();
    for prefix in WIRE_PREFIXES {
        out = out.replace(prefix, "");
    }
    out
}

/// Removes single-word parentheticals like "(Reuters)" and exchange tickers
/// like "(NASDAQ: AAPL)".
pub fn delete_superfluous(text: &str) -> String {
    let text = EXCHANGE_TICKER.replace_all(text, "");
    SINGLE_WORD_PAREN.replace_all(&text, "").into_owned()
}

/// English sentence segmentation. A sentence ends at `.`, `!` or `?` (plus any
/// trailing closing quotes/brackets) when followed by whitespace and a token
/// that can start a sentence, unless the period closes a known abbreviation or
/// an initial.
pub fn split_sentences(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut out = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if !matches!(c, '.' | '!' | '?') {
            i += 1;
            continue;
        }

        let mut end = i + 1;
        while end < chars.len()
            && matches!(chars[end], '.' | '!' | '?' | '"' | '\'' | ')' | '”' | '’')
        {
            end += 1;
        }

        let mut next = end;
        while next < chars.len() && chars[next].is_whitespace() {
            next += 1;
        }

        let at_end = next == chars.len();
        let boundary = at_end
            || (next > end
                && can_start_sentence(chars[next])
                && !(c == '.' && ends_with_abbreviation(&chars[start..i])));

        if boundary {
            push_sentence(&mut out, &chars[start..end]);
            start = next;
            i = next;
        } else {
            i = end;
        }
    }

    if start < chars.len() {
        push_sentence(&mut out, &chars[start..]);
    }
    out
}

fn push_sentence(out: &mut Vec<String>, chars: &[char]) {
    let s: String = chars.iter().collect();
    let s = s.trim();
    if !s.is_empty() {
        out.push(s.to_string());
    }
}

fn can_start_sentence(c: char) -> bool {
    c.is_uppercase() || c.is_ascii_digit() || matches!(c, '"' | '\'' | '(' | '“' | '‘')
}

fn ends_with_abbreviation(preceding: &[char]) -> bool {
    let text: String = preceding.iter().collect();
    let mut words = text
        .split_whitespace()
        .rev()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric() && c != '.'));
    let word = words.next().unwrap_or_default();
    let word = word.trim_start_matches(|c: char| !c.is_alphanumeric());
    if word.is_empty() {
        return false;
    }

    // Initials ("J. Smith") and dotted forms ("U.S.").
    let mut letters = word.chars();
    if let (Some(first), None) = (letters.next(), letters.next()) {
        if first.is_alphabetic() {
            let before = words.next().unwrap_or_default().to_lowercase();
            return !DESIGNATORS.contains(&before.as_str());
        }
    }
    if word.contains('.') {
        return true;
    }

    ABBREVIATIONS.contains(&word.to_lowercase().as_str())
}

fn normalize_sentence(sentence: &str) -> String {
    let stripped = PUNCTUATION.replace_all(sentence, "");
    let words: Vec<&str> = stripped
        .split_whitespace()
        .filter(|w| !is_stopword(w))
        .collect();
    let sentence = capitalize_first(&words.join(" "));
    SENTENCE_END_SPACING
        .replace_all(&sentence, "${1} ${2}")
        .into_owned()
}

fn capitalize_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removes_exchange_and_single_word_annotations() {
        let s = delete_superfluous("Apple (NASDAQ: AAPL) rose (Reuters) today (nyse: T)");
        assert!(!s.contains("NASDAQ"));
        assert!(!s.contains("Reuters"));
        assert!(!s.contains("nyse"));
        assert!(s.starts_with("Apple"));
    }

    #[test]
    fn keeps_multi_word_parentheticals() {
        let s = delete_superfluous("Revenue (excluding one-off items) grew");
        assert!(s.contains("(excluding one-off items)"));
    }

    #[test]
    fn strips_wire_prefixes() {
        let s = strip_boilerplate("Investing.com -- Shares of Nvidia rose.");
        assert_eq!(s, "Shares of Nvidia rose.");

        let s = strip_boilerplate(
            "(Updated - July 5, 2024 10:15 AM EDT)Investing.com -- Tesla stock rallied.",
        );
        assert_eq!(s, "Tesla stock rallied.");
    }

    #[test]
    fn splits_on_sentence_boundaries() {
        let s = split_sentences("Shares rose 5%. Analysts cheered! Will it last? Maybe.");
        assert_eq!(
            s,
            vec!["Shares rose 5%.", "Analysts cheered!", "Will it last?", "Maybe."]
        );
    }

    #[test]
    fn does_not_split_on_abbreviations_or_initials() {
        let s = split_sentences("Apple Inc. Reported results. J. Smith said the U.S. Market rose.");
        assert_eq!(
            s,
            vec!["Apple Inc. Reported results.", "J. Smith said the U.S. Market rose."]
        );
    }

    #[test]
    fn single_letter_designator_ends_sentence() {
        let s = split_sentences("They chose Plan B. Shares rose. George W. Bush spoke.");
        assert_eq!(s, vec!["They chose Plan B.", "Shares rose.", "George W. Bush spoke."]);
    }

    #[test]
    fn idempotent_after_designator_sentence() {
        let once = normalize("Is it plan B? Shares rose.");
        assert_eq!(once, "Plan B. Shares rose");
        assert_eq!(normalize(&once), once);
    }

    #[test]
    fn does_not_split_inside_decimals() {
        let s = split_sentences("Revenue was 3.5 billion. Margins improved.");
        assert_eq!(s, vec!["Revenue was 3.5 billion.", "Margins improved."]);
    }

    #[test]
    fn drops_stopwords_and_punctuation() {
        let out = normalize("The company is planning a buyback, analysts said.");
        assert_eq!(out, "Company planning buyback analysts said");
    }

    #[test]
    fn capitalizes_only_first_letter() {
        let out = normalize("shares of Nvidia jumped.");
        assert_eq!(out, "Shares Nvidia jumped");
    }

    #[test]
    fn joins_sentences_with_period_space() {
        let out = normalize("Apple Inc. (NASDAQ: AAPL) reported record revenue. The stock rose.");
        assert_eq!(out, "Apple Inc reported record revenue. Stock rose");
    }

    #[test]
    fn all_stopword_sentence_keeps_an_empty_slot() {
        let out = normalize("The. Shares rose.");
        assert_eq!(out, ". Shares rose");
    }

    #[test]
    fn empty_input_yields_empty_output() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("   \n "), "");
    }

    #[test]
    fn idempotent_on_clean_text() {
        let x = "Apple shares rallied strongly. Nvidia stock slipped";
        let once = normalize(x);
        assert_eq!(once, x);
        assert_eq!(normalize(&once), once);
    }
}
