use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use thiserror::Error;

pub const RATE_LIMIT_STATUS: u16 = 429;

/// Provider-specific marker some backends put in the error body instead of (or
/// in addition to) the 429 status.
const RATE_LIMIT_MARKERS: &[&str] = &["rate_limit_error", "resource_exhausted", "too many requests"];

static STATUS_429: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b429\b").expect("static regex"));

#[derive(Debug, Clone)]
pub struct LlmDiagnosticsError {
    pub provider: &'static str,
    pub stage: &'static str,
    pub status: Option<u16>,
    pub detail: String,
    pub raw_output: Option<String>,
}

impl LlmDiagnosticsError {
    pub fn is_rate_limited(&self) -> bool {
        match self.status {
            Some(RATE_LIMIT_STATUS) => true,
            // Body markers only count on an error response.
            Some(status) if status >= 400 => self
                .raw_output
                .as_deref()
                .map(contains_rate_limit_marker)
                .unwrap_or(false),
            _ => false,
        }
    }
}

impl fmt::Display for LlmDiagnosticsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LLM error (provider={}, stage={}): {}",
            self.provider, self.stage, self.detail
        )
    }
}

impl std::error::Error for LlmDiagnosticsError {}

/// Inspects an error chain for a rate-limit signal.
pub fn is_rate_limited(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        if let Some(diag) = cause.downcast_ref::<LlmDiagnosticsError>() {
            return diag.is_rate_limited();
        }
        let msg = cause.to_string();
        STATUS_429.is_match(&msg) || contains_rate_limit_marker(&msg)
    })
}

fn contains_rate_limit_marker(text: &str) -> bool {
    let lower = text.to_lowercase();
    RATE_LIMIT_MARKERS.iter().any(|m| lower.contains(m))
}

#[derive(Debug, Error)]
pub enum DispatchError {
    /// The pool was already populated and is now empty. Sequential use always
    /// returns handles, so this means concurrent misuse.
    #[error("model pool exhausted: no handle available")]
    PoolExhausted,

    #[error("model pool could not be populated: {0:#}")]
    PoolInit(anyhow::Error),

    #[error("retry budget exhausted after {attempts} attempts")]
    Exhausted { attempts: u32 },

    #[error("model backend failed on attempt {attempt}: {source:#}")]
    Backend {
        attempt: u32,
        #[source]
        source: anyhow::Error,
    },
}

impl DispatchError {
    /// Attempts spent before the failure, if any were made.
    pub fn attempts(&self) -> Option<u32> {
        match self {
            DispatchError::Exhausted { attempts } => Some(*attempts),
            DispatchError::Backend { attempt, .. } => Some(*attempt),
            DispatchError::PoolExhausted | DispatchError::PoolInit(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    fn diag(status: Option<u16>, raw: Option<&str>) -> LlmDiagnosticsError {
        LlmDiagnosticsError {
            provider: "test",
            stage: "http",
            status,
            detail: "boom".to_string(),
            raw_output: raw.map(str::to_string),
        }
    }

    #[test]
    fn status_429_is_rate_limited() {
        let err = anyhow::Error::new(diag(Some(429), None));
        assert!(is_rate_limited(&err));
    }

    #[test]
    fn marker_in_body_is_rate_limited() {
        let body = r#"{"type":"error","error":{"type":"rate_limit_error","message":"slow down"}}"#;
        let err = anyhow::Error::new(diag(Some(400), Some(body)));
        assert!(is_rate_limited(&err));
    }

    #[test]
    fn marker_survives_added_context() {
        let err = Err::<(), _>(anyhow::Error::new(diag(Some(429), None)))
            .context("analysis request failed")
            .unwrap_err();
        assert!(is_rate_limited(&err));
    }

    #[test]
    fn other_failures_are_not_rate_limited() {
        let err = anyhow::Error::new(diag(Some(500), Some("internal error")));
        assert!(!is_rate_limited(&err));
        assert!(!is_rate_limited(&anyhow::anyhow!("connection reset")));
    }

    #[test]
    fn plain_message_with_429_is_rate_limited() {
        assert!(is_rate_limited(&anyhow::anyhow!("429 Too Many Requests")));
    }

    #[test]
    fn digits_inside_identifiers_are_not_a_status() {
        let err = anyhow::anyhow!(r#"unexpected reply {{"id":"msg_01X429qv"}}"#);
        assert!(!is_rate_limited(&err));
        assert!(is_rate_limited(&anyhow::anyhow!("upstream status 429")));
    }

    #[test]
    fn decode_failure_is_not_rate_limited() {
        let mut d = diag(Some(200), Some(r#"{"id":"msg_01X429qv","type":"rate_limit_error"}"#));
        d.stage = "decode";
        assert!(!is_rate_limited(&anyhow::Error::new(d)));
    }
}
