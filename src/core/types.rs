use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Where the resolving process is running. Production deployments get the
/// shorter browser budget and are subject to the browser-automation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentContext {
    Development,
    Production,
}

impl DeploymentContext {
    pub fn parse_str(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Some(DeploymentContext::Development),
            "production" | "prod" => Some(DeploymentContext::Production),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentContext::Development => "development",
            DeploymentContext::Production => "production",
        }
    }

    pub fn from_option(value: Option<&str>) -> Self {
        value
            .and_then(Self::parse_str)
            .unwrap_or(DeploymentContext::Development)
    }
}

/// One resolution attempt for one named screener. Immutable; build a new one
/// per invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionRequest {
    /// Screener name as it appears in the site's URL path.
    pub screener: String,
    pub context: DeploymentContext,
}

impl ExtractionRequest {
    pub fn new(screener: impl Into<String>, context: DeploymentContext) -> Self {
        Self {
            screener: screener.into(),
            context,
        }
    }
}

/// An outbound network call observed while the browser drove the screener
/// page. Owned by the session that captured it; discarded at teardown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapturedRequest {
    pub url: String,
    pub method: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl CapturedRequest {
    /// Header lookup, case-insensitive on the header name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn body_text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

/// Failure taxonomy for the pipeline. Only `Fetch` ever reaches a caller
/// inside `ExtractionResult::Failed`; the rest are downgraded to the
/// fallback path or to a manual placeholder.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("browser launch failed: {0}")]
    Launch(String),

    #[error("browser attempt exceeded its {0:?} budget")]
    Timeout(Duration),

    #[error("no scan clause found for '{0}'")]
    NoMatch(String),

    #[error("screener page fetch failed: {0}")]
    Fetch(String),
}

/// The sole externally visible outcome of a resolution attempt. A caller
/// always gets exactly one of these; there is no partial or pending state.
#[derive(Debug)]
pub enum ExtractionResult {
    /// The scan clause, decoded and ready for the screening service.
    Resolved(String),
    /// Automated recovery failed; the value is a `#`-prefixed sentinel the
    /// persistence collaborator stores until a human supplies the real
    /// clause.
    ManualPlaceholder(String),
    /// The fallback fetch itself failed. The one hard-failure path.
    Failed(ExtractError),
}

impl ExtractionResult {
    pub fn manual_placeholder(screener: &str) -> Self {
        ExtractionResult::ManualPlaceholder(format!(
            "{MANUAL_MARKER} {screener} needs manual scan-clause entry"
        ))
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, ExtractionResult::Resolved(_))
    }

    /// The stored value for this outcome, if any: the clause itself or the
    /// placeholder sentinel. `Failed` stores nothing.
    pub fn stored_value(&self) -> Option<&str> {
        match self {
            ExtractionResult::Resolved(v) | ExtractionResult::ManualPlaceholder(v) => Some(v),
            ExtractionResult::Failed(_) => None,
        }
    }
}

/// Leading marker on placeholder values. Downstream stores treat any clause
/// starting with this as "not yet manually configured" and allow in-place
/// correction later.
pub const MANUAL_MARKER: char = '#';

/// Recognizer for the placeholder sentinel, for collaborators that persist
/// resolved values.
pub fn is_manual_placeholder(value: &str) -> bool {
    value.trim_start().starts_with(MANUAL_MARKER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_parse() {
        assert_eq!(
            DeploymentContext::parse_str("Production"),
            Some(DeploymentContext::Production)
        );
        assert_eq!(
            DeploymentContext::parse_str("dev"),
            Some(DeploymentContext::Development)
        );
        assert_eq!(DeploymentContext::parse_str("staging"), None);
        assert_eq!(
            DeploymentContext::from_option(None),
            DeploymentContext::Development
        );
    }

    #[test]
    fn test_placeholder_carries_screener_name() {
        let result = ExtractionResult::manual_placeholder("bittu-daily-trading");
        let value = result.stored_value().unwrap();
        assert!(value.starts_with('#'));
        assert!(value.contains("bittu-daily-trading"));
        assert!(is_manual_placeholder(value));
    }

    #[test]
    fn test_resolved_value_is_not_placeholder() {
        assert!(!is_manual_placeholder("( {33485} ( latest close > 50 ) )"));
        assert!(is_manual_placeholder("  # pending manual entry"));
    }

    #[test]
    fn test_header_lookup_case_insensitive() {
        let mut headers = HashMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        let captured = CapturedRequest {
            url: "https://example.com/api".to_string(),
            method: "POST".to_string(),
            headers,
            body: Vec::new(),
            timestamp: chrono::Utc::now(),
        };
        assert_eq!(captured.header("content-type"), Some("application/json"));
        assert_eq!(captured.header("x-missing"), None);
    }
}
