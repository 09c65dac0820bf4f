//! Decode the target field out of captured browser traffic.
//!
//! The screener site fires its backtest request with the scan clause in the
//! body, but the body encoding varies by release and by how the page
//! assembles the call: a plain form post, a JSON payload, or something in
//! between with a mangled content-type. The ladder below tries the stricter
//! decodings first and degrades to raw pattern matching.

use percent_encoding::percent_decode_str;
use regex::Regex;
use std::time::Duration;

use crate::core::types::CapturedRequest;

/// Caller-supplied shape of the request worth decoding: HTTP method plus a
/// URL substring.
#[derive(Debug, Clone)]
pub struct RequestMatcher {
    pub url_fragment: String,
    pub method: String,
}

impl RequestMatcher {
    pub fn new(url_fragment: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            url_fragment: url_fragment.into(),
            method: method.into(),
        }
    }

    pub fn matches(&self, request: &CapturedRequest) -> bool {
        request.method.eq_ignore_ascii_case(&self.method)
            && request.url.contains(&self.url_fragment)
    }
}

/// Scan the capture list once. Matching requests are tried in capture order;
/// for each, the decoders run in fixed precedence and the first success
/// anywhere wins. A match with an undecodable body does not block later
/// matches.
pub fn extract(
    captured: &[CapturedRequest],
    matcher: &RequestMatcher,
    field: &str,
) -> Option<String> {
    let decoder = FieldDecoder::new(field);
    captured
        .iter()
        .filter(|req| matcher.matches(req) && !req.body.is_empty())
        .find_map(|req| decoder.decode(req))
}

/// Re-scan a growing capture list on a fixed interval until the field shows
/// up. The triggering call may not have fired yet on the first pass, so this
/// loops indefinitely; the orchestrator's attempt budget is the only
/// deadline, enforced by dropping this future.
pub async fn poll<F>(
    snapshot: F,
    matcher: &RequestMatcher,
    field: &str,
    interval: Duration,
) -> String
where
    F: Fn() -> Vec<CapturedRequest>,
{
    let decoder = FieldDecoder::new(field);
    loop {
        let captured = snapshot();
        let hit = captured
            .iter()
            .filter(|req| matcher.matches(req) && !req.body.is_empty())
            .find_map(|req| decoder.decode(req));
        if let Some(value) = hit {
            return value;
        }
        tracing::trace!(requests = captured.len(), "capture poll: no match yet");
        tokio::time::sleep(interval).await;
    }
}

/// Compiled decode ladder for one field name.
struct FieldDecoder {
    field: String,
    raw_pair: Regex,
    quoted_pair: Regex,
}

impl FieldDecoder {
    fn new(field: &str) -> Self {
        let escaped = regex::escape(field);
        Self {
            field: field.to_string(),
            // field=value up to the next separator; tolerates malformed or
            // partial content-types.
            raw_pair: Regex::new(&format!(r"{escaped}=([^&\s]+)")).expect("valid pattern"),
            // "field": "value" / 'field': 'value' embedded anywhere.
            quoted_pair: Regex::new(&format!(
                r#"["']{escaped}["']\s*:\s*["']([^"']+)["']"#
            ))
            .expect("valid pattern"),
        }
    }

    /// Fixed precedence: form pair, JSON body, raw pair, quoted pair.
    fn decode(&self, request: &CapturedRequest) -> Option<String> {
        let text = request.body_text();
        self.decode_form_pair(&text)
            .or_else(|| self.decode_json(request))
            .or_else(|| self.decode_raw_pair(&text))
            .or_else(|| self.decode_quoted_pair(&text))
    }

    /// 1. URL-encoded form body: split into pairs, percent-decode the value.
    /// Escapes only: a literal `+` in a clause stays a `+`.
    fn decode_form_pair(&self, body: &str) -> Option<String> {
        for pair in body.split('&') {
            let Some((key, value)) = pair.split_once('=') else {
                continue;
            };
            if key.trim() != self.field {
                continue;
            }
            let decoded = percent_decode_str(value).decode_utf8().ok()?;
            let decoded = decoded.trim();
            if !decoded.is_empty() {
                return Some(decoded.to_string());
            }
        }
        None
    }

    /// 2. JSON body, gated on the declared content-type.
    fn decode_json(&self, request: &CapturedRequest) -> Option<String> {
        let content_type = request.header("content-type")?;
        if !content_type
            .to_ascii_lowercase()
            .contains("application/json")
        {
            return None;
        }
        let value: serde_json::Value = serde_json::from_slice(&request.body).ok()?;
        let clause = value.get(&self.field)?.as_str()?.trim();
        if clause.is_empty() {
            None
        } else {
            Some(clause.to_string())
        }
    }

    /// 3. `field=value` anywhere in the raw text.
    fn decode_raw_pair(&self, body: &str) -> Option<String> {
        let captures = self.raw_pair.captures(body)?;
        let decoded = percent_decode_str(&captures[1]).decode_utf8().ok()?;
        let decoded = decoded.trim();
        if decoded.is_empty() {
            None
        } else {
            Some(decoded.to_string())
        }
    }

    /// 4. JSON-like quoted pair embedded in any larger payload.
    fn decode_quoted_pair(&self, body: &str) -> Option<String> {
        let captures = self.quoted_pair.captures(body)?;
        let value = captures[1].trim();
        if value.is_empty() {
            None
        } else {
            Some(value.to_string())
        }
    }
}
