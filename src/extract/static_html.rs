//! Static HTML extraction: recover a scan clause from already-fetched page
//! markup without executing any script.
//!
//! The screener site embeds the clause in different places depending on
//! release: inline bootstrap scripts, meta tags, form fields, data
//! attributes. Each hiding spot is one strategy; strategies run in a fixed
//! order and the first non-empty hit wins. Weaker guarantee than network
//! capture, but no browser dependency.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::OnceLock;

/// Minimum value length for the loose id-based strategy, to reject boolean
/// flags and short query-string fields.
const ID_MATCH_MIN_LEN: usize = 10;

/// One way of locating the clause in static markup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaticStrategy {
    /// Key/value patterns (`scan_clause`, `scanClause`) inside inline
    /// `<script>` bodies.
    InlineScript,
    /// `<meta>` tags whose `name` mentions scan/clause.
    MetaTag,
    /// `<input>`/`<textarea>` whose `name` or `placeholder` mentions
    /// scan/clause/query.
    FormField,
    /// Any element carrying a `data-*` attribute whose name mentions scan.
    DataAttribute,
    /// `<input>`/`<textarea>` whose `id` matches scan/clause/query, with a
    /// value long enough to plausibly be a clause.
    IdHeuristic,
}

/// Strategy order. First non-empty result wins.
pub const STRATEGIES: &[StaticStrategy] = &[
    StaticStrategy::InlineScript,
    StaticStrategy::MetaTag,
    StaticStrategy::FormField,
    StaticStrategy::DataAttribute,
    StaticStrategy::IdHeuristic,
];

/// Run the ordered strategies against one page. Pure function of the
/// markup: identical input yields identical output.
pub fn extract(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    for strategy in STRATEGIES {
        if let Some(value) = strategy.try_extract(&document) {
            tracing::debug!(?strategy, len = value.len(), "static extraction hit");
            return Some(value);
        }
    }
    None
}

impl StaticStrategy {
    /// Apply this strategy alone. Returns a non-empty value or `None`.
    pub fn try_extract(&self, document: &Html) -> Option<String> {
        match self {
            StaticStrategy::InlineScript => from_scripts(document),
            StaticStrategy::MetaTag => from_meta_tags(document),
            StaticStrategy::FormField => from_form_fields(document),
            StaticStrategy::DataAttribute => from_data_attributes(document),
            StaticStrategy::IdHeuristic => from_id_match(document),
        }
    }
}

fn selector(css: &'static str) -> Selector {
    Selector::parse(css).expect("valid selector literal")
}

fn script_clause_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Covers scan_clause / scanClause in JSON, JS-object, and assignment
    // forms, with either quote style.
    RE.get_or_init(|| {
        Regex::new(r#"(?i)scan_?clause["']?\s*[:=]\s*["']([^"']+)["']"#).expect("valid pattern")
    })
}

fn id_keyword_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)scan|clause|query").expect("valid pattern"))
}

fn from_scripts(document: &Html) -> Option<String> {
    for script in document.select(&selector("script")) {
        let body = script.text().collect::<String>();
        if body.is_empty() {
            continue;
        }
        if let Some(captures) = script_clause_pattern().captures(&body) {
            let value = captures[1].trim().to_string();
            if !value.is_empty() {
                return Some(value);
            }
        }
    }
    None
}

fn from_meta_tags(document: &Html) -> Option<String> {
    for meta in document.select(&selector("meta")) {
        let name = meta.value().attr("name").unwrap_or("").to_ascii_lowercase();
        if !(name.contains("scan") || name.contains("clause")) {
            continue;
        }
        if let Some(content) = meta.value().attr("content") {
            let content = content.trim();
            if !content.is_empty() {
                return Some(content.to_string());
            }
        }
    }
    None
}

fn from_form_fields(document: &Html) -> Option<String> {
    for field in document.select(&selector("input, textarea")) {
        let name = field.value().attr("name").unwrap_or("");
        let placeholder = field.value().attr("placeholder").unwrap_or("");
        let tagged = [name, placeholder].iter().any(|attr| {
            let attr = attr.to_ascii_lowercase();
            attr.contains("scan") || attr.contains("clause") || attr.contains("query")
        });
        if !tagged {
            continue;
        }
        if let Some(value) = field_value(&field) {
            return Some(value);
        }
    }
    None
}

fn from_data_attributes(document: &Html) -> Option<String> {
    for element in document.select(&selector("*")) {
        for (attr_name, attr_value) in element.value().attrs() {
            if !attr_name.starts_with("data-") || !attr_name.contains("scan") {
                continue;
            }
            let value = attr_value.trim();
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}

fn from_id_match(document: &Html) -> Option<String> {
    for field in document.select(&selector("input, textarea")) {
        let id = field.value().attr("id").unwrap_or("");
        if id.is_empty() || !id_keyword_pattern().is_match(id) {
            continue;
        }
        if let Some(value) = field_value(&field) {
            if value.len() > ID_MATCH_MIN_LEN {
                return Some(value);
            }
        }
    }
    None
}

/// An input's `value` attribute, or a textarea's inner text.
fn field_value(field: &ElementRef) -> Option<String> {
    let value = if field.value().name().eq_ignore_ascii_case("textarea") {
        field.text().collect::<String>()
    } else {
        field.value().attr("value").unwrap_or("").to_string()
    };
    let value = value.trim().to_string();
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLAUSE: &str = "( {cash} ( latest close > latest sma( latest close , 20 ) ) )";

    #[test]
    fn test_script_json_form() {
        let html = format!(
            r#"<html><script>window.bootstrap = {{"scan_clause": "{CLAUSE}"}};</script></html>"#
        );
        assert_eq!(extract(&html), Some(CLAUSE.to_string()));
    }

    #[test]
    fn test_script_camel_case_assignment() {
        let html = format!(r#"<html><script>var scanClause = '{CLAUSE}';</script></html>"#);
        assert_eq!(extract(&html), Some(CLAUSE.to_string()));
    }

    #[test]
    fn test_meta_tag() {
        let html = format!(r#"<html><head><meta name="scan-clause" content="{CLAUSE}"></head></html>"#);
        assert_eq!(extract(&html), Some(CLAUSE.to_string()));
    }

    #[test]
    fn test_script_beats_meta() {
        let html = format!(
            r#"<html><head><meta name="scan-clause" content="from-meta"></head>
            <script>var data = {{"scan_clause": "from-script"}};</script></html>"#
        );
        assert_eq!(extract(&html), Some("from-script".to_string()));
    }

    #[test]
    fn test_form_field_by_name() {
        let html = format!(r#"<html><form><input name="scan_clause" value="{CLAUSE}"></form></html>"#);
        assert_eq!(extract(&html), Some(CLAUSE.to_string()));
    }

    #[test]
    fn test_textarea_by_placeholder() {
        let html =
            format!(r#"<html><textarea placeholder="Enter query here">{CLAUSE}</textarea></html>"#);
        assert_eq!(extract(&html), Some(CLAUSE.to_string()));
    }

    #[test]
    fn test_data_attribute() {
        let html = format!(r#"<html><div data-scan-expression="{CLAUSE}">run</div></html>"#);
        assert_eq!(extract(&html), Some(CLAUSE.to_string()));
    }

    #[test]
    fn test_id_heuristic_rejects_short_values() {
        let short = r#"<html><input id="query-toggle" value="on"></html>"#;
        assert_eq!(extract(short), None);

        let long = format!(r#"<html><input id="queryBuilder" value="{CLAUSE}"></html>"#);
        assert_eq!(extract(&long), Some(CLAUSE.to_string()));
    }

    #[test]
    fn test_no_match_anywhere() {
        let html = "<html><body><h1>Screener</h1><p>Sign in to view.</p></body></html>";
        assert_eq!(extract(html), None);
    }

    #[test]
    fn test_idempotent() {
        let html = format!(r#"<html><script>var s = {{"scan_clause": "{CLAUSE}"}};</script></html>"#);
        let first = extract(&html);
        let second = extract(&html);
        assert_eq!(first, second);
        assert!(first.is_some());
    }

    #[test]
    fn test_strategy_order_is_stable() {
        assert_eq!(STRATEGIES[0], StaticStrategy::InlineScript);
        assert_eq!(STRATEGIES[1], StaticStrategy::MetaTag);
        assert_eq!(STRATEGIES.len(), 5);
    }
}
