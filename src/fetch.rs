//! Plain-HTTP page fetch for the static fallback path.
//!
//! No script execution, one GET per attempt. Bounded by the client's own
//! connect/read timeout rather than the orchestrator's cancellation; a
//! blocked fetch resolves on its own within `fetch_timeout`.

use std::time::Duration;

use crate::core::types::ExtractError;

/// Fixed desktop user agent. Both the browser session and this fallback
/// client present the same identity so the site serves comparable markup.
pub const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Static request headers presented alongside the user agent.
pub fn stealth_headers() -> Vec<(&'static str, &'static str)> {
    vec![
        (
            "Accept",
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
        ),
        ("Accept-Language", "en-US,en;q=0.5"),
        ("Connection", "keep-alive"),
    ]
}

/// Build the fallback HTTP client. One per pipeline; requests are bounded by
/// `timeout` end to end.
pub fn build_client(timeout: Duration) -> Result<reqwest::Client, ExtractError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .redirect(reqwest::redirect::Policy::limited(10))
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| ExtractError::Fetch(format!("client build failed: {e}")))
}

/// GET the screener page and return its body. Transport errors and non-2xx
/// statuses both map to `ExtractError::Fetch`, the pipeline's only
/// caller-visible failure.
pub async fn fetch_screener_page(
    client: &reqwest::Client,
    url: &str,
) -> Result<String, ExtractError> {
    tracing::info!(url, "fetching screener page over plain HTTP");

    let mut request = client.get(url);
    for (name, value) in stealth_headers() {
        request = request.header(name, value);
    }

    let response = request
        .send()
        .await
        .map_err(|e| ExtractError::Fetch(format!("request to {url} failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(ExtractError::Fetch(format!(
            "{url} answered {status}"
        )));
    }

    response
        .text()
        .await
        .map_err(|e| ExtractError::Fetch(format!("reading body from {url} failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_builds() {
        assert!(build_client(Duration::from_secs(15)).is_ok());
    }

    #[test]
    fn test_stealth_headers_include_accept() {
        let headers = stealth_headers();
        assert!(headers.iter().any(|(name, _)| *name == "Accept"));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_fetch_error() {
        let client = build_client(Duration::from_millis(500)).unwrap();
        let err = fetch_screener_page(&client, "http://127.0.0.1:1/screener/demo")
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::Fetch(_)));
    }
}
