//! The extraction pipeline: probe the environment, decide whether browser
//! automation is worth attempting, run it under a hard deadline, and fall
//! back to static extraction of a plain fetch. Callers always get a definite
//! answer: a clause, an explicit manual placeholder, or (only when the
//! fallback fetch itself dies) a failure.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use tracing::{info, warn};

use crate::browser::{LaunchOptions, Session};
use crate::core::types::{
    DeploymentContext, ExtractError, ExtractionRequest, ExtractionResult,
};
use crate::core::Config;
use crate::extract::network::{self, RequestMatcher};
use crate::extract::static_html;
use crate::probe::{self, EnvironmentSnapshot};
use crate::fetch;

/// Body field carrying the clause in the site's backtest call.
pub const SCAN_CLAUSE_FIELD: &str = "scan_clause";

/// URL fragment identifying that call among everything a page load fires.
pub const BACKTEST_ENDPOINT_FRAGMENT: &str = "backtest/process";

/// Percent-encode everything but unreserved characters, so the browser
/// navigation and the plain fetch always address the same page.
const SEGMENT_ENCODE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// The screener page URL for both extraction paths.
pub fn screener_url(base_url: &str, screener: &str) -> String {
    format!(
        "{}/screener/{}",
        base_url.trim_end_matches('/'),
        utf8_percent_encode(screener, SEGMENT_ENCODE)
    )
}

/// A request-level Development can still be running on a restricted host;
/// the hosting indicators win because they describe the actual container.
pub fn effective_context(
    requested: DeploymentContext,
    snapshot: &EnvironmentSnapshot,
) -> DeploymentContext {
    if snapshot.is_restricted_deployment {
        DeploymentContext::Production
    } else {
        requested
    }
}

/// Gate for the browser path: both binaries present, and not a production
/// deployment with the default forbid-browser policy. Production containers
/// have a history of request-handler timeouts under a full browser even when
/// the binaries are nominally installed.
pub fn attempt_browser_permitted(
    snapshot: &EnvironmentSnapshot,
    context: DeploymentContext,
    allow_in_production: bool,
) -> bool {
    if !snapshot.browser_stack_available() {
        return false;
    }
    !(context == DeploymentContext::Production && !allow_in_production)
}

pub struct ClausePipeline {
    config: Config,
    client: reqwest::Client,
}

impl ClausePipeline {
    pub fn new(config: Config) -> Result<Self, ExtractError> {
        let client = fetch::build_client(config.fetch_timeout)?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Resolve one screener to a scan clause. Browser-path failures of any
    /// kind (launch, navigation, timeout) degrade to the static path; only
    /// a fallback-fetch failure is a hard failure.
    pub async fn resolve(&self, request: &ExtractionRequest) -> ExtractionResult {
        let snapshot = probe::probe(&self.config);
        let context = effective_context(request.context, &snapshot);
        let url = screener_url(&self.config.base_url, &request.screener);

        if attempt_browser_permitted(&snapshot, context, self.config.allow_browser_in_production)
        {
            match self.browser_attempt(&snapshot, context, &url).await {
                Ok(clause) => {
                    info!(screener = %request.screener, "clause recovered from network capture");
                    return ExtractionResult::Resolved(clause);
                }
                Err(e) => {
                    warn!(
                        screener = %request.screener,
                        "browser attempt failed ({e}); falling back to static extraction"
                    );
                }
            }
        } else {
            info!(
                screener = %request.screener,
                context = context.as_str(),
                browser = snapshot.has_browser_binary,
                driver = snapshot.has_driver_binary,
                "browser automation not attempted"
            );
        }

        match fetch::fetch_screener_page(&self.client, &url).await {
            Ok(html) => match static_html::extract(&html) {
                Some(clause) => {
                    info!(screener = %request.screener, "clause recovered from static markup");
                    ExtractionResult::Resolved(clause)
                }
                None => {
                    warn!(screener = %request.screener, "all strategies exhausted");
                    ExtractionResult::manual_placeholder(&request.screener)
                }
            },
            Err(e) => ExtractionResult::Failed(e),
        }
    }

    /// Drive a fresh session at the screener page and poll its captures for
    /// the backtest call, all under the context's wall-clock budget. The
    /// deadline drops the in-flight future; teardown runs unconditionally
    /// after, on success, failure, and timeout alike.
    async fn browser_attempt(
        &self,
        snapshot: &EnvironmentSnapshot,
        context: DeploymentContext,
        url: &str,
    ) -> anyhow::Result<String> {
        let executable = snapshot
            .browser_path
            .clone()
            .ok_or_else(|| anyhow::anyhow!("probe resolved no browser path"))?;
        let budget = self.config.browser_budget_for(context);

        let session = Session::launch(&LaunchOptions::new(executable)).await?;

        let matcher = RequestMatcher::new(BACKTEST_ENDPOINT_FRAGMENT, "POST");
        let attempt = async {
            session.navigate(url).await?;
            let clause = network::poll(
                || session.captured_requests(),
                &matcher,
                SCAN_CLAUSE_FIELD,
                self.config.capture_poll_interval,
            )
            .await;
            Ok::<String, anyhow::Error>(clause)
        };

        let outcome = tokio::time::timeout(budget, attempt).await;
        session.close().await;

        match outcome {
            Ok(Ok(clause)) => Ok(clause),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(ExtractError::Timeout(budget).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn snapshot(browser: bool, driver: bool, restricted: bool) -> EnvironmentSnapshot {
        EnvironmentSnapshot {
            has_browser_binary: browser,
            has_driver_binary: driver,
            is_restricted_deployment: restricted,
            browser_path: browser.then(|| PathBuf::from("/usr/bin/google-chrome")),
            driver_path: driver.then(|| PathBuf::from("/usr/bin/chromedriver")),
        }
    }

    #[test]
    fn test_production_policy_blocks_browser_despite_binaries() {
        let snap = snapshot(true, true, false);
        assert!(!attempt_browser_permitted(
            &snap,
            DeploymentContext::Production,
            false
        ));
        // Explicit opt-in reopens the path.
        assert!(attempt_browser_permitted(
            &snap,
            DeploymentContext::Production,
            true
        ));
    }

    #[test]
    fn test_missing_binaries_block_browser_everywhere() {
        for (browser, driver) in [(false, false), (true, false), (false, true)] {
            let snap = snapshot(browser, driver, false);
            assert!(!attempt_browser_permitted(
                &snap,
                DeploymentContext::Development,
                true
            ));
        }
    }

    #[test]
    fn test_development_with_full_stack_attempts_browser() {
        let snap = snapshot(true, true, false);
        assert!(attempt_browser_permitted(
            &snap,
            DeploymentContext::Development,
            false
        ));
    }

    #[test]
    fn test_restricted_host_hardens_context() {
        let snap = snapshot(true, true, true);
        assert_eq!(
            effective_context(DeploymentContext::Development, &snap),
            DeploymentContext::Production
        );
        assert_eq!(
            effective_context(DeploymentContext::Development, &snapshot(true, true, false)),
            DeploymentContext::Development
        );
    }

    #[test]
    fn test_screener_url_plain_name() {
        assert_eq!(
            screener_url("https://chartink.com", "bittu-daily-trading"),
            "https://chartink.com/screener/bittu-daily-trading"
        );
    }

    #[test]
    fn test_screener_url_encodes_once_for_both_paths() {
        // Names needing encoding must produce one canonical URL, whichever
        // path consumes it.
        let url = screener_url("https://chartink.com/", "momentum 50% & more");
        assert_eq!(
            url,
            "https://chartink.com/screener/momentum%2050%25%20%26%20more"
        );
        // Unreserved characters pass through untouched.
        assert_eq!(
            screener_url("https://chartink.com", "a-b_c.d~e"),
            "https://chartink.com/screener/a-b_c.d~e"
        );
    }

    #[test]
    fn test_timeout_error_is_typed_recoverable() {
        let budget = std::time::Duration::from_secs(20);
        let err: anyhow::Error = ExtractError::Timeout(budget).into();
        let kind = err.downcast_ref::<ExtractError>().unwrap();
        assert!(matches!(kind, ExtractError::Timeout(_)));
    }
}
