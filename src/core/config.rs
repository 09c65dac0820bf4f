use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::types::DeploymentContext;

// ---------------------------------------------------------------------------
// Runtime configuration: env-var driven, resolved once per process
// ---------------------------------------------------------------------------

pub const ENV_BASE_URL: &str = "CLAUSE_SCOUT_BASE_URL";
pub const ENV_ALLOW_BROWSER_IN_PRODUCTION: &str = "CLAUSE_SCOUT_ALLOW_BROWSER_IN_PRODUCTION";
pub const ENV_BROWSER_BUDGET_SECS: &str = "CLAUSE_SCOUT_BROWSER_BUDGET_SECS";
pub const ENV_DEV_BROWSER_BUDGET_SECS: &str = "CLAUSE_SCOUT_DEV_BROWSER_BUDGET_SECS";
pub const ENV_FETCH_TIMEOUT_SECS: &str = "CLAUSE_SCOUT_FETCH_TIMEOUT_SECS";
pub const ENV_CHROME_EXECUTABLE: &str = "CHROME_EXECUTABLE";
pub const ENV_CHROMEDRIVER_EXECUTABLE: &str = "CHROMEDRIVER_EXECUTABLE";

const DEFAULT_BASE_URL: &str = "https://chartink.com";

/// Everything the pipeline needs to know about its environment that is not
/// per-request. Built from the process environment at startup; tests
/// construct it directly.
#[derive(Debug, Clone)]
pub struct Config {
    /// Scheme + host of the target screening site, no trailing slash.
    pub base_url: String,
    /// Browser automation in production is forbidden by default: it is
    /// resource-heavy and has a history of tripping request-handler
    /// timeouts in constrained containers.
    pub allow_browser_in_production: bool,
    /// Browser-attempt wall-clock budget in production.
    pub browser_budget: Duration,
    /// Browser-attempt budget everywhere else.
    pub dev_browser_budget: Duration,
    /// Total timeout for the plain-HTTP fallback fetch.
    pub fetch_timeout: Duration,
    /// Interval between scans of the capture list.
    pub capture_poll_interval: Duration,
    /// Explicit browser binary, bypassing candidate-path discovery.
    pub browser_executable: Option<PathBuf>,
    /// Explicit driver binary, bypassing candidate-path discovery.
    pub driver_executable: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            allow_browser_in_production: false,
            browser_budget: Duration::from_secs(20),
            dev_browser_budget: Duration::from_secs(45),
            fetch_timeout: Duration::from_secs(15),
            capture_poll_interval: Duration::from_secs(2),
            browser_executable: None,
            driver_executable: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: env_string(ENV_BASE_URL)
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or(defaults.base_url),
            allow_browser_in_production: env_flag(ENV_ALLOW_BROWSER_IN_PRODUCTION),
            browser_budget: env_secs(ENV_BROWSER_BUDGET_SECS).unwrap_or(defaults.browser_budget),
            dev_browser_budget: env_secs(ENV_DEV_BROWSER_BUDGET_SECS)
                .unwrap_or(defaults.dev_browser_budget),
            fetch_timeout: env_secs(ENV_FETCH_TIMEOUT_SECS).unwrap_or(defaults.fetch_timeout),
            capture_poll_interval: defaults.capture_poll_interval,
            browser_executable: executable_override(ENV_CHROME_EXECUTABLE),
            driver_executable: executable_override(ENV_CHROMEDRIVER_EXECUTABLE),
        }
    }

    /// Wall-clock budget for one browser attempt in the given context.
    pub fn browser_budget_for(&self, context: DeploymentContext) -> Duration {
        match context {
            DeploymentContext::Production => self.browser_budget,
            DeploymentContext::Development => self.dev_browser_budget,
        }
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_secs(name: &str) -> Option<Duration> {
    env_string(name)?
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn env_flag(name: &str) -> bool {
    let Some(v) = env_string(name) else {
        return false;
    };
    matches!(
        v.to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Optional override for a binary location. Only honored when the variable
/// points at an existing path, mirroring auto-discovery behavior otherwise.
fn executable_override(name: &str) -> Option<PathBuf> {
    let p = env_string(name)?;
    if Path::new(&p).exists() {
        Some(PathBuf::from(p))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.base_url, "https://chartink.com");
        assert!(!config.allow_browser_in_production);
        assert!(config.browser_budget < config.dev_browser_budget);
    }

    #[test]
    fn test_budget_by_context() {
        let config = Config::default();
        assert_eq!(
            config.browser_budget_for(DeploymentContext::Production),
            Duration::from_secs(20)
        );
        assert_eq!(
            config.browser_budget_for(DeploymentContext::Development),
            Duration::from_secs(45)
        );
    }
}
