//! One disposable automated-browser instance.
//!
//! A `Session` owns exactly one browser process and one uniquely-named
//! temporary profile directory. Sessions are never pooled or reused: the
//! target site fingerprints automation, and the isolated profile makes a
//! fresh process the only safe unit of work. Teardown is unconditional on
//! every exit path: `close()` consumes the session, and `Drop` is the
//! backstop for anything abandoned mid-flight.

use anyhow::{anyhow, Result};
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::Page;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::browser::capture::{self, CaptureStore};
use crate::core::types::CapturedRequest;
use crate::fetch::USER_AGENT;

/// Launch parameters for one session.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    /// Browser binary, as resolved by the environment probe.
    pub executable: PathBuf,
    pub window_width: u32,
    pub window_height: u32,
}

impl LaunchOptions {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            window_width: 1280,
            window_height: 900,
        }
    }
}

/// Script registered before any page script runs. Suppresses the standard
/// "controlled by automation" navigator flag the site keys on.
const NAVIGATOR_HARDENING_SCRIPT: &str = r#"
(() => {
    try {
        const proto = Navigator.prototype;
        // webdriver: prefer "absent" (undefined) over false
        try {
            Object.defineProperty(proto, 'webdriver', {
                get: () => undefined,
                configurable: true,
            });
        } catch (e) {}
        try { delete navigator.webdriver; } catch (e) {}
        try {
            Object.defineProperty(proto, 'languages', {
                get: () => ['en-US', 'en'],
                configurable: true,
            });
        } catch (e) {}
        try {
            Object.defineProperty(proto, 'plugins', {
                get: () => [1, 2, 3, 4, 5],
                configurable: true,
            });
        } catch (e) {}
    } catch (e) {}
})();
"#;

pub struct Session {
    id: Uuid,
    browser: Option<Browser>,
    page: Option<Page>,
    handler_task: Option<JoinHandle<()>>,
    capture_task: Option<JoinHandle<()>>,
    captured: CaptureStore,
    profile_dir: Option<tempfile::TempDir>,
}

impl Session {
    /// Launch a hardened headless browser with an isolated profile and
    /// network capture armed. A launch that fails part-way tears down
    /// whatever it already built before returning the error.
    pub async fn launch(options: &LaunchOptions) -> Result<Session> {
        let id = Uuid::new_v4();
        let profile_dir = tempfile::Builder::new()
            .prefix("clause-scout-")
            .tempdir()
            .map_err(|e| anyhow!("profile dir creation failed: {e}"))?;

        let config = build_headless_config(&options.executable, profile_dir.path(), options)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| anyhow!("launch of {} failed: {e}", options.executable.display()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("CDP handler event error: {e}");
                }
            }
        });

        let mut session = Session {
            id,
            browser: Some(browser),
            page: None,
            handler_task: Some(handler_task),
            capture_task: None,
            captured: CaptureStore::new(),
            profile_dir: Some(profile_dir),
        };

        // Page setup can still fail; from here on the half-built session is
        // torn down before the error propagates.
        match session.arm().await {
            Ok(()) => {
                info!(session = %session.id, exe = %options.executable.display(), "browser session up");
                Ok(session)
            }
            Err(e) => {
                session.teardown().await;
                Err(e)
            }
        }
    }

    async fn arm(&mut self) -> Result<()> {
        let browser = self.browser.as_mut().expect("browser present during arm");
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| anyhow!("blank page open failed: {e}"))?;

        page.execute(AddScriptToEvaluateOnNewDocumentParams::new(
            NAVIGATOR_HARDENING_SCRIPT,
        ))
        .await
        .map_err(|e| anyhow!("navigator hardening injection failed: {e}"))?;

        // Listener must be armed before navigation or the triggering call
        // can fire unobserved.
        let capture_task = capture::spawn_listener(&page, self.captured.clone()).await?;

        self.page = Some(page);
        self.capture_task = Some(capture_task);
        Ok(())
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub async fn navigate(&self, url: &str) -> Result<()> {
        let page = self.page()?;
        page.goto(url)
            .await
            .map_err(|e| anyhow!("navigation to {url} failed: {e}"))?;
        Ok(())
    }

    /// Evaluate a script on the current page, discarding its value.
    pub async fn run_script(&self, script: &str) -> Result<()> {
        let page = self.page()?;
        page.evaluate(script)
            .await
            .map_err(|e| anyhow!("script evaluation failed: {e}"))?;
        Ok(())
    }

    /// Everything captured since launch or the last `clear_captured`.
    pub fn captured_requests(&self) -> Vec<CapturedRequest> {
        self.captured.snapshot()
    }

    /// Reset the capture list without restarting the session.
    pub fn clear_captured(&self) {
        self.captured.clear();
    }

    fn page(&self) -> Result<&Page> {
        self.page
            .as_ref()
            .ok_or_else(|| anyhow!("session has no page"))
    }

    /// Tear the session down. Never fails: process close and profile
    /// removal are both best-effort, log-and-continue.
    pub async fn close(mut self) {
        self.teardown().await;
    }

    async fn teardown(&mut self) {
        if let Some(task) = self.capture_task.take() {
            task.abort();
        }
        self.page.take();

        if let Some(mut browser) = self.browser.take() {
            // The CDP handler task must keep pumping while close runs.
            if let Err(e) = browser.close().await {
                warn!(session = %self.id, "browser close error (non-fatal): {e}");
            }
        }
        if let Some(task) = self.handler_task.take() {
            task.abort();
        }

        if let Some(dir) = self.profile_dir.take() {
            let path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                warn!(session = %self.id, path = %path.display(), "profile dir removal failed: {e}");
            }
        }
        debug!(session = %self.id, "session torn down");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // Backstop for sessions abandoned without close(). Drop cannot
        // await; if a runtime is available, hand the browser close off to
        // it so the child process does not linger.
        if let Some(task) = self.capture_task.take() {
            task.abort();
        }
        if let Some(mut browser) = self.browser.take() {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                let id = self.id;
                handle.spawn(async move {
                    let _ = browser.close().await;
                    debug!(session = %id, "abandoned session browser closed");
                });
            }
        }
        if let Some(task) = self.handler_task.take() {
            task.abort();
        }
        // profile_dir removal is TempDir's drop.
    }
}

fn build_headless_config(
    executable: &Path,
    profile_dir: &Path,
    options: &LaunchOptions,
) -> Result<BrowserConfig> {
    BrowserConfig::builder()
        .chrome_executable(executable)
        .user_data_dir(profile_dir)
        .window_size(options.window_width, options.window_height)
        // Required inside containers without a privileged user namespace.
        .arg("--no-sandbox")
        .arg("--disable-setuid-sandbox")
        // Container /dev/shm is often too small for the renderer.
        .arg("--disable-dev-shm-usage")
        .arg("--disable-gpu")
        .arg("--disable-extensions")
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--hide-scrollbars")
        .arg("--mute-audio")
        // Hides the navigator.webdriver automation fingerprint.
        .arg("--disable-blink-features=AutomationControlled")
        .arg(format!("--user-agent={USER_AGENT}"))
        .build()
        .map_err(|e| anyhow!("browser config build failed: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile_dirs() -> usize {
        std::fs::read_dir(std::env::temp_dir())
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .filter(|e| {
                        e.file_name()
                            .to_string_lossy()
                            .starts_with("clause-scout-")
                    })
                    .count()
            })
            .unwrap_or(0)
    }

    #[test]
    fn test_config_builds_with_hardened_flags() {
        let options = LaunchOptions::new("/usr/bin/chromium");
        let dir = tempfile::tempdir().unwrap();
        let config = build_headless_config(Path::new("/usr/bin/chromium"), dir.path(), &options);
        assert!(config.is_ok());
    }

    #[tokio::test]
    async fn test_failed_launch_leaves_no_profile_dir() {
        let before = profile_dirs();

        let options = LaunchOptions::new("/nonexistent/browser-binary");
        let result = Session::launch(&options).await;
        assert!(result.is_err(), "launch against a missing binary must fail");

        // The profile dir created for the attempt is removed on the error
        // path.
        assert_eq!(profile_dirs(), before);
    }
}
