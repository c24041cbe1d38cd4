use std::path::Path;

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::CookieParam;
use chromiumoxide::Page;
use futures_util::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration, Instant};

use crate::collector::StandingsView;
use crate::config::Config;
use crate::error::WatchError;
use crate::extract::{ROW_CSS, TABLE_CSS};

/// ============================================================
/// BrowserSession
/// ============================================================
///
/// The **single long-lived automated browser session**: one
/// chromium process, one authenticated context, one page, reused
/// across every poll to avoid repeated navigation and login.
///
/// Responsibilities:
/// - Launch chromium and pump its event handler
/// - Restore persisted cookies, or run the one-time interactive
///   login and persist them
/// - Navigate / reload the contest page
/// - Expose the two StandingsView capabilities to the collector
/// - Release all resources exactly once
///
/// OWNERSHIP:
/// - Exactly one session exists and the scheduler owns it. The
///   underlying protocol is not safely reentrant, so no two
///   operations are ever issued concurrently.
pub struct BrowserSession {
    browser: Option<Browser>,
    page: Option<Page>,
    handler_task: Option<JoinHandle<()>>,
    closed: bool,
}

impl BrowserSession {
    /// Launches the browser, establishes authentication and opens
    /// the contest page.
    ///
    /// Authentication is a recovery path, not a failure: when the
    /// cookie blob exists it is loaded silently; otherwise a
    /// headed window opens, the operator logs in and confirms on
    /// the console, and the blob is written for future runs.
    pub async fn initialize(cfg: &Config, contest_url: &str) -> Result<Self, WatchError> {
        let have_auth = Path::new(&cfg.auth_state_file).exists();

        // Interactive login needs a visible window, overriding the
        // headless flag for this run.
        let headed = !have_auth || !cfg.headless;
        let mut builder = BrowserConfig::builder();
        if headed {
            builder = builder.with_head();
        }
        let browser_cfg = builder.build().map_err(WatchError::Session)?;

        let (browser, mut handler) = Browser::launch(browser_cfg).await?;
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = browser.new_page(cfg.login_url.as_str()).await?;
        let mut session = Self {
            browser: Some(browser),
            page: Some(page),
            handler_task: Some(handler_task),
            closed: false,
        };

        // Release the half-built session on any setup failure so
        // no chromium process outlives an aborted initialization.
        if let Err(e) = session.establish(cfg, contest_url, have_auth).await {
            session.close().await;
            return Err(e);
        }
        Ok(session)
    }

    async fn establish(
        &mut self,
        cfg: &Config,
        contest_url: &str,
        have_auth: bool,
    ) -> Result<(), WatchError> {
        if have_auth {
            self.restore_cookies(&cfg.auth_state_file).await?;
        } else {
            self.interactive_login(&cfg.auth_state_file).await?;
        }

        log::info!("navigating to {contest_url}");
        self.page()?.goto(contest_url).await?;
        Ok(())
    }

    /// Loads the persisted cookie blob into the page context.
    async fn restore_cookies(&self, path: &str) -> Result<(), WatchError> {
        log::info!("authentication state found, loading from {path}");
        let data = std::fs::read_to_string(path)?;
        let cookies: Vec<CookieParam> = serde_json::from_str(&data)
            .map_err(|e| WatchError::Session(format!("auth blob {path}: {e}")))?;
        self.page()?.set_cookies(cookies).await?;
        Ok(())
    }

    /// One-time blocking interactive login. Waits for the operator
    /// to finish in the browser window and press Enter on the
    /// console, then persists the session cookies.
    async fn interactive_login(&self, path: &str) -> Result<(), WatchError> {
        log::warn!("no authentication state found, please log in");
        println!("Please log in to your account in the browser window.");
        println!("Once you are logged in, press Enter in this console to continue...");

        tokio::task::spawn_blocking(|| {
            let mut line = String::new();
            std::io::stdin().read_line(&mut line).map(|_| ())
        })
        .await
        .map_err(|e| WatchError::Session(format!("stdin wait failed: {e}")))??;

        let cookies = self.page()?.get_cookies().await?;
        let blob = serde_json::to_string_pretty(&cookies)
            .map_err(|e| WatchError::Session(format!("serializing auth blob: {e}")))?;
        std::fs::write(path, blob)?;
        log::info!("authentication state saved to {path}");
        Ok(())
    }

    /// Triggers a full page reload, forcing fresh server-side
    /// standings data. The caller owns the settle wait.
    pub async fn reload(&self) -> Result<(), WatchError> {
        self.page()?.reload().await?;
        Ok(())
    }

    /// Polls for the standings table container until it mounts or
    /// the deadline passes. A missing table is a transient page
    /// condition, not a session failure.
    pub async fn wait_for_standings_table(&self, timeout: Duration) -> Result<(), WatchError> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.page()?.find_element(TABLE_CSS).await.is_ok() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(WatchError::PageNotReady(format!(
                    "standings table absent after {timeout:?}"
                )));
            }
            sleep(Duration::from_millis(500)).await;
        }
    }

    /// Cheap liveness probe. Used after a failed poll to decide
    /// between transient backoff and fatal shutdown: only a dead
    /// page escalates the error.
    pub async fn is_alive(&self) -> bool {
        match self.page() {
            Ok(page) => page.evaluate("1 + 1").await.is_ok(),
            Err(_) => false,
        }
    }

    /// Releases the browser and all automation resources.
    ///
    /// CONTRACT:
    /// - Idempotent. Safe after an error and after a previous
    ///   close; repeat calls are no-ops.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.page = None;

        if let Some(mut browser) = self.browser.take() {
            if let Err(e) = browser.close().await {
                log::warn!("browser close failed: {e}");
            }
            let _ = browser.wait().await;
        }
        if let Some(task) = self.handler_task.take() {
            task.abort();
        }
        log::info!("browser session closed");
    }

    fn page(&self) -> Result<&Page, WatchError> {
        self.page
            .as_ref()
            .ok_or_else(|| WatchError::Session("no active page".into()))
    }
}

#[async_trait::async_trait]
impl StandingsView for BrowserSession {
    async fn mounted_markup(&self) -> Result<String, WatchError> {
        Ok(self.page()?.content().await?)
    }

    async fn scroll_to_last_row(&self) -> Result<(), WatchError> {
        // scrollIntoView on the last mounted row makes the
        // virtualized list mount the next window.
        let script = format!(
            "(() => {{ const rows = document.querySelectorAll('{ROW_CSS}'); \
             if (rows.length > 0) {{ rows[rows.length - 1].scrollIntoView(); }} }})()"
        );
        self.page()?.evaluate(script).await?;
        Ok(())
    }
}
