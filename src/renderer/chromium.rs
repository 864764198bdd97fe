//! Chromium launch and lifecycle, via chromiumoxide.

use crate::config::{Config, USER_AGENT};
use crate::error::{RelayError, RelayResult};
use crate::renderer::shared::{InstanceState, SharedInstance};
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Find the Chromium binary path.
pub fn find_chromium(override_path: Option<&str>) -> Option<PathBuf> {
    // 1. Explicit override (RELAY_CHROMIUM_PATH)
    if let Some(p) = override_path {
        let path = PathBuf::from(p);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. ~/.rate-relay/chromium/
    if let Some(home) = dirs::home_dir() {
        let candidates = [
            home.join(".rate-relay/chromium/chrome-linux64/chrome"),
            home.join(".rate-relay/chromium/chrome"),
        ];
        for c in candidates {
            if c.exists() {
                return Some(c);
            }
        }
    }

    // 3. System PATH
    for name in ["google-chrome", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    None
}

/// Fixed launch configuration. Sandbox disabled for containerized
/// execution; window size and user agent pinned so the rendered page is
/// deterministic across hosts.
fn browser_config(chromium_path: Option<&str>) -> RelayResult<BrowserConfig> {
    let chrome_path = find_chromium(chromium_path).ok_or_else(|| {
        RelayError::LaunchFailure(
            "Chromium not found. Set RELAY_CHROMIUM_PATH or install google-chrome.".into(),
        )
    })?;

    BrowserConfig::builder()
        .chrome_executable(chrome_path)
        .arg("--headless=new")
        .arg("--disable-gpu")
        .arg("--no-sandbox")
        .arg("--disable-dev-shm-usage")
        .arg("--disable-extensions")
        .arg("--disable-background-networking")
        .arg("--window-size=1920,1080")
        .arg(format!("--user-agent={USER_AGENT}"))
        .build()
        .map_err(RelayError::LaunchFailure)
}

/// A launched shared browser plus its liveness flag.
///
/// `Browser::close` needs exclusive access, so the browser sits behind a
/// mutex; page creation is serialized through it but page *use* is not.
pub struct BrowserHandle {
    browser: Mutex<Browser>,
    connected: Arc<AtomicBool>,
}

impl BrowserHandle {
    /// Whether the CDP event stream is still running.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Open a fresh page. Callers own the page and must close it on every
    /// exit path; the handle itself stays open across cycles.
    pub async fn new_page(&self, url: &str) -> RelayResult<Page> {
        let browser = self.browser.lock().await;
        browser
            .new_page(url)
            .await
            .map_err(|e| RelayError::LaunchFailure(format!("failed to open page: {e}")))
    }

    /// Pages currently attached to the browser, including the initial
    /// blank target.
    pub async fn pages(&self) -> RelayResult<Vec<Page>> {
        let browser = self.browser.lock().await;
        browser
            .pages()
            .await
            .map_err(|e| RelayError::Evaluation(format!("failed to list pages: {e}")))
    }

    async fn close(&self) {
        let mut browser = self.browser.lock().await;
        if let Err(e) = browser.close().await {
            warn!("error closing browser: {e}");
        }
    }
}

/// Process-wide shared Chromium instance behind an acquire/release contract.
///
/// `acquire()` is safe to call concurrently: at most one underlying launch
/// occurs and all concurrent callers converge on the same instance (or the
/// same launch failure). `release()` is for process shutdown only; pages
/// are opened and closed per cycle, the instance persists.
pub struct BrowserManager {
    chromium_path: Option<String>,
    shared: Arc<SharedInstance<BrowserHandle>>,
}

impl BrowserManager {
    pub fn new(config: &Config) -> Self {
        Self {
            chromium_path: config.chromium_path.clone(),
            shared: Arc::new(SharedInstance::new()),
        }
    }

    /// Current lifecycle state, for status endpoints.
    pub fn state(&self) -> InstanceState {
        self.shared.state()
    }

    /// Return the shared browser, launching it on first use or after a
    /// disconnect. Launch failure is not retried here; the caller's cycle
    /// fails and the scheduler's next tick is the retry.
    pub async fn acquire(&self) -> RelayResult<Arc<BrowserHandle>> {
        let chromium_path = self.chromium_path.clone();
        let shared = Arc::clone(&self.shared);
        self.shared
            .get_or_init(
                |h| h.is_connected(),
                move || launch_shared(chromium_path, shared),
            )
            .await
    }

    /// Close the shared instance if one exists. Shutdown only.
    pub async fn release(&self) {
        if let Some(handle) = self.shared.take().await {
            info!("closing shared browser instance");
            handle.close().await;
        }
    }
}

/// Launch the shared instance and register its disconnect observer.
async fn launch_shared(
    chromium_path: Option<String>,
    shared: Arc<SharedInstance<BrowserHandle>>,
) -> RelayResult<BrowserHandle> {
    info!("launching shared browser instance");
    let config = browser_config(chromium_path.as_deref())?;

    let (browser, mut handler) = Browser::launch(config)
        .await
        .map_err(|e| RelayError::LaunchFailure(e.to_string()))?;

    let connected = Arc::new(AtomicBool::new(true));

    // Drain CDP events until the browser goes away. When the stream ends
    // the instance is dead: flag it and clear the shared slot so the next
    // acquire() relaunches.
    let flag = Arc::clone(&connected);
    tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(e) = event {
                debug!("browser handler event error: {e}");
            }
        }
        warn!("browser disconnected; it will be relaunched on next use");
        flag.store(false, Ordering::Release);
        shared.prune(|h: &BrowserHandle| h.is_connected()).await;
    });

    Ok(BrowserHandle {
        browser: Mutex::new(browser),
        connected,
    })
}

/// A single-use browser for the delivery escalation path.
///
/// Deliberately independent of the shared extraction instance: escalation
/// is the rare path and a fresh context each time keeps its lifecycle
/// trivial: launch, use, close.
pub struct EphemeralBrowser {
    browser: Browser,
    handler_task: JoinHandle<()>,
}

impl EphemeralBrowser {
    pub async fn launch(chromium_path: Option<&str>) -> RelayResult<Self> {
        let config = browser_config(chromium_path)?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| RelayError::LaunchFailure(e.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        Ok(Self {
            browser,
            handler_task,
        })
    }

    pub async fn new_page(&self, url: &str) -> RelayResult<Page> {
        self.browser
            .new_page(url)
            .await
            .map_err(|e| RelayError::LaunchFailure(format!("failed to open page: {e}")))
    }

    /// Close the browser and stop its event loop. Always called, success
    /// or failure, so the escalation path never leaks an instance.
    pub async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            warn!("error closing ephemeral browser: {e}");
        }
        self.handler_task.abort();
    }
}
