//! Browser session management
//!
//! Launches and controls the Chrome instance used for a run. The session
//! owns the single page used throughout, dispatches pointer and keyboard
//! input as raw CDP events paced by the humanize module, and is closed on
//! every exit path.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chromiumoxide::browser::HeadlessMode;
use chromiumoxide::cdp::browser_protocol::emulation::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchKeyEventParams, DispatchKeyEventType, DispatchMouseEventParams, DispatchMouseEventType,
    MouseButton,
};
use chromiumoxide::cdp::browser_protocol::network::{Headers, SetExtraHttpHeadersParams};
use chromiumoxide::cdp::browser_protocol::page::{
    CaptureScreenshotFormat, CaptureScreenshotParams, ReloadParams,
};
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::humanize::{self, Point};

use super::BrowserError;

/// User agents rotated per run. Matching common desktop browsers keeps the
/// session from standing out in server logs.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Edge/119.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Safari/605.1.15",
];

/// Find Chrome/Chromium executable on the system
fn find_chrome() -> Option<PathBuf> {
    let candidates: Vec<PathBuf> = if cfg!(target_os = "windows") {
        let mut paths = vec![
            PathBuf::from(r"C:\Program Files\Google\Chrome\Application\chrome.exe"),
            PathBuf::from(r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe"),
        ];
        if let Ok(local) = std::env::var("LOCALAPPDATA") {
            paths.push(PathBuf::from(format!(
                r"{}\Google\Chrome\Application\chrome.exe",
                local
            )));
        }
        paths
    } else if cfg!(target_os = "macos") {
        vec![PathBuf::from(
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        )]
    } else {
        vec![
            PathBuf::from("/usr/bin/google-chrome"),
            PathBuf::from("/usr/bin/google-chrome-stable"),
            PathBuf::from("/usr/bin/chromium"),
            PathBuf::from("/usr/bin/chromium-browser"),
        ]
    };

    candidates.into_iter().find(|p| p.exists())
}

/// Configuration for the browser session
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserSessionConfig {
    /// Path to Chrome/Chromium executable
    pub chrome_path: Option<String>,
    /// Run in headless mode
    pub headless: bool,
    /// Navigation / wait timeout in seconds
    pub timeout_secs: u64,
    /// Window width
    pub window_width: u32,
    /// Window height
    pub window_height: u32,
    /// Accept-Language header sent with every request
    pub accept_language: String,
}

impl Default for BrowserSessionConfig {
    fn default() -> Self {
        Self {
            chrome_path: None,
            headless: false,
            timeout_secs: 30,
            window_width: 1280,
            window_height: 800,
            accept_language: "en-US,en;q=0.9".to_string(),
        }
    }
}

impl BrowserSessionConfig {
    /// Set headless mode
    pub fn headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Set Chrome path
    pub fn chrome_path(mut self, path: Option<String>) -> Self {
        self.chrome_path = path;
        self
    }

    /// Set timeout
    pub fn timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Set window size
    pub fn window(mut self, width: u32, height: u32) -> Self {
        self.window_width = width;
        self.window_height = height;
        self
    }
}

/// Snapshot of the page used by the challenge predicate and the outcome
/// classifier.
#[derive(Debug, Clone, Default)]
pub struct PageState {
    pub url: String,
    pub title: String,
    pub body_text: String,
}

/// An element's bounding box in page coordinates.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// The browser session for a login run
pub struct BrowserSession {
    /// The browser instance
    browser: Arc<RwLock<Option<Browser>>>,
    /// The single page used for the whole run
    page: Arc<RwLock<Option<Page>>>,
    /// Whether the session is alive
    alive: Arc<AtomicBool>,
    /// Clicks issued so far
    click_count: AtomicU64,
}

impl BrowserSession {
    /// Launch a browser and prepare the page for the run.
    pub async fn new(config: &BrowserSessionConfig) -> Result<Self, BrowserError> {
        info!("Launching browser session (headless: {})", config.headless);

        let chrome_path = match config.chrome_path.as_ref().map(PathBuf::from).or_else(find_chrome) {
            Some(p) => p,
            None => {
                return Err(BrowserError::LaunchFailed(
                    "Chrome/Chromium not found; install it or set chromePath".to_string(),
                ))
            }
        };
        debug!("Using Chrome at: {}", chrome_path.display());

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .window_size(config.window_width, config.window_height)
            .request_timeout(Duration::from_secs(config.timeout_secs))
            // Anti-automation tells
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-infobars")
            .arg("--no-default-browser-check")
            .arg("--no-first-run")
            .arg("--disable-notifications")
            .arg("--disable-session-crashed-bubble")
            .arg("--disable-save-password-bubble")
            .arg("--window-position=50,50")
            // Required when running as root (e.g. in Docker or on a VPS)
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu");

        if config.headless {
            builder = builder.headless_mode(HeadlessMode::New);
        } else {
            builder = builder.with_head();
        }

        let browser_config = builder
            .build()
            .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;

        // Drive CDP events in the background; when the stream ends, Chrome is
        // gone and the session is marked dead.
        let alive = Arc::new(AtomicBool::new(true));
        let alive_for_handler = alive.clone();
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser handler event error: {:?}", e);
                }
            }
            warn!("Chrome disconnected (event handler ended)");
            alive_for_handler.store(false, Ordering::Relaxed);
        });

        // Chrome opens with a blank tab; adopt it and close any extras.
        let page = {
            let mut pages = browser
                .pages()
                .await
                .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;

            let main_page = if !pages.is_empty() {
                pages.remove(0)
            } else {
                browser
                    .new_page("about:blank")
                    .await
                    .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?
            };

            for extra in pages {
                debug!("Closing extra blank tab");
                let _ = extra.close().await;
            }

            main_page
        };

        Self::apply_identity(&page, config).await?;

        info!("Browser session ready");

        Ok(Self {
            browser: Arc::new(RwLock::new(Some(browser))),
            page: Arc::new(RwLock::new(Some(page))),
            alive,
            click_count: AtomicU64::new(0),
        })
    }

    /// Apply a user agent from the pool plus the configured Accept-Language
    /// header, both at the CDP level.
    async fn apply_identity(page: &Page, config: &BrowserSessionConfig) -> Result<(), BrowserError> {
        let mut rng = StdRng::from_entropy();
        let ua = USER_AGENTS[rng.gen_range(0..USER_AGENTS.len())];
        debug!("User agent for this run: {}", ua);

        let ua_params = SetUserAgentOverrideParams::builder()
            .user_agent(ua)
            .accept_language(config.accept_language.clone())
            .build()
            .map_err(BrowserError::LaunchFailed)?;
        page.execute(ua_params)
            .await
            .map_err(|e| BrowserError::LaunchFailed(format!("Failed to set user agent: {}", e)))?;

        let headers_json = serde_json::json!({
            "Accept-Language": config.accept_language,
        });
        let extra_headers = SetExtraHttpHeadersParams::new(Headers::new(headers_json));
        page.execute(extra_headers)
            .await
            .map_err(|e| BrowserError::LaunchFailed(format!("Failed to set extra headers: {}", e)))?;

        Ok(())
    }

    /// Check if the session is alive
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }

    /// Get click count
    pub fn click_count(&self) -> u64 {
        self.click_count.load(Ordering::Relaxed)
    }

    async fn page(&self) -> Result<Page, BrowserError> {
        self.page
            .read()
            .await
            .clone()
            .ok_or_else(|| BrowserError::ConnectionLost("No active page".into()))
    }

    /// Navigate to a URL
    pub async fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        let page = self.page().await?;
        debug!("Navigating to: {}", url);
        page.goto(url)
            .await
            .map_err(|e| BrowserError::NavigationFailed(e.to_string()))?;
        Ok(())
    }

    /// Wait for navigation to complete
    pub async fn wait_for_navigation(&self, timeout_secs: u64) -> Result<(), BrowserError> {
        let page = self.page().await?;
        tokio::time::timeout(Duration::from_secs(timeout_secs), page.wait_for_navigation())
            .await
            .map_err(|_| BrowserError::Timeout("Navigation timeout".into()))?
            .map_err(|e| BrowserError::NavigationFailed(e.to_string()))?;
        Ok(())
    }

    /// Reload the page
    pub async fn reload(&self) -> Result<(), BrowserError> {
        let page = self.page().await?;
        page.execute(ReloadParams::default())
            .await
            .map_err(|e| BrowserError::NavigationFailed(format!("Reload failed: {}", e)))?;
        Ok(())
    }

    /// Execute JavaScript on the page
    pub async fn execute_js(&self, script: &str) -> Result<serde_json::Value, BrowserError> {
        let page = self.page().await?;
        let result = page
            .evaluate(script)
            .await
            .map_err(|e| BrowserError::JavaScriptError(e.to_string()))?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    /// Get current URL
    pub async fn current_url(&self) -> Result<String, BrowserError> {
        let page = self.page().await?;
        page.url()
            .await
            .map_err(|e| BrowserError::ConnectionLost(e.to_string()))?
            .ok_or_else(|| BrowserError::ConnectionLost("No URL".into()))
    }

    /// Get page title
    pub async fn page_title(&self) -> Result<String, BrowserError> {
        let value = self.execute_js("document.title || ''").await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    /// Get the visible body text
    pub async fn body_text(&self) -> Result<String, BrowserError> {
        let value = self
            .execute_js("document.body ? document.body.innerText : ''")
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    /// Snapshot url, title and body text in one call
    pub async fn page_state(&self) -> Result<PageState, BrowserError> {
        Ok(PageState {
            url: self.current_url().await?,
            title: self.page_title().await?,
            body_text: self.body_text().await?,
        })
    }

    /// Query a selector and return its bounding box, or None when the
    /// selector matches nothing visible.
    pub async fn selector_box(&self, selector: &str) -> Result<Option<BoundingBox>, BrowserError> {
        let escaped = selector.replace('\\', "\\\\").replace('"', "\\\"");
        let script = format!(
            r#"
            (function() {{
                const el = document.querySelector("{}");
                if (!el) return null;
                const r = el.getBoundingClientRect();
                if (!r.width || !r.height) return null;
                return {{ x: r.x, y: r.y, width: r.width, height: r.height }};
            }})()
            "#,
            escaped
        );

        let value = self.execute_js(&script).await?;
        if value.is_null() {
            return Ok(None);
        }
        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| BrowserError::JavaScriptError(format!("Bad bounding box: {}", e)))
    }

    /// Move the pointer to the target along a jittered multi-step path.
    pub async fn move_mouse_human(&self, target: Point) -> Result<(), BrowserError> {
        let page = self.page().await?;
        let mut rng = StdRng::from_entropy();

        // Start from a random position (simulates an existing cursor)
        let start = Point::new(rng.gen_range(50.0..250.0), rng.gen_range(50.0..250.0));
        let steps = humanize::steps_for_distance(start.distance_to(target));
        let path = humanize::mouse_path(start, target, steps, 5.0, &mut rng);

        let total = path.len();
        for (i, point) in path.into_iter().enumerate() {
            let move_event = DispatchMouseEventParams::builder()
                .r#type(DispatchMouseEventType::MouseMoved)
                .x(point.x)
                .y(point.y)
                .button(MouseButton::None)
                .build()
                .unwrap();
            page.execute(move_event).await.ok();

            let t = i as f64 / (total - 1).max(1) as f64;
            tokio::time::sleep(humanize::step_delay(t, &mut rng)).await;
        }

        Ok(())
    }

    /// Click at page coordinates with a human-like approach: move first,
    /// brief pause, jittered press/release.
    pub async fn click_human_at(&self, target: Point) -> Result<(), BrowserError> {
        self.move_mouse_human(target).await?;

        let page = self.page().await?;
        let mut rng = StdRng::from_entropy();

        // Humans don't click pixel-perfect
        let click_x = target.x + rng.gen_range(-2.0..2.0);
        let click_y = target.y + rng.gen_range(-2.0..2.0);

        tokio::time::sleep(Duration::from_millis(rng.gen_range(50..150))).await;

        let mouse_down = DispatchMouseEventParams::builder()
            .r#type(DispatchMouseEventType::MousePressed)
            .x(click_x)
            .y(click_y)
            .button(MouseButton::Left)
            .click_count(1)
            .build()
            .unwrap();
        page.execute(mouse_down)
            .await
            .map_err(|e| BrowserError::JavaScriptError(format!("CDP mouseDown failed: {}", e)))?;

        // Hold like a real click
        tokio::time::sleep(Duration::from_millis(rng.gen_range(40..120))).await;

        let mouse_up = DispatchMouseEventParams::builder()
            .r#type(DispatchMouseEventType::MouseReleased)
            .x(click_x)
            .y(click_y)
            .button(MouseButton::Left)
            .click_count(1)
            .build()
            .unwrap();
        page.execute(mouse_up)
            .await
            .map_err(|e| BrowserError::JavaScriptError(format!("CDP mouseUp failed: {}", e)))?;

        self.click_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Type into the focused element with per-character cadence from the
    /// typing plan.
    pub async fn type_text_human(&self, text: &str) -> Result<(), BrowserError> {
        let page = self.page().await?;
        let mut rng = StdRng::from_entropy();

        for key in humanize::typing_plan(text, &mut rng) {
            tokio::time::sleep(key.delay).await;

            let key_down = DispatchKeyEventParams::builder()
                .r#type(DispatchKeyEventType::KeyDown)
                .text(key.ch.to_string())
                .build()
                .unwrap();
            page.execute(key_down)
                .await
                .map_err(|e| BrowserError::JavaScriptError(format!("CDP keyDown failed: {}", e)))?;

            let key_up = DispatchKeyEventParams::builder()
                .r#type(DispatchKeyEventType::KeyUp)
                .build()
                .unwrap();
            page.execute(key_up)
                .await
                .map_err(|e| BrowserError::JavaScriptError(format!("CDP keyUp failed: {}", e)))?;
        }

        Ok(())
    }

    /// Scroll the page with stepped wheel events
    pub async fn scroll_wheel(&self, delta_y: i32) -> Result<(), BrowserError> {
        let page = self.page().await?;
        let mut rng = StdRng::from_entropy();
        let steps = 3 + rng.gen_range(0..3);
        let per_step = delta_y / steps;

        for _ in 0..steps {
            let jitter = rng.gen_range(-20..20);
            let scroll = DispatchMouseEventParams::builder()
                .r#type(DispatchMouseEventType::MouseWheel)
                .x(400.0)
                .y(300.0)
                .button(MouseButton::None)
                .delta_x(0.0)
                .delta_y((per_step + jitter) as f64)
                .build()
                .unwrap();
            page.execute(scroll)
                .await
                .map_err(|e| BrowserError::JavaScriptError(format!("CDP scroll failed: {}", e)))?;

            tokio::time::sleep(Duration::from_millis(rng.gen_range(80..200))).await;
        }

        Ok(())
    }

    /// Capture a full-page PNG screenshot to the given path, creating the
    /// parent directory on demand.
    pub async fn capture_screenshot(&self, path: &Path) -> Result<(), BrowserError> {
        let page = self.page().await?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let params = CaptureScreenshotParams {
            format: Some(CaptureScreenshotFormat::Png),
            capture_beyond_viewport: Some(true),
            ..Default::default()
        };

        let data = page
            .screenshot(params)
            .await
            .map_err(|e| BrowserError::ScreenshotFailed(e.to_string()))?;

        tokio::fs::write(path, &data).await?;
        info!("Screenshot saved to {}", path.display());
        Ok(())
    }

    /// Close the browser session
    pub async fn close(&self) -> Result<(), BrowserError> {
        // Mark as not alive first to prevent new operations
        self.alive.store(false, Ordering::Relaxed);

        // 1. Close page first (stops navigation/JS execution)
        {
            let mut page = self.page.write().await;
            if let Some(p) = page.take() {
                let _ = p.close().await;
            }
        }

        // 2. Graceful close, short grace period, then force kill so no
        //    Chrome child processes linger
        {
            let mut browser = self.browser.write().await;
            if let Some(mut b) = browser.take() {
                let _ = b.close().await;
                tokio::time::sleep(Duration::from_millis(500)).await;
                let _ = b.kill().await;
            }
        }

        info!("Browser session closed");
        Ok(())
    }
}
