use std::ffi::OsStr;
use std::ops::Deref;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{anyhow, Context};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use headless_chrome::{
    protocol::cdp::{Page, Target::CreateTarget},
    Browser, LaunchOptionsBuilder, Tab,
};

use super::{RenderEngine, CARD_HEIGHT, CARD_WIDTH};

const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(15);

// chrome exits on its own after this long without a command
const IDLE_TIMEOUT: Duration = Duration::from_secs(60 * 60 * 24);

/// Renders cards in a shared headless chromium.
///
/// The browser is started on first use. If it cannot be started, or a new
/// tab cannot be opened on it, the handle is dropped and the next render
/// starts a fresh one.
pub struct ChromeEngine {
    path: PathBuf,
    browser: Mutex<Option<Arc<Browser>>>,
}

/// Closes the tab however the render ends.
struct TabGuard(Arc<Tab>);

impl Deref for TabGuard {
    type Target = Tab;

    fn deref(&self) -> &Tab {
        &self.0
    }
}

impl Drop for TabGuard {
    fn drop(&mut self) {
        if let Err(err) = self.0.close(false) {
            log::debug!("failed to close card tab: {err}");
        }
    }
}

impl ChromeEngine {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            browser: Mutex::new(None),
        }
    }

    fn launch(&self) -> anyhow::Result<Browser> {
        log::info!("launching chromium from {}", self.path.display());

        let options = LaunchOptionsBuilder::default()
            .headless(true)
            .sandbox(false)
            .window_size(Some((CARD_WIDTH, CARD_HEIGHT)))
            .path(Some(self.path.clone()))
            .idle_browser_timeout(IDLE_TIMEOUT)
            .args(vec![
                OsStr::new("--disable-dev-shm-usage"),
                OsStr::new("--disable-gpu"),
            ])
            .build()
            .map_err(|err| anyhow!("invalid launch options: {err}"))?;

        Browser::new(options).context("failed to start chromium")
    }

    /// The lock is only held while reading or replacing the handle.
    fn browser(&self) -> anyhow::Result<Arc<Browser>> {
        let mut slot = self.browser.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(browser) = slot.as_ref() {
            return Ok(browser.clone());
        }

        let browser = Arc::new(self.launch()?);
        *slot = Some(browser.clone());
        Ok(browser)
    }

    fn forget(&self, stale: &Arc<Browser>) {
        let mut slot = self.browser.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|current| Arc::ptr_eq(current, stale)) {
            log::warn!("dropping unresponsive chromium");
            *slot = None;
        }
    }

    fn open_tab(&self) -> anyhow::Result<TabGuard> {
        let browser = self.browser()?;

        let tab = browser.new_tab_with_options(CreateTarget {
            url: "about:blank".to_string(),
            width: Some(CARD_WIDTH),
            height: Some(CARD_HEIGHT),
            browser_context_id: None,
            enable_begin_frame_control: None,
            new_window: None,
            background: None,
            left: None,
            top: None,
            window_state: None,
            for_tab: None,
            hidden: None,
        });

        match tab {
            Ok(tab) => Ok(TabGuard(tab)),
            Err(err) => {
                self.forget(&browser);
                Err(err.context("failed to open tab"))
            }
        }
    }
}

impl RenderEngine for ChromeEngine {
    fn snapshot(&self, html: &str) -> anyhow::Result<Vec<u8>> {
        let tab = self.open_tab()?;
        tab.set_default_timeout(NAVIGATION_TIMEOUT);

        let document = format!("data:text/html;base64,{}", STANDARD.encode(html));
        tab.navigate_to(&document)?;
        tab.wait_until_navigated()?;

        let clip = Page::Viewport {
            x: 0.0,
            y: 0.0,
            width: f64::from(CARD_WIDTH),
            height: f64::from(CARD_HEIGHT),
            scale: 1.0,
        };

        tab.capture_screenshot(
            Page::CaptureScreenshotFormatOption::Png,
            None,
            Some(clip),
            true,
        )
        .context("failed to capture card")
    }

    fn shutdown(&self) {
        let browser = self
            .browser
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if browser.is_some() {
            log::info!("closing chromium");
        }
    }
}
