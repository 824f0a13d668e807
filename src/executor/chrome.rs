//! Chrome/Chromium implementation of the browser seams, driven over CDP.

use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::handler::viewport::Viewport as CdpViewport;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Browser, BrowserConfig as CdpBrowserConfig, Page};
use futures_util::StreamExt;
use tokio::task::JoinHandle;

use crate::config::BrowserConfig;
use crate::errors::{ParasightError, ParasightResult};
use crate::executor::input;
use crate::executor::session::{BrowserLauncher, BrowserSession, Viewport};

const VIEWPORT_JS: &str = "({ width: window.innerWidth, height: window.innerHeight })";

/// Launches one headless (by default) Chromium per session.
pub struct ChromeLauncher {
    config: BrowserConfig,
}

impl ChromeLauncher {
    pub fn new(config: BrowserConfig) -> Self {
        Self { config }
    }

    fn cdp_config(&self) -> ParasightResult<CdpBrowserConfig> {
        let mut builder = CdpBrowserConfig::builder();
        // chromiumoxide is headless unless asked otherwise
        if !self.config.headless {
            builder = builder.with_head();
        }
        builder = builder
            .viewport(CdpViewport {
                width: self.config.viewport_width,
                height: self.config.viewport_height,
                device_scale_factor: Some(1.0),
                emulating_mobile: false,
                is_landscape: true,
                has_touch: false,
            })
            .request_timeout(Duration::from_millis(self.config.navigation_timeout_ms));

        if let Some(ref path) = self.config.chrome_path {
            builder = builder.chrome_executable(path);
        }
        for arg in &self.config.chrome_args {
            builder = builder.arg(arg);
        }
        builder = builder
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--no-sandbox");

        builder
            .build()
            .map_err(|e| ParasightError::Browser(format!("failed to build browser config: {e}")))
    }
}

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    async fn launch(&self) -> ParasightResult<Box<dyn BrowserSession>> {
        let config = self.cdp_config()?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| ParasightError::Browser(format!("browser launch failed: {e}")))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::trace!(error = %e, "browser handler event error");
                }
            }
        });

        let page = browser.new_page("about:blank").await?;
        tracing::info!(
            viewport_width = self.config.viewport_width,
            viewport_height = self.config.viewport_height,
            headless = self.config.headless,
            "browser session launched"
        );

        Ok(Box::new(ChromeSession {
            browser,
            page,
            handler_task,
            closed: false,
        }))
    }
}

pub struct ChromeSession {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
    closed: bool,
}

#[async_trait]
impl BrowserSession for ChromeSession {
    async fn navigate(&mut self, url: &str) -> ParasightResult<()> {
        self.page
            .goto(url)
            .await
            .map_err(|e| ParasightError::Browser(format!("navigation to {url} failed: {e}")))?;
        let _ = self.page.wait_for_navigation().await;
        tracing::info!(url = %url, "navigated");
        Ok(())
    }

    async fn viewport_size(&mut self) -> ParasightResult<Viewport> {
        let viewport: Viewport = self
            .page
            .evaluate(VIEWPORT_JS)
            .await
            .map_err(|e| ParasightError::Browser(format!("viewport query failed: {e}")))?
            .into_value()
            .map_err(|e| ParasightError::Browser(format!("viewport query returned {e}")))?;
        if viewport.width <= 0.0 || viewport.height <= 0.0 {
            return Err(ParasightError::Browser(format!(
                "page reported an empty viewport {}x{}",
                viewport.width, viewport.height
            )));
        }
        Ok(viewport)
    }

    async fn mouse_click(&mut self, x: f64, y: f64) -> ParasightResult<()> {
        input::mouse_click(&self.page, x, y).await
    }

    async fn mouse_move(&mut self, x: f64, y: f64) -> ParasightResult<()> {
        input::mouse_move(&self.page, x, y).await
    }

    async fn keyboard_type(&mut self, text: &str) -> ParasightResult<()> {
        input::type_text(&self.page, text).await
    }

    async fn evaluate(&mut self, script: &str) -> ParasightResult<serde_json::Value> {
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| ParasightError::Interaction(format!("script evaluation failed: {e}")))?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn screenshot(&mut self, full_page: bool) -> ParasightResult<Vec<u8>> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(full_page)
            .build();
        self.page
            .screenshot(params)
            .await
            .map_err(|e| ParasightError::Interaction(format!("screenshot failed: {e}")))
    }

    async fn current_url(&mut self) -> ParasightResult<Option<String>> {
        Ok(self.page.url().await?)
    }

    async fn close(&mut self) -> ParasightResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let result = self.browser.close().await;
        let _ = self.browser.wait().await;
        self.handler_task.abort();
        result?;
        tracing::info!("browser session closed");
        Ok(())
    }
}
