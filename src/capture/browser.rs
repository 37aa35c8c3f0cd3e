//! Chromium-backed [`RenderTarget`] via the DevTools protocol.
//!
//! Launches a headless Chromium with a fixed viewport and a spoofed user
//! agent, and injects a start script that forces `preserveDrawingBuffer` on
//! every WebGL context so canvas pixels stay readable after a frame is
//! composited. Without that patch the map's framebuffer is routinely blank
//! by the time a screenshot is taken.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::{
    AddScriptToEvaluateOnNewDocumentParams, CaptureScreenshotFormat, Viewport as ClipViewport,
};
use chromiumoxide::handler::viewport::Viewport as EmulatedViewport;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use crate::capture::target::{ElementWait, PageInfo, RenderTarget};
use crate::config::CaptureConfig;

/// Identity string reported to the page. Some map providers degrade or block
/// clients that identify as headless.
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
    (KHTML, like Gecko) Chrome/141.0.0.0 Safari/537.36";

/// Patches canvas context acquisition before any page script runs.
const PRESERVE_BUFFER_JS: &str = r#"
(() => {
    const originalGetContext = HTMLCanvasElement.prototype.getContext;
    HTMLCanvasElement.prototype.getContext = function (contextType, contextAttributes = {}) {
        if (contextType === 'webgl' || contextType === 'webgl2' || contextType === 'experimental-webgl') {
            contextAttributes.preserveDrawingBuffer = true;
        }
        return originalGetContext.call(this, contextType, contextAttributes);
    };
})();
"#;

/// Reads the first canvas back as a PNG data URL, null when unavailable.
const CANVAS_EXPORT_JS: &str = r#"
(() => {
    const canvas = document.querySelector('canvas');
    if (!canvas) return null;
    try {
        return canvas.toDataURL('image/png');
    } catch (err) {
        return null;
    }
})()
"#;

const POLL_INTERVAL: Duration = Duration::from_millis(200);

pub struct ChromiumTarget {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
    viewport: crate::config::Viewport,
}

impl ChromiumTarget {
    /// Launches a browser process and prepares a page for capture.
    pub async fn launch(config: &CaptureConfig) -> Result<Self> {
        let viewport = config.viewport;
        let browser_config = BrowserConfig::builder()
            .no_sandbox()
            .arg("--disable-dev-shm-usage")
            .arg("--disable-blink-features=AutomationControlled")
            .window_size(viewport.width, viewport.height)
            .viewport(EmulatedViewport {
                width: viewport.width,
                height: viewport.height,
                ..Default::default()
            })
            .build()
            .map_err(|err| anyhow!("invalid browser configuration: {err}"))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .context("failed to launch Chromium")?;

        // The handler multiplexes all CDP traffic; it must be polled for the
        // lifetime of the browser.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    debug!("browser handler event error: {err}");
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .context("failed to open a page")?;
        page.set_user_agent(USER_AGENT)
            .await
            .context("failed to set user agent")?;

        let inject = AddScriptToEvaluateOnNewDocumentParams::builder()
            .source(PRESERVE_BUFFER_JS)
            .build()
            .map_err(|err| anyhow!("invalid start script: {err}"))?;
        page.execute(inject)
            .await
            .context("failed to inject WebGL start script")?;

        Ok(Self {
            browser,
            page,
            handler_task,
            viewport,
        })
    }

    fn probe_script(selector: &str) -> String {
        // The selector is JSON-encoded so quotes inside attribute selectors
        // survive the round trip into the page.
        format!(
            r#"(() => {{
                const el = document.querySelector({selector});
                if (!el) return "missing";
                const rect = el.getBoundingClientRect();
                return rect.width > 0 && rect.height > 0 ? "visible" : "hidden";
            }})()"#,
            selector = serde_json::json!(selector),
        )
    }
}

#[async_trait]
impl RenderTarget for ChromiumTarget {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        self.page
            .goto(url)
            .await
            .with_context(|| format!("navigation to {url} failed"))?;
        Ok(())
    }

    async fn wait_for_element(
        &self,
        selector: &str,
        visible: bool,
        timeout: Duration,
    ) -> ElementWait {
        let script = Self::probe_script(selector);
        let deadline = Instant::now() + timeout;
        let mut last_state = String::from("missing");

        loop {
            match self.evaluate(&script).await {
                Ok(value) => {
                    if let Some(state) = value.as_str() {
                        last_state = state.to_string();
                        let satisfied = if visible {
                            state == "visible"
                        } else {
                            state != "missing"
                        };
                        if satisfied {
                            return ElementWait::Found;
                        }
                    }
                }
                Err(err) => debug!(selector, "element probe failed: {err:#}"),
            }

            if Instant::now() >= deadline {
                return if last_state == "missing" {
                    ElementWait::NotFound
                } else {
                    ElementWait::TimedOut
                };
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value> {
        let result = self
            .page
            .evaluate(script)
            .await
            .context("script evaluation failed")?;
        Ok(result
            .into_value()
            .unwrap_or(serde_json::Value::Null))
    }

    async fn screenshot_viewport(&self) -> Result<Vec<u8>> {
        let clip = ClipViewport {
            x: 0.0,
            y: 0.0,
            width: f64::from(self.viewport.width),
            height: f64::from(self.viewport.height),
            scale: 1.0,
        };
        self.page
            .screenshot(
                ScreenshotParams::builder()
                    .format(CaptureScreenshotFormat::Png)
                    .clip(clip)
                    .build(),
            )
            .await
            .context("viewport screenshot failed")
    }

    async fn screenshot_page(&self) -> Result<Vec<u8>> {
        self.page
            .screenshot(
                ScreenshotParams::builder()
                    .format(CaptureScreenshotFormat::Png)
                    .build(),
            )
            .await
            .context("page screenshot failed")
    }

    async fn canvas_png(&self) -> Result<Option<Vec<u8>>> {
        let value = self.evaluate(CANVAS_EXPORT_JS).await?;
        let Some(data_url) = value.as_str() else {
            return Ok(None);
        };
        let Some(encoded) = data_url.strip_prefix("data:image/png;base64,") else {
            return Ok(None);
        };
        let bytes = BASE64
            .decode(encoded)
            .context("canvas export was not valid base64")?;
        Ok(Some(bytes))
    }

    async fn page_info(&self) -> Result<PageInfo> {
        let title = self.page.get_title().await?.unwrap_or_default();
        let url = self.page.url().await?.unwrap_or_default();
        Ok(PageInfo { title, url })
    }

    async fn close(&mut self) -> Result<()> {
        self.browser
            .close()
            .await
            .context("failed to close browser")?;
        // Reap the child process so nothing outlives the attempt.
        let _ = self.browser.wait().await;
        self.handler_task.abort();
        Ok(())
    }
}
