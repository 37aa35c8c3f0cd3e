//! Boundary trait for the render target: the remote map page under automation.
//!
//! The orchestrator only talks to this trait, so the state machine can be
//! exercised in tests without a browser. [`crate::capture::browser::ChromiumTarget`]
//! is the production implementation.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Outcome of a bounded wait for an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementWait {
    /// The element reached the requested state before the deadline.
    Found,
    /// The selector matched nothing when the deadline hit.
    NotFound,
    /// The element existed but never reached the requested state.
    TimedOut,
}

/// Title and final URL of the rendered page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageInfo {
    pub title: String,
    pub url: String,
}

/// Diagnostic snapshot of the map canvas and its WebGL context.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CanvasInfo {
    pub found: bool,
    pub width: u32,
    pub height: u32,
    pub renderer: Option<String>,
    pub vendor: Option<String>,
    pub preserve_drawing_buffer: Option<bool>,
    pub error: Option<String>,
}

/// A controllable page in a headless browser.
#[async_trait]
pub trait RenderTarget: Send {
    /// Loads `url`, resolving once the document has loaded. Never waits for
    /// network idle: long-polling tile servers would hang that forever.
    async fn navigate(&mut self, url: &str) -> Result<()>;

    /// Polls for `selector` until it exists (and, when `visible`, has a
    /// non-empty bounding box) or `timeout` elapses.
    async fn wait_for_element(&self, selector: &str, visible: bool, timeout: Duration)
    -> ElementWait;

    /// Evaluates a script in the page, returning its JSON result
    /// (`null` when the script yields `undefined`).
    async fn evaluate(&self, script: &str) -> Result<serde_json::Value>;

    /// Viewport-clipped PNG screenshot.
    async fn screenshot_viewport(&self) -> Result<Vec<u8>>;

    /// Unclipped PNG screenshot of the page.
    async fn screenshot_page(&self) -> Result<Vec<u8>>;

    /// PNG export read back from the first canvas element, when one exists
    /// and its buffer can be encoded.
    async fn canvas_png(&self) -> Result<Option<Vec<u8>>>;

    /// Best-effort page title and URL.
    async fn page_info(&self) -> Result<PageInfo>;

    /// Releases the underlying browser. Must run on every exit path.
    async fn close(&mut self) -> Result<()>;
}
