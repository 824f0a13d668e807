use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::ParasightResult;

/// Inner size of the page viewport in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

/// One live browser page. All calls are strictly sequential.
#[async_trait]
pub trait BrowserSession: Send {
    async fn navigate(&mut self, url: &str) -> ParasightResult<()>;
    async fn viewport_size(&mut self) -> ParasightResult<Viewport>;
    async fn mouse_click(&mut self, x: f64, y: f64) -> ParasightResult<()>;
    async fn mouse_move(&mut self, x: f64, y: f64) -> ParasightResult<()>;
    async fn keyboard_type(&mut self, text: &str) -> ParasightResult<()>;
    async fn evaluate(&mut self, script: &str) -> ParasightResult<serde_json::Value>;
    /// PNG bytes of the viewport, or the whole page when `full_page`.
    async fn screenshot(&mut self, full_page: bool) -> ParasightResult<Vec<u8>>;
    async fn current_url(&mut self) -> ParasightResult<Option<String>>;
    /// Releases the page and its browser process. Called exactly once.
    async fn close(&mut self) -> ParasightResult<()>;
}

/// Produces a fresh, unshared session per call.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> ParasightResult<Box<dyn BrowserSession>>;
}

#[async_trait]
impl<T: BrowserLauncher + ?Sized> BrowserLauncher for Arc<T> {
    async fn launch(&self) -> ParasightResult<Box<dyn BrowserSession>> {
        (**self).launch().await
    }
}

/// Closes `session`, logging rather than propagating a failed close.
pub async fn release(session: &mut dyn BrowserSession) {
    if let Err(e) = session.close().await {
        tracing::warn!(error = %e, "failed to close browser session");
    }
}
