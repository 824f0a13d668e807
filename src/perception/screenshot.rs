// Navigate-and-capture for a fresh browser session.
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::errors::{ParasightError, ParasightResult};
use crate::executor::session::{self, BrowserLauncher, BrowserSession};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    Base64,
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenshotRequest {
    pub url: String,
    pub output_format: OutputFormat,
    #[serde(default)]
    pub output_file: Option<PathBuf>,
    #[serde(default = "default_browser_type")]
    pub browser_type: String,
    #[serde(default = "default_wait_time_ms")]
    pub wait_time_ms: u64,
}

fn default_browser_type() -> String {
    "chromium".to_string()
}

fn default_wait_time_ms() -> u64 {
    1000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenshotResult {
    pub url: String,
    pub width: u32,
    pub height: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_base64: Option<String>,
    pub content_type: String,
}

/// `screenshot_<url with separators replaced>.png`
pub fn default_file_name(url: &str) -> String {
    let stem: String = url
        .replace("://", "_")
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
        .collect();
    format!("screenshot_{stem}.png")
}

fn output_path(request: &ScreenshotRequest) -> PathBuf {
    request
        .output_file
        .clone()
        .unwrap_or_else(|| PathBuf::from(default_file_name(&request.url)))
}

pub fn png_dimensions(bytes: &[u8]) -> ParasightResult<(u32, u32)> {
    image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .into_dimensions()
        .map_err(|e| ParasightError::Format(format!("unreadable screenshot: {e}")))
}

pub async fn capture_page<L: BrowserLauncher + ?Sized>(
    launcher: &L,
    request: &ScreenshotRequest,
) -> ParasightResult<ScreenshotResult> {
    if request.browser_type != "chromium" {
        return Err(ParasightError::Input(format!(
            "unsupported browser type: {}",
            request.browser_type
        )));
    }

    let mut session = launcher.launch().await?;
    let captured = capture_in(session.as_mut(), request).await;
    session::release(session.as_mut()).await;
    let png = captured?;

    let (width, height) = png_dimensions(&png)?;
    tracing::info!(url = %request.url, bytes = png.len(), width, height, "took screenshot");

    match request.output_format {
        OutputFormat::File => {
            let path = output_path(request);
            write_png(&path, &png).await?;
            let absolute = std::path::absolute(&path).unwrap_or(path);
            Ok(ScreenshotResult {
                url: request.url.clone(),
                width,
                height,
                file_path: Some(absolute),
                image_base64: None,
                content_type: "image/png".into(),
            })
        }
        OutputFormat::Base64 => Ok(ScreenshotResult {
            url: request.url.clone(),
            width,
            height,
            file_path: None,
            image_base64: Some(base64::engine::general_purpose::STANDARD.encode(&png)),
            content_type: "image/png".into(),
        }),
    }
}

async fn capture_in(
    session: &mut dyn BrowserSession,
    request: &ScreenshotRequest,
) -> ParasightResult<Vec<u8>> {
    session.navigate(&request.url).await?;
    if request.wait_time_ms > 0 {
        tokio::time::sleep(Duration::from_millis(request.wait_time_ms)).await;
    }
    session.screenshot(true).await
}

async fn write_png(path: &Path, png: &[u8]) -> ParasightResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, png).await?;
    Ok(())
}
