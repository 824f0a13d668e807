use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{ShapePolicy, VisionConfig};
use crate::errors::{ParasightError, ParasightResult};
use crate::perception::types::AnalysisResult;
use crate::vision::decode;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Box detection confidence.
    pub box_threshold: f64,
    /// Box-overlap suppression ratio.
    pub iou_threshold: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Element-parsing service as seen by the tools.
#[async_trait]
pub trait VisionService: Send + Sync {
    fn default_thresholds(&self) -> Thresholds;

    /// Never fails: every failure is reported inside the result.
    async fn analyze_with(&self, image_bytes: Vec<u8>, thresholds: Thresholds) -> AnalysisResult;

    async fn health_check(&self) -> HealthStatus;

    async fn analyze(&self, image_bytes: Vec<u8>) -> AnalysisResult {
        self.analyze_with(image_bytes, self.default_thresholds()).await
    }
}

/// HTTP client for the element-parsing service. No retries at this layer.
pub struct VisionClient {
    base_url: String,
    thresholds: Thresholds,
    shape_policy: ShapePolicy,
    client: reqwest::Client,
}

impl VisionClient {
    pub fn new(config: &VisionConfig) -> ParasightResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            thresholds: Thresholds {
                box_threshold: config.box_threshold,
                iou_threshold: config.iou_threshold,
            },
            shape_policy: config.response_shape,
            client,
        })
    }

    /// Reads `path` and analyzes it with the default thresholds.
    pub async fn analyze_file(&self, path: &Path) -> AnalysisResult {
        match tokio::fs::read(path).await {
            Ok(bytes) => self.analyze(bytes).await,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                AnalysisResult::failure(format!("image file not found: {}", path.display()))
            }
            Err(e) => AnalysisResult::failure(ParasightError::Io(e).to_string()),
        }
    }

    async fn post_image(&self, image_bytes: Vec<u8>, thresholds: Thresholds) -> ParasightResult<String> {
        let part = reqwest::multipart::Part::bytes(image_bytes)
            .file_name("screenshot.png")
            .mime_str("image/png")?;
        let form = reqwest::multipart::Form::new().part("image_file", part);

        let url = format!("{}/process_image", self.base_url);
        tracing::debug!(
            url = %url,
            box_threshold = thresholds.box_threshold,
            iou_threshold = thresholds.iou_threshold,
            "sending image to vision service"
        );

        let response = self
            .client
            .post(&url)
            .query(&[
                ("box_threshold", thresholds.box_threshold),
                ("iou_threshold", thresholds.iou_threshold),
            ])
            .multipart(form)
            .send()
            .await
            .map_err(|e| ParasightError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ParasightError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(ParasightError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }

    async fn probe(&self, path: &str) -> ParasightResult<u16> {
        let response = self
            .client
            .get(format!("{}/{path}", self.base_url))
            .send()
            .await
            .map_err(|e| ParasightError::Transport(e.to_string()))?;
        Ok(response.status().as_u16())
    }
}

#[async_trait]
impl VisionService for VisionClient {
    fn default_thresholds(&self) -> Thresholds {
        self.thresholds
    }

    async fn analyze_with(&self, image_bytes: Vec<u8>, thresholds: Thresholds) -> AnalysisResult {
        let bytes = image_bytes.len();
        let body = match self.post_image(image_bytes, thresholds).await {
            Ok(body) => body,
            Err(ParasightError::HttpStatus { status, body }) => {
                tracing::error!(status, body = %body, "vision service returned an error status");
                let err = ParasightError::HttpStatus { status, body: String::new() };
                return AnalysisResult::failure(err.to_string()).with_message(body);
            }
            Err(e) => {
                tracing::error!(error = %e, "vision service request failed");
                return AnalysisResult::failure(e.to_string());
            }
        };

        match decode::decode_body(&body, self.shape_policy) {
            Ok((shape, result)) => {
                tracing::info!(
                    bytes,
                    shape = shape.name(),
                    success = result.success,
                    "image analyzed"
                );
                result
            }
            Err(e) => {
                tracing::error!(error = %e, body_len = body.len(), "vision response could not be normalized");
                AnalysisResult::failure(e.to_string())
            }
        }
    }

    async fn health_check(&self) -> HealthStatus {
        let mut last_status = None;
        for path in ["openapi.json", "docs"] {
            match self.probe(path).await {
                Ok(200) => {
                    return HealthStatus {
                        success: true,
                        status: Some(200),
                        message: Some("API documentation is available".into()),
                        error: None,
                    };
                }
                Ok(status) => {
                    tracing::debug!(path, status, "health probe not OK");
                    last_status = Some(status);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "health check failed");
                    return HealthStatus {
                        success: false,
                        status: None,
                        message: None,
                        error: Some(e.to_string()),
                    };
                }
            }
        }
        HealthStatus {
            success: false,
            status: last_status,
            message: None,
            error: Some(format!(
                "API documentation not available: {}",
                last_status.map(|s| s.to_string()).unwrap_or_default()
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use mockito::Matcher;

    use super::*;

    fn client_for(url: String) -> VisionClient {
        VisionClient::new(&VisionConfig {
            base_url: format!("{url}/"),
            timeout_secs: 5,
            ..VisionConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_analyze_sends_multipart_with_thresholds() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/process_image")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("box_threshold".into(), "0.05".into()),
                Matcher::UrlEncoded("iou_threshold".into(), "0.1".into()),
            ]))
            .match_body(Matcher::Regex(r#"name="image_file""#.into()))
            .with_status(200)
            .with_body(
                "{'success': True, 'data': {'parsed_content_list': 'Button ID 1: Login', \
                 'label_coordinates': \"{'1': [np.float32(0.5), np.float32(0.6)]}\"}}",
            )
            .create_async()
            .await;

        let client = client_for(server.url());
        let result = client.analyze(b"fake png".to_vec()).await;

        assert!(result.success, "{result:?}");
        let elements = result.elements();
        assert_eq!(elements[0].text, "Login");
        assert_eq!(elements[0].center_x, Some(0.5));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_non_2xx_is_http_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/process_image")
            .match_query(Matcher::Any)
            .with_status(500)
            .with_body("CUDA out of memory")
            .create_async()
            .await;

        let result = client_for(server.url()).analyze(vec![1, 2, 3]).await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("HTTP error: 500"));
        assert_eq!(result.message.as_deref(), Some("CUDA out of memory"));
    }

    #[tokio::test]
    async fn test_unparseable_body_is_format_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/process_image")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("<html>oops</html>")
            .create_async()
            .await;

        let result = client_for(server.url()).analyze(vec![1]).await;
        assert!(!result.success);
        assert!(result.error.unwrap().starts_with("format error"));
    }

    #[tokio::test]
    async fn test_unreachable_service_is_transport_error() {
        let client = client_for("http://127.0.0.1:9".into());
        let result = client.analyze(vec![1]).await;
        assert!(!result.success);
        assert!(result.error.unwrap().starts_with("transport error"));
    }

    #[tokio::test]
    async fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.png");
        let result = client_for("http://127.0.0.1:9".into()).analyze_file(&path).await;
        assert!(result.error.unwrap().starts_with("image file not found"));
    }

    #[tokio::test]
    async fn test_health_check_falls_back_to_docs() {
        let mut server = mockito::Server::new_async().await;
        let _openapi = server
            .mock("GET", "/openapi.json")
            .with_status(404)
            .create_async()
            .await;
        let docs = server.mock("GET", "/docs").with_status(200).create_async().await;

        let health = client_for(server.url()).health_check().await;
        assert!(health.success);
        assert_eq!(health.status, Some(200));
        docs.assert_async().await;
    }

    #[tokio::test]
    async fn test_health_check_unhealthy() {
        let mut server = mockito::Server::new_async().await;
        let _a = server.mock("GET", "/openapi.json").with_status(503).create_async().await;
        let _b = server.mock("GET", "/docs").with_status(503).create_async().await;

        let health = client_for(server.url()).health_check().await;
        assert!(!health.success);
        assert_eq!(health.status, Some(503));
        assert_eq!(health.error.as_deref(), Some("API documentation not available: 503"));
    }
}
