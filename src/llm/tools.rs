//! Named tools offered to the agent runtime.
//!
//! Every tool takes a JSON arguments object and answers with a JSON object
//! carrying `success` and, on failure, `error`. Tool errors never escape the
//! registry.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine as _;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::errors::{ParasightError, ParasightResult};
use crate::executor::sequencer::{InteractionSequencer, InteractionStep};
use crate::executor::session::BrowserLauncher;
use crate::llm::types::{FunctionDef, ToolDef};
use crate::perception::extract;
use crate::perception::matcher::{self, FindOptions};
use crate::perception::screenshot::{self, ScreenshotRequest};
use crate::perception::types::ParsedElement;
use crate::perception::validator::{self, ValidationInput};
use crate::vision::client::{Thresholds, VisionService};

/// Agent-callable tool.
#[async_trait]
pub trait UiTool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters_schema(&self) -> Value;
    async fn execute(&self, params: Value) -> ParasightResult<Value>;
}

/// Lookup table from tool name to implementation.
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn UiTool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the six UI-testing tools wired to the given collaborators.
    pub fn with_ui_tools(vision: Arc<dyn VisionService>, launcher: Arc<dyn BrowserLauncher>) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(TakeScreenshotTool { launcher: Arc::clone(&launcher) }));
        registry.register(Arc::new(AnalyzeImageTool { vision }));
        registry.register(Arc::new(FindElementsTool));
        registry.register(Arc::new(ValidateElementTool));
        registry.register(Arc::new(InteractSequenceTool { launcher }));
        registry.register(Arc::new(ExtractTextTool));
        registry
    }

    pub fn register(&mut self, tool: Arc<dyn UiTool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Definitions in chat-completions `tools` format, sorted by name.
    pub fn tool_defs(&self) -> Vec<ToolDef> {
        self.tools
            .values()
            .map(|t| ToolDef {
                def_type: "function".into(),
                function: FunctionDef {
                    name: t.name().to_string(),
                    description: t.description().to_string(),
                    parameters: t.parameters_schema(),
                },
            })
            .collect()
    }

    /// Runs `name` and folds any error into `{"success": false, "error": ...}`.
    pub async fn execute(&self, name: &str, params: Value) -> Value {
        let Some(tool) = self.tools.get(name) else {
            tracing::warn!(tool = %name, "unknown tool requested");
            return failure(&ParasightError::Input(format!("unknown tool: {name}")));
        };
        tracing::info!(tool = %name, "executing tool");
        match tool.execute(params).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(tool = %name, error = %e, "tool failed");
                failure(&e)
            }
        }
    }
}

fn failure(err: &ParasightError) -> Value {
    json!({ "success": false, "error": err.to_string() })
}

fn parse_params<T: for<'de> Deserialize<'de>>(params: Value) -> ParasightResult<T> {
    serde_json::from_value(params).map_err(|e| ParasightError::Input(e.to_string()))
}

/// Elements from a `parsed_data` argument: an analysis reply or a plain element list.
fn resolve_elements(parsed_data: &ValidationInput) -> ParasightResult<Vec<ParsedElement>> {
    match parsed_data {
        ValidationInput::Elements(elements) => Ok(elements.clone()),
        ValidationInput::Analysis(analysis) if analysis.success => Ok(analysis.elements()),
        ValidationInput::Analysis(analysis) => Err(ParasightError::Input(
            analysis
                .error
                .clone()
                .unwrap_or_else(|| "invalid parsed data".into()),
        )),
    }
}

fn parsed_data_schema() -> Value {
    json!({
        "description": "Output of analyze_image_with_omniparser, or a list of parsed elements",
        "anyOf": [{"type": "object"}, {"type": "array", "items": {"type": "object"}}]
    })
}

// ── take_screenshot ─────────────────────────────────────────────────────────

struct TakeScreenshotTool {
    launcher: Arc<dyn BrowserLauncher>,
}

#[async_trait]
impl UiTool for TakeScreenshotTool {
    fn name(&self) -> &str {
        "take_screenshot"
    }

    fn description(&self) -> &str {
        "Navigate to a URL in a fresh browser and capture a full-page PNG screenshot."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": {"type": "string"},
                "output_format": {"type": "string", "enum": ["base64", "file"]},
                "output_file": {"type": "string"},
                "browser_type": {"type": "string", "enum": ["chromium"], "default": "chromium"},
                "wait_time_ms": {"type": "integer", "minimum": 0, "default": 1000}
            },
            "required": ["url", "output_format"]
        })
    }

    async fn execute(&self, params: Value) -> ParasightResult<Value> {
        let request: ScreenshotRequest = parse_params(params)?;
        let shot = screenshot::capture_page(self.launcher.as_ref(), &request).await?;
        let mut out = serde_json::to_value(shot)?;
        out["success"] = json!(true);
        Ok(out)
    }
}

// ── analyze_image_with_omniparser ───────────────────────────────────────────

#[derive(Deserialize)]
struct AnalyzeParams {
    image_path: Option<PathBuf>,
    image_base64: Option<String>,
    box_threshold: Option<f64>,
    iou_threshold: Option<f64>,
}

struct AnalyzeImageTool {
    vision: Arc<dyn VisionService>,
}

impl AnalyzeImageTool {
    async fn image_bytes(params: &AnalyzeParams) -> ParasightResult<Vec<u8>> {
        match (&params.image_path, &params.image_base64) {
            (Some(path), None) => match tokio::fs::read(path).await {
                Ok(bytes) => Ok(bytes),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ParasightError::Input(
                    format!("image file not found: {}", path.display()),
                )),
                Err(e) => Err(e.into()),
            },
            (None, Some(encoded)) => base64::engine::general_purpose::STANDARD
                .decode(encoded.trim())
                .map_err(|e| ParasightError::Input(format!("invalid base64 image: {e}"))),
            (Some(_), Some(_)) => Err(ParasightError::Input(
                "provide only one of image_path or image_base64".into(),
            )),
            (None, None) => Err(ParasightError::Input(
                "either image_path or image_base64 must be provided".into(),
            )),
        }
    }
}

#[async_trait]
impl UiTool for AnalyzeImageTool {
    fn name(&self) -> &str {
        "analyze_image_with_omniparser"
    }

    fn description(&self) -> &str {
        "Detect UI elements in a screenshot with the vision service. Supply exactly one of image_path or image_base64."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "image_path": {"type": "string"},
                "image_base64": {"type": "string"},
                "box_threshold": {"type": "number"},
                "iou_threshold": {"type": "number"}
            }
        })
    }

    async fn execute(&self, params: Value) -> ParasightResult<Value> {
        let params: AnalyzeParams = parse_params(params)?;
        let bytes = Self::image_bytes(&params).await?;

        let defaults = self.vision.default_thresholds();
        let thresholds = Thresholds {
            box_threshold: params.box_threshold.unwrap_or(defaults.box_threshold),
            iou_threshold: params.iou_threshold.unwrap_or(defaults.iou_threshold),
        };
        let analysis = self.vision.analyze_with(bytes, thresholds).await;
        let elements = analysis.elements();

        let mut out = serde_json::to_value(&analysis)?;
        if analysis.success {
            out["elements"] = serde_json::to_value(elements)?;
        }
        Ok(out)
    }
}

// ── find_elements_by_description ────────────────────────────────────────────

#[derive(Deserialize)]
struct FindParams {
    parsed_data: ValidationInput,
    description: String,
    #[serde(flatten)]
    options: FindOptions,
}

struct FindElementsTool;

#[async_trait]
impl UiTool for FindElementsTool {
    fn name(&self) -> &str {
        "find_elements_by_description"
    }

    fn description(&self) -> &str {
        "Find parsed elements whose text matches a description."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "parsed_data": parsed_data_schema(),
                "description": {"type": "string"},
                "match_type": {
                    "type": "string",
                    "enum": ["contains", "exact", "startswith", "endswith"],
                    "default": "contains"
                },
                "case_sensitive": {"type": "boolean", "default": false},
                "max_results": {"type": "integer", "minimum": 1, "default": 5}
            },
            "required": ["parsed_data", "description"]
        })
    }

    async fn execute(&self, params: Value) -> ParasightResult<Value> {
        let params: FindParams = parse_params(params)?;
        let elements = resolve_elements(&params.parsed_data)?;
        let matches = matcher::find(&elements, &params.description, &params.options)?;
        Ok(json!({
            "success": true,
            "matches_found": matches.len(),
            "matches": matches,
        }))
    }
}

// ── validate_element_exists ─────────────────────────────────────────────────

#[derive(Deserialize)]
struct ValidateParams {
    parsed_data: ValidationInput,
    description: String,
}

struct ValidateElementTool;

#[async_trait]
impl UiTool for ValidateElementTool {
    fn name(&self) -> &str {
        "validate_element_exists"
    }

    fn description(&self) -> &str {
        "Check whether any parsed element's text contains the description."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "parsed_data": parsed_data_schema(),
                "description": {"type": "string"}
            },
            "required": ["parsed_data", "description"]
        })
    }

    async fn execute(&self, params: Value) -> ParasightResult<Value> {
        let params: ValidateParams = parse_params(params)?;
        let report = validator::exists(&params.parsed_data, &params.description);
        let mut out = serde_json::to_value(&report)?;
        if let Some(failure) = report.failure {
            let (validator::ValidationFailure::UpstreamAnalysis(msg)
            | validator::ValidationFailure::MalformedInput(msg)) = failure;
            out["error"] = json!(msg);
        }
        Ok(out)
    }
}

// ── interact_with_element_sequence ──────────────────────────────────────────

#[derive(Deserialize)]
struct InteractParams {
    url: String,
    steps: Vec<InteractionStep>,
}

struct InteractSequenceTool {
    launcher: Arc<dyn BrowserLauncher>,
}

#[async_trait]
impl UiTool for InteractSequenceTool {
    fn name(&self) -> &str {
        "interact_with_element_sequence"
    }

    fn description(&self) -> &str {
        "Open the URL once, then click, hover, type into or scroll to each position in order. \
         Positions are normalized (0..1) fractions of the viewport."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": {"type": "string"},
                "steps": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "target_position": {
                                "type": "object",
                                "properties": {
                                    "x": {"type": "number", "minimum": 0, "maximum": 1},
                                    "y": {"type": "number", "minimum": 0, "maximum": 1}
                                },
                                "required": ["x", "y"]
                            },
                            "action": {
                                "type": "string",
                                "enum": ["click", "hover", "type", "scroll_to_view"]
                            },
                            "text_to_type": {"type": "string"},
                            "wait_after_ms": {"type": "integer", "minimum": 0, "default": 500}
                        },
                        "required": ["target_position", "action"]
                    }
                }
            },
            "required": ["url", "steps"]
        })
    }

    async fn execute(&self, params: Value) -> ParasightResult<Value> {
        let params: InteractParams = parse_params(params)?;
        if params.steps.is_empty() {
            return Err(ParasightError::Input("no steps provided".into()));
        }
        let sequencer = InteractionSequencer::new(Arc::clone(&self.launcher));
        let outcomes = sequencer.run(&params.steps, &params.url).await;
        let succeeded = outcomes.iter().filter(|o| o.success).count();
        Ok(json!({
            "success": succeeded == outcomes.len(),
            "url": params.url,
            "steps_succeeded": succeeded,
            "results": outcomes,
        }))
    }
}

// ── extract_text_from_elements ──────────────────────────────────────────────

#[derive(Deserialize)]
struct ExtractParams {
    parsed_data: ValidationInput,
    element_type: Option<String>,
}

struct ExtractTextTool;

#[async_trait]
impl UiTool for ExtractTextTool {
    fn name(&self) -> &str {
        "extract_text_from_elements"
    }

    fn description(&self) -> &str {
        "List the non-empty texts of parsed elements, optionally filtered by element type."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "parsed_data": parsed_data_schema(),
                "element_type": {"type": "string"}
            },
            "required": ["parsed_data"]
        })
    }

    async fn execute(&self, params: Value) -> ParasightResult<Value> {
        let params: ExtractParams = parse_params(params)?;
        let elements = resolve_elements(&params.parsed_data)?;
        let texts = extract::extract_text(&elements, params.element_type.as_deref());
        Ok(json!({
            "success": true,
            "element_count": texts.len(),
            "extracted_text": texts,
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::Mutex;

    use super::*;
    use crate::executor::sequencer::tests::FakeLauncher;
    use crate::perception::types::{AnalysisData, AnalysisResult};
    use crate::vision::client::HealthStatus;

    struct FakeVision {
        seen: Mutex<Vec<(usize, Thresholds)>>,
    }

    #[async_trait]
    impl VisionService for FakeVision {
        fn default_thresholds(&self) -> Thresholds {
            Thresholds {
                box_threshold: 0.05,
                iou_threshold: 0.1,
            }
        }

        async fn analyze_with(&self, image_bytes: Vec<u8>, thresholds: Thresholds) -> AnalysisResult {
            self.seen.lock().unwrap().push((image_bytes.len(), thresholds));
            let mut data = AnalysisData {
                raw_text_block: "Text Box ID 0: Username\nButton ID 1: Login".into(),
                ..AnalysisData::default()
            };
            data.coordinate_map.insert("0".into(), vec![0.5, 0.3]);
            data.coordinate_map.insert("1".into(), vec![0.5, 0.6]);
            AnalysisResult::ok(data)
        }

        async fn health_check(&self) -> HealthStatus {
            HealthStatus {
                success: true,
                status: Some(200),
                message: None,
                error: None,
            }
        }
    }

    fn registry() -> (ToolRegistry, Arc<FakeVision>, FakeLauncher) {
        let vision = Arc::new(FakeVision { seen: Mutex::new(Vec::new()) });
        let launcher = FakeLauncher::default();
        let registry = ToolRegistry::with_ui_tools(vision.clone(), Arc::new(launcher.clone()));
        (registry, vision, launcher)
    }

    #[test]
    fn test_tool_defs_are_complete() {
        let (registry, _, _) = registry();
        let names: Vec<String> = registry.tool_defs().into_iter().map(|d| d.function.name).collect();
        assert_eq!(
            names,
            vec![
                "analyze_image_with_omniparser",
                "extract_text_from_elements",
                "find_elements_by_description",
                "interact_with_element_sequence",
                "take_screenshot",
                "validate_element_exists",
            ]
        );
    }

    #[tokio::test]
    async fn test_unknown_tool_is_reported() {
        let (registry, _, _) = registry();
        let out = registry.execute("drag_and_drop", json!({})).await;
        assert_eq!(out["success"], false);
        assert_eq!(out["error"], "invalid input: unknown tool: drag_and_drop");
    }

    #[tokio::test]
    async fn test_analyze_requires_exactly_one_image_source() {
        let (registry, vision, _) = registry();
        let neither = registry.execute("analyze_image_with_omniparser", json!({})).await;
        assert_eq!(neither["success"], false);
        assert!(neither["error"].as_str().unwrap().contains("either image_path or image_base64"));

        let both = registry
            .execute(
                "analyze_image_with_omniparser",
                json!({"image_path": "a.png", "image_base64": "AAAA"}),
            )
            .await;
        assert!(both["error"].as_str().unwrap().contains("only one of"));
        assert!(vision.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_analyze_inline_base64_with_threshold_override() {
        let (registry, vision, _) = registry();
        let out = registry
            .execute(
                "analyze_image_with_omniparser",
                json!({"image_base64": "cG5n", "box_threshold": 0.2}),
            )
            .await;
        assert_eq!(out["success"], true);
        assert_eq!(out["elements"][1]["text"], "Login");

        let seen = vision.seen.lock().unwrap();
        assert_eq!(seen[0].0, 3);
        assert_eq!(seen[0].1.box_threshold, 0.2);
        assert_eq!(seen[0].1.iou_threshold, 0.1);
    }

    #[tokio::test]
    async fn test_analyze_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shot.png");
        std::fs::write(&path, b"12345").unwrap();
        let (registry, vision, _) = registry();
        let out = registry
            .execute("analyze_image_with_omniparser", json!({"image_path": path}))
            .await;
        assert_eq!(out["success"], true);
        assert_eq!(vision.seen.lock().unwrap()[0].0, 5);

        let missing = registry
            .execute(
                "analyze_image_with_omniparser",
                json!({"image_path": dir.path().join("nope.png")}),
            )
            .await;
        assert!(missing["error"].as_str().unwrap().contains("image file not found"));
    }

    #[tokio::test]
    async fn test_analyze_then_find_and_validate() {
        let (registry, _, _) = registry();
        let analysis = registry
            .execute("analyze_image_with_omniparser", json!({"image_base64": "cG5n"}))
            .await;

        let found = registry
            .execute(
                "find_elements_by_description",
                json!({"parsed_data": analysis.clone(), "description": "login", "match_type": "exact"}),
            )
            .await;
        assert_eq!(found["success"], true);
        assert_eq!(found["matches_found"], 1);
        assert_eq!(found["matches"][0]["position"], json!({"x": 0.5, "y": 0.6}));

        let validated = registry
            .execute(
                "validate_element_exists",
                json!({"parsed_data": analysis, "description": "Password"}),
            )
            .await;
        assert_eq!(validated["success"], true);
        assert_eq!(validated["exists"], false);
        assert_eq!(validated["count"], 0);
    }

    #[tokio::test]
    async fn test_find_on_failed_analysis() {
        let (registry, _, _) = registry();
        let out = registry
            .execute(
                "find_elements_by_description",
                json!({
                    "parsed_data": {"success": false, "error": "transport error: timed out"},
                    "description": "Login"
                }),
            )
            .await;
        assert_eq!(out["success"], false);
        assert!(out["error"].as_str().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_validate_reports_upstream_error() {
        let (registry, _, _) = registry();
        let out = registry
            .execute(
                "validate_element_exists",
                json!({
                    "parsed_data": {"success": false, "error": "HTTP error: 500"},
                    "description": "Login"
                }),
            )
            .await;
        assert_eq!(out["success"], false);
        assert_eq!(out["error"], "HTTP error: 500");
        assert_eq!(out["failure"]["layer"], "upstream_analysis");
    }

    #[tokio::test]
    async fn test_extract_text_filtered() {
        let (registry, _, _) = registry();
        let elements = json!([
            {"element_type": "Button", "element_id": "1", "text": "Login", "center_x": 0.5, "center_y": 0.6},
            {"element_type": "Text", "element_id": "2", "text": "Welcome", "center_x": null, "center_y": null}
        ]);
        let out = registry
            .execute(
                "extract_text_from_elements",
                json!({"parsed_data": elements, "element_type": "button"}),
            )
            .await;
        assert_eq!(out["success"], true);
        assert_eq!(out["element_count"], 1);
        assert_eq!(out["extracted_text"][0]["text"], "Login");
    }

    #[tokio::test]
    async fn test_interact_sequence_partial_failure() {
        let (registry, _, launcher) = registry();
        let out = registry
            .execute(
                "interact_with_element_sequence",
                json!({
                    "url": "http://localhost:3000",
                    "steps": [
                        {"target_position": {"x": 0.1, "y": 0.1}, "action": "click", "wait_after_ms": 0},
                        {"target_position": {"x": 0.2, "y": 0.2}, "action": "type", "wait_after_ms": 0}
                    ]
                }),
            )
            .await;
        assert_eq!(out["success"], false);
        assert_eq!(out["steps_succeeded"], 1);
        assert_eq!(out["results"].as_array().unwrap().len(), 2);
        assert_eq!(out["results"][0]["success"], true);
        assert_eq!(launcher.state.lock().unwrap().closed, 1);
    }

    #[tokio::test]
    async fn test_interact_rejects_empty_steps() {
        let (registry, _, launcher) = registry();
        let out = registry
            .execute(
                "interact_with_element_sequence",
                json!({"url": "http://localhost:3000", "steps": []}),
            )
            .await;
        assert_eq!(out["success"], false);
        assert_eq!(out["error"], "invalid input: no steps provided");
        assert!(launcher.state.lock().unwrap().calls.is_empty());
    }

    #[tokio::test]
    async fn test_take_screenshot_base64() {
        let (registry, _, launcher) = registry();
        let mut png = Vec::new();
        image::RgbImage::new(4, 3)
            .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        launcher.state.lock().unwrap().png = Some(png);

        let out = registry
            .execute(
                "take_screenshot",
                json!({"url": "http://localhost:3000", "output_format": "base64", "wait_time_ms": 0}),
            )
            .await;
        assert_eq!(out["success"], true);
        assert_eq!(out["width"], 4);
        assert_eq!(out["height"], 3);
        assert_eq!(out["content_type"], "image/png");
        assert!(out["image_base64"].is_string());
    }

    #[tokio::test]
    async fn test_take_screenshot_rejects_other_browsers() {
        let (registry, _, launcher) = registry();
        let out = registry
            .execute(
                "take_screenshot",
                json!({"url": "http://x", "output_format": "file", "browser_type": "firefox"}),
            )
            .await;
        assert_eq!(out["success"], false);
        assert!(out["error"].as_str().unwrap().contains("unsupported browser type"));
        assert!(launcher.state.lock().unwrap().calls.is_empty());
    }
}
