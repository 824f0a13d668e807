use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{ParasightError, ParasightResult};

const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub vision: VisionConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub agent: AgentConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionConfig {
    /// Base URL of the element-parsing service, e.g. `http://localhost:7860`.
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Box detection confidence threshold.
    #[serde(default = "default_box_threshold")]
    pub box_threshold: f64,
    /// Box-overlap suppression ratio.
    #[serde(default = "default_iou_threshold")]
    pub iou_threshold: f64,
    /// Restricts response decoding to a single known shape.
    #[serde(default)]
    pub response_shape: ShapePolicy,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:7860".to_string(),
            timeout_secs: default_timeout_secs(),
            box_threshold: default_box_threshold(),
            iou_threshold: default_iou_threshold(),
            response_shape: ShapePolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapePolicy {
    #[default]
    Auto,
    LiteralDump,
    NestedJson,
    ElementList,
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_box_threshold() -> f64 {
    0.05
}

fn default_iou_threshold() -> f64 {
    0.1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    #[serde(default = "default_true")]
    pub headless: bool,
    #[serde(default = "default_viewport_width")]
    pub viewport_width: u32,
    #[serde(default = "default_viewport_height")]
    pub viewport_height: u32,
    #[serde(default = "default_navigation_timeout_ms")]
    pub navigation_timeout_ms: u64,
    #[serde(default)]
    pub chrome_path: Option<PathBuf>,
    #[serde(default)]
    pub chrome_args: Vec<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            viewport_width: default_viewport_width(),
            viewport_height: default_viewport_height(),
            navigation_timeout_ms: default_navigation_timeout_ms(),
            chrome_path: None,
            chrome_args: Vec::new(),
        }
    }
}

fn default_viewport_width() -> u32 {
    1280
}

fn default_viewport_height() -> u32 {
    720
}

fn default_navigation_timeout_ms() -> u64 {
    30_000
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LlmConfig {
    #[serde(default)]
    pub active_provider: String,
    #[serde(default)]
    pub providers: HashMap<String, ProviderEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEntry {
    pub display_name: String,
    /// Full chat-completions URL.
    pub api_base: String,
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Optional API key stored in config.toml (env var PARASIGHT_<ID>_API_KEY wins).
    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_temperature() -> f64 {
    0.1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_instructions")]
    pub instructions: String,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Task used by `parasight agent` when none is given on the command line.
    #[serde(default)]
    pub task: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            instructions: default_instructions(),
            max_iterations: default_max_iterations(),
            task: None,
        }
    }
}

fn default_instructions() -> String {
    "You are a UI-testing agent. Goal: prove the requested flow works. \
     1. Take a screenshot of the page. \
     2. Analyze it with the vision service to read the on-screen labels. \
     3. Find the elements the flow needs (e.g. username, password, login button). \
     4. Click and type in order with interact_with_element_sequence. \
     5. Reply PASS when the expected page is reached, otherwise FAIL with the reason."
        .to_string()
}

fn default_max_iterations() -> u32 {
    10
}

fn default_true() -> bool {
    true
}

fn resolve_config_path(explicit: Option<&Path>) -> ParasightResult<PathBuf> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        return Err(ParasightError::Config(format!(
            "config file not found: {}",
            path.display()
        )));
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join(CONFIG_FILE);
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Ok(candidate);
            }
        }
    }

    let cwd = std::env::current_dir()?;
    let candidate = cwd.join(CONFIG_FILE);
    if candidate.exists() {
        tracing::debug!(path = %candidate.display(), "config found in working directory");
        return Ok(candidate);
    }

    if let Some(dir) = dirs::config_dir() {
        let candidate = dir.join("parasight").join(CONFIG_FILE);
        if candidate.exists() {
            tracing::debug!(path = %candidate.display(), "config found in user config dir");
            return Ok(candidate);
        }
    }

    Err(ParasightError::Config(
        "config.toml not found next to executable, in working directory or user config dir".into(),
    ))
}

pub fn load_config(explicit: Option<&Path>) -> ParasightResult<AppConfig> {
    let path = resolve_config_path(explicit)?;
    let mut config = load_config_from(&path)?;
    apply_env_overrides(&mut config);
    Ok(config)
}

pub fn load_config_from(path: &Path) -> ParasightResult<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = toml::from_str(&content)?;
    tracing::info!(
        path = %path.display(),
        vision = %config.vision.base_url,
        provider = %config.llm.active_provider,
        "config loaded"
    );
    Ok(config)
}

/// Loads the config if one can be found, otherwise starts from defaults.
pub fn load_or_default(explicit: Option<&Path>) -> ParasightResult<AppConfig> {
    match load_config(explicit) {
        Ok(cfg) => Ok(cfg),
        Err(ParasightError::Config(msg)) if explicit.is_none() => {
            tracing::warn!(reason = %msg, "no config file, using defaults");
            let mut config = AppConfig::default();
            apply_env_overrides(&mut config);
            Ok(config)
        }
        Err(e) => Err(e),
    }
}

pub fn save_config(config: &AppConfig, path: &Path) -> ParasightResult<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    tracing::info!(path = %path.display(), "config saved");
    Ok(())
}

fn apply_env_overrides(config: &mut AppConfig) {
    if let Ok(url) = std::env::var("PARASIGHT_VISION_URL") {
        if !url.trim().is_empty() {
            tracing::debug!(url = %url, "vision base URL overridden from environment");
            config.vision.base_url = url;
        }
    }
}

/// API key for a provider: `PARASIGHT_<ID>_API_KEY`, then the config value.
pub fn provider_api_key(id: &str, entry: &ProviderEntry) -> String {
    std::env::var(format!("PARASIGHT_{}_API_KEY", id.to_uppercase()))
        .unwrap_or_else(|_| entry.api_key.clone().unwrap_or_default())
}
