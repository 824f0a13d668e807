use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;

use parasight::agent_engine::engine::UiTestAgent;
use parasight::config::{self, AppConfig};
use parasight::errors::{ParasightError, ParasightResult};
use parasight::executor::chrome::ChromeLauncher;
use parasight::executor::sequencer::{InteractionSequencer, InteractionStep};
use parasight::llm::registry::ProviderRegistry;
use parasight::llm::tools::ToolRegistry;
use parasight::perception::matcher::{self, FindOptions, MatchType};
use parasight::perception::screenshot::{self, OutputFormat, ScreenshotRequest};
use parasight::vision::client::{VisionClient, VisionService};

#[derive(Parser)]
#[command(name = "parasight", version, about = "Vision-guided UI testing")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config.toml (defaults to the usual search locations).
    #[arg(long, global = true, env = "PARASIGHT_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the vision service is reachable.
    Health,
    /// Detect UI elements in an image.
    Analyze {
        #[arg(long)]
        image: PathBuf,
    },
    /// Detect elements in an image and search them by text.
    Find {
        #[arg(long)]
        image: PathBuf,
        #[arg(long)]
        description: String,
        #[arg(long, default_value_t = MatchType::Contains)]
        match_type: MatchType,
        #[arg(long, default_value_t = false)]
        case_sensitive: bool,
        #[arg(long, default_value_t = 5)]
        max_results: usize,
    },
    /// Capture a full-page screenshot of a URL.
    Screenshot {
        #[arg(long)]
        url: String,
        /// Write the PNG here instead of printing base64.
        #[arg(long)]
        output: Option<PathBuf>,
        #[arg(long, default_value_t = 1000)]
        wait_ms: u64,
    },
    /// Run a JSON list of interaction steps against a URL.
    Interact {
        #[arg(long)]
        url: String,
        /// JSON file holding an array of steps.
        #[arg(long)]
        steps: PathBuf,
    },
    /// Print the tool definitions offered to the model.
    Tools,
    /// Run the UI-test agent on a task.
    Agent {
        /// Overrides `[agent].task` from the config.
        #[arg(long)]
        task: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    parasight::init_tracing(&cli.log_level);

    if let Err(e) = run(cli).await {
        tracing::error!(error = %e, "command failed");
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> ParasightResult<()> {
    let cfg = config::load_or_default(cli.config.as_deref())?;

    match cli.command {
        Commands::Health => {
            let vision = VisionClient::new(&cfg.vision)?;
            print_json(&vision.health_check().await)
        }
        Commands::Analyze { image } => {
            let vision = VisionClient::new(&cfg.vision)?;
            let analysis = vision.analyze_file(&image).await;
            print_json(&serde_json::json!({
                "analysis": &analysis,
                "elements": analysis.elements(),
            }))
        }
        Commands::Find {
            image,
            description,
            match_type,
            case_sensitive,
            max_results,
        } => {
            let vision = VisionClient::new(&cfg.vision)?;
            let analysis = vision.analyze_file(&image).await;
            if !analysis.success {
                return print_json(&analysis);
            }
            let opts = FindOptions {
                match_type,
                case_sensitive,
                max_results,
            };
            let matches = matcher::find(&analysis.elements(), &description, &opts)?;
            print_json(&matches)
        }
        Commands::Screenshot { url, output, wait_ms } => {
            let launcher = ChromeLauncher::new(cfg.browser.clone());
            let request = ScreenshotRequest {
                url,
                output_format: if output.is_some() {
                    OutputFormat::File
                } else {
                    OutputFormat::Base64
                },
                output_file: output,
                browser_type: "chromium".into(),
                wait_time_ms: wait_ms,
            };
            print_json(&screenshot::capture_page(&launcher, &request).await?)
        }
        Commands::Interact { url, steps } => {
            let content = tokio::fs::read_to_string(&steps).await?;
            let steps: Vec<InteractionStep> = serde_json::from_str(&content)?;
            let sequencer = InteractionSequencer::new(ChromeLauncher::new(cfg.browser.clone()));
            print_json(&sequencer.run(&steps, &url).await)
        }
        Commands::Tools => print_json(&ui_tools(&cfg)?.tool_defs()),
        Commands::Agent { task } => {
            let task = task.or_else(|| cfg.agent.task.clone()).ok_or_else(|| {
                ParasightError::Config("no task given and [agent].task is not set".into())
            })?;
            let registry = ProviderRegistry::from_config(&cfg.llm);
            let (provider, call_config) = registry.active()?;
            let agent = UiTestAgent::new(provider, call_config, Arc::new(ui_tools(&cfg)?), &cfg.agent);
            print_json(&agent.run(&task).await?)
        }
    }
}

fn ui_tools(cfg: &AppConfig) -> ParasightResult<ToolRegistry> {
    let vision = Arc::new(VisionClient::new(&cfg.vision)?);
    let launcher = Arc::new(ChromeLauncher::new(cfg.browser.clone()));
    Ok(ToolRegistry::with_ui_tools(vision, launcher))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> ParasightResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
