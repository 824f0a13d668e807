//! Runs an ordered list of interaction steps against one browser session.
//!
//! Navigation happens once before the first step. A failing step yields a
//! failed outcome and the sequence carries on; a failing session (launch,
//! navigation, viewport) aborts with a single failed outcome. The session is
//! closed on every exit path.

use std::fmt;
use std::time::Duration;

use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{ParasightError, ParasightResult};
use crate::executor::coordinator::normalized_to_pixel;
use crate::executor::session::{self, BrowserLauncher, BrowserSession, Viewport};
use crate::perception::types::{NormalizedPoint, PixelPoint};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Action {
    Click,
    Hover,
    Type,
    ScrollToView,
    /// Any literal the sequencer does not know; fails its own step only.
    Unsupported(String),
}

impl From<String> for Action {
    fn from(s: String) -> Self {
        match s.as_str() {
            "click" => Action::Click,
            "hover" => Action::Hover,
            "type" => Action::Type,
            "scroll_to_view" => Action::ScrollToView,
            _ => Action::Unsupported(s),
        }
    }
}

impl From<Action> for String {
    fn from(a: Action) -> Self {
        a.to_string()
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Click => f.write_str("click"),
            Action::Hover => f.write_str("hover"),
            Action::Type => f.write_str("type"),
            Action::ScrollToView => f.write_str("scroll_to_view"),
            Action::Unsupported(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionStep {
    pub target_position: NormalizedPoint,
    pub action: Action,
    /// Required iff `action` is `type`.
    #[serde(default)]
    pub text_to_type: Option<String>,
    #[serde(default = "default_wait_after_ms")]
    pub wait_after_ms: u64,
}

fn default_wait_after_ms() -> u64 {
    500
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionOutcome {
    /// Index of the step this outcome belongs to; absent for session failures.
    pub step_index: Option<usize>,
    pub success: bool,
    pub action_performed: Option<Action>,
    pub resulting_position_px: Option<PixelPoint>,
    /// Base64 PNG captured after the action.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
    pub current_url: Option<String>,
    pub error: Option<String>,
    pub finished_at: DateTime<Utc>,
}

impl InteractionOutcome {
    fn failed(step_index: Option<usize>, error: &ParasightError) -> Self {
        Self {
            step_index,
            success: false,
            action_performed: None,
            resulting_position_px: None,
            screenshot: None,
            current_url: None,
            error: Some(error.to_string()),
            finished_at: Utc::now(),
        }
    }
}

/// Acquires a fresh session from `L` for every `run`; sessions are never shared.
pub struct InteractionSequencer<L> {
    launcher: L,
}

impl<L: BrowserLauncher> InteractionSequencer<L> {
    pub fn new(launcher: L) -> Self {
        Self { launcher }
    }

    pub async fn run(&self, steps: &[InteractionStep], target_url: &str) -> Vec<InteractionOutcome> {
        let run_id = uuid::Uuid::new_v4();
        tracing::info!(%run_id, url = %target_url, steps = steps.len(), "interaction sequence started");

        let mut session = match self.launcher.launch().await {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(%run_id, error = %e, "could not start browser session");
                return vec![InteractionOutcome::failed(None, &e)];
            }
        };

        let outcomes = match prepare(session.as_mut(), target_url).await {
            Ok(viewport) => {
                let mut outcomes = Vec::with_capacity(steps.len());
                for (index, step) in steps.iter().enumerate() {
                    let outcome = run_step(session.as_mut(), index, step, viewport).await;
                    if let Some(ref err) = outcome.error {
                        tracing::warn!(%run_id, step = index, error = %err, "step failed, continuing");
                    }
                    outcomes.push(outcome);
                }
                outcomes
            }
            Err(e) => {
                tracing::error!(%run_id, error = %e, "session setup failed, sequence aborted");
                vec![InteractionOutcome::failed(None, &e)]
            }
        };

        session::release(session.as_mut()).await;
        tracing::info!(
            %run_id,
            succeeded = outcomes.iter().filter(|o| o.success).count(),
            total = outcomes.len(),
            "interaction sequence finished"
        );
        outcomes
    }
}

async fn prepare(session: &mut dyn BrowserSession, target_url: &str) -> ParasightResult<Viewport> {
    if target_url.trim().is_empty() {
        return Err(ParasightError::Input("no target URL provided".into()));
    }
    session.navigate(target_url).await?;
    session.viewport_size().await
}

async fn run_step(
    session: &mut dyn BrowserSession,
    index: usize,
    step: &InteractionStep,
    viewport: Viewport,
) -> InteractionOutcome {
    match perform(session, step, viewport).await {
        Ok(outcome) => InteractionOutcome {
            step_index: Some(index),
            ..outcome
        },
        Err(e) => InteractionOutcome::failed(Some(index), &e),
    }
}

async fn perform(
    session: &mut dyn BrowserSession,
    step: &InteractionStep,
    viewport: Viewport,
) -> ParasightResult<InteractionOutcome> {
    let px = normalized_to_pixel(step.target_position, viewport)?;

    match &step.action {
        Action::Click => session.mouse_click(px.x, px.y).await?,
        Action::Hover => session.mouse_move(px.x, px.y).await?,
        Action::Type => {
            let text = step
                .text_to_type
                .as_deref()
                .filter(|t| !t.is_empty())
                .ok_or_else(|| ParasightError::Input("no text provided for type action".into()))?;
            session.mouse_click(px.x, px.y).await?;
            session.keyboard_type(text).await?;
        }
        Action::ScrollToView => {
            session
                .evaluate(&format!("window.scrollTo({}, {}); true", px.x, px.y))
                .await?;
        }
        Action::Unsupported(name) => {
            return Err(ParasightError::Input(format!("unsupported action: {name}")));
        }
    }
    tracing::debug!(action = %step.action, x = px.x, y = px.y, "action performed");

    if step.wait_after_ms > 0 {
        tokio::time::sleep(Duration::from_millis(step.wait_after_ms)).await;
    }

    let png = session.screenshot(false).await?;
    let current_url = session.current_url().await?;

    Ok(InteractionOutcome {
        step_index: None,
        success: true,
        action_performed: Some(step.action.clone()),
        resulting_position_px: Some(px),
        screenshot: Some(base64::engine::general_purpose::STANDARD.encode(&png)),
        current_url,
        error: None,
        finished_at: Utc::now(),
    })
}
