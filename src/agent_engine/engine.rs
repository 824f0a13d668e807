use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::config::AgentConfig;
use crate::errors::{ParasightError, ParasightResult};
use crate::llm::provider::LlmProvider;
use crate::llm::tools::ToolRegistry;
use crate::llm::types::{CallConfig, ChatMessage, ToolCall};

/// Fields whose base64 payloads are kept out of the conversation.
const ELIDED_FIELDS: &[&str] = &["screenshot", "image_base64"];

#[derive(Debug, Clone, Serialize)]
pub struct ToolCallRecord {
    pub iteration: u32,
    pub tool: String,
    pub arguments: Value,
    pub success: bool,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentReport {
    pub run_id: String,
    pub task: String,
    pub final_output: String,
    pub iterations: u32,
    pub tool_calls: Vec<ToolCallRecord>,
}

/// Drives one UI-test task: the model chooses tools, the registry runs them.
pub struct UiTestAgent {
    provider: Arc<dyn LlmProvider>,
    call_config: CallConfig,
    tools: Arc<ToolRegistry>,
    instructions: String,
    max_iterations: u32,
}

impl UiTestAgent {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        call_config: CallConfig,
        tools: Arc<ToolRegistry>,
        config: &AgentConfig,
    ) -> Self {
        Self {
            provider,
            call_config,
            tools,
            instructions: config.instructions.clone(),
            max_iterations: config.max_iterations,
        }
    }

    pub async fn run(&self, task: &str) -> ParasightResult<AgentReport> {
        if task.trim().is_empty() {
            return Err(ParasightError::Input("agent task is empty".into()));
        }
        let run_id = uuid::Uuid::new_v4().to_string();
        tracing::info!(%run_id, provider = self.provider.name(), task = %task, "agent run started");

        let defs = self.tools.tool_defs();
        let mut messages = vec![
            ChatMessage::system(self.instructions.clone()),
            ChatMessage::user(task),
        ];
        let mut records = Vec::new();

        for iteration in 1..=self.max_iterations {
            tracing::info!(%run_id, iteration, messages = messages.len(), "planning → calling LLM");
            let response = self.provider.chat(&messages, &defs, &self.call_config).await?;

            if response.tool_calls.is_empty() {
                tracing::info!(%run_id, iteration, tool_calls = records.len(), "agent run finished");
                return Ok(AgentReport {
                    run_id,
                    task: task.to_string(),
                    final_output: response.content,
                    iterations: iteration,
                    tool_calls: records,
                });
            }

            messages.push(ChatMessage::assistant(
                response.content.clone(),
                response.tool_calls.clone(),
            ));
            for call in &response.tool_calls {
                let (record, reply) = self.dispatch(iteration, call).await;
                records.push(record);
                messages.push(ChatMessage::tool(call.id.clone(), reply));
            }
        }

        tracing::warn!(%run_id, max = self.max_iterations, "agent hit iteration limit");
        Err(ParasightError::Agent(format!(
            "no final answer after {} iterations",
            self.max_iterations
        )))
    }

    async fn dispatch(&self, iteration: u32, call: &ToolCall) -> (ToolCallRecord, String) {
        let arguments: Value = match serde_json::from_str(&call.function.arguments) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(tool = %call.function.name, error = %e, "malformed tool arguments");
                let reply = serde_json::json!({
                    "success": false,
                    "error": format!("invalid tool arguments: {e}"),
                });
                let record = ToolCallRecord {
                    iteration,
                    tool: call.function.name.clone(),
                    arguments: Value::Null,
                    success: false,
                    finished_at: Utc::now(),
                };
                return (record, reply.to_string());
            }
        };

        let mut output = self.tools.execute(&call.function.name, arguments.clone()).await;
        let success = output["success"].as_bool().unwrap_or(false);
        elide_payloads(&mut output);
        tracing::info!(tool = %call.function.name, success, "tool call complete");

        let record = ToolCallRecord {
            iteration,
            tool: call.function.name.clone(),
            arguments,
            success,
            finished_at: Utc::now(),
        };
        (record, output.to_string())
    }
}

/// Replaces base64 payloads with a size marker, recursively.
fn elide_payloads(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, v) in map.iter_mut() {
                match v {
                    Value::String(s) if ELIDED_FIELDS.contains(&key.as_str()) => {
                        *s = format!("<{} base64 chars omitted>", s.len());
                    }
                    _ => elide_payloads(v),
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(elide_payloads),
        _ => {}
    }
}
