use async_trait::async_trait;

use crate::errors::ParasightResult;
use crate::llm::types::{CallConfig, ChatMessage, LlmResponse, ToolDef};

/// Chat-completion backend used by the agent loop.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Identifier matching the `[llm.providers.<id>]` key.
    fn name(&self) -> &str;

    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDef],
        cfg: &CallConfig,
    ) -> ParasightResult<LlmResponse>;
}
