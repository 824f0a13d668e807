use async_trait::async_trait;

use crate::errors::{ParasightError, ParasightResult};
use crate::llm::provider::LlmProvider;
use crate::llm::types::{CallConfig, ChatMessage, FunctionCall, LlmResponse, ToolCall, ToolDef};

pub struct OpenAiCompatibleProvider {
    id: String,
    api_base: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatibleProvider {
    pub fn new(id: String, api_base: String, api_key: String) -> Self {
        Self {
            id,
            api_base,
            api_key,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.id
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDef],
        cfg: &CallConfig,
    ) -> ParasightResult<LlmResponse> {
        let mut body = serde_json::json!({
            "model": cfg.model,
            "messages": messages,
            "stream": false,
            "temperature": cfg.temperature,
        });

        if !tools.is_empty() {
            body["tools"] = serde_json::to_value(tools)?;
            body["tool_choice"] = serde_json::json!("auto");
        }

        tracing::debug!(
            provider = %self.id,
            model = %cfg.model,
            messages = messages.len(),
            tools = tools.len(),
            "sending LLM request"
        );

        let mut request = self.client.post(&self.api_base).json(&body);
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }
        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let err_body = response.text().await.unwrap_or_default();
            return Err(ParasightError::LlmProvider(format!("{}: {}", status, err_body)));
        }

        let json: serde_json::Value = response.json().await?;
        let response = parse_completion(&json);
        tracing::info!(
            content_len = response.content.len(),
            tool_calls = response.tool_calls.len(),
            tools = ?response.tool_calls.iter().map(|tc| tc.function.name.as_str()).collect::<Vec<_>>(),
            "LLM response received"
        );
        Ok(response)
    }
}

fn parse_completion(json: &serde_json::Value) -> LlmResponse {
    let message = &json["choices"][0]["message"];
    let content = message["content"].as_str().unwrap_or("").to_string();

    let tool_calls: Vec<ToolCall> = message["tool_calls"]
        .as_array()
        .map(|arr| {
            arr.iter()
                .map(|tc| ToolCall {
                    id: tc["id"].as_str().unwrap_or("").to_string(),
                    call_type: tc["type"].as_str().unwrap_or("function").to_string(),
                    function: FunctionCall {
                        name: tc["function"]["name"].as_str().unwrap_or("").to_string(),
                        arguments: tc["function"]["arguments"].as_str().unwrap_or("{}").to_string(),
                    },
                })
                .filter(|tc| !tc.function.name.is_empty())
                .collect()
        })
        .unwrap_or_default();

    LlmResponse { content, tool_calls }
}
