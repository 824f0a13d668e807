use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{provider_api_key, LlmConfig};
use crate::errors::{ParasightError, ParasightResult};
use crate::llm::provider::LlmProvider;
use crate::llm::providers::openai_compatible::OpenAiCompatibleProvider;
use crate::llm::types::CallConfig;

/// Registry of configured LLM providers, keyed by their config.toml identifier.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
    active: String,
    llm_config: LlmConfig,
}

impl ProviderRegistry {
    fn register(&mut self, provider: Arc<dyn LlmProvider>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    /// The active provider plus its model settings.
    pub fn active(&self) -> ParasightResult<(Arc<dyn LlmProvider>, CallConfig)> {
        let provider = self.providers.get(&self.active).cloned().ok_or_else(|| {
            ParasightError::Config(format!(
                "Active provider '{}' not found in registry",
                self.active
            ))
        })?;
        let (model, temperature) = self
            .llm_config
            .providers
            .get(&self.active)
            .map(|p| (p.model.clone(), p.temperature))
            .unwrap_or_else(|| (String::new(), 0.1));
        tracing::debug!(provider = %self.active, model = %model, "resolved active provider");
        Ok((provider, CallConfig { model, temperature }))
    }

    /// Builds a registry from the `[llm]` section.
    /// API keys come from `PARASIGHT_<ID>_API_KEY`, then the config file.
    pub fn from_config(config: &LlmConfig) -> Self {
        let mut registry = Self {
            providers: HashMap::new(),
            active: config.active_provider.clone(),
            llm_config: config.clone(),
        };
        for (id, entry) in &config.providers {
            let provider = OpenAiCompatibleProvider::new(
                id.clone(),
                entry.api_base.clone(),
                provider_api_key(id, entry),
            );
            registry.register(Arc::new(provider));
        }
        registry
    }
}
