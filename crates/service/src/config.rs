//! LLM provider/cascade configuration loaded from `SUMMARIZER_LLM_*`
//! environment variables, following the same `parse_env_var`-with-default
//! idiom as `summarizer_core::config`'s loaders.

use std::collections::HashMap;

use summarizer::llm::{CascadeConfig, ModelSpec, ProviderConfig};

pub struct LlmEnvConfig {
    pub providers: HashMap<String, ProviderConfig>,
    primary: ModelSpec,
    long_context: ModelSpec,
    fallbacks: Vec<ModelSpec>,
}

impl LlmEnvConfig {
    pub fn from_env() -> Self {
        let mut providers = HashMap::new();

        let primary = model_spec("PRIMARY", "openai", "gpt-4o-mini", 128_000);
        providers.insert(primary.provider.clone(), provider_config("PRIMARY", &primary.provider));

        let long_context = model_spec("LONG_CONTEXT", "openai-long", "gpt-4o", 1_000_000);
        providers.insert(long_context.provider.clone(), provider_config("LONG_CONTEXT", &long_context.provider));

        let mut fallbacks = Vec::new();
        if let Ok(fallback_provider) = std::env::var("SUMMARIZER_LLM_FALLBACK_PROVIDER") {
            let spec = model_spec("FALLBACK", &fallback_provider, "gpt-4o-mini", 128_000);
            providers.insert(spec.provider.clone(), provider_config("FALLBACK", &spec.provider));
            fallbacks.push(spec);
        }

        Self {
            providers,
            primary,
            long_context,
            fallbacks,
        }
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }

    pub fn cascade_config(&self) -> CascadeConfig {
        CascadeConfig {
            primary: self.primary.clone(),
            fallbacks: self.fallbacks.clone(),
            long_context_model: self.long_context.clone(),
            base_temperature: parse_env("SUMMARIZER_LLM_BASE_TEMPERATURE", 0.2),
            base_top_p: parse_env("SUMMARIZER_LLM_BASE_TOP_P", 0.9),
            relaxed_temperature: parse_env("SUMMARIZER_LLM_RELAXED_TEMPERATURE", 0.5),
            relaxed_top_p: parse_env("SUMMARIZER_LLM_RELAXED_TOP_P", 0.95),
            guardrail_temperature: parse_env("SUMMARIZER_LLM_GUARDRAIL_TEMPERATURE", 0.1),
            guardrail_top_p: parse_env("SUMMARIZER_LLM_GUARDRAIL_TOP_P", 0.8),
        }
    }
}

fn model_spec(prefix: &str, default_provider: &str, default_model: &str, default_window: u32) -> ModelSpec {
    ModelSpec {
        provider: std::env::var(format!("SUMMARIZER_LLM_{prefix}_PROVIDER")).unwrap_or_else(|_| default_provider.to_string()),
        model: std::env::var(format!("SUMMARIZER_LLM_{prefix}_MODEL")).unwrap_or_else(|_| default_model.to_string()),
        window_tokens: parse_env(&format!("SUMMARIZER_LLM_{prefix}_WINDOW_TOKENS"), default_window),
    }
}

fn provider_config(prefix: &str, provider_name: &str) -> ProviderConfig {
    ProviderConfig {
        base_url: std::env::var(format!("SUMMARIZER_LLM_{prefix}_BASE_URL"))
            .unwrap_or_else(|_| format!("https://api.{provider_name}.example/v1/chat/completions")),
        api_key: std::env::var(format!("SUMMARIZER_LLM_{prefix}_API_KEY")).unwrap_or_default(),
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
