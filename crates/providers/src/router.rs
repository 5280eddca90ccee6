//! Provider router: selects the provider and model for a request.

use std::collections::HashMap;
use std::sync::Arc;
use threadloom_core::provider::Provider;
use tracing::warn;

use crate::openai_compat::OpenAiCompatProvider;

/// Routes model requests to the correct provider.
pub struct ProviderRouter {
    providers: HashMap<String, Arc<dyn Provider>>,
    /// Models advertised per provider in addition to what it lists itself
    configured_models: HashMap<String, Vec<String>>,
    default_provider: String,
    default_model: String,
}

impl ProviderRouter {
    pub fn new(default_provider: impl Into<String>, default_model: impl Into<String>) -> Self {
        Self {
            providers: HashMap::new(),
            configured_models: HashMap::new(),
            default_provider: default_provider.into(),
            default_model: default_model.into(),
        }
    }

    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn Provider>) {
        self.providers.insert(name.into(), provider);
    }

    pub fn default(&self) -> Option<Arc<dyn Provider>> {
        self.providers.get(&self.default_provider).cloned()
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).cloned()
    }

    /// Resolve a model selector to a provider and the model name it expects.
    ///
    /// `None` means the default model. A selector prefixed with a registered
    /// provider name (`"ollama/llama3"`) routes to that provider; anything
    /// else goes to the default provider unchanged.
    pub fn resolve(&self, selector: Option<&str>) -> Option<(Arc<dyn Provider>, String)> {
        let selector = selector
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.default_model);

        if let Some((prefix, model)) = selector.split_once('/')
            && let Some(provider) = self.providers.get(prefix)
        {
            return Some((provider.clone(), model.to_string()));
        }

        self.default().map(|p| (p, selector.to_string()))
    }

    /// List all registered provider names, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Every model reachable through this router, as `provider/model`.
    ///
    /// Providers that fail to list fall back to their configured models.
    pub async fn list_models(&self) -> Vec<String> {
        let mut models = Vec::new();
        for name in self.list() {
            let Some(provider) = self.providers.get(name) else {
                continue;
            };
            let mut listed = match provider.list_models().await {
                Ok(listed) => listed,
                Err(e) => {
                    warn!(provider = %name, error = %e, "Model listing failed");
                    Vec::new()
                }
            };
            if let Some(extra) = self.configured_models.get(name) {
                listed.extend(extra.iter().cloned());
            }
            if name == self.default_provider {
                listed.push(self.default_model.clone());
            }
            listed.sort();
            listed.dedup();
            models.extend(listed.into_iter().map(|m| format!("{name}/{m}")));
        }
        models
    }
}

/// Build providers from configuration.
pub fn build_from_config(config: &threadloom_config::AppConfig) -> ProviderRouter {
    let mut router = ProviderRouter::new(&config.default_provider, &config.default_model);

    for (name, provider_config) in &config.providers {
        let api_key = provider_config
            .api_key
            .clone()
            .or_else(|| config.api_key.clone())
            .unwrap_or_default();

        let base_url = provider_config
            .api_url
            .clone()
            .unwrap_or_else(|| default_base_url(name));

        register_compat(&mut router, name, &base_url, &api_key);
        if !provider_config.models.is_empty() {
            router
                .configured_models
                .insert(name.clone(), provider_config.models.clone());
        }
    }

    // Ensure the default provider exists (even if not explicitly configured)
    if router.get(&config.default_provider).is_none() {
        let api_key = config.api_key.clone().unwrap_or_default();
        let base_url = default_base_url(&config.default_provider);
        register_compat(&mut router, &config.default_provider, &base_url, &api_key);
    }

    router
}

/// Register an OpenAI-compatible provider, leaving it out if it cannot be built.
fn register_compat(router: &mut ProviderRouter, name: &str, base_url: &str, api_key: &str) {
    match OpenAiCompatProvider::new(name, base_url, api_key) {
        Ok(provider) => router.register(name, Arc::new(provider)),
        Err(e) => warn!(provider = name, error = %e, "Skipping provider"),
    }
}

/// Get the default base URL for well-known providers.
fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "openai" => "https://api.openai.com/v1".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "deepseek" => "https://api.deepseek.com/v1".into(),
        "groq" => "https://api.groq.com/openai/v1".into(),
        "together" => "https://api.together.xyz/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        "llamacpp" | "llama.cpp" => "http://localhost:8080/v1".into(),
        _ => format!("https://{provider_name}.api.example.com/v1"),
    }
}
