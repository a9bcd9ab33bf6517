use serde::{Deserialize, Serialize};
use tracing::warn;
use turnstone_common::{Error, Result};

/// Static description of one chat model: where it lives and how to call it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub provider: String,
    pub name: String,
    pub max_tokens: u32,
    pub context_window: usize,
    pub temperature: Option<f64>,
    pub reasoning_effort: Option<String>,
    /// Free-form operator guidance: limits, recommended sampling, quirks.
    pub usage_notes: String,
}

impl ModelDescriptor {
    pub fn qualified_name(&self) -> String {
        format!("{}/{}", self.provider, self.name)
    }
}

/// Registry of available chat models, grouped by provider and built once
/// at startup. Order within a provider is the fallback order.
pub struct ModelRegistry {
    models: Vec<ModelDescriptor>,
    default_provider: String,
}

impl ModelRegistry {
    pub fn new(models: Vec<ModelDescriptor>, default_provider: &str) -> Self {
        Self {
            models,
            default_provider: default_provider.to_string(),
        }
    }

    /// The built-in model catalog.
    pub fn builtin(default_provider: &str) -> Self {
        let models = vec![
            ModelDescriptor {
                provider: "groq".into(),
                name: "qwen/qwen3-32b".into(),
                max_tokens: 12_000,
                context_window: 131_072,
                temperature: Some(0.55),
                reasoning_effort: Some("default".into()),
                usage_notes: "max completion 40960. Thinking mode works best with \
                    temperature 0.6 and top_p 0.95; for plain dialogue use \
                    temperature 0.7. Keep reasoning content out of multi-turn \
                    history."
                    .into(),
            },
            ModelDescriptor {
                provider: "groq".into(),
                name: "moonshotai/kimi-k2-instruct-0905".into(),
                max_tokens: 8_000,
                context_window: 262_144,
                temperature: Some(0.7),
                reasoning_effort: None,
                usage_notes: "max completion 16384. Strong tool calling; give it \
                    full tool schemas with examples. The large window suits \
                    multi-file coding context."
                    .into(),
            },
            ModelDescriptor {
                provider: "groq".into(),
                name: "openai/gpt-oss-120b".into(),
                max_tokens: 18_000,
                context_window: 131_072,
                temperature: Some(0.6),
                reasoning_effort: Some("low".into()),
                usage_notes: "max completion 65536.".into(),
            },
            ModelDescriptor {
                provider: "groq".into(),
                name: "openai/gpt-oss-20b".into(),
                max_tokens: 22_000,
                context_window: 131_072,
                temperature: Some(0.55),
                reasoning_effort: Some("medium".into()),
                usage_notes: "max completion 65536.".into(),
            },
            ModelDescriptor {
                provider: "openai".into(),
                name: "gpt-5-mini".into(),
                max_tokens: 4_096,
                context_window: 128_000,
                temperature: None,
                reasoning_effort: Some("low".into()),
                usage_notes: "Reasoning model; does not accept a temperature \
                    override."
                    .into(),
            },
            ModelDescriptor {
                provider: "openai".into(),
                name: "gpt-4o".into(),
                max_tokens: 4_096,
                context_window: 128_000,
                temperature: Some(0.7),
                reasoning_effort: None,
                usage_notes: String::new(),
            },
            ModelDescriptor {
                provider: "openai".into(),
                name: "gpt-4o-mini".into(),
                max_tokens: 4_096,
                context_window: 128_000,
                temperature: Some(0.7),
                reasoning_effort: None,
                usage_notes: String::new(),
            },
        ];
        Self::new(models, default_provider)
    }

    pub fn default_provider(&self) -> &str {
        &self.default_provider
    }

    /// Look up a model by provider and name. Unknown combinations are an
    /// error that lists what is available, raised before any network call.
    pub fn get(&self, provider: &str, name: &str) -> Result<&ModelDescriptor> {
        let provider = provider.to_lowercase();
        if !self.models.iter().any(|m| m.provider == provider) {
            return Err(Error::NotFound(format!("unknown provider: {provider}")));
        }
        self.models
            .iter()
            .find(|m| m.provider == provider && m.name == name)
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "model '{name}' not found for provider '{provider}'. available: {}",
                    self.names_for(&provider).join(", ")
                ))
            })
    }

    /// Model names for one provider, in fallback order.
    pub fn names_for(&self, provider: &str) -> Vec<String> {
        self.models
            .iter()
            .filter(|m| m.provider == provider)
            .map(|m| m.name.clone())
            .collect()
    }

    /// All models as "provider/name", across every provider.
    pub fn all_names(&self) -> Vec<String> {
        self.models.iter().map(|m| m.qualified_name()).collect()
    }

    /// Models for one provider, in fallback order.
    pub fn provider_models(&self, provider: &str) -> Vec<&ModelDescriptor> {
        self.models
            .iter()
            .filter(|m| m.provider == provider)
            .collect()
    }

    /// Descriptor at `index` within the default provider's fallback order.
    /// An out-of-range index falls back to the first entry with a warning
    /// rather than failing the call.
    pub fn descriptor_at(&self, index: usize) -> Result<&ModelDescriptor> {
        let provider = self.default_provider.clone();
        self.descriptor_in(&provider, index)
    }

    /// Same as [`descriptor_at`](Self::descriptor_at), scoped to an
    /// explicit provider.
    pub fn descriptor_in(&self, provider: &str, index: usize) -> Result<&ModelDescriptor> {
        let models = self.provider_models(provider);
        if models.is_empty() {
            return Err(Error::NotFound(format!(
                "no models registered for provider '{provider}'"
            )));
        }
        match models.get(index) {
            Some(m) => Ok(m),
            None => {
                warn!(
                    index,
                    provider,
                    "model index out of range, falling back to first entry"
                );
                Ok(models[0])
            }
        }
    }

    /// Position of `name` within `provider`'s fallback order.
    pub fn index_of(&self, provider: &str, name: &str) -> Option<usize> {
        self.provider_models(provider)
            .iter()
            .position(|m| m.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_known_model() {
        let registry = ModelRegistry::builtin("groq");
        let model = registry.get("groq", "qwen/qwen3-32b").unwrap();
        assert_eq!(model.max_tokens, 12_000);
        assert_eq!(model.context_window, 131_072);
    }

    #[test]
    fn descriptors_carry_usage_notes() {
        let registry = ModelRegistry::builtin("groq");
        let qwen = registry.get("groq", "qwen/qwen3-32b").unwrap();
        assert!(qwen.usage_notes.contains("40960"));
        let kimi = registry.get("groq", "moonshotai/kimi-k2-instruct-0905").unwrap();
        assert!(kimi.usage_notes.contains("tool"));
    }

    #[test]
    fn unknown_provider_is_not_found() {
        let registry = ModelRegistry::builtin("groq");
        let err = registry.get("gemini", "gemini-pro").unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn unknown_model_lists_available_names() {
        let registry = ModelRegistry::builtin("groq");
        let err = registry.get("groq", "no-such-model").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("qwen/qwen3-32b"));
        assert!(msg.contains("openai/gpt-oss-20b"));
    }

    #[test]
    fn lookup_is_case_insensitive_on_provider() {
        let registry = ModelRegistry::builtin("groq");
        assert!(registry.get("GROQ", "qwen/qwen3-32b").is_ok());
    }

    #[test]
    fn all_names_are_qualified() {
        let registry = ModelRegistry::builtin("groq");
        let names = registry.all_names();
        assert!(names.contains(&"groq/qwen/qwen3-32b".to_string()));
        assert!(names.contains(&"openai/gpt-4o".to_string()));
    }

    #[test]
    fn out_of_range_index_falls_back_to_first() {
        let registry = ModelRegistry::builtin("groq");
        let model = registry.descriptor_at(99).unwrap();
        assert_eq!(model.name, "qwen/qwen3-32b");
    }

    #[test]
    fn index_of_follows_catalog_order() {
        let registry = ModelRegistry::builtin("groq");
        assert_eq!(registry.index_of("groq", "qwen/qwen3-32b"), Some(0));
        assert_eq!(registry.index_of("groq", "openai/gpt-oss-20b"), Some(3));
        assert_eq!(registry.index_of("groq", "missing"), None);
    }
}
