use serde::{Deserialize, Serialize};

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub turn: TurnConfig,
    pub database: DatabaseConfig,
    /// Credentials per provider, keyed by provider id ("groq", "openai").
    pub providers: Vec<ProviderCredentials>,
}

/// Model selection and invocation limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub default_provider: String,
    pub default_model: String,
    /// Retry attempts per model before falling over to the next one.
    pub max_call_retries: u32,
    /// Max output tokens per reply.
    pub max_tokens: u32,
    /// Context-token budget for window trimming.
    pub max_context_tokens: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            default_provider: "groq".to_string(),
            default_model: "qwen/qwen3-32b".to_string(),
            max_call_retries: 3,
            max_tokens: 4096,
            max_context_tokens: 8000,
        }
    }
}

/// Per-turn execution limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnConfig {
    pub timeout_secs: u64,
    pub max_tool_rounds: usize,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 120,
            max_tool_rounds: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "turnstone.db".to_string(),
        }
    }
}

/// API access for one provider. The key itself stays in the environment;
/// config only names the variable holding it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderCredentials {
    pub provider: String,
    pub api_key_env: String,
    #[serde(default)]
    pub base_url: Option<String>,
}
