use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use turnstone_common::{Message, Result};

pub mod groq;
pub mod openai;

pub use groq::GroqBackend;
pub use openai::OpenAiBackend;

/// Trait for chat-completion backend integrations (Groq, OpenAI, etc.).
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Backend identifier (e.g. "groq", "openai").
    fn provider_id(&self) -> &str;

    /// Send a completion request and return the response.
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse>;

    /// Token counter for `model`. Backends without exact counting fall
    /// back to the character heuristic.
    fn token_counter(&self, _model: &str) -> Arc<dyn TokenCounter> {
        Arc::new(HeuristicCounter)
    }

    /// Check if the backend is reachable and configured.
    async fn health_check(&self) -> Result<bool>;
}

/// Counts the tokens a message sequence would occupy for one model.
pub trait TokenCounter: Send + Sync {
    fn count(&self, messages: &[Message], system: Option<&str>) -> Result<usize>;
}

/// Rough estimate at four characters per token.
pub struct HeuristicCounter;

impl TokenCounter for HeuristicCounter {
    fn count(&self, messages: &[Message], system: Option<&str>) -> Result<usize> {
        let mut chars = system.map(str::len).unwrap_or(0);
        for msg in messages {
            chars += msg.content.len();
            for call in &msg.tool_calls {
                chars += call.name.len() + call.arguments.to_string().len();
            }
        }
        Ok(chars / 4)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
    pub reasoning_effort: Option<String>,
    pub tools: Vec<ToolDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub message: Message,
    pub model: String,
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}
