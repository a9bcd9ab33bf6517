use crate::providers::{ChatBackend, ChatRequest, ChatResponse, OpenAiBackend};
use async_trait::async_trait;
use turnstone_common::Result;

/// Groq backend. Groq exposes an OpenAI-compatible chat-completions API,
/// so this wraps the shared client with Groq's base URL.
#[derive(Clone)]
pub struct GroqBackend {
    inner: OpenAiBackend,
}

impl GroqBackend {
    pub fn new(api_key: String, base_url: Option<String>) -> Self {
        let base_url =
            base_url.unwrap_or_else(|| "https://api.groq.com/openai/v1".to_string());
        Self {
            inner: OpenAiBackend::with_provider_id("groq", api_key, base_url),
        }
    }
}

#[async_trait]
impl ChatBackend for GroqBackend {
    fn provider_id(&self) -> &str {
        "groq"
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse> {
        self.inner.complete(request).await
    }

    async fn health_check(&self) -> Result<bool> {
        self.inner.health_check().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use turnstone_common::Message;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn reports_groq_provider_id() {
        let backend = GroqBackend::new("test-key".into(), None);
        assert_eq!(backend.provider_id(), "groq");
    }

    #[tokio::test]
    async fn completes_against_chat_completions_endpoint() {
        let mock_server = MockServer::start().await;

        let response_body = json!({
            "id": "chatcmpl-groq-1",
            "model": "qwen/qwen3-32b",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "hello from groq"},
                "finish_reason": "stop"
            }]
        });

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(response_body))
            .expect(1)
            .mount(&mock_server)
            .await;

        let backend = GroqBackend::new("test-key".into(), Some(mock_server.uri()));
        let request = ChatRequest {
            model: "qwen/qwen3-32b".into(),
            messages: vec![Message::user("hi")],
            max_tokens: Some(128),
            temperature: Some(0.55),
            reasoning_effort: Some("default".into()),
            tools: vec![],
        };

        let response = backend.complete(&request).await.unwrap();
        assert_eq!(response.message.content, "hello from groq");
        assert_eq!(response.model, "qwen/qwen3-32b");
    }
}
