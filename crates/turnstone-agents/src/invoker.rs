use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};
use turnstone_common::{Error, Message, Result};

use crate::providers::{ChatBackend, ChatRequest, ChatResponse, TokenCounter, ToolDefinition};
use crate::registry::{ModelDescriptor, ModelRegistry};

/// Bounded retry with exponential backoff, applied per model before
/// falling back to the next one.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based), doubling up to the cap.
    fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.saturating_mul(1 << attempt.saturating_sub(1).min(16));
        exp.min(self.max_delay)
    }
}

/// Which model a single call is currently aimed at. Scoped per call so
/// concurrent turns never observe each other's fallback position.
#[derive(Debug, Clone)]
pub struct InvocationState {
    pub provider: String,
    pub index: usize,
}

/// Calls chat backends with retry and circular model fallback.
///
/// A transient failure is retried on the same model; once retries are
/// exhausted, or on any other upstream failure, the call moves to the
/// next model in the provider's fallback order. When every model has
/// been tried once the call fails with the last cause attached.
pub struct ModelInvoker {
    registry: Arc<ModelRegistry>,
    backends: HashMap<String, Arc<dyn ChatBackend>>,
    default_model: String,
    retry: RetryPolicy,
}

impl ModelInvoker {
    pub fn new(
        registry: Arc<ModelRegistry>,
        backends: HashMap<String, Arc<dyn ChatBackend>>,
        default_model: &str,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            registry,
            backends,
            default_model: default_model.to_string(),
            retry,
        }
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Fresh per-call state aimed at the configured default model. If the
    /// default is missing from the catalog, start from the first entry.
    pub fn state(&self) -> InvocationState {
        let provider = self.registry.default_provider().to_string();
        let index = match self.registry.index_of(&provider, &self.default_model) {
            Some(index) => index,
            None => {
                warn!(
                    requested = %self.default_model,
                    provider = %provider,
                    "default model not in catalog, starting from first entry"
                );
                0
            }
        };
        InvocationState { provider, index }
    }

    /// Per-call state aimed at an explicit provider and model. Unknown
    /// combinations fail here, before any network traffic.
    pub fn state_for(&self, provider: &str, model: &str) -> Result<InvocationState> {
        self.registry.get(provider, model)?;
        let provider = provider.to_lowercase();
        let index = self
            .registry
            .index_of(&provider, model)
            .ok_or_else(|| Error::NotFound(format!("model '{model}' not in catalog")))?;
        Ok(InvocationState { provider, index })
    }

    /// Descriptor the call is currently aimed at.
    pub fn current_model(&self, state: &InvocationState) -> Result<&ModelDescriptor> {
        self.registry.descriptor_in(&state.provider, state.index)
    }

    /// Token counter for the model the call is currently aimed at.
    pub fn counter_for(&self, state: &InvocationState) -> Result<Arc<dyn TokenCounter>> {
        let model = self.registry.descriptor_in(&state.provider, state.index)?;
        let backend = self.backend(&model.provider)?;
        Ok(backend.token_counter(&model.name))
    }

    fn backend(&self, provider: &str) -> Result<&Arc<dyn ChatBackend>> {
        self.backends
            .get(provider)
            .ok_or_else(|| Error::Config(format!("no backend configured for provider '{provider}'")))
    }

    /// Run one completion, retrying and falling back as needed. Mutates
    /// `state` so follow-up calls in the same turn stay on whichever model
    /// ended up answering.
    pub async fn invoke(
        &self,
        state: &mut InvocationState,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<ChatResponse> {
        let total_models = self.registry.provider_models(&state.provider).len();
        if total_models == 0 {
            return Err(Error::NotFound(format!(
                "no models registered for provider '{}'",
                state.provider
            )));
        }

        let mut models_tried = 0;
        let mut last_error: Option<Error> = None;

        while models_tried < total_models {
            let model = self
                .registry
                .descriptor_in(&state.provider, state.index)?
                .clone();
            let backend = self.backend(&model.provider)?;

            let request = ChatRequest {
                model: model.name.clone(),
                messages: messages.to_vec(),
                max_tokens: Some(model.max_tokens),
                temperature: model.temperature,
                reasoning_effort: model.reasoning_effort.clone(),
                tools: tools.to_vec(),
            };

            match self.call_with_retry(backend.as_ref(), &request).await {
                Ok(response) => {
                    debug!(model = %model.name, "completion succeeded");
                    return Ok(response);
                }
                Err(e) => {
                    models_tried += 1;
                    error!(
                        model = %model.name,
                        models_tried,
                        total_models,
                        error = %e,
                        "model failed after retries"
                    );
                    last_error = Some(e);

                    if models_tried >= total_models {
                        break;
                    }

                    let next_index = (state.index + 1) % total_models;
                    let next = self.registry.descriptor_in(&state.provider, next_index)?;
                    warn!(
                        from_index = state.index,
                        to_index = next_index,
                        to_model = %next.name,
                        "switching to next model"
                    );
                    state.index = next_index;
                }
            }
        }

        let last = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no error recorded".to_string());
        error!(models_tried, last = %last, "all models failed");
        Err(Error::AllModelsExhausted {
            tried: models_tried,
            last,
        })
    }

    /// One model, up to `max_attempts` tries. Only transient upstream
    /// failures are retried; anything else surfaces immediately.
    async fn call_with_retry(
        &self,
        backend: &dyn ChatBackend,
        request: &ChatRequest,
    ) -> Result<ChatResponse> {
        let mut attempt = 1;
        loop {
            match backend.complete(request).await {
                Ok(response) => {
                    debug!(model = %request.model, attempt, "chat call succeeded");
                    return Ok(response);
                }
                Err(e) if e.is_transient() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        model = %request.model,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    info!(model = %request.model, attempt, error = %e, "chat call failed");
                    return Err(e);
                }
            }
        }
    }
}
