use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use turnstone_common::{
    ChatRole, ConversationState, Error, Message, Result, TurnPhase,
};
use turnstone_db::{CheckpointStore, MemoryRecall};

use crate::invoker::{InvocationState, ModelInvoker};
use crate::tools::{ToolContext, ToolRegistry};
use crate::window;

/// Result of a completed turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub thread_id: String,
    pub reply: Message,
    pub state: ConversationState,
}

/// Drives one conversational turn: user message in, assistant reply out,
/// with tool rounds in between and a checkpoint saved after every phase
/// transition.
///
/// Turns on the same thread are serialized by a per-thread lock; turns on
/// different threads run concurrently. The whole turn runs under a
/// timeout that also cancels any in-flight retry backoff.
pub struct TurnEngine {
    invoker: Arc<ModelInvoker>,
    tools: Arc<ToolRegistry>,
    checkpoints: Arc<dyn CheckpointStore>,
    memory: Option<Arc<dyn MemoryRecall>>,
    system_prompt: String,
    max_context_tokens: usize,
    turn_timeout: Duration,
    max_tool_rounds: usize,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl TurnEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        invoker: Arc<ModelInvoker>,
        tools: Arc<ToolRegistry>,
        checkpoints: Arc<dyn CheckpointStore>,
        memory: Option<Arc<dyn MemoryRecall>>,
        system_prompt: impl Into<String>,
        max_context_tokens: usize,
        turn_timeout: Duration,
        max_tool_rounds: usize,
    ) -> Self {
        Self {
            invoker,
            tools,
            checkpoints,
            memory,
            system_prompt: system_prompt.into(),
            max_context_tokens,
            turn_timeout,
            max_tool_rounds,
            locks: DashMap::new(),
        }
    }

    /// Run a full turn for `thread_id`. An explicit `(provider, model)`
    /// override aims the turn at that model; unknown overrides fail before
    /// anything is persisted or sent.
    pub async fn run_turn(
        &self,
        thread_id: &str,
        user_text: &str,
        model_override: Option<(&str, &str)>,
    ) -> Result<TurnOutcome> {
        let user_message = Message::user(user_text);
        user_message.validate()?;

        let mut invocation = match model_override {
            Some((provider, model)) => self.invoker.state_for(provider, model)?,
            None => self.invoker.state(),
        };

        let lock = self.thread_lock(thread_id);
        let guard = lock.lock().await;

        let result = tokio::time::timeout(
            self.turn_timeout,
            self.run_turn_inner(thread_id, user_message, &mut invocation),
        )
        .await;

        drop(guard);
        drop(lock);
        self.release_thread_lock(thread_id);

        result.map_err(|_| Error::TurnTimeout(self.turn_timeout))?
    }

    /// Continue an interrupted turn from its latest checkpoint. Returns
    /// `None` when the thread has no checkpoint or its last turn already
    /// finished. Tool results that were persisted before the interruption
    /// are not re-executed.
    pub async fn resume_turn(&self, thread_id: &str) -> Result<Option<TurnOutcome>> {
        let lock = self.thread_lock(thread_id);
        let guard = lock.lock().await;

        let result = self.resume_turn_locked(thread_id).await;

        drop(guard);
        drop(lock);
        self.release_thread_lock(thread_id);

        result
    }

    async fn resume_turn_locked(&self, thread_id: &str) -> Result<Option<TurnOutcome>> {
        let Some(checkpoint) = self.checkpoints.load(thread_id).await? else {
            return Ok(None);
        };
        if checkpoint.phase == TurnPhase::Done {
            return Ok(None);
        }

        info!(
            thread_id,
            step = checkpoint.step,
            "resuming interrupted turn"
        );
        let mut state = checkpoint.state;
        let mut invocation = self.invoker.state();

        let outcome = tokio::time::timeout(
            self.turn_timeout,
            self.drive(thread_id, &mut state, &mut invocation),
        )
        .await
        .map_err(|_| Error::TurnTimeout(self.turn_timeout))??;

        Ok(Some(outcome))
    }

    async fn run_turn_inner(
        &self,
        thread_id: &str,
        user_message: Message,
        invocation: &mut InvocationState,
    ) -> Result<TurnOutcome> {
        let mut state = match self.checkpoints.load(thread_id).await? {
            Some(checkpoint) => checkpoint.state,
            None => ConversationState::default(),
        };

        state.long_term_memory = self.recall_memory(&user_message.content).await;
        state.push(user_message);
        self.checkpoints
            .save(thread_id, TurnPhase::AwaitingModel, &state)
            .await?;

        self.drive(thread_id, &mut state, invocation).await
    }

    /// The model/tool loop. The conversation log is append-only, so an
    /// assistant message with tool calls sitting at the tail means those
    /// calls have not been answered yet.
    async fn drive(
        &self,
        thread_id: &str,
        state: &mut ConversationState,
        invocation: &mut InvocationState,
    ) -> Result<TurnOutcome> {
        let mut rounds = 0;
        loop {
            if let Some(last) = state.last()
                && last.role == ChatRole::Assistant
                && !last.tool_calls.is_empty()
            {
                if rounds >= self.max_tool_rounds {
                    return Err(Error::TurnBudgetExceeded(rounds));
                }
                let calls = last.tool_calls.clone();
                self.run_tool_round(thread_id, state, &calls).await?;
                rounds += 1;
            }

            let counter = self.invoker.counter_for(invocation)?;
            let prompt = self.effective_prompt(&state.long_term_memory);
            let window = window::prepare(
                &state.messages,
                counter.as_ref(),
                &prompt,
                self.max_context_tokens,
            );

            let response = self
                .invoker
                .invoke(invocation, &window, &self.tools.definitions())
                .await?;
            state.push(response.message.clone());

            if response.message.tool_calls.is_empty() {
                self.checkpoints
                    .save(thread_id, TurnPhase::Done, state)
                    .await?;
                info!(thread_id, model = %response.model, "turn complete");
                return Ok(TurnOutcome {
                    thread_id: thread_id.to_string(),
                    reply: response.message,
                    state: state.clone(),
                });
            }

            debug!(
                thread_id,
                calls = response.message.tool_calls.len(),
                "model requested tools"
            );
            self.checkpoints
                .save(thread_id, TurnPhase::AwaitingTool, state)
                .await?;
        }
    }

    /// Execute one batch of tool calls, appending exactly one result
    /// message per call. Tool failures flow back to the model as error
    /// text; an unknown tool name fails the turn.
    async fn run_tool_round(
        &self,
        thread_id: &str,
        state: &mut ConversationState,
        calls: &[turnstone_common::ToolCall],
    ) -> Result<()> {
        let ctx = ToolContext {
            thread_id: thread_id.to_string(),
        };

        for call in calls {
            let tool = self.tools.get(&call.name).ok_or_else(|| {
                Error::NotFound(format!("model requested unknown tool '{}'", call.name))
            })?;

            let content = match tool.execute(&ctx, call.arguments.clone()).await {
                Ok(output) if output.is_error => {
                    warn!(thread_id, tool = %call.name, "tool reported an error");
                    format!("tool error: {}", output.content)
                }
                Ok(output) => output.content,
                Err(e) => {
                    warn!(thread_id, tool = %call.name, error = %e, "tool execution failed");
                    format!("tool error: {e}")
                }
            };
            state.push(Message::tool_result(call.id.clone(), content));
        }

        self.checkpoints
            .save(thread_id, TurnPhase::AwaitingModel, state)
            .await?;
        Ok(())
    }

    /// Best-effort memory lookup; failures never fail the turn.
    async fn recall_memory(&self, query: &str) -> String {
        let Some(memory) = &self.memory else {
            return String::new();
        };
        match memory.query(query).await {
            Ok(snippet) => snippet,
            Err(e) => {
                warn!(error = %e, "memory recall failed, continuing without it");
                String::new()
            }
        }
    }

    fn effective_prompt(&self, memory: &str) -> String {
        if memory.is_empty() {
            self.system_prompt.clone()
        } else {
            format!(
                "{}\n\nRelevant long-term memory:\n- {memory}",
                self.system_prompt
            )
        }
    }

    fn thread_lock(&self, thread_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(thread_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the lock entry once no other turn holds or awaits it, so the
    /// map does not grow with every thread id ever seen.
    fn release_thread_lock(&self, thread_id: &str) {
        self.locks
            .remove_if(thread_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}
