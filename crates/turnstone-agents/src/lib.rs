pub mod invoker;
pub mod providers;
pub mod registry;
pub mod tools;
pub mod turn;
pub mod window;

pub use invoker::{InvocationState, ModelInvoker, RetryPolicy};
pub use providers::{
    ChatBackend, ChatRequest, ChatResponse, GroqBackend, HeuristicCounter, OpenAiBackend,
    TokenCounter, ToolDefinition, Usage,
};
pub use registry::{ModelDescriptor, ModelRegistry};
pub use tools::{CurrentTimeTool, Tool, ToolContext, ToolOutput, ToolRegistry};
pub use turn::{TurnEngine, TurnOutcome};
