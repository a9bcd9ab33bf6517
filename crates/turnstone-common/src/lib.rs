pub mod error;
pub mod message;

pub use error::{Error, Result};
pub use message::{
    ChatRole, ConversationState, Message, ToolCall, TurnPhase, MAX_MESSAGE_CHARS,
};
