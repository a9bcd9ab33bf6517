use tracing::{debug, warn};
use turnstone_common::{ChatRole, Message};

use crate::providers::TokenCounter;

/// Builds the message window sent to a model: the system prompt followed
/// by the longest history suffix that fits the token budget.
///
/// Messages are kept whole and the suffix always starts on a user
/// message, so the model never sees an assistant reply or tool result
/// without the request that produced it. If token counting fails, the
/// full untrimmed history is sent rather than failing the turn.
pub fn prepare(
    history: &[Message],
    counter: &dyn TokenCounter,
    system_prompt: &str,
    max_tokens: usize,
) -> Vec<Message> {
    let mut window = vec![Message::system(system_prompt)];

    // Candidate suffixes, longest first. Each must open on a user message.
    for start in 0..history.len() {
        if history[start].role != ChatRole::User {
            continue;
        }
        let suffix = &history[start..];
        match counter.count(suffix, Some(system_prompt)) {
            Ok(tokens) if tokens <= max_tokens => {
                debug!(
                    kept = suffix.len(),
                    dropped = start,
                    tokens,
                    "prepared message window"
                );
                window.extend_from_slice(suffix);
                return window;
            }
            Ok(_) => continue,
            Err(e) => {
                warn!(error = %e, "token counting failed, sending full history");
                window.extend_from_slice(history);
                return window;
            }
        }
    }

    // Nothing fits; send just the system prompt.
    debug!("no history suffix fits the budget");
    window
}
