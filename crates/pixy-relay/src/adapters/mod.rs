//! Directional event adapters. Each one consumes a single upstream shape and
//! produces a single downstream shape through [`crate::stream::StreamAdapter`].

mod chat_to_responses;
mod harmony_to_responses;
mod messages_to_responses;
mod responses_to_messages;

pub use chat_to_responses::{outcome_for_finish_reason, ChatToResponsesAdapter};
pub(crate) use harmony_to_responses::emit_harmony_messages;
pub use harmony_to_responses::HarmonyToResponsesAdapter;
pub use messages_to_responses::{outcome_for_stop_reason, MessagesToResponsesAdapter};
pub use responses_to_messages::{
    response_to_message_events, stop_reason_for, tool_input_value, ResponsesToMessagesAdapter,
    CODE_INTERPRETER_TOOL, IMAGE_GENERATION_TOOL, WEB_SEARCH_TOOL,
};
