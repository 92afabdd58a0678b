//! Protocol translation between chat-completion deltas, item-based response
//! events, content-block message events and Harmony-formatted text.

mod adapters;
mod convert;
mod emitter;
mod error;
pub mod harmony;
mod ids;
pub mod protocol;
mod replay;
mod sse;
mod state;
mod stream;

pub use adapters::{
    outcome_for_finish_reason, outcome_for_stop_reason, response_to_message_events,
    stop_reason_for, tool_input_value, ChatToResponsesAdapter, HarmonyToResponsesAdapter,
    MessagesToResponsesAdapter, ResponsesToMessagesAdapter, CODE_INTERPRETER_TOOL,
    IMAGE_GENERATION_TOOL, WEB_SEARCH_TOOL,
};
pub use convert::{
    chat_completion_to_response, harmony_to_response, image_source_url,
    messages_request_to_responses, messages_to_response, response_to_messages, tool_result_text,
    usage_from_chat, usage_from_messages, usage_from_response,
};
pub use emitter::{function_item_id, normalize_arguments, ResponseOutcome, ResponsesEmitter};
pub use error::{RelayError, RelayErrorCode};
pub use ids::{
    generate_id, id_suffix, same_ignoring_prefix, to_call_id, to_tool_use_id, translate_id,
    IdPrefix,
};
pub use protocol::{decode_chat_chunk, decode_message_event, decode_response_event, DONE_SENTINEL};
pub use replay::{replay_message_events, replay_response_events, MessageReplay, ResponseReplay};
pub use sse::{
    encode_message_event, encode_response_event, encode_sse_frame, parse_payloads,
    parse_sse_frames, SseDecoder, SseFrame,
};
pub use state::{
    BlockEvent, BlockKey, BlockKind, ContentBlockState, ConversionState, TokenUsage,
};
pub use stream::{adapt_stream, collect_events, StreamAdapter};
