//! Non-streaming conversions: complete aggregates, requests and usage.

mod aggregate;
mod request;
pub(crate) mod usage;

pub use aggregate::{
    chat_completion_to_response, harmony_to_response, messages_to_response, response_to_messages,
};
pub use request::{image_source_url, messages_request_to_responses, tool_result_text};
pub use usage::{usage_from_chat, usage_from_messages, usage_from_response};
