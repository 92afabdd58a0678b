//! Wire shapes of the three bridged protocols, plus typed decoding at the
//! boundary. Business logic never looks at raw JSON.

pub mod chat;
pub mod messages;
pub mod responses;

use serde::de::DeserializeOwned;

use crate::error::RelayError;

use self::chat::ChatCompletionChunk;
use self::messages::MessageStreamEvent;
use self::responses::ResponseStreamEvent;

/// Sentinel payload some providers send as their last `data:` line.
pub const DONE_SENTINEL: &str = "[DONE]";

fn decode_payload<T: DeserializeOwned>(data: &str, shape: &str) -> Result<Option<T>, RelayError> {
    let trimmed = data.trim();
    if trimmed.is_empty() || trimmed == DONE_SENTINEL {
        return Ok(None);
    }
    serde_json::from_str(trimmed).map(Some).map_err(|error| {
        RelayError::invalid_payload(format!("invalid {shape} payload: {error}"))
            .with_details(serde_json::Value::String(truncate_payload(trimmed)))
    })
}

fn truncate_payload(payload: &str) -> String {
    const MAX_CHARS: usize = 200;
    if payload.chars().count() <= MAX_CHARS {
        return payload.to_string();
    }
    let mut out = payload.chars().take(MAX_CHARS).collect::<String>();
    out.push_str("...");
    out
}

pub fn decode_chat_chunk(data: &str) -> Result<Option<ChatCompletionChunk>, RelayError> {
    decode_payload(data, "chat chunk")
}

pub fn decode_response_event(data: &str) -> Result<Option<ResponseStreamEvent>, RelayError> {
    decode_payload(data, "response event")
}

pub fn decode_message_event(data: &str) -> Result<Option<MessageStreamEvent>, RelayError> {
    decode_payload(data, "message event")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RelayErrorCode;

    #[test]
    fn done_sentinel_and_blank_decode_to_none() {
        assert_eq!(decode_chat_chunk("[DONE]").expect("decode"), None);
        assert_eq!(decode_response_event("  ").expect("decode"), None);
    }

    #[test]
    fn malformed_payload_is_invalid_payload() {
        let error = decode_message_event("{not json").expect_err("must fail");
        assert_eq!(error.code, RelayErrorCode::InvalidPayload);
        assert!(error.message.contains("message event"));
    }

    #[test]
    fn unknown_message_event_decodes() {
        let event = decode_message_event(r#"{"type":"citations_delta","index":0}"#)
            .expect("decode")
            .expect("some event");
        assert_eq!(event, MessageStreamEvent::Unknown);
    }
}
