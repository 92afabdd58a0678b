//! Harmony text-chunk stream → item-event stream.
//!
//! Text is buffered until a whole Harmony unit is present, then each unit is
//! parsed and emitted through the same path the non-streaming converter uses.

use tracing::debug;

use crate::emitter::{ResponseOutcome, ResponsesEmitter};
use crate::harmony::{find_unit_end, parse_harmony_messages, HarmonyChannel, HarmonyMessage};
use crate::ids::{generate_id, now_unix_seconds, IdPrefix};
use crate::protocol::responses::ResponseStreamEvent;
use crate::state::BlockKey;
use crate::stream::StreamAdapter;

const ASSISTANT_ROLE: &str = "assistant";

/// Emits one complete item per assistant message: `analysis` becomes
/// reasoning, calls to `functions.*` become function calls, everything else
/// output text. Messages from other roles are not model output.
pub(crate) fn emit_harmony_messages(
    emitter: &mut ResponsesEmitter,
    messages: &[HarmonyMessage],
) -> Vec<ResponseStreamEvent> {
    let mut events = Vec::new();
    for message in messages {
        if message.role != ASSISTANT_ROLE {
            debug!(role = %message.role, "skipping non-assistant harmony message");
            continue;
        }
        if message.is_tool_call() {
            let call_id = generate_id(IdPrefix::Call);
            let key = BlockKey::Item(call_id.clone());
            let name = message.function_name().unwrap_or_default().to_string();
            events.extend(emitter.open_function_call(key.clone(), call_id, name));
            events.extend(emitter.append(&key, message.content.trim()));
            events.extend(emitter.close(&key));
        } else if message.is_channel(&HarmonyChannel::Analysis) {
            let item_id = generate_id(IdPrefix::Reasoning);
            let key = BlockKey::Item(item_id.clone());
            events.extend(emitter.open_reasoning(key.clone(), item_id));
            events.extend(emitter.append(&key, &message.content));
            events.extend(emitter.close(&key));
        } else {
            let item_id = generate_id(IdPrefix::Message);
            let key = BlockKey::Item(item_id.clone());
            events.extend(emitter.open_message(key.clone(), item_id));
            events.extend(emitter.append(&key, &message.content));
            events.extend(emitter.close(&key));
        }
    }
    events
}

#[derive(Debug)]
pub struct HarmonyToResponsesAdapter {
    emitter: ResponsesEmitter,
    buffer: String,
}

impl HarmonyToResponsesAdapter {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            emitter: ResponsesEmitter::new(
                generate_id(IdPrefix::Response),
                model,
                now_unix_seconds(),
            ),
            buffer: String::new(),
        }
    }

    fn drain_units(&mut self) -> Vec<ResponseStreamEvent> {
        let mut events = Vec::new();
        while let Some(end) = find_unit_end(&self.buffer) {
            let unit = self.buffer[..end].to_string();
            self.buffer.drain(..end);
            let messages = parse_harmony_messages(&unit);
            events.extend(emit_harmony_messages(&mut self.emitter, &messages));
        }
        events
    }
}

impl StreamAdapter for HarmonyToResponsesAdapter {
    type Input = String;
    type Output = ResponseStreamEvent;

    fn push(&mut self, chunk: String) -> Vec<ResponseStreamEvent> {
        if self.emitter.is_finished() {
            return Vec::new();
        }
        let mut events = self.emitter.created();
        self.buffer.push_str(&chunk);
        events.extend(self.drain_units());
        events
    }

    fn finish(&mut self) -> Vec<ResponseStreamEvent> {
        if self.emitter.is_finished() {
            return Vec::new();
        }
        let mut events = self.emitter.created();
        let rest = std::mem::take(&mut self.buffer);
        if !rest.trim().is_empty() {
            debug!(bytes = rest.len(), "flushing unterminated harmony unit");
            let messages = parse_harmony_messages(&rest);
            events.extend(emit_harmony_messages(&mut self.emitter, &messages));
        }
        events.extend(self.emitter.complete(ResponseOutcome::Completed));
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::responses::OutputItem;
    use crate::stream::collect_events;

    fn chunks(text: &str, size: usize) -> Vec<String> {
        text.chars()
            .collect::<Vec<_>>()
            .chunks(size)
            .map(|chunk| chunk.iter().collect())
            .collect()
    }

    #[test]
    fn split_markers_are_reassembled() {
        let text = "<|start|>assistant<|channel|>analysis<|message|>Check weather.<|end|>\
                    <|start|>assistant<|channel|>final<|message|>Sunny.<|return|>";
        let events = collect_events(HarmonyToResponsesAdapter::new("gpt-oss"), chunks(text, 3));
        let response = events
            .last()
            .and_then(ResponseStreamEvent::terminal_response)
            .expect("terminal");
        assert_eq!(response.output.len(), 2);
        assert!(matches!(response.output[0], OutputItem::Reasoning { .. }));
        assert_eq!(response.output_text.as_deref(), Some("Sunny."));
        assert_eq!(response.model, "gpt-oss");
    }

    #[test]
    fn units_are_emitted_as_soon_as_they_close() {
        let mut adapter = HarmonyToResponsesAdapter::new("gpt-oss");
        let first = adapter.push("<|start|>assistant<|channel|>final<|message|>Hi".to_string());
        assert_eq!(
            first.iter().map(ResponseStreamEvent::event_type).collect::<Vec<_>>(),
            vec!["response.created"]
        );
        let second = adapter.push("!<|end|>".to_string());
        assert!(second
            .iter()
            .any(|event| event.event_type() == "response.output_text.done"));
    }

    #[test]
    fn trailing_unterminated_text_is_flushed() {
        let events = collect_events(
            HarmonyToResponsesAdapter::new("gpt-oss"),
            vec!["<|channel|>final<|message|>partial answer".to_string()],
        );
        let response = events
            .last()
            .and_then(ResponseStreamEvent::terminal_response)
            .expect("terminal");
        assert_eq!(response.output_text.as_deref(), Some("partial answer"));
    }

    #[test]
    fn user_messages_are_not_output() {
        let events = collect_events(
            HarmonyToResponsesAdapter::new("gpt-oss"),
            vec!["<|start|>user<|message|>hello<|end|>".to_string()],
        );
        let response = events
            .last()
            .and_then(ResponseStreamEvent::terminal_response)
            .expect("terminal");
        assert!(response.output.is_empty());
    }
}
