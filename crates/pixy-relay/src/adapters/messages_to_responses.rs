//! Content-block event stream → item-event stream.

use tracing::debug;

use crate::emitter::{ResponseOutcome, ResponsesEmitter};
use crate::ids::{generate_id, now_unix_seconds, to_call_id, translate_id, IdPrefix};
use crate::protocol::messages::{ContentBlock, ContentBlockDelta, MessageStreamEvent, StopReason};
use crate::protocol::responses::{
    ResponseStreamEvent, INCOMPLETE_CONTENT_FILTER, INCOMPLETE_MAX_OUTPUT_TOKENS,
};
use crate::state::{BlockKey, TokenUsage};
use crate::stream::StreamAdapter;

pub fn outcome_for_stop_reason(reason: Option<StopReason>) -> ResponseOutcome {
    match reason {
        Some(StopReason::MaxTokens) => ResponseOutcome::incomplete(INCOMPLETE_MAX_OUTPUT_TOKENS),
        Some(StopReason::Refusal) => ResponseOutcome::incomplete(INCOMPLETE_CONTENT_FILTER),
        _ => ResponseOutcome::Completed,
    }
}

/// Tool input present at block start; an empty object means "streamed later".
fn initial_input(input: &serde_json::Value) -> Option<String> {
    match input {
        serde_json::Value::Object(map) if map.is_empty() => None,
        serde_json::Value::Null => None,
        other => Some(other.to_string()),
    }
}

#[derive(Debug, Default)]
pub struct MessagesToResponsesAdapter {
    emitter: Option<ResponsesEmitter>,
    model_override: Option<String>,
    input_tokens: u64,
    stop_reason: Option<StopReason>,
}

impl MessagesToResponsesAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model_override = Some(model.into());
        self
    }

    fn emitter(&mut self, message_id: Option<&str>, model: &str) -> &mut ResponsesEmitter {
        let model = self
            .model_override
            .clone()
            .unwrap_or_else(|| model.to_string());
        self.emitter.get_or_insert_with(|| {
            let response_id = message_id
                .map(|id| translate_id(id, IdPrefix::Response))
                .unwrap_or_else(|| generate_id(IdPrefix::Response));
            ResponsesEmitter::new(response_id, model, now_unix_seconds())
        })
    }

    fn open_block(&mut self, index: u32, block: &ContentBlock) -> Vec<ResponseStreamEvent> {
        let key = BlockKey::Index(index);
        let emitter = self.emitter(None, "");
        let mut events = emitter.created();
        match block {
            ContentBlock::Text { text } => {
                events.extend(emitter.open_message(key.clone(), generate_id(IdPrefix::Message)));
                events.extend(emitter.append(&key, text));
            }
            ContentBlock::ToolUse { id, name, input }
            | ContentBlock::ServerToolUse { id, name, input } => {
                events.extend(emitter.open_function_call(
                    key.clone(),
                    to_call_id(id),
                    name.clone(),
                ));
                if let Some(arguments) = initial_input(input) {
                    events.extend(emitter.append(&key, &arguments));
                }
            }
            ContentBlock::Thinking { thinking, .. } => {
                events.extend(
                    emitter.open_reasoning(key.clone(), generate_id(IdPrefix::Reasoning)),
                );
                events.extend(emitter.append(&key, thinking));
            }
            ContentBlock::RedactedThinking { .. } | ContentBlock::Unknown => {
                debug!(index, "no output item for content block");
            }
        }
        events
    }
}

impl StreamAdapter for MessagesToResponsesAdapter {
    type Input = MessageStreamEvent;
    type Output = ResponseStreamEvent;

    fn push(&mut self, event: MessageStreamEvent) -> Vec<ResponseStreamEvent> {
        if self.emitter.as_ref().is_some_and(ResponsesEmitter::is_finished) {
            debug!(event_type = event.event_type(), "ignoring event after completion");
            return Vec::new();
        }
        match event {
            MessageStreamEvent::MessageStart { message } => {
                self.input_tokens = message.usage.input_tokens;
                self.emitter(Some(&message.id), &message.model).created()
            }
            MessageStreamEvent::ContentBlockStart {
                index,
                content_block,
            } => self.open_block(index, &content_block),
            MessageStreamEvent::ContentBlockDelta { index, delta } => {
                let key = BlockKey::Index(index);
                let emitter = self.emitter(None, "");
                let mut events = emitter.created();
                match delta {
                    ContentBlockDelta::TextDelta { text } => {
                        events.extend(emitter.append(&key, &text))
                    }
                    ContentBlockDelta::InputJsonDelta { partial_json } => {
                        events.extend(emitter.append(&key, &partial_json))
                    }
                    ContentBlockDelta::ThinkingDelta { thinking } => {
                        events.extend(emitter.append(&key, &thinking))
                    }
                    ContentBlockDelta::SignatureDelta { .. } => {}
                    ContentBlockDelta::Unknown => {
                        debug!(index, "ignoring unknown content block delta");
                    }
                }
                events
            }
            MessageStreamEvent::ContentBlockStop { index } => {
                self.emitter(None, "").close(&BlockKey::Index(index))
            }
            MessageStreamEvent::MessageDelta { delta, usage } => {
                if delta.stop_reason.is_some() {
                    self.stop_reason = delta.stop_reason;
                }
                let input_tokens = usage.input_tokens.unwrap_or(self.input_tokens);
                self.emitter(None, "")
                    .record_usage(TokenUsage::new(input_tokens, usage.output_tokens));
                Vec::new()
            }
            MessageStreamEvent::MessageStop => {
                let outcome = outcome_for_stop_reason(self.stop_reason);
                self.emitter(None, "").complete(outcome)
            }
            MessageStreamEvent::Error { error } => {
                let emitter = self.emitter(None, "");
                let mut events = emitter.created();
                events.push(emitter.error(Some(error.error_type), error.message));
                events
            }
            MessageStreamEvent::Ping => Vec::new(),
            MessageStreamEvent::Unknown => {
                debug!("ignoring unknown message event");
                Vec::new()
            }
        }
    }

    fn finish(&mut self) -> Vec<ResponseStreamEvent> {
        let outcome = outcome_for_stop_reason(self.stop_reason);
        match self.emitter.as_mut() {
            Some(emitter) => emitter.complete(outcome),
            None => Vec::new(),
        }
    }
}
