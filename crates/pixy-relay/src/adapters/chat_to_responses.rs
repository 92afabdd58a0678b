//! Delta-chunk stream → item-event stream.

use tracing::debug;

use crate::convert::usage::usage_from_chat;
use crate::emitter::{ResponseOutcome, ResponsesEmitter};
use crate::ids::{generate_id, translate_id, IdPrefix};
use crate::protocol::chat::{ChatCompletionChunk, ChunkDelta, FinishReason, ToolCallDelta};
use crate::protocol::responses::{
    ResponseStreamEvent, INCOMPLETE_CONTENT_FILTER, INCOMPLETE_MAX_OUTPUT_TOKENS,
};
use crate::state::BlockKey;
use crate::stream::StreamAdapter;

/// Finish reason → terminal outcome. Length cutoffs and filtered output end
/// the response as incomplete.
pub fn outcome_for_finish_reason(reason: Option<FinishReason>) -> ResponseOutcome {
    match reason {
        Some(FinishReason::Length) => ResponseOutcome::incomplete(INCOMPLETE_MAX_OUTPUT_TOKENS),
        Some(FinishReason::ContentFilter) => {
            ResponseOutcome::incomplete(INCOMPLETE_CONTENT_FILTER)
        }
        _ => ResponseOutcome::Completed,
    }
}

#[derive(Debug, Default)]
pub struct ChatToResponsesAdapter {
    emitter: Option<ResponsesEmitter>,
    model_override: Option<String>,
    /// Set once a finish reason arrived; `completed` waits for usage.
    pending_outcome: Option<ResponseOutcome>,
}

impl ChatToResponsesAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports `model` instead of whatever the chunks carry.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model_override = Some(model.into());
        self
    }

    fn emitter_for(&mut self, chunk: &ChatCompletionChunk) -> &mut ResponsesEmitter {
        let model_override = self.model_override.clone();
        self.emitter.get_or_insert_with(|| {
            let response_id = if chunk.id.is_empty() {
                generate_id(IdPrefix::Response)
            } else {
                translate_id(&chunk.id, IdPrefix::Response)
            };
            let model = model_override.unwrap_or_else(|| chunk.model.clone());
            ResponsesEmitter::new(response_id, model, chunk.created)
        })
    }
}

impl StreamAdapter for ChatToResponsesAdapter {
    type Input = ChatCompletionChunk;
    type Output = ResponseStreamEvent;

    fn push(&mut self, chunk: ChatCompletionChunk) -> Vec<ResponseStreamEvent> {
        let emitter = self.emitter_for(&chunk);
        let mut events = emitter.created();
        if emitter.is_finished() {
            debug!(chunk_id = %chunk.id, "ignoring chunk after completion");
            return events;
        }

        let mut finish_reason = None;
        for choice in &chunk.choices {
            if choice.index != 0 {
                debug!(choice = choice.index, "ignoring non-primary choice");
                continue;
            }
            events.extend(apply_delta(emitter, &choice.delta));
            if choice.finish_reason.is_some() {
                finish_reason = choice.finish_reason;
            }
        }

        if let Some(usage) = &chunk.usage {
            emitter.record_usage(usage_from_chat(usage));
        }
        if finish_reason.is_some() {
            events.extend(emitter.close_all());
        }
        let usage_known = emitter.state().usage().is_some();

        if finish_reason.is_some() {
            self.pending_outcome = Some(outcome_for_finish_reason(finish_reason));
        }
        if usage_known {
            if let (Some(outcome), Some(emitter)) =
                (self.pending_outcome.take(), self.emitter.as_mut())
            {
                events.extend(emitter.complete(outcome));
            }
        }
        events
    }

    fn finish(&mut self) -> Vec<ResponseStreamEvent> {
        let outcome = self
            .pending_outcome
            .take()
            .unwrap_or(ResponseOutcome::Completed);
        match self.emitter.as_mut() {
            Some(emitter) => emitter.complete(outcome),
            None => Vec::new(),
        }
    }
}

fn apply_delta(emitter: &mut ResponsesEmitter, delta: &ChunkDelta) -> Vec<ResponseStreamEvent> {
    let mut events = Vec::new();

    if let Some(reasoning) = delta.reasoning_content.as_deref().filter(|text| !text.is_empty()) {
        if !emitter.is_open(&BlockKey::Reasoning) {
            events.extend(
                emitter.open_reasoning(BlockKey::Reasoning, generate_id(IdPrefix::Reasoning)),
            );
        }
        events.extend(emitter.append(&BlockKey::Reasoning, reasoning));
    }

    if let Some(text) = delta.content.as_deref().filter(|text| !text.is_empty()) {
        events.extend(emitter.close(&BlockKey::Reasoning));
        if !emitter.is_open(&BlockKey::Text) {
            events.extend(emitter.open_message(BlockKey::Text, generate_id(IdPrefix::Message)));
        }
        events.extend(emitter.append(&BlockKey::Text, text));
    }

    for tool_call in delta.tool_calls.iter().flatten() {
        events.extend(apply_tool_call(emitter, tool_call));
    }
    events
}

fn apply_tool_call(
    emitter: &mut ResponsesEmitter,
    tool_call: &ToolCallDelta,
) -> Vec<ResponseStreamEvent> {
    let mut events = Vec::new();
    let key = BlockKey::Index(tool_call.index);
    let function = tool_call.function.as_ref();
    let name = function.and_then(|function| function.name.as_deref());

    let open_id = emitter
        .state()
        .block_for(&key)
        .filter(|block| !block.is_completed())
        .map(|block| block.id.clone());
    let starts_new_call = match (&tool_call.id, &open_id) {
        (Some(id), Some(open_id)) => id != open_id,
        (Some(_), None) => true,
        (None, Some(_)) => false,
        (None, None) => name.is_some(),
    };

    if starts_new_call {
        events.extend(emitter.close(&BlockKey::Reasoning));
        events.extend(emitter.close(&BlockKey::Text));
        events.extend(emitter.close(&key));
        let call_id = tool_call
            .id
            .clone()
            .unwrap_or_else(|| generate_id(IdPrefix::Call));
        events.extend(emitter.open_function_call(key.clone(), call_id, name.unwrap_or_default()));
    } else if open_id.is_none() {
        debug!(slot = tool_call.index, "dropping tool call delta without an open call");
        return events;
    }

    if let Some(arguments) = function.and_then(|function| function.arguments.as_deref()) {
        events.extend(emitter.append(&key, arguments));
    }
    events
}
