//! Item-event stream (or a complete aggregate) → content-block event stream.
//!
//! The target protocol only knows `text` and `tool_use` blocks, so built-in
//! tool items (web search, image generation, code interpreter) become
//! tool-use blocks whose "input" is a sequence of small JSON status payloads.

use serde_json::{json, Value};
use tracing::debug;

use crate::convert::usage::usage_from_response;
use crate::ids::{generate_id, to_tool_use_id, translate_id, IdPrefix};
use crate::protocol::messages::{
    ApiErrorBody, ContentBlock, ContentBlockDelta, MessageDelta, MessageDeltaUsage,
    MessageStreamEvent, MessagesResponse, MessagesUsage, StopReason,
};
use crate::protocol::responses::{
    ItemProgress, ItemStatus, OutputContent, OutputItem, ResponseObject, ResponseStatus,
    ResponseStreamEvent, INCOMPLETE_CONTENT_FILTER,
};
use crate::state::{BlockEvent, BlockKey, BlockKind, ConversionState};
use crate::stream::{collect_events, StreamAdapter};

pub const WEB_SEARCH_TOOL: &str = "web_search";
pub const IMAGE_GENERATION_TOOL: &str = "image_generation";
pub const CODE_INTERPRETER_TOOL: &str = "code_interpreter";

/// Length cutoff beats tool use, tool use beats a plain end of turn.
pub fn stop_reason_for(response: Option<&ResponseObject>, has_tool_use: bool) -> StopReason {
    if let Some(response) = response {
        if response.status == ResponseStatus::Incomplete {
            let filtered = response
                .incomplete_details
                .as_ref()
                .is_some_and(|details| details.reason == INCOMPLETE_CONTENT_FILTER);
            return if filtered {
                StopReason::Refusal
            } else {
                StopReason::MaxTokens
            };
        }
    }
    if has_tool_use {
        StopReason::ToolUse
    } else {
        StopReason::EndTurn
    }
}

fn status_payload(status: &str) -> String {
    json!({ "status": status }).to_string()
}

#[derive(Debug, Default)]
pub struct ResponsesToMessagesAdapter {
    state: ConversionState,
    model: String,
    started: bool,
    stopped: bool,
}

impl ResponsesToMessagesAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn start(&mut self, response: Option<&ResponseObject>) -> Vec<MessageStreamEvent> {
        if self.started {
            return Vec::new();
        }
        self.started = true;
        let id = response
            .map(|response| translate_id(&response.id, IdPrefix::Message))
            .unwrap_or_else(|| generate_id(IdPrefix::Message));
        if self.model.is_empty() {
            self.model = response.map(|response| response.model.clone()).unwrap_or_default();
        }
        let mut message = MessagesResponse::new(id, self.model.clone());
        message.usage = response
            .and_then(|response| response.usage.as_ref())
            .map(|usage| MessagesUsage::from(usage_from_response(usage)))
            .unwrap_or_default();
        vec![MessageStreamEvent::MessageStart { message }]
    }

    fn block_index(&self, key: &BlockKey) -> Option<u32> {
        self.state
            .block_for(key)
            .filter(|block| !block.is_completed())
            .map(|block| block.index as u32)
    }

    fn open_item(&mut self, item: &OutputItem) -> Vec<MessageStreamEvent> {
        let Some(item_id) = item.id() else {
            debug!("ignoring output item without id");
            return Vec::new();
        };
        let key = BlockKey::Item(item_id.to_string());
        if self.state.is_open(&key) {
            return Vec::new();
        }
        let (kind, id, name) = match item {
            OutputItem::Message { id, .. } => (BlockKind::Text, id.clone(), None),
            OutputItem::FunctionCall { call_id, name, .. } => {
                (BlockKind::ToolUse, to_tool_use_id(call_id), Some(name.clone()))
            }
            OutputItem::WebSearchCall { id, .. } => {
                (BlockKind::ToolUse, to_tool_use_id(id), Some(WEB_SEARCH_TOOL.to_string()))
            }
            OutputItem::ImageGenerationCall { id, .. } => (
                BlockKind::ToolUse,
                to_tool_use_id(id),
                Some(IMAGE_GENERATION_TOOL.to_string()),
            ),
            OutputItem::CodeInterpreterCall { id, .. } => (
                BlockKind::ToolUse,
                to_tool_use_id(id),
                Some(CODE_INTERPRETER_TOOL.to_string()),
            ),
            OutputItem::Reasoning { .. } | OutputItem::Unknown => {
                debug!(kind = item.kind(), "no content block for output item");
                return Vec::new();
            }
        };
        let Some(added) = self.state.open(key.clone(), kind, id.clone(), name.clone()) else {
            return Vec::new();
        };
        let content_block = match kind {
            BlockKind::Text => ContentBlock::Text {
                text: String::new(),
            },
            _ => ContentBlock::ToolUse {
                id,
                name: name.unwrap_or_default(),
                input: json!({}),
            },
        };
        let mut events = vec![MessageStreamEvent::ContentBlockStart {
            index: added.index() as u32,
            content_block,
        }];
        if let Some(status) = builtin_status(item) {
            events.extend(self.append(&key, &status_payload(status.as_str())));
        }
        events
    }

    fn append(&mut self, key: &BlockKey, fragment: &str) -> Vec<MessageStreamEvent> {
        let Some(kind) = self.state.block_for(key).map(|block| block.kind) else {
            debug!(?key, "dropping delta for unknown item");
            return Vec::new();
        };
        let Some(delta) = self.state.append(key, fragment) else {
            return Vec::new();
        };
        let BlockEvent::Delta { index, fragment } = delta else {
            return Vec::new();
        };
        let delta = match kind {
            BlockKind::Text => ContentBlockDelta::TextDelta { text: fragment },
            BlockKind::ToolUse => ContentBlockDelta::InputJsonDelta {
                partial_json: fragment,
            },
            BlockKind::Reasoning => ContentBlockDelta::ThinkingDelta { thinking: fragment },
        };
        vec![MessageStreamEvent::ContentBlockDelta {
            index: index as u32,
            delta,
        }]
    }

    fn close(&mut self, key: &BlockKey) -> Vec<MessageStreamEvent> {
        self.state
            .complete(key)
            .map(|done| MessageStreamEvent::ContentBlockStop {
                index: done.index() as u32,
            })
            .into_iter()
            .collect()
    }

    /// Item finished. Items never announced with `added` are opened and
    /// backfilled from the item itself.
    fn finish_item(&mut self, item: &OutputItem) -> Vec<MessageStreamEvent> {
        let Some(item_id) = item.id() else {
            return Vec::new();
        };
        let key = BlockKey::Item(item_id.to_string());
        let backfill = !self.state.is_open(&key);
        let mut events = self.open_item(item);
        if self.block_index(&key).is_none() {
            return events;
        }
        let streamed_nothing = self
            .state
            .block_for(&key)
            .is_some_and(|block| block.content.is_empty());

        match item {
            OutputItem::Message { content, .. } if streamed_nothing => {
                let text = content
                    .iter()
                    .filter_map(|part| match part {
                        OutputContent::OutputText { text, .. } => Some(text.as_str()),
                        _ => None,
                    })
                    .collect::<String>();
                events.extend(self.append(&key, &text));
            }
            OutputItem::FunctionCall { arguments, .. } if streamed_nothing => {
                events.extend(self.append(&key, arguments));
            }
            OutputItem::WebSearchCall { action, .. } => {
                if let Some(query) = action.as_ref().and_then(|action| action.query.as_deref()) {
                    events.extend(self.append(&key, &json!({ "query": query }).to_string()));
                }
            }
            OutputItem::CodeInterpreterCall { code: Some(code), .. } if backfill => {
                events.extend(self.append(&key, &json!({ "code": code }).to_string()));
            }
            _ => {}
        }
        events.extend(self.close(&key));
        events
    }

    fn progress(&mut self, progress: &ItemProgress, status: ItemStatus) -> Vec<MessageStreamEvent> {
        let key = BlockKey::Item(progress.item_id.clone());
        self.append(&key, &status_payload(status.as_str()))
    }

    fn stop(&mut self, response: Option<&ResponseObject>) -> Vec<MessageStreamEvent> {
        if self.stopped {
            return Vec::new();
        }
        let mut events = self.start(response);
        let closed = self.state.complete_all();
        events.extend(closed.into_iter().map(|done| MessageStreamEvent::ContentBlockStop {
            index: done.index() as u32,
        }));
        self.stopped = true;

        let stop_reason = stop_reason_for(response, self.state.has_kind(BlockKind::ToolUse));
        let usage = response
            .and_then(|response| response.usage.as_ref())
            .map(|usage| MessageDeltaUsage {
                output_tokens: usage.output_tokens,
                input_tokens: Some(usage.input_tokens),
            })
            .unwrap_or_default();
        events.push(MessageStreamEvent::MessageDelta {
            delta: MessageDelta {
                stop_reason: Some(stop_reason),
                stop_sequence: None,
            },
            usage,
        });
        events.push(MessageStreamEvent::MessageStop);
        events
    }
}

fn builtin_status(item: &OutputItem) -> Option<ItemStatus> {
    match item {
        OutputItem::WebSearchCall { status, .. }
        | OutputItem::ImageGenerationCall { status, .. }
        | OutputItem::CodeInterpreterCall { status, .. } => Some(*status),
        _ => None,
    }
}

impl StreamAdapter for ResponsesToMessagesAdapter {
    type Input = ResponseStreamEvent;
    type Output = MessageStreamEvent;

    fn push(&mut self, event: ResponseStreamEvent) -> Vec<MessageStreamEvent> {
        if self.stopped {
            debug!(event_type = event.event_type(), "ignoring event after message_stop");
            return Vec::new();
        }
        match &event {
            ResponseStreamEvent::Created { response, .. }
            | ResponseStreamEvent::InProgress { response, .. } => self.start(Some(response)),
            ResponseStreamEvent::OutputItemAdded { item, .. } => {
                let mut events = self.start(None);
                events.extend(self.open_item(item));
                events
            }
            ResponseStreamEvent::OutputItemDone { item, .. } => {
                let mut events = self.start(None);
                events.extend(self.finish_item(item));
                events
            }
            ResponseStreamEvent::OutputTextDelta { item_id, delta, .. }
            | ResponseStreamEvent::FunctionCallArgumentsDelta { item_id, delta, .. } => {
                self.append(&BlockKey::Item(item_id.clone()), delta)
            }
            ResponseStreamEvent::CodeInterpreterCallCodeDelta { item_id, delta, .. } => {
                let payload = json!({ "code": delta }).to_string();
                self.append(&BlockKey::Item(item_id.clone()), &payload)
            }
            ResponseStreamEvent::ImageGenerationCallPartialImage {
                item_id,
                partial_image_index,
                ..
            } => {
                let payload = json!({ "partial_image_index": partial_image_index }).to_string();
                self.append(&BlockKey::Item(item_id.clone()), &payload)
            }
            ResponseStreamEvent::WebSearchCallInProgress(progress)
            | ResponseStreamEvent::ImageGenerationCallInProgress(progress)
            | ResponseStreamEvent::CodeInterpreterCallInProgress(progress) => {
                self.progress(progress, ItemStatus::InProgress)
            }
            ResponseStreamEvent::WebSearchCallSearching(progress) => {
                self.progress(progress, ItemStatus::Searching)
            }
            ResponseStreamEvent::ImageGenerationCallGenerating(progress) => {
                self.progress(progress, ItemStatus::Generating)
            }
            ResponseStreamEvent::CodeInterpreterCallInterpreting(progress) => {
                self.progress(progress, ItemStatus::Interpreting)
            }
            ResponseStreamEvent::WebSearchCallCompleted(progress)
            | ResponseStreamEvent::ImageGenerationCallCompleted(progress)
            | ResponseStreamEvent::CodeInterpreterCallCompleted(progress) => {
                self.progress(progress, ItemStatus::Completed)
            }
            ResponseStreamEvent::Completed { response, .. }
            | ResponseStreamEvent::Incomplete { response, .. }
            | ResponseStreamEvent::Failed { response, .. } => self.stop(Some(response)),
            ResponseStreamEvent::Error { code, message, .. } => {
                vec![MessageStreamEvent::Error {
                    error: ApiErrorBody {
                        error_type: code.clone().unwrap_or_else(|| "api_error".to_string()),
                        message: message.clone(),
                    },
                }]
            }
            ResponseStreamEvent::OutputTextDone { .. }
            | ResponseStreamEvent::FunctionCallArgumentsDone { .. }
            | ResponseStreamEvent::CodeInterpreterCallCodeDone { .. }
            | ResponseStreamEvent::ContentPartAdded { .. }
            | ResponseStreamEvent::ContentPartDone { .. } => Vec::new(),
            ResponseStreamEvent::ReasoningTextDelta { .. }
            | ResponseStreamEvent::ReasoningTextDone { .. }
            | ResponseStreamEvent::Unknown => {
                debug!(event_type = event.event_type(), "ignoring response event");
                Vec::new()
            }
        }
    }

    fn finish(&mut self) -> Vec<MessageStreamEvent> {
        if !self.started {
            return Vec::new();
        }
        self.stop(None)
    }
}

/// Replays a complete aggregate as a content-block event sequence.
pub fn response_to_message_events(response: &ResponseObject) -> Vec<MessageStreamEvent> {
    let mut skeleton = response.clone();
    skeleton.output.clear();
    let mut inputs = vec![ResponseStreamEvent::Created {
        sequence_number: 0,
        response: skeleton,
    }];
    inputs.extend(
        response
            .output
            .iter()
            .enumerate()
            .map(|(output_index, item)| ResponseStreamEvent::OutputItemDone {
                sequence_number: 0,
                output_index,
                item: item.clone(),
            }),
    );
    inputs.push(ResponseStreamEvent::Completed {
        sequence_number: 0,
        response: response.clone(),
    });
    collect_events(ResponsesToMessagesAdapter::new(), inputs)
}

/// Parses an accumulated tool input; anything unparseable is an empty object.
pub fn tool_input_value(arguments: &str) -> Value {
    match serde_json::from_str::<Value>(arguments) {
        Ok(value) if value.is_object() => value,
        _ => json!({}),
    }
}
