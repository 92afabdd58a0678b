//! Rebuilds final aggregates from captured event sequences.
//!
//! Content comes only from added/delta/done events. Lifecycle events
//! contribute metadata (id, model, status, usage), never output.

use std::collections::BTreeMap;

use crate::adapters::tool_input_value;
use crate::protocol::messages::{
    ContentBlock, ContentBlockDelta, MessageStreamEvent, MessagesResponse,
};
use crate::protocol::responses::{
    OutputContent, OutputItem, ReasoningContent, ResponseObject, ResponseStreamEvent,
};

#[derive(Debug, Default)]
pub struct ResponseReplay {
    metadata: Option<ResponseObject>,
    items: BTreeMap<usize, OutputItem>,
}

fn emptied(item: &OutputItem) -> OutputItem {
    let mut item = item.clone();
    match &mut item {
        OutputItem::Message { content, .. } => content.clear(),
        OutputItem::FunctionCall { arguments, .. } => arguments.clear(),
        OutputItem::Reasoning { content, .. } => content.clear(),
        OutputItem::CodeInterpreterCall { code, .. } => *code = None,
        _ => {}
    }
    item
}

fn write_text(content: &mut Vec<OutputContent>, fragment: &str, replace: bool) {
    if let Some(OutputContent::OutputText { text, .. }) = content.last_mut() {
        if replace {
            text.clear();
        }
        text.push_str(fragment);
    } else {
        content.push(OutputContent::text(fragment));
    }
}

fn write_reasoning(content: &mut Vec<ReasoningContent>, fragment: &str, replace: bool) {
    if let Some(ReasoningContent::ReasoningText { text }) = content.last_mut() {
        if replace {
            text.clear();
        }
        text.push_str(fragment);
    } else {
        content.push(ReasoningContent::ReasoningText {
            text: fragment.to_string(),
        });
    }
}

impl ResponseReplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, event: &ResponseStreamEvent) {
        match event {
            ResponseStreamEvent::Created { response, .. }
            | ResponseStreamEvent::InProgress { response, .. } => {
                let mut metadata = response.clone();
                metadata.output.clear();
                metadata.output_text = None;
                self.metadata = Some(metadata);
            }
            ResponseStreamEvent::OutputItemAdded {
                output_index, item, ..
            } => {
                self.items.insert(*output_index, emptied(item));
            }
            ResponseStreamEvent::OutputTextDelta {
                output_index, delta, ..
            } => {
                if let Some(OutputItem::Message { content, .. }) =
                    self.items.get_mut(output_index)
                {
                    write_text(content, delta, false);
                }
            }
            ResponseStreamEvent::OutputTextDone {
                output_index, text, ..
            } => {
                if let Some(OutputItem::Message { content, .. }) =
                    self.items.get_mut(output_index)
                {
                    write_text(content, text, true);
                }
            }
            ResponseStreamEvent::FunctionCallArgumentsDelta {
                output_index, delta, ..
            } => {
                if let Some(OutputItem::FunctionCall { arguments, .. }) =
                    self.items.get_mut(output_index)
                {
                    arguments.push_str(delta);
                }
            }
            ResponseStreamEvent::FunctionCallArgumentsDone {
                output_index,
                arguments: done,
                ..
            } => {
                if let Some(OutputItem::FunctionCall { arguments, .. }) =
                    self.items.get_mut(output_index)
                {
                    *arguments = done.clone();
                }
            }
            ResponseStreamEvent::ReasoningTextDelta {
                output_index, delta, ..
            } => {
                if let Some(OutputItem::Reasoning { content, .. }) =
                    self.items.get_mut(output_index)
                {
                    write_reasoning(content, delta, false);
                }
            }
            ResponseStreamEvent::ReasoningTextDone {
                output_index, text, ..
            } => {
                if let Some(OutputItem::Reasoning { content, .. }) =
                    self.items.get_mut(output_index)
                {
                    write_reasoning(content, text, true);
                }
            }
            ResponseStreamEvent::CodeInterpreterCallCodeDelta {
                output_index, delta, ..
            } => {
                if let Some(OutputItem::CodeInterpreterCall { code, .. }) =
                    self.items.get_mut(output_index)
                {
                    code.get_or_insert_with(String::new).push_str(delta);
                }
            }
            ResponseStreamEvent::OutputItemDone {
                output_index, item, ..
            } => self.finish_item(*output_index, item),
            ResponseStreamEvent::Completed { response, .. }
            | ResponseStreamEvent::Incomplete { response, .. }
            | ResponseStreamEvent::Failed { response, .. } => {
                let metadata = self.metadata.get_or_insert_with(|| {
                    let mut skeleton = response.clone();
                    skeleton.output.clear();
                    skeleton
                });
                metadata.status = response.status;
                metadata.usage = response.usage.clone();
                metadata.incomplete_details = response.incomplete_details.clone();
                metadata.error = response.error.clone();
            }
            _ => {}
        }
    }

    /// Rebuilt content items keep their accumulated content and take the
    /// final status; content-less items are taken as reported.
    fn finish_item(&mut self, output_index: usize, done: &OutputItem) {
        let Some(current) = self.items.get_mut(&output_index) else {
            self.items.insert(output_index, done.clone());
            return;
        };
        match (current, done) {
            (OutputItem::Message { status, .. }, OutputItem::Message { status: final_status, .. })
            | (
                OutputItem::FunctionCall { status, .. },
                OutputItem::FunctionCall { status: final_status, .. },
            )
            | (
                OutputItem::Reasoning { status, .. },
                OutputItem::Reasoning { status: final_status, .. },
            ) => *status = *final_status,
            (current, done) => *current = done.clone(),
        }
    }

    pub fn finish(self) -> ResponseObject {
        let mut response = self.metadata.unwrap_or_default();
        response.output = self.items.into_values().collect();
        response.output_text = Some(response.collect_output_text());
        response
    }
}

pub fn replay_response_events<'a, I>(events: I) -> ResponseObject
where
    I: IntoIterator<Item = &'a ResponseStreamEvent>,
{
    let mut replay = ResponseReplay::new();
    for event in events {
        replay.apply(event);
    }
    replay.finish()
}

#[derive(Debug, Default)]
pub struct MessageReplay {
    metadata: Option<MessagesResponse>,
    blocks: BTreeMap<u32, (ContentBlock, String)>,
}

impl MessageReplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, event: &MessageStreamEvent) {
        match event {
            MessageStreamEvent::MessageStart { message } => {
                let mut metadata = message.clone();
                metadata.content.clear();
                self.metadata = Some(metadata);
            }
            MessageStreamEvent::ContentBlockStart {
                index,
                content_block,
            } => {
                self.blocks
                    .insert(*index, (content_block.clone(), String::new()));
            }
            MessageStreamEvent::ContentBlockDelta { index, delta } => {
                let Some((block, partial_json)) = self.blocks.get_mut(index) else {
                    return;
                };
                match (block, delta) {
                    (ContentBlock::Text { text }, ContentBlockDelta::TextDelta { text: delta }) => {
                        text.push_str(delta);
                    }
                    (
                        ContentBlock::Thinking { thinking, .. },
                        ContentBlockDelta::ThinkingDelta { thinking: delta },
                    ) => thinking.push_str(delta),
                    (
                        ContentBlock::Thinking { signature, .. },
                        ContentBlockDelta::SignatureDelta { signature: delta },
                    ) => signature.push_str(delta),
                    (
                        ContentBlock::ToolUse { .. } | ContentBlock::ServerToolUse { .. },
                        ContentBlockDelta::InputJsonDelta { partial_json: delta },
                    ) => partial_json.push_str(delta),
                    _ => {}
                }
            }
            MessageStreamEvent::ContentBlockStop { index } => {
                if let Some((
                    ContentBlock::ToolUse { input, .. } | ContentBlock::ServerToolUse { input, .. },
                    partial_json,
                )) = self.blocks.get_mut(index)
                {
                    if !partial_json.is_empty() {
                        *input = tool_input_value(partial_json);
                    }
                }
            }
            MessageStreamEvent::MessageDelta { delta, usage } => {
                let metadata = self.metadata.get_or_insert_with(MessagesResponse::default);
                if delta.stop_reason.is_some() {
                    metadata.stop_reason = delta.stop_reason;
                }
                metadata.stop_sequence = delta.stop_sequence.clone();
                metadata.usage.output_tokens = usage.output_tokens;
                if let Some(input_tokens) = usage.input_tokens {
                    metadata.usage.input_tokens = input_tokens;
                }
            }
            _ => {}
        }
    }

    pub fn finish(self) -> MessagesResponse {
        let mut message = self.metadata.unwrap_or_default();
        message.content = self.blocks.into_values().map(|(block, _)| block).collect();
        message
    }
}

pub fn replay_message_events<'a, I>(events: I) -> MessagesResponse
where
    I: IntoIterator<Item = &'a MessageStreamEvent>,
{
    let mut replay = MessageReplay::new();
    for event in events {
        replay.apply(event);
    }
    replay.finish()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::protocol::messages::{MessageDelta, MessageDeltaUsage, StopReason};
    use crate::protocol::responses::{ItemStatus, ResponseStatus};

    #[test]
    fn response_replay_ignores_lifecycle_output() {
        let mut created = ResponseObject::new("resp_1", "gpt", 0);
        created.output = vec![OutputItem::Unknown];
        let mut completed = ResponseObject::new("resp_1", "gpt", 0);
        completed.status = ResponseStatus::Completed;
        completed.output = vec![OutputItem::Unknown, OutputItem::Unknown];

        let events = vec![
            ResponseStreamEvent::Created {
                sequence_number: 0,
                response: created,
            },
            ResponseStreamEvent::OutputItemAdded {
                sequence_number: 1,
                output_index: 0,
                item: OutputItem::Message {
                    id: "msg_1".to_string(),
                    role: "assistant".to_string(),
                    status: ItemStatus::InProgress,
                    content: Vec::new(),
                },
            },
            ResponseStreamEvent::OutputTextDelta {
                sequence_number: 2,
                item_id: "msg_1".to_string(),
                output_index: 0,
                content_index: 0,
                delta: "Hel".to_string(),
            },
            ResponseStreamEvent::OutputTextDelta {
                sequence_number: 3,
                item_id: "msg_1".to_string(),
                output_index: 0,
                content_index: 0,
                delta: "lo".to_string(),
            },
            ResponseStreamEvent::Completed {
                sequence_number: 4,
                response: completed,
            },
        ];
        let replayed = replay_response_events(&events);
        assert_eq!(replayed.output.len(), 1);
        assert_eq!(replayed.output_text.as_deref(), Some("Hello"));
        assert_eq!(replayed.status, ResponseStatus::Completed);
    }

    #[test]
    fn message_replay_parses_accumulated_tool_input() {
        let events = vec![
            MessageStreamEvent::MessageStart {
                message: MessagesResponse::new("msg_1", "claude"),
            },
            MessageStreamEvent::ContentBlockStart {
                index: 0,
                content_block: ContentBlock::ToolUse {
                    id: "toolu_1".to_string(),
                    name: "lookup".to_string(),
                    input: json!({}),
                },
            },
            MessageStreamEvent::ContentBlockDelta {
                index: 0,
                delta: ContentBlockDelta::InputJsonDelta {
                    partial_json: "{\"q\":".to_string(),
                },
            },
            MessageStreamEvent::ContentBlockDelta {
                index: 0,
                delta: ContentBlockDelta::InputJsonDelta {
                    partial_json: "\"x\"}".to_string(),
                },
            },
            MessageStreamEvent::ContentBlockStop { index: 0 },
            MessageStreamEvent::MessageDelta {
                delta: MessageDelta {
                    stop_reason: Some(StopReason::ToolUse),
                    stop_sequence: None,
                },
                usage: MessageDeltaUsage {
                    output_tokens: 3,
                    input_tokens: Some(2),
                },
            },
            MessageStreamEvent::MessageStop,
        ];
        let message = replay_message_events(&events);
        assert_eq!(
            message.content,
            vec![ContentBlock::ToolUse {
                id: "toolu_1".to_string(),
                name: "lookup".to_string(),
                input: json!({ "q": "x" }),
            }]
        );
        assert_eq!(message.stop_reason, Some(StopReason::ToolUse));
        assert_eq!((message.usage.input_tokens, message.usage.output_tokens), (2, 3));
    }
}
