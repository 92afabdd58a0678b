//! Turns block-ledger transitions into item-protocol stream events.
//!
//! Shared by every adapter whose downstream is the item/event protocol. The
//! emitter owns the [`ConversionState`] and stamps each outgoing event with
//! the next sequence number.

use crate::ids::{translate_id, IdPrefix};
use crate::protocol::responses::{
    IncompleteDetails, ItemStatus, OutputContent, OutputItem, ReasoningContent, ResponseObject,
    ResponseStatus, ResponseStreamEvent, ResponseUsage,
};
use crate::state::{BlockEvent, BlockKey, BlockKind, ContentBlockState, ConversionState, TokenUsage};

/// How a response ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseOutcome {
    Completed,
    Incomplete { reason: String },
}

impl ResponseOutcome {
    pub fn incomplete(reason: impl Into<String>) -> Self {
        Self::Incomplete {
            reason: reason.into(),
        }
    }
}

/// Arguments as sent downstream; an empty accumulator means "no arguments".
pub fn normalize_arguments(arguments: &str) -> String {
    if arguments.trim().is_empty() {
        "{}".to_string()
    } else {
        arguments.to_string()
    }
}

/// Item id of a function-call block; the block itself carries the call id.
pub fn function_item_id(call_id: &str) -> String {
    translate_id(call_id, IdPrefix::FunctionCall)
}

#[derive(Debug)]
pub struct ResponsesEmitter {
    state: ConversionState,
    response_id: String,
    model: String,
    created_at: i64,
    created: bool,
    finished: bool,
}

impl ResponsesEmitter {
    pub fn new(response_id: impl Into<String>, model: impl Into<String>, created_at: i64) -> Self {
        Self {
            state: ConversionState::new(),
            response_id: response_id.into(),
            model: model.into(),
            created_at,
            created: false,
            finished: false,
        }
    }

    pub fn state(&self) -> &ConversionState {
        &self.state
    }

    pub fn response_id(&self) -> &str {
        &self.response_id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn is_open(&self, key: &BlockKey) -> bool {
        self.state.is_open(key)
    }

    pub fn record_usage(&mut self, usage: TokenUsage) -> bool {
        self.state.record_usage(usage)
    }

    /// `response.created` with an empty in-progress aggregate. Emitted once.
    pub fn created(&mut self) -> Vec<ResponseStreamEvent> {
        if self.created {
            return Vec::new();
        }
        self.created = true;
        let response = self.response_skeleton(ResponseStatus::InProgress);
        vec![ResponseStreamEvent::Created {
            sequence_number: self.state.next_sequence_number(),
            response,
        }]
    }

    pub fn open_message(
        &mut self,
        key: BlockKey,
        item_id: impl Into<String>,
    ) -> Vec<ResponseStreamEvent> {
        let transition = self.state.open(key, BlockKind::Text, item_id, None);
        self.translate(transition)
    }

    pub fn open_function_call(
        &mut self,
        key: BlockKey,
        call_id: impl Into<String>,
        name: impl Into<String>,
    ) -> Vec<ResponseStreamEvent> {
        let transition = self
            .state
            .open(key, BlockKind::ToolUse, call_id, Some(name.into()));
        self.translate(transition)
    }

    pub fn open_reasoning(
        &mut self,
        key: BlockKey,
        item_id: impl Into<String>,
    ) -> Vec<ResponseStreamEvent> {
        let transition = self.state.open(key, BlockKind::Reasoning, item_id, None);
        self.translate(transition)
    }

    pub fn append(&mut self, key: &BlockKey, fragment: &str) -> Vec<ResponseStreamEvent> {
        let transition = self.state.append(key, fragment);
        self.translate(transition)
    }

    pub fn close(&mut self, key: &BlockKey) -> Vec<ResponseStreamEvent> {
        let transition = self.state.complete(key);
        self.translate(transition)
    }

    pub fn close_all(&mut self) -> Vec<ResponseStreamEvent> {
        self.state
            .complete_all()
            .into_iter()
            .flat_map(|transition| self.translate(Some(transition)))
            .collect()
    }

    /// Closes whatever is still open, then emits the terminal
    /// `response.completed` carrying the full aggregate. Emitted once.
    pub fn complete(&mut self, outcome: ResponseOutcome) -> Vec<ResponseStreamEvent> {
        if self.finished {
            return Vec::new();
        }
        let mut events = self.created();
        events.extend(self.close_all());
        self.finished = true;
        let response = self.aggregate(&outcome);
        events.push(ResponseStreamEvent::Completed {
            sequence_number: self.state.next_sequence_number(),
            response,
        });
        events
    }

    pub fn error(
        &mut self,
        code: Option<String>,
        message: impl Into<String>,
    ) -> ResponseStreamEvent {
        ResponseStreamEvent::Error {
            sequence_number: self.state.next_sequence_number(),
            code,
            message: message.into(),
        }
    }

    /// The aggregate as it stands, with every block reported as completed.
    pub fn aggregate(&self, outcome: &ResponseOutcome) -> ResponseObject {
        let (status, incomplete_details) = match outcome {
            ResponseOutcome::Completed => (ResponseStatus::Completed, None),
            ResponseOutcome::Incomplete { reason } => (
                ResponseStatus::Incomplete,
                Some(IncompleteDetails {
                    reason: reason.clone(),
                }),
            ),
        };
        let mut response = self.response_skeleton(status);
        response.output = self
            .state
            .blocks()
            .iter()
            .map(|block| snapshot(block, true))
            .collect();
        response.output_text = Some(self.state.output_text());
        response.usage = self.state.usage().map(|usage| ResponseUsage {
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            total_tokens: usage.total_tokens,
        });
        response.incomplete_details = incomplete_details;
        response
    }

    fn response_skeleton(&self, status: ResponseStatus) -> ResponseObject {
        let mut response = ResponseObject::new(&self.response_id, &self.model, self.created_at);
        response.status = status;
        response
    }

    fn translate(&mut self, transition: Option<BlockEvent>) -> Vec<ResponseStreamEvent> {
        let Some(transition) = transition else {
            return Vec::new();
        };
        let Some(block) = self.state.block(transition.index()).cloned() else {
            return Vec::new();
        };
        match transition {
            BlockEvent::Added { index } => vec![ResponseStreamEvent::OutputItemAdded {
                sequence_number: self.state.next_sequence_number(),
                output_index: index,
                item: snapshot(&block, false),
            }],
            BlockEvent::Delta { index, fragment } => {
                let sequence_number = self.state.next_sequence_number();
                let event = match block.kind {
                    BlockKind::Text => ResponseStreamEvent::OutputTextDelta {
                        sequence_number,
                        item_id: block.id,
                        output_index: index,
                        content_index: 0,
                        delta: fragment,
                    },
                    BlockKind::ToolUse => ResponseStreamEvent::FunctionCallArgumentsDelta {
                        sequence_number,
                        item_id: function_item_id(&block.id),
                        output_index: index,
                        delta: fragment,
                    },
                    BlockKind::Reasoning => ResponseStreamEvent::ReasoningTextDelta {
                        sequence_number,
                        item_id: block.id,
                        output_index: index,
                        content_index: 0,
                        delta: fragment,
                    },
                };
                vec![event]
            }
            BlockEvent::Done { index } => {
                let sequence_number = self.state.next_sequence_number();
                let content_done = match block.kind {
                    BlockKind::Text => ResponseStreamEvent::OutputTextDone {
                        sequence_number,
                        item_id: block.id.clone(),
                        output_index: index,
                        content_index: 0,
                        text: block.content.clone(),
                    },
                    BlockKind::ToolUse => ResponseStreamEvent::FunctionCallArgumentsDone {
                        sequence_number,
                        item_id: function_item_id(&block.id),
                        output_index: index,
                        arguments: normalize_arguments(&block.content),
                    },
                    BlockKind::Reasoning => ResponseStreamEvent::ReasoningTextDone {
                        sequence_number,
                        item_id: block.id.clone(),
                        output_index: index,
                        content_index: 0,
                        text: block.content.clone(),
                    },
                };
                let item_done = ResponseStreamEvent::OutputItemDone {
                    sequence_number: self.state.next_sequence_number(),
                    output_index: index,
                    item: snapshot(&block, true),
                };
                vec![content_done, item_done]
            }
        }
    }
}

fn snapshot(block: &ContentBlockState, done: bool) -> OutputItem {
    let status = if done {
        ItemStatus::Completed
    } else {
        ItemStatus::InProgress
    };
    match block.kind {
        BlockKind::Text => OutputItem::Message {
            id: block.id.clone(),
            role: "assistant".to_string(),
            status,
            content: if done {
                vec![OutputContent::text(block.content.clone())]
            } else {
                Vec::new()
            },
        },
        BlockKind::ToolUse => OutputItem::FunctionCall {
            id: function_item_id(&block.id),
            call_id: block.id.clone(),
            name: block.name.clone().unwrap_or_default(),
            arguments: if done {
                normalize_arguments(&block.content)
            } else {
                String::new()
            },
            status,
        },
        BlockKind::Reasoning => OutputItem::Reasoning {
            id: block.id.clone(),
            summary: Vec::new(),
            content: if done {
                vec![ReasoningContent::ReasoningText {
                    text: block.content.clone(),
                }]
            } else {
                Vec::new()
            },
            status,
        },
    }
}
