//! Item/event "responses" wire shapes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const INCOMPLETE_MAX_OUTPUT_TOKENS: &str = "max_output_tokens";
pub const INCOMPLETE_CONTENT_FILTER: &str = "content_filter";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    #[default]
    InProgress,
    Completed,
    Incomplete,
    Failed,
    Cancelled,
    Queued,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    #[default]
    InProgress,
    Searching,
    Generating,
    Interpreting,
    Completed,
    Incomplete,
    Failed,
    #[serde(other)]
    Unknown,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Searching => "searching",
            Self::Generating => "generating",
            Self::Interpreting => "interpreting",
            Self::Completed => "completed",
            Self::Incomplete => "incomplete",
            Self::Failed => "failed",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncompleteDetails {
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

/// Aggregate response object; also the payload of lifecycle events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseObject {
    pub id: String,
    #[serde(default = "default_response_object")]
    pub object: String,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub status: ResponseStatus,
    #[serde(default)]
    pub output: Vec<OutputItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<ResponseUsage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incomplete_details: Option<IncompleteDetails>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

fn default_response_object() -> String {
    "response".to_string()
}

impl ResponseObject {
    pub fn new(id: impl Into<String>, model: impl Into<String>, created_at: i64) -> Self {
        Self {
            id: id.into(),
            object: default_response_object(),
            created_at,
            model: model.into(),
            ..Self::default()
        }
    }

    /// Concatenation of every `output_text` part, in item order.
    pub fn collect_output_text(&self) -> String {
        self.output
            .iter()
            .filter_map(|item| match item {
                OutputItem::Message { content, .. } => Some(content),
                _ => None,
            })
            .flatten()
            .filter_map(|part| match part {
                OutputContent::OutputText { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn function_calls(&self) -> impl Iterator<Item = (&str, &str, &str)> {
        self.output.iter().filter_map(|item| match item {
            OutputItem::FunctionCall {
                call_id,
                name,
                arguments,
                ..
            } => Some((call_id.as_str(), name.as_str(), arguments.as_str())),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputItem {
    Message {
        id: String,
        #[serde(default = "default_assistant_role")]
        role: String,
        #[serde(default)]
        status: ItemStatus,
        #[serde(default)]
        content: Vec<OutputContent>,
    },
    FunctionCall {
        id: String,
        call_id: String,
        name: String,
        #[serde(default)]
        arguments: String,
        #[serde(default)]
        status: ItemStatus,
    },
    Reasoning {
        id: String,
        #[serde(default)]
        summary: Vec<ReasoningSummary>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        content: Vec<ReasoningContent>,
        #[serde(default)]
        status: ItemStatus,
    },
    WebSearchCall {
        id: String,
        #[serde(default)]
        status: ItemStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        action: Option<WebSearchAction>,
    },
    ImageGenerationCall {
        id: String,
        #[serde(default)]
        status: ItemStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<String>,
    },
    CodeInterpreterCall {
        id: String,
        #[serde(default)]
        status: ItemStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        container_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        outputs: Option<Vec<Value>>,
    },
    #[serde(other)]
    Unknown,
}

fn default_assistant_role() -> String {
    "assistant".to_string()
}

impl OutputItem {
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Message { id, .. }
            | Self::FunctionCall { id, .. }
            | Self::Reasoning { id, .. }
            | Self::WebSearchCall { id, .. }
            | Self::ImageGenerationCall { id, .. }
            | Self::CodeInterpreterCall { id, .. } => Some(id.as_str()),
            Self::Unknown => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Message { .. } => "message",
            Self::FunctionCall { .. } => "function_call",
            Self::Reasoning { .. } => "reasoning",
            Self::WebSearchCall { .. } => "web_search_call",
            Self::ImageGenerationCall { .. } => "image_generation_call",
            Self::CodeInterpreterCall { .. } => "code_interpreter_call",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebSearchAction {
    #[serde(rename = "type", default)]
    pub action_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputContent {
    OutputText {
        text: String,
        #[serde(default)]
        annotations: Vec<Value>,
    },
    Refusal {
        refusal: String,
    },
    #[serde(other)]
    Unknown,
}

impl OutputContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self::OutputText {
            text: text.into(),
            annotations: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReasoningContent {
    ReasoningText { text: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReasoningSummary {
    SummaryText { text: String },
}

/// Progress marker shared by the built-in tool status events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemProgress {
    #[serde(default)]
    pub sequence_number: u64,
    pub item_id: String,
    #[serde(default)]
    pub output_index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ResponseStreamEvent {
    #[serde(rename = "response.created")]
    Created {
        #[serde(default)]
        sequence_number: u64,
        response: ResponseObject,
    },
    #[serde(rename = "response.in_progress")]
    InProgress {
        #[serde(default)]
        sequence_number: u64,
        response: ResponseObject,
    },
    #[serde(rename = "response.output_item.added")]
    OutputItemAdded {
        #[serde(default)]
        sequence_number: u64,
        output_index: usize,
        item: OutputItem,
    },
    #[serde(rename = "response.output_item.done")]
    OutputItemDone {
        #[serde(default)]
        sequence_number: u64,
        output_index: usize,
        item: OutputItem,
    },
    #[serde(rename = "response.content_part.added")]
    ContentPartAdded {
        #[serde(default)]
        sequence_number: u64,
        item_id: String,
        output_index: usize,
        #[serde(default)]
        content_index: usize,
        part: OutputContent,
    },
    #[serde(rename = "response.content_part.done")]
    ContentPartDone {
        #[serde(default)]
        sequence_number: u64,
        item_id: String,
        output_index: usize,
        #[serde(default)]
        content_index: usize,
        part: OutputContent,
    },
    #[serde(rename = "response.output_text.delta")]
    OutputTextDelta {
        #[serde(default)]
        sequence_number: u64,
        item_id: String,
        output_index: usize,
        #[serde(default)]
        content_index: usize,
        delta: String,
    },
    #[serde(rename = "response.output_text.done")]
    OutputTextDone {
        #[serde(default)]
        sequence_number: u64,
        item_id: String,
        output_index: usize,
        #[serde(default)]
        content_index: usize,
        text: String,
    },
    #[serde(rename = "response.function_call_arguments.delta")]
    FunctionCallArgumentsDelta {
        #[serde(default)]
        sequence_number: u64,
        item_id: String,
        output_index: usize,
        delta: String,
    },
    #[serde(rename = "response.function_call_arguments.done")]
    FunctionCallArgumentsDone {
        #[serde(default)]
        sequence_number: u64,
        item_id: String,
        output_index: usize,
        arguments: String,
    },
    #[serde(rename = "response.reasoning_text.delta")]
    ReasoningTextDelta {
        #[serde(default)]
        sequence_number: u64,
        item_id: String,
        output_index: usize,
        #[serde(default)]
        content_index: usize,
        delta: String,
    },
    #[serde(rename = "response.reasoning_text.done")]
    ReasoningTextDone {
        #[serde(default)]
        sequence_number: u64,
        item_id: String,
        output_index: usize,
        #[serde(default)]
        content_index: usize,
        text: String,
    },
    #[serde(rename = "response.web_search_call.in_progress")]
    WebSearchCallInProgress(ItemProgress),
    #[serde(rename = "response.web_search_call.searching")]
    WebSearchCallSearching(ItemProgress),
    #[serde(rename = "response.web_search_call.completed")]
    WebSearchCallCompleted(ItemProgress),
    #[serde(rename = "response.image_generation_call.in_progress")]
    ImageGenerationCallInProgress(ItemProgress),
    #[serde(rename = "response.image_generation_call.generating")]
    ImageGenerationCallGenerating(ItemProgress),
    #[serde(rename = "response.image_generation_call.partial_image")]
    ImageGenerationCallPartialImage {
        #[serde(default)]
        sequence_number: u64,
        item_id: String,
        output_index: usize,
        #[serde(default)]
        partial_image_index: u32,
        #[serde(default)]
        partial_image_b64: String,
    },
    #[serde(rename = "response.image_generation_call.completed")]
    ImageGenerationCallCompleted(ItemProgress),
    #[serde(rename = "response.code_interpreter_call.in_progress")]
    CodeInterpreterCallInProgress(ItemProgress),
    #[serde(rename = "response.code_interpreter_call.interpreting")]
    CodeInterpreterCallInterpreting(ItemProgress),
    #[serde(rename = "response.code_interpreter_call.completed")]
    CodeInterpreterCallCompleted(ItemProgress),
    #[serde(rename = "response.code_interpreter_call_code.delta")]
    CodeInterpreterCallCodeDelta {
        #[serde(default)]
        sequence_number: u64,
        item_id: String,
        output_index: usize,
        delta: String,
    },
    #[serde(rename = "response.code_interpreter_call_code.done")]
    CodeInterpreterCallCodeDone {
        #[serde(default)]
        sequence_number: u64,
        item_id: String,
        output_index: usize,
        code: String,
    },
    #[serde(rename = "response.completed")]
    Completed {
        #[serde(default)]
        sequence_number: u64,
        response: ResponseObject,
    },
    #[serde(rename = "response.incomplete")]
    Incomplete {
        #[serde(default)]
        sequence_number: u64,
        response: ResponseObject,
    },
    #[serde(rename = "response.failed")]
    Failed {
        #[serde(default)]
        sequence_number: u64,
        response: ResponseObject,
    },
    #[serde(rename = "error")]
    Error {
        #[serde(default)]
        sequence_number: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
        message: String,
    },
    #[serde(other)]
    Unknown,
}

impl ResponseStreamEvent {
    /// The wire `type` tag, also used as the SSE `event:` name.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Created { .. } => "response.created",
            Self::InProgress { .. } => "response.in_progress",
            Self::OutputItemAdded { .. } => "response.output_item.added",
            Self::OutputItemDone { .. } => "response.output_item.done",
            Self::ContentPartAdded { .. } => "response.content_part.added",
            Self::ContentPartDone { .. } => "response.content_part.done",
            Self::OutputTextDelta { .. } => "response.output_text.delta",
            Self::OutputTextDone { .. } => "response.output_text.done",
            Self::FunctionCallArgumentsDelta { .. } => "response.function_call_arguments.delta",
            Self::FunctionCallArgumentsDone { .. } => "response.function_call_arguments.done",
            Self::ReasoningTextDelta { .. } => "response.reasoning_text.delta",
            Self::ReasoningTextDone { .. } => "response.reasoning_text.done",
            Self::WebSearchCallInProgress(_) => "response.web_search_call.in_progress",
            Self::WebSearchCallSearching(_) => "response.web_search_call.searching",
            Self::WebSearchCallCompleted(_) => "response.web_search_call.completed",
            Self::ImageGenerationCallInProgress(_) => "response.image_generation_call.in_progress",
            Self::ImageGenerationCallGenerating(_) => "response.image_generation_call.generating",
            Self::ImageGenerationCallPartialImage { .. } => {
                "response.image_generation_call.partial_image"
            }
            Self::ImageGenerationCallCompleted(_) => "response.image_generation_call.completed",
            Self::CodeInterpreterCallInProgress(_) => "response.code_interpreter_call.in_progress",
            Self::CodeInterpreterCallInterpreting(_) => {
                "response.code_interpreter_call.interpreting"
            }
            Self::CodeInterpreterCallCompleted(_) => "response.code_interpreter_call.completed",
            Self::CodeInterpreterCallCodeDelta { .. } => {
                "response.code_interpreter_call_code.delta"
            }
            Self::CodeInterpreterCallCodeDone { .. } => "response.code_interpreter_call_code.done",
            Self::Completed { .. } => "response.completed",
            Self::Incomplete { .. } => "response.incomplete",
            Self::Failed { .. } => "response.failed",
            Self::Error { .. } => "error",
            Self::Unknown => "unknown",
        }
    }

    pub fn sequence_number(&self) -> Option<u64> {
        match self {
            Self::Created { sequence_number, .. }
            | Self::InProgress { sequence_number, .. }
            | Self::OutputItemAdded { sequence_number, .. }
            | Self::OutputItemDone { sequence_number, .. }
            | Self::ContentPartAdded { sequence_number, .. }
            | Self::ContentPartDone { sequence_number, .. }
            | Self::OutputTextDelta { sequence_number, .. }
            | Self::OutputTextDone { sequence_number, .. }
            | Self::FunctionCallArgumentsDelta { sequence_number, .. }
            | Self::FunctionCallArgumentsDone { sequence_number, .. }
            | Self::ReasoningTextDelta { sequence_number, .. }
            | Self::ReasoningTextDone { sequence_number, .. }
            | Self::ImageGenerationCallPartialImage { sequence_number, .. }
            | Self::CodeInterpreterCallCodeDelta { sequence_number, .. }
            | Self::CodeInterpreterCallCodeDone { sequence_number, .. }
            | Self::Completed { sequence_number, .. }
            | Self::Incomplete { sequence_number, .. }
            | Self::Failed { sequence_number, .. }
            | Self::Error { sequence_number, .. } => Some(*sequence_number),
            Self::WebSearchCallInProgress(progress)
            | Self::WebSearchCallSearching(progress)
            | Self::WebSearchCallCompleted(progress)
            | Self::ImageGenerationCallInProgress(progress)
            | Self::ImageGenerationCallGenerating(progress)
            | Self::ImageGenerationCallCompleted(progress)
            | Self::CodeInterpreterCallInProgress(progress)
            | Self::CodeInterpreterCallInterpreting(progress)
            | Self::CodeInterpreterCallCompleted(progress) => Some(progress.sequence_number),
            Self::Unknown => None,
        }
    }

    /// Terminal lifecycle events carrying the final aggregate.
    pub fn terminal_response(&self) -> Option<&ResponseObject> {
        match self {
            Self::Completed { response, .. }
            | Self::Incomplete { response, .. }
            | Self::Failed { response, .. } => Some(response),
            _ => None,
        }
    }
}

/// Item-protocol request input, the target of request-side conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseInputItem {
    Message {
        role: String,
        content: Vec<InputContentPart>,
    },
    FunctionCall {
        call_id: String,
        name: String,
        arguments: String,
    },
    FunctionCallOutput {
        call_id: String,
        output: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputContentPart {
    InputText {
        text: String,
    },
    OutputText {
        text: String,
    },
    InputImage {
        image_url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionTool {
    #[serde(rename = "type", default = "default_function_type")]
    pub tool_type: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub parameters: Value,
}

fn default_function_type() -> String {
    "function".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponsesRequestBody {
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    pub input: Vec<ResponseInputItem>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<FunctionTool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(default)]
    pub stream: bool,
}
