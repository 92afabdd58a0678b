//! One-shot conversions between complete response objects.

use serde_json::{Map, Value};

use super::usage::{usage_from_chat, usage_from_messages, usage_from_response};
use crate::adapters::{
    emit_harmony_messages, outcome_for_finish_reason, outcome_for_stop_reason, stop_reason_for,
    tool_input_value, CODE_INTERPRETER_TOOL, IMAGE_GENERATION_TOOL, WEB_SEARCH_TOOL,
};
use crate::emitter::{function_item_id, normalize_arguments, ResponseOutcome, ResponsesEmitter};
use crate::harmony::parse_harmony_messages;
use crate::ids::{generate_id, now_unix_seconds, to_call_id, to_tool_use_id, translate_id, IdPrefix};
use crate::protocol::chat::ChatCompletion;
use crate::protocol::messages::{ContentBlock, MessagesResponse, MessagesUsage};
use crate::protocol::responses::{
    IncompleteDetails, ItemStatus, OutputContent, OutputItem, ReasoningContent, ResponseObject,
    ResponseStatus, ResponseUsage,
};

fn apply_outcome(response: &mut ResponseObject, outcome: ResponseOutcome) {
    match outcome {
        ResponseOutcome::Completed => {
            response.status = ResponseStatus::Completed;
        }
        ResponseOutcome::Incomplete { reason } => {
            response.status = ResponseStatus::Incomplete;
            response.incomplete_details = Some(IncompleteDetails { reason });
        }
    }
}

fn message_item(text: impl Into<String>) -> OutputItem {
    OutputItem::Message {
        id: generate_id(IdPrefix::Message),
        role: "assistant".to_string(),
        status: ItemStatus::Completed,
        content: vec![OutputContent::text(text)],
    }
}

fn reasoning_item(text: impl Into<String>) -> OutputItem {
    OutputItem::Reasoning {
        id: generate_id(IdPrefix::Reasoning),
        summary: Vec::new(),
        content: vec![ReasoningContent::ReasoningText { text: text.into() }],
        status: ItemStatus::Completed,
    }
}

fn function_call_item(call_id: String, name: impl Into<String>, arguments: &str) -> OutputItem {
    OutputItem::FunctionCall {
        id: function_item_id(&call_id),
        call_id,
        name: name.into(),
        arguments: normalize_arguments(arguments),
        status: ItemStatus::Completed,
    }
}

/// Chat completion → item-protocol aggregate. Item order matches the
/// streaming adapter: reasoning, then text, then tool calls.
pub fn chat_completion_to_response(
    completion: &ChatCompletion,
    model: Option<&str>,
) -> ResponseObject {
    let response_id = if completion.id.is_empty() {
        generate_id(IdPrefix::Response)
    } else {
        translate_id(&completion.id, IdPrefix::Response)
    };
    let mut response = ResponseObject::new(
        response_id,
        model.unwrap_or(&completion.model),
        completion.created,
    );

    let choice = completion.choices.iter().find(|choice| choice.index == 0);
    if let Some(choice) = choice {
        let message = &choice.message;
        if let Some(reasoning) = message
            .reasoning_content
            .as_deref()
            .filter(|text| !text.is_empty())
        {
            response.output.push(reasoning_item(reasoning));
        }
        if let Some(text) = message.content.as_deref().filter(|text| !text.is_empty()) {
            response.output.push(message_item(text));
        }
        for call in message.tool_calls.iter().flatten() {
            response.output.push(function_call_item(
                call.id.clone(),
                call.function.name.clone(),
                &call.function.arguments,
            ));
        }
    }

    apply_outcome(
        &mut response,
        outcome_for_finish_reason(choice.and_then(|choice| choice.finish_reason)),
    );
    response.output_text = Some(response.collect_output_text());
    response.usage = completion
        .usage
        .as_ref()
        .map(|usage| ResponseUsage::from(usage_from_chat(usage)));
    response
}

fn builtin_tool_input(status: ItemStatus, extra: Option<(&str, &str)>) -> Value {
    let mut input = Map::new();
    input.insert("status".to_string(), Value::String(status.as_str().to_string()));
    if let Some((key, value)) = extra {
        input.insert(key.to_string(), Value::String(value.to_string()));
    }
    Value::Object(input)
}

/// Item-protocol aggregate → content-block message. Reasoning items have no
/// counterpart and are dropped; built-in tool calls become tool-use blocks.
pub fn response_to_messages(response: &ResponseObject) -> MessagesResponse {
    let mut message = MessagesResponse::new(
        translate_id(&response.id, IdPrefix::Message),
        response.model.clone(),
    );
    for item in &response.output {
        let block = match item {
            OutputItem::Message { content, .. } => ContentBlock::Text {
                text: content
                    .iter()
                    .filter_map(|part| match part {
                        OutputContent::OutputText { text, .. } => Some(text.as_str()),
                        _ => None,
                    })
                    .collect(),
            },
            OutputItem::FunctionCall {
                call_id,
                name,
                arguments,
                ..
            } => ContentBlock::ToolUse {
                id: to_tool_use_id(call_id),
                name: name.clone(),
                input: tool_input_value(arguments),
            },
            OutputItem::WebSearchCall { id, status, action } => ContentBlock::ToolUse {
                id: to_tool_use_id(id),
                name: WEB_SEARCH_TOOL.to_string(),
                input: builtin_tool_input(
                    *status,
                    action
                        .as_ref()
                        .and_then(|action| action.query.as_deref())
                        .map(|query| ("query", query)),
                ),
            },
            OutputItem::ImageGenerationCall { id, status, .. } => ContentBlock::ToolUse {
                id: to_tool_use_id(id),
                name: IMAGE_GENERATION_TOOL.to_string(),
                input: builtin_tool_input(*status, None),
            },
            OutputItem::CodeInterpreterCall { id, status, code, .. } => ContentBlock::ToolUse {
                id: to_tool_use_id(id),
                name: CODE_INTERPRETER_TOOL.to_string(),
                input: builtin_tool_input(*status, code.as_deref().map(|code| ("code", code))),
            },
            OutputItem::Reasoning { .. } | OutputItem::Unknown => continue,
        };
        message.content.push(block);
    }
    let has_tool_use = message
        .content
        .iter()
        .any(|block| matches!(block, ContentBlock::ToolUse { .. }));
    message.stop_reason = Some(stop_reason_for(Some(response), has_tool_use));
    message.usage = response
        .usage
        .as_ref()
        .map(|usage| MessagesUsage::from(usage_from_response(usage)))
        .unwrap_or_default();
    message
}

/// Content-block message → item-protocol aggregate.
pub fn messages_to_response(message: &MessagesResponse, model: Option<&str>) -> ResponseObject {
    let mut response = ResponseObject::new(
        translate_id(&message.id, IdPrefix::Response),
        model.unwrap_or(&message.model),
        now_unix_seconds(),
    );
    for block in &message.content {
        match block {
            ContentBlock::Text { text } => response.output.push(message_item(text.clone())),
            ContentBlock::ToolUse { id, name, input }
            | ContentBlock::ServerToolUse { id, name, input } => {
                let arguments = match input {
                    Value::Null => String::new(),
                    other => other.to_string(),
                };
                response
                    .output
                    .push(function_call_item(to_call_id(id), name.clone(), &arguments));
            }
            ContentBlock::Thinking { thinking, .. } => {
                response.output.push(reasoning_item(thinking.clone()))
            }
            ContentBlock::RedactedThinking { .. } | ContentBlock::Unknown => {}
        }
    }
    apply_outcome(&mut response, outcome_for_stop_reason(message.stop_reason));
    response.output_text = Some(response.collect_output_text());
    response.usage = Some(ResponseUsage::from(usage_from_messages(&message.usage)));
    response
}

/// Raw Harmony completion text → item-protocol aggregate.
pub fn harmony_to_response(text: &str, model: &str) -> ResponseObject {
    let mut emitter =
        ResponsesEmitter::new(generate_id(IdPrefix::Response), model, now_unix_seconds());
    let messages = parse_harmony_messages(text);
    emit_harmony_messages(&mut emitter, &messages);
    emitter.aggregate(&ResponseOutcome::Completed)
}
