//! Content-block request → item-protocol request.
//!
//! This is the one conversion that fails fast: a source shape the target
//! cannot express is a caller bug, not something to paper over.

use serde_json::json;
use tracing::debug;

use crate::error::{RelayError, RelayErrorCode};
use crate::ids::to_call_id;
use crate::protocol::messages::{
    InputContent, InputContentBlock, MessagesRequest, MediaSource, ToolResultContent,
};
use crate::protocol::responses::{
    FunctionTool, InputContentPart, ResponseInputItem, ResponsesRequestBody,
};

const EMPTY_TOOL_RESULT: &str = "(no text result)";
const IMAGE_DETAIL: &str = "auto";

fn unsupported_source(source: &MediaSource, reason: &str) -> RelayError {
    RelayError::new(
        RelayErrorCode::UnsupportedSource,
        format!("unsupported image source `{}`: {reason}", source.source_type),
    )
    .with_details(json!({ "type": source.source_type }))
}

/// `base64` sources become data URLs, `url` sources pass through.
pub fn image_source_url(source: &MediaSource) -> Result<String, RelayError> {
    match source.source_type.as_str() {
        "base64" => {
            let media_type = source
                .media_type
                .as_deref()
                .ok_or_else(|| unsupported_source(source, "missing media_type"))?;
            let data = source
                .data
                .as_deref()
                .ok_or_else(|| unsupported_source(source, "missing data"))?;
            Ok(format!("data:{media_type};base64,{data}"))
        }
        "url" => source
            .url
            .clone()
            .ok_or_else(|| unsupported_source(source, "missing url")),
        _ => Err(unsupported_source(source, "only base64 and url are supported")),
    }
}

/// Tool results carry text only on the item side.
pub fn tool_result_text(content: Option<&ToolResultContent>) -> Result<String, RelayError> {
    let text = match content {
        None => String::new(),
        Some(ToolResultContent::Text(text)) => text.clone(),
        Some(ToolResultContent::Blocks(blocks)) => {
            let mut parts = Vec::new();
            for block in blocks {
                match block {
                    InputContentBlock::Text { text } => parts.push(text.as_str()),
                    other => {
                        return Err(RelayError::new(
                            RelayErrorCode::UnsupportedSource,
                            format!(
                                "unsupported tool_result content block `{}`",
                                input_block_kind(other)
                            ),
                        ));
                    }
                }
            }
            parts.join("\n")
        }
    };
    if text.is_empty() {
        Ok(EMPTY_TOOL_RESULT.to_string())
    } else {
        Ok(text)
    }
}

fn input_block_kind(block: &InputContentBlock) -> &'static str {
    match block {
        InputContentBlock::Text { .. } => "text",
        InputContentBlock::Image { .. } => "image",
        InputContentBlock::Document { .. } => "document",
        InputContentBlock::ToolUse { .. } => "tool_use",
        InputContentBlock::ToolResult { .. } => "tool_result",
        InputContentBlock::Thinking { .. } => "thinking",
        InputContentBlock::Unknown => "unknown",
    }
}

/// Collects message parts between item boundaries (tool use / tool result).
struct PendingMessage {
    role: String,
    parts: Vec<InputContentPart>,
}

impl PendingMessage {
    fn flush_into(&mut self, items: &mut Vec<ResponseInputItem>) {
        if self.parts.is_empty() {
            return;
        }
        items.push(ResponseInputItem::Message {
            role: self.role.clone(),
            content: std::mem::take(&mut self.parts),
        });
    }
}

pub fn messages_request_to_responses(
    request: &MessagesRequest,
) -> Result<ResponsesRequestBody, RelayError> {
    let mut input = Vec::new();
    for message in &request.messages {
        let assistant = message.role == "assistant";
        let text_part = |text: &str| {
            if assistant {
                InputContentPart::OutputText {
                    text: text.to_string(),
                }
            } else {
                InputContentPart::InputText {
                    text: text.to_string(),
                }
            }
        };
        let mut pending = PendingMessage {
            role: message.role.clone(),
            parts: Vec::new(),
        };

        let blocks = match &message.content {
            InputContent::Text(text) => {
                pending.parts.push(text_part(text));
                pending.flush_into(&mut input);
                continue;
            }
            InputContent::Blocks(blocks) => blocks,
        };

        for block in blocks {
            match block {
                InputContentBlock::Text { text } => pending.parts.push(text_part(text)),
                InputContentBlock::Image { source } => {
                    pending.parts.push(InputContentPart::InputImage {
                        image_url: image_source_url(source)?,
                        detail: Some(IMAGE_DETAIL.to_string()),
                    });
                }
                InputContentBlock::Document { source } => {
                    return Err(RelayError::new(
                        RelayErrorCode::UnsupportedContent,
                        format!(
                            "document blocks (`{}` source) have no input counterpart",
                            source.source_type
                        ),
                    ));
                }
                InputContentBlock::ToolUse { id, name, input: arguments } => {
                    pending.flush_into(&mut input);
                    input.push(ResponseInputItem::FunctionCall {
                        call_id: to_call_id(id),
                        name: name.clone(),
                        arguments: arguments.to_string(),
                    });
                }
                InputContentBlock::ToolResult {
                    tool_use_id,
                    content,
                    ..
                } => {
                    pending.flush_into(&mut input);
                    input.push(ResponseInputItem::FunctionCallOutput {
                        call_id: to_call_id(tool_use_id),
                        output: tool_result_text(content.as_ref())?,
                    });
                }
                InputContentBlock::Thinking { .. } | InputContentBlock::Unknown => {
                    debug!(kind = input_block_kind(block), "dropping request block");
                }
            }
        }
        pending.flush_into(&mut input);
    }

    let tools = request
        .tools
        .iter()
        .map(|tool| FunctionTool {
            tool_type: "function".to_string(),
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters: tool.input_schema.clone(),
        })
        .collect();

    Ok(ResponsesRequestBody {
        model: request.model.clone(),
        instructions: request
            .system
            .as_ref()
            .map(|system| system.joined())
            .filter(|text| !text.is_empty()),
        input,
        tools,
        max_output_tokens: request.max_tokens,
        stream: request.stream,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn request(value: serde_json::Value) -> MessagesRequest {
        serde_json::from_value(value).expect("valid request")
    }

    #[test]
    fn converts_conversation_with_tool_round_trip() {
        let converted = messages_request_to_responses(&request(json!({
            "model": "claude",
            "system": "Be brief.",
            "max_tokens": 256,
            "tools": [{
                "name": "get_weather",
                "description": "Weather lookup",
                "input_schema": { "type": "object" }
            }],
            "messages": [
                { "role": "user", "content": "Weather in SF?" },
                { "role": "assistant", "content": [
                    { "type": "text", "text": "Checking." },
                    { "type": "tool_use", "id": "toolu_1", "name": "get_weather",
                      "input": { "city": "SF" } }
                ] },
                { "role": "user", "content": [
                    { "type": "tool_result", "tool_use_id": "toolu_1", "content": "18C" },
                    { "type": "text", "text": "Thanks" }
                ] }
            ]
        })))
        .expect("converts");

        assert_eq!(converted.instructions.as_deref(), Some("Be brief."));
        assert_eq!(converted.max_output_tokens, Some(256));
        assert_eq!(converted.tools[0].name, "get_weather");
        assert_eq!(
            converted.input,
            vec![
                ResponseInputItem::Message {
                    role: "user".to_string(),
                    content: vec![InputContentPart::InputText {
                        text: "Weather in SF?".to_string()
                    }],
                },
                ResponseInputItem::Message {
                    role: "assistant".to_string(),
                    content: vec![InputContentPart::OutputText {
                        text: "Checking.".to_string()
                    }],
                },
                ResponseInputItem::FunctionCall {
                    call_id: "call_1".to_string(),
                    name: "get_weather".to_string(),
                    arguments: "{\"city\":\"SF\"}".to_string(),
                },
                ResponseInputItem::FunctionCallOutput {
                    call_id: "call_1".to_string(),
                    output: "18C".to_string(),
                },
                ResponseInputItem::Message {
                    role: "user".to_string(),
                    content: vec![InputContentPart::InputText {
                        text: "Thanks".to_string()
                    }],
                },
            ]
        );
    }

    #[test]
    fn base64_and_url_images_are_supported() {
        let base64 = MediaSource {
            source_type: "base64".to_string(),
            media_type: Some("image/png".to_string()),
            data: Some("AAAA".to_string()),
            ..MediaSource::default()
        };
        assert_eq!(image_source_url(&base64).expect("ok"), "data:image/png;base64,AAAA");
        let url = MediaSource {
            source_type: "url".to_string(),
            url: Some("https://example.com/a.png".to_string()),
            ..MediaSource::default()
        };
        assert_eq!(image_source_url(&url).expect("ok"), "https://example.com/a.png");
    }

    #[test]
    fn unsupported_image_source_fails_fast() {
        let error = messages_request_to_responses(&request(json!({
            "model": "claude",
            "messages": [{ "role": "user", "content": [
                { "type": "image", "source": { "type": "file", "file_id": "file_1" } }
            ] }]
        })))
        .expect_err("file sources are unsupported");
        assert_eq!(error.code, RelayErrorCode::UnsupportedSource);
        assert_eq!(error.details, Some(json!({ "type": "file" })));
    }

    #[test]
    fn image_inside_tool_result_fails_fast() {
        let error = tool_result_text(Some(&ToolResultContent::Blocks(vec![
            InputContentBlock::Image {
                source: MediaSource {
                    source_type: "base64".to_string(),
                    ..MediaSource::default()
                },
            },
        ])))
        .expect_err("images cannot be tool output");
        assert_eq!(error.code, RelayErrorCode::UnsupportedSource);
        assert!(error.message.contains("image"));
    }

    #[test]
    fn empty_tool_result_gets_placeholder() {
        assert_eq!(tool_result_text(None).expect("ok"), "(no text result)");
    }
}
