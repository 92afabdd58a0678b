use std::path::{Path, PathBuf};

use clap::ValueEnum;
use futures_util::pin_mut;
use futures_util::stream::{self, Stream, StreamExt};
use pixy_relay::harmony::{
    format_message, parse_harmony_response, render_conversation, HarmonyMessage,
};
use pixy_relay::protocol::chat::ChatCompletion;
use pixy_relay::protocol::messages::{MessagesRequest, MessagesResponse};
use pixy_relay::protocol::responses::ResponseObject;
use pixy_relay::{
    adapt_stream, chat_completion_to_response, decode_chat_chunk, decode_message_event,
    decode_response_event, encode_message_event, encode_response_event, harmony_to_response,
    messages_request_to_responses, messages_to_response, parse_payloads, replay_response_events,
    response_to_messages, ChatToResponsesAdapter, HarmonyToResponsesAdapter,
    MessagesToResponsesAdapter, RelayError, ResponsesToMessagesAdapter,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

const NEXT_HARMONY_ROLE: &str = "assistant";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Route {
    ChatToResponses,
    ResponsesToMessages,
    MessagesToResponses,
    HarmonyToResponses,
    /// Request-side only; has no streaming form.
    MessagesRequest,
}

#[derive(Debug, Clone)]
pub struct ConvertOptions {
    pub route: Route,
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    pub model: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AggregateOptions {
    pub route: Route,
    pub input: PathBuf,
    pub model: Option<String>,
}

pub async fn run_convert(options: ConvertOptions, default_model: &str) -> Result<(), String> {
    let body = read_input(&options.input).await?;
    let model = options.model.as_deref();
    let frames = convert_capture(options.route, &body, model, default_model).await?;
    write_output(options.output.as_deref(), &frames).await
}

pub async fn run_aggregate(options: AggregateOptions, default_model: &str) -> Result<(), String> {
    let body = read_input(&options.input).await?;
    let json = aggregate_json(options.route, &body, options.model.as_deref(), default_model)?;
    write_output(None, &json).await
}

pub async fn run_replay(input: &Path) -> Result<(), String> {
    let body = read_input(input).await?;
    write_output(None, &replay_capture(&body)?).await
}

pub async fn run_harmony_parse(input: &Path) -> Result<(), String> {
    let body = read_input(input).await?;
    write_output(None, &harmony_parse_json(&body)?).await
}

pub async fn run_harmony_format(input: &Path, partial: bool) -> Result<(), String> {
    let body = read_input(input).await?;
    write_output(None, &harmony_format_text(&body, partial)?).await
}

/// Streams a capture through the route's adapter and returns the
/// downstream events as SSE frames.
pub async fn convert_capture(
    route: Route,
    body: &str,
    model: Option<&str>,
    default_model: &str,
) -> Result<String, String> {
    match route {
        Route::ChatToResponses => {
            let chunks = decode_payloads(body, decode_chat_chunk)?;
            let mut adapter = ChatToResponsesAdapter::new();
            if let Some(model) = model {
                adapter = adapter.with_model(model);
            }
            encode_stream(adapt_stream(stream::iter(chunks), adapter), encode_response_event).await
        }
        Route::ResponsesToMessages => {
            let events = decode_payloads(body, decode_response_event)?;
            let mut adapter = ResponsesToMessagesAdapter::new();
            if let Some(model) = model {
                adapter = adapter.with_model(model);
            }
            encode_stream(adapt_stream(stream::iter(events), adapter), encode_message_event).await
        }
        Route::MessagesToResponses => {
            let events = decode_payloads(body, decode_message_event)?;
            let mut adapter = MessagesToResponsesAdapter::new();
            if let Some(model) = model {
                adapter = adapter.with_model(model);
            }
            encode_stream(adapt_stream(stream::iter(events), adapter), encode_response_event).await
        }
        Route::HarmonyToResponses => {
            let lines = body
                .split_inclusive('\n')
                .map(str::to_string)
                .collect::<Vec<_>>();
            let adapter = HarmonyToResponsesAdapter::new(model.unwrap_or(default_model));
            encode_stream(adapt_stream(stream::iter(lines), adapter), encode_response_event).await
        }
        Route::MessagesRequest => {
            Err("messages-request has no streaming form; use aggregate".to_string())
        }
    }
}

/// Converts one complete JSON object (or Harmony text) and returns pretty JSON.
pub fn aggregate_json(
    route: Route,
    body: &str,
    model: Option<&str>,
    default_model: &str,
) -> Result<String, String> {
    match route {
        Route::ChatToResponses => {
            let completion: ChatCompletion = parse_json(body)?;
            to_pretty_json(&chat_completion_to_response(&completion, model))
        }
        Route::ResponsesToMessages => {
            let response: ResponseObject = parse_json(body)?;
            to_pretty_json(&response_to_messages(&response))
        }
        Route::MessagesToResponses => {
            let message: MessagesResponse = parse_json(body)?;
            to_pretty_json(&messages_to_response(&message, model))
        }
        Route::HarmonyToResponses => {
            to_pretty_json(&harmony_to_response(body, model.unwrap_or(default_model)))
        }
        Route::MessagesRequest => {
            let request: MessagesRequest = parse_json(body)?;
            let converted =
                messages_request_to_responses(&request).map_err(|error| error.to_string())?;
            to_pretty_json(&converted)
        }
    }
}

/// Rebuilds the final aggregate from an item-event capture.
pub fn replay_capture(body: &str) -> Result<String, String> {
    let events = decode_payloads(body, decode_response_event)?;
    to_pretty_json(&replay_response_events(&events))
}

pub fn harmony_parse_json(body: &str) -> Result<String, String> {
    to_pretty_json(&parse_harmony_response(body))
}

/// `body` is a JSON array of messages. `partial` leaves an open assistant
/// header after the last message.
pub fn harmony_format_text(body: &str, partial: bool) -> Result<String, String> {
    let messages: Vec<HarmonyMessage> = parse_json(body)?;
    if partial {
        Ok(render_conversation(&messages, NEXT_HARMONY_ROLE))
    } else {
        Ok(messages.iter().map(format_message).collect())
    }
}

fn decode_payloads<T>(
    body: &str,
    decode: fn(&str) -> Result<Option<T>, RelayError>,
) -> Result<Vec<T>, String> {
    let mut decoded = Vec::new();
    for payload in parse_payloads(body) {
        if let Some(value) = decode(&payload).map_err(|error| error.to_string())? {
            decoded.push(value);
        }
    }
    debug!(count = decoded.len(), "decoded capture payloads");
    Ok(decoded)
}

async fn encode_stream<S, E>(
    events: S,
    encode: fn(&E) -> Result<String, RelayError>,
) -> Result<String, String>
where
    S: Stream<Item = E>,
{
    pin_mut!(events);
    let mut out = String::new();
    let mut count = 0usize;
    while let Some(event) = events.next().await {
        out.push_str(&encode(&event).map_err(|error| error.to_string())?);
        count += 1;
    }
    info!(events = count, "converted capture");
    Ok(out)
}

fn parse_json<T: DeserializeOwned>(body: &str) -> Result<T, String> {
    serde_json::from_str(body).map_err(|error| format!("parse input JSON failed: {error}"))
}

fn to_pretty_json<T: Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string_pretty(value)
        .map(|mut json| {
            json.push('\n');
            json
        })
        .map_err(|error| format!("encode output JSON failed: {error}"))
}

async fn read_input(path: &Path) -> Result<String, String> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|error| format!("read {} failed: {error}", path.display()))
}

async fn write_output(path: Option<&Path>, content: &str) -> Result<(), String> {
    match path {
        Some(path) => tokio::fs::write(path, content)
            .await
            .map_err(|error| format!("write {} failed: {error}", path.display())),
        None => {
            print!("{content}");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_and_parse_agree_on_tool_call() {
        let messages = r#"[{
            "role": "assistant",
            "channel": "commentary",
            "recipient": "functions.lookup",
            "constrainType": "json",
            "content": "{\"q\":1}",
            "invokesTool": true
        }]"#;
        let text = harmony_format_text(messages, false).expect("format");
        let parsed: serde_json::Value =
            serde_json::from_str(&harmony_parse_json(&text).expect("parse")).expect("json");
        assert_eq!(parsed["toolCalls"][0]["name"], "lookup");
        assert_eq!(parsed["toolCalls"][0]["arguments"], "{\"q\":1}");
    }

    #[test]
    fn partial_format_leaves_open_assistant_header() {
        let text =
            harmony_format_text(r#"[{"role":"user","content":"hi"}]"#, true).expect("format");
        assert!(text.ends_with("<|start|>assistant"));
    }

    #[tokio::test]
    async fn request_route_has_no_streaming_form() {
        let error = convert_capture(Route::MessagesRequest, "", None, "m")
            .await
            .expect_err("request route is aggregate-only");
        assert!(error.contains("aggregate"));
    }

    #[test]
    fn invalid_payload_reports_relay_error() {
        let error = replay_capture("data: {not json}\n\n").expect_err("invalid payload");
        assert!(error.starts_with("InvalidPayload:"));
    }
}
