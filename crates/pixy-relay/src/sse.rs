//! Server-sent-event framing at the engine boundary.

use serde::Serialize;

use crate::error::RelayError;
use crate::protocol::messages::MessageStreamEvent;
use crate::protocol::responses::ResponseStreamEvent;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: Option<String>,
    pub data: String,
}

/// `event: <name>\ndata: <payload>\n\n`; multi-line payloads get one
/// `data:` line each.
pub fn encode_sse_frame(event: &str, data: &str) -> String {
    let mut frame = format!("event: {event}\n");
    for line in data.split('\n') {
        frame.push_str("data: ");
        frame.push_str(line);
        frame.push('\n');
    }
    frame.push('\n');
    frame
}

fn encode_json_frame<T: Serialize>(event: &str, payload: &T) -> Result<String, RelayError> {
    let data = serde_json::to_string(payload).map_err(|error| {
        RelayError::invalid_payload(format!("failed to encode {event} event: {error}"))
    })?;
    Ok(encode_sse_frame(event, &data))
}

pub fn encode_response_event(event: &ResponseStreamEvent) -> Result<String, RelayError> {
    encode_json_frame(event.event_type(), event)
}

pub fn encode_message_event(event: &MessageStreamEvent) -> Result<String, RelayError> {
    encode_json_frame(event.event_type(), event)
}

/// Incremental decoder; chunks may split lines and frames anywhere.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: String,
    event: Option<String>,
    data_lines: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &str) -> Vec<SseFrame> {
        self.buffer.push_str(chunk);
        let mut frames = Vec::new();
        while let Some(newline) = self.buffer.find('\n') {
            let line = self.buffer[..newline].trim_end_matches('\r').to_string();
            self.buffer.drain(..=newline);
            if let Some(frame) = self.accept_line(&line) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Flushes a trailing frame that was not followed by a blank line.
    pub fn finish(&mut self) -> Option<SseFrame> {
        let rest = std::mem::take(&mut self.buffer);
        let rest = rest.trim_end_matches('\r');
        if !rest.is_empty() {
            if let Some(frame) = self.accept_line(rest) {
                return Some(frame);
            }
        }
        self.take_frame()
    }

    fn accept_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.take_frame();
        }
        if line.starts_with(':') {
            return None;
        }
        if let Some(event) = line.strip_prefix("event:") {
            self.event = Some(event.trim().to_string());
        } else if let Some(data) = line.strip_prefix("data:") {
            self.data_lines.push(data.strip_prefix(' ').unwrap_or(data).to_string());
        }
        None
    }

    fn take_frame(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        if self.data_lines.is_empty() {
            return None;
        }
        let data = self.data_lines.join("\n");
        self.data_lines.clear();
        Some(SseFrame { event, data })
    }
}

pub fn parse_sse_frames(body: &str) -> Vec<SseFrame> {
    let mut decoder = SseDecoder::new();
    let mut frames = decoder.push(body);
    frames.extend(decoder.finish());
    frames
}

/// Payload strings from either an SSE capture or JSON lines.
pub fn parse_payloads(body: &str) -> Vec<String> {
    let is_sse = body
        .lines()
        .any(|line| line.starts_with("data:") || line.starts_with("event:"));
    if is_sse {
        return parse_sse_frames(body)
            .into_iter()
            .map(|frame| frame.data)
            .collect();
    }
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
