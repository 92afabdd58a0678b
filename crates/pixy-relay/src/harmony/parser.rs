use tracing::trace;

use super::tokens::{token_offsets, tokenize, HarmonyPiece, HarmonyToken};
use super::types::{HarmonyChannel, HarmonyMessage, HarmonyToolCall, ParsedHarmonyResponse};
use crate::ids::{generate_id, IdPrefix};

const DEFAULT_ROLE: &str = "assistant";

/// Where incoming plain text goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Between units; text here is noise.
    Outside,
    Role,
    Channel,
    Constrain,
    /// Text right after a header-position `call`/`return` names the recipient.
    Recipient,
    Content,
}

#[derive(Debug, Clone, Default)]
struct Segment {
    role: String,
    channel: Option<HarmonyChannel>,
    recipient: Option<String>,
    constrain_type: Option<String>,
    content: String,
    invokes_tool: bool,
    entered_content: bool,
}

impl Segment {
    fn continuation(&self) -> Self {
        Self {
            role: self.role.clone(),
            channel: self.channel.clone(),
            ..Self::default()
        }
    }

    fn has_content(&self) -> bool {
        !self.content.trim().is_empty()
    }

    fn into_message(self) -> Option<HarmonyMessage> {
        if !self.entered_content && !self.has_content() {
            return None;
        }
        let role = if self.role.is_empty() {
            DEFAULT_ROLE.to_string()
        } else {
            self.role
        };
        Some(HarmonyMessage {
            role,
            channel: self.channel,
            recipient: self.recipient,
            constrain_type: self.constrain_type,
            content: self.content,
            invokes_tool: self.invokes_tool,
        })
    }
}

/// Token-driven state machine that collects Harmony segments.
#[derive(Debug)]
pub struct HarmonyParser {
    mode: Mode,
    current: Option<Segment>,
    messages: Vec<HarmonyMessage>,
}

impl Default for HarmonyParser {
    fn default() -> Self {
        Self::new()
    }
}

impl HarmonyParser {
    pub fn new() -> Self {
        Self {
            mode: Mode::Outside,
            current: None,
            messages: Vec::new(),
        }
    }

    pub fn feed(&mut self, text: &str) {
        for piece in tokenize(text) {
            match piece {
                HarmonyPiece::Token(token) => self.feed_token(token),
                HarmonyPiece::Text(text) => self.feed_text(text),
            }
        }
    }

    pub fn feed_token(&mut self, token: HarmonyToken) {
        match token {
            HarmonyToken::Start => {
                self.flush();
                self.current = Some(Segment::default());
                self.mode = Mode::Role;
            }
            HarmonyToken::Channel => {
                self.begin_header_field();
                self.mode = Mode::Channel;
            }
            HarmonyToken::Constrain => {
                self.begin_header_field();
                self.mode = Mode::Constrain;
            }
            HarmonyToken::Message => {
                self.ensure_segment();
                if self.mode == Mode::Content {
                    self.split_segment();
                }
                if let Some(segment) = self.current.as_mut() {
                    segment.entered_content = true;
                }
                self.mode = Mode::Content;
            }
            HarmonyToken::Call | HarmonyToken::Return => {
                let invokes_tool = token == HarmonyToken::Call;
                match self.mode {
                    Mode::Outside => {}
                    Mode::Content => {
                        if let Some(segment) = self.current.as_mut() {
                            segment.invokes_tool |= invokes_tool;
                        }
                        self.flush();
                    }
                    _ => {
                        if let Some(segment) = self.current.as_mut() {
                            segment.invokes_tool |= invokes_tool;
                        }
                        self.mode = Mode::Recipient;
                    }
                }
            }
            HarmonyToken::End => self.flush(),
        }
    }

    pub fn feed_text(&mut self, text: &str) {
        let mode = self.mode;
        let Some(segment) = self.current.as_mut() else {
            trace!(len = text.len(), "dropping harmony text outside of a unit");
            return;
        };
        match mode {
            Mode::Outside => {}
            Mode::Role => {
                for word in text.split_whitespace() {
                    if let Some(recipient) = word.strip_prefix("to=") {
                        segment.recipient = Some(recipient.to_string());
                    } else if segment.role.is_empty() {
                        segment.role = word.to_string();
                    }
                }
            }
            Mode::Channel => {
                for word in text.split_whitespace() {
                    if let Some(recipient) = word.strip_prefix("to=") {
                        segment.recipient = Some(recipient.to_string());
                    } else if segment.channel.is_none() {
                        segment.channel = Some(HarmonyChannel::from(word));
                    } else if segment.constrain_type.is_none() {
                        segment.constrain_type = Some(word.to_string());
                    }
                }
            }
            Mode::Constrain => {
                for word in text.split_whitespace() {
                    if let Some(recipient) = word.strip_prefix("to=") {
                        segment.recipient = Some(recipient.to_string());
                    } else if segment.constrain_type.is_none() {
                        segment.constrain_type = Some(word.to_string());
                    }
                }
            }
            Mode::Recipient => {
                let trimmed = text.trim_start();
                let split = trimmed
                    .find(char::is_whitespace)
                    .unwrap_or(trimmed.len());
                let (word, rest) = trimmed.split_at(split);
                if !word.is_empty() {
                    let word = word.strip_prefix("to=").unwrap_or(word);
                    segment.recipient = Some(word.to_string());
                    segment.content.push_str(rest.trim_start());
                    segment.entered_content = true;
                    self.mode = Mode::Content;
                }
            }
            Mode::Content => segment.content.push_str(text),
        }
    }

    pub fn finish(mut self) -> Vec<HarmonyMessage> {
        self.flush();
        self.messages
    }

    fn ensure_segment(&mut self) {
        if self.current.is_none() {
            self.current = Some(Segment {
                role: DEFAULT_ROLE.to_string(),
                ..Segment::default()
            });
        }
    }

    /// Header markers that follow content start a sibling segment.
    fn begin_header_field(&mut self) {
        self.ensure_segment();
        if self.mode == Mode::Content
            && self.current.as_ref().is_some_and(Segment::has_content)
        {
            self.split_segment();
        }
    }

    fn split_segment(&mut self) {
        let Some(segment) = self.current.take() else {
            return;
        };
        if !segment.has_content() {
            self.current = Some(segment);
            return;
        }
        let next = segment.continuation();
        self.messages.extend(segment.into_message());
        self.current = Some(next);
    }

    fn flush(&mut self) {
        if let Some(segment) = self.current.take() {
            self.messages.extend(segment.into_message());
        }
        self.mode = Mode::Outside;
    }
}

pub fn parse_harmony_messages(text: &str) -> Vec<HarmonyMessage> {
    let mut parser = HarmonyParser::new();
    parser.feed(text);
    parser.finish()
}

/// Parses a complete Harmony response. Empty or unterminated input yields
/// whatever segments could be recovered, possibly none.
pub fn parse_harmony_response(text: &str) -> ParsedHarmonyResponse {
    let messages = parse_harmony_messages(text);
    let reasoning = extract_reasoning(&messages);
    let tool_calls = extract_tool_calls(&messages);
    ParsedHarmonyResponse {
        messages,
        reasoning,
        tool_calls,
    }
}

pub fn extract_reasoning(messages: &[HarmonyMessage]) -> Option<String> {
    let parts = messages
        .iter()
        .filter(|message| message.is_channel(&HarmonyChannel::Analysis))
        .map(|message| message.content.trim())
        .filter(|content| !content.is_empty())
        .collect::<Vec<_>>();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n\n"))
    }
}

pub fn extract_tool_calls(messages: &[HarmonyMessage]) -> Vec<HarmonyToolCall> {
    messages
        .iter()
        .filter(|message| message.is_tool_call())
        .filter_map(|message| {
            let name = message.function_name()?;
            Some(HarmonyToolCall {
                id: generate_id(IdPrefix::Call),
                name: name.to_string(),
                arguments: message.content.trim().to_string(),
            })
        })
        .collect()
}

/// Byte offset just past the marker that closes the first complete unit in
/// `buffer`. `call` and `return` only close a unit once its content has
/// begun; before that they are the header-position recipient marker.
pub fn find_unit_end(buffer: &str) -> Option<usize> {
    let mut in_content = false;
    for (offset, token) in token_offsets(buffer) {
        match token {
            HarmonyToken::Start => in_content = false,
            HarmonyToken::Message => in_content = true,
            HarmonyToken::End => return Some(offset + token.marker().len()),
            HarmonyToken::Call | HarmonyToken::Return if in_content => {
                return Some(offset + token.marker().len());
            }
            _ => {}
        }
    }
    None
}
