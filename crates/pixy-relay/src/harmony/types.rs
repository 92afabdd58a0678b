use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

const FUNCTION_RECIPIENT_PREFIX: &str = "functions.";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum HarmonyChannel {
    Analysis,
    Commentary,
    Final,
    Other(String),
}

impl HarmonyChannel {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Analysis => "analysis",
            Self::Commentary => "commentary",
            Self::Final => "final",
            Self::Other(name) => name.as_str(),
        }
    }
}

impl From<&str> for HarmonyChannel {
    fn from(value: &str) -> Self {
        match value {
            "analysis" => Self::Analysis,
            "commentary" => Self::Commentary,
            "final" => Self::Final,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for HarmonyChannel {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<HarmonyChannel> for String {
    fn from(value: HarmonyChannel) -> Self {
        value.as_str().to_string()
    }
}

impl Display for HarmonyChannel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One channel segment of a Harmony response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarmonyMessage {
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<HarmonyChannel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
    #[serde(
        rename = "constrainType",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub constrain_type: Option<String>,
    pub content: String,
    /// Segment was closed or announced by the `call` marker.
    #[serde(rename = "invokesTool", default, skip_serializing_if = "is_false")]
    pub invokes_tool: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl HarmonyMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            channel: None,
            recipient: None,
            constrain_type: None,
            content: content.into(),
            invokes_tool: false,
        }
    }

    pub fn with_channel(mut self, channel: HarmonyChannel) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn with_recipient(mut self, recipient: impl Into<String>) -> Self {
        self.recipient = Some(recipient.into());
        self
    }

    pub fn with_constrain_type(mut self, constrain_type: impl Into<String>) -> Self {
        self.constrain_type = Some(constrain_type.into());
        self
    }

    pub fn invoking_tool(mut self) -> Self {
        self.invokes_tool = true;
        self
    }

    /// `<name>` when the recipient is `functions.<name>`.
    pub fn function_name(&self) -> Option<&str> {
        self.recipient
            .as_deref()
            .and_then(|recipient| recipient.strip_prefix(FUNCTION_RECIPIENT_PREFIX))
            .filter(|name| !name.is_empty())
    }

    pub fn is_tool_call(&self) -> bool {
        self.function_name().is_some()
            && (self.invokes_tool || self.channel == Some(HarmonyChannel::Commentary))
    }

    pub fn is_channel(&self, channel: &HarmonyChannel) -> bool {
        self.channel.as_ref() == Some(channel)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarmonyToolCall {
    pub id: String,
    pub name: String,
    /// Raw argument text; JSON validity is checked by consumers, not here.
    pub arguments: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ParsedHarmonyResponse {
    pub messages: Vec<HarmonyMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(
        rename = "toolCalls",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub tool_calls: Vec<HarmonyToolCall>,
}

impl ParsedHarmonyResponse {
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Final-channel text that is not itself a tool invocation, with the
    /// separator whitespace around each segment removed.
    pub fn final_text(&self) -> Option<String> {
        let parts = self
            .messages
            .iter()
            .filter(|message| message.is_channel(&HarmonyChannel::Final) && !message.is_tool_call())
            .map(|message| message.content.trim())
            .collect::<Vec<_>>();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n\n"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_serializes_as_plain_string() {
        let encoded = serde_json::to_string(&HarmonyChannel::Commentary).expect("encode");
        assert_eq!(encoded, "\"commentary\"");
        let decoded: HarmonyChannel = serde_json::from_str("\"browser\"").expect("decode");
        assert_eq!(decoded, HarmonyChannel::Other("browser".to_string()));
    }

    #[test]
    fn commentary_to_function_is_tool_call() {
        let message = HarmonyMessage::new("assistant", "{}")
            .with_channel(HarmonyChannel::Commentary)
            .with_recipient("functions.lookup");
        assert_eq!(message.function_name(), Some("lookup"));
        assert!(message.is_tool_call());
    }

    #[test]
    fn final_message_to_function_needs_call_marker() {
        let message = HarmonyMessage::new("assistant", "{}")
            .with_channel(HarmonyChannel::Final)
            .with_recipient("functions.lookup");
        assert!(!message.is_tool_call());
        assert!(message.invoking_tool().is_tool_call());
    }

    #[test]
    fn non_function_recipient_is_not_tool_call() {
        let message = HarmonyMessage::new("assistant", "open page")
            .with_channel(HarmonyChannel::Commentary)
            .with_recipient("browser.open");
        assert!(!message.is_tool_call());
    }
}
