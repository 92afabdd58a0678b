use super::tokens::HarmonyToken;
use super::types::HarmonyMessage;

/// Header only: `start<role>[ to=r][channel<c>[ to=r]][ constrain<t>]`.
pub fn format_partial(message: &HarmonyMessage) -> String {
    let mut out = String::new();
    out.push_str(HarmonyToken::Start.marker());
    out.push_str(&message.role);
    match (&message.channel, &message.recipient) {
        (Some(channel), recipient) => {
            out.push_str(HarmonyToken::Channel.marker());
            out.push_str(channel.as_str());
            if let Some(recipient) = recipient {
                out.push_str(" to=");
                out.push_str(recipient);
            }
        }
        (None, Some(recipient)) => {
            out.push_str(" to=");
            out.push_str(recipient);
        }
        (None, None) => {}
    }
    if let Some(constrain_type) = &message.constrain_type {
        out.push(' ');
        out.push_str(HarmonyToken::Constrain.marker());
        out.push_str(constrain_type);
    }
    out
}

/// Full segment. Tool invocations close with `call`, everything else with `end`.
pub fn format_message(message: &HarmonyMessage) -> String {
    let mut out = format_partial(message);
    out.push_str(HarmonyToken::Message.marker());
    out.push_str(&message.content);
    let terminator = if message.invokes_tool {
        HarmonyToken::Call
    } else {
        HarmonyToken::End
    };
    out.push_str(terminator.marker());
    out
}

/// Formats a whole conversation and leaves an open header for `next_role`
/// so the model continues from there.
pub fn render_conversation(messages: &[HarmonyMessage], next_role: &str) -> String {
    let mut out = messages.iter().map(format_message).collect::<String>();
    out.push_str(&format_partial(&HarmonyMessage::new(next_role, "")));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harmony::parser::parse_harmony_messages;
    use crate::harmony::types::HarmonyChannel;

    #[test]
    fn formats_full_header() {
        let message = HarmonyMessage::new("assistant", "{\"q\":1}")
            .with_channel(HarmonyChannel::Commentary)
            .with_recipient("functions.search")
            .with_constrain_type("json")
            .invoking_tool();
        assert_eq!(
            format_message(&message),
            "<|start|>assistant<|channel|>commentary to=functions.search <|constrain|>json\
             <|message|>{\"q\":1}<|call|>"
        );
    }

    #[test]
    fn partial_omits_message_and_end() {
        let message =
            HarmonyMessage::new("assistant", "ignored").with_channel(HarmonyChannel::Final);
        assert_eq!(format_partial(&message), "<|start|>assistant<|channel|>final");
    }

    #[test]
    fn recipient_without_channel_follows_role() {
        let message = HarmonyMessage::new("functions.lookup", "42").with_recipient("assistant");
        assert_eq!(
            format_message(&message),
            "<|start|>functions.lookup to=assistant<|message|>42<|end|>"
        );
    }

    #[test]
    fn format_then_parse_round_trips() {
        let samples = vec![
            HarmonyMessage::new("user", "What is the weather?"),
            HarmonyMessage::new("assistant", "Thinking it over.")
                .with_channel(HarmonyChannel::Analysis),
            HarmonyMessage::new("assistant", "{\"location\":\"SF\"}")
                .with_channel(HarmonyChannel::Commentary)
                .with_recipient("functions.get_weather")
                .with_constrain_type("json")
                .invoking_tool(),
            HarmonyMessage::new("functions.get_weather", "{\"temp\":18}")
                .with_channel(HarmonyChannel::Commentary)
                .with_recipient("assistant"),
            HarmonyMessage::new("assistant", "line one\nline two")
                .with_channel(HarmonyChannel::Final),
            HarmonyMessage::new("assistant", "    indented code\n")
                .with_channel(HarmonyChannel::Final),
            HarmonyMessage::new("assistant", "{\n  \"q\": 1\n}\n")
                .with_channel(HarmonyChannel::Commentary)
                .with_recipient("functions.search")
                .invoking_tool(),
            HarmonyMessage::new("developer", "# Instructions").with_constrain_type("text"),
        ];
        for message in samples {
            let parsed = parse_harmony_messages(&format_message(&message));
            assert_eq!(parsed, vec![message.clone()], "round trip of {message:?}");
        }
    }

    #[test]
    fn conversation_ends_with_open_header() {
        let rendered = render_conversation(&[HarmonyMessage::new("user", "hi")], "assistant");
        assert_eq!(rendered, "<|start|>user<|message|>hi<|end|><|start|>assistant");
    }
}
