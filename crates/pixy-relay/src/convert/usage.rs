use crate::protocol::chat::ChatUsage;
use crate::protocol::messages::MessagesUsage;
use crate::protocol::responses::ResponseUsage;
use crate::state::TokenUsage;

/// `prompt → input`, `completion → output`; `total` passes through.
pub fn usage_from_chat(usage: &ChatUsage) -> TokenUsage {
    TokenUsage {
        input_tokens: usage.prompt_tokens,
        output_tokens: usage.completion_tokens,
        total_tokens: if usage.total_tokens == 0 {
            usage.prompt_tokens.saturating_add(usage.completion_tokens)
        } else {
            usage.total_tokens
        },
    }
}

pub fn usage_from_response(usage: &ResponseUsage) -> TokenUsage {
    TokenUsage {
        input_tokens: usage.input_tokens,
        output_tokens: usage.output_tokens,
        total_tokens: usage.total_tokens,
    }
}

/// The content-block protocol carries no total; it is the sum.
pub fn usage_from_messages(usage: &MessagesUsage) -> TokenUsage {
    TokenUsage::new(usage.input_tokens, usage.output_tokens)
}

impl From<TokenUsage> for ResponseUsage {
    fn from(usage: TokenUsage) -> Self {
        Self {
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            total_tokens: usage.total_tokens,
        }
    }
}

impl From<TokenUsage> for MessagesUsage {
    fn from(usage: TokenUsage) -> Self {
        Self {
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            cache_creation_input_tokens: None,
            cache_read_input_tokens: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_usage_renames_and_keeps_total() {
        let usage = usage_from_chat(&ChatUsage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 17,
        });
        assert_eq!(usage.input_tokens, 10);
        assert_eq!(usage.output_tokens, 5);
        assert_eq!(usage.total_tokens, 17);
    }

    #[test]
    fn missing_total_is_derived() {
        let usage = usage_from_chat(&ChatUsage {
            prompt_tokens: 2,
            completion_tokens: 3,
            total_tokens: 0,
        });
        assert_eq!(usage.total_tokens, 5);
        let messages = MessagesUsage {
            input_tokens: 4,
            output_tokens: 6,
            ..MessagesUsage::default()
        };
        assert_eq!(ResponseUsage::from(usage_from_messages(&messages)).total_tokens, 10);
    }

    #[test]
    fn oversized_counts_saturate_total() {
        let messages = MessagesUsage {
            input_tokens: u64::MAX,
            output_tokens: 7,
            ..MessagesUsage::default()
        };
        let usage = usage_from_messages(&messages);
        assert_eq!(usage.input_tokens, u64::MAX);
        assert_eq!(usage.total_tokens, u64::MAX);

        let chat = usage_from_chat(&ChatUsage {
            prompt_tokens: u64::MAX,
            completion_tokens: u64::MAX,
            total_tokens: 0,
        });
        assert_eq!(chat.total_tokens, u64::MAX);
    }
}
