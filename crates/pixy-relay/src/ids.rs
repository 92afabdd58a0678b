//! Prefix-preserving identifier translation between provider ecosystems.
//!
//! Every identifier is `<prefix>_<suffix>`. Two identifiers name the same
//! logical object exactly when their suffixes are equal, so translation only
//! ever swaps the prefix.

use std::fmt::{Display, Formatter};

use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdPrefix {
    /// Chat/item protocol tool call id (`call_`).
    Call,
    /// Content-block protocol tool use id (`toolu_`).
    ToolUse,
    /// Item protocol function call item id (`fc_`).
    FunctionCall,
    Message,
    Response,
    Reasoning,
}

impl IdPrefix {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Call => "call",
            Self::ToolUse => "toolu",
            Self::FunctionCall => "fc",
            Self::Message => "msg",
            Self::Response => "resp",
            Self::Reasoning => "rs",
        }
    }

    /// Recognizes the prefix an identifier currently carries.
    pub fn of(id: &str) -> Option<Self> {
        let (prefix, _) = id.split_once('_')?;
        match prefix {
            "call" => Some(Self::Call),
            "toolu" => Some(Self::ToolUse),
            "fc" => Some(Self::FunctionCall),
            "msg" => Some(Self::Message),
            "resp" => Some(Self::Response),
            "rs" => Some(Self::Reasoning),
            _ => None,
        }
    }
}

impl Display for IdPrefix {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything after the first `_`, or the whole id when there is none.
pub fn id_suffix(id: &str) -> &str {
    id.split_once('_').map(|(_, suffix)| suffix).unwrap_or(id)
}

pub fn translate_id(id: &str, prefix: IdPrefix) -> String {
    format!("{prefix}_{}", id_suffix(id))
}

/// Maps a tool identifier into the chat/item ecosystem (`call_…`).
pub fn to_call_id(id: &str) -> String {
    translate_id(id, IdPrefix::Call)
}

/// Maps a tool identifier into the content-block ecosystem (`toolu_…`).
pub fn to_tool_use_id(id: &str) -> String {
    translate_id(id, IdPrefix::ToolUse)
}

pub fn same_ignoring_prefix(left: &str, right: &str) -> bool {
    id_suffix(left) == id_suffix(right)
}

fn unix_millis() -> u128 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|duration| duration.as_millis())
        .unwrap_or(0)
}

/// Creation timestamp for synthesized aggregates.
pub(crate) fn now_unix_seconds() -> i64 {
    (unix_millis() / 1000) as i64
}

/// `prefix_<millis hex>_<random>`. Collisions are unlikely within a session,
/// not impossible across processes.
pub fn generate_id(prefix: IdPrefix) -> String {
    let millis = unix_millis();
    let random = Uuid::new_v4().simple().to_string();
    format!("{prefix}_{millis:x}_{}", &random[..16])
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_IDS: &[&str] = &[
        "call_abc123",
        "toolu_01XFDUDYJgAACzvnptvVoYEL",
        "fc_68a7_ff",
        "msg_",
        "resp_with_many_parts",
    ];

    #[test]
    fn suffix_is_text_after_first_underscore() {
        assert_eq!(id_suffix("call_abc_def"), "abc_def");
        assert_eq!(id_suffix("plain"), "plain");
        assert_eq!(id_suffix("msg_"), "");
    }

    #[test]
    fn translation_round_trips_to_original_prefix() {
        for id in SAMPLE_IDS {
            let original = IdPrefix::of(id).expect("sample ids carry known prefixes");
            for target in [IdPrefix::Call, IdPrefix::ToolUse, IdPrefix::FunctionCall] {
                let forward = translate_id(id, target);
                assert!(same_ignoring_prefix(id, &forward), "{id} -> {forward}");
                assert_eq!(translate_id(&forward, original), *id);
            }
        }
    }

    #[test]
    fn unprefixed_ids_keep_whole_string_as_suffix() {
        assert_eq!(to_call_id("c1"), "call_c1");
        assert_eq!(to_tool_use_id("call_c1"), "toolu_c1");
        assert!(same_ignoring_prefix("c1", "toolu_c1"));
    }

    #[test]
    fn empty_suffix_round_trips() {
        let forward = to_tool_use_id("call_");
        assert_eq!(forward, "toolu_");
        assert_eq!(to_call_id(&forward), "call_");
    }

    #[test]
    fn generated_ids_carry_prefix_and_differ() {
        let first = generate_id(IdPrefix::Message);
        let second = generate_id(IdPrefix::Message);
        assert!(first.starts_with("msg_"));
        assert_eq!(IdPrefix::of(&first), Some(IdPrefix::Message));
        assert_ne!(first, second);
        assert_eq!(first.split('_').count(), 3);
    }
}
