//! Harmony: role/channel/recipient metadata multiplexed into plain text
//! through literal markers such as `<|start|>` and `<|channel|>`.

mod formatter;
mod parser;
mod tokens;
mod types;

pub use formatter::{format_message, format_partial, render_conversation};
pub use parser::{
    extract_reasoning, extract_tool_calls, find_unit_end, parse_harmony_messages,
    parse_harmony_response, HarmonyParser,
};
pub use tokens::{token_offsets, tokenize, HarmonyPiece, HarmonyToken};
pub use types::{HarmonyChannel, HarmonyMessage, HarmonyToolCall, ParsedHarmonyResponse};
