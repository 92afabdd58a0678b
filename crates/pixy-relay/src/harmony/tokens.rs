/// Literal markers a Harmony model emits inside ordinary text output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HarmonyToken {
    Start,
    End,
    Message,
    Channel,
    Constrain,
    Return,
    Call,
}

impl HarmonyToken {
    pub const ALL: [HarmonyToken; 7] = [
        HarmonyToken::Start,
        HarmonyToken::End,
        HarmonyToken::Message,
        HarmonyToken::Channel,
        HarmonyToken::Constrain,
        HarmonyToken::Return,
        HarmonyToken::Call,
    ];

    pub const fn marker(&self) -> &'static str {
        match self {
            Self::Start => "<|start|>",
            Self::End => "<|end|>",
            Self::Message => "<|message|>",
            Self::Channel => "<|channel|>",
            Self::Constrain => "<|constrain|>",
            Self::Return => "<|return|>",
            Self::Call => "<|call|>",
        }
    }

    /// Token whose marker starts at the beginning of `rest`, if any.
    pub fn at(rest: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .find(|token| rest.starts_with(token.marker()))
            .copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarmonyPiece<'a> {
    Token(HarmonyToken),
    Text(&'a str),
}

/// Byte offsets of every marker in `text`, in order.
pub fn token_offsets(text: &str) -> Vec<(usize, HarmonyToken)> {
    let mut offsets = Vec::new();
    let mut cursor = 0;
    while let Some(found) = text[cursor..].find("<|") {
        let at = cursor + found;
        match HarmonyToken::at(&text[at..]) {
            Some(token) => {
                offsets.push((at, token));
                cursor = at + token.marker().len();
            }
            None => cursor = at + 2,
        }
    }
    offsets
}

/// Splits `text` into markers and the plain runs between them.
pub fn tokenize(text: &str) -> Vec<HarmonyPiece<'_>> {
    let mut pieces = Vec::new();
    let mut text_start = 0;
    for (offset, token) in token_offsets(text) {
        if offset > text_start {
            pieces.push(HarmonyPiece::Text(&text[text_start..offset]));
        }
        pieces.push(HarmonyPiece::Token(token));
        text_start = offset + token.marker().len();
    }
    if text_start < text.len() {
        pieces.push(HarmonyPiece::Text(&text[text_start..]));
    }
    pieces
}
