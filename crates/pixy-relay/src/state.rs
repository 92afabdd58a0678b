//! Per-conversion ledger of in-flight output blocks.
//!
//! A block is created (and started) the first time its key is opened, takes
//! append-only fragments, and completes at most once. Every conversion call
//! owns exactly one [`ConversionState`]; nothing here is shared.

use std::collections::HashMap;

use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    Text,
    ToolUse,
    Reasoning,
}

/// Upstream correlation key for a block.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BlockKey {
    /// The single current text run.
    Text,
    /// The single current reasoning run.
    Reasoning,
    /// Positional upstream key: chat tool-call slot or content-block index.
    Index(u32),
    /// Upstream item identifier.
    Item(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentBlockState {
    pub index: usize,
    pub kind: BlockKind,
    pub id: String,
    pub name: Option<String>,
    pub content: String,
    started: bool,
    completed: bool,
}

impl ContentBlockState {
    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockEvent {
    Added { index: usize },
    Delta { index: usize, fragment: String },
    Done { index: usize },
}

impl BlockEvent {
    pub fn index(&self) -> usize {
        match self {
            Self::Added { index } | Self::Delta { index, .. } | Self::Done { index } => *index,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens.saturating_add(output_tokens),
        }
    }
}

#[derive(Debug, Default)]
pub struct ConversionState {
    blocks: Vec<ContentBlockState>,
    keys: HashMap<BlockKey, usize>,
    sequence_number: u64,
    usage: Option<TokenUsage>,
}

impl ConversionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens the block for `key`. Returns `Added` only when a new block was
    /// created; an open block under the same key is reused as-is, a completed
    /// one is superseded by a fresh block.
    pub fn open(
        &mut self,
        key: BlockKey,
        kind: BlockKind,
        id: impl Into<String>,
        name: Option<String>,
    ) -> Option<BlockEvent> {
        if self.is_open(&key) {
            return None;
        }
        let index = self.blocks.len();
        self.blocks.push(ContentBlockState {
            index,
            kind,
            id: id.into(),
            name,
            content: String::new(),
            started: true,
            completed: false,
        });
        self.keys.insert(key, index);
        Some(BlockEvent::Added { index })
    }

    /// Empty fragments and unknown or completed keys are dropped.
    pub fn append(&mut self, key: &BlockKey, fragment: &str) -> Option<BlockEvent> {
        if fragment.is_empty() {
            return None;
        }
        let Some(block) = self.open_block_mut(key) else {
            trace!(?key, "dropping fragment for unopened or completed block");
            return None;
        };
        block.content.push_str(fragment);
        Some(BlockEvent::Delta {
            index: block.index,
            fragment: fragment.to_string(),
        })
    }

    pub fn complete(&mut self, key: &BlockKey) -> Option<BlockEvent> {
        let block = self.open_block_mut(key)?;
        block.completed = true;
        Some(BlockEvent::Done { index: block.index })
    }

    /// Completes every open block in creation order.
    pub fn complete_all(&mut self) -> Vec<BlockEvent> {
        self.blocks
            .iter_mut()
            .filter(|block| block.started && !block.completed)
            .map(|block| {
                block.completed = true;
                BlockEvent::Done { index: block.index }
            })
            .collect()
    }

    pub fn is_open(&self, key: &BlockKey) -> bool {
        self.block_for(key).is_some_and(|block| !block.completed)
    }

    pub fn block_for(&self, key: &BlockKey) -> Option<&ContentBlockState> {
        self.keys.get(key).and_then(|index| self.blocks.get(*index))
    }

    pub fn block(&self, index: usize) -> Option<&ContentBlockState> {
        self.blocks.get(index)
    }

    pub fn blocks(&self) -> &[ContentBlockState] {
        &self.blocks
    }

    pub fn current_text(&self) -> Option<&ContentBlockState> {
        self.block_for(&BlockKey::Text).filter(|block| !block.completed)
    }

    pub fn has_kind(&self, kind: BlockKind) -> bool {
        self.blocks.iter().any(|block| block.kind == kind)
    }

    pub fn output_text(&self) -> String {
        self.blocks
            .iter()
            .filter(|block| block.kind == BlockKind::Text)
            .map(|block| block.content.as_str())
            .collect()
    }

    /// Returns the number for the next emitted event, then advances.
    pub fn next_sequence_number(&mut self) -> u64 {
        let current = self.sequence_number;
        self.sequence_number += 1;
        current
    }

    /// Usage is recorded once; later reports are ignored.
    pub fn record_usage(&mut self, usage: TokenUsage) -> bool {
        if self.usage.is_some() {
            return false;
        }
        self.usage = Some(usage);
        true
    }

    pub fn usage(&self) -> Option<TokenUsage> {
        self.usage
    }

    fn open_block_mut(&mut self, key: &BlockKey) -> Option<&mut ContentBlockState> {
        let index = *self.keys.get(key)?;
        self.blocks.get_mut(index).filter(|block| !block.completed)
    }
}
