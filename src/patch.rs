//! # SEARCH/REPLACE patches
//!
//! The model describes targeted edits as a string of blocks:
//!
//! ```text
//! <<<<<<< ORIGINAL
//! let x = 6
//! =======
//! let x = 6.5
//! >>>>>>> UPDATED
//! ```
//!
//! Blocks are applied one after another against the *current* text, so a
//! later block sees the effects of the earlier ones. Only the first occurrence
//! of an original fragment is replaced. Blocks whose fragment cannot be found
//! are skipped and counted; a patch where nothing applied is a no-op, and the
//! caller decides whether that is an error.

use once_cell::sync::Lazy;
use regex::Regex;

pub const ORIGINAL: &str = "<<<<<<< ORIGINAL";
pub const DIVIDER: &str = "=======";
pub const FINAL: &str = ">>>>>>> UPDATED";

static BLOCK_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!("(?s){ORIGINAL}(.*?){DIVIDER}(.*?){FINAL}")).expect("Invalid regex")
});

/// One (original, replacement) pair, both trimmed of surrounding whitespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchReplaceBlock {
    pub original: String,
    pub replacement: String,
}

/// The result of applying a block string to some text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchOutcome {
    pub content: String,
    pub applied: usize,
    pub skipped: usize,
}

impl PatchOutcome {
    pub fn is_noop(&self) -> bool {
        self.applied == 0
    }
}

/// Extracts every well-formed block in document order.
pub fn parse_blocks(blocks: &str) -> Vec<SearchReplaceBlock> {
    BLOCK_REGEX
        .captures_iter(blocks)
        .map(|cap| SearchReplaceBlock {
            original: cap[1].trim().to_string(),
            replacement: cap[2].trim().to_string(),
        })
        .collect()
}

/// Applies a single block to `content`, returning `None` if its original
/// fragment is absent.
///
/// An empty original fragment never matches: a literal search for `""` would
/// otherwise succeed at offset 0 and prepend the replacement.
pub fn apply_block(content: &str, block: &SearchReplaceBlock) -> Option<String> {
    if block.original.is_empty() {
        return None;
    }
    let index = content.find(&block.original)?;
    let mut updated = String::with_capacity(content.len() + block.replacement.len());
    updated.push_str(&content[..index]);
    updated.push_str(&block.replacement);
    updated.push_str(&content[index + block.original.len()..]);
    Some(updated)
}

/// Parses `blocks` and applies them sequentially to `content`.
pub fn apply_blocks(content: &str, blocks: &str) -> PatchOutcome {
    let mut outcome = PatchOutcome {
        content: content.to_string(),
        applied: 0,
        skipped: 0,
    };

    for block in parse_blocks(blocks) {
        match apply_block(&outcome.content, &block) {
            Some(updated) => {
                outcome.content = updated;
                outcome.applied += 1;
            }
            None => {
                tracing::debug!(original = %block.original, "search/replace block did not match");
                outcome.skipped += 1;
            }
        }
    }

    outcome
}
