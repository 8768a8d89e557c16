//! Helpers for the XML-like tags the model is asked to emit.
//!
//! Tags never nest. The first complete `<tag>…</tag>` pair wins, which is the
//! behaviour the response formats in the prompts rely on.

pub const TOOL_CALL: &str = "tool-call";
pub const TOOL_NAME: &str = "tool-name";
pub const TOOL_ARGS: &str = "tool-args";
pub const FILE_MODIFICATION: &str = "file-modification";
pub const CHANGE_DESCRIPTION: &str = "change-description";
pub const COMPLETE_FILE_URI: &str = "complete-file-uri";
pub const UPDATED_FILE_CONTENT: &str = "updated-file-content";
pub const CHAT_SUMMARY_TITLE: &str = "chat-summary-title";
pub const FOLLOW_UP_QUESTION: &str = "follow-up-question";

pub fn open_tag(tag: &str) -> String {
    format!("<{tag}>")
}

pub fn close_tag(tag: &str) -> String {
    format!("</{tag}>")
}

/// A complete tag region inside a larger text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region<'a> {
    /// Byte offset of the opening tag.
    pub start: usize,
    /// Text between the tags, untrimmed.
    pub inner: &'a str,
}

/// Returns the inner text of the first complete `<tag>…</tag>` region.
pub fn find_tag<'a>(text: &'a str, tag: &str) -> Option<&'a str> {
    find_regions(text, tag).into_iter().next().map(|r| r.inner)
}

/// Like [`find_tag`] but trimmed and owned; empty content counts as absent.
pub fn extract_tag(text: &str, tag: &str) -> Option<String> {
    find_tag(text, tag)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Returns every complete, non-overlapping region in order of appearance.
pub fn find_regions<'a>(text: &'a str, tag: &str) -> Vec<Region<'a>> {
    let open = open_tag(tag);
    let close = close_tag(tag);
    let mut regions = Vec::new();
    let mut cursor = 0;

    while let Some(rel_start) = text[cursor..].find(&open) {
        let start = cursor + rel_start;
        let inner_start = start + open.len();
        let Some(rel_end) = text[inner_start..].find(&close) else {
            break;
        };
        let inner_end = inner_start + rel_end;
        regions.push(Region {
            start,
            inner: &text[inner_start..inner_end],
        });
        cursor = inner_end + close.len();
    }

    regions
}

/// Text following the first opening `tag`, whether or not it was closed.
pub fn after_open_tag<'a>(text: &'a str, tag: &str) -> Option<&'a str> {
    let open = open_tag(tag);
    text.find(&open).map(|i| &text[i + open.len()..])
}
