use console::style;
use similar::{DiffTag, TextDiff};

const CONTEXT_LINES: usize = 2;

/// Renders a compact, colored diff of `old` and `new` with 1-based line
/// numbers. A line whose only change is whitespace is shown as context.
pub fn render_diff(old: &str, new: &str) -> String {
    if old == new {
        return "No changes detected.".to_string();
    }

    let old_lines: Vec<&str> = old.lines().collect();
    let new_lines: Vec<&str> = new.lines().collect();
    let diff = TextDiff::from_slices(&old_lines, &new_lines);

    let removed = |n: usize| style(format!("- {:>4}: {}", n + 1, old_lines[n])).red().to_string();
    let added = |n: usize| style(format!("+ {:>4}: {}", n + 1, new_lines[n])).green().to_string();
    let context = |n: usize| format!("  {:>4}: {}", n + 1, new_lines[n]);

    let mut out = Vec::new();
    for (hunk_idx, group) in diff.grouped_ops(CONTEXT_LINES).iter().enumerate() {
        if hunk_idx > 0 {
            out.push("...".to_string());
        }
        for op in group {
            let (old_range, new_range) = (op.old_range(), op.new_range());
            match op.tag() {
                DiffTag::Equal => out.extend(new_range.map(context)),
                DiffTag::Delete => out.extend(old_range.map(removed)),
                DiffTag::Insert => out.extend(new_range.map(added)),
                DiffTag::Replace => {
                    let whitespace_only = old_range.len() == 1
                        && new_range.len() == 1
                        && old_lines[old_range.start]
                            .split_whitespace()
                            .eq(new_lines[new_range.start].split_whitespace());
                    if whitespace_only {
                        out.push(context(new_range.start));
                    } else {
                        out.extend(old_range.map(removed));
                        out.extend(new_range.map(added));
                    }
                }
            }
        }
    }
    out.join("\n")
}
