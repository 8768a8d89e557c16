use fancy_regex::Regex;
use once_cell::sync::Lazy;

/// The `@web` variable that asks for web search context.
pub const WEB_VARIABLE: &str = "web";

#[derive(Debug, PartialEq)]
pub struct MessageEnrichments {
    pub mentioned_files: Vec<String>,
    pub wants_web_search: bool,
}

static AT_MENTION_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?<!\w)@([\w/\.\-]+)").expect("Invalid regex"));

static WEB_MENTION_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?<!\w)@web\b").expect("Invalid regex"));

pub fn extract_enrichments(content: &str) -> MessageEnrichments {
    let mentioned_files = AT_MENTION_REGEX
        .captures_iter(content)
        .filter_map(Result::ok)
        .map(|cap| cap[1].to_string())
        .filter(|name| !name.eq_ignore_ascii_case(WEB_VARIABLE))
        .collect();

    MessageEnrichments {
        mentioned_files,
        wants_web_search: mentions_web(content),
    }
}

pub fn mentions_web(content: &str) -> bool {
    WEB_MENTION_REGEX.is_match(content).unwrap_or(false)
}

/// The search query for a prompt that mentions `@web`: the prompt with every
/// `@web` removed, or `web search` if nothing else is left.
pub fn web_query(content: &str) -> String {
    let stripped = WEB_MENTION_REGEX.replace_all(content, "");
    let query = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    if query.is_empty() {
        "web search".to_string()
    } else {
        query
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_single_file() {
        let content = "hello, please read this file: @src/main.rs";
        let enrichments = extract_enrichments(content);
        assert_eq!(
            enrichments,
            MessageEnrichments {
                mentioned_files: vec!["src/main.rs".to_string()],
                wants_web_search: false,
            }
        );
    }

    #[test]
    fn test_extract_multiple_files() {
        let content = "Check @src/main.rs and @Cargo.toml please";
        let enrichments = extract_enrichments(content);
        assert_eq!(
            enrichments.mentioned_files,
            vec!["src/main.rs".to_string(), "Cargo.toml".to_string()]
        );
    }

    #[test]
    fn test_inline_mention() {
        let content = "I saw this in (@src/cli.rs), which was interesting.";
        let enrichments = extract_enrichments(content);
        assert_eq!(enrichments.mentioned_files, vec!["src/cli.rs".to_string()]);
    }

    #[test]
    fn test_email_address_edge_case() {
        let content = "My email is test@example.com";
        let enrichments = extract_enrichments(content);
        assert!(enrichments.mentioned_files.is_empty());
        assert!(!enrichments.wants_web_search);
    }

    #[test]
    fn test_web_variable_is_not_a_file() {
        let content = "@WEB how do I parse toml? see @src/config.rs";
        let enrichments = extract_enrichments(content);
        assert_eq!(
            enrichments,
            MessageEnrichments {
                mentioned_files: vec!["src/config.rs".to_string()],
                wants_web_search: true,
            }
        );
    }

    #[test]
    fn test_web_query_strips_variable() {
        assert_eq!(web_query("@web  rust async traits"), "rust async traits");
        assert_eq!(web_query("latest tokio @Web release"), "latest tokio release");
        assert_eq!(web_query("@web"), "web search");
        assert!(!mentions_web("@website is not the variable"));
    }
}
