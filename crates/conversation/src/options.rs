//! Suggested-option extraction.
//!
//! Models may end a reply with a tilde-fenced block:
//!
//! ```text
//! ~~~json
//! {"suggestedOptions": ["first", "second"]}
//! ~~~
//! ```
//!
//! The tilde fence keeps ordinary backtick code samples out of the way. The
//! block is optional enrichment: anything malformed leaves the text untouched.

use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;

static OPTION_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)~~~json\s*(.*?)\s*~~~").expect("option block pattern is valid")
});

/// Model text split into display text and quick replies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedOptions {
    pub cleaned_text: String,
    pub options: Option<Vec<String>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OptionBlock {
    suggested_options: Vec<String>,
}

/// Split the first suggestion block out of `text`.
///
/// Returns the text unchanged and no options when the block is absent or its
/// JSON is not `{"suggestedOptions": [string, ...]}`.
pub fn extract_options(text: &str) -> ExtractedOptions {
    match parse_block(text) {
        Some((cleaned_text, options)) => ExtractedOptions {
            cleaned_text,
            options: Some(options),
        },
        None => ExtractedOptions {
            cleaned_text: text.to_string(),
            options: None,
        },
    }
}

fn parse_block(text: &str) -> Option<(String, Vec<String>)> {
    let captures = OPTION_BLOCK.captures(text)?;
    let whole = captures.get(0)?;
    let body = captures.get(1)?.as_str();

    let block: OptionBlock = match serde_json::from_str(body) {
        Ok(block) => block,
        Err(e) => {
            tracing::warn!(error = %e, "ignoring malformed suggested options block");
            return None;
        }
    };

    let mut cleaned = String::with_capacity(text.len());
    cleaned.push_str(&text[..whole.start()]);
    cleaned.push_str(&text[whole.end()..]);
    Some((cleaned.trim().to_string(), block.suggested_options))
}
