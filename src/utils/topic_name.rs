// src/utils/topic_name.rs

use std::sync::LazyLock;

use regex::Regex;

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s+").expect("static regex")
});

/// Normalizes a topic name: trimmed, whitespace runs become `_`, lowercased.
/// Returns `None` when nothing is left.
pub fn normalize_topic_name(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(WHITESPACE.replace_all(trimmed, "_").to_lowercase())
}
