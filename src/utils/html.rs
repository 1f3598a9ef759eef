/// Sanitizes admin-authored text (prompts, titles, choices) before it is stored.
///
/// Uses ammonia's whitelist: harmless markup like <b> survives, <script>
/// blocks and event-handler attributes are stripped. Learner pages render
/// these fields, so this is the only place markup is filtered.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input.trim())
}

/// Sanitizes every entry of a list of texts.
pub fn clean_all(inputs: &[String]) -> Vec<String> {
    inputs.iter().map(|s| clean_html(s)).collect()
}
