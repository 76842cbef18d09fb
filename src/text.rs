/// Trims, replaces embedded tabs/newlines with spaces, then drops every
/// code point >= 128. Stripped characters are dropped, not substituted, so
/// downstream delimited output never sees a field-breaking byte.
pub fn scrub(text: &str) -> String {
    text.trim()
        .chars()
        .map(|ch| match ch {
            '\t' | '\n' | '\r' => ' ',
            other => other,
        })
        .filter(|ch| (*ch as u32) < 128)
        .collect()
}

/// Scrub for free-form key/value text: same filter, but backslashes are
/// removed as well since they escape the bulk-load delimiter.
pub fn scrub_value(text: &str) -> String {
    scrub(&text.replace('\\', ""))
}
