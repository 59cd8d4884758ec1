use std::sync::LazyLock;

use regex::Regex;

/// A start tag whose closing `>` is preceded by two or more dashes, e.g.
/// `<p-->` or `<img src="x" -->`. Attributes may not contain `<` or `>`.
/// Group 1 is the tag name, group 2 the attribute run (may be absent); the
/// run must start with a non-dash so whitespace before `-->` is dropped.
static DASHED_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<([a-zA-Z][a-zA-Z0-9]*)(\s+[^<>\s-][^<>]*?)?\s*--+>")
        .expect("dashed tag regex should compile")
});

/// Repairs start tags that some feeds close with `-->` instead of `>`.
///
/// `<p-->` becomes `<p>`, `<br-->` becomes `<br>` and
/// `<img src="a.png" -->` becomes `<img src="a.png">`. Real comments
/// (`<!-- ... -->`) are untouched because they do not start with a letter.
/// The whole document is trimmed. This is cosmetic only and offers no XSS
/// protection.
pub fn repair_malformed_markup(html: &str) -> String {
    if html.is_empty() {
        return String::new();
    }
    DASHED_TAG_RE
        .replace_all(html, "<${1}${2}>")
        .trim()
        .to_string()
}
