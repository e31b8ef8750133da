//! Sanitizing untrusted note html.
//!
//! Notes come from arbitrary remote instances, so their markup is only
//! semi-trusted: [`sanitize`] keeps a small inline/structural subset,
//! [`strip`] reduces it to plain text.

use std::collections::{HashMap, HashSet};

const ALLOWED_TAGS: &[&str] = &[
    "p", "br", "b", "i", "em", "strong", "a", "span", "ul", "ol", "li", "blockquote", "code", "pre",
    "h1", "h2", "h3", "h4", "h5", "h6",
];

const ALLOWED_SCHEMES: &[&str] = &["http", "https", "mailto"];

const LINK_REL: &str = "noopener noreferrer nofollow";

const ELLIPSIS: &str = "...";

fn note_builder() -> ammonia::Builder<'static> {
    // "rel" is never in the allow-list: ammonia sets it from `link_rel`
    let tag_attributes = HashMap::from([
        ("a", HashSet::from(["href", "class"])),
        ("span", HashSet::from(["class"])),
        ("code", HashSet::from(["class"])),
    ]);

    let mut builder = ammonia::Builder::default();
    builder
        .tags(ALLOWED_TAGS.iter().copied().collect())
        .tag_attributes(tag_attributes)
        .generic_attributes(HashSet::new())
        .url_schemes(ALLOWED_SCHEMES.iter().copied().collect())
        .link_rel(Some(LINK_REL))
        .set_tag_attribute_value("a", "target", "_blank");
    builder
}

/// Keeps the allowed markup subset; everything else is dropped.
pub fn sanitize(html: &str) -> String {
    if html.is_empty() {
        return String::new();
    }

    note_builder().clean(html).to_string()
}

/// Removes all markup and returns the text content.
pub fn strip(html: &str) -> String {
    if html.is_empty() {
        return String::new();
    }

    let cleaned = ammonia::Builder::empty()
        .clean_content_tags(HashSet::from(["script", "style"]))
        .clean(html)
        .to_string();

    // ammonia escapes the text it keeps, decode it back
    scraper::Html::parse_fragment(&cleaned)
        .root_element()
        .text()
        .collect()
}

/// Shortens `text` to at most `max_len` characters, ending with `...` when cut.
pub fn truncate(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        return text.to_string();
    }

    let keep = max_len.saturating_sub(ELLIPSIS.len());
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(ELLIPSIS);
    out
}

/// `truncate(strip(html), max_len)`, the form used for descriptions.
pub fn summary(html: Option<&str>, max_len: usize) -> String {
    truncate(&strip(html.unwrap_or_default()), max_len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_safe_tags() {
        let result = sanitize("<p>Hello <strong>world</strong></p>");
        assert!(result.contains("<p>"));
        assert!(result.contains("<strong>"));
    }

    #[test]
    fn test_removes_script() {
        let result = sanitize("<p>Hi</p><script>evil()</script>");
        assert!(result.contains("<p>"));
        assert!(!result.contains("<script>"));
        assert!(!result.contains("evil()"));
    }

    #[test]
    fn test_forces_link_rel_and_target() {
        let result = sanitize("<a href='https://x.com'>l</a>");
        assert!(result.contains(r#"rel="noopener noreferrer nofollow""#));
        assert!(result.contains(r#"target="_blank""#));
        assert!(result.contains(r#"href="https://x.com""#));
    }

    #[test]
    fn test_overrides_authored_rel() {
        let result = sanitize(r#"<a href="https://x.com" rel="opener">l</a>"#);
        assert!(!result.contains("opener\""));
        assert!(result.contains(r#"rel="noopener noreferrer nofollow""#));
    }

    #[test]
    fn test_drops_disallowed_schemes_and_attributes() {
        let result = sanitize(r#"<a href="javascript:alert(1)" onclick="x()">l</a>"#);
        assert!(!result.contains("javascript:"));
        assert!(!result.contains("onclick"));

        let result = sanitize(r#"<img src="https://x.com/a.png"><span style="color:red" class="mfm">t</span>"#);
        assert!(!result.contains("<img"));
        assert!(!result.contains("style="));
        assert!(result.contains(r#"class="mfm""#));
    }

    #[test]
    fn test_sanitize_empty() {
        assert_eq!(sanitize(""), "");
    }

    #[test]
    fn test_strip() {
        assert_eq!(strip("<p>Hello <strong>world</strong></p>"), "Hello world");
        assert_eq!(strip("<p>a &amp; b</p><script>nope()</script>"), "a & b");
        assert_eq!(strip(""), "");
    }

    #[test]
    fn test_truncate_long_text() {
        let result = truncate(&"a".repeat(300), 200);
        assert_eq!(result.chars().count(), 200);
        assert!(result.ends_with("..."));
    }

    #[test]
    fn test_truncate_short_and_empty() {
        assert_eq!(truncate("hi", 200), "hi");
        assert_eq!(truncate("", 200), "");
        assert_eq!(truncate("", 0), "");
    }

    #[test]
    fn test_truncate_counts_chars() {
        let text = "é".repeat(10);
        assert_eq!(truncate(&text, 10), text);
        let cut = truncate(&text, 5);
        assert_eq!(cut, "éé...");
    }

    #[test]
    fn test_summary_handles_missing_text() {
        assert_eq!(summary(None, 200), "");
        assert_eq!(summary(Some("<b>hey</b>"), 200), "hey");
    }
}
