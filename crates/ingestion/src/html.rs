//! HTML to text cleanup
//!
//! Regex based rather than a DOM parse: scripts and styles are removed,
//! remaining tags become spaces, whitespace is collapsed.

use regex_lite::Regex;
use std::sync::LazyLock;

static SCRIPT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script[^>]*>.*?</script>").expect("script regex is valid")
});
static STYLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<style[^>]*>.*?</style>").expect("style regex is valid")
});
static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("tag regex is valid"));
static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace regex is valid"));
static TITLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<title[^>]*>([^<]+)</title>").expect("title regex is valid")
});
static LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<a[^>]+href=["']([^"']+)["'][^>]*>"#).expect("link regex is valid")
});

/// Visible text of an HTML document
pub fn clean_html(html: &str) -> String {
    let text = SCRIPT_RE.replace_all(html, "");
    let text = STYLE_RE.replace_all(&text, "");
    let text = TAG_RE.replace_all(&text, " ");
    WHITESPACE_RE.replace_all(&text, " ").trim().to_string()
}

/// Contents of the first `<title>` element, trimmed
pub fn extract_title(html: &str) -> Option<String> {
    TITLE_RE
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|title| !title.is_empty())
}

/// Raw `href` values of anchor tags, in document order
pub fn extract_links(html: &str) -> impl Iterator<Item = &str> {
    LINK_RE
        .captures_iter(html)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_html_strips_scripts_styles_and_tags() {
        let html = r#"<html><head><title>Acme</title>
            <style type="text/css">body { color: red; }</style>
            <SCRIPT>var x = "<p>not text</p>";</SCRIPT></head>
            <body><h1>Welcome</h1>
            <p>Acme   sells
            rockets.</p></body></html>"#;

        assert_eq!(clean_html(html), "Acme Welcome Acme sells rockets.");
    }

    #[test]
    fn test_title_extraction() {
        assert_eq!(
            extract_title("<TITLE lang=\"en\">  Pricing </TITLE>"),
            Some("Pricing".to_string())
        );
        assert_eq!(extract_title("<p>no title</p>"), None);
    }

    #[test]
    fn test_link_extraction() {
        let html = r#"<a href="/about">About</a> <a class="x" href='https://acme.test/faq'>FAQ</a> <a name="top">"#;
        let links: Vec<_> = extract_links(html).collect();
        assert_eq!(links, vec!["/about", "https://acme.test/faq"]);
    }
}
