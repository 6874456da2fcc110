//! HTML sanitization
//!
//! Whitelist-filters rendered HTML before it is installed as display
//! content. Markdown cells allow raw HTML through the converter, and
//! persisted rendered HTML from cell JSON is untrusted user input, so
//! everything passes through this stage: scripts, inline event handlers and
//! similarly dangerous constructs must never survive it.
//!
//! `attachment:` and `data:` image schemes are kept on the whitelist so the
//! later attachment-resolution stage can find and rewrite them.

use ammonia::Builder;
use std::collections::HashSet;

/// A pure, synchronous HTML sanitizer.
///
/// Injected into the render pipeline as an explicit dependency.
pub trait Sanitizer {
    /// Return a sanitized copy of `html`.
    fn sanitize(&self, html: &str) -> String;
}

/// The default whitelist sanitizer, backed by ammonia.
#[derive(Debug, Clone, Copy, Default)]
pub struct AmmoniaSanitizer;

impl Sanitizer for AmmoniaSanitizer {
    fn sanitize(&self, html: &str) -> String {
        let url_schemes: HashSet<&str> = [
            "http",
            "https",
            "mailto",
            "ftp",
            // Resolved to data URIs by the attachment stage.
            "attachment",
            // Already-resolved inline images.
            "data",
        ]
        .into_iter()
        .collect();

        Builder::default()
            .url_schemes(url_schemes)
            .add_tag_attributes("img", &["width", "height"])
            .clean(html)
            .to_string()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn clean(html: &str) -> String {
        AmmoniaSanitizer.sanitize(html)
    }

    #[test]
    fn test_script_tag_removed() {
        let out = clean("<p>ok</p><script>alert(1)</script>");
        assert!(!out.contains("<script"));
        assert!(out.contains("<p>ok</p>"));
    }

    #[test]
    fn test_event_handler_removed() {
        let out = clean(r#"<img src="attachment:a" onerror="alert(1)">"#);
        assert!(!out.contains("onerror"));
    }

    #[test]
    fn test_javascript_href_removed() {
        let out = clean(r#"<a href="javascript:alert(1)">x</a>"#);
        assert!(!out.contains("javascript:"));
    }

    #[test]
    fn test_attachment_scheme_survives() {
        let out = clean(r#"<img src="attachment:photo.png" alt="p">"#);
        assert!(out.contains("attachment:photo.png"));
    }

    #[test]
    fn test_data_uri_survives() {
        let out = clean(r#"<img src="data:image/png;base64,aGVsbG8=">"#);
        assert!(out.contains("data:image/png;base64,aGVsbG8="));
    }

    #[test]
    fn test_basic_formatting_survives() {
        let out = clean("<h1>Title</h1><p><strong>b</strong> <em>i</em></p>");
        assert!(out.contains("<h1>Title</h1>"));
        assert!(out.contains("<strong>b</strong>"));
        assert!(out.contains("<em>i</em>"));
    }

    #[test]
    fn test_iframe_removed() {
        let out = clean(r#"<iframe src="https://example.com"></iframe><p>x</p>"#);
        assert!(!out.contains("<iframe"));
        assert!(out.contains("<p>x</p>"));
    }

    #[test]
    fn test_math_text_untouched() {
        // Reinjected math is plain text by the time it reaches the sanitizer.
        let out = clean("<p>Compute $x^2+y$ here</p>");
        assert!(out.contains("$x^2+y$"));
    }
}
