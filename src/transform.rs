//! Post-sanitization HTML rewrites
//!
//! The render pipeline finishes by rewriting the sanitized fragment:
//! heading anchors, external link targets, and `attachment:` image
//! resolution. These run on the HTML string value itself, keeping the
//! pipeline independent of any UI toolkit — attaching the fragment to a
//! real display surface is the host's job.
//!
//! The same `img[src="attachment:..."]` scan also backs attachment garbage
//! collection at save time.

use crate::attachments::AttachmentStore;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

fn heading_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Headings never nest, so a non-greedy match to the next closing tag of
    // any level is safe.
    RE.get_or_init(|| Regex::new(r"(?s)<h([1-6])([^>]*)>(.*?)</h[1-6]>").unwrap())
}

fn anchor_tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<a\s([^>]*)>").unwrap())
}

fn href_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"href="([^"]*)""#).unwrap())
}

fn img_tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<img\s[^>]*>").unwrap())
}

fn attachment_src_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"src="attachment:([^"]*)""#).unwrap())
}

fn tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]*>").unwrap())
}

// ─────────────────────────────────────────────────────────────────────────────
// Heading Anchors
// ─────────────────────────────────────────────────────────────────────────────

/// Give every heading an `id` derived from its text (spaces replaced by
/// hyphens) and append an anchor link to `#<id>`.
///
/// Applies to the fragment root as well when it is itself a heading.
pub fn inject_heading_anchors(html: &str) -> String {
    heading_regex()
        .replace_all(html, |caps: &regex::Captures<'_>| {
            let level = &caps[1];
            let attrs = &caps[2];
            let inner = &caps[3];

            let text = tag_regex().replace_all(inner, "");
            let hash = text.trim().replace(' ', "-");
            let hash = attr_escape(&hash);

            format!(
                r##"<h{level}{attrs} id="{hash}">{inner}<a class="anchor-link" href="#{hash}">¶</a></h{level}>"##,
                level = level,
                attrs = attrs,
                hash = hash,
                inner = inner,
            )
        })
        .into_owned()
}

// ─────────────────────────────────────────────────────────────────────────────
// External Links
// ─────────────────────────────────────────────────────────────────────────────

/// Make every link whose target is not a same-page `#` fragment open in a
/// new browsing context.
pub fn rewrite_external_links(html: &str) -> String {
    anchor_tag_regex()
        .replace_all(html, |caps: &regex::Captures<'_>| {
            let attrs = &caps[1];
            let href = href_regex().captures(attrs).map(|c| c[1].to_string());
            match href {
                Some(url) if !url.starts_with('#') && !attrs.contains("target=") => {
                    format!(r#"<a {} target="_blank">"#, attrs.trim_end())
                }
                _ => caps[0].to_string(),
            }
        })
        .into_owned()
}

// ─────────────────────────────────────────────────────────────────────────────
// Attachment Resolution
// ─────────────────────────────────────────────────────────────────────────────

/// Rewrite every `attachment:<key>` image source.
///
/// Known keys are substituted with a data URI built from the stored MIME
/// type and base64 payload. Unknown keys get a blanked source so the
/// browser never issues a request for the unresolvable `attachment:`
/// scheme.
pub fn resolve_attachments(html: &str, attachments: &AttachmentStore) -> String {
    img_tag_regex()
        .replace_all(html, |img: &regex::Captures<'_>| {
            attachment_src_regex()
                .replace(&img[0], |src: &regex::Captures<'_>| {
                    let key = attr_unescape(&src[1]);
                    match attachments.get(&key) {
                        Some(att) => format!(r#"src="{}""#, att.to_data_uri()),
                        None => {
                            log::warn!("Unresolvable attachment reference: {}", key);
                            r#"src="""#.to_string()
                        }
                    }
                })
                .into_owned()
        })
        .into_owned()
}

/// Collect the attachment keys referenced as image sources in `html`.
pub fn referenced_attachment_keys(html: &str) -> BTreeSet<String> {
    let mut keys = BTreeSet::new();
    for img in img_tag_regex().find_iter(html) {
        for src in attachment_src_regex().captures_iter(img.as_str()) {
            keys.insert(attr_unescape(&src[1]));
        }
    }
    keys
}

// ─────────────────────────────────────────────────────────────────────────────
// Attribute Escaping
// ─────────────────────────────────────────────────────────────────────────────

fn attr_escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('"', "&quot;")
}

fn attr_unescape(s: &str) -> String {
    s.replace("&quot;", "\"")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
