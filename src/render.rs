//! Markdown render pipeline
//!
//! Orchestrates the full source-to-display transform for markdown cells:
//!
//! 1. empty-source placeholder substitution
//! 2. math isolation
//! 3. markdown-to-HTML conversion (asynchronous callback boundary)
//! 4. math reinjection
//! 5. sanitization
//! 6. heading-anchor injection
//! 7. external-link target rewriting
//! 8. `attachment:` image resolution
//!
//! Stage 3 is a suspension point: the pipeline captures everything it needs
//! (math table, sanitizer, attachment snapshot) before handing control to
//! the engine, and resumes inside the engine's callback. The cell's mutable
//! state may change between suspension and resumption, which is why the
//! attachment snapshot is taken by value.
//!
//! A conversion failure is not fatal: the pipeline logs it and renders the
//! HTML-escaped stripped source instead of producing empty output.

use crate::attachments::AttachmentStore;
use crate::markdown::MarkdownEngine;
use crate::math::MathIsolator;
use crate::sanitize::{AmmoniaSanitizer, Sanitizer};
use crate::transform;
use log::warn;
use std::cell::RefCell;
use std::rc::Rc;

/// Continuation receiving the final display HTML.
pub type PipelineCallback = Box<dyn FnOnce(String)>;

/// The markdown render pipeline, with its engine, sanitizer and math
/// isolator injected at construction.
pub struct RenderPipeline {
    engine: Rc<dyn MarkdownEngine>,
    sanitizer: Rc<dyn Sanitizer>,
    isolator: MathIsolator,
}

impl RenderPipeline {
    /// Build a pipeline from explicit collaborators.
    pub fn new(engine: Rc<dyn MarkdownEngine>, sanitizer: Rc<dyn Sanitizer>) -> Self {
        Self {
            engine,
            sanitizer,
            isolator: MathIsolator,
        }
    }

    /// Build a pipeline with the bundled comrak engine and ammonia
    /// sanitizer.
    pub fn with_defaults() -> Self {
        Self::new(
            Rc::new(crate::markdown::ComrakEngine::default()),
            Rc::new(AmmoniaSanitizer),
        )
    }

    /// Run the full pipeline over `source`, delivering the final HTML
    /// through `done`.
    ///
    /// An empty source renders `placeholder` instead — the hint text is
    /// itself valid markdown and goes through every stage. `attachments` is
    /// the caller's snapshot of the cell's attachment mapping, taken before
    /// this suspension point.
    pub fn render(
        &self,
        source: &str,
        placeholder: &str,
        attachments: AttachmentStore,
        done: PipelineCallback,
    ) {
        let text = if source.is_empty() { placeholder } else { source };
        let (stripped, math) = self.isolator.extract(text);

        let sanitizer = Rc::clone(&self.sanitizer);
        let isolator = self.isolator;
        let fallback = stripped.clone();

        self.engine.render(
            &stripped,
            Box::new(move |result| {
                let html = match result {
                    Ok(html) => html,
                    Err(err) => {
                        warn!("Markdown conversion failed: {}. Rendering escaped source.", err);
                        format!("<pre>{}</pre>", html_escape(&fallback))
                    }
                };
                let html = isolator.reinject(&html, &math);
                let html = sanitizer.sanitize(&html);
                let html = transform::inject_heading_anchors(&html);
                let html = transform::rewrite_external_links(&html);
                let html = transform::resolve_attachments(&html, &attachments);
                done(html);
            }),
        );
    }

    /// Sanitize HTML with this pipeline's sanitizer.
    ///
    /// Persisted rendered HTML is untrusted and passes through here before
    /// being installed as a provisional display.
    pub fn sanitize(&self, html: &str) -> String {
        self.sanitizer.sanitize(html)
    }

    /// Run stages 1–5 only and return the sanitized HTML.
    ///
    /// Used by attachment garbage collection, which scans the result for
    /// `attachment:` references but needs no anchors, link targets or
    /// resolved images. Returns `None` if the engine defers its callback;
    /// the caller then degrades to keeping every attachment.
    pub fn render_for_gc(&self, source: &str, placeholder: &str) -> Option<String> {
        let text = if source.is_empty() { placeholder } else { source };
        let (stripped, math) = self.isolator.extract(text);

        let slot: Rc<RefCell<Option<String>>> = Rc::new(RefCell::new(None));
        let out = Rc::clone(&slot);
        let sanitizer = Rc::clone(&self.sanitizer);
        let isolator = self.isolator;
        let fallback = stripped.clone();

        self.engine.render(
            &stripped,
            Box::new(move |result| {
                let html = match result {
                    Ok(html) => html,
                    Err(err) => {
                        warn!("Markdown conversion failed during GC: {}", err);
                        format!("<pre>{}</pre>", html_escape(&fallback))
                    }
                };
                let html = isolator.reinject(&html, &math);
                *out.borrow_mut() = Some(sanitizer.sanitize(&html));
            }),
        );

        let html = slot.borrow_mut().take();
        if html.is_none() {
            warn!("Markdown engine deferred during attachment GC; keeping all attachments");
        }
        html
    }
}

/// HTML-escape a string.
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markdown::testing::{DeferredEngine, FailingEngine};

    const PLACEHOLDER: &str = "Type *Markdown* and LaTeX: $\\alpha^2$";

    fn run(pipeline: &RenderPipeline, source: &str, attachments: AttachmentStore) -> String {
        let slot = Rc::new(RefCell::new(None));
        let out = Rc::clone(&slot);
        pipeline.render(
            source,
            PLACEHOLDER,
            attachments,
            Box::new(move |html| *out.borrow_mut() = Some(html)),
        );
        let got = slot.borrow_mut().take();
        got.expect("default engine is in-place")
    }

    fn defaults() -> RenderPipeline {
        RenderPipeline::with_defaults()
    }

    #[test]
    fn test_heading_rendered_with_anchor() {
        let html = run(&defaults(), "# Title", AttachmentStore::default());
        assert!(html.contains(r#"<h1 id="Title">"#));
        assert!(html.contains("href=\"#Title\""));
    }

    #[test]
    fn test_math_survives_markdown_unmangled() {
        let html = run(&defaults(), "Compute $x^2+y$ here", AttachmentStore::default());
        assert!(html.contains("$x^2+y$"), "math mangled: {}", html);
        // The caret and plus must not have become markup.
        assert!(!html.contains("<sup>"));
    }

    #[test]
    fn test_underscores_in_math_not_emphasised() {
        let html = run(&defaults(), "$a_i + b_j$", AttachmentStore::default());
        assert!(html.contains("$a_i + b_j$"));
        assert!(!html.contains("<em>"));
    }

    #[test]
    fn test_script_never_survives() {
        let html = run(
            &defaults(),
            "hello <script>alert(1)</script> world",
            AttachmentStore::default(),
        );
        assert!(!html.contains("<script"));
        assert!(html.contains("hello"));
    }

    #[test]
    fn test_external_link_target_rewritten() {
        let html = run(
            &defaults(),
            "[site](https://example.com)",
            AttachmentStore::default(),
        );
        assert!(html.contains(r#"target="_blank""#));
    }

    #[test]
    fn test_attachment_reference_resolved() {
        let mut attachments = AttachmentStore::default();
        attachments.add("pic.png", "image/png", "aGVsbG8=");
        let html = run(&defaults(), "![attachment:pic.png](attachment:pic.png)", attachments);
        assert!(html.contains("data:image/png;base64,aGVsbG8="));
        assert!(!html.contains("src=\"attachment:"));
    }

    #[test]
    fn test_missing_attachment_blanked() {
        let html = run(
            &defaults(),
            "![x](attachment:gone)",
            AttachmentStore::default(),
        );
        assert!(html.contains(r#"src="""#));
        assert!(!html.contains("src=\"attachment:"));
    }

    #[test]
    fn test_empty_source_renders_placeholder() {
        let html = run(&defaults(), "", AttachmentStore::default());
        // "Type *Markdown* ..." goes through the full pipeline; the
        // emphasis renders and the math span survives.
        assert!(html.contains("<em>Markdown</em>"));
        assert!(html.contains("$\\alpha^2$"));
    }

    #[test]
    fn test_engine_failure_falls_back_to_escaped_source() {
        let pipeline = RenderPipeline::new(Rc::new(FailingEngine), Rc::new(AmmoniaSanitizer));
        let html = run(&pipeline, "# <b>hi</b>", AttachmentStore::default());
        assert!(html.contains("<pre>"));
        assert!(html.contains("&lt;b&gt;"));
        assert!(!html.contains("<h1"));
    }

    #[test]
    fn test_pipeline_suspends_until_engine_completes() {
        let engine = Rc::new(DeferredEngine::default());
        let pipeline = RenderPipeline::new(
            Rc::clone(&engine) as Rc<dyn MarkdownEngine>,
            Rc::new(AmmoniaSanitizer),
        );

        let slot = Rc::new(RefCell::new(None));
        let out = Rc::clone(&slot);
        pipeline.render(
            "# Later",
            PLACEHOLDER,
            AttachmentStore::default(),
            Box::new(move |html| *out.borrow_mut() = Some(html)),
        );

        assert!(slot.borrow().is_none());
        engine.flush();
        let html = slot.borrow_mut().take().unwrap();
        assert!(html.contains(r#"<h1 id="Later">"#));
    }

    #[test]
    fn test_gc_render_exposes_attachment_references() {
        let html = defaults()
            .render_for_gc("![a](attachment:foo) and ![b](attachment:bar)", PLACEHOLDER)
            .unwrap();
        let keys = transform::referenced_attachment_keys(&html);
        assert!(keys.contains("foo"));
        assert!(keys.contains("bar"));
    }

    #[test]
    fn test_gc_render_with_deferring_engine_degrades() {
        let pipeline = RenderPipeline::new(
            Rc::new(DeferredEngine::default()),
            Rc::new(AmmoniaSanitizer),
        );
        assert!(pipeline.render_for_gc("![a](attachment:foo)", PLACEHOLDER).is_none());
    }

    #[test]
    fn test_html_escape() {
        assert_eq!(html_escape("a & <b>"), "a &amp; &lt;b&gt;");
        assert_eq!(html_escape("\"q\""), "&quot;q&quot;");
    }
}
