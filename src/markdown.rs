//! Markdown engine abstraction and comrak implementation
//!
//! The markdown-to-HTML conversion is defined as delivering its result
//! through a deferred callback invocation, not a synchronous return: the
//! render pipeline suspends at this boundary and resumes with the callback
//! payload. The bundled [`ComrakEngine`] happens to invoke its callback
//! before returning, but callers must not rely on that — a host may plug in
//! an engine that completes later on the same thread.

use crate::error::Result;
use comrak::{markdown_to_html, Options};

// ─────────────────────────────────────────────────────────────────────────────
// Engine Interface
// ─────────────────────────────────────────────────────────────────────────────

/// Continuation receiving the conversion result.
pub type RenderCallback = Box<dyn FnOnce(Result<String>)>;

/// A pluggable markdown-to-HTML converter.
pub trait MarkdownEngine {
    /// Convert `text` to HTML, delivering the result through `done`.
    ///
    /// The callback may be invoked before this method returns or at any
    /// later point on the same thread; it is invoked exactly once.
    fn render(&self, text: &str, done: RenderCallback);
}

// ─────────────────────────────────────────────────────────────────────────────
// Options
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration options for markdown conversion.
///
/// Heading `id` attributes are deliberately not generated here: the render
/// pipeline injects them together with anchor links after sanitization, so
/// the ids survive the sanitizer's attribute whitelist.
#[derive(Debug, Clone)]
pub struct MarkdownOptions {
    /// Enable GitHub Flavored Markdown tables
    pub tables: bool,
    /// Enable strikethrough syntax (~~text~~)
    pub strikethrough: bool,
    /// Enable autolink URLs and emails
    pub autolink: bool,
    /// Enable task lists (- [ ] and - [x])
    pub tasklist: bool,
    /// Enable footnotes
    pub footnotes: bool,
    /// Allow raw HTML to pass through the converter. The sanitizer strips
    /// anything dangerous afterwards, so this stays true by default.
    pub raw_html: bool,
}

impl Default for MarkdownOptions {
    fn default() -> Self {
        Self {
            tables: true,
            strikethrough: true,
            autolink: true,
            tasklist: true,
            footnotes: true,
            raw_html: true,
        }
    }
}

impl MarkdownOptions {
    /// Convert to comrak Options.
    fn to_comrak_options(&self) -> Options {
        let mut options = Options::default();

        // Extension options
        options.extension.strikethrough = self.strikethrough;
        options.extension.table = self.tables;
        options.extension.autolink = self.autolink;
        options.extension.tasklist = self.tasklist;
        options.extension.footnotes = self.footnotes;

        // Render options
        options.render.unsafe_ = self.raw_html;

        options
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Comrak Engine
// ─────────────────────────────────────────────────────────────────────────────

/// The default engine, backed by comrak.
///
/// Completes synchronously: the callback runs before `render` returns.
#[derive(Debug, Clone, Default)]
pub struct ComrakEngine {
    options: MarkdownOptions,
}

impl ComrakEngine {
    /// Create an engine with the given options.
    pub fn new(options: MarkdownOptions) -> Self {
        Self { options }
    }
}

impl MarkdownEngine for ComrakEngine {
    fn render(&self, text: &str, done: RenderCallback) {
        let html = markdown_to_html(text, &self.options.to_comrak_options());
        done(Ok(html));
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Test Engines
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::error::Error;
    use std::cell::RefCell;

    /// Engine that holds callbacks until explicitly flushed, for exercising
    /// the suspension points of the pipeline.
    #[derive(Default)]
    pub struct DeferredEngine {
        pending: RefCell<Vec<(String, RenderCallback)>>,
    }

    impl DeferredEngine {
        /// Number of conversions waiting to complete.
        pub fn pending_count(&self) -> usize {
            self.pending.borrow().len()
        }

        /// Complete every pending conversion, oldest first, using comrak.
        pub fn flush(&self) {
            let drained: Vec<_> = self.pending.borrow_mut().drain(..).collect();
            let engine = ComrakEngine::default();
            for (text, done) in drained {
                engine.render(&text, done);
            }
        }
    }

    impl MarkdownEngine for DeferredEngine {
        fn render(&self, text: &str, done: RenderCallback) {
            self.pending.borrow_mut().push((text.to_string(), done));
        }
    }

    /// Engine that always reports a conversion failure.
    pub struct FailingEngine;

    impl MarkdownEngine for FailingEngine {
        fn render(&self, _text: &str, done: RenderCallback) {
            done(Err(Error::Markdown {
                message: "engine unavailable".to_string(),
            }));
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
