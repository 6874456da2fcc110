//! Markdown cell behavior
//!
//! Rendering runs the full pipeline asynchronously. Because the cell's
//! state can change between suspension and resumption, everything a
//! completion needs — the source snapshot, the attachment snapshot, the
//! render generation — is captured before the engine is handed control.
//! A completion whose generation is stale (a newer `render()` started in
//! the meantime) is discarded, so the latest request wins deterministically.

use super::{CellType, TextCell};
use crate::attachments::{parse_data_uri, Blob};
use log::{debug, warn};
use regex::Regex;
use std::rc::Rc;
use std::sync::OnceLock;

fn heading_prefix_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(#*)\s?").unwrap())
}

impl TextCell {
    /// Kick off the asynchronous markdown render. The `rendered` flag is
    /// already set by the state-machine guard; this installs the HTML when
    /// the pipeline completes.
    pub(crate) fn start_markdown_render(&self) {
        let (placeholder, attachments, generation) = {
            let mut state = self.state.borrow_mut();
            state.render_generation += 1;
            (
                state.placeholder.clone(),
                state.attachments.clone(),
                state.render_generation,
            )
        };
        let source = self.editor.borrow().get_value();

        let state = Rc::downgrade(&self.state);
        let editor = Rc::clone(&self.editor);
        let host = Rc::clone(&self.host);
        let pipeline = Rc::clone(&self.pipeline);

        self.pipeline.render(
            &source,
            &placeholder,
            attachments,
            Box::new(move |html| {
                let Some(state) = state.upgrade() else {
                    // The cell was dropped while the conversion was in
                    // flight.
                    return;
                };
                {
                    let mut st = state.borrow_mut();
                    if st.render_generation != generation {
                        debug!(
                            "Discarding stale render completion (generation {} superseded by {})",
                            generation, st.render_generation
                        );
                        return;
                    }
                    st.rendered_html = html.clone();
                }
                host.typeset(&html);
                let cell = TextCell {
                    state,
                    editor,
                    host: Rc::clone(&host),
                    pipeline,
                };
                host.cell_rendered(&cell);
            }),
        );
    }

    /// Insert markup for an inline image at the current cursor position.
    ///
    /// The blob's bytes are read asynchronously into a data URI; on
    /// completion the payload is stored as an attachment (keyed by the
    /// blob's filename, or `_auto_<n>` for nameless pasted blobs) and
    /// `![attachment:<key>](attachment:<key>)` is inserted into the source.
    /// The cursor position is captured now — it may move during the read.
    /// Declines on non-markdown cells, like the other transitions.
    pub fn insert_image_from_blob(&self, blob: Blob) {
        if self.cell_type() != CellType::Markdown {
            return;
        }
        let pos = self.editor.borrow().cursor();
        let key = match &blob.name {
            Some(name) => name.clone(),
            None => format!("_auto_{}", self.state.borrow().attachments.len()),
        };
        let declared_mime = blob.mime.clone();

        let state = Rc::downgrade(&self.state);
        let editor = Rc::clone(&self.editor);

        self.host.read_blob(
            blob,
            Box::new(move |data_uri| {
                let Some(state) = state.upgrade() else {
                    return;
                };
                let (mime, payload) = match parse_data_uri(&data_uri) {
                    Ok(parsed) => parsed,
                    Err(err) => {
                        warn!("Dropped blob produced an unreadable data URI: {}", err);
                        return;
                    }
                };
                if mime != declared_mime {
                    // Non-fatal; the type decoded from the data URI is the
                    // one trusted for storage.
                    warn!(
                        "File type ({}) != data-uri type ({})",
                        declared_mime, mime
                    );
                }
                state.borrow_mut().attachments.add(&key, &mime, &payload);
                let img_md = format!("![attachment:{key}](attachment:{key})");
                editor.borrow_mut().insert_at(pos, &img_md);
            }),
        );
    }

    /// Make this markdown cell a heading of the given level by rewriting
    /// the leading `#` run of the source. Re-renders if the cell was
    /// rendered.
    pub fn set_heading_level(&self, level: u8) {
        let level = level.clamp(1, 6) as usize;
        let was_rendered = self.is_rendered();
        let source = self.get_text();
        let prefix = format!("{} ", "#".repeat(level));
        let rewritten = heading_prefix_regex().replace(&source, prefix.as_str());
        self.set_text(&rewritten);
        self.editor.borrow_mut().refresh();
        if was_rendered {
            self.render();
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
