//! Persisted cell JSON
//!
//! The on-disk shape of a single text cell:
//!
//! ```json
//! {
//!   "cell_type": "markdown",
//!   "source": "...",
//!   "attachments": { "<key>": { "<mime>": ["<base64>"] } },
//!   "metadata": { "cell_style": "width=100%;" }
//! }
//! ```
//!
//! `attachments` is omitted when empty; unknown metadata keys pass through
//! a load/save round trip untouched. Loading is best-effort: fields that
//! cannot be matched (wrong `cell_type`, missing `source`) are silently
//! skipped and the cell keeps its defaults.

use crate::cell::{TextCell, DEFAULT_CELL_STYLE};
use crate::error::{Result, ResultExt};
use crate::transform;
use log::warn;
use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Persisted Shapes
// ─────────────────────────────────────────────────────────────────────────────

/// A text cell's persisted representation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellData {
    /// `"markdown"` or `"raw"`.
    pub cell_type: String,

    /// Source text. Absent in malformed input; always written on save.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// Attachment mapping, omitted if empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachments: Option<crate::attachments::AttachmentStore>,

    /// Cell metadata.
    #[serde(default)]
    pub metadata: CellMetadata,

    /// Previously rendered HTML, if the writer stored one. Untrusted: it is
    /// sanitized before being used as a provisional display.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rendered: Option<String>,
}

/// Cell metadata; unrecognized keys are preserved round-trip.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CellMetadata {
    /// Per-cell style string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cell_style: Option<String>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl CellData {
    /// An empty payload for `cell_type`: no source, no attachments, default
    /// metadata. Restoring it is a no-op apart from resetting the style.
    pub fn empty(cell_type: &str) -> CellData {
        CellData {
            cell_type: cell_type.to_string(),
            source: None,
            attachments: None,
            metadata: CellMetadata::default(),
            rendered: None,
        }
    }

    /// Serialize to a JSON string.
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize from a JSON string.
    pub fn from_json_str(json: &str) -> Result<CellData> {
        Ok(serde_json::from_str(json)?)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Cell Save / Load
// ─────────────────────────────────────────────────────────────────────────────

impl TextCell {
    /// Serialize this cell.
    ///
    /// The source is persisted as the empty string when it equals the
    /// placeholder — hints are never real content. With `gc_attachments`
    /// the persisted mapping is filtered down to the keys actually
    /// referenced by the rendered source; finding them via a render is
    /// easier than searching the markdown for the several ways an image
    /// can be referenced. The live attachment mapping is never mutated,
    /// only the snapshot is filtered.
    pub fn to_data(&self, gc_attachments: bool) -> CellData {
        let state = self.state.borrow();

        let mut source = self.editor.borrow().get_value();
        if source == state.placeholder {
            source = String::new();
        }

        let attachments = if state.attachments.is_empty() {
            None
        } else if gc_attachments {
            let snapshot = match self.pipeline.render_for_gc(&source, &state.placeholder) {
                Some(html) => {
                    let keys = transform::referenced_attachment_keys(&html);
                    state.attachments.filtered(|k| keys.contains(k))
                }
                // Engine deferred; keep everything rather than lose data.
                None => state.attachments.clone(),
            };
            if snapshot.is_empty() {
                None
            } else {
                Some(snapshot)
            }
        } else {
            Some(state.attachments.clone())
        };

        CellData {
            cell_type: state.cell_type.as_str().to_string(),
            source: Some(source),
            attachments,
            metadata: CellMetadata {
                cell_style: Some(state.cell_style.clone()),
                extra: state.metadata_extra.clone(),
            },
            rendered: None,
        }
    }

    /// Restore this cell from persisted data.
    ///
    /// Only applies when the persisted `cell_type` matches this cell's
    /// variant; otherwise every field is skipped and the cell keeps its
    /// defaults. A restored source resets the undo history (undo cannot go
    /// past the loaded state), installs the sanitized persisted HTML as a
    /// provisional display, and triggers a fresh render.
    pub fn from_data(&self, data: &CellData) {
        if data.cell_type != self.cell_type().as_str() {
            warn!(
                "Skipping restore: persisted cell_type {:?} does not match {:?}",
                data.cell_type,
                self.cell_type().as_str()
            );
            return;
        }

        {
            let mut state = self.state.borrow_mut();
            if let Some(attachments) = &data.attachments {
                state.attachments = attachments.clone();
            }
            state.cell_style = data
                .metadata
                .cell_style
                .clone()
                .unwrap_or_else(|| DEFAULT_CELL_STYLE.to_string());
            state.metadata_extra = data.metadata.extra.clone();
        }

        if let Some(source) = &data.source {
            self.set_text(source);
            self.editor.borrow_mut().clear_undo_history();

            let provisional = data.rendered.as_deref().unwrap_or("");
            let sanitized = self.pipeline.sanitize(provisional);
            {
                let mut state = self.state.borrow_mut();
                state.rendered_html = sanitized;
                state.rendered = false;
            }
            self.render();
        }
    }

    /// Restore this cell from a persisted JSON string.
    ///
    /// Malformed JSON is logged and degrades to restoring an empty payload,
    /// so a corrupt notebook never takes the host down with it.
    pub fn from_json(&self, json: &str) {
        let data = CellData::from_json_str(json).unwrap_or_warn_default(
            CellData::empty(self.cell_type().as_str()),
            "Loading persisted cell JSON",
        );
        self.from_data(&data);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
