//! Raw cell behavior
//!
//! Raw cells carry content for nbconvert and are never transformed to
//! HTML: the displayed text equals the source (or the placeholder when the
//! source is empty) verbatim. Rendering only substitutes the placeholder
//! and picks a syntax-highlight mode. Raw cells are "hot" — the host wires
//! editor focus/blur to `handle_editor_focus`/`handle_editor_blur`, so the
//! cell toggles on focus change rather than explicit user command.

use super::TextCell;
use regex::Regex;

impl TextCell {
    /// Raw-cell render: placeholder substitution and highlight pick only.
    pub(crate) fn render_raw(&self) {
        if self.editor.borrow().get_value().is_empty() {
            let placeholder = self.placeholder();
            // Written straight into the buffer; `unrender` clears it again
            // so the hint never persists as content.
            self.editor.borrow_mut().set_value(&placeholder);
        }
        self.auto_highlight();
    }

    /// Pick a highlight mode by matching the source against the configured
    /// per-mode patterns. The first matching mode wins; no match clears the
    /// mode.
    pub fn auto_highlight(&self) {
        let source = self.get_text();
        let mut state = self.state.borrow_mut();
        state.highlight_mode = state
            .highlight_modes
            .iter()
            .find(|(_, patterns)| patterns.iter().any(|re| re.is_match(&source)))
            .map(|(mode, _)| mode.clone());
    }

    /// The highlight mode picked by the last `auto_highlight`, if any.
    pub fn highlight_mode(&self) -> Option<String> {
        self.state.borrow().highlight_mode.clone()
    }

    /// Replace the highlight-mode configuration.
    pub fn set_highlight_modes(&self, modes: Vec<(String, Vec<Regex>)>) {
        self.state.borrow_mut().highlight_modes = modes;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
