//! In-memory editor buffer
//!
//! The cell never owns its source text — an editor widget does, and the
//! cell talks to it through the [`EditorBuffer`](crate::cell::EditorBuffer)
//! trait. `PlainBuffer` is the bundled implementation: a plain string with a
//! cursor, an undo stack, and layout-refresh/focus bookkeeping. Hosts with a
//! real code-editing widget implement the trait over that widget instead.

use crate::cell::EditorBuffer;

/// A plain in-memory text buffer with cursor and undo history.
#[derive(Debug, Clone, Default)]
pub struct PlainBuffer {
    value: String,
    /// Cursor position as a character offset into `value`.
    cursor: usize,
    undo_stack: Vec<String>,
    refresh_count: u64,
    focused: bool,
}

impl PlainBuffer {
    /// Create a buffer holding `text`, cursor at the end.
    pub fn new(text: &str) -> Self {
        Self {
            value: text.to_string(),
            cursor: text.chars().count(),
            ..Self::default()
        }
    }

    /// Undo the last `set_value`/`insert_at`, if any history remains.
    pub fn undo(&mut self) -> bool {
        match self.undo_stack.pop() {
            Some(previous) => {
                self.cursor = previous.chars().count().min(self.cursor);
                self.value = previous;
                true
            }
            None => false,
        }
    }

    /// How many times the layout has been refreshed.
    pub fn refresh_count(&self) -> u64 {
        self.refresh_count
    }

    /// Whether the buffer currently has input focus.
    pub fn is_focused(&self) -> bool {
        self.focused
    }

    fn byte_offset(&self, char_pos: usize) -> usize {
        self.value
            .char_indices()
            .nth(char_pos)
            .map_or(self.value.len(), |(i, _)| i)
    }
}

impl EditorBuffer for PlainBuffer {
    fn get_value(&self) -> String {
        self.value.clone()
    }

    fn set_value(&mut self, text: &str) {
        self.undo_stack.push(std::mem::take(&mut self.value));
        self.value = text.to_string();
        self.cursor = self.value.chars().count();
    }

    fn clear_undo_history(&mut self) {
        self.undo_stack.clear();
    }

    fn cursor(&self) -> usize {
        self.cursor
    }

    fn set_cursor(&mut self, pos: usize) {
        self.cursor = pos.min(self.value.chars().count());
    }

    fn insert_at(&mut self, pos: usize, text: &str) {
        self.undo_stack.push(self.value.clone());
        let pos = pos.min(self.value.chars().count());
        let at = self.byte_offset(pos);
        self.value.insert_str(at, text);
        self.cursor = pos + text.chars().count();
    }

    fn refresh(&mut self) {
        self.refresh_count += 1;
    }

    fn focus(&mut self) {
        self.focused = true;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
