//! Text cell state machine
//!
//! A text cell toggles between an editable source view and a rendered view.
//! Two variants exist: markdown cells run the full render pipeline; raw
//! cells only substitute the placeholder and pick a highlight mode. The
//! shared core here owns the mode flag, the rendered-HTML cache and the
//! attachment store; the source text itself is owned by the editor widget
//! and reached only through [`EditorBuffer`].
//!
//! Transitions are idempotent guards, not errors: calling `render()` twice
//! is safe and simply a no-op the second time.
//!
//! Everything is single-threaded and cooperative. The handle is a cheap
//! clone over shared state so continuations resumed after an asynchronous
//! boundary (markdown conversion, blob read, deferred anchor re-render) can
//! reach the cell again — provided it still exists.

mod markdown;
mod raw;

use crate::attachments::{encode_data_uri, AttachmentStore, Blob};
use crate::render::RenderPipeline;
use regex::Regex;
use std::cell::RefCell;
use std::rc::Rc;

// ─────────────────────────────────────────────────────────────────────────────
// Cell Types and Defaults
// ─────────────────────────────────────────────────────────────────────────────

/// The closed set of text cell variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellType {
    Markdown,
    Raw,
}

impl CellType {
    /// The `cell_type` string used in persisted cell JSON.
    pub fn as_str(self) -> &'static str {
        match self {
            CellType::Markdown => "markdown",
            CellType::Raw => "raw",
        }
    }

    /// Variant-specific hint shown when the source is empty.
    pub fn default_placeholder(self) -> &'static str {
        match self {
            CellType::Markdown => "Type *Markdown* and LaTeX: $\\alpha^2$",
            CellType::Raw => {
                "Write raw LaTeX or other formats here, for use with nbconvert. \
                 It will not be rendered in the notebook. \
                 When passing through nbconvert, a Raw Cell's content is added to the output unmodified."
            }
        }
    }
}

/// Default per-cell style string.
pub const DEFAULT_CELL_STYLE: &str = "width=100%;";

// ─────────────────────────────────────────────────────────────────────────────
// Collaborator Interfaces
// ─────────────────────────────────────────────────────────────────────────────

/// The editable text widget that owns the cell's source.
///
/// The cell never stores a duplicate copy of the source as its own truth;
/// it reads and writes through this interface. Cursor positions are
/// character offsets.
pub trait EditorBuffer {
    /// Current source text.
    fn get_value(&self) -> String;
    /// Replace the source text.
    fn set_value(&mut self, text: &str);
    /// Drop the undo history, making the current value the earliest
    /// undoable state.
    fn clear_undo_history(&mut self);
    /// Current cursor position.
    fn cursor(&self) -> usize;
    /// Move the cursor.
    fn set_cursor(&mut self, pos: usize);
    /// Insert text at a position captured earlier.
    fn insert_at(&mut self, pos: usize, text: &str);
    /// Re-run layout; the widget may have been hidden while the cell was
    /// rendered.
    fn refresh(&mut self);
    /// Give the widget input focus.
    fn focus(&mut self);
}

/// The host notebook's surface, as seen by a single cell.
///
/// All methods have no-op (or synchronous) defaults so minimal hosts only
/// implement what they observe.
pub trait NotebookHost {
    /// Enable or disable the host's "insert image" affordance.
    fn set_insert_image_enabled(&self, _enabled: bool) {}

    /// Trigger a math-typesetting pass over freshly installed HTML.
    fn typeset(&self, _html: &str) {}

    /// A markdown cell finished rendering.
    fn cell_rendered(&self, _cell: &TextCell) {}

    /// Run `action` after a short delay. Used by anchor-link clicks to force
    /// re-resolution after any live re-layout. The default runs it
    /// immediately.
    fn defer(&self, action: Box<dyn FnOnce()>) {
        action();
    }

    /// Read a blob into a base64 data URI, delivering the result through
    /// `done`. The default encodes synchronously; a browser host would wire
    /// this to its asynchronous file reader.
    fn read_blob(&self, blob: Blob, done: Box<dyn FnOnce(String)>) {
        done(encode_data_uri(&blob.mime, &blob.data));
    }
}

/// A host that observes nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullHost;

impl NotebookHost for NullHost {}

// ─────────────────────────────────────────────────────────────────────────────
// Cell State
// ─────────────────────────────────────────────────────────────────────────────

pub(crate) struct CellState {
    pub(crate) cell_type: CellType,
    pub(crate) rendered: bool,
    pub(crate) rendered_html: String,
    pub(crate) attachments: AttachmentStore,
    pub(crate) cell_style: String,
    /// Metadata keys this crate does not interpret, preserved verbatim
    /// across load/save.
    pub(crate) metadata_extra: serde_json::Map<String, serde_json::Value>,
    pub(crate) placeholder: String,
    /// Bumped on every markdown render; completions carrying an older
    /// generation are discarded so the latest request always wins.
    pub(crate) render_generation: u64,
    /// Raw cells: mode picked by `auto_highlight`, keyed into
    /// `highlight_modes`.
    pub(crate) highlight_mode: Option<String>,
    pub(crate) highlight_modes: Vec<(String, Vec<Regex>)>,
}

fn default_highlight_modes() -> Vec<(String, Vec<Regex>)> {
    // Known-good literal pattern.
    vec![("diff".to_string(), vec![Regex::new("^diff").unwrap()])]
}

// ─────────────────────────────────────────────────────────────────────────────
// Text Cell Handle
// ─────────────────────────────────────────────────────────────────────────────

/// A markdown or raw text cell.
///
/// Cloning the handle is cheap and shares the same cell.
#[derive(Clone)]
pub struct TextCell {
    pub(crate) state: Rc<RefCell<CellState>>,
    pub(crate) editor: Rc<RefCell<dyn EditorBuffer>>,
    pub(crate) host: Rc<dyn NotebookHost>,
    pub(crate) pipeline: Rc<RenderPipeline>,
}

impl TextCell {
    /// Create a cell of the given variant over its collaborators.
    pub fn new(
        cell_type: CellType,
        editor: Rc<RefCell<dyn EditorBuffer>>,
        host: Rc<dyn NotebookHost>,
        pipeline: Rc<RenderPipeline>,
    ) -> Self {
        Self {
            state: Rc::new(RefCell::new(CellState {
                cell_type,
                rendered: false,
                rendered_html: String::new(),
                attachments: AttachmentStore::default(),
                cell_style: DEFAULT_CELL_STYLE.to_string(),
                metadata_extra: serde_json::Map::new(),
                placeholder: cell_type.default_placeholder().to_string(),
                render_generation: 0,
                highlight_mode: None,
                highlight_modes: default_highlight_modes(),
            })),
            editor,
            host,
            pipeline,
        }
    }

    /// Convenience constructor for a markdown cell.
    pub fn markdown(
        editor: Rc<RefCell<dyn EditorBuffer>>,
        host: Rc<dyn NotebookHost>,
        pipeline: Rc<RenderPipeline>,
    ) -> Self {
        Self::new(CellType::Markdown, editor, host, pipeline)
    }

    /// Convenience constructor for a raw cell.
    pub fn raw(
        editor: Rc<RefCell<dyn EditorBuffer>>,
        host: Rc<dyn NotebookHost>,
        pipeline: Rc<RenderPipeline>,
    ) -> Self {
        Self::new(CellType::Raw, editor, host, pipeline)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    /// This cell's variant.
    pub fn cell_type(&self) -> CellType {
        self.state.borrow().cell_type
    }

    /// Whether the cell is currently in rendered mode.
    pub fn is_rendered(&self) -> bool {
        self.state.borrow().rendered
    }

    /// Current source text, read from the editor widget.
    pub fn get_text(&self) -> String {
        self.editor.borrow().get_value()
    }

    /// Replace the source text. Leaves the cell unrendered and refreshes
    /// the editor layout.
    pub fn set_text(&self, text: &str) {
        self.editor.borrow_mut().set_value(text);
        self.unrender();
        self.editor.borrow_mut().refresh();
    }

    /// The cached rendered display HTML.
    pub fn get_rendered(&self) -> String {
        self.state.borrow().rendered_html.clone()
    }

    /// Install display HTML directly. Callers are responsible for
    /// sanitizing untrusted input first.
    pub fn set_rendered(&self, html: &str) {
        self.state.borrow_mut().rendered_html = html.to_string();
    }

    /// The placeholder hint for this cell.
    pub fn placeholder(&self) -> String {
        self.state.borrow().placeholder.clone()
    }

    /// Per-cell style string from metadata.
    pub fn cell_style(&self) -> String {
        self.state.borrow().cell_style.clone()
    }

    /// Snapshot of the attachment mapping (deep copy; attachments are never
    /// shared across cells).
    pub fn attachments(&self) -> AttachmentStore {
        self.state.borrow().attachments.clone()
    }

    /// Add a new attachment to this cell, replacing any existing entry
    /// under the same key.
    pub fn add_attachment(&self, key: &str, mime_type: &str, b64_data: &str) {
        self.state
            .borrow_mut()
            .attachments
            .add(key, mime_type, b64_data);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // State Machine
    // ─────────────────────────────────────────────────────────────────────────

    /// Transition from editing to rendered mode.
    ///
    /// Returns false (declining, not failing) when already rendered.
    pub fn render(&self) -> bool {
        {
            let mut state = self.state.borrow_mut();
            if state.rendered {
                return false;
            }
            state.rendered = true;
        }
        match self.cell_type() {
            CellType::Markdown => self.start_markdown_render(),
            CellType::Raw => self.render_raw(),
        }
        true
    }

    /// Transition from rendered back to editing mode.
    ///
    /// If the current source equals the placeholder, the source is cleared
    /// so the hint never persists as literal content. The editor layout is
    /// refreshed afterwards — the widget may have been hidden while the
    /// cell was rendered.
    pub fn unrender(&self) -> bool {
        if self.cell_type() == CellType::Markdown {
            // Editing markdown source is when image insertion makes sense.
            self.host.set_insert_image_enabled(true);
        }
        {
            let mut state = self.state.borrow_mut();
            if !state.rendered {
                return false;
            }
            state.rendered = false;
        }
        let placeholder = self.placeholder();
        {
            let mut editor = self.editor.borrow_mut();
            if editor.get_value() == placeholder {
                editor.set_value("");
            }
            editor.refresh();
        }
        true
    }

    /// Text cells have no "run code" semantics; executing one only toggles
    /// the display.
    pub fn execute(&self) {
        self.render();
    }

    /// The host selected this cell.
    pub fn select(&self) {
        let rendered = self.is_rendered();
        if !rendered {
            self.editor.borrow_mut().refresh();
        }
        if self.cell_type() == CellType::Markdown {
            self.host.set_insert_image_enabled(!rendered);
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Host Event Handlers
    // ─────────────────────────────────────────────────────────────────────────

    /// Double-click on the rendered display: markdown cells drop back to
    /// editing and focus the editor.
    pub fn handle_double_click(&self) {
        if self.cell_type() == CellType::Markdown && self.unrender() {
            self.editor.borrow_mut().focus();
        }
    }

    /// The editor widget received input focus. Raw cells are always "hot":
    /// focusing the editor re-enters editing mode.
    pub fn handle_editor_focus(&self) {
        if self.cell_type() == CellType::Raw {
            self.unrender();
        }
    }

    /// The editor widget lost input focus. Raw cells re-render (placeholder
    /// substitution and highlight pick) on blur.
    pub fn handle_editor_blur(&self) {
        if self.cell_type() == CellType::Raw {
            self.auto_highlight();
            self.render();
        }
    }

    /// A heading anchor link was clicked. The cell re-renders after a short
    /// host-scheduled delay to force anchor re-resolution after any live
    /// re-layout.
    pub fn handle_anchor_click(&self) {
        let cell = self.clone();
        self.host.defer(Box::new(move || {
            cell.unrender();
            cell.render();
        }));
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::buffer::PlainBuffer;
    use std::cell::Cell;

    /// Host that records every observation, for asserting side effects.
    #[derive(Default)]
    pub(crate) struct RecordingHost {
        pub insert_image_enabled: Cell<Option<bool>>,
        pub typeset_count: Cell<u32>,
        pub rendered_count: Cell<u32>,
        pub deferred: RefCell<Vec<Box<dyn FnOnce()>>>,
    }

    impl RecordingHost {
        pub fn run_deferred(&self) {
            let drained: Vec<_> = self.deferred.borrow_mut().drain(..).collect();
            for action in drained {
                action();
            }
        }
    }

    impl NotebookHost for RecordingHost {
        fn set_insert_image_enabled(&self, enabled: bool) {
            self.insert_image_enabled.set(Some(enabled));
        }

        fn typeset(&self, _html: &str) {
            self.typeset_count.set(self.typeset_count.get() + 1);
        }

        fn cell_rendered(&self, _cell: &TextCell) {
            self.rendered_count.set(self.rendered_count.get() + 1);
        }

        fn defer(&self, action: Box<dyn FnOnce()>) {
            self.deferred.borrow_mut().push(action);
        }
    }

    pub(crate) struct Fixture {
        pub cell: TextCell,
        pub editor: Rc<RefCell<PlainBuffer>>,
        pub host: Rc<RecordingHost>,
    }

    pub(crate) fn fixture(cell_type: CellType) -> Fixture {
        let editor = Rc::new(RefCell::new(PlainBuffer::default()));
        let host = Rc::new(RecordingHost::default());
        let cell = TextCell::new(
            cell_type,
            Rc::clone(&editor) as Rc<RefCell<dyn EditorBuffer>>,
            Rc::clone(&host) as Rc<dyn NotebookHost>,
            Rc::new(RenderPipeline::with_defaults()),
        );
        Fixture { cell, editor, host }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Transition Tests
    // ─────────────────────────────────────────────────────────────────────────

    #[test]
    fn test_render_unrender_round_trip() {
        let f = fixture(CellType::Markdown);
        f.cell.set_text("# Hi");

        assert!(f.cell.render());
        assert!(f.cell.is_rendered());
        assert!(f.cell.unrender());
        assert!(!f.cell.is_rendered());
        assert!(f.cell.render());
        assert!(f.cell.is_rendered());
    }

    #[test]
    fn test_render_twice_is_noop() {
        let f = fixture(CellType::Markdown);
        f.cell.set_text("x");
        assert!(f.cell.render());
        assert!(!f.cell.render());
        assert!(f.cell.is_rendered());
    }

    #[test]
    fn test_unrender_when_editing_is_noop() {
        let f = fixture(CellType::Markdown);
        assert!(!f.cell.unrender());
        assert!(!f.cell.is_rendered());
    }

    #[test]
    fn test_execute_is_render_alias() {
        let f = fixture(CellType::Markdown);
        f.cell.set_text("x");
        f.cell.execute();
        assert!(f.cell.is_rendered());
    }

    #[test]
    fn test_unrender_clears_placeholder_source() {
        let f = fixture(CellType::Markdown);
        f.cell.render();
        // Empty source renders the placeholder; a raw-cell-style host may
        // then write the hint back into the buffer. Simulate that and make
        // sure it never persists as literal content.
        f.editor
            .borrow_mut()
            .set_value(CellType::Markdown.default_placeholder());
        f.cell.unrender();
        assert_eq!(f.cell.get_text(), "");
    }

    #[test]
    fn test_unrender_refreshes_editor_layout() {
        let f = fixture(CellType::Markdown);
        f.cell.set_text("x");
        f.cell.render();
        let before = f.editor.borrow().refresh_count();
        f.cell.unrender();
        assert!(f.editor.borrow().refresh_count() > before);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Selection and Event Tests
    // ─────────────────────────────────────────────────────────────────────────

    #[test]
    fn test_select_while_editing_enables_image_insert() {
        let f = fixture(CellType::Markdown);
        f.cell.select();
        assert_eq!(f.host.insert_image_enabled.get(), Some(true));
    }

    #[test]
    fn test_select_while_rendered_disables_image_insert() {
        let f = fixture(CellType::Markdown);
        f.cell.set_text("x");
        f.cell.render();
        f.cell.select();
        assert_eq!(f.host.insert_image_enabled.get(), Some(false));
    }

    #[test]
    fn test_select_raw_cell_leaves_image_insert_alone() {
        let f = fixture(CellType::Raw);
        f.cell.select();
        assert_eq!(f.host.insert_image_enabled.get(), None);
    }

    #[test]
    fn test_double_click_unrenders_and_focuses() {
        let f = fixture(CellType::Markdown);
        f.cell.set_text("x");
        f.cell.render();
        f.cell.handle_double_click();
        assert!(!f.cell.is_rendered());
        assert!(f.editor.borrow().is_focused());
    }

    #[test]
    fn test_double_click_on_raw_cell_does_nothing() {
        let f = fixture(CellType::Raw);
        f.cell.set_text("x");
        f.cell.render();
        f.cell.handle_double_click();
        assert!(f.cell.is_rendered());
    }

    #[test]
    fn test_anchor_click_rerenders_via_host_defer() {
        let f = fixture(CellType::Markdown);
        f.cell.set_text("# T");
        f.cell.render();
        let generation_before = f.cell.state.borrow().render_generation;

        f.cell.handle_anchor_click();
        // Nothing happens until the host runs the deferred action.
        assert!(f.cell.is_rendered());
        assert_eq!(f.cell.state.borrow().render_generation, generation_before);

        f.host.run_deferred();
        assert!(f.cell.is_rendered());
        assert!(f.cell.state.borrow().render_generation > generation_before);
    }

    #[test]
    fn test_set_text_unrenders() {
        let f = fixture(CellType::Markdown);
        f.cell.set_text("a");
        f.cell.render();
        f.cell.set_text("b");
        assert!(!f.cell.is_rendered());
        assert_eq!(f.cell.get_text(), "b");
    }

    #[test]
    fn test_add_attachment_replaces_key() {
        let f = fixture(CellType::Markdown);
        f.cell.add_attachment("a", "image/png", "one");
        f.cell.add_attachment("a", "image/gif", "two");
        let store = f.cell.attachments();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("a").unwrap().mime, "image/gif");
    }
}
