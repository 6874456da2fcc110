//! notecell — markdown and raw text cells for notebook documents
//!
//! A text cell toggles between an editable source view and a rendered
//! display. Markdown cells run the source through a full pipeline (math
//! isolation, comrak conversion, ammonia sanitization, heading anchors,
//! link targets, `attachment:` image resolution); raw cells pass their
//! content through untouched for downstream converters. Cells persist to
//! the notebook JSON cell shape, with optional garbage collection of
//! unreferenced attachments at save time.
//!
//! The crate is UI-toolkit agnostic. Three seams connect a cell to its
//! surroundings:
//!
//! - [`EditorBuffer`] — the text widget owning the source (a plain
//!   in-memory implementation, [`PlainBuffer`], is bundled),
//! - [`NotebookHost`] — the enclosing notebook surface (focus, typesetting,
//!   deferred actions, blob reads),
//! - [`MarkdownEngine`] / [`Sanitizer`] — the conversion and sanitization
//!   stages of the render pipeline, pluggable per host.
//!
//! Everything is single-threaded and cooperative: asynchronous boundaries
//! (markdown conversion, blob reads) deliver results through `FnOnce`
//! continuations on the same thread, and a cell handle is a cheap clone
//! over shared state so continuations can reach the cell when they resume.
//!
//! ```
//! use notecell::{CellType, TextCell, PlainBuffer, NullHost, RenderPipeline};
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! let cell = TextCell::markdown(
//!     Rc::new(RefCell::new(PlainBuffer::default())),
//!     Rc::new(NullHost),
//!     Rc::new(RenderPipeline::with_defaults()),
//! );
//! cell.set_text("# Hello $x^2$");
//! cell.render();
//! assert!(cell.get_rendered().contains("<h1"));
//! assert!(cell.get_rendered().contains("$x^2$"));
//! ```

pub mod attachments;
pub mod buffer;
pub mod cell;
pub mod error;
pub mod markdown;
pub mod math;
pub mod render;
pub mod sanitize;
pub mod serialize;
pub mod transform;

pub use attachments::{Attachment, AttachmentStore, Blob};
pub use buffer::PlainBuffer;
pub use cell::{CellType, EditorBuffer, NotebookHost, NullHost, TextCell, DEFAULT_CELL_STYLE};
pub use error::{Error, Result, ResultExt};
pub use markdown::{ComrakEngine, MarkdownEngine, MarkdownOptions};
pub use render::RenderPipeline;
pub use sanitize::{AmmoniaSanitizer, Sanitizer};
pub use serialize::{CellData, CellMetadata};
