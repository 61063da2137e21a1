//! Multi-page annotation engine: page model, per-page undo history, tool
//! state machine, pointer routing and composite export.

mod config;
mod document;
mod engine;
mod error;
mod export;
mod geometry;
mod history;
mod raster;
mod session;
mod source;
mod tool;

pub use config::{
    CheckConfig, Config, PenConfig, TextConfig, DEFAULT_WORKING_SCALE, MAX_GLYPH_SIZE,
};
pub use document::{Document, Page, PageId};
pub use engine::{AnnotationEngine, AnnotationStyle, Effect, UndoOutcome};
pub use error::{AnnotateError, Result};
pub use export::{
    compose_page, encode_jpeg, export_composite, export_file_name, export_jpeg, flatten,
    EXPORT_EXTENSION, EXPORT_QUALITY, JPEG_MAX_DIMENSION,
};
pub use geometry::{DisplayMapping, Point};
pub use history::{History, Snapshot};
pub use raster::{Color, RenderImage};
pub use session::{Command, Session, SessionEvent};
pub use source::{
    DocumentBackend, DocumentProvider, RenderRequest, SourceFile, SourceKind, PDF_CONTENT_TYPE,
};
pub use tool::{SessionState, Tool};
