use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, instrument, warn};

use crate::config::Config;
use crate::document::{Document, Page, PageId};
use crate::engine::{AnnotationEngine, AnnotationStyle, Effect, UndoOutcome};
use crate::error::{AnnotateError, Result};
use crate::export;
use crate::geometry::Point;
use crate::source::{DocumentProvider, RenderRequest, SourceFile};
use crate::tool::{SessionState, Tool};

#[derive(Debug, Clone)]
pub enum Command {
    SelectPen,
    SelectCheckMark,
    SelectQuickStamp { index: usize },
    SubmitCustomText { text: String },
    Undo,
    NextPage { count: usize },
    PrevPage { count: usize },
    GotoPage { page: usize },
    Reset,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    DocumentLoaded { pages: usize },
    LoadFailed { reason: String },
    DocumentCleared,
    ToolChanged(Tool),
    FocusChanged { page: usize },
    RedrawNeeded(PageId),
    /// Undo met an unreadable snapshot; the page's layer was cleared.
    SnapshotLost { page: PageId, reason: String },
}

/// One annotation session: the loaded document, the active tool and the
/// engine that applies pointer input.
pub struct Session {
    document: Document,
    state: SessionState,
    engine: AnnotationEngine,
    working_scale: f32,
    quick_stamps: Vec<String>,
    events: Arc<Mutex<Vec<SessionEvent>>>,
}

impl Session {
    pub fn new(config: &Config) -> Self {
        Self {
            document: Document::empty(),
            state: SessionState::default(),
            engine: AnnotationEngine::new(AnnotationStyle::from(config)),
            working_scale: config.working_scale,
            quick_stamps: config.quick_stamps.clone(),
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn events(&self) -> Arc<Mutex<Vec<SessionEvent>>> {
        Arc::clone(&self.events)
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn tool(&self) -> &Tool {
        &self.state.tool
    }

    pub fn quick_stamps(&self) -> &[String] {
        &self.quick_stamps
    }

    pub fn is_ready(&self) -> bool {
        self.state.ready
    }

    pub fn current_page(&self) -> Option<&Page> {
        self.document.page_at(self.state.current_page)
    }

    /// Renders every page of `source` and replaces the current document.
    ///
    /// On failure the previous document is kept but the surface is marked
    /// not ready until a load succeeds.
    #[instrument(skip(self, provider, source), fields(name = %source.name))]
    pub async fn load_with<P: DocumentProvider>(
        &mut self,
        provider: &P,
        source: SourceFile,
    ) -> Result<()> {
        match self.build_document(provider, &source).await {
            Ok(document) => {
                let pages = document.len();
                self.engine.abandon_stroke();
                self.document = document;
                self.state.current_page = 0;
                self.state.ready = true;
                info!(pages, "document loaded");
                self.push_event(SessionEvent::DocumentLoaded { pages });
                Ok(())
            }
            Err(err) => {
                warn!(%err, "document load failed");
                self.state.ready = false;
                self.push_event(SessionEvent::LoadFailed {
                    reason: err.to_string(),
                });
                Err(err)
            }
        }
    }

    async fn build_document<P: DocumentProvider>(
        &self,
        provider: &P,
        source: &SourceFile,
    ) -> Result<Document> {
        let kind = source.classify()?;
        let backend = provider
            .open(source, kind)
            .await
            .map_err(|err| AnnotateError::RenderFailure(format!("{err:#}")))?;

        let mut rasters = Vec::with_capacity(backend.page_count());
        for page_index in 0..backend.page_count() {
            let request = RenderRequest {
                page_index,
                scale: self.working_scale,
            };
            let raster = backend.render_page(request).map_err(|err| {
                AnnotateError::RenderFailure(format!("page {}: {err:#}", page_index + 1))
            })?;
            rasters.push(raster);
        }
        Document::build(rasters)
    }

    pub fn apply(&mut self, command: Command) -> Result<()> {
        match command {
            Command::SelectPen => self.select_tool(Tool::Pen),
            Command::SelectCheckMark => self.select_tool(Tool::CheckMark),
            Command::SelectQuickStamp { index } => {
                if let Some(name) = self.quick_stamps.get(index).cloned() {
                    self.select_tool(Tool::text_stamp(name));
                }
            }
            Command::SubmitCustomText { text } => self.select_tool(Tool::text_stamp(text)),
            Command::Undo => self.undo_all(),
            Command::NextPage { count } => {
                let last = self.document.len().saturating_sub(1);
                self.focus((self.state.current_page.saturating_add(count)).min(last));
            }
            Command::PrevPage { count } => {
                self.focus(self.state.current_page.saturating_sub(count));
            }
            Command::GotoPage { page } => {
                self.focus(page.min(self.document.len().saturating_sub(1)));
            }
            Command::Reset => {
                self.engine.abandon_stroke();
                self.document = Document::empty();
                self.state.current_page = 0;
                self.state.ready = false;
                self.push_event(SessionEvent::DocumentCleared);
            }
        }
        Ok(())
    }

    /// Switches tools; an unfinished pen stroke is dropped uncommitted.
    pub fn select_tool(&mut self, tool: Tool) {
        if self.state.tool == tool {
            return;
        }
        self.engine.abandon_stroke();
        self.state.tool = tool.clone();
        self.push_event(SessionEvent::ToolChanged(tool));
    }

    pub fn pointer_down(&mut self, page: PageId, position: Point) {
        self.engine
            .pointer_down(&self.state, &self.document, page, position);
    }

    pub fn pointer_move(&mut self, page: PageId, position: Point) {
        let effect = self
            .engine
            .pointer_move(&self.state, &mut self.document, page, position);
        self.note(page, effect);
    }

    pub fn pointer_up(&mut self, page: PageId) -> Result<()> {
        let effect = self
            .engine
            .pointer_up(&self.state, &mut self.document, page)?;
        self.note(page, effect);
        Ok(())
    }

    pub fn pointer_leave(&mut self, page: PageId) -> Result<()> {
        let effect = self
            .engine
            .pointer_leave(&self.state, &mut self.document, page)?;
        self.note(page, effect);
        Ok(())
    }

    pub fn pointer_click(&mut self, page: PageId, position: Point) -> Result<()> {
        let effect =
            self.engine
                .pointer_click(&self.state, &mut self.document, page, position)?;
        self.note(page, effect);
        Ok(())
    }

    pub fn undo_page(&mut self, page: PageId) {
        let outcome = self.engine.undo_page(&mut self.document, page);
        self.note_undo(page, outcome);
    }

    /// The undo control: one step back on every page.
    pub fn undo_all(&mut self) {
        for (page, outcome) in self.engine.undo_all(&mut self.document) {
            self.note_undo(page, outcome);
        }
    }

    pub fn export_jpeg(&self) -> Result<Option<Vec<u8>>> {
        export::export_jpeg(&self.document)
    }

    fn focus(&mut self, page: usize) {
        if page != self.state.current_page {
            self.state.current_page = page;
            self.push_event(SessionEvent::FocusChanged { page });
        }
    }

    fn note(&self, page: PageId, effect: Effect) {
        if effect.changed() {
            self.push_event(SessionEvent::RedrawNeeded(page));
        }
    }

    fn note_undo(&self, page: PageId, outcome: UndoOutcome) {
        if let UndoOutcome::SnapshotLost(reason) = &outcome {
            self.push_event(SessionEvent::SnapshotLost {
                page,
                reason: reason.clone(),
            });
        }
        if outcome.changed() {
            self.push_event(SessionEvent::RedrawNeeded(page));
        }
    }

    fn push_event(&self, event: SessionEvent) {
        self.events.lock().push(event);
    }
}
