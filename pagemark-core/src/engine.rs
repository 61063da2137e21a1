use tracing::{debug, trace, warn};

use crate::config::Config;
use crate::document::{Document, PageId};
use crate::error::Result;
use crate::geometry::Point;
use crate::history::Snapshot;
use crate::raster::{self, Color};
use crate::tool::{SessionState, Tool};

/// Fixed stroke parameters for every tool.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationStyle {
    pub pen_width: f32,
    pub pen_color: Color,
    pub check_size: f32,
    pub check_thickness: f32,
    pub check_color: Color,
    pub text_size: f32,
    pub text_color: Color,
}

impl Default for AnnotationStyle {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for AnnotationStyle {
    fn from(config: &Config) -> Self {
        Self {
            pen_width: config.pen.width,
            pen_color: config.pen.color,
            check_size: config.check.size,
            check_thickness: config.check.thickness,
            check_color: config.check.color,
            text_size: config.text.size,
            text_color: config.text.color,
        }
    }
}

/// What a pointer event did to the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Nothing changed.
    Ignored,
    /// The annotation layer changed but no history entry was added.
    Drawn,
    /// A history entry was pushed.
    Committed,
}

impl Effect {
    pub fn changed(self) -> bool {
        !matches!(self, Effect::Ignored)
    }
}

/// What one undo step did to a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UndoOutcome {
    /// Empty history or unknown page; nothing changed.
    Saturated,
    /// The layer now shows the new top snapshot, or is blank.
    Stepped,
    /// The new top snapshot was unreadable and the layer was cleared.
    SnapshotLost(String),
}

impl UndoOutcome {
    pub fn changed(&self) -> bool {
        !matches!(self, UndoOutcome::Saturated)
    }
}

#[derive(Debug, Clone, Copy)]
struct ActiveStroke {
    page: PageId,
    last: Point,
}

/// Routes pointer input through the active tool onto page annotation layers
/// and keeps each page's history in step.
#[derive(Debug, Default)]
pub struct AnnotationEngine {
    style: AnnotationStyle,
    stroke: Option<ActiveStroke>,
}

impl AnnotationEngine {
    pub fn new(style: AnnotationStyle) -> Self {
        Self {
            style,
            stroke: None,
        }
    }

    pub fn style(&self) -> &AnnotationStyle {
        &self.style
    }

    pub fn is_drawing(&self) -> bool {
        self.stroke.is_some()
    }

    pub fn pointer_down(
        &mut self,
        state: &SessionState,
        document: &Document,
        page: PageId,
        position: Point,
    ) -> Effect {
        if !state.ready || !state.tool.is_pen() || document.page(page).is_none() {
            return Effect::Ignored;
        }
        trace!(%page, x = position.x, y = position.y, "stroke started");
        self.stroke = Some(ActiveStroke {
            page,
            last: position,
        });
        Effect::Ignored
    }

    pub fn pointer_move(
        &mut self,
        state: &SessionState,
        document: &mut Document,
        page: PageId,
        position: Point,
    ) -> Effect {
        if !state.tool.is_pen() {
            return Effect::Ignored;
        }
        let Some(stroke) = self.stroke.as_mut().filter(|stroke| stroke.page == page) else {
            return Effect::Ignored;
        };
        let Some((target, _)) = document.page_and_history_mut(page) else {
            self.stroke = None;
            return Effect::Ignored;
        };
        raster::stroke_polyline(
            &mut target.annotation,
            &[stroke.last, position],
            self.style.pen_width,
            self.style.pen_color,
        );
        stroke.last = position;
        Effect::Drawn
    }

    /// Ends the stroke on `page`, committing it as one history entry.
    pub fn pointer_up(
        &mut self,
        state: &SessionState,
        document: &mut Document,
        page: PageId,
    ) -> Result<Effect> {
        if !state.tool.is_pen() {
            return Ok(Effect::Ignored);
        }
        match self.stroke {
            Some(stroke) if stroke.page == page => {
                self.stroke = None;
                commit(document, page)
            }
            _ => Ok(Effect::Ignored),
        }
    }

    /// The pointer left the page surface; any stroke on it ends and commits.
    pub fn pointer_leave(
        &mut self,
        state: &SessionState,
        document: &mut Document,
        page: PageId,
    ) -> Result<Effect> {
        self.pointer_up(state, document, page)
    }

    pub fn pointer_click(
        &mut self,
        state: &SessionState,
        document: &mut Document,
        page: PageId,
        position: Point,
    ) -> Result<Effect> {
        if !state.ready {
            return Ok(Effect::Ignored);
        }
        let Some((target, _)) = document.page_and_history_mut(page) else {
            return Ok(Effect::Ignored);
        };
        match &state.tool {
            Tool::Pen => return Ok(Effect::Ignored),
            Tool::CheckMark => {
                let half = self.style.check_size / 2.0;
                let quarter = self.style.check_size / 4.0;
                let glyph = [
                    position.offset(-half, quarter),
                    position.offset(0.0, half),
                    position.offset(half, -half),
                ];
                raster::stroke_polyline(
                    &mut target.annotation,
                    &glyph,
                    self.style.check_thickness,
                    self.style.check_color,
                );
            }
            Tool::TextStamp(text) => {
                if text.trim().is_empty() {
                    return Ok(Effect::Ignored);
                }
                raster::draw_text(
                    &mut target.annotation,
                    position,
                    text,
                    self.style.text_size,
                    self.style.text_color,
                );
            }
        }
        commit(document, page)
    }

    /// Drops the in-progress stroke without committing it.
    pub fn abandon_stroke(&mut self) -> bool {
        match self.stroke.take() {
            Some(stroke) => {
                debug!(page = %stroke.page, "abandoned uncommitted stroke");
                true
            }
            None => false,
        }
    }

    /// Pops one history entry of `page` and restores the layer beneath it.
    ///
    /// Saturates: with an empty history nothing happens.
    pub fn undo_page(&mut self, document: &mut Document, page: PageId) -> UndoOutcome {
        if self.stroke.is_some_and(|stroke| stroke.page == page) {
            self.abandon_stroke();
        }
        let Some((target, history)) = document.page_and_history_mut(page) else {
            return UndoOutcome::Saturated;
        };
        if history.pop().is_none() {
            return UndoOutcome::Saturated;
        }
        let outcome = match history.latest().map(Snapshot::restore) {
            None => {
                raster::clear(&mut target.annotation);
                UndoOutcome::Stepped
            }
            Some(Ok(layer)) if layer.dimensions() == target.annotation.dimensions() => {
                target.annotation = layer;
                UndoOutcome::Stepped
            }
            Some(Ok(layer)) => {
                let (width, height) = layer.dimensions();
                warn!(%page, width, height, "snapshot size mismatch; clearing layer");
                raster::clear(&mut target.annotation);
                UndoOutcome::SnapshotLost(format!(
                    "snapshot is {width}x{height}, page is {}x{}",
                    target.annotation.width(),
                    target.annotation.height()
                ))
            }
            Some(Err(err)) => {
                warn!(%page, %err, "failed to restore snapshot; clearing layer");
                raster::clear(&mut target.annotation);
                UndoOutcome::SnapshotLost(err.to_string())
            }
        };
        debug!(%page, remaining = history.len(), "undo");
        outcome
    }

    /// Undoes one step on every page independently; returns the pages that changed.
    pub fn undo_all(&mut self, document: &mut Document) -> Vec<(PageId, UndoOutcome)> {
        self.abandon_stroke();
        document
            .page_ids()
            .into_iter()
            .map(|page| (page, self.undo_page(document, page)))
            .filter(|(_, outcome)| outcome.changed())
            .collect()
    }
}

fn commit(document: &mut Document, page: PageId) -> Result<Effect> {
    let Some((target, history)) = document.page_and_history_mut(page) else {
        return Ok(Effect::Ignored);
    };
    history.push(Snapshot::capture(&target.annotation)?);
    debug!(%page, depth = history.len(), "committed annotation");
    Ok(Effect::Committed)
}
