use std::collections::HashMap;

use image::RgbaImage;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::error::Result;
use crate::history::{History, Snapshot};
use crate::raster::{self, RenderImage};

pub type PageId = Uuid;

/// One page: a write-once background and the mutable annotation layer above it.
#[derive(Debug, Clone)]
pub struct Page {
    pub id: PageId,
    pub index: usize,
    background: RgbaImage,
    pub(crate) annotation: RgbaImage,
}

impl Page {
    fn new(index: usize, background: RgbaImage) -> Self {
        let annotation = RgbaImage::new(background.width(), background.height());
        Self {
            id: Uuid::new_v4(),
            index,
            background,
            annotation,
        }
    }

    pub fn width(&self) -> u32 {
        self.background.width()
    }

    pub fn height(&self) -> u32 {
        self.background.height()
    }

    pub fn background(&self) -> &RgbaImage {
        &self.background
    }

    pub fn annotation(&self) -> &RgbaImage {
        &self.annotation
    }

    pub fn is_blank(&self) -> bool {
        raster::is_fully_transparent(&self.annotation)
    }
}

/// The loaded pages, in document order, and each page's undo history.
#[derive(Debug, Default)]
pub struct Document {
    pages: Vec<Page>,
    histories: HashMap<PageId, History>,
}

impl Document {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds pages from rendered rasters, seeding every history with the
    /// empty annotation layer.
    #[instrument(skip(rasters), fields(pages = rasters.len()))]
    pub fn build(rasters: Vec<RenderImage>) -> Result<Self> {
        let mut pages = Vec::with_capacity(rasters.len());
        let mut histories = HashMap::with_capacity(rasters.len());

        for (index, rendered) in rasters.into_iter().enumerate() {
            let page = Page::new(index, rendered.into_rgba(index)?);
            let mut history = History::new();
            history.push(Snapshot::capture(&page.annotation)?);
            debug!(page = index, width = page.width(), height = page.height(), "page built");
            histories.insert(page.id, history);
            pages.push(page);
        }

        Ok(Self { pages, histories })
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn page(&self, id: PageId) -> Option<&Page> {
        self.pages.iter().find(|page| page.id == id)
    }

    pub fn page_at(&self, index: usize) -> Option<&Page> {
        self.pages.get(index)
    }

    pub fn page_ids(&self) -> Vec<PageId> {
        self.pages.iter().map(|page| page.id).collect()
    }

    pub fn history(&self, id: PageId) -> Option<&History> {
        self.histories.get(&id)
    }

    pub fn history_len(&self, id: PageId) -> usize {
        self.histories.get(&id).map_or(0, History::len)
    }

    /// Mutable access to a page together with its history.
    pub(crate) fn page_and_history_mut(
        &mut self,
        id: PageId,
    ) -> Option<(&mut Page, &mut History)> {
        let page = self.pages.iter_mut().find(|page| page.id == id)?;
        let history = self.histories.entry(id).or_default();
        Some((page, history))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, value: u8) -> RenderImage {
        RenderImage {
            width,
            height,
            pixels: vec![value; (width * height * 4) as usize],
        }
    }

    #[test]
    fn build_seeds_one_blank_snapshot_per_page() {
        let document = Document::build(vec![solid(8, 6, 200), solid(4, 9, 90)]).unwrap();
        assert_eq!(document.len(), 2);
        for page in document.pages() {
            assert!(page.is_blank());
            assert_eq!(page.annotation().dimensions(), page.background().dimensions());
            assert_eq!(document.history_len(page.id), 1);
        }
        assert_eq!(document.page_at(1).unwrap().index, 1);
    }

    #[test]
    fn page_ids_are_unique_and_resolvable() {
        let document = Document::build(vec![solid(2, 2, 0), solid(2, 2, 0)]).unwrap();
        let ids = document.page_ids();
        assert_ne!(ids[0], ids[1]);
        assert_eq!(document.page(ids[1]).unwrap().index, 1);
        assert!(document.page(Uuid::new_v4()).is_none());
        assert_eq!(document.history_len(Uuid::new_v4()), 0);
    }

    #[test]
    fn build_rejects_malformed_rasters() {
        let bad = RenderImage {
            width: 3,
            height: 3,
            pixels: vec![0; 4],
        };
        assert!(Document::build(vec![solid(2, 2, 0), bad]).is_err());
    }

    #[test]
    fn empty_document_has_no_pages() {
        let document = Document::build(Vec::new()).unwrap();
        assert!(document.is_empty());
        assert!(Document::empty().page_at(0).is_none());
    }
}
