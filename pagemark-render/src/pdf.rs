use std::convert::TryFrom;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use once_cell::sync::OnceCell;
use pagemark_core::{DocumentBackend, RenderImage, RenderRequest};
use pdfium_render::prelude::*;
use tracing::{debug, info, instrument};

use crate::PDFIUM_LIBRARY_ENV;

/// Lazily bound Pdfium library shared by every opened PDF.
pub(crate) struct PdfiumBinding {
    library: Option<PathBuf>,
    pdfium: OnceCell<Arc<Pdfium>>,
}

impl PdfiumBinding {
    pub(crate) fn new(library: Option<PathBuf>) -> Self {
        Self {
            library,
            pdfium: OnceCell::new(),
        }
    }

    fn pdfium(&self) -> Result<Arc<Pdfium>> {
        self.pdfium
            .get_or_try_init(|| bind_pdfium(self.library.as_ref()).map(Arc::new))
            .map(Arc::clone)
    }

    pub(crate) fn open(&self, bytes: Vec<u8>) -> Result<PdfiumDocument> {
        let pdfium = self.pdfium()?;
        let page_count = {
            let document = pdfium
                .load_pdf_from_byte_slice(&bytes, None)
                .context("failed to parse PDF")?;
            usize::try_from(document.pages().len()).unwrap_or_default()
        };
        Ok(PdfiumDocument {
            pdfium,
            bytes,
            page_count,
        })
    }
}

/// PDF bytes plus the binding used to rasterize them.
///
/// The document is re-parsed per page so no Pdfium handle outlives a call.
pub(crate) struct PdfiumDocument {
    pdfium: Arc<Pdfium>,
    bytes: Vec<u8>,
    page_count: usize,
}

impl DocumentBackend for PdfiumDocument {
    fn page_count(&self) -> usize {
        self.page_count
    }

    #[instrument(skip(self))]
    fn render_page(&self, request: RenderRequest) -> Result<RenderImage> {
        let document = self
            .pdfium
            .load_pdf_from_byte_slice(&self.bytes, None)
            .context("failed to parse PDF")?;
        let page_index: PdfPageIndex = request
            .page_index
            .try_into()
            .map_err(|_| anyhow!("page {} is out of supported range", request.page_index))?;
        let page = document
            .pages()
            .get(page_index)
            .with_context(|| format!("page {} out of range", request.page_index))?;

        let config = PdfRenderConfig::new().scale_page_by_factor(request.scale.max(0.1));
        let bitmap = page
            .render_with_config(&config)
            .with_context(|| format!("failed to render page {}", request.page_index))?;
        let image = bitmap.as_image().to_rgba8();

        Ok(RenderImage::from_rgba(image))
    }
}

fn bind_pdfium(configured: Option<&PathBuf>) -> Result<Pdfium> {
    let mut errors = Vec::new();

    let mut candidates = Vec::new();
    if let Some(path) = configured {
        candidates.push(path.clone());
    }
    if let Some(path) = std::env::var_os(PDFIUM_LIBRARY_ENV).filter(|path| !path.is_empty()) {
        candidates.push(PathBuf::from(path));
    }
    candidates.push(Pdfium::pdfium_platform_library_name_at_path("./"));

    for path in candidates {
        match Pdfium::bind_to_library(&path) {
            Ok(bindings) => {
                info!(path = %path.display(), "bound Pdfium");
                return Ok(Pdfium::new(bindings));
            }
            Err(err) => {
                debug!(path = %path.display(), %err, "failed to load Pdfium");
                errors.push(format!("{}: {}", path.display(), err));
            }
        }
    }

    match Pdfium::bind_to_system_library() {
        Ok(bindings) => Ok(Pdfium::new(bindings)),
        Err(err) => {
            errors.push(format!("system: {err}"));
            Err(anyhow!(
                "failed to bind to a pdfium library; set {} or install it ({})",
                PDFIUM_LIBRARY_ENV,
                errors.join(", ")
            ))
        }
    }
}
