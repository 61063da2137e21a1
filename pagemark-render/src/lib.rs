use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use image::imageops::FilterType;
use image::DynamicImage;
use pagemark_core::{
    DocumentBackend, DocumentProvider, RenderImage, RenderRequest, SourceFile, SourceKind,
};
use tracing::{debug, instrument};

#[cfg(feature = "pdf")]
mod pdf;

/// Environment variable naming a Pdfium shared library to bind.
pub const PDFIUM_LIBRARY_ENV: &str = "PAGEMARK_PDFIUM_LIBRARY";

/// Opens images with the `image` crate and PDFs with Pdfium.
///
/// Pdfium is bound on the first PDF, so image-only sessions never need the
/// shared library.
pub struct RasterProvider {
    #[cfg(feature = "pdf")]
    pdf: pdf::PdfiumBinding,
    #[cfg(not(feature = "pdf"))]
    _pdfium_library: Option<PathBuf>,
}

impl RasterProvider {
    pub fn new(pdfium_library: Option<PathBuf>) -> Self {
        Self {
            #[cfg(feature = "pdf")]
            pdf: pdf::PdfiumBinding::new(pdfium_library),
            #[cfg(not(feature = "pdf"))]
            _pdfium_library: pdfium_library,
        }
    }

    #[cfg(feature = "pdf")]
    fn open_pdf(&self, source: &SourceFile) -> Result<Arc<dyn DocumentBackend>> {
        Ok(Arc::new(self.pdf.open(source.bytes.clone())?))
    }

    #[cfg(not(feature = "pdf"))]
    fn open_pdf(&self, source: &SourceFile) -> Result<Arc<dyn DocumentBackend>> {
        Err(anyhow!(
            "{} is a PDF but this build has no PDF support",
            source.name
        ))
    }
}

impl Default for RasterProvider {
    fn default() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl DocumentProvider for RasterProvider {
    #[instrument(skip(self, source), fields(name = %source.name))]
    async fn open(&self, source: &SourceFile, kind: SourceKind) -> Result<Arc<dyn DocumentBackend>> {
        debug!(%kind, bytes = source.bytes.len(), "opening source");
        match kind {
            SourceKind::Image => {
                let document = ImageDocument::decode(&source.bytes)
                    .with_context(|| format!("failed to decode image {}", source.name))?;
                Ok(Arc::new(document))
            }
            SourceKind::PaginatedDocument => self.open_pdf(source),
        }
    }
}

/// A single-page document backed by a decoded raster image.
pub struct ImageDocument {
    image: DynamicImage,
}

impl ImageDocument {
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let image = image::load_from_memory(bytes)?;
        Ok(Self { image })
    }

    pub fn from_dynamic(image: DynamicImage) -> Self {
        Self { image }
    }
}

impl DocumentBackend for ImageDocument {
    fn page_count(&self) -> usize {
        1
    }

    #[instrument(skip(self))]
    fn render_page(&self, request: RenderRequest) -> Result<RenderImage> {
        if request.page_index != 0 {
            return Err(anyhow!("page {} out of range", request.page_index));
        }
        let (width, height) = scaled_dimensions(self.image.width(), self.image.height(), request.scale)?;
        let rgba = if (width, height) == (self.image.width(), self.image.height()) {
            self.image.to_rgba8()
        } else {
            self.image
                .resize_exact(width, height, FilterType::Triangle)
                .to_rgba8()
        };
        Ok(RenderImage::from_rgba(rgba))
    }
}

fn scaled_dimensions(width: u32, height: u32, scale: f32) -> Result<(u32, u32)> {
    if !(scale.is_finite() && scale > 0.0) {
        return Err(anyhow!("invalid render scale {scale}"));
    }
    let scale_axis = |extent: u32| -> Result<u32> {
        let scaled = (extent as f64 * f64::from(scale)).round();
        if scaled < 1.0 || scaled > f64::from(u32::MAX) {
            Err(anyhow!("scaled extent {scaled} out of range"))
        } else {
            Ok(scaled as u32)
        }
    };
    Ok((scale_axis(width)?, scale_axis(height)?))
}
