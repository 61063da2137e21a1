use std::fmt;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result as AnyResult;

use crate::error::{AnnotateError, Result};
use crate::raster::RenderImage;

const PDF_MAGIC: &[u8] = b"%PDF-";
pub const PDF_CONTENT_TYPE: &str = "application/pdf";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Image,
    PaginatedDocument,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Image => f.write_str("image"),
            SourceKind::PaginatedDocument => f.write_str("paginated document"),
        }
    }
}

/// A file handed over by the host, already read into memory.
#[derive(Clone)]
pub struct SourceFile {
    pub name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, content_type: Option<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content_type,
            bytes,
        }
    }

    /// Wraps bytes read from `path`; the type is later sniffed from content.
    pub fn from_path_bytes(path: &Path, bytes: Vec<u8>) -> Self {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self::new(name, None, bytes)
    }

    /// Decides how the file must be rendered.
    ///
    /// A declared content type wins; otherwise the bytes are sniffed.
    pub fn classify(&self) -> Result<SourceKind> {
        if let Some(content_type) = self.content_type.as_deref() {
            let essence = content_type
                .split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase();
            return if essence.starts_with("image/") {
                Ok(SourceKind::Image)
            } else if essence == PDF_CONTENT_TYPE {
                Ok(SourceKind::PaginatedDocument)
            } else {
                Err(AnnotateError::UnsupportedFileType(format!(
                    "{} ({content_type})",
                    self.name
                )))
            };
        }

        if self.bytes.starts_with(PDF_MAGIC) {
            Ok(SourceKind::PaginatedDocument)
        } else if image::guess_format(&self.bytes).is_ok() {
            Ok(SourceKind::Image)
        } else {
            Err(AnnotateError::UnsupportedFileType(self.name.clone()))
        }
    }
}

impl fmt::Debug for SourceFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceFile")
            .field("name", &self.name)
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RenderRequest {
    pub page_index: usize,
    pub scale: f32,
}

/// An opened source that can rasterize its pages.
pub trait DocumentBackend: Send + Sync {
    fn page_count(&self) -> usize;
    fn render_page(&self, request: RenderRequest) -> AnyResult<RenderImage>;
}

#[async_trait::async_trait]
pub trait DocumentProvider: Send + Sync {
    async fn open(&self, source: &SourceFile, kind: SourceKind)
        -> AnyResult<Arc<dyn DocumentBackend>>;
}
