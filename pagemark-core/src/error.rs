use thiserror::Error;

/// Failures the annotation core reports to its host.
///
/// Saturated undo and exporting an empty document are deliberately absent:
/// both are silent no-ops.
#[derive(Debug, Error)]
pub enum AnnotateError {
    #[error("unsupported file type: {0}")]
    UnsupportedFileType(String),

    #[error("failed to render document: {0}")]
    RenderFailure(String),

    #[error("page {index} has an invalid raster: {reason}")]
    InvalidRaster { index: usize, reason: String },

    #[error("history snapshot failed: {0}")]
    Snapshot(#[source] image::ImageError),

    #[error(
        "export of {width}x{height} px exceeds the JPEG limit of {limit} px per side; \
         lower working_scale or split the document"
    )]
    ExportTooLarge { width: u32, height: u32, limit: u32 },

    #[error("failed to encode export: {0}")]
    Encode(#[source] image::ImageError),

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, AnnotateError>;
