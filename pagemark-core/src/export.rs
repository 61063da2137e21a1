use image::codecs::jpeg::JpegEncoder;
use image::{imageops, Rgb, RgbImage, RgbaImage};
use rayon::prelude::*;
use tracing::{debug, instrument, warn};

use crate::document::{Document, Page};
use crate::error::{AnnotateError, Result};

pub const EXPORT_QUALITY: u8 = 100;
pub const EXPORT_EXTENSION: &str = "jpg";
/// JPEG stores each dimension in 16 bits.
pub const JPEG_MAX_DIMENSION: u32 = u16::MAX as u32;

/// Background with the annotation layer composited on top.
pub fn compose_page(page: &Page) -> RgbaImage {
    let mut composed = page.background().clone();
    imageops::overlay(&mut composed, page.annotation(), 0, 0);
    composed
}

/// Stacks every page, in order, into one raster.
///
/// Width is the widest page; height is the sum of all page heights. Narrower
/// pages are left-aligned and the space to their right stays transparent.
/// Returns `None` for a document without pages.
#[instrument(skip(document), fields(pages = document.len()))]
pub fn export_composite(document: &Document) -> Option<RgbaImage> {
    if document.is_empty() {
        debug!("nothing to export");
        return None;
    }

    let width = document.pages().iter().map(Page::width).max()?;
    let height = document
        .pages()
        .iter()
        .try_fold(0u32, |total, page| total.checked_add(page.height()));
    let Some(height) = height else {
        warn!("combined page height overflows the output raster");
        return None;
    };

    let bands: Vec<RgbaImage> = document.pages().par_iter().map(compose_page).collect();

    let mut output = RgbaImage::new(width, height);
    let mut offset = 0i64;
    for band in &bands {
        imageops::replace(&mut output, band, 0, offset);
        offset += i64::from(band.height());
    }
    debug!(width, height, "composite assembled");
    Some(output)
}

/// Drops alpha by compositing over black, as a canvas does when saving a JPEG.
pub fn flatten(image: &RgbaImage) -> RgbImage {
    RgbImage::from_fn(image.width(), image.height(), |x, y| {
        let [r, g, b, a] = image.get_pixel(x, y).0;
        let scale = |channel: u8| ((u16::from(channel) * u16::from(a) + 127) / 255) as u8;
        Rgb([scale(r), scale(g), scale(b)])
    })
}

/// Encodes a composite as a maximum-quality JPEG.
pub fn encode_jpeg(image: &RgbaImage) -> Result<Vec<u8>> {
    let (width, height) = image.dimensions();
    if width > JPEG_MAX_DIMENSION || height > JPEG_MAX_DIMENSION {
        warn!(width, height, "composite too large for JPEG");
        return Err(AnnotateError::ExportTooLarge {
            width,
            height,
            limit: JPEG_MAX_DIMENSION,
        });
    }
    let flattened = flatten(image);
    let mut encoded = Vec::new();
    JpegEncoder::new_with_quality(&mut encoded, EXPORT_QUALITY)
        .encode_image(&flattened)
        .map_err(AnnotateError::Encode)?;
    Ok(encoded)
}

/// Composites and encodes the whole document; `None` when it has no pages.
pub fn export_jpeg(document: &Document) -> Result<Option<Vec<u8>>> {
    export_composite(document)
        .map(|composite| encode_jpeg(&composite))
        .transpose()
}

/// The user's file name, or `default_name` when blank, with a `.jpg` extension.
pub fn export_file_name(requested: &str, default_name: &str) -> String {
    let requested = requested.trim();
    let stem = if requested.is_empty() {
        default_name.trim()
    } else {
        requested
    };
    let lower = stem.to_ascii_lowercase();
    if lower.ends_with(".jpg") || lower.ends_with(".jpeg") {
        stem.to_owned()
    } else {
        format!("{stem}.{EXPORT_EXTENSION}")
    }
}
