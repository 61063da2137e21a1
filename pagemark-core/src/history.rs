use std::io::Cursor;

use image::{ImageFormat, RgbaImage};

use crate::error::{AnnotateError, Result};

/// Lossless PNG encoding of an annotation layer at one instant.
#[derive(Clone, PartialEq, Eq)]
pub struct Snapshot {
    encoded: Vec<u8>,
}

impl Snapshot {
    pub fn capture(layer: &RgbaImage) -> Result<Self> {
        let mut encoded = Vec::new();
        layer
            .write_to(&mut Cursor::new(&mut encoded), ImageFormat::Png)
            .map_err(AnnotateError::Snapshot)?;
        Ok(Self { encoded })
    }

    pub fn restore(&self) -> Result<RgbaImage> {
        let decoded = image::load_from_memory_with_format(&self.encoded, ImageFormat::Png)
            .map_err(AnnotateError::Snapshot)?;
        Ok(decoded.to_rgba8())
    }

    pub fn encoded_len(&self) -> usize {
        self.encoded.len()
    }
}

impl std::fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Snapshot")
            .field("encoded_len", &self.encoded.len())
            .finish()
    }
}

/// Undo stack for a single page. Only the top entry is ever restored.
#[derive(Debug, Clone, Default)]
pub struct History {
    entries: Vec<Snapshot>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, snapshot: Snapshot) {
        self.entries.push(snapshot);
    }

    pub fn pop(&mut self) -> Option<Snapshot> {
        self.entries.pop()
    }

    pub fn latest(&self) -> Option<&Snapshot> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn encoded_bytes(&self) -> usize {
        self.entries.iter().map(Snapshot::encoded_len).sum()
    }
}
