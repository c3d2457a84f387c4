//! Catalog document ingestion.
//!
//! Pages are read into a source-agnostic [`Page`] model: words with their
//! bounding boxes and embedded raster images with their placement rectangles.
//! All geometry uses page points with a top-left origin (y grows downward), so
//! "below" on the printed page means a larger `y`.

pub mod hash;
pub mod pdf;

use bytes::Bytes;
use serde::Serialize;

use crate::error::ServiceResult;

/// Rectangle on a page, top-left origin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Rect {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl Rect {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Rectangle of the given size centered on `(cx, cy)`.
    #[cfg(test)]
    pub fn centered(cx: f64, cy: f64, width: f64, height: f64) -> Self {
        Self {
            x1: cx - width / 2.0,
            y1: cy - height / 2.0,
            x2: cx + width / 2.0,
            y2: cy + height / 2.0,
        }
    }

    #[cfg(test)]
    pub fn width(&self) -> f64 {
        (self.x2 - self.x1).abs()
    }

    pub fn height(&self) -> f64 {
        (self.y2 - self.y1).abs()
    }

    pub fn center(&self) -> (f64, f64) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    pub fn union(&self, other: &Rect) -> Rect {
        Rect {
            x1: self.x1.min(other.x1),
            y1: self.y1.min(other.y1),
            x2: self.x2.max(other.x2),
            y2: self.y2.max(other.y2),
        }
    }
}

/// A word of page text and where it is printed.
#[derive(Debug, Clone, PartialEq)]
pub struct TextSpan {
    pub text: String,
    pub bounds: Rect,
}

/// An embedded raster image and every rectangle it is drawn into.
#[derive(Debug, Clone)]
pub struct EmbeddedImage {
    /// Stable identifier of the image within its page.
    pub xref: u32,
    /// Encoded image bytes. May be undecodable (rendering artifacts).
    pub bytes: Bytes,
    pub placements: Vec<Rect>,
}

/// One page of a catalog. Immutable once read.
#[derive(Debug, Clone)]
pub struct Page {
    /// 1-based page number
    pub number: u32,
    pub width: f64,
    pub height: f64,
    /// Full page text in reading order
    pub text: String,
    /// Words in text-layout order
    pub spans: Vec<TextSpan>,
    pub images: Vec<EmbeddedImage>,
}

/// A paginated document the extraction engine can walk.
///
/// The document handle is owned by the implementor and released when it is
/// dropped, so every exit path of a run gives it back.
pub trait CatalogDocument {
    fn page_count(&self) -> usize;

    /// Read the page at a 0-based index.
    fn page(&self, index: usize) -> ServiceResult<Page>;
}

impl CatalogDocument for Vec<Page> {
    fn page_count(&self) -> usize {
        self.len()
    }

    fn page(&self, index: usize) -> ServiceResult<Page> {
        self.get(index).cloned().ok_or_else(|| {
            crate::error::ProcessingError::PageRead {
                page: index as u32 + 1,
                reason: "page index out of range".to_string(),
            }
            .into()
        })
    }
}
