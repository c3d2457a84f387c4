//! PDF catalog reading.
//!
//! This module handles:
//! - Binding the PDFium library
//! - Word-level text extraction with page-relative bounding boxes
//! - Embedded image extraction with placement rectangles

pub mod images;
pub mod text;

use std::path::Path;

use pdfium_render::prelude::*;
use tracing::{debug, info};

use crate::error::{ProcessingError, ServiceResult};

use super::{CatalogDocument, Page, Rect};

pub use images::extract_page_images;
pub use text::extract_page_spans;

/// Create a new Pdfium instance (dynamically linked).
///
/// Searches for libpdfium in:
/// 1. Current directory (./libpdfium.so)
/// 2. vendor/pdfium/lib/
/// 3. System library paths
pub fn create_pdfium() -> Result<Pdfium, ProcessingError> {
    // Try local paths first, then system
    let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(
                "./vendor/pdfium/lib/",
            ))
        })
        .or_else(|_| Pdfium::bind_to_system_library())
        .map_err(|e| ProcessingError::PdfiumUnavailable {
            reason: format!("install libpdfium or place it in ./vendor/pdfium/lib/: {:?}", e),
        })?;

    Ok(Pdfium::new(bindings))
}

/// Convert a pdfium rectangle (bottom-left origin) to a top-left page rectangle.
pub(crate) fn pdf_rect_to_rect(rect: &PdfRect, page_height: f64) -> Rect {
    Rect::new(
        rect.left().value as f64,
        page_height - rect.top().value as f64,
        rect.right().value as f64,
        page_height - rect.bottom().value as f64,
    )
}

/// A PDF catalog opened through pdfium.
///
/// The underlying document handle is closed when this value is dropped.
pub struct PdfCatalog<'a> {
    document: PdfDocument<'a>,
}

impl<'a> PdfCatalog<'a> {
    pub fn open(pdfium: &'a Pdfium, path: &Path) -> ServiceResult<Self> {
        let document =
            pdfium
                .load_pdf_from_file(path, None)
                .map_err(|e| ProcessingError::DocumentOpen {
                    path: path.to_path_buf(),
                    reason: format!("{:?}", e),
                })?;

        info!(
            path = %path.display(),
            pages = document.pages().len(),
            "Opened catalog"
        );

        Ok(Self { document })
    }
}

impl CatalogDocument for PdfCatalog<'_> {
    fn page_count(&self) -> usize {
        self.document.pages().len() as usize
    }

    fn page(&self, index: usize) -> ServiceResult<Page> {
        let number = index as u32 + 1;
        let page = self
            .document
            .pages()
            .get(index as u16)
            .map_err(|e| ProcessingError::PageRead {
                page: number,
                reason: format!("{:?}", e),
            })?;

        let width = page.width().value as f64;
        let height = page.height().value as f64;

        let text = page.text().map_err(|e| ProcessingError::PageRead {
            page: number,
            reason: format!("text layer unavailable: {:?}", e),
        })?;
        let full_text = text.all();
        let spans = extract_page_spans(&text, height);
        let images = extract_page_images(&page, height);

        debug!(
            page = number,
            spans = spans.len(),
            images = images.len(),
            "Read catalog page"
        );

        Ok(Page {
            number,
            width,
            height,
            text: full_text,
            spans,
            images,
        })
    }
}
