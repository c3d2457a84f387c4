//! Word-level text extraction.
//!
//! pdfium exposes text as individual characters with bounds. Characters are
//! merged into words so product codes printed as a single token come out as one
//! span with one bounding box, in the page's text order.

use pdfium_render::prelude::*;
use tracing::trace;

use crate::ingestion::{Rect, TextSpan};

use super::pdf_rect_to_rect;

/// Vertical jump (points) that starts a new line.
const LINE_BREAK_THRESHOLD: f64 = 5.0;

/// Extract words with top-left bounding boxes from a page's text layer.
pub fn extract_page_spans(text: &PdfPageText, page_height: f64) -> Vec<TextSpan> {
    let chars = text.chars();
    let positioned = chars.iter().filter_map(|pdf_char| {
        let ch = pdf_char.unicode_char()?;
        if ch.is_whitespace() {
            // Whitespace often has degenerate bounds, only its position in the
            // stream matters.
            return Some((ch, None));
        }
        let bounds = pdf_char.tight_bounds().ok()?;
        Some((ch, Some(pdf_rect_to_rect(&bounds, page_height))))
    });

    let spans = group_chars_into_spans(positioned);
    trace!(spans = spans.len(), "Grouped page characters into words");
    spans
}

/// Merge positioned characters into words.
///
/// A word ends at whitespace, at a line change, or at a horizontal gap wider
/// than the current glyph height.
pub fn group_chars_into_spans(
    chars: impl IntoIterator<Item = (char, Option<Rect>)>,
) -> Vec<TextSpan> {
    let mut spans = Vec::new();
    let mut word = String::new();
    let mut word_bounds: Option<Rect> = None;
    let mut last: Option<Rect> = None;

    let mut flush = |word: &mut String, word_bounds: &mut Option<Rect>| {
        if let Some(bounds) = word_bounds.take()
            && !word.is_empty()
        {
            spans.push(TextSpan {
                text: std::mem::take(word),
                bounds,
            });
        }
        word.clear();
    };

    for (ch, bounds) in chars {
        let Some(bounds) = bounds.filter(|_| !ch.is_whitespace()) else {
            flush(&mut word, &mut word_bounds);
            last = None;
            continue;
        };

        if let Some(prev) = last {
            let new_line = (bounds.y2 - prev.y2).abs() > LINE_BREAK_THRESHOLD;
            let gap = bounds.x1 - prev.x2;
            let glyph_height = bounds.height().max(prev.height());
            if new_line || gap > glyph_height {
                flush(&mut word, &mut word_bounds);
            }
        }

        word.push(ch);
        word_bounds = Some(match word_bounds {
            Some(current) => current.union(&bounds),
            None => bounds,
        });
        last = Some(bounds);
    }
    flush(&mut word, &mut word_bounds);

    spans
}
