//! Product-code label extraction.

use crate::ingestion::Page;

use super::types::Label;

/// Whether `text` is a product code: five digits followed by one letter.
pub fn is_fabric_code(text: &str) -> bool {
    let mut chars = text.chars();
    let digits = chars.by_ref().take(5).filter(char::is_ascii_digit).count();
    digits == 5 && chars.next().is_some_and(char::is_alphabetic) && chars.next().is_none()
}

/// Find product-code labels on a page.
///
/// Spans whose trimmed text is a code become labels at their box center, in
/// text-layout order. A label within `tolerance` (both axes) of an earlier
/// label is a duplicate and dropped, whatever its code.
pub fn find_labels(page: &Page, tolerance: f64) -> Vec<Label> {
    let candidates = page.spans.iter().filter_map(|span| {
        let text = span.text.trim();
        is_fabric_code(text).then(|| {
            let (center_x, center_y) = span.bounds.center();
            Label {
                code: text.to_string(),
                center_x,
                center_y,
            }
        })
    });

    let mut unique: Vec<Label> = Vec::new();
    for label in candidates {
        let duplicate = unique.iter().any(|kept| {
            (label.center_x - kept.center_x).abs() < tolerance
                && (label.center_y - kept.center_y).abs() < tolerance
        });
        if !duplicate {
            unique.push(label);
        }
    }
    unique
}

/// Locate `code` directly in the page text, ignoring label deduplication.
///
/// When a code is printed more than once the last occurrence wins.
pub fn locate_code(page: &Page, code: &str) -> Option<(f64, f64)> {
    page.spans
        .iter()
        .rev()
        .find(|span| span.text.trim() == code)
        .map(|span| span.bounds.center())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::test_support::{label_span, page_with};

    #[test]
    fn test_code_pattern() {
        assert!(is_fabric_code("83046A"));
        assert!(is_fabric_code("80001z"));
        assert!(!is_fabric_code("83046"));
        assert!(!is_fabric_code("83046AB"));
        assert!(!is_fabric_code("8304AA"));
        assert!(!is_fabric_code("830461"));
        assert!(!is_fabric_code("A83046"));
        assert!(!is_fabric_code(""));
    }

    #[test]
    fn test_labels_keep_layout_order() {
        let page = page_with(
            "",
            vec![
                label_span("83046B", 300.0, 300.0),
                label_span("Composition:", 100.0, 50.0),
                label_span("83046A", 100.0, 300.0),
            ],
            vec![],
        );
        let labels = find_labels(&page, 30.0);
        let codes: Vec<&str> = labels.iter().map(|l| l.code.as_str()).collect();
        assert_eq!(codes, vec!["83046B", "83046A"]);
        assert_eq!((labels[1].center_x, labels[1].center_y), (100.0, 300.0));
    }

    #[test]
    fn test_nearby_labels_collapse_to_first() {
        let page = page_with(
            "",
            vec![
                label_span("83046A", 100.0, 300.0),
                label_span("83046A", 120.0, 310.0),
                label_span("83046C", 110.0, 290.0),
                label_span("83046B", 100.0, 340.0),
            ],
            vec![],
        );
        let labels = find_labels(&page, 30.0);
        let codes: Vec<&str> = labels.iter().map(|l| l.code.as_str()).collect();
        assert_eq!(codes, vec!["83046A", "83046B"]);
    }

    #[test]
    fn test_trimmed_span_text_matches() {
        let page = page_with("", vec![label_span(" 83046A ", 100.0, 300.0)], vec![]);
        let labels = find_labels(&page, 30.0);
        assert_eq!(labels.len(), 1);
        assert_eq!(labels[0].code, "83046A");
    }

    #[test]
    fn test_locate_code_uses_last_occurrence() {
        let page = page_with(
            "",
            vec![
                label_span("83046A", 100.0, 100.0),
                label_span("83046A", 400.0, 500.0),
            ],
            vec![],
        );
        assert_eq!(locate_code(&page, "83046A"), Some((400.0, 500.0)));
        assert_eq!(locate_code(&page, "83046B"), None);
    }
}
