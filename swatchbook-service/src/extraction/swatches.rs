//! Swatch image extraction and classification.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::config::ExtractionConfig;
use crate::ingestion::Page;

use super::types::{ImageId, SwatchImage, SwatchShape};

/// Candidate images for one page.
#[derive(Debug, Default)]
pub struct SwatchPools {
    /// Near-square swatches, preferred for matching
    pub flat: Vec<SwatchImage>,
    /// Elongated swatches, fallback pool
    pub curled: Vec<SwatchImage>,
    /// Every decodable placement large enough for recovery, undeduplicated
    pub all: Vec<SwatchImage>,
    /// Embedded images that failed to decode
    pub undecodable: usize,
    /// Placements dropped as rendering artifacts
    pub artifacts: usize,
}

/// Decode, filter, classify and deduplicate the images of a page.
///
/// Images that cannot be decoded are skipped without error.
pub fn extract_swatches(page: &Page, config: &ExtractionConfig) -> SwatchPools {
    let mut pools = SwatchPools::default();
    let mut flat = Vec::new();
    let mut curled = Vec::new();

    for embedded in &page.images {
        let pixels = match image::load_from_memory(&embedded.bytes) {
            Ok(img) => Arc::new(img),
            Err(e) => {
                trace!(page = page.number, xref = embedded.xref, error = %e, "Skipping undecodable image");
                pools.undecodable += 1;
                continue;
            }
        };
        let (width, height) = (pixels.width(), pixels.height());
        if width == 0 || height == 0 {
            pools.undecodable += 1;
            continue;
        }
        let aspect_ratio = width as f64 / height as f64;
        let pool_sized = width >= config.min_swatch_px && height >= config.min_swatch_px;
        let fix_sized = width >= config.auto_fix.min_px && height >= config.auto_fix.min_px;
        if !pool_sized && !fix_sized {
            continue;
        }

        let shape = classify(width, aspect_ratio, config);

        for (placement, rect) in embedded.placements.iter().enumerate() {
            let (center_x, center_y) = rect.center();
            let swatch = SwatchImage {
                id: ImageId {
                    xref: embedded.xref,
                    placement,
                },
                pixels: pixels.clone(),
                width,
                height,
                center_x,
                center_y,
                shape,
            };

            if fix_sized {
                pools.all.push(swatch.clone());
            }
            if !pool_sized {
                continue;
            }
            let in_corner = rect.x2 <= config.artifact_margin || rect.y2 <= config.artifact_margin;
            let off_page = rect.x1 >= page.width || rect.y1 >= page.height;
            if in_corner || off_page {
                pools.artifacts += 1;
                continue;
            }
            match shape {
                SwatchShape::Flat => flat.push(swatch),
                SwatchShape::Curled => curled.push(swatch),
                SwatchShape::Unclassified => {}
            }
        }
    }

    pools.flat = dedupe_by_position(flat, config.image_dedup_tolerance);
    pools.curled = dedupe_by_position(curled, config.image_dedup_tolerance);

    debug!(
        page = page.number,
        flat = pools.flat.len(),
        curled = pools.curled.len(),
        candidates = pools.all.len(),
        undecodable = pools.undecodable,
        artifacts = pools.artifacts,
        "Classified page images"
    );

    pools
}

/// Bucket an image by aspect ratio.
pub fn classify(width: u32, aspect_ratio: f64, config: &ExtractionConfig) -> SwatchShape {
    if config.flat_aspect.contains(aspect_ratio) {
        SwatchShape::Flat
    } else if config.curled_aspect.contains(aspect_ratio) && width >= config.curled_min_width_px {
        SwatchShape::Curled
    } else {
        SwatchShape::Unclassified
    }
}

/// Keep the first image of every cluster of placements closer than `tolerance`.
pub fn dedupe_by_position(images: Vec<SwatchImage>, tolerance: f64) -> Vec<SwatchImage> {
    let mut unique: Vec<SwatchImage> = Vec::new();
    for image in images {
        let duplicate = unique.iter().any(|kept| {
            (image.center_x - kept.center_x).abs() < tolerance
                && (image.center_y - kept.center_y).abs() < tolerance
        });
        if !duplicate {
            unique.push(image);
        }
    }
    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::test_support::{embedded, page_with, png_bytes};
    use crate::ingestion::{EmbeddedImage, Rect};
    use bytes::Bytes;

    #[test]
    fn test_classification_bands() {
        let config = ExtractionConfig::default();
        assert_eq!(classify(600, 1.0, &config), SwatchShape::Flat);
        assert_eq!(classify(900, 1.5, &config), SwatchShape::Curled);
        // Too narrow for the curled floor
        assert_eq!(classify(450, 1.5, &config), SwatchShape::Unclassified);
        // Between the bands
        assert_eq!(classify(700, 1.35, &config), SwatchShape::Unclassified);
        assert_eq!(classify(700, 0.5, &config), SwatchShape::Unclassified);
    }

    #[test]
    fn test_pools_split_by_shape_and_size() {
        let page = page_with(
            "",
            vec![],
            vec![
                embedded(0, 600, 600, 100.0, 200.0),
                embedded(1, 900, 600, 400.0, 200.0),
                embedded(2, 200, 200, 700.0, 200.0),
            ],
        );
        let pools = extract_swatches(&page, &ExtractionConfig::default());
        assert_eq!(pools.flat.len(), 1);
        assert_eq!(pools.flat[0].id.xref, 0);
        assert_eq!(pools.curled.len(), 1);
        assert_eq!(pools.curled[0].id.xref, 1);
        // The 200px image is too small for any pool or for recovery
        assert_eq!(pools.all.len(), 2);
    }

    #[test]
    fn test_undecodable_image_is_skipped() {
        let mut page = page_with("", vec![], vec![embedded(1, 600, 600, 300.0, 200.0)]);
        page.images.insert(
            0,
            EmbeddedImage {
                xref: 0,
                bytes: Bytes::from_static(b"not an image"),
                placements: vec![Rect::centered(100.0, 200.0, 100.0, 100.0)],
            },
        );

        let pools = extract_swatches(&page, &ExtractionConfig::default());
        assert_eq!(pools.undecodable, 1);
        assert_eq!(pools.flat.len(), 1);
        assert_eq!(pools.flat[0].id.xref, 1);
        assert!(pools.all.iter().all(|img| img.id.xref == 1));
    }

    #[test]
    fn test_every_placement_is_a_candidate() {
        let page = page_with(
            "",
            vec![],
            vec![EmbeddedImage {
                xref: 4,
                bytes: png_bytes(600, 600, [10, 20, 30]),
                placements: vec![
                    Rect::centered(100.0, 200.0, 100.0, 100.0),
                    Rect::centered(300.0, 200.0, 100.0, 100.0),
                ],
            }],
        );
        let pools = extract_swatches(&page, &ExtractionConfig::default());
        assert_eq!(pools.flat.len(), 2);
        assert_eq!(pools.flat[1].id, ImageId { xref: 4, placement: 1 });
    }

    #[test]
    fn test_same_position_placements_collapse() {
        let page = page_with(
            "",
            vec![],
            vec![
                embedded(0, 600, 600, 100.0, 200.0),
                embedded(1, 640, 600, 130.0, 220.0),
            ],
        );
        let pools = extract_swatches(&page, &ExtractionConfig::default());
        assert_eq!(pools.flat.len(), 1);
        assert_eq!(pools.flat[0].id.xref, 0);
        assert_eq!(pools.all.len(), 2);
    }

    #[test]
    fn test_corner_artifacts_are_dropped_from_pools() {
        let page = page_with(
            "",
            vec![],
            vec![EmbeddedImage {
                xref: 0,
                bytes: png_bytes(600, 600, [10, 20, 30]),
                placements: vec![Rect::new(0.0, 0.0, 40.0, 40.0)],
            }],
        );
        let pools = extract_swatches(&page, &ExtractionConfig::default());
        assert!(pools.flat.is_empty());
        assert_eq!(pools.artifacts, 1);
        assert_eq!(pools.all.len(), 1);
    }

    #[test]
    fn test_off_page_placements_are_artifacts() {
        let page = page_with(
            "",
            vec![],
            vec![EmbeddedImage {
                xref: 0,
                bytes: png_bytes(600, 600, [10, 20, 30]),
                placements: vec![
                    Rect::centered(300.0, 400.0, 100.0, 100.0),
                    Rect::new(650.0, 100.0, 750.0, 200.0),
                    Rect::new(100.0, 800.0, 200.0, 900.0),
                ],
            }],
        );
        let pools = extract_swatches(&page, &ExtractionConfig::default());
        assert_eq!(pools.flat.len(), 1);
        assert_eq!(pools.flat[0].center_x, 300.0);
        assert_eq!(pools.artifacts, 2);
    }
}
