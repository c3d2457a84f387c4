//! Embedded image extraction.
//!
//! Every pdfium image object is one placement. Objects drawing the same pixel
//! content are folded into a single [`EmbeddedImage`] with several placements,
//! keyed by the first object's index.

use std::collections::HashMap;
use std::io::Cursor;

use bytes::Bytes;
use image::ImageFormat;
use pdfium_render::prelude::*;
use tracing::{debug, trace};

use crate::ingestion::hash::compute_content_hash;
use crate::ingestion::{EmbeddedImage, Rect};

use super::pdf_rect_to_rect;

/// Extract every embedded raster image on a page with its placement rectangle.
pub fn extract_page_images(page: &PdfPage, page_height: f64) -> Vec<EmbeddedImage> {
    let mut placements = Vec::new();

    for (index, object) in page.objects().iter().enumerate() {
        let PdfPageObject::Image(image_obj) = &object else {
            continue;
        };
        let Ok(quad_points) = image_obj.bounds() else {
            trace!(object_index = index, "Image object without bounds");
            continue;
        };
        let bounds = pdf_rect_to_rect(&quad_points.to_rect(), page_height);

        // Unreadable images keep empty bytes; they are dropped when decoding fails.
        let bytes = match image_obj.get_raw_image() {
            Ok(img) => encode_lossless(&img).unwrap_or_default(),
            Err(e) => {
                debug!(object_index = index, error = ?e, "Could not read raw image");
                Bytes::new()
            }
        };

        placements.push((index as u32, bytes, bounds));
    }

    group_placements(placements)
}

fn encode_lossless(img: &image::DynamicImage) -> Option<Bytes> {
    let mut buffer = Vec::new();
    match img.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png) {
        Ok(()) => Some(Bytes::from(buffer)),
        Err(e) => {
            debug!(error = %e, "Could not re-encode raw image");
            None
        }
    }
}

/// Fold placements that share pixel content into one image.
///
/// Order follows the first appearance of each image. Placements with empty
/// bytes are never folded together.
pub fn group_placements(placements: Vec<(u32, Bytes, Rect)>) -> Vec<EmbeddedImage> {
    let mut images: Vec<EmbeddedImage> = Vec::new();
    let mut by_hash: HashMap<String, usize> = HashMap::new();

    for (xref, bytes, bounds) in placements {
        if !bytes.is_empty() {
            let hash = compute_content_hash(&bytes);
            if let Some(&existing) = by_hash.get(&hash) {
                images[existing].placements.push(bounds);
                continue;
            }
            by_hash.insert(hash, images.len());
        }
        images.push(EmbeddedImage {
            xref,
            bytes,
            placements: vec![bounds],
        });
    }

    images
}
