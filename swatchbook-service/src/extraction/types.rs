//! Core types for swatch extraction.

use std::sync::Arc;

use image::DynamicImage;
use serde::Serialize;

/// A product code recognized on a page, at the center of its text box.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Label {
    pub code: String,
    pub center_x: f64,
    pub center_y: f64,
}

/// Aspect-ratio class of a candidate swatch photograph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SwatchShape {
    /// Fabric laid flat, roughly square
    Flat,
    /// Draped or curled fabric, elongated
    Curled,
    /// Large enough to be a swatch but in neither band
    Unclassified,
}

/// Identity of one image placement on a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ImageId {
    pub xref: u32,
    pub placement: usize,
}

/// One decodable placement of an embedded image.
#[derive(Debug, Clone)]
pub struct SwatchImage {
    pub id: ImageId,
    pub pixels: Arc<DynamicImage>,
    pub width: u32,
    pub height: u32,
    pub center_x: f64,
    pub center_y: f64,
    pub shape: SwatchShape,
}

/// Which rule paired a label with its image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchRule {
    LabelBelow,
    LabelRight,
    /// Relaxed recovery search
    Relaxed,
}

/// A code paired with its swatch image.
#[derive(Debug, Clone)]
pub struct Match {
    pub code: String,
    pub image: SwatchImage,
    pub rule: MatchRule,
    pub auto_fixed: bool,
}

/// Per-page extraction summary.
#[derive(Debug, Clone, Serialize)]
pub struct PageCount {
    pub page: u32,
    pub series: Option<String>,
    pub expected: usize,
    pub extracted: usize,
    pub codes: Vec<String>,
    pub fixed: usize,
}

/// One saved swatch with the technical data of its page.
#[derive(Debug, Clone, Serialize)]
pub struct TechnicalSpec {
    pub code: String,
    pub filename: String,
    pub category: String,
    pub series: Option<String>,
    pub composition: String,
    pub max_width: String,
    pub thickness: String,
    pub weight: String,
    pub blackout_rate: String,
    pub resolution: String,
    pub page: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_fixed: Option<bool>,
}
