//! Thresholds and switches for the swatch extraction engine.

use serde::{Deserialize, Serialize};

/// Inclusive aspect-ratio band (`width / height`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AspectBand {
    pub min: f64,
    pub max: f64,
}

impl AspectBand {
    pub fn contains(&self, aspect: f64) -> bool {
        aspect >= self.min && aspect <= self.max
    }
}

/// Acceptance window for one label placement rule.
///
/// The offset is measured along the rule's main axis (vertical for "label
/// below image", horizontal for "label right of image") and must fall strictly
/// between `min_offset` and `max_offset`. The offset on the other axis must stay
/// strictly under `max_cross`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlacementWindow {
    pub min_offset: f64,
    pub max_offset: f64,
    pub max_cross: f64,
    /// Offset that scores zero along the main axis.
    pub preferred_offset: f64,
}

impl PlacementWindow {
    /// Score `offset`/`cross` if they fall inside the window.
    pub fn score(&self, offset: f64, cross: f64) -> Option<f64> {
        (offset > self.min_offset && offset < self.max_offset && cross.abs() < self.max_cross)
            .then(|| cross.abs() + (offset - self.preferred_offset).abs())
    }
}

/// Primary spatial matcher rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatcherConfig {
    #[serde(default = "default_below")]
    pub below: PlacementWindow,

    #[serde(default = "default_right")]
    pub right: PlacementWindow,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            below: default_below(),
            right: default_right(),
        }
    }
}

/// Relaxed search used when recovering missing swatches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoFixConfig {
    /// Minimum pixel size (both dimensions) of recovery candidates.
    #[serde(default = "default_min_swatch_px")]
    pub min_px: u32,

    #[serde(default = "default_fix_min_dy")]
    pub min_dy: f64,

    #[serde(default = "default_fix_max_dy")]
    pub max_dy: f64,

    /// Limit on the absolute horizontal distance.
    #[serde(default = "default_fix_max_dx")]
    pub max_dx: f64,

    #[serde(default = "default_fix_preferred_dy")]
    pub preferred_dy: f64,
}

impl AutoFixConfig {
    /// Score a label/image offset under the relaxed rule.
    pub fn score(&self, dx: f64, dy: f64) -> Option<f64> {
        let dx = dx.abs();
        (dy > self.min_dy && dy < self.max_dy && dx < self.max_dx)
            .then(|| dx + (dy - self.preferred_dy).abs())
    }
}

impl Default for AutoFixConfig {
    fn default() -> Self {
        Self {
            min_px: default_min_swatch_px(),
            min_dy: default_fix_min_dy(),
            max_dy: default_fix_max_dy(),
            max_dx: default_fix_max_dx(),
            preferred_dy: default_fix_preferred_dy(),
        }
    }
}

/// Lossless raster format used for saved swatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageOutputFormat {
    #[default]
    Png,
    Webp,
}

impl ImageOutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ImageOutputFormat::Png => "png",
            ImageOutputFormat::Webp => "webp",
        }
    }
}

/// Engine configuration, passed to the extractor at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Both pixel dimensions must reach this for an image to enter a pool.
    pub min_swatch_px: u32,
    pub flat_aspect: AspectBand,
    pub curled_aspect: AspectBand,
    /// Curled images must also be at least this wide.
    pub curled_min_width_px: u32,
    /// Placements whose right or bottom edge sits within this distance of the
    /// page origin are rendering artifacts.
    pub artifact_margin: f64,
    pub label_dedup_tolerance: f64,
    pub image_dedup_tolerance: f64,
    pub matcher: MatcherConfig,
    pub auto_fix: AutoFixConfig,
    /// Shorter side floor for the low-resolution fix.
    pub upscale_floor_px: u32,
    /// First page (1-based) of the processing window.
    pub first_page: u32,
    /// Last page (1-based, inclusive). `None` runs to the end of the document.
    pub last_page: Option<u32>,
    /// Fallback series pattern; the first capture group is the series.
    pub series_pattern: String,
    pub image_format: ImageOutputFormat,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            min_swatch_px: default_min_swatch_px(),
            flat_aspect: AspectBand { min: 0.8, max: 1.3 },
            curled_aspect: AspectBand { min: 1.4, max: 2.0 },
            curled_min_width_px: 500,
            artifact_margin: 50.0,
            label_dedup_tolerance: 30.0,
            image_dedup_tolerance: 50.0,
            matcher: MatcherConfig::default(),
            auto_fix: AutoFixConfig::default(),
            upscale_floor_px: 300,
            first_page: 1,
            last_page: None,
            series_pattern: r"\b(\d{5})\b".to_string(),
            image_format: ImageOutputFormat::default(),
        }
    }
}

// ==================== Default Value Functions ====================

fn default_min_swatch_px() -> u32 {
    300
}

fn default_below() -> PlacementWindow {
    PlacementWindow {
        min_offset: 30.0,
        max_offset: 350.0,
        max_cross: 200.0,
        preferred_offset: 100.0,
    }
}

fn default_right() -> PlacementWindow {
    default_below()
}

fn default_fix_min_dy() -> f64 {
    20.0
}

fn default_fix_max_dy() -> f64 {
    400.0
}

fn default_fix_max_dx() -> f64 {
    250.0
}

fn default_fix_preferred_dy() -> f64 {
    120.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config: ExtractionConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.min_swatch_px, 300);
        assert_eq!(config.curled_min_width_px, 500);
        assert_eq!(config.matcher.below.preferred_offset, 100.0);
        assert_eq!(config.auto_fix.max_dx, 250.0);
        assert_eq!(config.image_format, ImageOutputFormat::Png);
        assert!(config.last_page.is_none());
    }

    #[test]
    fn test_partial_override_keeps_other_defaults() {
        let config: ExtractionConfig =
            serde_json::from_str(r#"{"min_swatch_px": 500, "auto_fix": {"max_dx": 300.0}}"#)
                .unwrap();
        assert_eq!(config.min_swatch_px, 500);
        assert_eq!(config.auto_fix.max_dx, 300.0);
        assert_eq!(config.auto_fix.max_dy, 400.0);
        assert_eq!(config.flat_aspect, AspectBand { min: 0.8, max: 1.3 });
    }

    #[test]
    fn test_placement_window_bounds_are_strict() {
        let window = default_below();
        assert_eq!(window.score(100.0, 0.0), Some(0.0));
        assert_eq!(window.score(130.0, -20.0), Some(50.0));
        assert!(window.score(30.0, 0.0).is_none());
        assert!(window.score(350.0, 0.0).is_none());
        assert!(window.score(100.0, 200.0).is_none());
        assert!(window.score(100.0, -200.0).is_none());
    }

    #[test]
    fn test_auto_fix_score_uses_absolute_dx() {
        let rules = AutoFixConfig::default();
        assert_eq!(rules.score(-200.0, 150.0), Some(230.0));
        assert_eq!(rules.score(200.0, 150.0), Some(230.0));
        assert!(rules.score(250.0, 150.0).is_none());
        assert!(rules.score(0.0, 20.0).is_none());
        assert!(rules.score(0.0, 400.0).is_none());
    }

    #[test]
    fn test_aspect_band_is_inclusive() {
        let band = AspectBand { min: 0.8, max: 1.3 };
        assert!(band.contains(0.8));
        assert!(band.contains(1.3));
        assert!(!band.contains(1.31));
    }
}
