//! Pixel-level sanity probes for saved swatches.
//!
//! None of these can fail a run; they feed WARN entries into the ledger.

use image::{DynamicImage, GenericImageView, RgbImage};
use serde::Serialize;

/// Channel value above which a pixel counts as white.
const WHITE_THRESHOLD: u8 = 240;
/// Probes run on a downscaled copy no larger than this on either side.
const PROBE_MAX_SIDE: u32 = 128;
/// Luminance variance under which a swatch is considered empty.
const BLANK_VARIANCE: f64 = 1.0;
/// Border fraction above which a swatch is considered framed.
const BORDER_FRACTION: f64 = 0.6;
/// Mean-color distance under which two swatches look identical.
const DISTINCT_COLOR_DISTANCE: f64 = 2.0;

/// Coarse shape taxonomy of a swatch photograph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeClass {
    Square,
    RectangleWide,
    RectangleTall,
}

impl ShapeClass {
    pub fn from_dimensions(width: u32, height: u32) -> Self {
        let aspect = if height == 0 {
            1.0
        } else {
            width as f64 / height as f64
        };
        if (0.9..=1.1).contains(&aspect) {
            ShapeClass::Square
        } else if aspect > 1.1 {
            ShapeClass::RectangleWide
        } else {
            ShapeClass::RectangleTall
        }
    }
}

/// Measurements of one decoded swatch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityProbe {
    pub shape: ShapeClass,
    pub mean_rgb: [f64; 3],
    pub luminance_variance: f64,
    /// Fraction of border pixels that are white
    pub white_border: f64,
    /// Fraction of border pixels that are catalog-frame yellow
    pub yellow_border: f64,
}

impl QualityProbe {
    pub fn measure(image: &DynamicImage) -> Self {
        let (width, height) = image.dimensions();
        let rgb = probe_pixels(image);

        let count = (rgb.width() as f64 * rgb.height() as f64).max(1.0);
        let mut sums = [0.0f64; 3];
        let mut luma_sum = 0.0;
        let mut luma_sq_sum = 0.0;
        for pixel in rgb.pixels() {
            let [r, g, b] = pixel.0;
            sums[0] += r as f64;
            sums[1] += g as f64;
            sums[2] += b as f64;
            let luma = luminance(r, g, b);
            luma_sum += luma;
            luma_sq_sum += luma * luma;
        }
        let mean_luma = luma_sum / count;
        let luminance_variance = (luma_sq_sum / count - mean_luma * mean_luma).max(0.0);

        let (mut border, mut white, mut yellow) = (0usize, 0usize, 0usize);
        let band = (rgb.width().min(rgb.height()) / 20).max(1);
        for (x, y, pixel) in rgb.enumerate_pixels() {
            let on_border = x < band
                || y < band
                || x >= rgb.width().saturating_sub(band)
                || y >= rgb.height().saturating_sub(band);
            if !on_border {
                continue;
            }
            border += 1;
            let [r, g, b] = pixel.0;
            if is_white(r, g, b) {
                white += 1;
            }
            if is_yellow(r, g, b) {
                yellow += 1;
            }
        }
        let border = border.max(1) as f64;

        Self {
            shape: ShapeClass::from_dimensions(width, height),
            mean_rgb: sums.map(|s| s / count),
            luminance_variance,
            white_border: white as f64 / border,
            yellow_border: yellow as f64 / border,
        }
    }

    /// A single flat color: almost certainly a background, not fabric.
    pub fn is_blank(&self) -> bool {
        self.luminance_variance < BLANK_VARIANCE
    }

    pub fn has_white_border(&self) -> bool {
        self.white_border > BORDER_FRACTION
    }

    pub fn has_yellow_border(&self) -> bool {
        self.yellow_border > BORDER_FRACTION
    }

    /// Whether two swatches differ visibly in average color.
    pub fn distinct_from(&self, other: &QualityProbe) -> bool {
        let distance = self
            .mean_rgb
            .iter()
            .zip(other.mean_rgb.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f64>()
            .sqrt();
        distance >= DISTINCT_COLOR_DISTANCE
    }
}

fn probe_pixels(image: &DynamicImage) -> RgbImage {
    if image.width() > PROBE_MAX_SIDE || image.height() > PROBE_MAX_SIDE {
        image.thumbnail(PROBE_MAX_SIDE, PROBE_MAX_SIDE).to_rgb8()
    } else {
        image.to_rgb8()
    }
}

fn luminance(r: u8, g: u8, b: u8) -> f64 {
    0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64
}

pub fn is_white(r: u8, g: u8, b: u8) -> bool {
    r > WHITE_THRESHOLD && g > WHITE_THRESHOLD && b > WHITE_THRESHOLD
}

pub fn is_yellow(r: u8, g: u8, b: u8) -> bool {
    r > 180 && g > 100 && g < 200 && b < 120 && r as u16 > b as u16 + 50
}
