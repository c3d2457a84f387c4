//! Auto-fix strategies.
//!
//! Each strategy handles one kind of [`Issue`] raised while a page is
//! processed. The engine asks the [`FixRegistry`] for the first strategy that
//! applies and records every application in the ledger, so new heuristics can
//! be registered without touching the matching core.

use image::DynamicImage;
use image::imageops::FilterType;
use tracing::debug;

use crate::config::{AutoFixConfig, ExtractionConfig};
use crate::ingestion::Page;

use super::labels::locate_code;
use super::types::{ImageId, Match, MatchRule, SwatchImage};

/// Something wrong with a page's result set that a strategy may repair.
#[derive(Debug, Clone)]
pub enum Issue {
    /// An expected code ended up without a swatch.
    MissingSwatch { code: String },
    /// A recovered swatch points at an image another code already holds.
    DuplicateImage {
        code: String,
        image: ImageId,
        held_by: String,
    },
    /// A swatch about to be saved is below the resolution floor.
    LowResolution { code: String, image: SwatchImage },
}

impl Issue {
    pub fn code(&self) -> &str {
        match self {
            Issue::MissingSwatch { code }
            | Issue::DuplicateImage { code, .. }
            | Issue::LowResolution { code, .. } => code,
        }
    }
}

/// Images already paired on a page, with the code holding each.
///
/// Placements closer than the dedup tolerance are the same swatch, so a claim
/// covers every candidate drawn at that spot, whatever its [`ImageId`].
#[derive(Debug, Clone)]
pub struct ClaimedImages {
    tolerance: f64,
    claims: Vec<(ImageId, f64, f64, String)>,
}

impl ClaimedImages {
    pub fn new(tolerance: f64) -> Self {
        Self {
            tolerance,
            claims: Vec::new(),
        }
    }

    pub fn claim(&mut self, image: &SwatchImage, code: impl Into<String>) {
        self.claims
            .push((image.id, image.center_x, image.center_y, code.into()));
    }

    /// Code holding `image` or a placement at the same spot.
    pub fn holder(&self, image: &SwatchImage) -> Option<&str> {
        self.claims
            .iter()
            .find(|(id, x, y, _)| {
                *id == image.id
                    || ((x - image.center_x).abs() < self.tolerance
                        && (y - image.center_y).abs() < self.tolerance)
            })
            .map(|(_, _, _, code)| code.as_str())
    }

    pub fn is_claimed(&self, image: &SwatchImage) -> bool {
        self.holder(image).is_some()
    }
}

/// Page state visible to a strategy.
pub struct FixContext<'a> {
    pub page: &'a Page,
    /// Every decodable image on the page large enough for recovery
    pub candidates: &'a [SwatchImage],
    pub claimed: &'a ClaimedImages,
    pub config: &'a ExtractionConfig,
}

/// Result of applying a strategy.
#[derive(Debug, Clone)]
pub enum FixOutcome {
    Recovered(Match),
    Upscaled(DynamicImage),
    NotApplied { reason: String },
}

impl FixOutcome {
    fn not_applied(reason: impl Into<String>) -> Self {
        FixOutcome::NotApplied {
            reason: reason.into(),
        }
    }
}

/// A named repair heuristic.
pub trait FixStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn applies_to(&self, issue: &Issue) -> bool;

    fn apply(&self, issue: &Issue, ctx: &FixContext<'_>) -> FixOutcome;
}

/// Ordered collection of strategies; the first that applies wins.
pub struct FixRegistry {
    strategies: Vec<Box<dyn FixStrategy>>,
}

impl FixRegistry {
    pub fn empty() -> Self {
        Self {
            strategies: Vec::new(),
        }
    }

    pub fn register(&mut self, strategy: Box<dyn FixStrategy>) {
        self.strategies.push(strategy);
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Apply the first matching strategy. `None` when nothing is registered for
    /// this kind of issue.
    pub fn resolve(&self, issue: &Issue, ctx: &FixContext<'_>) -> Option<(&'static str, FixOutcome)> {
        let strategy = self.strategies.iter().find(|s| s.applies_to(issue))?;
        let outcome = strategy.apply(issue, ctx);
        match &outcome {
            FixOutcome::NotApplied { reason } => debug!(
                strategy = strategy.name(),
                code = issue.code(),
                reason = %reason,
                "Fix strategy not applied"
            ),
            _ => debug!(
                strategy = strategy.name(),
                code = issue.code(),
                "Fix strategy applied"
            ),
        }
        Some((strategy.name(), outcome))
    }
}

impl Default for FixRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(MissingSwatchFix));
        registry.register(Box::new(DuplicateImageFix));
        registry.register(Box::new(LowResolutionFix));
        registry
    }
}

/// Relaxed search over every page image for a code the matcher left behind.
pub struct MissingSwatchFix;

impl FixStrategy for MissingSwatchFix {
    fn name(&self) -> &'static str {
        "missing_swatch"
    }

    fn applies_to(&self, issue: &Issue) -> bool {
        matches!(issue, Issue::MissingSwatch { .. })
    }

    fn apply(&self, issue: &Issue, ctx: &FixContext<'_>) -> FixOutcome {
        let code = issue.code();
        let Some(position) = locate_code(ctx.page, code) else {
            return FixOutcome::not_applied("label not found in page text");
        };
        match relaxed_search(position, ctx.candidates, &ctx.config.auto_fix, |_| false) {
            Some(image) => FixOutcome::Recovered(recovered(code, image)),
            None => FixOutcome::not_applied("no image within relaxed bounds"),
        }
    }
}

/// Re-run the relaxed search skipping images another code already holds.
pub struct DuplicateImageFix;

impl FixStrategy for DuplicateImageFix {
    fn name(&self) -> &'static str {
        "duplicate_image"
    }

    fn applies_to(&self, issue: &Issue) -> bool {
        matches!(issue, Issue::DuplicateImage { .. })
    }

    fn apply(&self, issue: &Issue, ctx: &FixContext<'_>) -> FixOutcome {
        let Issue::DuplicateImage {
            code,
            image,
            held_by,
        } = issue
        else {
            return FixOutcome::not_applied("not a duplicate image issue");
        };
        let Some(position) = locate_code(ctx.page, code) else {
            return FixOutcome::not_applied("label not found in page text");
        };
        debug!(code = %code, image = ?image, held_by = %held_by, "Searching past claimed image");
        let taken = |candidate: &SwatchImage| ctx.claimed.is_claimed(candidate);
        match relaxed_search(position, ctx.candidates, &ctx.config.auto_fix, taken) {
            Some(image) => FixOutcome::Recovered(recovered(code, image)),
            None => FixOutcome::not_applied("every nearby image is already claimed"),
        }
    }
}

/// Upscale swatches whose shorter side is under the floor.
pub struct LowResolutionFix;

impl FixStrategy for LowResolutionFix {
    fn name(&self) -> &'static str {
        "low_resolution"
    }

    fn applies_to(&self, issue: &Issue) -> bool {
        matches!(issue, Issue::LowResolution { .. })
    }

    fn apply(&self, issue: &Issue, ctx: &FixContext<'_>) -> FixOutcome {
        let Issue::LowResolution { image, .. } = issue else {
            return FixOutcome::not_applied("not a resolution issue");
        };
        let floor = ctx.config.upscale_floor_px;
        let shorter = image.width.min(image.height);
        if shorter == 0 || shorter >= floor {
            return FixOutcome::not_applied("resolution already meets the floor");
        }

        let scale = floor as f64 / shorter as f64;
        let width = (image.width as f64 * scale).round() as u32;
        let height = (image.height as f64 * scale).round() as u32;
        FixOutcome::Upscaled(image.pixels.resize_exact(width, height, FilterType::Lanczos3))
    }
}

/// Lowest-scoring candidate under the relaxed rule; earlier candidates win ties.
fn relaxed_search<'c>(
    (label_x, label_y): (f64, f64),
    candidates: &'c [SwatchImage],
    rules: &AutoFixConfig,
    excluded: impl Fn(&SwatchImage) -> bool,
) -> Option<&'c SwatchImage> {
    let mut best: Option<(&SwatchImage, f64)> = None;
    for image in candidates {
        if excluded(image) || image.width < rules.min_px || image.height < rules.min_px {
            continue;
        }
        let Some(score) = rules.score(label_x - image.center_x, label_y - image.center_y) else {
            continue;
        };
        if best.is_none_or(|(_, best_score)| score < best_score) {
            best = Some((image, score));
        }
    }
    best.map(|(image, _)| image)
}

fn recovered(code: &str, image: &SwatchImage) -> Match {
    Match {
        code: code.to_string(),
        image: image.clone(),
        rule: MatchRule::Relaxed,
        auto_fixed: true,
    }
}
