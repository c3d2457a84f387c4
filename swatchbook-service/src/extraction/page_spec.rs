//! Page-level series, blackout category and technical specification parsing.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

use crate::error::{ServiceError, ServiceResult};

use super::types::{Label, Match};

static SERIES_KEYWORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)series\s+(\d{5})\b").expect("valid series regex"));
static WIDTH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{2,3})\s*cm").expect("valid width regex"));
static THICKNESS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(0\.\d+)\s*mm").expect("valid thickness regex"));
static WEIGHT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{2,4})g/m").expect("valid weight regex"));

const DEFAULT_COMPOSITION: &str = "100% Polyester";
const PVC_COMPOSITION: &str = "30% Polyester + 70% PVC";
const DEFAULT_MAX_WIDTH: &str = "300cm";
const DEFAULT_THICKNESS: &str = "0.5mm";
const DEFAULT_WEIGHT: &str = "300g/m²";

/// Light-opacity category of a fabric page. Doubles as the output folder name.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, EnumIter, Serialize,
)]
pub enum BlackoutRate {
    #[default]
    #[strum(serialize = "Blackout")]
    Blackout,
    #[strum(serialize = "Super_Blackout")]
    #[serde(rename = "Super_Blackout")]
    SuperBlackout,
    #[strum(serialize = "Semi_Blackout")]
    #[serde(rename = "Semi_Blackout")]
    SemiBlackout,
    #[strum(serialize = "Transparent")]
    Transparent,
}

impl BlackoutRate {
    /// Classify from page text keywords.
    pub fn from_text(text: &str) -> Option<Self> {
        let lower = text.to_lowercase();
        if lower.contains("super") && lower.contains("blackout") {
            Some(BlackoutRate::SuperBlackout)
        } else if lower.contains("semi") && lower.contains("blackout") {
            Some(BlackoutRate::SemiBlackout)
        } else if lower.contains("transparent") {
            Some(BlackoutRate::Transparent)
        } else {
            None
        }
    }

    /// Lowercase file-name suffix, e.g. `super-blackout`.
    pub fn slug(&self) -> String {
        self.to_string().to_lowercase().replace('_', "-")
    }

    pub fn all() -> impl Iterator<Item = BlackoutRate> {
        BlackoutRate::iter()
    }
}

/// Which technical fields were read from the page rather than defaulted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParsedFields {
    pub composition: bool,
    pub max_width: bool,
    pub thickness: bool,
    pub weight: bool,
    pub blackout_rate: bool,
}

/// Technical metadata for one catalog page.
#[derive(Debug, Clone, Serialize)]
pub struct PageSpec {
    pub page: u32,
    pub series: Option<String>,
    pub composition: String,
    pub max_width: String,
    pub thickness: String,
    pub weight: String,
    pub blackout_rate: BlackoutRate,
    #[serde(skip)]
    pub parsed: ParsedFields,
}

/// Parses [`PageSpec`]s with a configurable fallback series pattern.
#[derive(Debug, Clone)]
pub struct SpecParser {
    series_pattern: Regex,
}

impl SpecParser {
    pub fn new(series_pattern: &str) -> ServiceResult<Self> {
        let series_pattern = Regex::new(series_pattern).map_err(|e| ServiceError::Config {
            message: format!("Invalid series pattern {:?}: {}", series_pattern, e),
        })?;
        if series_pattern.captures_len() < 2 {
            return Err(ServiceError::Config {
                message: "Series pattern needs a capture group".to_string(),
            });
        }
        Ok(Self { series_pattern })
    }

    /// Detect the page series. An explicit "series NNNNN" always wins; a
    /// fallback pattern match only counts when it prefixes a label on the page.
    pub fn detect_series(&self, text: &str, labels: &[Label]) -> Option<String> {
        if let Some(series) = first_capture(&SERIES_KEYWORD_RE, text) {
            return Some(series.to_string());
        }
        self.series_pattern
            .captures_iter(text)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str())
            .find(|candidate| labels.iter().any(|label| label.code.starts_with(candidate)))
            .map(str::to_string)
    }

    pub fn parse(&self, page: u32, text: &str, labels: &[Label]) -> PageSpec {
        let blackout_rate = BlackoutRate::from_text(text);
        let has_pvc = text.contains("PVC");
        let max_width = first_capture(&WIDTH_RE, text);
        let thickness = first_capture(&THICKNESS_RE, text);
        let weight = first_capture(&WEIGHT_RE, text);

        let parsed = ParsedFields {
            composition: has_pvc,
            max_width: max_width.is_some(),
            thickness: thickness.is_some(),
            weight: weight.is_some(),
            blackout_rate: blackout_rate.is_some(),
        };

        PageSpec {
            page,
            series: self.detect_series(text, labels),
            composition: if has_pvc {
                PVC_COMPOSITION
            } else {
                DEFAULT_COMPOSITION
            }
            .to_string(),
            max_width: max_width.map_or_else(|| DEFAULT_MAX_WIDTH.to_string(), |w| format!("{w}cm")),
            thickness: thickness
                .map_or_else(|| DEFAULT_THICKNESS.to_string(), |t| format!("{t}mm")),
            weight: weight.map_or_else(|| DEFAULT_WEIGHT.to_string(), |w| format!("{w}g/m²")),
            blackout_rate: blackout_rate.unwrap_or_default(),
            parsed,
        }
    }
}

fn first_capture<'t>(re: &Regex, text: &'t str) -> Option<&'t str> {
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Split matches into those belonging to `series` and those that do not.
///
/// With no series every match is kept.
pub fn retain_series(matches: Vec<Match>, series: Option<&str>) -> (Vec<Match>, Vec<Match>) {
    match series {
        Some(series) => matches.into_iter().partition(|m| m.code.starts_with(series)),
        None => (matches, Vec::new()),
    }
}
