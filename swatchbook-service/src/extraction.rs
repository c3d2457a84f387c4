//! Swatch extraction engine.
//!
//! Per page, in document order:
//! 1. Labels and candidate images are read independently ([`labels`], [`swatches`])
//! 2. Labels are paired with flat swatches, then leftovers with curled ones ([`matcher`])
//! 3. Pairs outside the page series are discarded ([`page_spec`])
//! 4. Expected codes still missing go through the fix registry ([`fixes`])
//! 5. Every retained pair is saved under its category folder ([`output`])
//!
//! The [`validation`] ledger observes every stage. Only document-open and
//! output-write failures abort a run; everything else degrades to ledger
//! entries and partial results.

pub mod fixes;
pub mod labels;
pub mod matcher;
pub mod output;
pub mod page_spec;
pub mod quality;
pub mod swatches;
pub mod types;
pub mod validation;

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;
use std::sync::Arc;

use image::DynamicImage;
use metrics::counter;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::ExtractionConfig;
use crate::error::ServiceResult;
use crate::ingestion::pdf::{PdfCatalog, create_pdfium};
use crate::ingestion::{CatalogDocument, Page};

pub use fixes::{ClaimedImages, FixContext, FixOutcome, FixRegistry, Issue};
pub use output::OutputLayout;
pub use page_spec::{BlackoutRate, PageSpec, SpecParser};
pub use types::{Label, Match, MatchRule, PageCount, SwatchShape, TechnicalSpec};
pub use validation::{CheckKind, CheckStatus, ValidationEntry, ValidationLedger};

use labels::{find_labels, is_fabric_code};
use matcher::match_labels;
use page_spec::retain_series;
use quality::{QualityProbe, ShapeClass};
use swatches::{SwatchPools, extract_swatches};
use types::SwatchImage;

/// Phase 1 wants at least this much text on the first processed page.
const MIN_PAGE_TEXT_CHARS: usize = 100;

/// Summary of one extraction run.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionReport {
    pub total_extracted: usize,
    pub total_expected: usize,
    pub total_fixed: usize,
    pub validations_passed: usize,
    pub validations_failed: usize,
    pub validations_warned: usize,
    pub validations_total: usize,
    /// True when no validation failed
    pub passed: bool,
    pub fixes_by_strategy: BTreeMap<String, usize>,
    pub page_counts: Vec<PageCount>,
    pub technical_specs: Vec<TechnicalSpec>,
    pub validation_log: Vec<ValidationEntry>,
}

/// Open a PDF catalog with pdfium and extract it into `output_dir`.
///
/// The document is closed on every exit path.
pub fn extract_catalog(
    path: &Path,
    output_dir: &Path,
    config: ExtractionConfig,
) -> ServiceResult<ExtractionReport> {
    let pdfium = create_pdfium()?;
    let catalog = PdfCatalog::open(&pdfium, path)?;
    SwatchExtractor::new(config, output_dir)?.run(&catalog)
}

/// Extraction engine bound to one output directory.
pub struct SwatchExtractor {
    config: ExtractionConfig,
    parser: SpecParser,
    registry: FixRegistry,
    layout: OutputLayout,
}

impl SwatchExtractor {
    /// Validate the configuration and create the output folders.
    pub fn new(config: ExtractionConfig, output_dir: impl AsRef<Path>) -> ServiceResult<Self> {
        let parser = SpecParser::new(&config.series_pattern)?;
        let layout = OutputLayout::prepare(output_dir.as_ref(), config.image_format)?;
        Ok(Self {
            config,
            parser,
            registry: FixRegistry::default(),
            layout,
        })
    }

    #[cfg(test)]
    pub fn with_fix_registry(mut self, registry: FixRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Process the configured page window and write every output file.
    pub fn run(&self, document: &dyn CatalogDocument) -> ServiceResult<ExtractionReport> {
        let page_count = document.page_count();
        let first = self.config.first_page.max(1) as usize;
        let last = self
            .config
            .last_page
            .map_or(page_count, |last| (last as usize).min(page_count));
        let window = (first - 1)..last.max(first - 1);

        info!(
            pages = page_count,
            first,
            last,
            output = %self.layout.root().display(),
            fixes = ?self.registry.names(),
            "Starting swatch extraction"
        );
        counter!("swatchbook_runs_total").increment(1);

        let mut run = RunState::default();
        let mut cached = self.validate_document(document, page_count, window.clone(), &mut run);

        for index in window {
            let number = index as u32 + 1;
            let page = match cached.take() {
                Some(page) => page,
                None => match document.page(index) {
                    Ok(page) => page,
                    Err(e) => {
                        warn!(page = number, error = %e.detailed_message(), "Skipping unreadable page");
                        run.ledger.record_page(
                            35,
                            number,
                            CheckStatus::Warn,
                            format!("Page could not be read: {}", e.detailed_message()),
                            None,
                        );
                        continue;
                    }
                },
            };

            self.process_page(&page, &mut run)?;
            counter!("swatchbook_pages_processed_total").increment(1);
        }

        if !run.ledger.test_numbers().contains(&35) {
            run.ledger.record(
                35,
                CheckStatus::Warn,
                CheckKind::Invariant,
                "No pages in the processing window",
            );
        }

        self.finish(run)
    }

    /// Phase 1 against the first page of the window. Returns that page so it
    /// is not read twice.
    fn validate_document(
        &self,
        document: &dyn CatalogDocument,
        page_count: usize,
        window: std::ops::Range<usize>,
        run: &mut RunState,
    ) -> Option<Page> {
        run.ledger.record(
            1,
            CheckStatus::pass_if(page_count > 0),
            CheckKind::Invariant,
            format!("{page_count} pages detected"),
        );

        if window.is_empty() {
            for number in 2..=4 {
                run.ledger.record(
                    number,
                    CheckStatus::Warn,
                    CheckKind::Invariant,
                    "No page in the processing window",
                );
            }
            return None;
        }

        let page = match document.page(window.start) {
            Ok(page) => page,
            Err(e) => {
                warn!(page = window.start + 1, error = %e.detailed_message(), "First page unreadable");
                for number in 2..=4 {
                    run.ledger.record(
                        number,
                        CheckStatus::Warn,
                        CheckKind::Invariant,
                        format!("Page {} unreadable: {}", window.start + 1, e.detailed_message()),
                    );
                }
                return None;
            }
        };

        let chars = page.text.trim().chars().count();
        run.ledger.record(
            2,
            CheckStatus::warn_unless(chars > MIN_PAGE_TEXT_CHARS),
            CheckKind::Invariant,
            format!("{} characters of text on page {}", chars, page.number),
        );

        let placements: usize = page.images.iter().map(|img| img.placements.len()).sum();
        run.ledger.record(
            3,
            CheckStatus::warn_unless(placements > 0),
            CheckKind::Invariant,
            format!("{} images found on page {}", placements, page.number),
        );

        let codes: BTreeSet<&str> = page
            .spans
            .iter()
            .map(|span| span.text.trim())
            .filter(|text| is_fabric_code(text))
            .collect();
        run.ledger.record(
            4,
            CheckStatus::warn_unless(!codes.is_empty()),
            CheckKind::Invariant,
            format!("Found {} unique codes on page {}", codes.len(), page.number),
        );

        Some(page)
    }

    fn process_page(&self, page: &Page, run: &mut RunState) -> ServiceResult<()> {
        let labels = find_labels(page, self.config.label_dedup_tolerance);
        let spec = self.parser.parse(page.number, &page.text, &labels);
        let pools = extract_swatches(page, &self.config);
        run.stats.observe_page(&spec, &pools);

        // Flat swatches first, curled ones only for labels left over
        let mut taken = HashSet::new();
        let mut matches = match_labels(&labels, &pools.flat, &self.config.matcher, &mut taken);
        let unmatched: Vec<Label> = labels
            .iter()
            .filter(|label| !matches.iter().any(|m| m.code == label.code))
            .cloned()
            .collect();
        if !unmatched.is_empty() && !pools.curled.is_empty() {
            let mut flat_claims = ClaimedImages::new(self.config.image_dedup_tolerance);
            for m in &matches {
                flat_claims.claim(&m.image, &m.code);
            }
            let curled: Vec<SwatchImage> = pools
                .curled
                .iter()
                .filter(|image| !flat_claims.is_claimed(image))
                .cloned()
                .collect();
            matches.extend(match_labels(
                &unmatched,
                &curled,
                &self.config.matcher,
                &mut taken,
            ));
        }

        let (kept, discarded) = retain_series(matches, spec.series.as_deref());
        if !discarded.is_empty() {
            let codes: Vec<&str> = discarded.iter().map(|m| m.code.as_str()).collect();
            info!(
                page = page.number,
                series = spec.series.as_deref().unwrap_or(""),
                discarded = ?codes,
                "Discarded codes outside page series"
            );
            run.stats
                .discarded
                .extend(codes.into_iter().map(str::to_string));
        }

        let mut claimed = ClaimedImages::new(self.config.image_dedup_tolerance);
        for m in &kept {
            claimed.claim(&m.image, &m.code);
        }
        let mut saved: Vec<SavedSwatch> = Vec::new();

        for m in &kept {
            let ctx = self.fix_context(page, &pools, &claimed);
            saved.push(self.save_match(m, &spec, &ctx, run)?);
        }

        let expected = expected_codes(&labels, spec.series.as_deref());
        let missing: Vec<&str> = expected
            .iter()
            .copied()
            .filter(|code| !saved.iter().any(|s| s.code == *code))
            .collect();

        let mut applied: Vec<String> = Vec::new();
        for code in &missing {
            let Some((strategy, recovered)) = self.recover_missing(code, page, &pools, &claimed)
            else {
                continue;
            };
            claimed.claim(&recovered.image, &recovered.code);
            let ctx = self.fix_context(page, &pools, &claimed);
            saved.push(self.save_match(&recovered, &spec, &ctx, run)?);
            run.note_fix(strategy);
            applied.push(format!("{code} via {strategy}"));
        }

        let fixed = applied.len();
        let unrecovered: Vec<&str> = missing
            .iter()
            .copied()
            .filter(|code| !saved.iter().any(|s| s.code == *code))
            .collect();
        let fix_applied = (!applied.is_empty()).then(|| applied.join(", "));

        if missing.is_empty() {
            run.ledger.record_page(
                35,
                page.number,
                CheckStatus::Pass,
                format!("All {} swatches extracted", expected.len()),
                None,
            );
        } else if unrecovered.is_empty() {
            run.ledger.record_page(
                35,
                page.number,
                CheckStatus::Warn,
                format!("Missing {:?}, all recovered by auto-fix", missing),
                fix_applied,
            );
        } else {
            run.ledger.record_page(
                35,
                page.number,
                CheckStatus::Fail,
                format!("Missing {:?}, unrecovered {:?}", missing, unrecovered),
                fix_applied,
            );
        }
        run.stats
            .unrecovered
            .extend(unrecovered.iter().map(|code| code.to_string()));

        run.stats.observe_saved(
            &spec,
            &saved,
            self.config.upscale_floor_px,
            self.config.image_dedup_tolerance,
        );

        let codes: Vec<String> = saved.iter().map(|s| s.code.clone()).collect();
        counter!("swatchbook_swatches_extracted_total").increment(codes.len() as u64);
        counter!("swatchbook_swatches_fixed_total").increment(fixed as u64);

        info!(
            page = page.number,
            series = spec.series.as_deref().unwrap_or(""),
            category = %spec.blackout_rate,
            expected = expected.len(),
            extracted = codes.len(),
            fixed,
            "Processed page"
        );

        run.page_counts.push(PageCount {
            page: page.number,
            series: spec.series.clone(),
            expected: expected.len(),
            extracted: codes.len(),
            codes,
            fixed,
        });
        Ok(())
    }

    fn fix_context<'a>(
        &'a self,
        page: &'a Page,
        pools: &'a SwatchPools,
        claimed: &'a ClaimedImages,
    ) -> FixContext<'a> {
        FixContext {
            page,
            candidates: &pools.all,
            claimed,
            config: &self.config,
        }
    }

    /// Run the missing-swatch strategy, then the duplicate-image one when the
    /// recovered image already belongs to another code.
    fn recover_missing(
        &self,
        code: &str,
        page: &Page,
        pools: &SwatchPools,
        claimed: &ClaimedImages,
    ) -> Option<(&'static str, Match)> {
        let ctx = self.fix_context(page, pools, claimed);
        let issue = Issue::MissingSwatch {
            code: code.to_string(),
        };
        let (strategy, outcome) = self.registry.resolve(&issue, &ctx)?;
        let FixOutcome::Recovered(recovered) = outcome else {
            debug!(page = page.number, code, strategy, "Missing swatch not recovered");
            return None;
        };

        let Some(holder) = claimed.holder(&recovered.image) else {
            return Some((strategy, recovered));
        };
        let issue = Issue::DuplicateImage {
            code: code.to_string(),
            image: recovered.image.id,
            held_by: holder.to_string(),
        };
        match self.registry.resolve(&issue, &ctx)? {
            (strategy, FixOutcome::Recovered(m)) if !claimed.is_claimed(&m.image) => {
                Some((strategy, m))
            }
            _ => {
                debug!(
                    page = page.number,
                    code,
                    held_by = %holder,
                    "Recovered image already claimed, dropping recovery"
                );
                None
            }
        }
    }

    /// Save one pair and record its technical spec.
    fn save_match(
        &self,
        m: &Match,
        spec: &PageSpec,
        ctx: &FixContext<'_>,
        run: &mut RunState,
    ) -> ServiceResult<SavedSwatch> {
        let mut pixels: Arc<DynamicImage> = m.image.pixels.clone();
        let mut upscaled = false;
        if m.image.width.min(m.image.height) < self.config.upscale_floor_px {
            let issue = Issue::LowResolution {
                code: m.code.clone(),
                image: m.image.clone(),
            };
            if let Some((strategy, FixOutcome::Upscaled(img))) = self.registry.resolve(&issue, ctx) {
                pixels = Arc::new(img);
                upscaled = true;
                run.note_fix(strategy);
            }
        }

        let filename = self.layout.save_swatch(&m.code, spec.blackout_rate, &pixels)?;
        debug!(code = %m.code, file = %filename, rule = ?m.rule, "Saved swatch");

        run.specs.push(TechnicalSpec {
            code: m.code.clone(),
            filename,
            category: spec.blackout_rate.to_string(),
            series: spec.series.clone(),
            composition: spec.composition.clone(),
            max_width: spec.max_width.clone(),
            thickness: spec.thickness.clone(),
            weight: spec.weight.clone(),
            blackout_rate: spec.blackout_rate.to_string(),
            resolution: format!("{}x{}", pixels.width(), pixels.height()),
            page: spec.page,
            auto_fixed: m.auto_fixed.then_some(true),
        });

        Ok(SavedSwatch {
            code: m.code.clone(),
            image: m.image.clone(),
            rule: m.rule,
            width: pixels.width(),
            height: pixels.height(),
            upscaled,
            probe: QualityProbe::measure(&pixels),
        })
    }

    /// Phases 2 to 9 after all pages, then the report files.
    fn finish(&self, mut run: RunState) -> ServiceResult<ExtractionReport> {
        self.record_run_checks(&mut run);

        let layout = &self.layout;
        let all_folders = BlackoutRate::all().all(|rate| layout.root().join(rate.to_string()).is_dir());
        run.ledger.record(
            30,
            CheckStatus::pass_if(all_folders),
            CheckKind::Invariant,
            format!("{} category folders", BlackoutRate::all().count()),
        );
        let misnamed: Vec<&str> = run
            .specs
            .iter()
            .filter(|s| {
                !(s.filename.starts_with(&format!("{}_", s.code))
                    && s.filename.ends_with(layout.format().extension()))
            })
            .map(|s| s.code.as_str())
            .collect();
        run.ledger.record(
            31,
            CheckStatus::pass_if(misnamed.is_empty()),
            CheckKind::Invariant,
            format!("{{code}}_{{rate}}.{}", layout.format().extension()),
        );

        layout.write_technical_specs(&run.specs)?;
        run.ledger.acknowledge(32, format!("{} rows written", run.specs.len()));
        run.ledger.acknowledge(33, format!("{} records written", run.specs.len()));
        run.ledger.acknowledge(34, output::VALIDATION_LOG_JSON);

        let total_expected: usize = run.page_counts.iter().map(|p| p.expected).sum();
        let total_extracted: usize = run.page_counts.iter().map(|p| p.extracted).sum();
        let total_fixed: usize = run.page_counts.iter().map(|p| p.fixed).sum();

        let unrecovered = &run.stats.unrecovered;
        run.ledger.record(
            36,
            CheckStatus::warn_unless(unrecovered.is_empty()),
            CheckKind::Invariant,
            if unrecovered.is_empty() {
                format!("Fixed {total_fixed} missing swatches automatically")
            } else {
                format!(
                    "Fixed {total_fixed} missing swatches automatically, {} unrecovered: {:?}",
                    unrecovered.len(),
                    unrecovered
                )
            },
        );
        run.ledger.record(
            37,
            CheckStatus::pass_if(total_extracted >= total_expected),
            CheckKind::Invariant,
            format!("{total_extracted}/{total_expected} swatches extracted"),
        );

        layout.write_validation_log(run.ledger.entries())?;

        let report = ExtractionReport {
            total_extracted,
            total_expected,
            total_fixed,
            validations_passed: run.ledger.passed(),
            validations_failed: run.ledger.failed(),
            validations_warned: run.ledger.warned(),
            validations_total: validation::CHECKS.len(),
            passed: run.ledger.failed() == 0,
            fixes_by_strategy: run.fixes_by_strategy,
            page_counts: run.page_counts,
            technical_specs: run.specs,
            validation_log: run.ledger.into_entries(),
        };

        info!(
            extracted = report.total_extracted,
            expected = report.total_expected,
            fixed = report.total_fixed,
            failed = report.validations_failed,
            warned = report.validations_warned,
            "Swatch extraction complete"
        );
        Ok(report)
    }

    /// Phases 2 to 7 from accumulated run statistics.
    fn record_run_checks(&self, run: &mut RunState) {
        let stats = &run.stats;
        let ledger = &mut run.ledger;

        // Phase 2: shape and position
        ledger.acknowledge(5, format!("{} square swatches", stats.square));
        ledger.acknowledge(6, format!("{} wide swatches", stats.wide));
        ledger.acknowledge(7, format!("{} tall swatches", stats.tall));
        ledger.acknowledge(8, format!("{} labels below their image", stats.below));
        ledger.acknowledge(9, format!("{} labels right of their image", stats.right));
        ledger.acknowledge(
            10,
            format!("{} labels matched by relaxed search", stats.relaxed),
        );

        // Phase 3: color and content
        ledger.record(
            11,
            CheckStatus::warn_unless(stats.yellow_bordered.is_empty()),
            CheckKind::Invariant,
            describe_codes("yellow border", &stats.yellow_bordered),
        );
        ledger.record(
            12,
            CheckStatus::warn_unless(stats.white_bordered.is_empty()),
            CheckKind::Invariant,
            describe_codes("white background", &stats.white_bordered),
        );
        ledger.record(
            13,
            CheckStatus::warn_unless(stats.blank.is_empty()),
            CheckKind::Invariant,
            describe_codes("blank content", &stats.blank),
        );
        ledger.record(
            14,
            CheckStatus::warn_unless(stats.indistinct.is_empty()),
            CheckKind::Invariant,
            describe_codes("indistinguishable colors", &stats.indistinct),
        );

        // Phase 4: size and quality
        ledger.record(
            15,
            CheckStatus::warn_unless(stats.below_floor.is_empty()),
            CheckKind::Invariant,
            describe_codes(
                &format!("below {}px", self.config.upscale_floor_px),
                &stats.below_floor,
            ),
        );
        ledger.acknowledge(
            16,
            format!(
                "{} saved at native resolution, {} upscaled",
                stats.saved - stats.upscaled,
                stats.upscaled
            ),
        );
        ledger.acknowledge(
            17,
            format!("Lossless {} output", self.layout.format().extension()),
        );

        // Phase 5: matching and deduplication
        ledger.acknowledge(18, format!("{} labels matched", stats.saved));
        ledger.record(
            19,
            CheckStatus::pass_if(stats.duplicate_claims.is_empty()),
            CheckKind::Invariant,
            describe_codes("sharing an image", &stats.duplicate_claims),
        );
        ledger.acknowledge(
            20,
            format!(
                "{} flat, {} curled swatches matched",
                stats.flat_matches, stats.curled_matches
            ),
        );
        ledger.acknowledge(
            21,
            format!(
                "{} artifact placements and {} undecodable images skipped",
                stats.artifacts, stats.undecodable
            ),
        );

        // Phase 6: series
        ledger.record(
            22,
            CheckStatus::warn_unless(stats.pages_without_series.is_empty()),
            CheckKind::Invariant,
            if stats.pages_without_series.is_empty() {
                format!("Series found on all {} pages", stats.pages)
            } else {
                format!(
                    "No series on pages {:?}; codes there were not filtered",
                    stats.pages_without_series
                )
            },
        );
        ledger.record(
            23,
            CheckStatus::pass_if(stats.series_violations.is_empty()),
            CheckKind::Invariant,
            describe_codes("outside their page series", &stats.series_violations),
        );
        ledger.record(
            24,
            CheckStatus::Pass,
            CheckKind::Invariant,
            if stats.discarded.is_empty() {
                "No mismatched codes".to_string()
            } else {
                format!("Removed {} codes: {:?}", stats.discarded.len(), stats.discarded)
            },
        );

        // Phase 7: technical specifications
        let parsed = |count: usize| format!("Parsed on {}/{} pages, defaulted elsewhere", count, stats.pages);
        ledger.acknowledge(25, parsed(stats.parsed_composition));
        ledger.acknowledge(26, parsed(stats.parsed_width));
        ledger.acknowledge(27, parsed(stats.parsed_thickness));
        ledger.acknowledge(28, parsed(stats.parsed_weight));
        ledger.acknowledge(
            29,
            format!(
                "Categories seen: {}",
                stats
                    .categories
                    .iter()
                    .map(String::as_str)
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        );
    }
}

fn expected_codes<'l>(labels: &'l [Label], series: Option<&str>) -> Vec<&'l str> {
    let Some(series) = series else {
        return Vec::new();
    };
    let mut codes: Vec<&str> = Vec::new();
    for label in labels {
        if label.code.starts_with(series) && !codes.contains(&label.code.as_str()) {
            codes.push(&label.code);
        }
    }
    codes
}

fn describe_codes(what: &str, codes: &[String]) -> String {
    if codes.is_empty() {
        format!("No swatches {what}")
    } else {
        format!("{} swatches {}: {:?}", codes.len(), what, codes)
    }
}

/// A swatch written to disk during this run.
struct SavedSwatch {
    code: String,
    image: SwatchImage,
    rule: MatchRule,
    width: u32,
    height: u32,
    upscaled: bool,
    probe: QualityProbe,
}

#[derive(Default)]
struct RunState {
    ledger: ValidationLedger,
    specs: Vec<TechnicalSpec>,
    page_counts: Vec<PageCount>,
    fixes_by_strategy: BTreeMap<String, usize>,
    stats: RunStats,
}

impl RunState {
    fn note_fix(&mut self, strategy: &str) {
        *self
            .fixes_by_strategy
            .entry(strategy.to_string())
            .or_default() += 1;
    }
}

#[derive(Default)]
struct RunStats {
    pages: usize,
    saved: usize,
    upscaled: usize,
    square: usize,
    wide: usize,
    tall: usize,
    below: usize,
    right: usize,
    relaxed: usize,
    flat_matches: usize,
    curled_matches: usize,
    artifacts: usize,
    undecodable: usize,
    parsed_composition: usize,
    parsed_width: usize,
    parsed_thickness: usize,
    parsed_weight: usize,
    categories: BTreeSet<String>,
    pages_without_series: Vec<u32>,
    yellow_bordered: Vec<String>,
    white_bordered: Vec<String>,
    blank: Vec<String>,
    indistinct: Vec<String>,
    below_floor: Vec<String>,
    duplicate_claims: Vec<String>,
    series_violations: Vec<String>,
    discarded: Vec<String>,
    unrecovered: Vec<String>,
}

impl RunStats {
    fn observe_page(&mut self, spec: &PageSpec, pools: &SwatchPools) {
        self.pages += 1;
        self.artifacts += pools.artifacts;
        self.undecodable += pools.undecodable;
        self.parsed_composition += spec.parsed.composition as usize;
        self.parsed_width += spec.parsed.max_width as usize;
        self.parsed_thickness += spec.parsed.thickness as usize;
        self.parsed_weight += spec.parsed.weight as usize;
        self.categories.insert(spec.blackout_rate.to_string());
        if spec.series.is_none() {
            self.pages_without_series.push(spec.page);
        }
    }

    fn observe_saved(
        &mut self,
        spec: &PageSpec,
        saved: &[SavedSwatch],
        floor_px: u32,
        dedup_tolerance: f64,
    ) {
        let mut images = ClaimedImages::new(dedup_tolerance);
        for swatch in saved {
            self.saved += 1;
            self.upscaled += swatch.upscaled as usize;

            match swatch.probe.shape {
                ShapeClass::Square => self.square += 1,
                ShapeClass::RectangleWide => self.wide += 1,
                ShapeClass::RectangleTall => self.tall += 1,
            }
            match swatch.rule {
                MatchRule::LabelBelow => self.below += 1,
                MatchRule::LabelRight => self.right += 1,
                MatchRule::Relaxed => self.relaxed += 1,
            }
            match swatch.image.shape {
                SwatchShape::Flat => self.flat_matches += 1,
                SwatchShape::Curled => self.curled_matches += 1,
                SwatchShape::Unclassified => {}
            }

            let code = || swatch.code.clone();
            if swatch.probe.has_yellow_border() {
                self.yellow_bordered.push(code());
            }
            if swatch.probe.has_white_border() {
                self.white_bordered.push(code());
            }
            if swatch.probe.is_blank() {
                self.blank.push(code());
            }
            if swatch.width.min(swatch.height) < floor_px {
                self.below_floor.push(code());
            }
            match images.holder(&swatch.image) {
                Some(holder) => self
                    .duplicate_claims
                    .push(format!("{}/{}", holder, swatch.code)),
                None => images.claim(&swatch.image, &swatch.code),
            }
            if let Some(series) = spec.series.as_deref() {
                if !swatch.code.starts_with(series) {
                    self.series_violations.push(code());
                }
            }
        }

        // Sibling codes of one series (A/B/...) should not look identical
        for (i, a) in saved.iter().enumerate() {
            for b in &saved[i + 1..] {
                if a.code[..5] == b.code[..5] && !a.probe.distinct_from(&b.probe) {
                    self.indistinct.push(format!("{}/{}", a.code, b.code));
                }
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{embedded, label_span, page_with};
    use super::*;
    use crate::error::{ProcessingError, ServiceError};
    use crate::ingestion::{EmbeddedImage, Rect, TextSpan};
    use bytes::Bytes;

    const SERIES_TEXT: &str = "Series 83046\nBlackout roller fabric";

    fn numbered(number: u32, text: &str, spans: Vec<TextSpan>, images: Vec<EmbeddedImage>) -> Page {
        Page {
            number,
            ..page_with(text, spans, images)
        }
    }

    fn run_pages(pages: Vec<Page>) -> (tempfile::TempDir, ExtractionReport) {
        run_with(pages, ExtractionConfig::default())
    }

    fn run_with(pages: Vec<Page>, config: ExtractionConfig) -> (tempfile::TempDir, ExtractionReport) {
        let temp = tempfile::tempdir().unwrap();
        let extractor = SwatchExtractor::new(config, temp.path()).unwrap();
        let report = extractor.run(&pages).unwrap();
        (temp, report)
    }

    fn codes(report: &ExtractionReport) -> Vec<&str> {
        report.technical_specs.iter().map(|s| s.code.as_str()).collect()
    }

    fn entries(report: &ExtractionReport, number: u8) -> Vec<&ValidationEntry> {
        report
            .validation_log
            .iter()
            .filter(|e| e.test_number == number)
            .collect()
    }

    #[test]
    fn test_label_directly_below_image() {
        let page = page_with(
            SERIES_TEXT,
            vec![label_span("83046A", 100.0, 300.0)],
            vec![embedded(0, 600, 600, 100.0, 200.0)],
        );
        let (temp, report) = run_pages(vec![page]);

        assert_eq!(codes(&report), vec!["83046A"]);
        let spec = &report.technical_specs[0];
        assert_eq!(spec.filename, "83046A_blackout.png");
        assert_eq!(spec.resolution, "600x600");
        assert_eq!(spec.auto_fixed, None);
        assert!(temp.path().join("Blackout").join("83046A_blackout.png").is_file());
        assert_eq!(report.total_extracted, 1);
        assert_eq!(report.total_expected, 1);
        assert!(report.passed);
    }

    #[test]
    fn test_adjacent_labels_pair_with_image_above() {
        let page = page_with(
            SERIES_TEXT,
            vec![
                label_span("83046A", 100.0, 300.0),
                label_span("83046B", 300.0, 300.0),
            ],
            vec![
                embedded(0, 600, 600, 100.0, 200.0),
                embedded(1, 600, 600, 300.0, 200.0),
            ],
        );
        let (_temp, report) = run_pages(vec![page]);

        assert_eq!(codes(&report), vec!["83046A", "83046B"]);
        assert_eq!(report.page_counts[0].extracted, 2);
        assert_eq!(entries(&report, 19)[0].status, CheckStatus::Pass);
        assert_eq!(entries(&report, 35)[0].status, CheckStatus::Pass);
    }

    #[test]
    fn test_code_outside_series_is_discarded() {
        let page = page_with(
            SERIES_TEXT,
            vec![
                label_span("83046A", 100.0, 300.0),
                label_span("83099A", 400.0, 300.0),
            ],
            vec![
                embedded(0, 600, 600, 100.0, 200.0),
                embedded(1, 600, 600, 400.0, 200.0),
            ],
        );
        let (temp, report) = run_pages(vec![page]);

        assert_eq!(codes(&report), vec!["83046A"]);
        assert!(!temp.path().join("Blackout").join("83099A_blackout.png").exists());
        assert_eq!(report.page_counts[0].expected, 1);
        assert_eq!(entries(&report, 23)[0].status, CheckStatus::Pass);
        assert!(entries(&report, 24)[0].details.contains("83099A"));
    }

    #[test]
    fn test_missing_swatch_recovered_by_auto_fix() {
        // Label left of its image: outside both primary rules, inside the relaxed one
        let page = page_with(
            SERIES_TEXT,
            vec![label_span("83046C", 100.0, 350.0)],
            vec![embedded(0, 600, 600, 300.0, 200.0)],
        );
        let (temp, report) = run_pages(vec![page]);

        assert_eq!(codes(&report), vec!["83046C"]);
        assert_eq!(report.technical_specs[0].auto_fixed, Some(true));
        assert_eq!(report.total_fixed, 1);
        assert_eq!(report.page_counts[0].fixed, 1);
        assert_eq!(report.fixes_by_strategy.get("missing_swatch"), Some(&1));
        assert!(temp.path().join("Blackout").join("83046C_blackout.png").is_file());

        let page_check = entries(&report, 35);
        assert_eq!(page_check.len(), 1);
        assert_eq!(page_check[0].status, CheckStatus::Warn);
        assert_eq!(page_check[0].fix_applied.as_deref(), Some("83046C via missing_swatch"));
        assert!(report.passed);
    }

    #[test]
    fn test_empty_fix_registry_leaves_codes_missing() {
        let page = page_with(
            SERIES_TEXT,
            vec![label_span("83046C", 100.0, 350.0)],
            vec![embedded(0, 600, 600, 300.0, 200.0)],
        );
        let temp = tempfile::tempdir().unwrap();
        let report = SwatchExtractor::new(ExtractionConfig::default(), temp.path())
            .unwrap()
            .with_fix_registry(FixRegistry::empty())
            .run(&vec![page])
            .unwrap();

        assert!(report.technical_specs.is_empty());
        assert_eq!(report.total_fixed, 0);
        assert!(report.fixes_by_strategy.is_empty());
        assert_eq!(entries(&report, 35)[0].status, CheckStatus::Fail);
    }

    #[test]
    fn test_undecodable_image_does_not_abort_page() {
        let broken = EmbeddedImage {
            xref: 9,
            bytes: Bytes::from_static(b"\x89PNG broken"),
            placements: vec![Rect::centered(300.0, 200.0, 100.0, 100.0)],
        };
        let page = page_with(
            SERIES_TEXT,
            vec![label_span("83046A", 100.0, 300.0)],
            vec![broken, embedded(0, 600, 600, 100.0, 200.0)],
        );
        let (_temp, report) = run_pages(vec![page]);

        assert_eq!(codes(&report), vec!["83046A"]);
        assert!(entries(&report, 21)[0].details.contains("1 undecodable"));
    }

    #[test]
    fn test_unrecoverable_code_fails_page_count() {
        let page = page_with(
            SERIES_TEXT,
            vec![
                label_span("83046A", 100.0, 300.0),
                label_span("83046B", 500.0, 700.0),
            ],
            vec![embedded(0, 600, 600, 100.0, 200.0)],
        );
        let (_temp, report) = run_pages(vec![page]);

        assert_eq!(report.total_expected, 2);
        assert_eq!(report.total_extracted, 1);
        assert_eq!(entries(&report, 35)[0].status, CheckStatus::Fail);
        assert_eq!(entries(&report, 36)[0].status, CheckStatus::Warn);
        assert_eq!(entries(&report, 37)[0].status, CheckStatus::Fail);
        assert!(!report.passed);
    }

    #[test]
    fn test_auto_fix_skips_codes_already_extracted() {
        // The same code printed twice far apart: one match, nothing to fix
        let page = page_with(
            SERIES_TEXT,
            vec![
                label_span("83046A", 100.0, 300.0),
                label_span("83046A", 400.0, 600.0),
            ],
            vec![
                embedded(0, 600, 600, 100.0, 200.0),
                embedded(1, 600, 600, 400.0, 500.0),
            ],
        );
        let (_temp, report) = run_pages(vec![page]);

        assert_eq!(codes(&report), vec!["83046A"]);
        assert_eq!(report.total_fixed, 0);
        assert!(report.fixes_by_strategy.is_empty());
    }

    #[test]
    fn test_recovery_onto_claimed_image_is_redirected() {
        let page = page_with(
            SERIES_TEXT,
            vec![
                label_span("83046A", 100.0, 300.0),
                label_span("83046B", 140.0, 360.0),
            ],
            vec![
                embedded(0, 600, 600, 100.0, 200.0),
                embedded(1, 600, 600, 300.0, 335.0),
            ],
        );
        let (_temp, report) = run_pages(vec![page]);

        assert_eq!(codes(&report), vec!["83046A", "83046B"]);
        assert_eq!(report.fixes_by_strategy.get("duplicate_image"), Some(&1));
        assert_eq!(entries(&report, 19)[0].status, CheckStatus::Pass);
    }

    #[test]
    fn test_image_drawn_twice_at_one_spot_is_claimed_once() {
        let mut image = embedded(0, 600, 600, 100.0, 200.0);
        image
            .placements
            .push(Rect::centered(100.0, 200.0, 100.0, 100.0));
        let page = page_with(
            SERIES_TEXT,
            vec![
                label_span("83046A", 100.0, 300.0),
                label_span("83046B", 100.0, 340.0),
            ],
            vec![image],
        );
        let (temp, report) = run_pages(vec![page]);

        assert_eq!(codes(&report), vec!["83046A"]);
        assert!(report.fixes_by_strategy.get("duplicate_image").is_none());
        assert!(!temp.path().join("Blackout").join("83046B_blackout.png").exists());
        assert_eq!(entries(&report, 19)[0].status, CheckStatus::Pass);
        assert_eq!(entries(&report, 35)[0].status, CheckStatus::Fail);
        assert!(entries(&report, 35)[0].details.contains("83046B"));
    }

    #[test]
    fn test_duplicate_claims_count_placements_at_one_spot() {
        let spec = SpecParser::new(r"\b(\d{5})\b")
            .unwrap()
            .parse(1, SERIES_TEXT, &[]);
        let saved_at = |code: &str, placement: usize, cx: f64| {
            let mut image = super::test_support::swatch_at(0, cx, 200.0);
            image.id.placement = placement;
            SavedSwatch {
                code: code.to_string(),
                probe: QualityProbe::measure(&image.pixels),
                image,
                rule: MatchRule::LabelBelow,
                width: 600,
                height: 600,
                upscaled: false,
            }
        };
        let saved = vec![
            saved_at("83046A", 0, 100.0),
            saved_at("83046B", 1, 110.0),
            saved_at("83046C", 2, 400.0),
        ];

        let mut stats = RunStats::default();
        stats.observe_saved(&spec, &saved, 400, 50.0);
        assert_eq!(stats.duplicate_claims, vec!["83046A/83046B"]);
    }

    #[test]
    fn test_page_without_series_is_not_filtered() {
        let page = page_with(
            "Transparent sheer collection",
            vec![
                label_span("83046A", 100.0, 300.0),
                label_span("91000B", 300.0, 300.0),
            ],
            vec![
                embedded(0, 600, 600, 100.0, 200.0),
                embedded(1, 600, 600, 300.0, 200.0),
            ],
        );
        let (temp, report) = run_pages(vec![page]);

        assert_eq!(codes(&report), vec!["83046A", "91000B"]);
        assert_eq!(report.page_counts[0].expected, 0);
        assert_eq!(report.page_counts[0].series, None);
        assert_eq!(entries(&report, 22)[0].status, CheckStatus::Warn);
        assert!(temp.path().join("Transparent").join("91000B_transparent.png").is_file());
        assert!(report.passed);
    }

    #[test]
    fn test_curled_pool_used_for_leftover_labels() {
        let page = page_with(
            SERIES_TEXT,
            vec![
                label_span("83046A", 100.0, 300.0),
                label_span("83046B", 400.0, 300.0),
            ],
            vec![
                embedded(0, 600, 600, 100.0, 200.0),
                embedded(1, 900, 600, 400.0, 200.0),
            ],
        );
        let (_temp, report) = run_pages(vec![page]);

        assert_eq!(codes(&report), vec!["83046A", "83046B"]);
        assert!(entries(&report, 20)[0].details.starts_with("1 flat, 1 curled"));
        assert_eq!(report.technical_specs[1].resolution, "900x600");
    }

    #[test]
    fn test_ledger_covers_every_check_once_per_identity() {
        let pages = vec![
            numbered(
                1,
                SERIES_TEXT,
                vec![label_span("83046A", 100.0, 300.0)],
                vec![embedded(0, 600, 600, 100.0, 200.0)],
            ),
            numbered(2, "Series 83047", vec![], vec![]),
        ];
        let (temp, report) = run_pages(pages);

        let numbers: BTreeSet<u8> = report.validation_log.iter().map(|e| e.test_number).collect();
        assert_eq!(numbers, (1..=37).collect());
        assert_eq!(report.validations_total, 37);
        // Test 35 once per page, everything else once
        assert_eq!(entries(&report, 35).len(), 2);
        assert_eq!(report.validation_log.len(), 38);
        assert_eq!(
            report.validations_passed + report.validations_failed + report.validations_warned,
            report.validation_log.len()
        );

        // Phase 1 first, then page checks, then 36 and 37 last
        assert_eq!(report.validation_log[0].test_number, 1);
        assert_eq!(report.validation_log[4].test_number, 35);
        let tail: Vec<u8> = report.validation_log[36..].iter().map(|e| e.test_number).collect();
        assert_eq!(tail, vec![36, 37]);

        for file in [
            output::TECHNICAL_SPECS_JSON,
            output::TECHNICAL_SPECS_CSV,
            output::VALIDATION_LOG_JSON,
        ] {
            assert!(temp.path().join(file).is_file(), "{file} missing");
        }
        let log: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(temp.path().join(output::VALIDATION_LOG_JSON)).unwrap(),
        )
        .unwrap();
        assert_eq!(log.as_array().unwrap().len(), 38);
    }

    #[test]
    fn test_page_window() {
        let page = |number| {
            numbered(
                number,
                SERIES_TEXT,
                vec![label_span("83046A", 100.0, 300.0)],
                vec![embedded(0, 600, 600, 100.0, 200.0)],
            )
        };
        let config = ExtractionConfig {
            first_page: 2,
            last_page: Some(3),
            ..ExtractionConfig::default()
        };
        let (_temp, report) = run_with(vec![page(1), page(2), page(3), page(4)], config);
        let pages: Vec<u32> = report.page_counts.iter().map(|p| p.page).collect();
        assert_eq!(pages, vec![2, 3]);
    }

    #[test]
    fn test_empty_document_still_completes_checklist() {
        let (temp, report) = run_pages(Vec::new());
        assert_eq!(entries(&report, 1)[0].status, CheckStatus::Fail);
        assert_eq!(entries(&report, 35)[0].status, CheckStatus::Warn);
        assert_eq!(report.validation_log.len(), 37);
        assert!(temp.path().join("Super_Blackout").is_dir());
        let csv = std::fs::read_to_string(temp.path().join(output::TECHNICAL_SPECS_CSV)).unwrap();
        assert_eq!(csv.lines().count(), 1);
    }

    #[test]
    fn test_low_resolution_swatch_is_upscaled() {
        let config = ExtractionConfig {
            min_swatch_px: 100,
            auto_fix: crate::config::AutoFixConfig {
                min_px: 100,
                ..Default::default()
            },
            ..ExtractionConfig::default()
        };
        let page = page_with(
            SERIES_TEXT,
            vec![label_span("83046A", 100.0, 300.0)],
            vec![embedded(0, 200, 200, 100.0, 200.0)],
        );
        let (_temp, report) = run_with(vec![page], config);

        assert_eq!(report.technical_specs[0].resolution, "300x300");
        assert_eq!(report.fixes_by_strategy.get("low_resolution"), Some(&1));
        assert_eq!(entries(&report, 15)[0].status, CheckStatus::Pass);
    }

    #[test]
    fn test_invalid_series_pattern_rejected_at_construction() {
        let temp = tempfile::tempdir().unwrap();
        let config = ExtractionConfig {
            series_pattern: "(".to_string(),
            ..ExtractionConfig::default()
        };
        assert!(matches!(
            SwatchExtractor::new(config, temp.path()),
            Err(ServiceError::Config { .. })
        ));
    }

    #[test]
    fn test_missing_pdf_is_fatal() {
        let temp = tempfile::tempdir().unwrap();
        let result = extract_catalog(
            &temp.path().join("missing.pdf"),
            &temp.path().join("out"),
            ExtractionConfig::default(),
        );
        // Either pdfium is not installed or the file cannot be opened
        assert!(matches!(
            result,
            Err(ServiceError::Processing(
                ProcessingError::PdfiumUnavailable { .. } | ProcessingError::DocumentOpen { .. }
            ))
        ));
    }
}
