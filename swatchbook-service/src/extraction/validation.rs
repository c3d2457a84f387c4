//! Validation ledger.
//!
//! A fixed checklist of 37 tests across 9 phases. Most entries acknowledge that
//! an extraction stage ran ([`CheckKind::Structural`]); the rest are computed
//! from run data ([`CheckKind::Invariant`]). Entries are append-only.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// One checklist identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Check {
    pub phase: u8,
    pub number: u8,
    pub name: &'static str,
}

const fn check(phase: u8, number: u8, name: &'static str) -> Check {
    Check {
        phase,
        number,
        name,
    }
}

pub const CHECKS: [Check; 37] = [
    check(1, 1, "PDF File Loading & Page Count Detection"),
    check(1, 2, "Text Extraction from PDF"),
    check(1, 3, "Image Extraction from PDF"),
    check(1, 4, "Fabric Code Pattern Detection"),
    check(2, 5, "Shape Detection - Square (aspect 0.9-1.1)"),
    check(2, 6, "Shape Detection - Rectangle Wide (aspect >1.1)"),
    check(2, 7, "Shape Detection - Rectangle Tall (aspect <0.9)"),
    check(2, 8, "Label Position - Below Image"),
    check(2, 9, "Label Position - Right of Image"),
    check(2, 10, "Label Position - Diagonal"),
    check(3, 11, "Yellow Border Detection"),
    check(3, 12, "White Background Detection"),
    check(3, 13, "Content Validation (not empty)"),
    check(3, 14, "Distinct Color Verification"),
    check(4, 15, "Minimum Resolution Check (≥300px)"),
    check(4, 16, "Original Resolution Preserved"),
    check(4, 17, "Image Format Validation (lossless)"),
    check(5, 18, "Label-to-Image Coordinate Matching"),
    check(5, 19, "Duplicate Image Detection"),
    check(5, 20, "Flat Swatch Priority over Curled"),
    check(5, 21, "PDF Artifact Removal"),
    check(6, 22, "Series Number Extraction per Page"),
    check(6, 23, "Code-Series Match Validation"),
    check(6, 24, "Mismatched Code Detection & Removal"),
    check(7, 25, "Composition Extraction"),
    check(7, 26, "Max Width Extraction (cm)"),
    check(7, 27, "Thickness Extraction (mm)"),
    check(7, 28, "Weight Extraction (g/m²)"),
    check(7, 29, "Blackout Rate Classification"),
    check(8, 30, "Folder Structure by Category"),
    check(8, 31, "File Naming Convention"),
    check(8, 32, "Technical Specs CSV Export"),
    check(8, 33, "Technical Specs JSON Export"),
    check(8, 34, "Validation Log Export"),
    check(9, 35, "Expected vs Extracted Count"),
    check(9, 36, "Missing Swatch Detection & Auto-Fix"),
    check(9, 37, "Total Count Validation"),
];

/// Look up a checklist identity by test number.
pub fn check_for(number: u8) -> Option<&'static Check> {
    CHECKS.iter().find(|c| c.number == number)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CheckStatus {
    Pass,
    Fail,
    Warn,
}

impl CheckStatus {
    pub fn pass_if(ok: bool) -> Self {
        if ok { CheckStatus::Pass } else { CheckStatus::Fail }
    }

    pub fn warn_unless(ok: bool) -> Self {
        if ok { CheckStatus::Pass } else { CheckStatus::Warn }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckKind {
    /// Acknowledges that a stage executed
    Structural,
    /// Computed from extraction results
    Invariant,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationEntry {
    pub phase: String,
    pub test_number: u8,
    pub test_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    pub status: CheckStatus,
    pub kind: CheckKind,
    pub details: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fix_applied: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Append-only list of [`ValidationEntry`].
#[derive(Debug, Default)]
pub struct ValidationLedger {
    entries: Vec<ValidationEntry>,
}

impl ValidationLedger {
    /// Record a run-level entry.
    pub fn record(
        &mut self,
        number: u8,
        status: CheckStatus,
        kind: CheckKind,
        details: impl Into<String>,
    ) {
        self.push(number, None, status, kind, details.into(), None);
    }

    /// Acknowledge a stage that ran; always passes.
    pub fn acknowledge(&mut self, number: u8, details: impl Into<String>) {
        self.record(number, CheckStatus::Pass, CheckKind::Structural, details);
    }

    /// Record a per-page entry, optionally naming the fix that was applied.
    pub fn record_page(
        &mut self,
        number: u8,
        page: u32,
        status: CheckStatus,
        details: impl Into<String>,
        fix_applied: Option<String>,
    ) {
        self.push(
            number,
            Some(page),
            status,
            CheckKind::Invariant,
            details.into(),
            fix_applied,
        );
    }

    fn push(
        &mut self,
        number: u8,
        page: Option<u32>,
        status: CheckStatus,
        kind: CheckKind,
        details: String,
        fix_applied: Option<String>,
    ) {
        let (phase, name) = match check_for(number) {
            Some(check) => (check.phase, check.name.to_string()),
            None => (0, format!("Test {number}")),
        };
        let test_name = match page {
            Some(page) => format!("Page {page}: {name}"),
            None => name,
        };

        if status == CheckStatus::Fail {
            tracing::warn!(test = number, page, details = %details, "Validation failed");
        }

        self.entries.push(ValidationEntry {
            phase: format!("Phase {phase}"),
            test_number: number,
            test_name,
            page,
            status,
            kind,
            details,
            fix_applied,
            timestamp: Utc::now(),
        });
    }

    pub fn entries(&self) -> &[ValidationEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<ValidationEntry> {
        self.entries
    }

    pub fn count(&self, status: CheckStatus) -> usize {
        self.entries.iter().filter(|e| e.status == status).count()
    }

    pub fn passed(&self) -> usize {
        self.count(CheckStatus::Pass)
    }

    pub fn failed(&self) -> usize {
        self.count(CheckStatus::Fail)
    }

    pub fn warned(&self) -> usize {
        self.count(CheckStatus::Warn)
    }

    /// Distinct test numbers recorded so far, ascending.
    pub fn test_numbers(&self) -> Vec<u8> {
        let mut numbers: Vec<u8> = self.entries.iter().map(|e| e.test_number).collect();
        numbers.sort_unstable();
        numbers.dedup();
        numbers
    }
}
