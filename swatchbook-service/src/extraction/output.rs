//! Output directory layout and writers.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use csv::WriterBuilder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use image::{DynamicImage, ExtendedColorType, ImageEncoder};
use serde::Serialize;
use tracing::debug;

use crate::config::ImageOutputFormat;
use crate::error::{ProcessingError, ServiceResult};

use super::page_spec::BlackoutRate;
use super::types::TechnicalSpec;
use super::validation::ValidationEntry;

pub const TECHNICAL_SPECS_JSON: &str = "technical_specifications.json";
pub const TECHNICAL_SPECS_CSV: &str = "technical_specifications.csv";
pub const VALIDATION_LOG_JSON: &str = "validation_log.json";

const CSV_HEADERS: [&str; 12] = [
    "code",
    "filename",
    "category",
    "series",
    "composition",
    "max_width",
    "thickness",
    "weight",
    "blackout_rate",
    "resolution",
    "page",
    "auto_fixed",
];

/// Flat CSV row; every row carries the same columns.
#[derive(Serialize)]
struct SpecRow<'a> {
    code: &'a str,
    filename: &'a str,
    category: &'a str,
    series: Option<&'a str>,
    composition: &'a str,
    max_width: &'a str,
    thickness: &'a str,
    weight: &'a str,
    blackout_rate: &'a str,
    resolution: &'a str,
    page: u32,
    auto_fixed: bool,
}

impl<'a> From<&'a TechnicalSpec> for SpecRow<'a> {
    fn from(spec: &'a TechnicalSpec) -> Self {
        Self {
            code: &spec.code,
            filename: &spec.filename,
            category: &spec.category,
            series: spec.series.as_deref(),
            composition: &spec.composition,
            max_width: &spec.max_width,
            thickness: &spec.thickness,
            weight: &spec.weight,
            blackout_rate: &spec.blackout_rate,
            resolution: &spec.resolution,
            page: spec.page,
            auto_fixed: spec.auto_fixed.unwrap_or(false),
        }
    }
}

/// A run's output directory: one folder per category plus the report files.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: PathBuf,
    format: ImageOutputFormat,
}

impl OutputLayout {
    /// Create the root and every category folder up front.
    pub fn prepare(root: impl Into<PathBuf>, format: ImageOutputFormat) -> ServiceResult<Self> {
        let root = root.into();
        for rate in BlackoutRate::all() {
            let dir = root.join(rate.to_string());
            fs::create_dir_all(&dir).map_err(|e| ProcessingError::output_write(&dir, e))?;
        }
        debug!(root = %root.display(), "Prepared output directory");
        Ok(Self { root, format })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn format(&self) -> ImageOutputFormat {
        self.format
    }

    /// `{code}_{slug}.{ext}`
    pub fn swatch_filename(&self, code: &str, rate: BlackoutRate) -> String {
        format!("{}_{}.{}", code, rate.slug(), self.format.extension())
    }

    /// Save a swatch as 3-channel lossless raster under its category folder.
    ///
    /// Returns the file name.
    pub fn save_swatch(
        &self,
        code: &str,
        rate: BlackoutRate,
        image: &DynamicImage,
    ) -> ServiceResult<String> {
        let filename = self.swatch_filename(code, rate);
        let path = self.root.join(rate.to_string()).join(&filename);
        let rgb = image.to_rgb8();

        let file = File::create(&path).map_err(|e| ProcessingError::output_write(&path, e))?;
        let mut writer = BufWriter::new(file);
        let encoded = match self.format {
            ImageOutputFormat::Png => PngEncoder::new(&mut writer).write_image(
                rgb.as_raw(),
                rgb.width(),
                rgb.height(),
                ExtendedColorType::Rgb8,
            ),
            ImageOutputFormat::Webp => WebPEncoder::new_lossless(&mut writer).write_image(
                rgb.as_raw(),
                rgb.width(),
                rgb.height(),
                ExtendedColorType::Rgb8,
            ),
        };
        encoded.map_err(|e| ProcessingError::output_write(&path, e))?;
        writer
            .flush()
            .map_err(|e| ProcessingError::output_write(&path, e))?;

        Ok(filename)
    }

    /// Write the spec records as JSON and CSV.
    pub fn write_technical_specs(&self, specs: &[TechnicalSpec]) -> ServiceResult<()> {
        self.write_json(TECHNICAL_SPECS_JSON, specs)?;

        let path = self.root.join(TECHNICAL_SPECS_CSV);
        let file = File::create(&path).map_err(|e| ProcessingError::output_write(&path, e))?;
        let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);
        writer
            .write_record(CSV_HEADERS)
            .map_err(|e| ProcessingError::output_write(&path, e))?;
        for spec in specs {
            writer
                .serialize(SpecRow::from(spec))
                .map_err(|e| ProcessingError::output_write(&path, e))?;
        }
        writer
            .flush()
            .map_err(|e| ProcessingError::output_write(&path, e))?;
        Ok(())
    }

    pub fn write_validation_log(&self, entries: &[ValidationEntry]) -> ServiceResult<()> {
        self.write_json(VALIDATION_LOG_JSON, entries)
    }

    fn write_json<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> ServiceResult<()> {
        let path = self.root.join(name);
        let file = File::create(&path).map_err(|e| ProcessingError::output_write(&path, e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, value)
            .map_err(|e| ProcessingError::output_write(&path, e))?;
        writer
            .flush()
            .map_err(|e| ProcessingError::output_write(&path, e))?;
        Ok(())
    }
}
