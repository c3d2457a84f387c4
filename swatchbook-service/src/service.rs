//! Upload handling and output packaging around the extraction engine.

mod archive;

pub use archive::zip_directory;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use chrono::Local;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::StaticConfig;
use crate::error::{ProcessingError, ServiceError, ServiceResult};
use crate::extraction::{ExtractionReport, extract_catalog};
use crate::ingestion::hash::compute_content_hash;

/// Result of one upload: the engine report plus where its output landed.
#[derive(Debug, Serialize)]
pub struct ExtractionResponse {
    #[serde(flatten)]
    pub report: ExtractionReport,
    pub output_dir: PathBuf,
    pub zip_path: PathBuf,
    pub document_hash: String,
}

/// Removes a scratch upload once extraction is done with it.
struct UploadGuard(PathBuf);

impl Drop for UploadGuard {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.0) {
            warn!(path = %self.0.display(), error = %e, "Failed to remove uploaded file");
        }
    }
}

/// Main service coordinator
pub struct SwatchbookService {
    config: Arc<StaticConfig>,
}

impl SwatchbookService {
    /// Create the service, making sure the storage directories exist
    pub fn new(config: Arc<StaticConfig>) -> ServiceResult<Self> {
        for dir in [&config.storage.output_root, &config.storage.upload_dir] {
            fs::create_dir_all(dir).map_err(ProcessingError::Io)?;
        }
        info!(
            output_root = %config.storage.output_root.display(),
            "Initialized swatchbook service"
        );
        Ok(Self { config })
    }

    pub fn config(&self) -> &StaticConfig {
        &self.config
    }

    /// Run the PDF extraction over an uploaded catalog
    pub async fn extract_upload(&self, content: Bytes) -> ServiceResult<ExtractionResponse> {
        let extraction = self.config.extraction.clone();
        self.extract_with(content, move |pdf, output| {
            extract_catalog(pdf, output, extraction)
        })
        .await
    }

    /// Store the upload, run `extract` on a blocking thread, then zip the output.
    pub(crate) async fn extract_with<F>(
        &self,
        content: Bytes,
        extract: F,
    ) -> ServiceResult<ExtractionResponse>
    where
        F: FnOnce(&Path, &Path) -> ServiceResult<ExtractionReport> + Send + 'static,
    {
        let size = content.len() as u64;
        let max = self.config.limits.max_upload_bytes;
        if size > max {
            return Err(ProcessingError::FileTooLarge { size, max }.into());
        }
        if content.is_empty() {
            return Err(ServiceError::InvalidRequest {
                message: "Uploaded file is empty".to_string(),
            });
        }

        let document_hash = compute_content_hash(&content);
        let upload_path = self
            .config
            .storage
            .upload_dir
            .join(format!("{}.pdf", Uuid::new_v4()));
        tokio::fs::write(&upload_path, &content)
            .await
            .map_err(ProcessingError::Io)?;
        let guard = UploadGuard(upload_path);

        let run_id = format!(
            "{}_{}",
            Local::now().format("%Y%m%d_%H%M%S"),
            &Uuid::new_v4().simple().to_string()[..8]
        );
        let output_dir = self
            .config
            .storage
            .output_root
            .join(format!("extraction_{run_id}"));
        let zip_path = self
            .config
            .storage
            .output_root
            .join(format!("FabricSwatches_{run_id}.zip"));

        info!(
            hash = %document_hash,
            size,
            output = %output_dir.display(),
            "Extracting uploaded catalog"
        );

        let output = output_dir.clone();
        let archive = zip_path.clone();
        let report = tokio::task::spawn_blocking(move || {
            let guard = guard;
            let report = extract(&guard.0, &output)?;
            zip_directory(&output, &archive)?;
            Ok::<_, ServiceError>(report)
        })
        .await
        .map_err(|e| ServiceError::Internal {
            message: format!("Extraction task failed: {}", e),
        })??;

        info!(
            extracted = report.total_extracted,
            expected = report.total_expected,
            fixed = report.total_fixed,
            passed = report.passed,
            "Extraction complete"
        );

        Ok(ExtractionResponse {
            report,
            output_dir,
            zip_path,
            document_hash,
        })
    }

    /// Resolve a download request to a file below the output root.
    ///
    /// Relative paths are taken from the output root. Anything that resolves
    /// outside it, symlinks included, is refused.
    pub fn resolve_download(&self, requested: &str) -> ServiceResult<PathBuf> {
        let root = self
            .config
            .storage
            .output_root
            .canonicalize()
            .map_err(ProcessingError::Io)?;
        let requested_path = Path::new(requested);
        let candidate = if requested_path.is_absolute() {
            requested_path.to_path_buf()
        } else {
            root.join(requested_path)
        };

        let resolved = candidate
            .canonicalize()
            .map_err(|_| ServiceError::FileNotFound {
                path: candidate.clone(),
            })?;
        if !resolved.starts_with(&root) {
            warn!(requested, "Refused download outside output root");
            return Err(ServiceError::AccessDenied { path: resolved });
        }
        if !resolved.is_file() {
            return Err(ServiceError::FileNotFound { path: resolved });
        }

        debug!(path = %resolved.display(), "Serving download");
        Ok(resolved)
    }
}
