//! Packaging of extraction output into a zip archive.

use std::fs::File;
use std::io::{self, BufWriter};
use std::path::Path;

use tracing::debug;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{ProcessingError, ServiceResult};

/// Zip every file under `source` into `destination` (deflate), with paths
/// relative to `source`. Returns the number of files written.
pub fn zip_directory(source: &Path, destination: &Path) -> ServiceResult<usize> {
    let count = write_archive(source, destination).map_err(|e| ProcessingError::Archive {
        path: destination.to_path_buf(),
        source: e,
    })?;
    debug!(
        source = %source.display(),
        archive = %destination.display(),
        files = count,
        "Wrote output archive"
    );
    Ok(count)
}

fn write_archive(source: &Path, destination: &Path) -> zip::result::ZipResult<usize> {
    let mut zip = ZipWriter::new(BufWriter::new(File::create(destination)?));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut count = 0;
    for entry in WalkDir::new(source).sort_by_file_name() {
        let entry = entry.map_err(io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(source) else {
            continue;
        };
        let name = relative.to_string_lossy().replace('\\', "/");

        zip.start_file(name, options)?;
        io::copy(&mut File::open(entry.path())?, &mut zip)?;
        count += 1;
    }

    zip.finish()?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use zip::ZipArchive;

    #[test]
    fn test_zip_keeps_relative_layout() {
        let temp = tempfile::tempdir().unwrap();
        let source = temp.path().join("extraction_run");
        std::fs::create_dir_all(source.join("Blackout")).unwrap();
        std::fs::create_dir_all(source.join("Transparent")).unwrap();
        std::fs::write(source.join("Blackout/83046A_blackout.png"), b"png").unwrap();
        std::fs::write(source.join("validation_log.json"), b"[]").unwrap();

        let archive_path = temp.path().join("FabricSwatches_run.zip");
        assert_eq!(zip_directory(&source, &archive_path).unwrap(), 2);

        let mut archive = ZipArchive::new(File::open(&archive_path).unwrap()).unwrap();
        let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
        names.sort();
        assert_eq!(names, vec!["Blackout/83046A_blackout.png", "validation_log.json"]);

        let mut content = String::new();
        archive
            .by_name("validation_log.json")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "[]");
    }

    #[test]
    fn test_unwritable_destination_is_archive_error() {
        let temp = tempfile::tempdir().unwrap();
        let result = zip_directory(temp.path(), &temp.path().join("missing/dir/out.zip"));
        assert!(matches!(
            result,
            Err(crate::error::ServiceError::Processing(ProcessingError::Archive { .. }))
        ));
    }
}
