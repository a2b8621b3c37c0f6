//! Archive extraction into an isolated scratch folder

use crate::error::{PipelineError, Result};
use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};
use zip::ZipArchive;
use zip::result::ZipError;

/// PDFs extracted from one archive
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedArchive {
    pub scratch_dir: PathBuf,
    /// Extracted documents, sorted by their path inside the archive
    pub documents: Vec<PathBuf>,
    /// Entries skipped because they are not PDFs
    pub ignored: Vec<String>,
}

impl ExtractedArchive {
    /// Path of a document relative to the scratch folder
    pub fn relative_path<'a>(&self, document: &'a Path) -> &'a Path {
        document.strip_prefix(&self.scratch_dir).unwrap_or(document)
    }
}

/// Whether a path looks like an inbox archive (`*.zip`, not hidden)
pub fn is_archive(path: &Path) -> bool {
    let hidden = path
        .file_name()
        .and_then(|n| n.to_str())
        .is_none_or(|n| n.starts_with('.'));
    !hidden && has_extension(path, "zip")
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

/// Extract every PDF of `archive` into `scratch_dir`.
///
/// Whatever is already at `scratch_dir` is a remnant of an earlier attempt and
/// is removed first. Entries that are not PDFs are ignored.
pub async fn extract_archive(archive: &Path, scratch_dir: &Path) -> Result<ExtractedArchive> {
    let archive = archive.to_path_buf();
    let scratch_dir = scratch_dir.to_path_buf();
    tokio::task::spawn_blocking(move || extract_archive_sync(&archive, &scratch_dir)).await?
}

fn extract_archive_sync(archive: &Path, scratch_dir: &Path) -> Result<ExtractedArchive> {
    if scratch_dir.exists() {
        log::debug!("Removing stale scratch folder {}", scratch_dir.display());
        fs::remove_dir_all(scratch_dir)
            .map_err(|e| PipelineError::io("clearing scratch folder", scratch_dir, e))?;
    }
    fs::create_dir_all(scratch_dir)
        .map_err(|e| PipelineError::io("creating scratch folder", scratch_dir, e))?;

    let file = File::open(archive).map_err(|e| PipelineError::io("opening archive", archive, e))?;
    let mut zip = ZipArchive::new(file).map_err(|e| zip_error(archive, e))?;

    let mut documents = Vec::new();
    let mut ignored = Vec::new();

    for index in 0..zip.len() {
        let mut entry = zip.by_index(index).map_err(|e| zip_error(archive, e))?;
        if entry.is_dir() {
            continue;
        }

        let name = entry.name().to_string();
        let relative = sanitize_archive_path(&name).ok_or_else(|| {
            PipelineError::malformed(archive, format!("entry '{}' escapes the archive", name))
        })?;

        if !is_document(&relative) {
            log::debug!("Ignoring non-PDF entry '{}' in {}", name, archive.display());
            ignored.push(name);
            continue;
        }

        let destination = scratch_dir.join(&relative);
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| PipelineError::io("creating scratch folder", parent, e))?;
        }
        let mut output = File::create(&destination)
            .map_err(|e| PipelineError::io("creating extracted file", &destination, e))?;
        io::copy(&mut entry, &mut output).map_err(|e| match e.kind() {
            // Checksum and decompression failures surface as InvalidData
            io::ErrorKind::InvalidData => PipelineError::malformed(archive, e),
            _ => PipelineError::io("extracting", &destination, e),
        })?;

        documents.push(destination);
    }

    documents.sort();
    Ok(ExtractedArchive {
        scratch_dir: scratch_dir.to_path_buf(),
        documents,
        ignored,
    })
}

/// PDF entries, excluding resource forks that macOS archivers add
fn is_document(relative: &Path) -> bool {
    let in_resource_fork_dir = relative
        .components()
        .any(|c| c.as_os_str() == "__MACOSX");
    let resource_fork = relative
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with("._"));
    has_extension(relative, "pdf") && !in_resource_fork_dir && !resource_fork
}

/// Relative path of an entry, or `None` if it is absolute or climbs out
fn sanitize_archive_path(entry: &str) -> Option<PathBuf> {
    let path = Path::new(entry);
    if path.is_absolute() {
        return None;
    }

    let mut sanitized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(segment) => sanitized.push(segment),
            Component::CurDir => {}
            _ => return None,
        }
    }
    (!sanitized.as_os_str().is_empty()).then_some(sanitized)
}

fn zip_error(archive: &Path, err: ZipError) -> PipelineError {
    match err {
        ZipError::Io(e) => PipelineError::io("reading archive", archive, e),
        other => PipelineError::malformed(archive, other),
    }
}
