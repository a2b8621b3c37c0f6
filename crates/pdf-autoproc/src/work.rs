use crate::error::{FailureKind, PipelineError};
use crate::fingerprint::Fingerprint;
use chrono::{DateTime, Utc};
use pdf_impose::PaperSize;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

/// One inbox archive admitted for processing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub source_path: PathBuf,
    pub discovered_at: DateTime<Utc>,
    pub fingerprint: Fingerprint,
}

impl WorkItem {
    pub fn new(source_path: impl Into<PathBuf>, fingerprint: Fingerprint) -> Self {
        Self {
            source_path: source_path.into(),
            discovered_at: Utc::now(),
            fingerprint,
        }
    }

    /// Archive file name, for records and display
    pub fn archive_name(&self) -> String {
        archive_name(&self.source_path)
    }

    /// Archive file name without extension
    pub fn stem(&self) -> String {
        self.source_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "archive".to_string())
    }
}

fn archive_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure,
}

/// Final report for one archive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub archive: PathBuf,
    /// `None` when the archive could not even be read
    pub fingerprint: Option<Fingerprint>,
    /// Documents written, including those written before a later failure
    pub outputs: Vec<PathBuf>,
    pub outcome: Outcome,
    pub error: Option<String>,
    pub failure_kind: Option<FailureKind>,
    /// Consecutive failures of this archive, 0 on success
    pub consecutive_failures: u32,
    pub finished_at: DateTime<Utc>,
}

impl ProcessingResult {
    pub fn success(item: &WorkItem, outputs: Vec<PathBuf>) -> Self {
        Self {
            archive: item.source_path.clone(),
            fingerprint: Some(item.fingerprint.clone()),
            outputs,
            outcome: Outcome::Success,
            error: None,
            failure_kind: None,
            consecutive_failures: 0,
            finished_at: Utc::now(),
        }
    }

    pub fn failure(
        archive: impl Into<PathBuf>,
        fingerprint: Option<Fingerprint>,
        outputs: Vec<PathBuf>,
        error: &PipelineError,
    ) -> Self {
        Self {
            archive: archive.into(),
            fingerprint,
            outputs,
            outcome: Outcome::Failure,
            error: Some(error.to_string()),
            failure_kind: Some(error.kind()),
            consecutive_failures: 1,
            finished_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }

    pub fn archive_name(&self) -> String {
        archive_name(&self.archive)
    }
}

impl fmt::Display for ProcessingResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.outcome, &self.error) {
            (Outcome::Success, _) => write!(
                f,
                "{}: ok, {} document(s)",
                self.archive_name(),
                self.outputs.len()
            ),
            (Outcome::Failure, error) => write!(
                f,
                "{}: failed ({}x): {}",
                self.archive_name(),
                self.consecutive_failures,
                error.as_deref().unwrap_or("unknown error")
            ),
        }
    }
}

/// Where the watch loop is in its per-archive state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    Idle,
    Scanning,
    Extracting,
    Stamping,
    Imposing,
    Dispatching,
    Recording,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Idle => "idle",
            Stage::Scanning => "scanning",
            Stage::Extracting => "extracting",
            Stage::Stamping => "stamping",
            Stage::Imposing => "imposing",
            Stage::Dispatching => "dispatching",
            Stage::Recording => "recording",
            Stage::Failed => "failed",
        })
    }
}

/// Output file name for one document of an archive:
/// `{archive}_{document}_{sheet}.pdf`, where the document part is its path
/// inside the archive without extension.
pub fn output_file_name(archive_stem: &str, document: &Path, sheet: PaperSize) -> String {
    let document = document.with_extension("");
    let document = document
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("_");
    sanitize_file_name(&format!("{}_{}_{}.pdf", archive_stem, document, sheet.label()))
}

/// Output names already handed out for one archive.
///
/// Different entry paths can flatten to the same name (`a/b.pdf` and
/// `a_b.pdf`). Later claims of a taken name get `_2`, `_3`, ... before the
/// extension. Names compare case-insensitively, as on Windows shares.
#[derive(Debug, Default)]
pub struct OutputNames {
    taken: HashSet<String>,
}

impl OutputNames {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn claim(&mut self, name: String) -> String {
        if self.taken.insert(name.to_lowercase()) {
            return name;
        }
        let (stem, extension) = match name.rsplit_once('.') {
            Some((stem, extension)) => (stem, format!(".{}", extension)),
            None => (name.as_str(), String::new()),
        };
        let mut n = 2;
        loop {
            let candidate = format!("{}_{}{}", stem, n, extension);
            if self.taken.insert(candidate.to_lowercase()) {
                return candidate;
            }
            n += 1;
        }
    }
}

fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_file_name() {
        assert_eq!(
            output_file_name("batch1", Path::new("scan.pdf"), PaperSize::B5),
            "batch1_scan_B5.pdf"
        );
        assert_eq!(
            output_file_name("batch1", Path::new("dept/scan.PDF"), PaperSize::B5Iso),
            "batch1_dept_scan_B5-ISO.pdf"
        );
        assert_eq!(
            output_file_name("a:b", Path::new("x?.pdf"), PaperSize::A4),
            "a_b_x__A4.pdf"
        );
    }

    #[test]
    fn test_colliding_output_names_get_suffixes() {
        let mut names = OutputNames::new();
        let nested = output_file_name("batch1", Path::new("a/b.pdf"), PaperSize::B5);
        let flat = output_file_name("batch1", Path::new("a_b.pdf"), PaperSize::B5);
        assert_eq!(nested, flat);

        assert_eq!(names.claim(nested), "batch1_a_b_B5.pdf");
        assert_eq!(names.claim(flat), "batch1_a_b_B5_2.pdf");
        assert_eq!(names.claim("BATCH1_A_B_B5.pdf".to_string()), "BATCH1_A_B_B5_3.pdf");
        // A real document with a suffixed name does not reuse a handed-out one
        assert_eq!(names.claim("batch1_a_b_B5_2.pdf".to_string()), "batch1_a_b_B5_2_2.pdf");
        assert_eq!(names.claim("batch1_c_B5.pdf".to_string()), "batch1_c_B5.pdf");
    }

    #[test]
    fn test_result_display() {
        let item = WorkItem::new("inbox/batch1.zip", Fingerprint::of_bytes(b"x"));
        let ok = ProcessingResult::success(&item, vec![PathBuf::from("out/a.pdf")]);
        assert_eq!(ok.to_string(), "batch1.zip: ok, 1 document(s)");

        let err = PipelineError::malformed("a.pdf", "bad xref");
        let failed = ProcessingResult::failure(&item.source_path, None, Vec::new(), &err);
        assert!(failed.to_string().starts_with("batch1.zip: failed (1x): "));
        assert_eq!(failed.failure_kind, Some(FailureKind::MalformedDocument));
    }
}
