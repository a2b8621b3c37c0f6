use crate::dispatch::RetryPolicy;
use crate::error::{PipelineError, Result};
use pdf_impose::{Arrangement, Orientation, PaperSize, SheetLayout, SheetMargins};
use pdf_stamp::{Corner, Rgb, StampSpec};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Resolved settings for one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Folder polled for ZIP archives
    pub inbox_path: PathBuf,
    /// Folder receiving imposed PDFs
    pub output_path: PathBuf,
    /// Per-archive extraction workspace
    pub scratch_path: PathBuf,
    /// Processed-set ledger file
    pub ledger_path: PathBuf,
    /// Where recorded archives are moved; `None` leaves them in the inbox
    pub processed_archive_path: Option<PathBuf>,
    pub monitor_interval_seconds: u64,
    /// Target sheet, e.g. `B5`, `A4` or `182x257`
    pub sheet_size: String,
    pub sheet_orientation: Orientation,
    pub arrangement: Arrangement,
    pub sheet_margin_mm: f32,
    pub gutter_mm: f32,
    /// Stamp text; `{date}` is replaced by the processing date
    pub stamp_text_template: String,
    pub stamp: StampStyle,
    pub print_enabled: bool,
    /// Print command and arguments; `{file}` is replaced by the PDF path,
    /// which is appended when no argument contains the placeholder
    pub print_command: Vec<String>,
    pub print_timeout_seconds: u64,
    /// Total attempts per I/O operation, including the first
    pub retry_attempts: u32,
    pub retry_backoff_seconds: f64,
    /// Number of recent results kept for display
    pub results_capacity: usize,
    /// Age after which leftover scratch folders are purged; 0 keeps them
    pub scratch_retention_days: u64,
    pub logging: LoggingConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            inbox_path: PathBuf::from("inbox"),
            output_path: PathBuf::from("output"),
            scratch_path: PathBuf::from("work/scratch"),
            ledger_path: PathBuf::from("work/ledger.jsonl"),
            processed_archive_path: None,
            monitor_interval_seconds: 60,
            sheet_size: "B5".to_string(),
            sheet_orientation: Orientation::Landscape,
            arrangement: Arrangement::SideBySide,
            sheet_margin_mm: pdf_impose::constants::DEFAULT_SHEET_MARGIN_MM,
            gutter_mm: pdf_impose::constants::DEFAULT_GUTTER_MM,
            stamp_text_template: StampSpec::default().text_template,
            stamp: StampStyle::default(),
            print_enabled: false,
            print_command: Vec::new(),
            print_timeout_seconds: 120,
            retry_attempts: 3,
            retry_backoff_seconds: 5.0,
            results_capacity: 50,
            scratch_retention_days: 7,
            logging: LoggingConfig::default(),
        }
    }
}

/// Stamp placement and style
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StampStyle {
    pub corner: Corner,
    pub offset_x_mm: f32,
    pub offset_y_mm: f32,
    pub font_size_pt: f32,
    pub color: Rgb,
    pub opacity: f32,
    pub date_format: String,
    pub frame: bool,
}

impl Default for StampStyle {
    fn default() -> Self {
        let spec = StampSpec::default();
        Self {
            corner: spec.corner,
            offset_x_mm: spec.offset_x_mm,
            offset_y_mm: spec.offset_y_mm,
            font_size_pt: spec.font_size_pt,
            color: spec.color,
            opacity: spec.opacity,
            date_format: spec.date_format,
            frame: spec.frame,
        }
    }
}

/// Log destination settings, applied by the front-end
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `error`, `warn`, `info`, `debug` or `trace`
    pub level: String,
    /// Log file; `None` logs to stderr only
    pub file: Option<PathBuf>,
    pub max_file_size_mb: u64,
    /// Rotated files kept next to the log file
    pub backup_count: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            max_file_size_mb: 10,
            backup_count: 5,
        }
    }
}

impl PipelineConfig {
    /// Load a configuration from a JSON file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            PipelineError::Configuration(format!("Cannot read {}: {}", path.display(), e))
        })?;
        serde_json::from_slice(&bytes).map_err(|e| {
            PipelineError::Configuration(format!("Failed to parse {}: {}", path.display(), e))
        })
    }

    /// Save the configuration as pretty-printed JSON
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self).map_err(|e| {
            PipelineError::Configuration(format!("Failed to serialize configuration: {}", e))
        })?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| PipelineError::io("creating config folder", parent, e))?;
        }
        tokio::fs::write(path, json)
            .await
            .map_err(|e| PipelineError::io("writing config", path, e))
    }

    /// Check every value that can be checked without touching the filesystem
    pub fn validate(&self) -> Result<()> {
        let named_paths = [
            ("inbox_path", &self.inbox_path),
            ("output_path", &self.output_path),
            ("scratch_path", &self.scratch_path),
            ("ledger_path", &self.ledger_path),
        ];
        for (name, path) in named_paths {
            if path.as_os_str().is_empty() {
                return Err(PipelineError::Configuration(format!("{} is empty", name)));
            }
        }

        if self.scratch_path == self.inbox_path || self.scratch_path == self.output_path {
            return Err(PipelineError::Configuration(
                "scratch_path must be separate from the inbox and output folders".to_string(),
            ));
        }

        if self.monitor_interval_seconds == 0 {
            return Err(PipelineError::Configuration(
                "monitor_interval_seconds must be at least 1".to_string(),
            ));
        }

        self.sheet_layout()?;
        self.stamp_spec()
            .validate()
            .map_err(|e| PipelineError::Configuration(e.to_string()))?;

        if self.retry_attempts == 0 {
            return Err(PipelineError::Configuration(
                "retry_attempts must be at least 1".to_string(),
            ));
        }
        if !(self.retry_backoff_seconds.is_finite() && self.retry_backoff_seconds >= 0.0) {
            return Err(PipelineError::Configuration(format!(
                "retry_backoff_seconds must be non-negative, got {}",
                self.retry_backoff_seconds
            )));
        }

        if self.results_capacity == 0 {
            return Err(PipelineError::Configuration(
                "results_capacity must be at least 1".to_string(),
            ));
        }

        if self.print_enabled && self.print_timeout_seconds == 0 {
            return Err(PipelineError::Configuration(
                "print_timeout_seconds must be at least 1".to_string(),
            ));
        }
        if self.print_command.first().is_some_and(|p| p.trim().is_empty()) {
            return Err(PipelineError::Configuration(
                "print_command program is empty".to_string(),
            ));
        }

        log::LevelFilter::from_str(&self.logging.level).map_err(|_| {
            PipelineError::Configuration(format!("Unknown log level: {}", self.logging.level))
        })?;

        Ok(())
    }

    /// Parsed and validated sheet layout
    pub fn sheet_layout(&self) -> Result<SheetLayout> {
        let paper = PaperSize::from_str(&self.sheet_size)
            .map_err(|e| PipelineError::Configuration(e.to_string()))?;
        let layout = SheetLayout {
            paper,
            orientation: self.sheet_orientation,
            arrangement: self.arrangement,
            margins: SheetMargins::uniform(self.sheet_margin_mm),
            gutter_mm: self.gutter_mm,
        };
        layout
            .validate()
            .map_err(|e| PipelineError::Configuration(e.to_string()))?;
        Ok(layout)
    }

    pub fn stamp_spec(&self) -> StampSpec {
        StampSpec {
            text_template: self.stamp_text_template.clone(),
            date_format: self.stamp.date_format.clone(),
            corner: self.stamp.corner,
            offset_x_mm: self.stamp.offset_x_mm,
            offset_y_mm: self.stamp.offset_y_mm,
            font_size_pt: self.stamp.font_size_pt,
            color: self.stamp.color,
            opacity: self.stamp.opacity,
            frame: self.stamp.frame,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_attempts,
            Duration::from_secs_f64(self.retry_backoff_seconds.max(0.0)),
        )
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_seconds)
    }

    pub fn print_timeout(&self) -> Duration {
        Duration::from_secs(self.print_timeout_seconds)
    }

    /// Scratch retention, `None` when purging is disabled
    pub fn scratch_retention(&self) -> Option<Duration> {
        (self.scratch_retention_days > 0)
            .then(|| Duration::from_secs(self.scratch_retention_days * 24 * 60 * 60))
    }
}
