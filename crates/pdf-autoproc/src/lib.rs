//! Unattended processing of scanned-document archives.
//!
//! The watch loop polls an inbox for ZIP archives, stamps every PDF inside
//! with a dated mark, imposes it two-up on the target sheet, writes the result
//! atomically to the output folder and optionally prints it. Archives are
//! recorded in a durable ledger only once every document inside succeeded.

pub mod cleanup;
mod client;
mod config;
mod dispatch;
mod error;
mod extract;
mod fingerprint;
mod ledger;
mod pipeline;
mod printer;
mod work;

pub use client::PipelineClient;
pub use config::{LoggingConfig, PipelineConfig, StampStyle};
pub use dispatch::{Dispatcher, FolderSink, OutputSink, RetryPolicy, atomic_write, atomic_write_with};
pub use error::{FailureKind, PipelineError, Result};
pub use extract::{ExtractedArchive, extract_archive, is_archive};
pub use fingerprint::Fingerprint;
pub use ledger::{Ledger, LedgerError, ProcessedRecord, RecordOutcome};
pub use pipeline::{CycleReport, Pipeline, PipelineEvent, PipelineStatus, ResultLog, StopHandle, run_forever};
pub use printer::{CommandPrinter, LogPrinter, Printer};
pub use work::{Outcome, OutputNames, ProcessingResult, Stage, WorkItem, output_file_name};

// Engine types that appear in the configuration and API
pub use pdf_impose::{Arrangement, Orientation, PaperSize, SheetLayout};
pub use pdf_stamp::{Clock, Corner, FixedClock, Rgb, StampSpec, SystemClock};
