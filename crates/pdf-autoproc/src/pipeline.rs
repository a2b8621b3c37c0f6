//! Watch loop
//!
//! Per archive: `Extracting -> Stamping -> Imposing -> Dispatching` for every
//! document, then `Recording` once all of them succeeded. Any error moves the
//! archive to `Failed`; it stays out of the ledger and is retried on the next
//! cycle with its scratch folder kept for inspection.

use crate::cleanup;
use crate::config::PipelineConfig;
use crate::dispatch::{Dispatcher, FolderSink, OutputSink};
use crate::error::{PipelineError, Result};
use crate::extract::{extract_archive, is_archive};
use crate::fingerprint::Fingerprint;
use crate::ledger::Ledger;
use crate::printer::{CommandPrinter, LogPrinter, Printer};
use crate::work::{OutputNames, ProcessingResult, Stage, WorkItem, output_file_name};
use chrono::Utc;
use pdf_impose::{ImposeError, SheetLayout, impose_sync, load_pdf_bytes, save_pdf_bytes};
use pdf_stamp::{Clock, StampError, Stamper};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;
use tokio::sync::{broadcast, watch};

const EVENT_CAPACITY: usize = 256;

/// Progress notifications for front-ends
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    Started,
    CycleStarted {
        cycle: u64,
    },
    StageChanged {
        archive: Option<PathBuf>,
        stage: Stage,
    },
    /// Archive already in the ledger
    ArchiveSkipped {
        archive: PathBuf,
    },
    Finished(Box<ProcessingResult>),
    CycleFinished {
        cycle: u64,
        report: CycleReport,
    },
    StopRequested,
    Stopped,
}

/// Counts for one poll cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub scanned: usize,
    pub skipped: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Snapshot of the pipeline for status displays
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineStatus {
    pub stage: Stage,
    pub cycles: u64,
    pub ledger_records: usize,
    pub stop_requested: bool,
    /// Archives currently failing, with their consecutive failure count
    pub failing: Vec<(PathBuf, u32)>,
}

/// Cooperative stop signal; once raised it stays raised
#[derive(Debug, Clone)]
pub struct StopHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl StopHandle {
    fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn request_stop(&self) {
        if !self.tx.send_replace(true) {
            log::info!("Stop requested; finishing the current archive");
        }
    }

    pub fn is_stop_requested(&self) -> bool {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// Bounded, shareable list of recent results, most recent first
#[derive(Debug, Clone)]
pub struct ResultLog {
    entries: Arc<Mutex<VecDeque<ProcessingResult>>>,
    capacity: usize,
}

impl ResultLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&self, result: ProcessingResult) {
        let mut entries = lock(&self.entries);
        entries.push_front(result);
        entries.truncate(self.capacity);
    }

    pub fn snapshot(&self) -> Vec<ProcessingResult> {
        lock(&self.entries).iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The document processing pipeline.
///
/// The ledger mutex doubles as the single-worker guard: archives are processed
/// one at a time, whether they come from the watch loop or `process_one`.
pub struct Pipeline {
    config: PipelineConfig,
    layout: SheetLayout,
    stamper: Stamper,
    sink: Arc<dyn OutputSink>,
    printer: Option<Arc<dyn Printer>>,
    ledger: tokio::sync::Mutex<Ledger>,
    ledger_records: AtomicUsize,
    stage: Mutex<Stage>,
    failures: Mutex<HashMap<PathBuf, u32>>,
    cycles: AtomicU64,
    results: ResultLog,
    stop: StopHandle,
    events: broadcast::Sender<PipelineEvent>,
}

impl Pipeline {
    /// Validate the configuration, prepare folders and open the ledger.
    ///
    /// Every error here is a `Configuration` error: the pipeline must not start.
    pub async fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let layout = config.sheet_layout()?;
        let stamper = Stamper::new(config.stamp_spec())
            .map_err(|e| PipelineError::Configuration(e.to_string()))?;

        prepare_directories(&config).await?;
        let ledger = Ledger::open(&config.ledger_path).await.map_err(|e| {
            PipelineError::Configuration(format!("Cannot open ledger: {}", e))
        })?;

        let removed = cleanup::remove_stale_temp_files(&config.output_path);
        if removed > 0 {
            log::info!("Removed {} interrupted output write(s)", removed);
        }

        let printer = default_printer(&config)?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        log::info!(
            "Pipeline ready: inbox {}, output {}, sheet {}, {} recorded archive(s)",
            config.inbox_path.display(),
            config.output_path.display(),
            layout.paper,
            ledger.len()
        );

        Ok(Self {
            sink: Arc::new(FolderSink::new(&config.output_path)),
            printer,
            ledger_records: AtomicUsize::new(ledger.len()),
            ledger: tokio::sync::Mutex::new(ledger),
            stage: Mutex::new(Stage::Idle),
            failures: Mutex::new(HashMap::new()),
            cycles: AtomicU64::new(0),
            results: ResultLog::new(config.results_capacity),
            stop: StopHandle::new(),
            events,
            layout,
            stamper,
            config,
        })
    }

    /// Date source for stamps
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.stamper = self.stamper.with_clock(clock);
        self
    }

    /// Print capability, used when printing is enabled
    pub fn with_printer(mut self, printer: Arc<dyn Printer>) -> Self {
        if self.config.print_enabled {
            self.printer = Some(printer);
        }
        self
    }

    /// Destination for finished documents
    pub fn with_sink(mut self, sink: Arc<dyn OutputSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn layout(&self) -> &SheetLayout {
        &self.layout
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn result_log(&self) -> ResultLog {
        self.results.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    pub fn request_stop(&self) {
        self.stop.request_stop();
        self.emit(PipelineEvent::StopRequested);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop.is_stop_requested()
    }

    /// Recent results, most recent first
    pub fn last_results(&self) -> Vec<ProcessingResult> {
        self.results.snapshot()
    }

    pub fn status(&self) -> PipelineStatus {
        let mut failing: Vec<_> = lock(&self.failures)
            .iter()
            .map(|(path, count)| (path.clone(), *count))
            .collect();
        failing.sort();
        PipelineStatus {
            stage: *lock(&self.stage),
            cycles: self.cycles.load(Ordering::Relaxed),
            ledger_records: self.ledger_records.load(Ordering::Relaxed),
            stop_requested: self.is_stop_requested(),
            failing,
        }
    }

    /// Poll until a stop is requested.
    ///
    /// The stop signal is checked between archives and interrupts the wait
    /// between cycles; an archive in progress always runs to completion.
    pub async fn run_forever(&self) -> Result<()> {
        let mut stop_rx = self.stop.subscribe();
        log::info!(
            "Watching {} every {}s",
            self.config.inbox_path.display(),
            self.config.monitor_interval_seconds
        );
        self.emit(PipelineEvent::Started);

        while !self.is_stop_requested() {
            if let Err(e) = self.run_cycle().await {
                log::error!("Poll cycle failed: {}", e);
            }
            tokio::select! {
                _ = tokio::time::sleep(self.config.monitor_interval()) => {}
                _ = stop_rx.changed() => {}
            }
        }

        log::info!("Watch loop stopped");
        self.emit(PipelineEvent::Stopped);
        Ok(())
    }

    /// Run one poll cycle over the inbox
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let cycle = self.cycles.fetch_add(1, Ordering::Relaxed) + 1;
        self.emit(PipelineEvent::CycleStarted { cycle });

        let mut ledger = self.ledger.lock().await;
        self.set_stage(Stage::Scanning, None);
        let archives = match self.scan_inbox().await {
            Ok(archives) => archives,
            Err(e) => {
                self.set_stage(Stage::Idle, None);
                return Err(e);
            }
        };

        // Streaks of archives no longer in the inbox are over
        lock(&self.failures).retain(|path, _| archives.contains(path));

        let mut report = CycleReport {
            scanned: archives.len(),
            ..Default::default()
        };

        for archive in archives {
            if self.is_stop_requested() {
                log::info!("Stop requested; remaining archives wait for the next run");
                break;
            }

            let item = match self.admit(&archive).await {
                Ok(item) => item,
                Err(e) => {
                    self.fail(&archive, None, Vec::new(), e);
                    report.failed += 1;
                    continue;
                }
            };

            if ledger.is_processed(&item.fingerprint) {
                log::debug!("Skipping {}: already processed", item.archive_name());
                self.emit(PipelineEvent::ArchiveSkipped {
                    archive: archive.clone(),
                });
                self.relocate(&item).await;
                report.skipped += 1;
                continue;
            }

            if self.process_item(&mut ledger, item).await.is_success() {
                report.succeeded += 1;
            } else {
                report.failed += 1;
            }
        }
        self.set_stage(Stage::Idle, None);

        if let Some(max_age) = self.config.scratch_retention() {
            let scratch = self.config.scratch_path.clone();
            tokio::task::spawn_blocking(move || {
                cleanup::sweep_expired(&scratch, max_age, SystemTime::now())
            })
            .await?;
        }
        drop(ledger);

        if report.succeeded + report.failed > 0 {
            log::info!(
                "Cycle {}: {} archive(s), {} processed, {} failed, {} already done",
                cycle,
                report.scanned,
                report.succeeded,
                report.failed,
                report.skipped
            );
        }
        self.emit(PipelineEvent::CycleFinished { cycle, report });
        Ok(report)
    }

    /// Process one archive, whether or not it is already in the ledger.
    ///
    /// On success the archive is recorded like in a poll cycle; recording an
    /// already recorded fingerprint is a no-op.
    pub async fn process_one(&self, archive: &Path) -> ProcessingResult {
        let mut ledger = self.ledger.lock().await;
        let result = match self.admit(archive).await {
            Ok(item) => self.process_item(&mut ledger, item).await,
            Err(e) => self.fail(archive, None, Vec::new(), e),
        };
        self.set_stage(Stage::Idle, None);
        result
    }

    /// Archives in the inbox that are not yet in the ledger
    pub async fn pending_archives(&self) -> Result<Vec<WorkItem>> {
        let ledger = self.ledger.lock().await;
        let mut pending = Vec::new();
        for archive in self.scan_inbox().await? {
            let item = self.admit(&archive).await?;
            if !ledger.is_processed(&item.fingerprint) {
                pending.push(item);
            }
        }
        Ok(pending)
    }

    /// Remove every scratch folder, including ones kept after failures
    pub async fn clean_scratch(&self) -> Result<usize> {
        let _guard = self.ledger.lock().await;
        let scratch = self.config.scratch_path.clone();
        let removed = tokio::task::spawn_blocking(move || {
            cleanup::remove_children(&scratch)
                .map_err(|e| PipelineError::io("cleaning scratch", &scratch, e))
        })
        .await??;
        log::info!(
            "Removed {} scratch folder(s) from {}",
            removed,
            self.config.scratch_path.display()
        );
        Ok(removed)
    }

    async fn scan_inbox(&self) -> Result<Vec<PathBuf>> {
        let inbox = &self.config.inbox_path;
        self.config
            .retry_policy()
            .run("Scanning inbox", |_| async move {
                let mut entries = tokio::fs::read_dir(inbox)
                    .await
                    .map_err(|e| PipelineError::io("listing", inbox, e))?;
                let mut archives = Vec::new();
                while let Some(entry) = entries
                    .next_entry()
                    .await
                    .map_err(|e| PipelineError::io("listing", inbox, e))?
                {
                    let path = entry.path();
                    let is_file = entry.file_type().await.is_ok_and(|t| t.is_file());
                    if is_file && is_archive(&path) {
                        archives.push(path);
                    }
                }
                archives.sort();
                Ok(archives)
            })
            .await
    }

    async fn admit(&self, archive: &Path) -> Result<WorkItem> {
        let fingerprint = self
            .config
            .retry_policy()
            .run("Fingerprinting", |_| Fingerprint::of_file(archive))
            .await?;
        Ok(WorkItem::new(archive, fingerprint))
    }

    async fn process_item(&self, ledger: &mut Ledger, item: WorkItem) -> ProcessingResult {
        log::info!(
            "Processing {} ({})",
            item.archive_name(),
            item.fingerprint.short()
        );
        let scratch_dir = self
            .config
            .scratch_path
            .join(format!("{}-{}", item.stem(), item.fingerprint.short()));
        let mut outputs = Vec::new();

        match self
            .run_stages(ledger, &item, &scratch_dir, &mut outputs)
            .await
        {
            Ok(()) => {
                lock(&self.failures).remove(&item.source_path);
                if let Err(e) = tokio::fs::remove_dir_all(&scratch_dir).await {
                    log::warn!("Cannot remove {}: {}", scratch_dir.display(), e);
                }
                self.relocate(&item).await;

                let result = ProcessingResult::success(&item, outputs);
                log::info!("{}", result);
                self.publish(result)
            }
            Err(e) => {
                self.set_stage(Stage::Failed, Some(&item.source_path));
                log::debug!("Keeping scratch folder {}", scratch_dir.display());
                self.fail(
                    &item.source_path,
                    Some(item.fingerprint.clone()),
                    outputs,
                    e,
                )
            }
        }
    }

    async fn run_stages(
        &self,
        ledger: &mut Ledger,
        item: &WorkItem,
        scratch_dir: &Path,
        outputs: &mut Vec<PathBuf>,
    ) -> Result<()> {
        let archive = item.source_path.as_path();
        let retry = self.config.retry_policy();

        self.set_stage(Stage::Extracting, Some(archive));
        let extracted = retry
            .run("Extracting", |_| extract_archive(archive, scratch_dir))
            .await?;
        if extracted.documents.is_empty() {
            return Err(PipelineError::malformed(
                archive,
                "archive contains no PDF documents",
            ));
        }
        if !extracted.ignored.is_empty() {
            log::info!(
                "Ignored {} non-PDF entr{} in {}",
                extracted.ignored.len(),
                if extracted.ignored.len() == 1 { "y" } else { "ies" },
                item.archive_name()
            );
        }

        let dispatcher = self.dispatcher();
        let stem = item.stem();
        let mut names = OutputNames::new();
        for document in &extracted.documents {
            let file_name = names.claim(output_file_name(
                &stem,
                extracted.relative_path(document),
                self.layout.paper,
            ));
            let bytes = self.transform(archive, document).await?;

            self.set_stage(Stage::Dispatching, Some(archive));
            outputs.push(dispatcher.dispatch(&file_name, bytes.into()).await?);
        }

        self.set_stage(Stage::Recording, Some(archive));
        let archive_name = item.archive_name();
        ledger
            .mark_processed(&item.fingerprint, Utc::now(), Some(archive_name.as_str()))
            .await?;
        self.ledger_records.store(ledger.len(), Ordering::Relaxed);
        Ok(())
    }

    /// Stamp and impose one extracted document, returning the output bytes
    async fn transform(&self, archive: &Path, document: &Path) -> Result<Vec<u8>> {
        self.set_stage(Stage::Stamping, Some(archive));
        let source = self
            .config
            .retry_policy()
            .run("Reading document", |_| async move {
                tokio::fs::read(document)
                    .await
                    .map_err(|e| PipelineError::io("reading", document, e))
            })
            .await?;

        let stamper = self.stamper.clone();
        let path = document.to_path_buf();
        let stamped = tokio::task::spawn_blocking(move || {
            let doc = load_pdf_bytes(&source).map_err(|e| impose_error(&path, e))?;
            stamper.stamp(&doc).map_err(|e| stamp_error(&path, e))
        })
        .await??;

        self.set_stage(Stage::Imposing, Some(archive));
        let layout = self.layout;
        let path = document.to_path_buf();
        let imposed = tokio::task::spawn_blocking(move || {
            let doc = impose_sync(&stamped, &layout).map_err(|e| impose_error(&path, e))?;
            save_pdf_bytes(doc).map_err(|e| impose_error(&path, e))
        })
        .await??;

        Ok(imposed)
    }

    fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(
            Arc::clone(&self.sink),
            self.printer.clone(),
            self.config.retry_policy(),
        )
    }

    /// Move a recorded archive out of the inbox, if configured.
    ///
    /// The ledger entry is already durable, so a failed move is only logged.
    async fn relocate(&self, item: &WorkItem) {
        let Some(dir) = &self.config.processed_archive_path else {
            return;
        };
        if !tokio::fs::try_exists(&item.source_path).await.unwrap_or(false) {
            return;
        }

        let mut destination = dir.join(item.archive_name());
        if tokio::fs::try_exists(&destination).await.unwrap_or(false) {
            destination = dir.join(format!("{}-{}.zip", item.stem(), item.fingerprint.short()));
        }

        let moved = match tokio::fs::rename(&item.source_path, &destination).await {
            Ok(()) => Ok(()),
            // Different volume: copy, then remove
            Err(_) => match tokio::fs::copy(&item.source_path, &destination).await {
                Ok(_) => tokio::fs::remove_file(&item.source_path).await,
                Err(e) => Err(e),
            },
        };
        match moved {
            Ok(()) => log::info!(
                "Moved {} to {}",
                item.archive_name(),
                destination.display()
            ),
            Err(e) => log::warn!(
                "Cannot move {} to {}: {}",
                item.source_path.display(),
                destination.display(),
                e
            ),
        }
    }

    fn fail(
        &self,
        archive: &Path,
        fingerprint: Option<Fingerprint>,
        outputs: Vec<PathBuf>,
        error: PipelineError,
    ) -> ProcessingResult {
        let streak = {
            let mut failures = lock(&self.failures);
            let count = failures.entry(archive.to_path_buf()).or_insert(0);
            *count += 1;
            *count
        };

        let mut result = ProcessingResult::failure(archive, fingerprint, outputs, &error);
        result.consecutive_failures = streak;
        log::error!(
            "{} failed ({} in a row, {}): {}",
            result.archive_name(),
            streak,
            error.kind(),
            error
        );
        self.publish(result)
    }

    fn publish(&self, result: ProcessingResult) -> ProcessingResult {
        self.results.push(result.clone());
        self.emit(PipelineEvent::Finished(Box::new(result.clone())));
        result
    }

    fn set_stage(&self, stage: Stage, archive: Option<&Path>) {
        *lock(&self.stage) = stage;
        match archive {
            Some(path) => log::debug!("{}: {}", path.display(), stage),
            None => log::debug!("Pipeline {}", stage),
        }
        self.emit(PipelineEvent::StageChanged {
            archive: archive.map(Path::to_path_buf),
            stage,
        });
    }

    fn emit(&self, event: PipelineEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

/// Build a pipeline from `config` and run it until Ctrl-C
pub async fn run_forever(config: PipelineConfig) -> Result<()> {
    let pipeline = Pipeline::new(config).await?;
    let stop = pipeline.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stop.request_stop();
        }
    });
    pipeline.run_forever().await
}

async fn prepare_directories(config: &PipelineConfig) -> Result<()> {
    if config.inbox_path.exists() && !config.inbox_path.is_dir() {
        return Err(PipelineError::Configuration(format!(
            "inbox_path {} is not a folder",
            config.inbox_path.display()
        )));
    }

    let folders = [
        Some(&config.inbox_path),
        Some(&config.output_path),
        Some(&config.scratch_path),
        config.processed_archive_path.as_ref(),
    ];
    for folder in folders.into_iter().flatten() {
        tokio::fs::create_dir_all(folder).await.map_err(|e| {
            PipelineError::Configuration(format!("Cannot create {}: {}", folder.display(), e))
        })?;
    }
    Ok(())
}

fn default_printer(config: &PipelineConfig) -> Result<Option<Arc<dyn Printer>>> {
    if !config.print_enabled {
        return Ok(None);
    }
    if config.print_command.is_empty() {
        return Ok(Some(Arc::new(LogPrinter)));
    }
    let printer = CommandPrinter::new(&config.print_command, config.print_timeout())?;
    Ok(Some(Arc::new(printer)))
}

fn impose_error(path: &Path, err: ImposeError) -> PipelineError {
    match err {
        ImposeError::Config(msg) => PipelineError::Configuration(msg),
        ImposeError::Io(e) => PipelineError::io("imposing", path, e),
        ImposeError::TaskJoin(e) => PipelineError::TaskJoin(e),
        other => PipelineError::malformed(path, other),
    }
}

fn stamp_error(path: &Path, err: StampError) -> PipelineError {
    match err {
        StampError::InvalidSpec(msg) => PipelineError::Configuration(msg),
        other => PipelineError::malformed(path, other),
    }
}
