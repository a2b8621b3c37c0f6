mod common;

use common::{DATE_HEX, Fixture, create_test_pdf, placed_page_contents};
use lopdf::Document;
use pdf_autoproc::{
    CycleReport, FailureKind, FolderSink, Fingerprint, OutputSink, PipelineClient, PipelineError,
    PipelineEvent, ProcessingResult, Result, Stage,
};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(10);

fn file_names(paths: &[PathBuf]) -> Vec<String> {
    paths
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect()
}

fn ledger_lines(fx: &Fixture) -> usize {
    String::from_utf8(fx.ledger_bytes()).unwrap().lines().count()
}

fn read_all(paths: &[PathBuf]) -> Vec<Vec<u8>> {
    paths.iter().map(|p| std::fs::read(p).unwrap()).collect()
}

#[tokio::test]
async fn test_archive_is_stamped_imposed_and_recorded() {
    let fx = Fixture::new();
    fx.add_archive(
        "batch1.zip",
        &[("a.pdf", create_test_pdf(1)), ("b.pdf", create_test_pdf(1))],
    );
    let pipeline = fx.pipeline().await;

    let report = pipeline.run_cycle().await.unwrap();
    assert_eq!(
        report,
        CycleReport {
            scanned: 1,
            succeeded: 1,
            ..Default::default()
        }
    );

    let outputs = fx.outputs();
    assert_eq!(file_names(&outputs), vec!["batch1_a_B5.pdf", "batch1_b_B5.pdf"]);
    for output in &outputs {
        let bytes = std::fs::read(output).unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 1);

        let placed = placed_page_contents(&bytes);
        assert_eq!(placed.len(), 1, "only the first half is used");
        assert!(placed[0].contains("(Page 1)"));
        assert!(placed[0].contains(DATE_HEX), "stamp date missing");
    }

    assert_eq!(ledger_lines(&fx), 1);
    assert_eq!(pipeline.status().ledger_records, 1);
    assert!(fx.scratch_dirs().is_empty());

    let results = pipeline.last_results();
    assert_eq!(results.len(), 1);
    assert!(results[0].is_success());
    assert_eq!(results[0].outputs.len(), 2);
}

#[tokio::test]
async fn test_second_cycle_does_no_work() {
    let fx = Fixture::new();
    fx.add_archive("batch1.zip", &[("a.pdf", create_test_pdf(2))]);
    let pipeline = fx.pipeline().await;
    pipeline.run_cycle().await.unwrap();

    let ledger_before = fx.ledger_bytes();
    let outputs_before = fx.outputs();
    let contents_before = read_all(&outputs_before);

    let report = pipeline.run_cycle().await.unwrap();

    assert_eq!(
        report,
        CycleReport {
            scanned: 1,
            skipped: 1,
            ..Default::default()
        }
    );
    assert_eq!(fx.ledger_bytes(), ledger_before);
    assert_eq!(fx.outputs(), outputs_before);
    assert_eq!(read_all(&outputs_before), contents_before);
    assert_eq!(pipeline.last_results().len(), 1);
}

#[tokio::test]
async fn test_restart_skips_recorded_archive() {
    let fx = Fixture::new();
    fx.add_archive("batch1.zip", &[("a.pdf", create_test_pdf(1))]);
    fx.pipeline().await.run_cycle().await.unwrap();

    let restarted = fx.pipeline().await;
    let report = restarted.run_cycle().await.unwrap();

    assert_eq!(report.skipped, 1);
    assert_eq!(report.succeeded, 0);
}

#[tokio::test]
async fn test_lost_record_reprocesses_to_identical_output() {
    let fx = Fixture::new();
    fx.add_archive(
        "batch1.zip",
        &[("a.pdf", create_test_pdf(3)), ("b.pdf", create_test_pdf(1))],
    );
    fx.pipeline().await.run_cycle().await.unwrap();
    let outputs = fx.outputs();
    let first_run = read_all(&outputs);

    // Crash after dispatch but before the record became durable
    std::fs::remove_file(&fx.config.ledger_path).unwrap();

    let restarted = fx.pipeline().await;
    let report = restarted.run_cycle().await.unwrap();

    assert_eq!(report.succeeded, 1);
    assert_eq!(fx.outputs(), outputs);
    assert_eq!(read_all(&outputs), first_run);
    assert_eq!(ledger_lines(&fx), 1);
}

#[tokio::test]
async fn test_process_one_is_idempotent() {
    let fx = Fixture::new();
    let archive = fx.add_archive("batch1.zip", &[("a.pdf", create_test_pdf(4))]);
    let pipeline = fx.pipeline().await;

    let first = pipeline.process_one(&archive).await;
    assert!(first.is_success());
    let bytes = read_all(&first.outputs);

    let second = pipeline.process_one(&archive).await;
    assert!(second.is_success());
    assert_eq!(second.outputs, first.outputs);
    assert_eq!(read_all(&second.outputs), bytes);
    assert_eq!(ledger_lines(&fx), 1);

    let doc = Document::load_mem(&bytes[0]).unwrap();
    assert_eq!(doc.get_pages().len(), 2);
}

#[tokio::test]
async fn test_malformed_document_fails_without_recording() {
    let fx = Fixture::new();
    let archive = fx.add_archive(
        "batch2.zip",
        &[
            ("a_good.pdf", create_test_pdf(1)),
            ("b_broken.pdf", b"this is not a pdf".to_vec()),
        ],
    );
    let pipeline = fx.pipeline().await;

    let report = pipeline.run_cycle().await.unwrap();
    assert_eq!(report.failed, 1);

    let result = &pipeline.last_results()[0];
    assert!(!result.is_success());
    assert_eq!(result.failure_kind, Some(FailureKind::MalformedDocument));
    assert!(result.error.as_deref().unwrap().contains("b_broken.pdf"));
    assert_eq!(result.outputs.len(), 1, "documents before the failure stay written");
    assert_eq!(result.consecutive_failures, 1);

    assert!(fx.ledger_bytes().is_empty());
    assert_eq!(fx.scratch_dirs().len(), 1, "scratch is kept for inspection");

    // Retried on the next cycle
    let report = pipeline.run_cycle().await.unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(pipeline.last_results()[0].consecutive_failures, 2);
    assert_eq!(pipeline.status().failing, vec![(archive, 2)]);
}

#[tokio::test]
async fn test_removed_archive_is_no_longer_failing() {
    let fx = Fixture::new();
    let broken = fx.add_archive("broken.zip", &[("x.pdf", b"garbage".to_vec())]);
    let stuck = fx.add_archive("stuck.zip", &[("y.pdf", b"garbage".to_vec())]);
    let pipeline = fx.pipeline().await;

    pipeline.run_cycle().await.unwrap();
    assert_eq!(pipeline.status().failing.len(), 2);

    std::fs::remove_file(&broken).unwrap();
    let report = pipeline.run_cycle().await.unwrap();

    assert_eq!(report.scanned, 1);
    assert_eq!(pipeline.status().failing, vec![(stuck, 2)]);
}

#[tokio::test]
async fn test_failure_does_not_block_other_archives() {
    let fx = Fixture::new();
    fx.add_archive("a.zip", &[("x.pdf", b"garbage".to_vec())]);
    fx.add_archive("b.zip", &[("y.pdf", create_test_pdf(2))]);
    let pipeline = fx.pipeline().await;

    let report = pipeline.run_cycle().await.unwrap();

    assert_eq!(report.failed, 1);
    assert_eq!(report.succeeded, 1);
    assert_eq!(file_names(&fx.outputs()), vec!["b_y_B5.pdf"]);
}

#[tokio::test]
async fn test_archive_without_documents_is_malformed() {
    let fx = Fixture::new();
    let archive = fx.add_archive("notes.zip", &[("readme.txt", b"hello".to_vec())]);
    let pipeline = fx.pipeline().await;

    let result = pipeline.process_one(&archive).await;

    assert_eq!(result.failure_kind, Some(FailureKind::MalformedDocument));
    assert!(fx.outputs().is_empty());
}

#[tokio::test]
async fn test_unreadable_archive_is_reported() {
    let fx = Fixture::new();
    let archive = fx.config.inbox_path.join("garbage.zip");
    std::fs::write(&archive, vec![b'x'; 512]).unwrap();
    let pipeline = fx.pipeline().await;

    let result = pipeline.process_one(&archive).await;

    assert_eq!(result.failure_kind, Some(FailureKind::MalformedDocument));
    assert!(result.fingerprint.is_some());
    assert!(fx.ledger_bytes().is_empty());
}

#[tokio::test]
async fn test_missing_archive_has_no_fingerprint() {
    let fx = Fixture::new();
    let pipeline = fx.pipeline().await;

    let result = pipeline
        .process_one(&fx.config.inbox_path.join("vanished.zip"))
        .await;

    assert_eq!(result.failure_kind, Some(FailureKind::TransientIo));
    assert!(result.fingerprint.is_none());
}

#[tokio::test]
async fn test_non_pdf_entries_are_ignored() {
    let fx = Fixture::new();
    fx.add_archive(
        "mixed.zip",
        &[
            ("scan.pdf", create_test_pdf(1)),
            ("thumbs.db", vec![0u8; 16]),
            ("__MACOSX/._scan.pdf", vec![0u8; 16]),
        ],
    );
    let pipeline = fx.pipeline().await;

    let report = pipeline.run_cycle().await.unwrap();

    assert_eq!(report.succeeded, 1);
    assert_eq!(file_names(&fx.outputs()), vec!["mixed_scan_B5.pdf"]);
}

#[tokio::test]
async fn test_nested_documents_get_distinct_names() {
    let fx = Fixture::new();
    fx.add_archive(
        "batch.zip",
        &[
            ("north/scan.pdf", create_test_pdf(1)),
            ("south/scan.pdf", create_test_pdf(1)),
        ],
    );
    let pipeline = fx.pipeline().await;

    pipeline.run_cycle().await.unwrap();

    assert_eq!(
        file_names(&fx.outputs()),
        vec!["batch_north_scan_B5.pdf", "batch_south_scan_B5.pdf"]
    );
}

#[tokio::test]
async fn test_flattened_name_clash_keeps_both_documents() {
    let fx = Fixture::new();
    fx.add_archive(
        "batch1.zip",
        &[("a/b.pdf", create_test_pdf(1)), ("a_b.pdf", create_test_pdf(3))],
    );
    let pipeline = fx.pipeline().await;

    let report = pipeline.run_cycle().await.unwrap();
    assert_eq!(report.succeeded, 1);

    let outputs = fx.outputs();
    assert_eq!(
        file_names(&outputs),
        vec!["batch1_a_b_B5.pdf", "batch1_a_b_B5_2.pdf"]
    );
    let sheets: Vec<usize> = read_all(&outputs)
        .iter()
        .map(|bytes| Document::load_mem(bytes).unwrap().get_pages().len())
        .collect();
    assert_eq!(sheets, vec![1, 2]);

    let results = pipeline.last_results();
    assert_eq!(results[0].outputs, outputs);
}

#[tokio::test]
async fn test_stale_scratch_is_replaced() {
    let fx = Fixture::new();
    let archive = fx.add_archive("batch1.zip", &[("a.pdf", create_test_pdf(1))]);
    let fingerprint = Fingerprint::of_bytes(&std::fs::read(&archive).unwrap());

    // Leftover from an interrupted run
    let stale = fx
        .config
        .scratch_path
        .join(format!("batch1-{}", fingerprint.short()));
    std::fs::create_dir_all(&stale).unwrap();
    std::fs::write(stale.join("leftover.pdf"), create_test_pdf(1)).unwrap();

    let pipeline = fx.pipeline().await;
    let result = pipeline.process_one(&archive).await;

    assert!(result.is_success());
    assert_eq!(file_names(&fx.outputs()), vec!["batch1_a_B5.pdf"]);
    assert!(fx.scratch_dirs().is_empty());
}

#[tokio::test]
async fn test_clean_scratch_removes_kept_folders() {
    let fx = Fixture::new();
    fx.add_archive("bad.zip", &[("x.pdf", b"nope".to_vec())]);
    let pipeline = fx.pipeline().await;
    pipeline.run_cycle().await.unwrap();
    assert_eq!(fx.scratch_dirs().len(), 1);

    assert_eq!(pipeline.clean_scratch().await.unwrap(), 1);
    assert!(fx.scratch_dirs().is_empty());
}

#[tokio::test]
async fn test_pending_archives_excludes_recorded() {
    let fx = Fixture::new();
    let done = fx.add_archive("a.zip", &[("x.pdf", create_test_pdf(1))]);
    let pipeline = fx.pipeline().await;
    pipeline.process_one(&done).await;
    let waiting = fx.add_archive("b.zip", &[("y.pdf", create_test_pdf(1))]);

    let pending = pipeline.pending_archives().await.unwrap();

    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].source_path, waiting);
}

#[tokio::test]
async fn test_ledger_failure_leaves_archive_unrecorded() {
    let fx = Fixture::new();
    fx.add_archive("batch1.zip", &[("a.pdf", create_test_pdf(1))]);
    let pipeline = fx.pipeline().await;

    // Appending to a folder fails
    std::fs::create_dir_all(&fx.config.ledger_path).unwrap();
    let report = pipeline.run_cycle().await.unwrap();

    assert_eq!(report.failed, 1);
    let result = &pipeline.last_results()[0];
    assert_eq!(result.failure_kind, Some(FailureKind::Ledger));
    assert_eq!(result.outputs.len(), 1);
    assert_eq!(pipeline.status().ledger_records, 0);
}

/// Sink that cannot write files whose name contains `bad`
struct PickySink {
    inner: FolderSink,
    refused: AtomicU32,
}

impl OutputSink for PickySink {
    fn persist(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf> {
        if file_name.contains("bad") {
            self.refused.fetch_add(1, Ordering::SeqCst);
            return Err(PipelineError::io(
                "writing",
                self.inner.dir().join(file_name),
                io::Error::new(io::ErrorKind::PermissionDenied, "share is read-only"),
            ));
        }
        self.inner.persist(file_name, bytes)
    }
}

#[tokio::test]
async fn test_output_failure_is_retried_then_reported() {
    let fx = Fixture::new();
    fx.add_archive("a_bad.zip", &[("x.pdf", create_test_pdf(1))]);
    fx.add_archive("b_good.zip", &[("y.pdf", create_test_pdf(1))]);
    let sink = Arc::new(PickySink {
        inner: FolderSink::new(&fx.config.output_path),
        refused: AtomicU32::new(0),
    });
    let pipeline = fx.pipeline().await.with_sink(sink.clone());

    let report = pipeline.run_cycle().await.unwrap();

    assert_eq!(sink.refused.load(Ordering::SeqCst), 3);
    assert_eq!(report.failed, 1);
    assert_eq!(report.succeeded, 1);
    assert_eq!(file_names(&fx.outputs()), vec!["b_good_y_B5.pdf"]);

    let failed = pipeline
        .last_results()
        .into_iter()
        .find(|r| !r.is_success())
        .unwrap();
    assert_eq!(failed.failure_kind, Some(FailureKind::TransientIo));
    assert_eq!(ledger_lines(&fx), 1);
}

#[tokio::test]
async fn test_recorded_archive_is_moved_out_of_inbox() {
    let mut fx = Fixture::new();
    let processed = fx.dir.path().join("processed");
    fx.config.processed_archive_path = Some(processed.clone());
    let archive = fx.add_archive("batch1.zip", &[("a.pdf", create_test_pdf(1))]);
    let pipeline = fx.pipeline().await;

    pipeline.run_cycle().await.unwrap();

    assert!(!archive.exists());
    assert!(processed.join("batch1.zip").exists());

    // Same name, different content: kept next to the first one
    fx.add_archive("batch1.zip", &[("b.pdf", create_test_pdf(2))]);
    pipeline.run_cycle().await.unwrap();
    assert_eq!(common::list_files(&processed).len(), 2);
}

#[tokio::test]
async fn test_last_results_are_newest_first_and_bounded() {
    let mut fx = Fixture::new();
    fx.config.results_capacity = 2;
    let archives: Vec<_> = ["a.zip", "b.zip", "c.zip"]
        .into_iter()
        .map(|name| fx.add_archive(name, &[("x.pdf", create_test_pdf(1))]))
        .collect();
    let pipeline = fx.pipeline().await;

    for archive in &archives {
        pipeline.process_one(archive).await;
    }

    let results = pipeline.last_results();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].archive, archives[2]);
    assert_eq!(results[1].archive, archives[1]);
}

#[tokio::test]
async fn test_stages_are_reported_in_order() {
    let fx = Fixture::new();
    let archive = fx.add_archive("batch1.zip", &[("a.pdf", create_test_pdf(1))]);
    let pipeline = fx.pipeline().await;
    let mut events = pipeline.subscribe();

    pipeline.process_one(&archive).await;

    let mut stages = Vec::new();
    let mut finished = None;
    while let Ok(event) = events.try_recv() {
        match event {
            PipelineEvent::StageChanged {
                archive: Some(_),
                stage,
            } => stages.push(stage),
            PipelineEvent::Finished(result) => finished = Some(result),
            _ => {}
        }
    }
    assert_eq!(
        stages,
        vec![
            Stage::Extracting,
            Stage::Stamping,
            Stage::Imposing,
            Stage::Dispatching,
            Stage::Recording
        ]
    );
    assert!(finished.unwrap().is_success());
    assert_eq!(pipeline.status().stage, Stage::Idle);
}

#[tokio::test]
async fn test_stop_before_start_runs_no_cycle() {
    let fx = Fixture::new();
    fx.add_archive("batch1.zip", &[("a.pdf", create_test_pdf(1))]);
    let pipeline = fx.pipeline().await;

    pipeline.request_stop();
    tokio::time::timeout(TIMEOUT, pipeline.run_forever())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(pipeline.status().cycles, 0);
    assert!(fx.outputs().is_empty());
}

#[tokio::test]
async fn test_stop_interrupts_the_wait_between_cycles() {
    let mut fx = Fixture::new();
    fx.config.monitor_interval_seconds = 3600;
    fx.add_archive("batch1.zip", &[("a.pdf", create_test_pdf(1))]);
    let pipeline = Arc::new(fx.pipeline().await);
    let mut events = pipeline.subscribe();

    let runner = tokio::spawn({
        let pipeline = Arc::clone(&pipeline);
        async move { pipeline.run_forever().await }
    });

    loop {
        let event = tokio::time::timeout(TIMEOUT, events.recv())
            .await
            .unwrap()
            .unwrap();
        if matches!(event, PipelineEvent::CycleFinished { .. }) {
            break;
        }
    }
    pipeline.request_stop();

    tokio::time::timeout(TIMEOUT, runner)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(pipeline.status().cycles, 1);
    assert_eq!(fx.outputs().len(), 1);
}

async fn process_with<C: PipelineClient>(client: &C, archive: &Path) -> ProcessingResult {
    client.process_one(archive).await
}

#[tokio::test]
async fn test_pipeline_serves_as_client() {
    let fx = Fixture::new();
    let archive = fx.add_archive("batch1.zip", &[("a.pdf", create_test_pdf(2))]);
    let pipeline = fx.pipeline().await;

    let result = process_with(&pipeline, &archive).await;

    assert!(result.is_success());
    assert_eq!(PipelineClient::last_results(&pipeline), vec![result]);
}
