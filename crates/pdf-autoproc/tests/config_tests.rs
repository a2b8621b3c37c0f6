use pdf_autoproc::{
    Corner, FailureKind, Orientation, PaperSize, Pipeline, PipelineConfig, PipelineError,
};
use std::time::Duration;

fn config_error(config: &PipelineConfig) -> String {
    match config.validate() {
        Err(PipelineError::Configuration(msg)) => msg,
        other => panic!("expected a configuration error, got {:?}", other),
    }
}

#[test]
fn test_defaults_are_valid() {
    let config = PipelineConfig::default();
    config.validate().unwrap();

    let layout = config.sheet_layout().unwrap();
    assert_eq!(layout.paper, PaperSize::B5);
    assert_eq!(layout.orientation, Orientation::Landscape);
    assert_eq!(config.stamp_spec().corner, Corner::BottomRight);
    assert_eq!(config.monitor_interval(), Duration::from_secs(60));
    assert_eq!(config.retry_policy().attempts, 3);
    assert_eq!(config.scratch_retention(), Some(Duration::from_secs(7 * 24 * 60 * 60)));
}

#[test]
fn test_invalid_values_are_rejected() {
    let config = PipelineConfig {
        sheet_size: "B9".to_string(),
        ..Default::default()
    };
    assert!(config_error(&config).contains("B9"));

    let config = PipelineConfig {
        retry_attempts: 0,
        ..Default::default()
    };
    assert!(config_error(&config).contains("retry_attempts"));

    let config = PipelineConfig {
        monitor_interval_seconds: 0,
        ..Default::default()
    };
    assert!(config_error(&config).contains("monitor_interval_seconds"));

    let mut config = PipelineConfig::default();
    config.logging.level = "chatty".to_string();
    assert!(config_error(&config).contains("chatty"));

    let mut config = PipelineConfig::default();
    config.stamp.font_size_pt = 0.0;
    config_error(&config);

    let config = PipelineConfig {
        scratch_path: "inbox".into(),
        ..Default::default()
    };
    assert!(config_error(&config).contains("scratch_path"));
}

#[test]
fn test_partial_json_fills_defaults() {
    let config: PipelineConfig = serde_json::from_str(
        r#"{
            "inbox_path": "/srv/scans/inbox",
            "sheet_size": "A4",
            "stamp": { "corner": "top_left" }
        }"#,
    )
    .unwrap();

    assert_eq!(config.sheet_layout().unwrap().paper, PaperSize::A4);
    assert_eq!(config.stamp.corner, Corner::TopLeft);
    assert_eq!(config.retry_attempts, 3);
    assert_eq!(config.output_path, PipelineConfig::default().output_path);
}

#[tokio::test]
async fn test_save_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("conf/autoproc.json");
    let config = PipelineConfig {
        print_enabled: true,
        print_command: vec!["lp".to_string(), "-d".to_string(), "office".to_string()],
        stamp_text_template: "DONE {date}".to_string(),
        ..Default::default()
    };

    config.save(&path).await.unwrap();
    let loaded = PipelineConfig::load(&path).await.unwrap();

    assert_eq!(loaded, config);
}

#[tokio::test]
async fn test_unparseable_file_is_configuration_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("autoproc.json");
    std::fs::write(&path, "{ not json").unwrap();

    let err = PipelineConfig::load(&path).await.unwrap_err();
    assert_eq!(err.kind(), FailureKind::Configuration);

    let err = PipelineConfig::load(dir.path().join("missing.json"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), FailureKind::Configuration);
}

#[tokio::test]
async fn test_pipeline_refuses_to_start_with_bad_paths() {
    let dir = tempfile::tempdir().unwrap();
    let inbox = dir.path().join("inbox");
    std::fs::write(&inbox, b"a file, not a folder").unwrap();

    let config = PipelineConfig {
        inbox_path: inbox,
        output_path: dir.path().join("out"),
        scratch_path: dir.path().join("scratch"),
        ledger_path: dir.path().join("ledger.jsonl"),
        ..Default::default()
    };

    let err = Pipeline::new(config).await.err().unwrap();
    assert_eq!(err.kind(), FailureKind::Configuration);
}

#[tokio::test]
async fn test_pipeline_creates_missing_folders() {
    let dir = tempfile::tempdir().unwrap();
    let config = PipelineConfig {
        inbox_path: dir.path().join("in"),
        output_path: dir.path().join("out"),
        scratch_path: dir.path().join("work/scratch"),
        ledger_path: dir.path().join("work/ledger.jsonl"),
        processed_archive_path: Some(dir.path().join("done")),
        ..Default::default()
    };

    let pipeline = Pipeline::new(config.clone()).await.unwrap();

    for folder in ["in", "out", "work/scratch", "done"] {
        assert!(dir.path().join(folder).is_dir(), "{} missing", folder);
    }
    assert_eq!(pipeline.status().ledger_records, 0);
}
