#![allow(dead_code)]

use chrono::NaiveDate;
use lopdf::{Dictionary, Document, Object, Stream};
use pdf_autoproc::{FixedClock, Pipeline, PipelineConfig};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

pub fn stamp_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
}

/// "2024-01-15" encoded as UTF-16BE hex, as drawn by the CJK stamp font
pub const DATE_HEX: &str = "0032003000320034002D00300031002D00310035";

pub fn create_test_pdf(num_pages: usize) -> Vec<u8> {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();

    let mut kids = Vec::new();
    for i in 0..num_pages {
        let content = format!("BT /F1 12 Tf 72 72 Td (Page {}) Tj ET", i + 1);
        let content_id = doc.add_object(Stream::new(Dictionary::new(), content.into_bytes()));

        let page_id = doc.add_object(Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Page".to_vec())),
            ("Parent", Object::Reference(pages_id)),
            (
                "MediaBox",
                Object::Array(vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(595),
                    Object::Integer(842),
                ]),
            ),
            ("Resources", Object::Dictionary(Dictionary::new())),
            ("Contents", Object::Reference(content_id)),
        ]));
        kids.push(Object::Reference(page_id));
    }

    let pages_dict = Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Pages".to_vec())),
        ("Kids", Object::Array(kids)),
        ("Count", Object::Integer(num_pages as i64)),
    ]);
    doc.objects.insert(pages_id, Object::Dictionary(pages_dict));

    let catalog_id = doc.add_object(Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Catalog".to_vec())),
        ("Pages", Object::Reference(pages_id)),
    ]));
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

pub fn write_zip(path: &Path, entries: &[(&str, Vec<u8>)]) {
    let file = File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);
    for (name, bytes) in entries {
        zip.start_file(*name, options).unwrap();
        zip.write_all(bytes).unwrap();
    }
    zip.finish().unwrap();
}

/// Isolated folders and a fast configuration for one test
pub struct Fixture {
    pub dir: TempDir,
    pub config: PipelineConfig,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let config = PipelineConfig {
            inbox_path: root.join("inbox"),
            output_path: root.join("output"),
            scratch_path: root.join("scratch"),
            ledger_path: root.join("state/ledger.jsonl"),
            monitor_interval_seconds: 1,
            retry_backoff_seconds: 0.0,
            scratch_retention_days: 0,
            ..Default::default()
        };
        std::fs::create_dir_all(&config.inbox_path).unwrap();
        Self { dir, config }
    }

    pub async fn pipeline(&self) -> Pipeline {
        Pipeline::new(self.config.clone())
            .await
            .unwrap()
            .with_clock(Arc::new(FixedClock(stamp_date())))
    }

    pub fn add_archive(&self, name: &str, entries: &[(&str, Vec<u8>)]) -> PathBuf {
        let path = self.config.inbox_path.join(name);
        write_zip(&path, entries);
        path
    }

    /// Visible files in the output folder, sorted
    pub fn outputs(&self) -> Vec<PathBuf> {
        list_files(&self.config.output_path)
    }

    pub fn scratch_dirs(&self) -> Vec<PathBuf> {
        list_files(&self.config.scratch_path)
    }

    pub fn ledger_bytes(&self) -> Vec<u8> {
        std::fs::read(&self.config.ledger_path).unwrap_or_default()
    }
}

pub fn list_files(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .map(|e| e.unwrap().path())
        .filter(|p| {
            !p.file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with('.')
        })
        .collect();
    files.sort();
    files
}

/// Content of every XObject drawn on the first page of a PDF
pub fn placed_page_contents(bytes: &[u8]) -> Vec<String> {
    let doc = Document::load_mem(bytes).unwrap();
    let page_id = doc.get_pages()[&1];
    let xobjects = doc
        .get_dictionary(page_id)
        .unwrap()
        .get(b"Resources")
        .and_then(Object::as_dict)
        .and_then(|r| r.get(b"XObject"))
        .and_then(Object::as_dict)
        .unwrap();
    xobjects
        .iter()
        .map(|(_, obj)| {
            let stream = doc
                .get_object(obj.as_reference().unwrap())
                .unwrap()
                .as_stream()
                .unwrap();
            String::from_utf8_lossy(&stream.content).into_owned()
        })
        .collect()
}
