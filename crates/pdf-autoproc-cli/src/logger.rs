use chrono::{DateTime, Local};
use log::{Level, LevelFilter, Metadata, Record};
use pdf_autoproc::LoggingConfig;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Clone)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    pub level: Level,
    pub target: String,
    pub message: String,
}

impl LogEntry {
    fn format(&self) -> String {
        format!(
            "{} [{}] {}: {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.level,
            self.target,
            self.message
        )
    }
}

/// Log file that rolls over to `name.1`, `name.2`, ... once it grows too large
struct RotatingFile {
    path: PathBuf,
    max_bytes: u64,
    backups: usize,
    file: File,
    written: u64,
}

impl RotatingFile {
    fn open(path: &Path, max_bytes: u64, backups: usize) -> io::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let written = file.metadata()?.len();
        Ok(Self {
            path: path.to_path_buf(),
            max_bytes,
            backups,
            file,
            written,
        })
    }

    fn write_line(&mut self, line: &str) -> io::Result<()> {
        let len = line.len() as u64 + 1;
        if self.max_bytes > 0 && self.written > 0 && self.written + len > self.max_bytes {
            self.rotate()?;
        }
        writeln!(self.file, "{}", line)?;
        self.written += len;
        Ok(())
    }

    fn backup_path(&self, index: usize) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(format!(".{}", index));
        PathBuf::from(name)
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;
        if self.backups == 0 {
            self.file = File::create(&self.path)?;
        } else {
            let _ = fs::remove_file(self.backup_path(self.backups));
            for index in (1..self.backups).rev() {
                let from = self.backup_path(index);
                if from.exists() {
                    fs::rename(&from, self.backup_path(index + 1))?;
                }
            }
            fs::rename(&self.path, self.backup_path(1))?;
            self.file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)?;
        }
        self.written = 0;
        Ok(())
    }
}

/// Logger writing to stderr and an optional rotating file, keeping the most
/// recent entries in memory for end-of-run summaries
#[derive(Clone)]
pub struct AppLogger {
    level: LevelFilter,
    entries: Arc<Mutex<Vec<LogEntry>>>,
    max_entries: usize,
    file: Option<Arc<Mutex<RotatingFile>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl AppLogger {
    pub fn new(level: LevelFilter, max_entries: usize) -> Self {
        Self {
            level,
            entries: Arc::new(Mutex::new(Vec::new())),
            max_entries,
            file: None,
        }
    }

    /// Logger for the given settings; fails if the log file cannot be opened
    pub fn from_config(config: &LoggingConfig, max_entries: usize) -> io::Result<Self> {
        let level = LevelFilter::from_str(&config.level).unwrap_or(LevelFilter::Info);
        let mut logger = Self::new(level, max_entries);
        if let Some(path) = &config.file {
            let max_bytes = config.max_file_size_mb * 1024 * 1024;
            let file = RotatingFile::open(path, max_bytes, config.backup_count)?;
            logger.file = Some(Arc::new(Mutex::new(file)));
        }
        Ok(logger)
    }

    pub fn init(self) -> Result<(), log::SetLoggerError> {
        let level = self.level;
        log::set_boxed_logger(Box::new(self))?;
        log::set_max_level(level);
        Ok(())
    }

    pub fn get_entries(&self) -> Vec<LogEntry> {
        lock(&self.entries).clone()
    }

    /// Number of (warning, error) entries still in memory
    pub fn problem_counts(&self) -> (usize, usize) {
        lock(&self.entries)
            .iter()
            .fold((0, 0), |(warnings, errors), entry| match entry.level {
                Level::Warn => (warnings + 1, errors),
                Level::Error => (warnings, errors + 1),
                _ => (warnings, errors),
            })
    }
}

impl log::Log for AppLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let entry = LogEntry {
                timestamp: Local::now(),
                level: record.level(),
                target: record.target().to_string(),
                message: format!("{}", record.args()),
            };

            let line = entry.format();
            eprintln!("{}", line);
            if let Some(file) = &self.file {
                if let Err(e) = lock(file).write_line(&line) {
                    eprintln!("Cannot write log file: {}", e);
                }
            }

            let mut entries = lock(&self.entries);
            entries.push(entry);

            // Keep only the most recent entries
            if entries.len() > self.max_entries {
                let excess = entries.len() - self.max_entries;
                entries.drain(0..excess);
            }
        }
    }

    fn flush(&self) {
        if let Some(file) = &self.file {
            let _ = lock(file).file.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::Log;

    fn record(logger: &AppLogger, level: Level, message: &str) {
        logger.log(
            &Record::builder()
                .level(level)
                .target("test")
                .args(format_args!("{}", message))
                .build(),
        );
    }

    #[test]
    fn test_file_rotates_and_keeps_backups() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs/autoproc.log");
        let mut file = RotatingFile::open(&path, 64, 2).unwrap();

        for i in 0..10 {
            file.write_line(&format!("line {:02} with some padding text", i))
                .unwrap();
        }

        assert!(path.exists());
        assert!(dir.path().join("logs/autoproc.log.1").exists());
        assert!(dir.path().join("logs/autoproc.log.2").exists());
        assert!(!dir.path().join("logs/autoproc.log.3").exists());
        assert!(fs::read_to_string(&path).unwrap().contains("line 09"));
    }

    #[test]
    fn test_rotation_without_backups_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("autoproc.log");
        let mut file = RotatingFile::open(&path, 40, 0).unwrap();

        file.write_line("first line that fills the file").unwrap();
        file.write_line("second line").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "second line\n");
    }

    #[test]
    fn test_entries_are_bounded_and_filtered() {
        let logger = AppLogger::new(LevelFilter::Info, 3);

        record(&logger, Level::Debug, "hidden");
        record(&logger, Level::Warn, "w1");
        record(&logger, Level::Error, "e1");
        record(&logger, Level::Info, "i1");
        record(&logger, Level::Info, "i2");

        let messages: Vec<_> = logger.get_entries().into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["e1", "i1", "i2"]);
        assert_eq!(logger.problem_counts(), (0, 1));
    }
}
