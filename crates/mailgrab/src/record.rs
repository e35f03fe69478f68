//! Download records and append-only run artifacts.
//!
//! Three files, all opened in append mode so a killed-and-restarted
//! run never corrupts prior data: the CSV record (one row per
//! qualifying attachment), the system event log, and the search log.
//! CSV rows are RFC 4180-escaped, UTF-8.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Local;
use log::debug;

use crate::config::Config;
use crate::error::RecordError;

const CSV_HEADER: &str = "sender,subject,timestamp,filename,saved_path,size,outcome";

type Result<T> = std::result::Result<T, RecordError>;

/// Final disposition of one qualifying attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Bytes written to disk.
    Saved,
    /// Payload could not be fetched; nothing written.
    Skipped,
    /// Dry-run mode: path computed, nothing written.
    DryRun,
    /// Write was attempted and failed.
    Failed,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Saved => "saved",
            Outcome::Skipped => "skipped",
            Outcome::DryRun => "dry-run",
            Outcome::Failed => "failed",
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One CSV row. Every qualifying attachment yields exactly one of
/// these, whatever the outcome.
#[derive(Debug, Clone)]
pub struct DownloadRecord {
    pub sender: String,
    pub subject: String,
    pub timestamp: String,
    pub filename: String,
    pub saved_path: String,
    pub size: u64,
    pub outcome: Outcome,
}

/// Severity for the system log, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "debug" => LogLevel::Debug,
            "warn" | "warning" => LogLevel::Warn,
            "error" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

/// Appends download rows and log lines. Single writer, synchronous;
/// each append is flushed before returning.
pub struct RecordKeeper {
    system_log: PathBuf,
    search_log: PathBuf,
    level: LogLevel,
    csv_path: Option<PathBuf>,
}

impl RecordKeeper {
    pub fn new(config: &Config) -> Result<Self> {
        let keeper = Self {
            system_log: config.logging.system_log.clone(),
            search_log: config.logging.search_log.clone(),
            level: LogLevel::parse(&config.logging.log_level),
            csv_path: config
                .csv_record
                .enabled
                .then(|| config.csv_record.filename.clone()),
        };

        ensure_parent(&keeper.system_log)?;
        ensure_parent(&keeper.search_log)?;
        if let Some(csv) = &keeper.csv_path {
            ensure_parent(csv)?;
        }

        Ok(keeper)
    }

    /// Appends one row to the CSV record, writing the header first
    /// when the file is newly created. No-op when the CSV record is
    /// disabled in config.
    pub fn record(&self, record: &DownloadRecord) -> Result<()> {
        let Some(path) = &self.csv_path else {
            debug!("CSV record disabled, dropping row for '{}'", record.filename);
            return Ok(());
        };

        let mut file = open_append(path)?;
        let is_new = file
            .metadata()
            .map(|m| m.len() == 0)
            .unwrap_or(true);

        let mut out = String::new();
        if is_new {
            out.push_str(CSV_HEADER);
            out.push('\n');
        }
        out.push_str(&format!(
            "{},{},{},{},{},{},{}\n",
            csv_escape(&record.sender),
            csv_escape(&record.subject),
            csv_escape(&record.timestamp),
            csv_escape(&record.filename),
            csv_escape(&record.saved_path),
            record.size,
            record.outcome,
        ));

        append_all(&mut file, path, out.as_bytes())
    }

    /// Appends a timestamped line to the system log, honoring the
    /// configured level. Mirrored to the ambient logger.
    pub fn log_event(&self, level: LogLevel, message: &str) -> Result<()> {
        match level {
            LogLevel::Error => log::error!("{}", message),
            LogLevel::Warn => log::warn!("{}", message),
            LogLevel::Info => log::info!("{}", message),
            LogLevel::Debug => log::debug!("{}", message),
        }

        if level < self.level {
            return Ok(());
        }

        let line = format!("{} [{}] {}\n", now_stamp(), level.label(), message);
        let mut file = open_append(&self.system_log)?;
        append_all(&mut file, &self.system_log, line.as_bytes())
    }

    /// Appends one line per completed search to the search log.
    pub fn log_search(&self, query: &str, result_count: usize, duration: Duration) -> Result<()> {
        let line = format!(
            "{} query=\"{}\" results={} duration_ms={}\n",
            now_stamp(),
            query.replace('"', "'"),
            result_count,
            duration.as_millis(),
        );
        let mut file = open_append(&self.search_log)?;
        append_all(&mut file, &self.search_log, line.as_bytes())
    }
}

fn now_stamp() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| RecordError::OpenFile {
                path: path.to_path_buf(),
                source: e,
            })?;
        }
    }
    Ok(())
}

fn open_append(path: &Path) -> Result<std::fs::File> {
    OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .map_err(|e| RecordError::OpenFile {
            path: path.to_path_buf(),
            source: e,
        })
}

fn append_all(file: &mut std::fs::File, path: &Path, bytes: &[u8]) -> Result<()> {
    file.write_all(bytes).map_err(|e| RecordError::Append {
        path: path.to_path_buf(),
        source: e,
    })?;
    file.flush().map_err(|e| RecordError::Append {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Escape a value for CSV (RFC 4180).
///
/// Wraps in double quotes if the value contains commas, quotes, or
/// newlines.
fn csv_escape(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') || value.contains('\r') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
