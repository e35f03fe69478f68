//! Configuration schema.
//!
//! The config file is YAML with five sections. Every field has an
//! explicit default so a partial file is always usable.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Credential file location and at-rest protection mode.
    pub gmail: GmailConfig,
    /// System and search log destinations.
    pub logging: LoggingConfig,
    /// Where and how attachments are written.
    pub downloads: DownloadsConfig,
    /// Tabular record of every download decision.
    pub csv_record: CsvRecordConfig,
    /// Default search parameters, overridable per run from the CLI.
    pub search: SearchConfig,
}

/// How to reach credentials: plain JSON on disk, or an encrypted blob
/// that the vault decrypts into an ephemeral file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialsMode {
    Plain,
    Encrypted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GmailConfig {
    /// Path to the installed-app credential JSON.
    pub credentials_file: PathBuf,
    /// Whether `credentials_file` is plaintext or encrypted at rest.
    pub credentials_mode: CredentialsMode,
    /// Path to the encrypted blob when mode is `encrypted`.
    pub encrypted_credentials_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Append-only system event log.
    pub system_log: PathBuf,
    /// Append-only per-search log.
    pub search_log: PathBuf,
    /// Minimum level written to the system log: "error", "warn",
    /// "info" or "debug".
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadsConfig {
    /// Root directory attachments are written under.
    pub output_directory: PathBuf,
    /// Place each attachment in a subfolder named after its sender.
    pub organize_by_sender: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CsvRecordConfig {
    pub enabled: bool,
    pub filename: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Gmail search query (e.g. "from:billing has:attachment").
    pub query: String,
    /// Comma-separated extension allow-list (e.g. ".pdf,.docx").
    /// Empty means every attachment with a filename qualifies.
    /// Accepted as-is; entries that match nothing simply never match.
    pub file_types: String,
    /// Perform every step except the actual byte write.
    pub dry_run: bool,
}

// ── Default implementations ─────────────────────────────────────

impl Default for GmailConfig {
    fn default() -> Self {
        Self {
            credentials_file: PathBuf::from("credentials.json"),
            credentials_mode: CredentialsMode::Plain,
            encrypted_credentials_file: PathBuf::from("credentials.json.encrypted"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            system_log: PathBuf::from("logs/system.log"),
            search_log: PathBuf::from("logs/search.log"),
            log_level: "info".to_string(),
        }
    }
}

impl Default for DownloadsConfig {
    fn default() -> Self {
        Self {
            output_directory: PathBuf::from("downloads"),
            organize_by_sender: true,
        }
    }
}

impl Default for CsvRecordConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            filename: PathBuf::from("download_record.csv"),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            query: "has:attachment".to_string(),
            file_types: String::new(),
            dry_run: false,
        }
    }
}

impl Config {
    /// The credential path to feed the vault, depending on mode.
    pub fn credential_source(&self) -> &PathBuf {
        match self.gmail.credentials_mode {
            CredentialsMode::Plain => &self.gmail.credentials_file,
            CredentialsMode::Encrypted => &self.gmail.encrypted_credentials_file,
        }
    }

    /// Where the OAuth refresh token lives: next to the configured
    /// credential file, so it survives ephemeral decrypted copies.
    pub fn token_path(&self) -> PathBuf {
        let mut name = self
            .gmail
            .credentials_file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "credentials.json".to_string());
        name.push_str(".token");
        self.gmail
            .credentials_file
            .parent()
            .map(|p| p.join(&name))
            .unwrap_or_else(|| PathBuf::from(name))
    }

    /// Normalizes the comma-separated `file_types` string into a
    /// lowercase allow-list with leading dots. Empty entries dropped.
    pub fn allowed_extensions(&self) -> Vec<String> {
        parse_file_types(&self.search.file_types)
    }
}

/// Splits a comma-separated extension list, lowercasing each entry and
/// adding a leading dot where the operator left it off.
pub fn parse_file_types(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_ascii_lowercase())
        .filter(|s| !s.is_empty())
        .map(|s| {
            if s.starts_with('.') {
                s
            } else {
                format!(".{}", s)
            }
        })
        .collect()
}
