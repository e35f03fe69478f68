//! Destination-path policy and attachment writes.
//!
//! Collision policy: an existing target name gets an incrementing
//! `_2`, `_3`, … suffix before the extension until a free name is
//! found. Existing files are never overwritten; creation uses
//! `create_new` so the check and the write are one atomic step.

use std::path::{Path, PathBuf};

use log::debug;

use crate::config::Config;
use crate::error::StorageError;
use crate::record::Outcome;

/// Folder name used when the sender is empty or unparseable.
pub const UNKNOWN_SENDER: &str = "unknown_sender";

const MAX_COLLISION_ATTEMPTS: u32 = 1000;

type Result<T> = std::result::Result<T, StorageError>;

/// Where one write landed (or would have landed, in dry-run).
#[derive(Debug)]
pub struct WriteResult {
    pub path: PathBuf,
    pub outcome: Outcome,
}

/// Writes attachment bytes under the output directory, one file per
/// call, sequential. Dry-run computes everything but touches nothing.
pub struct FileWriter {
    output_directory: PathBuf,
    organize_by_sender: bool,
    dry_run: bool,
}

impl FileWriter {
    pub fn from_config(config: &Config) -> Self {
        Self {
            output_directory: config.downloads.output_directory.clone(),
            organize_by_sender: config.downloads.organize_by_sender,
            dry_run: config.search.dry_run,
        }
    }

    pub fn new<P: AsRef<Path>>(output_directory: P, organize_by_sender: bool, dry_run: bool) -> Self {
        Self {
            output_directory: output_directory.as_ref().to_path_buf(),
            organize_by_sender,
            dry_run,
        }
    }

    /// Writes `content` as `filename` under the sender's folder,
    /// resolving name collisions. In dry-run mode the collision check
    /// still runs against the real filesystem but no file or
    /// directory is created.
    pub fn write(&self, filename: &str, content: &[u8], sender: &str) -> Result<WriteResult> {
        let dir = self.destination_dir(sender);
        let safe_name = sanitize_filename(filename);

        if self.dry_run {
            let path = resolve_available(&dir, &safe_name)?;
            debug!("Dry run: would write {} bytes to {}", content.len(), path.display());
            return Ok(WriteResult {
                path,
                outcome: Outcome::DryRun,
            });
        }

        ensure_directory(&dir)?;
        let path = create_exclusive(&dir, &safe_name, content)?;
        debug!("Wrote {} bytes to {}", content.len(), path.display());
        Ok(WriteResult {
            path,
            outcome: Outcome::Saved,
        })
    }

    /// Destination folder for a sender, per the organize flag.
    pub fn destination_dir(&self, sender: &str) -> PathBuf {
        if self.organize_by_sender {
            self.output_directory.join(sanitize_sender(sender))
        } else {
            self.output_directory.clone()
        }
    }
}

fn ensure_directory(path: &Path) -> Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path).map_err(|e| StorageError::CreateDirectory {
            path: path.to_path_buf(),
            source: e,
        })?;
    }
    Ok(())
}

/// Atomic create-and-write: tries the original name, then numbered
/// variants, using `create_new` so a concurrent creation loses the
/// race cleanly and we move on to the next suffix.
fn create_exclusive(dir: &Path, filename: &str, content: &[u8]) -> Result<PathBuf> {
    use std::io::Write;

    for counter in 1..=MAX_COLLISION_ATTEMPTS {
        let candidate = dir.join(numbered_variant(filename, counter));

        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
        {
            Ok(mut file) => {
                file.write_all(content).map_err(|e| StorageError::WriteFile {
                    path: candidate.clone(),
                    source: e,
                })?;
                file.sync_all().map_err(|e| StorageError::WriteFile {
                    path: candidate.clone(),
                    source: e,
                })?;
                return Ok(candidate);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => {
                return Err(StorageError::WriteFile {
                    path: candidate,
                    source: e,
                });
            }
        }
    }

    Err(StorageError::TooManyCollisions(dir.join(filename)))
}

/// Non-creating variant of the collision scan, for dry runs. Uses
/// symlink_metadata so broken symlinks still count as occupied.
fn resolve_available(dir: &Path, filename: &str) -> Result<PathBuf> {
    for counter in 1..=MAX_COLLISION_ATTEMPTS {
        let candidate = dir.join(numbered_variant(filename, counter));
        if std::fs::symlink_metadata(&candidate).is_err() {
            return Ok(candidate);
        }
    }
    Err(StorageError::TooManyCollisions(dir.join(filename)))
}

/// `file.pdf` for counter 1, `file_2.pdf`, `file_3.pdf`, … after.
fn numbered_variant(filename: &str, counter: u32) -> String {
    if counter == 1 {
        return filename.to_string();
    }
    match filename.rfind('.') {
        Some(dot) => format!("{}_{}{}", &filename[..dot], counter, &filename[dot..]),
        None => format!("{}_{}", filename, counter),
    }
}

/// Sanitizes a sender name into a single path segment: alphanumerics,
/// `-` and `_` pass through, every other run of characters (including
/// whitespace, `@` and `.`) collapses to one underscore. Empty input
/// falls back to [`UNKNOWN_SENDER`].
pub fn sanitize_sender(sender: &str) -> String {
    let mut result = String::with_capacity(sender.len());
    let mut last_was_sep = false;

    for c in sender.chars() {
        if c.is_alphanumeric() || c == '-' {
            result.push(c);
            last_was_sep = false;
        } else if !last_was_sep && !result.is_empty() {
            result.push('_');
            last_was_sep = true;
        }
    }

    let trimmed = result.trim_matches('_');
    if trimmed.is_empty() {
        UNKNOWN_SENDER.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Sanitizes an attachment filename: keeps alphanumerics, dots,
/// dashes, underscores and spaces; everything else becomes `_`.
/// Leading/trailing dots and spaces are stripped so the name can't
/// escape its directory or hide itself.
pub fn sanitize_filename(filename: &str) -> String {
    let cleaned: String = filename
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '.' || c == '-' || c == '_' || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect();

    let cleaned = cleaned.trim_matches(|c| c == '.' || c == ' ');

    if cleaned.is_empty() {
        "attachment".to_string()
    } else if cleaned.len() > 255 {
        let ext_start = cleaned.rfind('.').unwrap_or(cleaned.len());
        let ext = &cleaned[ext_start..];
        // Filenames come off the wire, so the cut must land on a char
        // boundary or a multibyte name panics the slice.
        let mut cut = 255usize.saturating_sub(ext.len().min(50));
        while cut > 0 && !cleaned.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}{}", &cleaned[..cut], ext)
    } else {
        cleaned.to_string()
    }
}
