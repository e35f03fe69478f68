//! The search-fetch-write loop.
//!
//! Messages are processed one at a time, attachments within a
//! message in document order. A failure fetching or writing one
//! attachment is recorded and does not stop the run; API errors on
//! the search or message fetch are fatal.

use std::time::Instant;

use log::{info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::gmail::{candidates, GmailClient};
use crate::record::{DownloadRecord, LogLevel, Outcome, RecordKeeper};
use crate::storage::FileWriter;

/// Counters for one completed run.
#[derive(Debug, Default, Clone, Copy)]
pub struct RunSummary {
    pub messages_scanned: usize,
    pub attachments_recorded: usize,
    pub saved: usize,
    pub skipped: usize,
    pub dry_run: usize,
    pub failed: usize,
}

impl RunSummary {
    fn count(&mut self, outcome: Outcome) {
        self.attachments_recorded += 1;
        match outcome {
            Outcome::Saved => self.saved += 1,
            Outcome::Skipped => self.skipped += 1,
            Outcome::DryRun => self.dry_run += 1,
            Outcome::Failed => self.failed += 1,
        }
    }
}

/// Drives one search from query to CSV rows on disk.
pub struct Downloader<'a> {
    client: &'a GmailClient,
    keeper: &'a RecordKeeper,
    writer: FileWriter,
    query: String,
    allowed_extensions: Vec<String>,
    dry_run: bool,
}

impl<'a> Downloader<'a> {
    pub fn new(client: &'a GmailClient, keeper: &'a RecordKeeper, config: &Config) -> Self {
        Self {
            client,
            keeper,
            writer: FileWriter::from_config(config),
            query: config.search.query.clone(),
            allowed_extensions: config.allowed_extensions(),
            dry_run: config.search.dry_run,
        }
    }

    /// Runs the search to exhaustion. Returns normally even when
    /// zero messages match or individual attachments fail; the
    /// summary and the CSV record carry the per-attachment outcomes.
    pub async fn run(&self) -> Result<RunSummary> {
        let started = Instant::now();
        let mut summary = RunSummary::default();

        self.keeper.log_event(
            LogLevel::Info,
            &format!(
                "Starting search: query=\"{}\"{}",
                self.query,
                if self.dry_run { " (dry run)" } else { "" }
            ),
        )?;

        let mut stream = self.client.search(&self.query);
        while let Some(message_ref) = stream.next().await? {
            summary.messages_scanned += 1;
            self.process_message(&message_ref.id, &mut summary).await?;
        }

        self.keeper
            .log_search(&self.query, summary.messages_scanned, started.elapsed())?;
        self.keeper.log_event(
            LogLevel::Info,
            &format!(
                "Search complete: {} messages, {} attachments ({} saved, {} skipped, {} dry-run, {} failed)",
                summary.messages_scanned,
                summary.attachments_recorded,
                summary.saved,
                summary.skipped,
                summary.dry_run,
                summary.failed,
            ),
        )?;

        info!(
            "Run complete: {} messages scanned, {} attachments recorded",
            summary.messages_scanned, summary.attachments_recorded
        );
        Ok(summary)
    }

    async fn process_message(&self, message_id: &str, summary: &mut RunSummary) -> Result<()> {
        let message = match self.client.get_message(message_id).await {
            Ok(message) => message,
            Err(e) => {
                self.keeper.log_event(
                    LogLevel::Error,
                    &format!("Failed to fetch message {}: {}", message_id, e),
                )?;
                return Err(e.into());
            }
        };

        let sender = message.sender_name();
        let subject = message.subject().to_string();
        let timestamp = message.timestamp();

        for candidate in candidates(&message, &self.allowed_extensions) {
            let payload = match candidate.fetch_payload(self.client, message_id).await {
                Ok(payload) => payload,
                Err(e) => {
                    warn!("Skipping '{}' in message {}: {}", candidate.filename, message_id, e);
                    self.keeper
                        .log_event(LogLevel::Warn, &format!("Skipping attachment: {}", e))?;
                    let record = DownloadRecord {
                        sender: sender.clone(),
                        subject: subject.clone(),
                        timestamp: timestamp.clone(),
                        filename: candidate.filename.clone(),
                        saved_path: String::new(),
                        size: 0,
                        outcome: Outcome::Skipped,
                    };
                    self.keeper.record(&record)?;
                    summary.count(Outcome::Skipped);
                    continue;
                }
            };

            let size = payload.len() as u64;
            let (saved_path, outcome) =
                match self.writer.write(&candidate.filename, &payload, &sender) {
                    Ok(result) => (result.path.display().to_string(), result.outcome),
                    Err(e) => {
                        self.keeper.log_event(
                            LogLevel::Error,
                            &format!("Failed to write '{}': {}", candidate.filename, e),
                        )?;
                        (String::new(), Outcome::Failed)
                    }
                };

            if outcome == Outcome::Saved {
                self.keeper.log_event(
                    LogLevel::Info,
                    &format!("Saved '{}' from {} to {}", candidate.filename, sender, saved_path),
                )?;
            }

            // Row goes in only after the write has settled, one way
            // or the other.
            let record = DownloadRecord {
                sender: sender.clone(),
                subject: subject.clone(),
                timestamp: timestamp.clone(),
                filename: candidate.filename.clone(),
                saved_path,
                size,
                outcome,
            };
            self.keeper.record(&record)?;
            summary.count(outcome);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_counts_by_outcome() {
        let mut summary = RunSummary::default();
        summary.count(Outcome::Saved);
        summary.count(Outcome::Saved);
        summary.count(Outcome::Skipped);
        summary.count(Outcome::Failed);

        assert_eq!(summary.attachments_recorded, 4);
        assert_eq!(summary.saved, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.dry_run, 0);
    }
}
