pub mod config;
pub mod error;
pub mod gmail;
pub mod pipeline;
pub mod record;
pub mod storage;
pub mod vault;

pub use config::{load_or_init, CliOverrides, Config};
pub use error::{MailgrabError, Result};
pub use gmail::{AuthSession, GmailClient};
pub use pipeline::{Downloader, RunSummary};
pub use record::{DownloadRecord, Outcome, RecordKeeper};
pub use storage::FileWriter;
pub use vault::{UnlockedCredentials, VAULT_KEY_ENV_VAR};
