//! Configuration loading with per-key defaults.

pub mod loader;
pub mod schema;

pub use loader::{load_or_init, CliOverrides};
pub use schema::{parse_file_types, Config, CredentialsMode};
