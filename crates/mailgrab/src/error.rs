use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MailgrabError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Credential vault error: {0}")]
    Vault(#[from] VaultError),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Gmail API error: {0}")]
    Api(#[from] ApiError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Record error: {0}")]
    Record(#[from] RecordError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config YAML: {0}")]
    ParseYaml(#[from] serde_yaml::Error),

    #[error("Failed to write default config to '{path}': {source}")]
    WriteDefaults {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum VaultError {
    #[error(
        "No decryption key available: set {env_var} or provide a password when prompted"
    )]
    KeyMissing { env_var: &'static str },

    #[error("Invalid encryption key: {0}")]
    InvalidKey(String),

    #[error("Decryption failed: {0}")]
    Decryption(String),

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Failed to read '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Failed to read credential file '{path}': {source}")]
    ReadCredential {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Credential file is not valid installed-app JSON: {0}")]
    ParseCredential(String),

    #[error("OAuth2 request failed: {0}")]
    Http(String),

    #[error("Token exchange failed: {0}")]
    TokenExchange(String),

    #[error("Device authorization failed: {0}")]
    DeviceFlow(String),

    #[error("Failed to persist refresh token to '{path}': {source}")]
    PersistToken {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Request failed: {0}")]
    Http(String),

    #[error("Gmail API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to decode API response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        ApiError::Http(err.to_string())
    }
}

/// Failure scoped to a single attachment. Logged and skipped, never
/// aborts the rest of the batch.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Part '{filename}' has no fetchable payload")]
    MissingPayload { filename: String },

    #[error("Failed to fetch payload for '{filename}': {source}")]
    Fetch {
        filename: String,
        #[source]
        source: ApiError,
    },

    #[error("Failed to decode payload for '{filename}': {reason}")]
    Decode { filename: String, reason: String },
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not find a free name for '{0}' after 1000 attempts")]
    TooManyCollisions(PathBuf),
}

#[derive(Error, Debug)]
pub enum RecordError {
    #[error("Failed to open '{path}' for append: {source}")]
    OpenFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to append to '{path}': {source}")]
    Append {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, MailgrabError>;
