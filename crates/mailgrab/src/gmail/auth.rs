//! OAuth2 session management for the Gmail API.
//!
//! First run performs the Device Authorization Grant (RFC 8628): the
//! operator visits a verification URL, enters a short code, and we
//! poll the token endpoint until consent lands. The refresh token is
//! persisted next to the credential file; later runs exchange it for
//! a fresh access token and only fall back to the device flow when
//! the refresh token is expired or revoked.

use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, info, warn};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::AuthError;

const DEVICE_AUTH_URL: &str = "https://oauth2.googleapis.com/device/code";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GMAIL_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.readonly";

/// RFC 8628 device authorization grant type.
const DEVICE_CODE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:device_code";

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Floor for the device-code TTL, guarding against clock skew and
/// servers that send a degenerate expires_in.
const MIN_POLL_TTL_SECS: u64 = 5;

type Result<T> = std::result::Result<T, AuthError>;

/// Installed-app OAuth client credentials.
#[derive(Debug, Clone, Deserialize)]
pub struct AppCredentials {
    pub client_id: String,
    pub client_secret: String,
}

/// Google wraps installed-app credentials in an `installed` object;
/// a flat object is accepted too.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CredentialFile {
    Wrapped { installed: AppCredentials },
    Flat(AppCredentials),
}

/// Persisted state from a completed authorization.
#[derive(Debug, Serialize, Deserialize)]
struct StoredToken {
    refresh_token: String,
}

/// Response from the device authorization endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceCodeResponse {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    #[serde(default)]
    pub verification_uri_complete: Option<String>,
    pub expires_in: u64,
    #[serde(default = "default_interval")]
    pub interval: u64,
}

fn default_interval() -> u64 {
    5
}

/// Response from the token endpoint.
#[derive(Debug, Clone, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// Error response from the token endpoint during polling.
#[derive(Debug, Clone, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Authenticated session: holds installed-app credentials and knows
/// where the refresh token lives.
pub struct AuthSession {
    http: Client,
    credentials: AppCredentials,
    token_path: PathBuf,
}

impl AuthSession {
    /// Reads the credential JSON and prepares a session. No network
    /// contact happens until [`authenticate`](Self::authenticate).
    pub fn load(credential_path: &Path, token_path: PathBuf) -> Result<Self> {
        let content =
            std::fs::read_to_string(credential_path).map_err(|e| AuthError::ReadCredential {
                path: credential_path.to_path_buf(),
                source: e,
            })?;

        let credentials = match serde_json::from_str::<CredentialFile>(&content)
            .map_err(|e| AuthError::ParseCredential(e.to_string()))?
        {
            CredentialFile::Wrapped { installed } => installed,
            CredentialFile::Flat(flat) => flat,
        };

        let http = Client::builder()
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AuthError::Http(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            credentials,
            token_path,
        })
    }

    /// Mints an access token, refreshing when possible and running the
    /// full device flow otherwise. Any terminal failure is fatal for
    /// the run; there is no retry.
    pub async fn authenticate(&self) -> Result<SecretString> {
        if let Some(refresh_token) = self.load_refresh_token()? {
            match self.refresh_access_token(&refresh_token).await {
                Ok(token) => return Ok(token),
                Err(e) => {
                    warn!("Refresh token rejected ({}), starting device flow", e);
                }
            }
        } else {
            info!("No stored refresh token, starting device flow");
        }

        self.device_flow().await
    }

    fn load_refresh_token(&self) -> Result<Option<SecretString>> {
        if !self.token_path.exists() {
            return Ok(None);
        }

        let content =
            std::fs::read_to_string(&self.token_path).map_err(|e| AuthError::ReadCredential {
                path: self.token_path.clone(),
                source: e,
            })?;

        match serde_json::from_str::<StoredToken>(&content) {
            Ok(stored) => Ok(Some(SecretString::from(stored.refresh_token))),
            Err(e) => {
                // A corrupt token file is recoverable: the device flow
                // will mint and persist a replacement.
                warn!(
                    "Ignoring malformed token file '{}': {}",
                    self.token_path.display(),
                    e
                );
                Ok(None)
            }
        }
    }

    fn persist_refresh_token(&self, refresh_token: &str) -> Result<()> {
        let stored = StoredToken {
            refresh_token: refresh_token.to_string(),
        };
        let json = serde_json::to_string_pretty(&stored)
            .map_err(|e| AuthError::TokenExchange(e.to_string()))?;

        std::fs::write(&self.token_path, json).map_err(|e| AuthError::PersistToken {
            path: self.token_path.clone(),
            source: e,
        })?;
        restrict_permissions(&self.token_path);

        info!("Persisted refresh token to '{}'", self.token_path.display());
        Ok(())
    }

    async fn refresh_access_token(&self, refresh_token: &SecretString) -> Result<SecretString> {
        debug!("Refreshing access token");

        let params = [
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("refresh_token", refresh_token.expose_secret()),
            ("grant_type", "refresh_token"),
        ];

        let response = self
            .http
            .post(TOKEN_URL)
            .form(&params)
            .send()
            .await
            .map_err(|e| AuthError::Http(format!("Token refresh request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::TokenExchange(format!(
                "Token refresh failed ({}): {}",
                status,
                truncate_error_body(&body)
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::TokenExchange(format!("Failed to parse response: {}", e)))?;

        info!("Access token refreshed");
        Ok(SecretString::from(token.access_token))
    }

    /// Full first-run authorization: request a device code, show the
    /// consent step to the operator, poll for the token, persist the
    /// refresh token.
    async fn device_flow(&self) -> Result<SecretString> {
        let device_code = self.request_device_code().await?;

        println!(
            "Visit {} and enter code: {}",
            device_code.verification_uri, device_code.user_code
        );
        if let Some(complete) = &device_code.verification_uri_complete {
            println!("Or open directly: {}", complete);
        }

        let token = self.poll_for_token(&device_code).await?;

        match &token.refresh_token {
            Some(refresh_token) => self.persist_refresh_token(refresh_token)?,
            None => warn!("Authorization granted no refresh token; next run will re-prompt"),
        }

        Ok(SecretString::from(token.access_token))
    }

    async fn request_device_code(&self) -> Result<DeviceCodeResponse> {
        info!("Requesting device code for scope {}", GMAIL_READONLY_SCOPE);

        let params = [
            ("client_id", self.credentials.client_id.as_str()),
            ("scope", GMAIL_READONLY_SCOPE),
        ];

        let response = self
            .http
            .post(DEVICE_AUTH_URL)
            .form(&params)
            .send()
            .await
            .map_err(|e| AuthError::Http(format!("Device code request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::DeviceFlow(format!(
                "Device code request failed ({}): {}",
                status,
                truncate_error_body(&body)
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AuthError::DeviceFlow(format!("Failed to parse device code: {}", e)))
    }

    async fn poll_for_token(&self, device_code: &DeviceCodeResponse) -> Result<TokenResponse> {
        let ttl_secs = device_code.expires_in.max(MIN_POLL_TTL_SECS);
        let deadline = std::time::Instant::now() + Duration::from_secs(ttl_secs);

        let min_interval = Duration::from_secs(1);
        let max_interval = Duration::from_secs(30);
        let mut interval = Duration::from_secs(device_code.interval).max(min_interval);

        info!("Waiting for authorization (expires in {}s)", ttl_secs);

        loop {
            if std::time::Instant::now() > deadline {
                return Err(AuthError::DeviceFlow(
                    "Device code expired before authorization".to_string(),
                ));
            }

            tokio::time::sleep(interval).await;

            let params = [
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
                ("device_code", device_code.device_code.as_str()),
                ("grant_type", DEVICE_CODE_GRANT_TYPE),
            ];

            let response = self
                .http
                .post(TOKEN_URL)
                .form(&params)
                .send()
                .await
                .map_err(|e| AuthError::Http(format!("Token request failed: {}", e)))?;

            if response.status().is_success() {
                let token: TokenResponse = response.json().await.map_err(|e| {
                    AuthError::TokenExchange(format!("Failed to parse token response: {}", e))
                })?;
                info!("Authorization granted");
                return Ok(token);
            }

            let error: TokenErrorResponse = response.json().await.map_err(|e| {
                AuthError::TokenExchange(format!("Failed to parse error response: {}", e))
            })?;

            match error.error.as_str() {
                "authorization_pending" => {
                    debug!("Authorization pending, continuing to poll");
                }
                "slow_down" => {
                    // RFC 8628 section 3.5: add 5 seconds to the interval
                    interval = (interval + Duration::from_secs(5)).min(max_interval);
                    warn!("Server requested slow down, new interval: {:?}", interval);
                }
                "expired_token" => {
                    return Err(AuthError::DeviceFlow(
                        "Device code expired before authorization".to_string(),
                    ));
                }
                "access_denied" => {
                    return Err(AuthError::DeviceFlow(
                        "User denied the authorization request".to_string(),
                    ));
                }
                _ => {
                    return Err(AuthError::TokenExchange(format!(
                        "{} - {}",
                        error.error,
                        error.error_description.unwrap_or_default()
                    )));
                }
            }
        }
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)) {
        warn!("Could not restrict permissions on '{}': {}", path.display(), e);
    }
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) {}

/// Keeps OAuth error bodies short enough for logs without dropping
/// the useful part.
fn truncate_error_body(body: &str) -> String {
    const MAX_LEN: usize = 200;
    if body.len() <= MAX_LEN {
        return body.to_string();
    }
    // Server bodies can be multibyte; back off to a char boundary.
    let mut cut = MAX_LEN;
    while !body.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}... (truncated)", &body[..cut])
}
