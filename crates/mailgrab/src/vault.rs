//! Credential vault: at-rest encryption for the API credential file.
//!
//! The on-disk format is `<12-byte nonce><AES-256-GCM ciphertext>`.
//! Keys are 64-character hex strings (32 bytes decoded). A password
//! can stand in for a key: it is padded or truncated to 32 bytes, so
//! the same password always yields the same key.

use std::io::Write;
use std::path::{Path, PathBuf};

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use log::{info, warn};
use secrecy::{ExposeSecret, SecretString};
use tempfile::NamedTempFile;

use crate::config::{Config, CredentialsMode};
use crate::error::VaultError;

/// Environment variable supplying the decryption key.
pub const VAULT_KEY_ENV_VAR: &str = "MAILGRAB_VAULT_KEY";

/// Nonce size for AES-256-GCM (96 bits = 12 bytes).
const NONCE_SIZE: usize = 12;

type Result<T> = std::result::Result<T, VaultError>;

/// A usable plaintext credential path, cleaned up on drop when it was
/// decrypted into a temporary file.
#[derive(Debug)]
pub enum UnlockedCredentials {
    /// Plain mode: the configured path, untouched.
    Plain(PathBuf),
    /// Encrypted mode: plaintext in a temp file that `NamedTempFile`
    /// deletes when this value is dropped, on every exit path.
    Ephemeral(NamedTempFile),
}

impl UnlockedCredentials {
    pub fn path(&self) -> &Path {
        match self {
            UnlockedCredentials::Plain(path) => path,
            UnlockedCredentials::Ephemeral(file) => file.path(),
        }
    }
}

/// Decrypts (or passes through) the configured credential file.
///
/// In encrypted mode the key comes from `MAILGRAB_VAULT_KEY` first and
/// an interactive prompt second. A wrong key or tampered blob is a
/// hard `Decryption` error; the blob is never treated as plaintext.
pub fn unlock(config: &Config) -> Result<UnlockedCredentials> {
    match config.gmail.credentials_mode {
        CredentialsMode::Plain => Ok(UnlockedCredentials::Plain(
            config.gmail.credentials_file.clone(),
        )),
        CredentialsMode::Encrypted => {
            let key = resolve_key()?;
            let cipher = cipher_from_hex_key(key.expose_secret())?;

            let source = &config.gmail.encrypted_credentials_file;
            let blob = std::fs::read(source).map_err(|e| VaultError::ReadFile {
                path: source.clone(),
                source: e,
            })?;

            let plaintext = decrypt_blob(&cipher, &blob)?;

            let mut file = tempfile::Builder::new()
                .prefix("mailgrab-credentials-")
                .suffix(".json")
                .tempfile()?;
            restrict_permissions(file.path())?;
            file.write_all(&plaintext)?;
            file.flush()?;

            info!(
                "Decrypted credentials into ephemeral file {}",
                file.path().display()
            );
            Ok(UnlockedCredentials::Ephemeral(file))
        }
    }
}

/// One-shot companion operation: encrypt `input` with a key derived
/// from `password` (or a random key when no password is given), write
/// the ciphertext to `output` (default `<input>.encrypted`), and
/// return the hex key for the operator to store. The original file is
/// left in place.
pub fn encrypt_file(
    input: &Path,
    output: Option<&Path>,
    password: Option<&str>,
) -> Result<(PathBuf, String)> {
    let key_hex = match password {
        Some(password) => derive_key_from_password(password),
        None => hex_encode(&rand_bytes::<32>()?),
    };
    let cipher = cipher_from_hex_key(&key_hex)?;

    let plaintext = std::fs::read(input).map_err(|e| VaultError::ReadFile {
        path: input.to_path_buf(),
        source: e,
    })?;

    let blob = encrypt_blob(&cipher, &plaintext)?;

    let output = output.map(Path::to_path_buf).unwrap_or_else(|| {
        let mut name = input.as_os_str().to_os_string();
        name.push(".encrypted");
        PathBuf::from(name)
    });

    std::fs::write(&output, blob).map_err(|e| VaultError::WriteFile {
        path: output.clone(),
        source: e,
    })?;

    info!("Encrypted '{}' to '{}'", input.display(), output.display());
    Ok((output, key_hex))
}

/// Derives a 32-byte key from a password by padding with spaces or
/// truncating to exactly 32 bytes, then hex-encodes it. Deliberately
/// matches the historical derivation so existing blobs stay readable.
pub fn derive_key_from_password(password: &str) -> String {
    let mut bytes = password.as_bytes().to_vec();
    bytes.resize(32, b' ');
    bytes.truncate(32);
    hex_encode(&bytes)
}

fn resolve_key() -> Result<SecretString> {
    match std::env::var(VAULT_KEY_ENV_VAR) {
        Ok(value) if !value.trim().is_empty() => {
            return Ok(SecretString::from(value.trim()));
        }
        Ok(_) | Err(std::env::VarError::NotPresent) => {}
        Err(std::env::VarError::NotUnicode(_)) => {
            warn!("{} contains invalid UTF-8, ignoring", VAULT_KEY_ENV_VAR);
        }
    }

    prompt_password().map(|password| SecretString::from(derive_key_from_password(&password)))
}

/// Reads a decryption password from stdin. Used only when the key
/// environment variable is absent.
fn prompt_password() -> Result<String> {
    use std::io::BufRead;

    if atty_is_absent() {
        return Err(VaultError::KeyMissing {
            env_var: VAULT_KEY_ENV_VAR,
        });
    }

    eprint!("Enter password for credential decryption: ");
    std::io::stderr().flush()?;

    let mut input = String::new();
    std::io::stdin().lock().read_line(&mut input)?;

    let password = input.trim_end_matches(['\n', '\r']).to_string();
    if password.is_empty() {
        return Err(VaultError::KeyMissing {
            env_var: VAULT_KEY_ENV_VAR,
        });
    }
    Ok(password)
}

/// A prompt is pointless without a terminal; fail fast so unattended
/// runs get a clear KeyMissing error instead of hanging on stdin.
fn atty_is_absent() -> bool {
    use std::io::IsTerminal;
    !std::io::stdin().is_terminal()
}

fn cipher_from_hex_key(key_hex: &str) -> Result<Aes256Gcm> {
    let key_bytes =
        hex_decode(key_hex).map_err(|e| VaultError::InvalidKey(format!("Invalid hex key: {}", e)))?;

    if key_bytes.len() != 32 {
        return Err(VaultError::InvalidKey(format!(
            "Key must be 32 bytes (64 hex chars), got {} bytes",
            key_bytes.len()
        )));
    }

    Aes256Gcm::new_from_slice(&key_bytes)
        .map_err(|e| VaultError::InvalidKey(format!("Failed to create cipher: {}", e)))
}

fn encrypt_blob(cipher: &Aes256Gcm, plaintext: &[u8]) -> Result<Vec<u8>> {
    let nonce_bytes = rand_bytes::<NONCE_SIZE>()?;
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| VaultError::Encryption(e.to_string()))?;

    let mut blob = nonce_bytes.to_vec();
    blob.extend(ciphertext);
    Ok(blob)
}

fn decrypt_blob(cipher: &Aes256Gcm, blob: &[u8]) -> Result<Vec<u8>> {
    if blob.len() < NONCE_SIZE {
        return Err(VaultError::Decryption("Ciphertext too short".to_string()));
    }

    let (nonce_bytes, ciphertext) = blob.split_at(NONCE_SIZE);
    let nonce = Nonce::from_slice(nonce_bytes);

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|e| VaultError::Decryption(e.to_string()))
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

/// Encodes bytes as lowercase hex string.
fn hex_encode(bytes: &[u8]) -> String {
    const HEX_CHARS: &[u8; 16] = b"0123456789abcdef";
    let mut result = String::with_capacity(bytes.len() * 2);
    for &byte in bytes {
        result.push(HEX_CHARS[(byte >> 4) as usize] as char);
        result.push(HEX_CHARS[(byte & 0x0f) as usize] as char);
    }
    result
}

/// Decodes hex string to bytes.
fn hex_decode(hex: &str) -> std::result::Result<Vec<u8>, String> {
    if hex.len() % 2 != 0 {
        return Err("Hex string must have even length".to_string());
    }

    (0..hex.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&hex[i..i + 2], 16)
                .map_err(|e| format!("Invalid hex at position {}: {}", i, e))
        })
        .collect()
}

fn rand_bytes<const N: usize>() -> Result<[u8; N]> {
    let mut bytes = [0u8; N];
    getrandom::getrandom(&mut bytes)
        .map_err(|e| VaultError::Encryption(format!("Failed to generate random bytes: {}", e)))?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    const TEST_KEY: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

    #[test]
    fn test_encrypt_unlock_roundtrip() {
        let dir = TempDir::new().unwrap();
        let plain_path = dir.path().join("credentials.json");
        std::fs::write(&plain_path, br#"{"client_id":"abc"}"#).unwrap();

        let (encrypted_path, key) =
            encrypt_file(&plain_path, None, Some("hunter2-hunter2")).unwrap();
        assert_eq!(
            encrypted_path,
            dir.path().join("credentials.json.encrypted")
        );
        // Original untouched.
        assert!(plain_path.exists());

        let cipher = cipher_from_hex_key(&key).unwrap();
        let blob = std::fs::read(&encrypted_path).unwrap();
        let plaintext = decrypt_blob(&cipher, &blob).unwrap();
        assert_eq!(plaintext, br#"{"client_id":"abc"}"#);
    }

    #[test]
    fn test_wrong_key_is_decryption_error() {
        let cipher = cipher_from_hex_key(TEST_KEY).unwrap();
        let blob = encrypt_blob(&cipher, b"secret bytes").unwrap();

        let wrong = cipher_from_hex_key(&derive_key_from_password("wrong password")).unwrap();
        let result = decrypt_blob(&wrong, &blob);
        assert!(matches!(result, Err(VaultError::Decryption(_))));
    }

    #[test]
    fn test_tampered_blob_fails_authentication() {
        let cipher = cipher_from_hex_key(TEST_KEY).unwrap();
        let mut blob = encrypt_blob(&cipher, b"secret bytes").unwrap();
        if let Some(byte) = blob.last_mut() {
            *byte ^= 0xff;
        }
        assert!(matches!(
            decrypt_blob(&cipher, &blob),
            Err(VaultError::Decryption(_))
        ));
    }

    #[test]
    fn test_truncated_blob_fails() {
        let cipher = cipher_from_hex_key(TEST_KEY).unwrap();
        let result = decrypt_blob(&cipher, &[0xaa, 0xbb, 0xcc]);
        assert!(matches!(result, Err(VaultError::Decryption(_))));
    }

    #[test]
    fn test_derive_key_is_deterministic_32_bytes() {
        let a = derive_key_from_password("short");
        let b = derive_key_from_password("short");
        assert_eq!(a, b);
        assert_eq!(hex_decode(&a).unwrap().len(), 32);

        // Longer than 32 bytes gets truncated, still valid.
        let long = derive_key_from_password(
            "a password that is definitely longer than thirty-two bytes in total",
        );
        assert_eq!(hex_decode(&long).unwrap().len(), 32);
    }

    #[test]
    fn test_invalid_key_rejected() {
        assert!(matches!(
            cipher_from_hex_key("deadbeef"),
            Err(VaultError::InvalidKey(_))
        ));
        assert!(matches!(
            cipher_from_hex_key("not-hex-at-all!!"),
            Err(VaultError::InvalidKey(_))
        ));
    }

    #[test]
    #[serial]
    fn test_unlock_plain_passes_path_through() {
        let config = Config::default();
        let unlocked = unlock(&config).unwrap();
        assert_eq!(unlocked.path(), config.gmail.credentials_file.as_path());
    }

    #[test]
    #[serial]
    fn test_unlock_encrypted_with_env_key() {
        let dir = TempDir::new().unwrap();
        let plain_path = dir.path().join("credentials.json");
        std::fs::write(&plain_path, br#"{"client_id":"xyz"}"#).unwrap();
        let (encrypted_path, key) = encrypt_file(&plain_path, None, Some("roundtrip")).unwrap();

        let mut config = Config::default();
        config.gmail.credentials_mode = CredentialsMode::Encrypted;
        config.gmail.encrypted_credentials_file = encrypted_path;

        std::env::set_var(VAULT_KEY_ENV_VAR, &key);
        let unlocked = unlock(&config).unwrap();
        std::env::remove_var(VAULT_KEY_ENV_VAR);

        let ephemeral_path = unlocked.path().to_path_buf();
        assert_eq!(
            std::fs::read(&ephemeral_path).unwrap(),
            br#"{"client_id":"xyz"}"#
        );

        // Guard drop removes the plaintext copy.
        drop(unlocked);
        assert!(!ephemeral_path.exists());
    }

    #[test]
    #[serial]
    fn test_unlock_encrypted_wrong_env_key() {
        let dir = TempDir::new().unwrap();
        let plain_path = dir.path().join("credentials.json");
        std::fs::write(&plain_path, b"{}").unwrap();
        let (encrypted_path, _key) = encrypt_file(&plain_path, None, Some("correct")).unwrap();

        let mut config = Config::default();
        config.gmail.credentials_mode = CredentialsMode::Encrypted;
        config.gmail.encrypted_credentials_file = encrypted_path;

        std::env::set_var(VAULT_KEY_ENV_VAR, derive_key_from_password("incorrect"));
        let result = unlock(&config);
        std::env::remove_var(VAULT_KEY_ENV_VAR);

        assert!(matches!(result, Err(VaultError::Decryption(_))));
    }

    #[test]
    fn test_random_key_encrypt() {
        let dir = TempDir::new().unwrap();
        let plain_path = dir.path().join("file.json");
        std::fs::write(&plain_path, b"payload").unwrap();

        let (output, key) = encrypt_file(&plain_path, None, None).unwrap();
        assert_eq!(key.len(), 64);

        let cipher = cipher_from_hex_key(&key).unwrap();
        let blob = std::fs::read(output).unwrap();
        assert_eq!(decrypt_blob(&cipher, &blob).unwrap(), b"payload");
    }
}
