//! Credential storage in the system keychain.
//!
//! All credentials live in one JSON-encoded keychain entry so the OS prompts
//! for access at most once per process.

use keyring::Entry;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock};

const KEYRING_SERVICE: &str = "repair-relay";
const KEYRING_USERNAME: &str = "default";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct StoredCredentials {
    #[serde(skip_serializing_if = "Option::is_none")]
    gemini_api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    github_token: Option<String>,
}

type KeyringResult<T> = Result<T, String>;

static CREDENTIALS_CACHE: OnceLock<Mutex<Option<StoredCredentials>>> = OnceLock::new();
static KEYRING_ERROR_WARNED: AtomicBool = AtomicBool::new(false);

fn credentials_cache() -> &'static Mutex<Option<StoredCredentials>> {
    CREDENTIALS_CACHE.get_or_init(|| Mutex::new(None))
}

/// Off under test, or when `REPAIR_RELAY_DISABLE_KEYRING` is truthy.
pub fn keyring_disabled() -> bool {
    if cfg!(test) {
        return true;
    }
    is_truthy(&std::env::var("REPAIR_RELAY_DISABLE_KEYRING").unwrap_or_default())
}

fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes")
}

fn keyring_entry() -> Result<Entry, keyring::Error> {
    Entry::new(KEYRING_SERVICE, KEYRING_USERNAME)
}

/// Warn about keychain errors only once per process
pub fn warn_keychain_error_once(context: &str, err: &str) {
    if KEYRING_ERROR_WARNED.swap(true, Ordering::Relaxed) {
        return;
    }
    tracing::warn!("Couldn't access system keychain for {}: {}", context, err);
    tracing::warn!("Set GEMINI_API_KEY and GITHUB_TOKEN to bypass the keychain.");
}

fn read_credentials_uncached() -> KeyringResult<StoredCredentials> {
    if keyring_disabled() {
        return Ok(StoredCredentials::default());
    }
    let entry = keyring_entry().map_err(|e| e.to_string())?;
    match entry.get_password() {
        Ok(json) => {
            serde_json::from_str(&json).map_err(|e| format!("Failed to parse credentials: {}", e))
        }
        Err(keyring::Error::NoEntry) => Ok(StoredCredentials::default()),
        Err(err) => Err(err.to_string()),
    }
}

fn write_credentials(creds: &StoredCredentials) -> KeyringResult<()> {
    if keyring_disabled() {
        return Err("system keychain is disabled".to_string());
    }
    let json = serde_json::to_string(creds).map_err(|e| e.to_string())?;
    keyring_entry()
        .and_then(|entry| entry.set_password(&json))
        .map_err(|e| e.to_string())
}

fn read_credentials_cached() -> KeyringResult<StoredCredentials> {
    let mut guard = match credentials_cache().lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    if let Some(creds) = guard.as_ref() {
        return Ok(creds.clone());
    }
    let creds = read_credentials_uncached()?;
    *guard = Some(creds.clone());
    Ok(creds)
}

fn update_credentials(update: impl FnOnce(&mut StoredCredentials)) -> KeyringResult<()> {
    let mut creds = read_credentials_cached().unwrap_or_default();
    update(&mut creds);
    write_credentials(&creds)?;
    let mut guard = match credentials_cache().lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    *guard = Some(creds);
    Ok(())
}

// ============================================================================
// Public API
// ============================================================================

pub fn get_api_key() -> KeyringResult<Option<String>> {
    Ok(read_credentials_cached()?.gemini_api_key)
}

pub fn set_api_key(key: &str) -> KeyringResult<()> {
    update_credentials(|creds| creds.gemini_api_key = Some(key.to_string()))
}

pub fn get_github_token() -> KeyringResult<Option<String>> {
    Ok(read_credentials_cached()?.github_token)
}

pub fn set_github_token(token: &str) -> KeyringResult<()> {
    update_credentials(|creds| creds.github_token = Some(token.to_string()))
}
