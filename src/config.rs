//! Configuration management for repair-relay
//!
//! Stores settings in ~/.config/repair-relay/config.json (platform config dir).
//! The API key itself never lives in this file; it comes from the environment
//! or the system keychain.

use crate::github::DEFAULT_FILE_CAP;
use crate::keyring;
use crate::llm::backend::DEFAULT_API_BASE_URL;
use crate::llm::client::{RetryPolicy, INITIAL_BACKOFF_MS, MAX_RETRIES};
use crate::llm::models::{ModelMap, DEFAULT_DEEP_MODEL, DEFAULT_FAST_MODEL};
use crate::llm::repair::{RepairBudgets, DEFAULT_THINKING_BUDGET, DEFAULT_VERIFY_THINKING_BUDGET};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const API_KEY_ENV: &str = "GEMINI_API_KEY";
const CONFIG_DIR_NAME: &str = "repair-relay";
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub fast_model: String,
    pub deep_model: String,
    pub api_base_url: String,
    /// Reasoning budget for deep chat, draft and refine
    pub thinking_budget: u32,
    /// Reduced budget for the verification pass
    pub verify_thinking_budget: u32,
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub request_timeout_secs: u64,
    /// Maximum files pulled by `fetch`
    pub github_file_cap: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fast_model: DEFAULT_FAST_MODEL.to_string(),
            deep_model: DEFAULT_DEEP_MODEL.to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            thinking_budget: DEFAULT_THINKING_BUDGET,
            verify_thinking_budget: DEFAULT_VERIFY_THINKING_BUDGET,
            max_retries: MAX_RETRIES,
            initial_backoff_ms: INITIAL_BACKOFF_MS,
            request_timeout_secs: 120,
            github_file_cap: DEFAULT_FILE_CAP,
        }
    }
}

impl Config {
    fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join(CONFIG_DIR_NAME))
    }

    fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join(CONFIG_FILE))
    }

    /// Load config from the platform config dir, or return defaults
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Load from `path`. A missing file gives defaults; a corrupt one is kept
    /// as `config.json.corrupt` and defaults are used.
    pub fn load_from(path: &Path) -> Self {
        let Ok(content) = fs::read_to_string(path) else {
            return Self::default();
        };
        match serde_json::from_str(&content) {
            Ok(config) => config,
            Err(err) => {
                preserve_corrupt_config(path, &content);
                tracing::warn!(
                    "Config file was corrupted ({}). A backup was saved and defaults were loaded.",
                    err
                );
                Self::default()
            }
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path().context("Could not determine config directory")?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).context("Failed to create config directory")?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Err(e) = fs::set_permissions(dir, fs::Permissions::from_mode(0o700)) {
                    tracing::warn!("Failed to set config directory permissions: {}", e);
                }
            }
        }
        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        crate::store::write_atomic(path, &content).context("Failed to write config")
    }

    /// Config file location for display
    pub fn config_location() -> String {
        Self::config_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| format!("~/.config/{}/{}", CONFIG_DIR_NAME, CONFIG_FILE))
    }

    pub fn model_map(&self) -> ModelMap {
        ModelMap {
            fast: self.fast_model.clone(),
            deep: self.deep_model.clone(),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
        }
    }

    pub fn repair_budgets(&self) -> RepairBudgets {
        RepairBudgets {
            full: self.thinking_budget,
            verify: self.verify_thinking_budget,
        }
    }
}

/// Model API key from the environment, else the keychain.
pub fn get_api_key() -> Option<String> {
    if let Ok(key) = std::env::var(API_KEY_ENV) {
        if !key.trim().is_empty() {
            return Some(key.trim().to_string());
        }
    }
    match keyring::get_api_key() {
        Ok(key) => key,
        Err(err) => {
            keyring::warn_keychain_error_once("API key", &err);
            None
        }
    }
}

/// Store the API key in the keychain and read it back to confirm.
pub fn set_api_key(key: &str) -> Result<()> {
    keyring::set_api_key(key).map_err(|e| {
        anyhow::anyhow!(
            "Failed to store API key in system keychain: {}. Set {} instead.",
            e,
            API_KEY_ENV
        )
    })?;
    match keyring::get_api_key() {
        Ok(Some(stored)) if stored == key => Ok(()),
        Ok(_) => Err(anyhow::anyhow!(
            "API key verification failed: the keychain did not return the stored key. Set {} instead.",
            API_KEY_ENV
        )),
        Err(e) => Err(anyhow::anyhow!(
            "API key verification failed: couldn't read back from keychain ({}). Set {} instead.",
            e,
            API_KEY_ENV
        )),
    }
}

/// Interactive prompt to store the API key
pub fn setup_api_key_interactive() -> Result<()> {
    use std::io::{self, Write};

    println!();
    println!("  repair-relay needs a Gemini API key.");
    println!("  1. Create one at: https://aistudio.google.com/app/apikey");
    println!("  2. Paste it below (saved in your system keychain)");
    println!();
    print!("  API Key: ");
    io::stdout().flush()?;

    let mut key = String::new();
    io::stdin().read_line(&mut key)?;
    let key = key.trim();
    if key.is_empty() {
        anyhow::bail!("No API key provided");
    }
    if !key.starts_with("AIza") {
        println!("  Warning: Key doesn't look like a Gemini key (usually starts with AIza). Saving anyway...");
    }

    set_api_key(key)?;
    println!("  + API key saved to the system keychain");
    Ok(())
}

fn preserve_corrupt_config(path: &Path, content: &str) {
    let corrupt_path = path.with_extension("json.corrupt");
    if fs::rename(path, &corrupt_path).is_err() {
        let _ = fs::write(&corrupt_path, content);
    }
}
