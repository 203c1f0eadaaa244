//! Harness configuration.
//!
//! The config file is optional: a run without one uses `default_config`, and
//! command-line overrides are applied on top of whatever was loaded.
use crate::auth::Credentials;
use crate::catalog::CHALLENGE_COUNT;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use url::Url;

pub const CONFIG_SCHEMA_VERSION: u32 = 1;
pub const DEFAULT_CONFIG_PATH: &str = "challenger.json";
pub const DEFAULT_BASE_URL: &str = "https://apichallenges.herokuapp.com/";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HarnessConfig {
    pub schema_version: u32,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default = "default_password")]
    pub password: String,
    #[serde(default = "default_expected_challenges")]
    pub expected_challenges: usize,
    #[serde(default = "default_reconcile")]
    pub reconcile: bool,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_username() -> String {
    Credentials::default().username
}

fn default_password() -> String {
    Credentials::default().password
}

fn default_expected_challenges() -> usize {
    CHALLENGE_COUNT
}

fn default_reconcile() -> bool {
    true
}

impl HarnessConfig {
    /// Base URL parsed and normalized to end with `/`, so relative paths join
    /// beneath it instead of replacing its last segment.
    pub fn base_url(&self) -> Result<Url> {
        let mut text = self.base_url.trim().to_string();
        if !text.ends_with('/') {
            text.push('/');
        }
        Url::parse(&text).with_context(|| format!("parse base_url {:?}", self.base_url))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.username.clone(), self.password.clone())
    }
}

/// Values given on the command line; each one wins over the file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub base_url: Option<String>,
    pub timeout_seconds: Option<u64>,
    pub skip_reconcile: bool,
}

pub fn default_config() -> HarnessConfig {
    HarnessConfig {
        schema_version: CONFIG_SCHEMA_VERSION,
        base_url: default_base_url(),
        timeout_seconds: default_timeout_seconds(),
        username: default_username(),
        password: default_password(),
        expected_challenges: default_expected_challenges(),
        reconcile: default_reconcile(),
    }
}

/// Render a pretty JSON config stub.
pub fn config_stub() -> Result<String> {
    serde_json::to_string_pretty(&default_config()).context("serialize config stub")
}

pub fn load_config(path: &Path) -> Result<HarnessConfig> {
    let bytes = fs::read(path).with_context(|| format!("read config {}", path.display()))?;
    let config: HarnessConfig = serde_json::from_slice(&bytes)
        .with_context(|| format!("parse config JSON {}", path.display()))?;
    Ok(config)
}

/// Load `path` when given; otherwise fall back to the default file if it
/// exists, and to built-in defaults if it does not.
pub fn resolve_config(path: Option<&Path>, overrides: &ConfigOverrides) -> Result<HarnessConfig> {
    let mut config = match path {
        Some(path) => load_config(path)?,
        None if Path::new(DEFAULT_CONFIG_PATH).is_file() => {
            load_config(Path::new(DEFAULT_CONFIG_PATH))?
        }
        None => default_config(),
    };
    apply_overrides(&mut config, overrides);
    validate_config(&config)?;
    Ok(config)
}

pub fn apply_overrides(config: &mut HarnessConfig, overrides: &ConfigOverrides) {
    if let Some(base_url) = overrides.base_url.as_ref() {
        config.base_url = base_url.clone();
    }
    if let Some(timeout_seconds) = overrides.timeout_seconds {
        config.timeout_seconds = timeout_seconds;
    }
    if overrides.skip_reconcile {
        config.reconcile = false;
    }
}

/// Write a config stub, refusing to replace an existing file unless `force`.
pub fn write_config_stub(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        return Err(anyhow!(
            "config {} already exists (use --force to overwrite)",
            path.display()
        ));
    }
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create config dir {}", parent.display()))?;
    }
    let mut text = config_stub()?;
    text.push('\n');
    fs::write(path, text.as_bytes()).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

pub fn validate_config(config: &HarnessConfig) -> Result<()> {
    if config.schema_version != CONFIG_SCHEMA_VERSION {
        return Err(anyhow!(
            "unsupported config schema_version {}",
            config.schema_version
        ));
    }
    if config.base_url.trim().is_empty() {
        return Err(anyhow!("base_url must be non-empty"));
    }
    let url = config.base_url()?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(anyhow!(
            "base_url must use http or https (got {:?})",
            url.scheme()
        ));
    }
    if config.timeout_seconds == 0 {
        return Err(anyhow!("timeout_seconds must be positive"));
    }
    if config.username.trim().is_empty() {
        return Err(anyhow!("username must be non-empty"));
    }
    if config.expected_challenges != CHALLENGE_COUNT {
        return Err(anyhow!(
            "expected_challenges must be {CHALLENGE_COUNT} (got {})",
            config.expected_challenges
        ));
    }
    Ok(())
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
