//! Runtime configuration. The key directory is resolved from, in order, the
//! command line, the `EJSON_KEYDIR` environment variable, an optional JSON
//! config file, and finally the built-in default.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_KEYDIR: &str = "/opt/ejson/keys";
pub const KEYDIR_ENV: &str = "EJSON_KEYDIR";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file unreadable: {0}")]
    Io(String),
    #[error("config parse failed: {0}")]
    Parse(String),
    #[error("passphrase variable {0} is not set")]
    PassphraseUnset(String),
}

/// Shape of the optional JSON config file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfig {
    /// Directory holding `<public key hex>` private key files.
    pub keydir: Option<PathBuf>,
    /// Environment variable that stores the passphrase protecting key files.
    pub passphrase_env: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub keydir: PathBuf,
    pub passphrase_env: Option<String>,
}

impl Config {
    /// Resolves configuration against the real process environment.
    pub fn load(
        cli_keydir: Option<PathBuf>,
        config_path: Option<&Path>,
    ) -> Result<Self, ConfigError> {
        let env_keydir = std::env::var_os(KEYDIR_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        let raw = match config_path {
            Some(path) => read_raw_config(path)?,
            None => RawConfig::default(),
        };
        Ok(Self::resolve(cli_keydir, env_keydir, raw))
    }

    pub fn resolve(
        cli_keydir: Option<PathBuf>,
        env_keydir: Option<PathBuf>,
        raw: RawConfig,
    ) -> Self {
        let keydir = cli_keydir
            .or(env_keydir)
            .or(raw.keydir)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_KEYDIR));
        tracing::debug!(keydir = %keydir.display(), "resolved key directory");
        Self {
            keydir,
            passphrase_env: raw.passphrase_env,
        }
    }

    /// Reads the key-file passphrase, if one is configured.
    pub fn passphrase(&self) -> Result<Option<String>, ConfigError> {
        match &self.passphrase_env {
            Some(var) => std::env::var(var)
                .map(Some)
                .map_err(|_| ConfigError::PassphraseUnset(var.clone())),
            None => Ok(None),
        }
    }
}

fn read_raw_config(path: &Path) -> Result<RawConfig, ConfigError> {
    let raw_json = fs::read_to_string(path).map_err(|e| ConfigError::Io(format!("{e}")))?;
    serde_json::from_str(&raw_json).map_err(|e| ConfigError::Parse(format!("{e}")))
}
