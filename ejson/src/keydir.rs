//! On-disk key directory: one file per key pair, named by the public key hex
//! and holding the private key hex (or a passphrase-wrapped envelope).
//!
//! Plain key files are interchangeable with any other `EJ[1:...]` tool that
//! shares the directory. Wrapped ones are JSON and only this tool reads them.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;
use zeroize::Zeroizing;

use crate::crypto::wrap::{unwrap_private_key, wrap_private_key, WrapError, WrappedKey};
use crate::crypto::{decode_key, public_key_from_private, CodecError, KeyPair};

#[derive(Debug, Error)]
pub enum KeyDirError {
    #[error("key directory {path} unavailable: {reason}")]
    Unavailable { path: PathBuf, reason: String },
    #[error("no private key for public key {0} in the key directory")]
    MissingKey(String),
    #[error("key file {path} unreadable: {reason}")]
    Unreadable { path: PathBuf, reason: String },
    #[error("key file {path} could not be written: {reason}")]
    Unwritable { path: PathBuf, reason: String },
    #[error("key file {path} is malformed: {reason}")]
    Malformed { path: PathBuf, reason: String },
    #[error("private key in {0} does not belong to its public key")]
    KeyMismatch(PathBuf),
    #[error("key file {0} is passphrase-protected but no passphrase is configured")]
    PassphraseRequired(PathBuf),
    #[error("invalid public key: {0}")]
    InvalidPublicKey(#[from] CodecError),
    #[error(transparent)]
    Wrap(#[from] WrapError),
}

#[derive(Debug, Clone)]
pub struct KeyDir {
    root: PathBuf,
}

impl KeyDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Path of the key file for `public_hex`. The key is validated first so a
    /// crafted value can never name a file outside the directory.
    pub fn key_path(&self, public_hex: &str) -> Result<PathBuf, KeyDirError> {
        decode_key(public_hex)?;
        Ok(self.root.join(public_hex))
    }

    /// Stores the private half of `pair`, wrapped when a passphrase is given.
    /// A wrapped file is a JSON envelope, not 64 hex characters.
    pub fn write_keypair(
        &self,
        pair: &KeyPair,
        passphrase: Option<&str>,
    ) -> Result<PathBuf, KeyDirError> {
        fs::create_dir_all(&self.root).map_err(|e| KeyDirError::Unavailable {
            path: self.root.clone(),
            reason: format!("{e}"),
        })?;

        let path = self.key_path(&pair.public_hex())?;
        let private_hex = Zeroizing::new(pair.private_hex());
        let contents = match passphrase {
            Some(passphrase) => {
                let wrapped = wrap_private_key(passphrase, &private_hex)?;
                let json = serde_json::to_string(&wrapped).map_err(|e| KeyDirError::Unwritable {
                    path: path.clone(),
                    reason: format!("{e}"),
                })?;
                Zeroizing::new(json)
            }
            None => private_hex,
        };

        write_private_file(&path, contents.as_bytes()).map_err(|e| KeyDirError::Unwritable {
            path: path.clone(),
            reason: format!("{e}"),
        })?;
        tracing::debug!(
            path = %path.display(),
            wrapped = passphrase.is_some(),
            "stored private key"
        );
        Ok(path)
    }

    /// Looks up the private key for `public_hex` and checks it really derives
    /// that public key.
    pub fn find_private_key(
        &self,
        public_hex: &str,
        passphrase: Option<&str>,
    ) -> Result<Zeroizing<String>, KeyDirError> {
        let path = self.key_path(public_hex)?;
        if !path.is_file() {
            return Err(KeyDirError::MissingKey(public_hex.to_string()));
        }

        let raw = fs::read_to_string(&path).map_err(|e| KeyDirError::Unreadable {
            path: path.clone(),
            reason: format!("{e}"),
        })?;
        let raw = Zeroizing::new(raw);
        let trimmed = raw.trim();

        let private_hex = if trimmed.starts_with('{') {
            let wrapped: WrappedKey =
                serde_json::from_str(trimmed).map_err(|e| KeyDirError::Malformed {
                    path: path.clone(),
                    reason: format!("{e}"),
                })?;
            let passphrase =
                passphrase.ok_or_else(|| KeyDirError::PassphraseRequired(path.clone()))?;
            Zeroizing::new(unwrap_private_key(passphrase, &wrapped)?)
        } else {
            Zeroizing::new(trimmed.to_string())
        };

        let derived = public_key_from_private(&private_hex).map_err(|e| KeyDirError::Malformed {
            path: path.clone(),
            reason: format!("{e}"),
        })?;
        if !derived.eq_ignore_ascii_case(public_hex) {
            return Err(KeyDirError::KeyMismatch(path));
        }
        Ok(private_hex)
    }
}

#[cfg(unix)]
fn write_private_file(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    use std::os::unix::fs::OpenOptionsExt;
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(contents)
}

#[cfg(not(unix))]
fn write_private_file(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(contents)
}
