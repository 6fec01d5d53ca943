//! Loading, saving and key extraction for EJSON documents, plus the
//! whole-file encrypt/decrypt flows the command line is built from.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::crypto::{public_key_from_private, CodecError};
use crate::keydir::{KeyDir, KeyDirError};
use crate::transform::{decrypt_tree, encrypt_tree, PUBLIC_KEY_FIELD};

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("unable to read {path}: {reason}")]
    FileRead { path: PathBuf, reason: String },
    #[error("invalid JSON data in {path}: {reason}")]
    InvalidJsonData { path: PathBuf, reason: String },
    #[error("unable to write {path}: {reason}")]
    FileWrite { path: PathBuf, reason: String },
    #[error("document has no usable _public_key field")]
    MissingPublicKey,
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    KeyDir(#[from] KeyDirError),
}

/// Where the private key for a decryption comes from.
pub enum PrivateKeySource<'a> {
    /// A private key hex supplied directly, e.g. read from stdin.
    Literal(&'a str),
    /// Looked up in a key directory by the document's `_public_key`.
    KeyDir {
        keydir: &'a KeyDir,
        passphrase: Option<&'a str>,
    },
}

/// Reads and parses a document. The root must be a JSON object.
pub fn load_document(path: impl AsRef<Path>) -> Result<Value, DocumentError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|e| DocumentError::FileRead {
        path: path.to_path_buf(),
        reason: format!("{e}"),
    })?;
    parse_document(&text, path)
}

fn parse_document(text: &str, path: &Path) -> Result<Value, DocumentError> {
    let value: Value = serde_json::from_str(text).map_err(|e| DocumentError::InvalidJsonData {
        path: path.to_path_buf(),
        reason: format!("{e}"),
    })?;
    if !value.is_object() {
        return Err(DocumentError::InvalidJsonData {
            path: path.to_path_buf(),
            reason: "document root must be an object".to_string(),
        });
    }
    Ok(value)
}

/// Pretty-printed JSON with a trailing newline.
pub fn render_document(doc: &Value) -> Result<String, serde_json::Error> {
    let mut text = serde_json::to_string_pretty(doc)?;
    text.push('\n');
    Ok(text)
}

fn render_for(path: &Path, doc: &Value) -> Result<String, DocumentError> {
    render_document(doc).map_err(|e| DocumentError::FileWrite {
        path: path.to_path_buf(),
        reason: format!("{e}"),
    })
}

pub fn save_document(path: impl AsRef<Path>, doc: &Value) -> Result<(), DocumentError> {
    let path = path.as_ref();
    write_text(path, &render_for(path, doc)?)
}

fn write_text(path: &Path, text: &str) -> Result<(), DocumentError> {
    fs::write(path, text).map_err(|e| DocumentError::FileWrite {
        path: path.to_path_buf(),
        reason: format!("{e}"),
    })
}

/// Returns the document's `_public_key` string.
pub fn extract_public_key(doc: &Value) -> Result<String, DocumentError> {
    doc.get(PUBLIC_KEY_FIELD)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or(DocumentError::MissingPublicKey)
}

/// Encrypts every plaintext value of the document at `path` for its own
/// `_public_key`. The result goes to `output`, or back to `path` when no output
/// is given; an unchanged document is not rewritten. Returns the byte count of
/// the encrypted document.
pub fn encrypt_file(
    path: impl AsRef<Path>,
    output: Option<&Path>,
) -> Result<usize, DocumentError> {
    let path = path.as_ref();
    let original = fs::read_to_string(path).map_err(|e| DocumentError::FileRead {
        path: path.to_path_buf(),
        reason: format!("{e}"),
    })?;
    let doc = parse_document(&original, path)?;
    let public_hex = extract_public_key(&doc)?;

    let encrypted = encrypt_tree(&doc, &public_hex)?;
    let target = output.unwrap_or(path);
    let text = render_for(target, &encrypted)?;

    if target == path && text == original {
        tracing::debug!(
            path = %path.display(),
            "document already encrypted; leaving it untouched"
        );
        return Ok(text.len());
    }
    write_text(target, &text)?;
    tracing::debug!(
        source = %path.display(),
        target = %target.display(),
        bytes = text.len(),
        "encrypted document"
    );
    Ok(text.len())
}

/// Decrypts the document at `path`. With an `output` the plaintext document is
/// also written there; the rendered plaintext is returned either way.
pub fn decrypt_file(
    path: impl AsRef<Path>,
    key_source: PrivateKeySource<'_>,
    output: Option<&Path>,
) -> Result<String, DocumentError> {
    let path = path.as_ref();
    let doc = load_document(path)?;
    let public_hex = extract_public_key(&doc)?;

    let private_hex = match key_source {
        PrivateKeySource::Literal(private_hex) => {
            let private_hex = Zeroizing::new(private_hex.trim().to_string());
            if public_key_from_private(&private_hex)? != public_hex.to_ascii_lowercase() {
                tracing::warn!(
                    path = %path.display(),
                    "supplied private key does not match the document's _public_key"
                );
            }
            private_hex
        }
        PrivateKeySource::KeyDir { keydir, passphrase } => {
            keydir.find_private_key(&public_hex, passphrase)?
        }
    };

    let decrypted = decrypt_tree(&doc, &private_hex)?;
    let text = render_for(output.unwrap_or(path), &decrypted)?;
    if let Some(output) = output {
        write_text(output, &text)?;
    }
    tracing::debug!(path = %path.display(), "decrypted document");
    Ok(text)
}
