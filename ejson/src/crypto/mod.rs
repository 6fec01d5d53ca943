//! Cryptography for encrypted JSON values. Key marshaling, the `EJ[...]` box
//! codec, and passphrase wrapping of stored private keys each live in their own
//! submodule so the security model stays simple and auditable.

pub mod boxed;
pub mod keys;
pub mod wrap;

use std::sync::OnceLock;

use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;

pub use boxed::{decrypt, encrypt, is_encrypted, EncryptedValue};
pub use keys::{decode_key, encode_key, generate_keypair, public_key_from_private, KeyPair};

/// Error kinds raised by the value codec. `DecryptionFailed` is deliberately
/// opaque: a bad MAC, a wrong key, and non-UTF-8 plaintext all look the same.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("crypto subsystem unavailable: {0}")]
    CryptoInit(String),
    #[error("invalid key format; expected 32 bytes, got {0}")]
    InvalidKeyFormat(usize),
    #[error("invalid hex string: {0}")]
    InvalidHexString(String),
    #[error("invalid base64 string: {0}")]
    InvalidBase64String(String),
    #[error("invalid encrypted value format: {0}")]
    InvalidEncryptedFormat(String),
    #[error("decryption failed")]
    DecryptionFailed,
}

static CRYPTO_READY: OnceLock<()> = OnceLock::new();

/// Makes sure the OS random source is usable before any key or nonce is drawn.
/// Success is recorded process-wide; a failure is not, so callers may retry.
pub fn ensure_initialized() -> Result<(), CodecError> {
    if CRYPTO_READY.get().is_some() {
        return Ok(());
    }
    let mut sample = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut sample)
        .map_err(|e| CodecError::CryptoInit(format!("{e}")))?;
    let _ = CRYPTO_READY.set(());
    tracing::debug!("crypto subsystem initialized");
    Ok(())
}
