//! Passphrase wrapping for private keys kept in the key directory.
//! A key file may hold the bare private key hex or a `WrappedKey` envelope:
//! ChaCha20-Poly1305 under an Argon2id key derived from a local passphrase.
//!
//! The envelope is local to this tool. Other `EJ[1:...]` implementations
//! expect 64 hex characters in a key file and cannot read a wrapped one.

use argon2::{Algorithm, Argon2, Params, Version};
use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine};
use chacha20poly1305::aead::{AeadCore, AeadInPlace, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce, Tag};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::{Zeroize, Zeroizing};

const TAG_SIZE: usize = 16;
const NONCE_LEN: usize = 12;
const DERIVED_KEY_LEN: usize = 32;
const SALT_LEN: usize = 16;

/// Argon2id cost: 19 MiB, 3 passes, 1 lane.
const MEMORY_COST_KIB: u32 = 19 * 1024;
const TIME_COST: u32 = 3;
const PARALLELISM: u32 = 1;

#[derive(Debug, Error)]
pub enum WrapError {
    #[error("argon2 derivation failed: {0}")]
    DerivationFailed(String),
    #[error("key wrapping failed: {0}")]
    WrapFailed(String),
    #[error("key unwrapping failed; wrong passphrase or corrupted key file")]
    UnwrapFailed,
    #[error("base64 decoding failed: {0}")]
    Base64DecodeFailed(String),
}

/// On-disk envelope for a wrapped private key. Fields are unpadded base64.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WrappedKey {
    pub salt: String,
    pub nonce: String,
    pub ciphertext: String,
    pub tag: String,
}

/// Symmetric key derived from a passphrase and a per-file salt.
pub struct KeyWrap {
    key: Key,
}

impl KeyWrap {
    pub fn derive_from_passphrase(passphrase: &str, salt: &[u8]) -> Result<Self, WrapError> {
        let params = Params::new(MEMORY_COST_KIB, TIME_COST, PARALLELISM, Some(DERIVED_KEY_LEN))
            .map_err(|e| WrapError::DerivationFailed(format!("{e}")))?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let mut output = [0u8; DERIVED_KEY_LEN];
        argon2
            .hash_password_into(passphrase.as_bytes(), salt, &mut output)
            .map_err(|e| WrapError::DerivationFailed(format!("{e}")))?;

        let mut key = Key::default();
        key.copy_from_slice(&output);
        output.zeroize();
        Ok(Self { key })
    }

    /// Encrypts in place with a detached tag so the envelope can carry the
    /// ciphertext and tag as separate fields.
    fn seal(&self, salt: &[u8], plaintext: &[u8]) -> Result<WrappedKey, WrapError> {
        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
        let mut buffer = Zeroizing::new(plaintext.to_vec());
        let tag = ChaCha20Poly1305::new(&self.key)
            .encrypt_in_place_detached(&nonce, b"", &mut buffer[..])
            .map_err(|e| WrapError::WrapFailed(format!("{e}")))?;

        Ok(WrappedKey {
            salt: STANDARD_NO_PAD.encode(salt),
            nonce: STANDARD_NO_PAD.encode(nonce),
            ciphertext: STANDARD_NO_PAD.encode(&buffer[..]),
            tag: STANDARD_NO_PAD.encode(tag),
        })
    }

    fn open(&self, wrapped: &WrappedKey) -> Result<Vec<u8>, WrapError> {
        let nonce = decode(&wrapped.nonce)?;
        let tag = decode(&wrapped.tag)?;
        if nonce.len() != NONCE_LEN || tag.len() != TAG_SIZE {
            return Err(WrapError::UnwrapFailed);
        }

        let mut buffer = decode(&wrapped.ciphertext)?;
        ChaCha20Poly1305::new(&self.key)
            .decrypt_in_place_detached(
                Nonce::from_slice(&nonce),
                b"",
                &mut buffer,
                Tag::from_slice(&tag),
            )
            .map_err(|_| WrapError::UnwrapFailed)?;
        Ok(buffer)
    }
}

impl Drop for KeyWrap {
    fn drop(&mut self) {
        self.key.as_mut_slice().zeroize();
    }
}

fn decode(field: &str) -> Result<Vec<u8>, WrapError> {
    STANDARD_NO_PAD
        .decode(field.as_bytes())
        .map_err(|e| WrapError::Base64DecodeFailed(format!("{e}")))
}

/// Wraps a private key hex string under `passphrase` with a fresh random salt.
pub fn wrap_private_key(passphrase: &str, private_hex: &str) -> Result<WrappedKey, WrapError> {
    let mut salt = [0u8; SALT_LEN];
    OsRng
        .try_fill_bytes(&mut salt)
        .map_err(|e| WrapError::WrapFailed(format!("{e}")))?;
    KeyWrap::derive_from_passphrase(passphrase, &salt)?.seal(&salt, private_hex.as_bytes())
}

/// Recovers the private key hex string from a wrapped envelope.
pub fn unwrap_private_key(passphrase: &str, wrapped: &WrappedKey) -> Result<String, WrapError> {
    let salt = decode(&wrapped.salt)?;
    let plaintext = KeyWrap::derive_from_passphrase(passphrase, &salt)?.open(wrapped)?;
    String::from_utf8(plaintext).map_err(|e| {
        let mut bytes = e.into_bytes();
        bytes.zeroize();
        WrapError::UnwrapFailed
    })
}
