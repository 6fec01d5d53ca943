//! Curve25519 key pairs and their hex representation.

use crypto_box::{PublicKey, SecretKey};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::{Zeroize, Zeroizing};

use super::{ensure_initialized, CodecError};

pub const KEY_SIZE: usize = 32;

/// A recipient key pair. Both halves are raw 32-byte Curve25519 keys; the hex
/// forms are what ends up in documents and key files.
pub struct KeyPair {
    public: [u8; KEY_SIZE],
    private: [u8; KEY_SIZE],
}

impl KeyPair {
    /// Rebuilds a key pair from its private half.
    pub fn from_private_bytes(private: [u8; KEY_SIZE]) -> Self {
        let secret = SecretKey::from(private);
        let public = *secret.public_key().as_bytes();
        Self { public, private }
    }

    pub fn public_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.public
    }

    pub fn private_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.private
    }

    pub fn public_hex(&self) -> String {
        encode_key(&self.public)
    }

    pub fn private_hex(&self) -> String {
        encode_key(&self.private)
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public_hex())
            .field("private", &"<redacted>")
            .finish()
    }
}

impl Drop for KeyPair {
    fn drop(&mut self) {
        self.private.zeroize();
    }
}

/// Generates a fresh key pair from the OS random source.
pub fn generate_keypair() -> Result<KeyPair, CodecError> {
    ensure_initialized()?;
    let mut private = Zeroizing::new([0u8; KEY_SIZE]);
    OsRng
        .try_fill_bytes(&mut private[..])
        .map_err(|e| CodecError::CryptoInit(format!("{e}")))?;
    Ok(KeyPair::from_private_bytes(*private))
}

/// Strictly decodes a hex key into exactly 32 bytes. Odd lengths and non-hex
/// characters are `InvalidHexString`; any other length is `InvalidKeyFormat`.
pub fn decode_key(hex_key: &str) -> Result<[u8; KEY_SIZE], CodecError> {
    let decoded = Zeroizing::new(
        hex::decode(hex_key).map_err(|e| CodecError::InvalidHexString(format!("{e}")))?,
    );
    if decoded.len() != KEY_SIZE {
        return Err(CodecError::InvalidKeyFormat(decoded.len()));
    }
    let mut key = [0u8; KEY_SIZE];
    key.copy_from_slice(&decoded);
    Ok(key)
}

/// Lowercase hex, no prefix.
pub fn encode_key(key: &[u8; KEY_SIZE]) -> String {
    hex::encode(key)
}

/// Derives the public key hex that belongs to a private key hex.
pub fn public_key_from_private(private_hex: &str) -> Result<String, CodecError> {
    let private = Zeroizing::new(decode_key(private_hex)?);
    let pair = KeyPair::from_private_bytes(*private);
    Ok(pair.public_hex())
}

pub(crate) fn public_key(bytes: [u8; KEY_SIZE]) -> PublicKey {
    PublicKey::from(bytes)
}

pub(crate) fn secret_key(bytes: [u8; KEY_SIZE]) -> SecretKey {
    SecretKey::from(bytes)
}
