//! The `EJ[1:<ephemeral pk>:<nonce>:<box>]` value codec.
//!
//! Each value is sealed with a NaCl-compatible box (X25519 + XSalsa20 +
//! Poly1305, MAC in front of the ciphertext) between a fresh ephemeral key pair
//! and the document's recipient key. The three binary fields are standard
//! padded base64 so the result can sit inside any JSON string.

use std::fmt;
use std::str::FromStr;

use base64::{engine::general_purpose::STANDARD, Engine};
use crypto_box::aead::{Aead, Nonce};
use crypto_box::SalsaBox;
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::{Zeroize, Zeroizing};

use super::keys::{decode_key, public_key, secret_key, KEY_SIZE};
use super::{ensure_initialized, CodecError};

pub const PREFIX: &str = "EJ[";
pub const VERSION: &str = "1";
pub const NONCE_SIZE: usize = 24;
pub const TAG_SIZE: usize = 16;

/// A parsed encrypted value. Never mutated once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedValue {
    pub ephemeral_public: [u8; KEY_SIZE],
    pub nonce: [u8; NONCE_SIZE],
    /// Poly1305 tag followed by the XSalsa20 ciphertext.
    pub boxed: Vec<u8>,
}

impl fmt::Display for EncryptedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{PREFIX}{VERSION}:{}:{}:{}]",
            STANDARD.encode(self.ephemeral_public),
            STANDARD.encode(self.nonce),
            STANDARD.encode(&self.boxed)
        )
    }
}

impl FromStr for EncryptedValue {
    type Err = CodecError;

    fn from_str(wire: &str) -> Result<Self, Self::Err> {
        let inner = wire
            .strip_prefix(PREFIX)
            .and_then(|rest| rest.strip_suffix(']'))
            .ok_or_else(|| {
                CodecError::InvalidEncryptedFormat("missing EJ[...] envelope".to_string())
            })?;

        let fields: Vec<&str> = inner.split(':').collect();
        let [version, ephemeral_b64, nonce_b64, boxed_b64] = fields.as_slice() else {
            return Err(CodecError::InvalidEncryptedFormat(format!(
                "expected 4 fields, found {}",
                fields.len()
            )));
        };
        if *version != VERSION {
            return Err(CodecError::InvalidEncryptedFormat(format!(
                "unsupported version {version:?}"
            )));
        }

        let ephemeral = decode_field(ephemeral_b64)?;
        let nonce = decode_field(nonce_b64)?;
        let boxed = decode_field(boxed_b64)?;

        let ephemeral_public: [u8; KEY_SIZE] = ephemeral.as_slice().try_into().map_err(|_| {
            CodecError::InvalidEncryptedFormat(format!(
                "ephemeral key must be {KEY_SIZE} bytes, got {}",
                ephemeral.len()
            ))
        })?;
        let nonce: [u8; NONCE_SIZE] = nonce.as_slice().try_into().map_err(|_| {
            CodecError::InvalidEncryptedFormat(format!(
                "nonce must be {NONCE_SIZE} bytes, got {}",
                nonce.len()
            ))
        })?;
        if boxed.len() < TAG_SIZE {
            return Err(CodecError::InvalidEncryptedFormat(
                "ciphertext shorter than authentication tag".to_string(),
            ));
        }

        Ok(Self {
            ephemeral_public,
            nonce,
            boxed,
        })
    }
}

fn decode_field(field: &str) -> Result<Vec<u8>, CodecError> {
    STANDARD
        .decode(field.as_bytes())
        .map_err(|e| CodecError::InvalidBase64String(format!("{e}")))
}

/// True when a string already carries the encrypted-value prefix. This is a
/// prefix check only; a plaintext that happens to start with `EJ[` matches too.
pub fn is_encrypted(value: &str) -> bool {
    value.starts_with(PREFIX)
}

/// Seals `plaintext` for the holder of the private key behind
/// `recipient_public_hex`. Every call uses a new ephemeral key pair and nonce,
/// so encrypting the same input twice never yields the same wire string.
pub fn encrypt(plaintext: &str, recipient_public_hex: &str) -> Result<String, CodecError> {
    let recipient = public_key(decode_key(recipient_public_hex)?);
    ensure_initialized()?;

    let mut ephemeral_private = Zeroizing::new([0u8; KEY_SIZE]);
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng
        .try_fill_bytes(&mut ephemeral_private[..])
        .and_then(|_| OsRng.try_fill_bytes(&mut nonce))
        .map_err(|e| CodecError::CryptoInit(format!("{e}")))?;

    let ephemeral_secret = secret_key(*ephemeral_private);
    let ephemeral_public = *ephemeral_secret.public_key().as_bytes();

    let salsa_box = SalsaBox::new(&recipient, &ephemeral_secret);
    let boxed = salsa_box
        .encrypt(Nonce::<SalsaBox>::from_slice(&nonce), plaintext.as_bytes())
        .map_err(|e| CodecError::CryptoInit(format!("box encryption failed: {e}")))?;

    Ok(EncryptedValue {
        ephemeral_public,
        nonce,
        boxed,
    }
    .to_string())
}

/// Opens a wire value with the recipient's private key. Format problems are
/// reported precisely; anything past the format check is `DecryptionFailed`.
pub fn decrypt(wire: &str, recipient_private_hex: &str) -> Result<String, CodecError> {
    let value: EncryptedValue = wire.parse()?;
    let private = Zeroizing::new(decode_key(recipient_private_hex)?);

    let salsa_box = SalsaBox::new(&public_key(value.ephemeral_public), &secret_key(*private));
    let plaintext = salsa_box
        .decrypt(Nonce::<SalsaBox>::from_slice(&value.nonce), value.boxed.as_slice())
        .map_err(|_| CodecError::DecryptionFailed)?;

    String::from_utf8(plaintext).map_err(|e| {
        let mut bytes = e.into_bytes();
        bytes.zeroize();
        CodecError::DecryptionFailed
    })
}
