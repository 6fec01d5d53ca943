//! Encrypted JSON. Secrets inside a JSON document are sealed one string at a
//! time for the document's `_public_key`, so the file can live in version
//! control while its structure stays readable and diffable.

pub mod config;
pub mod crypto;
pub mod document;
pub mod keydir;
pub mod transform;

pub use crypto::{decrypt, encrypt, generate_keypair, CodecError, KeyPair};
pub use document::{
    decrypt_file, encrypt_file, extract_public_key, load_document, save_document, DocumentError,
    PrivateKeySource,
};
pub use transform::{decrypt_tree, encrypt_tree, PUBLIC_KEY_FIELD};
