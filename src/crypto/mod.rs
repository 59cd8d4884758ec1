//! Machine-bound authenticated encryption for values persisted at rest.
//!
//! Keys are never stored. Every envelope carries its own random salt, and the
//! AES-256-GCM key is re-derived from that salt and the local machine identity
//! (host name, OS, architecture) with PBKDF2-HMAC-SHA256. A value encrypted on
//! one machine therefore only decrypts on that machine.
//!
//! # Envelope layout
//!
//! ```text
//! base64( salt[16] || nonce[12] || ciphertext || tag[16] )
//! ```
//!
//! The layout has no version byte; decoding slices fixed-length prefixes.
//! Any future change of algorithm must introduce an explicit leading tag.
//!
//! # Example
//!
//! ```ignore
//! use gleaner::crypto::{decrypt, encrypt};
//!
//! let sealed = encrypt("api-token")?;
//! assert_eq!(decrypt(&sealed)?, "api-token");
//! ```

mod envelope;
mod identity;

use thiserror::Error;

pub use envelope::{
    decrypt, derive_key, encrypt, is_encrypted, Cipher, KEY_LEN, MIN_ENVELOPE_LEN, NONCE_LEN,
    PBKDF2_ROUNDS, SALT_LEN, TAG_LEN,
};
pub use identity::machine_identity;

/// Errors produced by the encryption layer.
///
/// `DecryptionFailed` deliberately covers wrong machine, corruption and
/// tampering alike so the failure carries no forgery oracle.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The host name could not be resolved, so no key can be derived.
    #[error("Machine identity unavailable: {0}")]
    IdentityUnavailable(String),

    /// The value is not a well-formed envelope (bad base64 or too short).
    #[error("Invalid ciphertext")]
    InvalidCiphertext,

    /// AEAD verification failed.
    #[error("Decryption failed")]
    DecryptionFailed,

    /// The AEAD refused to seal the plaintext (length limit exceeded).
    #[error("Encryption failed")]
    EncryptionFailed,

    /// The operating system's secure random source failed.
    #[error("Secure random source unavailable: {0}")]
    Entropy(String),
}
