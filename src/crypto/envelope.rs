use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand_core::{OsRng, RngCore};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;

use super::identity::machine_identity;
use super::CryptoError;

// ============================================================================
// Envelope Constants
// ============================================================================

/// Random salt prepended to every envelope.
pub const SALT_LEN: usize = 16;
/// AES-GCM nonce length.
pub const NONCE_LEN: usize = 12;
/// AES-GCM authentication tag length.
pub const TAG_LEN: usize = 16;
/// AES-256 key length.
pub const KEY_LEN: usize = 32;
/// PBKDF2-HMAC-SHA256 iteration count.
pub const PBKDF2_ROUNDS: u32 = 100_000;
/// Smallest decoded envelope: salt + nonce + tag over an empty body.
pub const MIN_ENVELOPE_LEN: usize = SALT_LEN + NONCE_LEN + TAG_LEN;

// ============================================================================
// Key Derivation
// ============================================================================

/// Derives the AES-256 key for `identity` and `salt`.
///
/// Deterministic: decryption re-derives the same key from the salt stored in
/// the envelope, so the key itself is never persisted.
pub fn derive_key(identity: &str, salt: &[u8; SALT_LEN]) -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(identity.as_bytes(), salt, PBKDF2_ROUNDS, &mut key);
    key
}

// ============================================================================
// Cipher
// ============================================================================

/// Encrypts and decrypts envelopes under one machine identity.
///
/// Stateless apart from the identity; safe to share across tasks. The only
/// shared mutable resource is the OS random source, which is thread-safe.
pub struct Cipher {
    identity: SecretString,
}

impl std::fmt::Debug for Cipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cipher")
            .field("identity", &"[REDACTED]")
            .finish()
    }
}

impl Cipher {
    /// Cipher bound to the identity of the running machine.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::IdentityUnavailable`] if the host name cannot be
    /// resolved.
    pub fn for_this_machine() -> Result<Self, CryptoError> {
        Ok(Self {
            identity: machine_identity()?,
        })
    }

    /// Cipher bound to an explicit identity string.
    pub fn with_identity(identity: impl Into<String>) -> Self {
        Self {
            identity: SecretString::from(identity.into()),
        }
    }

    /// Seals `plaintext` into a base64 envelope.
    ///
    /// Empty input yields an empty string so "unset" and "set to empty" stay
    /// distinguishable without a sentinel. Each call draws a fresh salt and a
    /// fresh nonce, so equal plaintexts never produce equal envelopes.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }

        let mut salt = [0u8; SALT_LEN];
        fill_random(&mut salt)?;
        let mut nonce = [0u8; NONCE_LEN];
        fill_random(&mut nonce)?;

        let key = derive_key(self.identity.expose_secret(), &salt);
        let aead = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
        let sealed = aead
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|_| CryptoError::EncryptionFailed)?;

        let mut envelope = Vec::with_capacity(SALT_LEN + NONCE_LEN + sealed.len());
        envelope.extend_from_slice(&salt);
        envelope.extend_from_slice(&nonce);
        envelope.extend_from_slice(&sealed);

        Ok(BASE64.encode(envelope))
    }

    /// Opens an envelope produced by [`Cipher::encrypt`].
    ///
    /// # Errors
    ///
    /// - [`CryptoError::InvalidCiphertext`] if the value is not base64 or is
    ///   shorter than [`MIN_ENVELOPE_LEN`] bytes once decoded
    /// - [`CryptoError::DecryptionFailed`] if authentication fails (wrong
    ///   machine, corruption, tampering) or the body is not UTF-8
    pub fn decrypt(&self, envelope: &str) -> Result<String, CryptoError> {
        if envelope.is_empty() {
            return Ok(String::new());
        }

        let data = BASE64
            .decode(envelope)
            .map_err(|_| CryptoError::InvalidCiphertext)?;
        if data.len() < MIN_ENVELOPE_LEN {
            return Err(CryptoError::InvalidCiphertext);
        }

        let (salt, rest) = data.split_at(SALT_LEN);
        let (nonce, sealed) = rest.split_at(NONCE_LEN);
        let salt: &[u8; SALT_LEN] = salt
            .try_into()
            .map_err(|_| CryptoError::InvalidCiphertext)?;

        let key = derive_key(self.identity.expose_secret(), salt);
        let aead = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
        let plaintext = aead
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| CryptoError::DecryptionFailed)?;

        String::from_utf8(plaintext).map_err(|_| CryptoError::DecryptionFailed)
    }
}

fn fill_random(buf: &mut [u8]) -> Result<(), CryptoError> {
    OsRng
        .try_fill_bytes(buf)
        .map_err(|e| CryptoError::Entropy(e.to_string()))
}

// ============================================================================
// Machine-bound Convenience API
// ============================================================================

/// Encrypts with the running machine's identity.
///
/// Empty input short-circuits before the identity is resolved.
pub fn encrypt(plaintext: &str) -> Result<String, CryptoError> {
    if plaintext.is_empty() {
        return Ok(String::new());
    }
    Cipher::for_this_machine()?.encrypt(plaintext)
}

/// Decrypts with the running machine's identity.
pub fn decrypt(envelope: &str) -> Result<String, CryptoError> {
    if envelope.is_empty() {
        return Ok(String::new());
    }
    Cipher::for_this_machine()?.decrypt(envelope)
}

/// Heuristic: valid base64 that decodes to at least [`MIN_ENVELOPE_LEN`] bytes.
///
/// Any long enough base64 blob passes, so this only serves migrations of
/// known legacy-plaintext fields. It is not a security check.
pub fn is_encrypted(value: &str) -> bool {
    if value.is_empty() {
        return false;
    }
    BASE64
        .decode(value)
        .is_ok_and(|data| data.len() >= MIN_ENVELOPE_LEN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const HOST_A: &str = "alpha-linux-x86_64";
    const HOST_B: &str = "bravo-linux-x86_64";

    fn flip_byte(envelope: &str, index: usize) -> String {
        let mut data = BASE64.decode(envelope).unwrap();
        data[index] ^= 0x01;
        BASE64.encode(data)
    }

    #[test]
    fn test_round_trip() {
        let cipher = Cipher::with_identity(HOST_A);
        let sealed = cipher.encrypt("translation-api-key").unwrap();
        assert_eq!(cipher.decrypt(&sealed).unwrap(), "translation-api-key");
    }

    #[test]
    fn test_round_trip_unicode() {
        let cipher = Cipher::with_identity(HOST_A);
        let sealed = cipher.encrypt("clé secrète 鍵 🔑").unwrap();
        assert_eq!(cipher.decrypt(&sealed).unwrap(), "clé secrète 鍵 🔑");
    }

    #[test]
    fn test_same_plaintext_different_envelopes() {
        let cipher = Cipher::with_identity(HOST_A);
        let first = cipher.encrypt("same").unwrap();
        let second = cipher.encrypt("same").unwrap();
        assert_ne!(first, second);
        assert_eq!(cipher.decrypt(&first).unwrap(), "same");
        assert_eq!(cipher.decrypt(&second).unwrap(), "same");
    }

    #[test]
    fn test_envelope_layout_length() {
        let cipher = Cipher::with_identity(HOST_A);
        let sealed = cipher.encrypt("abc").unwrap();
        let data = BASE64.decode(&sealed).unwrap();
        assert_eq!(data.len(), SALT_LEN + NONCE_LEN + 3 + TAG_LEN);
    }

    #[test]
    fn test_empty_input_is_identity() {
        let cipher = Cipher::with_identity(HOST_A);
        assert_eq!(cipher.encrypt("").unwrap(), "");
        assert_eq!(cipher.decrypt("").unwrap(), "");
        assert_eq!(encrypt("").unwrap(), "");
        assert_eq!(decrypt("").unwrap(), "");
    }

    #[test]
    fn test_tampered_ciphertext_region_fails() {
        let cipher = Cipher::with_identity(HOST_A);
        let sealed = cipher.encrypt("hi").unwrap();
        let len = BASE64.decode(&sealed).unwrap().len();

        for index in SALT_LEN + NONCE_LEN..len {
            let tampered = flip_byte(&sealed, index);
            assert!(
                matches!(cipher.decrypt(&tampered), Err(CryptoError::DecryptionFailed)),
                "flipping byte {} should fail authentication",
                index
            );
        }
    }

    #[test]
    fn test_tampered_salt_and_nonce_fail() {
        let cipher = Cipher::with_identity(HOST_A);
        let sealed = cipher.encrypt("hi").unwrap();

        let bad_salt = flip_byte(&sealed, 0);
        assert!(matches!(
            cipher.decrypt(&bad_salt),
            Err(CryptoError::DecryptionFailed)
        ));

        let bad_nonce = flip_byte(&sealed, SALT_LEN);
        assert!(matches!(
            cipher.decrypt(&bad_nonce),
            Err(CryptoError::DecryptionFailed)
        ));
    }

    #[test]
    fn test_cross_machine_fails() {
        let sealed = Cipher::with_identity(HOST_A).encrypt("secret").unwrap();
        let result = Cipher::with_identity(HOST_B).decrypt(&sealed);
        assert!(matches!(result, Err(CryptoError::DecryptionFailed)));
    }

    #[test]
    fn test_invalid_base64_is_invalid_ciphertext() {
        let cipher = Cipher::with_identity(HOST_A);
        let result = cipher.decrypt("not base64 at all!");
        assert!(matches!(result, Err(CryptoError::InvalidCiphertext)));
    }

    #[test]
    fn test_truncated_envelope_is_invalid_ciphertext() {
        let cipher = Cipher::with_identity(HOST_A);
        let short = BASE64.encode([0u8; MIN_ENVELOPE_LEN - 1]);
        assert!(matches!(
            cipher.decrypt(&short),
            Err(CryptoError::InvalidCiphertext)
        ));
    }

    #[test]
    fn test_minimum_length_garbage_fails_authentication() {
        let cipher = Cipher::with_identity(HOST_A);
        let garbage = BASE64.encode([7u8; MIN_ENVELOPE_LEN]);
        assert!(matches!(
            cipher.decrypt(&garbage),
            Err(CryptoError::DecryptionFailed)
        ));
    }

    #[test]
    fn test_derive_key_deterministic() {
        let salt = [3u8; SALT_LEN];
        assert_eq!(derive_key(HOST_A, &salt), derive_key(HOST_A, &salt));
    }

    #[test]
    fn test_derive_key_depends_on_salt_and_identity() {
        let salt_a = [3u8; SALT_LEN];
        let salt_b = [4u8; SALT_LEN];
        assert_ne!(derive_key(HOST_A, &salt_a), derive_key(HOST_A, &salt_b));
        assert_ne!(derive_key(HOST_A, &salt_a), derive_key(HOST_B, &salt_a));
    }

    #[test]
    fn test_machine_bound_round_trip() {
        let sealed = encrypt("machine-bound").unwrap();
        assert!(is_encrypted(&sealed));
        assert_eq!(decrypt(&sealed).unwrap(), "machine-bound");
    }

    #[test]
    fn test_is_encrypted_heuristic() {
        assert!(!is_encrypted(""));
        assert!(!is_encrypted("plain text value"));
        assert!(!is_encrypted(&BASE64.encode([1u8; MIN_ENVELOPE_LEN - 1])));
        // Any long enough base64 blob is a false positive by construction
        assert!(is_encrypted(&BASE64.encode([1u8; MIN_ENVELOPE_LEN])));

        let sealed = Cipher::with_identity(HOST_A).encrypt("x").unwrap();
        assert!(is_encrypted(&sealed));
    }

    #[test]
    fn test_debug_redacts_identity() {
        let cipher = Cipher::with_identity(HOST_A);
        let debug_output = format!("{:?}", cipher);
        assert!(!debug_output.contains("alpha"));
        assert!(debug_output.contains("[REDACTED]"));
    }

    proptest! {
        // Key derivation is deliberately slow; keep the case count small.
        #![proptest_config(ProptestConfig::with_cases(8))]

        #[test]
        fn prop_round_trip(plaintext in ".{1,64}") {
            let cipher = Cipher::with_identity(HOST_A);
            let sealed = cipher.encrypt(&plaintext).unwrap();
            prop_assert_eq!(cipher.decrypt(&sealed).unwrap(), plaintext);
        }
    }
}
