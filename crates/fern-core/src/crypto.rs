//! Envelope encryption for `SecureString` values.
//!
//! A value is sealed with AES-256-GCM under a fresh random nonce and stored
//! as standard base64 of `nonce || ciphertext || tag`. The envelope carries
//! no key reference; the parameter record names the key separately.

use std::fmt;

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;

/// Key length for AES-256-GCM.
pub const KEY_LEN: usize = 32;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Symmetric key material, wiped on drop and redacted in `Debug`.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey([u8; KEY_LEN]);

impl EncryptionKey {
    #[must_use]
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Take key material of unchecked length, as decoded from configuration.
    ///
    /// # Errors
    ///
    /// [`CryptoError::InvalidKeyMaterial`] naming `key_id` unless `bytes`
    /// is exactly [`KEY_LEN`] long.
    pub fn from_slice(key_id: &str, bytes: &[u8]) -> Result<Self, CryptoError> {
        <[u8; KEY_LEN]>::try_from(bytes)
            .map(Self)
            .map_err(|_| CryptoError::InvalidKeyMaterial {
                key_id: key_id.to_owned(),
                reason: format!("key must be {KEY_LEN} bytes, found {}", bytes.len()),
            })
    }

    /// Fresh key material from the OS RNG.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(&self.0.into())
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey(<redacted>)")
    }
}

/// Seal `plaintext` into envelope text.
///
/// # Errors
///
/// [`CryptoError::Encryption`] if the cipher rejects the input.
pub fn seal_text(key: &EncryptionKey, plaintext: &str) -> Result<String, CryptoError> {
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let sealed = key
        .cipher()
        .encrypt(&nonce, plaintext.as_bytes())
        .map_err(|e| CryptoError::Encryption {
            reason: e.to_string(),
        })?;

    let mut blob = nonce.to_vec();
    blob.extend(sealed);
    Ok(BASE64.encode(blob))
}

/// Open envelope text produced by [`seal_text`].
///
/// # Errors
///
/// - [`CryptoError::InvalidEncoding`] for text that is not base64, or a
///   plaintext that is not UTF-8.
/// - [`CryptoError::CiphertextTooShort`] if the blob cannot hold a nonce
///   and a tag.
/// - [`CryptoError::Decryption`] if authentication fails, which is what a
///   wrong key or a tampered envelope produces.
pub fn open_text(key: &EncryptionKey, envelope: &str) -> Result<String, CryptoError> {
    let blob = BASE64
        .decode(envelope)
        .map_err(|e| CryptoError::InvalidEncoding {
            reason: format!("envelope is not base64: {e}"),
        })?;
    let min = NONCE_LEN + TAG_LEN;
    if blob.len() < min {
        return Err(CryptoError::CiphertextTooShort {
            expected: min,
            actual: blob.len(),
        });
    }

    let (nonce, sealed) = blob.split_at(NONCE_LEN);
    let plain = key
        .cipher()
        .decrypt(Nonce::from_slice(nonce), sealed)
        .map_err(|e| CryptoError::Decryption {
            reason: e.to_string(),
        })?;
    String::from_utf8(plain).map_err(|e| CryptoError::InvalidEncoding {
        reason: format!("plaintext is not UTF-8: {e}"),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn envelope_opens_with_the_sealing_key() {
        let key = EncryptionKey::generate();
        let sealed = seal_text(&key, "hunter2").unwrap();
        assert_ne!(sealed, "hunter2");
        assert_eq!(open_text(&key, &sealed).unwrap(), "hunter2");
    }

    #[test]
    fn nonces_are_not_reused() {
        let key = EncryptionKey::generate();
        assert_ne!(seal_text(&key, "v").unwrap(), seal_text(&key, "v").unwrap());
    }

    #[test]
    fn another_key_cannot_open() {
        let sealed = seal_text(&EncryptionKey::from_bytes([1; 32]), "secret").unwrap();
        let err = open_text(&EncryptionKey::from_bytes([2; 32]), &sealed).unwrap_err();
        assert!(matches!(err, CryptoError::Decryption { .. }));
    }

    #[test]
    fn tampering_is_detected() {
        let key = EncryptionKey::generate();
        let mut blob = BASE64.decode(seal_text(&key, "value").unwrap()).unwrap();
        if let Some(last) = blob.last_mut() {
            *last ^= 0x01;
        }
        assert!(matches!(
            open_text(&key, &BASE64.encode(blob)),
            Err(CryptoError::Decryption { .. })
        ));
    }

    #[test]
    fn malformed_envelopes() {
        let key = EncryptionKey::generate();
        assert!(matches!(
            open_text(&key, "%%%not base64"),
            Err(CryptoError::InvalidEncoding { .. })
        ));
        assert!(matches!(
            open_text(&key, &BASE64.encode([0u8; 10])),
            Err(CryptoError::CiphertextTooShort { actual: 10, .. })
        ));
    }

    #[test]
    fn key_length_is_checked() {
        assert!(EncryptionKey::from_slice("k", &[0u8; 31]).is_err());
        assert_eq!(EncryptionKey::from_slice("k", &[9u8; 32]).unwrap().as_bytes(), &[9u8; 32]);
    }

    #[test]
    fn debug_output_hides_material() {
        let dbg = format!("{:?}", EncryptionKey::from_bytes([7u8; 32]));
        assert_eq!(dbg, "EncryptionKey(<redacted>)");
    }
}
