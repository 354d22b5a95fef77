//! Configured encryption keys.
//!
//! Keys come from configuration as `{id, alias, key}` triples with the key
//! material in base64. They are decoded and length-checked once, when the
//! [`KeyRing`] is built, so a bad entry fails at startup instead of on the
//! first SecureString write.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;

use crate::crypto::EncryptionKey;
use crate::error::CryptoError;

const ALIAS_PREFIX: &str = "alias/";
const KMS_ARN_PREFIX: &str = "arn:aws:kms:";

/// One key entry as it appears in configuration.
#[derive(Clone, Deserialize)]
pub struct KeyConfig {
    /// Key id, e.g. `c2f9a2b0-...`.
    pub id: String,
    /// Alias without the `alias/` prefix.
    pub alias: String,
    /// Base64-encoded 32-byte key material.
    pub key: String,
}

impl std::fmt::Debug for KeyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyConfig")
            .field("id", &self.id)
            .field("alias", &self.alias)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// A decoded key with its identifiers.
#[derive(Debug, Clone)]
pub struct KeyEntry {
    id: String,
    alias: String,
    key: EncryptionKey,
}

impl KeyEntry {
    /// Key id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Alias without the `alias/` prefix.
    #[must_use]
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// The `alias/<alias>` reference for this key.
    #[must_use]
    pub fn alias_ref(&self) -> String {
        format!("{ALIAS_PREFIX}{}", self.alias)
    }

    /// Key material.
    #[must_use]
    pub fn key(&self) -> &EncryptionKey {
        &self.key
    }
}

/// Ordered set of usable keys. The first key is the default.
#[derive(Debug, Clone, Default)]
pub struct KeyRing {
    entries: Vec<KeyEntry>,
}

impl KeyRing {
    /// Decode every configured key.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKeyMaterial`] naming the first entry
    /// whose key is not base64 or not 32 bytes long.
    pub fn from_config(configs: &[KeyConfig]) -> Result<Self, CryptoError> {
        let entries = configs
            .iter()
            .map(|c| {
                let raw = BASE64.decode(c.key.trim()).map_err(|e| CryptoError::InvalidKeyMaterial {
                    key_id: c.id.clone(),
                    reason: e.to_string(),
                })?;
                Ok(KeyEntry {
                    id: c.id.clone(),
                    alias: c.alias.clone(),
                    key: EncryptionKey::from_slice(&c.id, &raw)?,
                })
            })
            .collect::<Result<Vec<_>, CryptoError>>()?;
        Ok(Self { entries })
    }

    /// Build a ring from already-decoded keys.
    #[must_use]
    pub fn from_keys(keys: impl IntoIterator<Item = (String, String, EncryptionKey)>) -> Self {
        Self {
            entries: keys
                .into_iter()
                .map(|(id, alias, key)| KeyEntry { id, alias, key })
                .collect(),
        }
    }

    /// Look up a key by `alias/<name>`, raw id, or KMS key ARN.
    ///
    /// The region and account inside an ARN are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::UnknownKey`] if nothing matches or the ARN is
    /// malformed.
    pub fn resolve(&self, reference: &str) -> Result<&KeyEntry, CryptoError> {
        let unknown = || CryptoError::UnknownKey {
            key_id: reference.to_owned(),
        };

        let wanted = if reference.starts_with(KMS_ARN_PREFIX) {
            let pieces: Vec<&str> = reference.split(':').collect();
            match pieces.as_slice() {
                [_, _, _, _, _, resource] => resource.strip_prefix("key/").unwrap_or(*resource),
                _ => return Err(unknown()),
            }
        } else {
            reference
        };

        self.entries
            .iter()
            .find(|e| wanted.strip_prefix(ALIAS_PREFIX) == Some(e.alias.as_str()) || e.id == wanted)
            .ok_or_else(unknown)
    }

    /// The first configured key, used when a caller names none.
    #[must_use]
    pub fn default_key(&self) -> Option<&KeyEntry> {
        self.entries.first()
    }

    /// Number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no keys are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate keys in configuration order.
    pub fn iter(&self) -> impl Iterator<Item = &KeyEntry> {
        self.entries.iter()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn ring() -> KeyRing {
        KeyRing::from_config(&[
            KeyConfig {
                id: "1234abcd-0000".to_owned(),
                alias: "fern".to_owned(),
                key: BASE64.encode([1u8; 32]),
            },
            KeyConfig {
                id: "5678efgh-0000".to_owned(),
                alias: "other".to_owned(),
                key: BASE64.encode([2u8; 32]),
            },
        ])
        .unwrap()
    }

    #[test]
    fn resolves_alias_id_and_arn() {
        let ring = ring();
        assert_eq!(ring.resolve("alias/fern").unwrap().id(), "1234abcd-0000");
        assert_eq!(ring.resolve("5678efgh-0000").unwrap().alias(), "other");
        assert_eq!(
            ring.resolve("arn:aws:kms:eu-west-1:111122223333:key/5678efgh-0000")
                .unwrap()
                .alias(),
            "other"
        );
        assert_eq!(
            ring.resolve("arn:aws:kms:us-east-1:000000000000:alias/fern")
                .unwrap()
                .id(),
            "1234abcd-0000"
        );
    }

    #[test]
    fn unknown_and_malformed_references_fail() {
        let ring = ring();
        assert!(matches!(ring.resolve("alias/missing"), Err(CryptoError::UnknownKey { .. })));
        assert!(matches!(ring.resolve("fern"), Err(CryptoError::UnknownKey { .. })));
        assert!(matches!(ring.resolve("arn:aws:kms:short"), Err(CryptoError::UnknownKey { .. })));
    }

    #[test]
    fn default_key_is_first_entry() {
        assert_eq!(ring().default_key().unwrap().alias_ref(), "alias/fern");
        assert!(KeyRing::default().default_key().is_none());
    }

    #[test]
    fn bad_material_names_the_key() {
        let err = KeyRing::from_config(&[KeyConfig {
            id: "short".to_owned(),
            alias: "s".to_owned(),
            key: BASE64.encode([0u8; 16]),
        }])
        .unwrap_err();
        assert!(matches!(err, CryptoError::InvalidKeyMaterial { ref key_id, .. } if key_id == "short"));

        assert!(KeyRing::from_config(&[KeyConfig {
            id: "junk".to_owned(),
            alias: "j".to_owned(),
            key: "!!!".to_owned(),
        }])
        .is_err());
    }
}
