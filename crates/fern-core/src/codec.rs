//! Value codec for stored records.
//!
//! Every domain record is stored as JSON. Keeping the codec in one place means
//! the engines never touch `serde_json` directly and decode failures always
//! name the key that held the bad bytes.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::CodecError;

/// Serialize a record to its stored bytes.
///
/// # Errors
///
/// Returns [`CodecError::Encode`] if serialization fails.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(value).map_err(|e| CodecError::Encode {
        reason: e.to_string(),
    })
}

/// Deserialize the bytes stored at `key`.
///
/// # Errors
///
/// Returns [`CodecError::Decode`] if the bytes are not a valid `T`.
pub fn decode<T: DeserializeOwned>(key: &str, bytes: &[u8]) -> Result<T, CodecError> {
    serde_json::from_slice(bytes).map_err(|e| CodecError::Decode {
        key: key.to_owned(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        version: u64,
    }

    #[test]
    fn decode_reads_what_encode_wrote() {
        let s = Sample {
            name: "/app/key".to_owned(),
            version: 3,
        };
        let bytes = encode(&s).unwrap();
        assert_eq!(decode::<Sample>("/app/key", &bytes).unwrap(), s);
    }

    #[test]
    fn decode_error_names_the_key() {
        let err = decode::<Sample>("/app/broken", b"{not json").unwrap_err();
        assert!(err.to_string().contains("/app/broken"));
    }
}
