//! Per-key TTL envelope.
//!
//! None of the engines expire individual keys, so every stored value is
//! wrapped as `flag (1 byte) || [expires_at_ms (8 bytes, big-endian)] || payload`.
//! Flag `0` means the entry never expires and the timestamp is omitted;
//! flag `1` means the timestamp follows. Expired entries are treated as absent
//! on every read path and are physically replaced by the next write.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::StorageError;

const FLAG_PERSISTENT: u8 = 0;
const FLAG_EXPIRING: u8 = 1;
const STAMP_LEN: usize = 8;

/// Milliseconds since the Unix epoch according to the system clock.
pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

/// Absolute expiry for a TTL relative to `now`.
pub(crate) fn expiry_for(ttl: Option<Duration>, now: u64) -> Option<u64> {
    ttl.map(|ttl| {
        let ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        now.saturating_add(ms)
    })
}

/// Wrap `payload` with an optional absolute expiry.
pub(crate) fn seal(payload: &[u8], expires_at: Option<u64>) -> Vec<u8> {
    match expires_at {
        None => {
            let mut out = Vec::with_capacity(payload.len().saturating_add(1));
            out.push(FLAG_PERSISTENT);
            out.extend_from_slice(payload);
            out
        }
        Some(at) => {
            let mut out = Vec::with_capacity(payload.len().saturating_add(1 + STAMP_LEN));
            out.push(FLAG_EXPIRING);
            out.extend_from_slice(&at.to_be_bytes());
            out.extend_from_slice(payload);
            out
        }
    }
}

/// Unwrap a stored value, returning `None` if it has expired at `now`.
///
/// # Errors
///
/// Returns [`StorageError::Corrupt`] if the envelope header is malformed.
pub(crate) fn open<'a>(key: &str, raw: &'a [u8], now: u64) -> Result<Option<&'a [u8]>, StorageError> {
    let corrupt = |reason: &str| StorageError::Corrupt {
        key: key.to_owned(),
        reason: reason.to_owned(),
    };

    let (flag, rest) = raw.split_first().ok_or_else(|| corrupt("empty value"))?;
    match *flag {
        FLAG_PERSISTENT => Ok(Some(rest)),
        FLAG_EXPIRING => {
            if rest.len() < STAMP_LEN {
                return Err(corrupt("truncated expiry header"));
            }
            let (stamp, payload) = rest.split_at(STAMP_LEN);
            let mut buf = [0u8; STAMP_LEN];
            buf.copy_from_slice(stamp);
            if u64::from_be_bytes(buf) <= now {
                Ok(None)
            } else {
                Ok(Some(payload))
            }
        }
        other => Err(corrupt(&format!("unknown envelope flag {other}"))),
    }
}

/// Whether a raw stored value is live at `now`.
pub(crate) fn is_live(key: &str, raw: &[u8], now: u64) -> Result<bool, StorageError> {
    Ok(open(key, raw, now)?.is_some())
}
