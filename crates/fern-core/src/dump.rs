//! Key dump for inspecting a store.

use std::io::Write;

use fern_storage::StorageBackend;
use tracing::debug;

use crate::error::DumpError;

/// Write every live key in `store`, one per line in key order, and return
/// how many were written.
///
/// # Errors
///
/// Returns [`DumpError::Storage`] if the scan fails and [`DumpError::Io`] if
/// writing fails.
pub async fn dump_keys<W>(store: &dyn StorageBackend, out: &mut W) -> Result<usize, DumpError>
where
    W: Write + Send + ?Sized,
{
    let keys = store.list("").await?;
    for key in &keys {
        writeln!(out, "{key}")?;
    }
    out.flush()?;
    debug!(count = keys.len(), "keys dumped");
    Ok(keys.len())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use fern_storage::{MemoryBackend, PutEntry};

    use super::*;

    #[tokio::test]
    async fn dumps_live_keys_in_order() {
        let store = MemoryBackend::new();
        store
            .put_all(vec![
                PutEntry::new("/b", b"2".to_vec()),
                PutEntry::new("/a", b"1".to_vec()),
                PutEntry::new("/gone", b"x".to_vec()).with_ttl(Duration::ZERO),
            ])
            .await
            .unwrap();

        let mut out = Vec::new();
        let n = dump_keys(&store, &mut out).await.unwrap();
        assert_eq!(n, 2);
        assert_eq!(String::from_utf8(out).unwrap(), "/a\n/b\n");
    }
}
