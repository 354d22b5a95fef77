//! Cursor pagination over prefix scans.
//!
//! The storage engine only offers ordered prefix iteration, so every listing
//! materializes its candidates, sorts them by a total order, finds the first
//! entry at or after the cursor, and takes `limit` entries. The sort key of
//! the first excluded entry becomes the next cursor. Resuming from that cursor
//! yields every entry exactly once as long as the order is total.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

/// One page of results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T, C> {
    /// Entries on this page, in order.
    pub items: Vec<T>,
    /// Sort key of the first entry past this page, if any.
    pub next: Option<C>,
}

impl<T, C> Page<T, C> {
    /// Whether more entries follow this page.
    #[must_use]
    pub fn is_truncated(&self) -> bool {
        self.next.is_some()
    }
}

/// Apply the default to a missing or zero limit and cap it at `max`.
#[must_use]
pub fn normalize_limit(limit: Option<usize>, default: usize, max: usize) -> usize {
    match limit {
        None | Some(0) => default.min(max),
        Some(n) => n.min(max),
    }
}

/// Sort `items` by `sort_key`, skip to `start`, and cut one page.
///
/// `start` is inclusive: the first returned entry is the first whose key is
/// `>= start`.
pub fn paginate<T, C, F>(mut items: Vec<T>, sort_key: F, start: Option<&C>, limit: usize) -> Page<T, C>
where
    C: Ord,
    F: Fn(&T) -> C,
{
    items.sort_by(|a, b| sort_key(a).cmp(&sort_key(b)));

    let from = start.map_or(0, |cursor| items.partition_point(|item| sort_key(item) < *cursor));
    let mut page = items.split_off(from);
    let next = page.get(limit).map(&sort_key);
    page.truncate(limit);

    Page { items: page, next }
}

/// Encode a storage key as an opaque continuation token.
#[must_use]
pub fn encode_token(key: &str) -> String {
    BASE64.encode(key)
}

/// Decode a continuation token back into a storage key.
///
/// Returns `None` for anything [`encode_token`] could not have produced.
#[must_use]
pub fn decode_token(token: &str) -> Option<String> {
    BASE64
        .decode(token)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn walk(items: &[u32], limit: usize) -> Vec<u32> {
        let mut out = Vec::new();
        let mut cursor = None;
        loop {
            let page = paginate(items.to_vec(), |n| *n, cursor.as_ref(), limit);
            out.extend(page.items);
            match page.next {
                Some(next) => cursor = Some(next),
                None => return out,
            }
        }
    }

    #[test]
    fn limit_defaults_and_caps() {
        assert_eq!(normalize_limit(None, 100, 100), 100);
        assert_eq!(normalize_limit(Some(0), 50, 50), 50);
        assert_eq!(normalize_limit(Some(7), 50, 50), 7);
        assert_eq!(normalize_limit(Some(500), 10, 10), 10);
    }

    #[test]
    fn boundary_sizes_walk_completely() {
        for len in [0usize, 1, 3, 4] {
            let items: Vec<u32> = (0..u32::try_from(len).unwrap()).rev().collect();
            let mut expected = items.clone();
            expected.sort_unstable();
            assert_eq!(walk(&items, 3), expected, "len {len}");
        }
    }

    #[test]
    fn exact_fit_has_no_next() {
        let page = paginate(vec![3, 1, 2], |n| *n, None, 3);
        assert_eq!(page.items, vec![1, 2, 3]);
        assert!(!page.is_truncated());
    }

    #[test]
    fn cursor_is_inclusive() {
        let page = paginate(vec![10, 20, 30, 40], |n| *n, Some(&20), 2);
        assert_eq!(page.items, vec![20, 30]);
        assert_eq!(page.next, Some(40));

        let page = paginate(vec![10, 20, 30], |n| *n, Some(&25), 5);
        assert_eq!(page.items, vec![30]);
    }

    #[test]
    fn token_roundtrip_and_garbage() {
        let token = encode_token("/app/db/password");
        assert_eq!(decode_token(&token).unwrap(), "/app/db/password");
        assert!(decode_token("not*base64").is_none());
    }

    proptest! {
        #[test]
        fn pages_cover_every_item_once(
            mut items in proptest::collection::btree_set(any::<u32>(), 0..60),
            limit in 1usize..12,
        ) {
            let input: Vec<u32> = std::mem::take(&mut items).into_iter().rev().collect();
            let mut expected = input.clone();
            expected.sort_unstable();
            prop_assert_eq!(walk(&input, limit), expected);
        }
    }
}
