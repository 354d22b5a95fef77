//! Random identifiers for zones and changes.
//!
//! Ids are uppercase alphanumeric and always start with a letter, the shape
//! Route53 uses (`Z0123ABCDEF...`). Collisions are not detected.

use aes_gcm::aead::OsRng;
use aes_gcm::aead::rand_core::RngCore;

const LETTERS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const ALPHANUMERIC: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Length of generated zone and change ids.
pub const ID_LEN: usize = 14;

fn pick(rng: &mut OsRng, alphabet: &[u8]) -> char {
    let len = u32::try_from(alphabet.len()).unwrap_or(u32::MAX);
    let idx = usize::try_from(rng.next_u32() % len).unwrap_or(0);
    char::from(alphabet.get(idx).copied().unwrap_or(b'Z'))
}

/// Generate a random id of `len` characters.
#[must_use]
pub fn random_id(len: usize) -> String {
    let mut rng = OsRng;
    let mut id = String::with_capacity(len);
    if len > 0 {
        id.push(pick(&mut rng, LETTERS));
    }
    for _ in 1..len {
        id.push(pick(&mut rng, ALPHANUMERIC));
    }
    id
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_have_expected_shape() {
        for _ in 0..50 {
            let id = random_id(ID_LEN);
            assert_eq!(id.len(), ID_LEN);
            assert!(id.starts_with(|c: char| c.is_ascii_uppercase()));
            assert!(id.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
        }
    }

    #[test]
    fn ids_differ() {
        assert_ne!(random_id(ID_LEN), random_id(ID_LEN));
        assert_eq!(random_id(0), "");
    }
}
