//! Post identity helpers.

use uuid::Uuid;

/// Alphabet for post identifiers; 64 symbols so each random byte maps by masking.
const POST_ID_ALPHABET: &[u8; 64] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789_-";

pub const POST_ID_LEN: usize = 10;

const UUID_VERSION_BYTE: usize = 6;

/// Generate a short random post identifier.
///
/// Uniqueness is not guaranteed here; stores reject collisions and callers
/// retry with a fresh id.
pub fn generate_post_id() -> String {
    let random = Uuid::new_v4().into_bytes();
    random
        .iter()
        .enumerate()
        // byte 6 carries the uuid version in the bits kept by the mask
        .filter(|(index, _)| *index != UUID_VERSION_BYTE)
        .map(|(_, byte)| byte)
        .take(POST_ID_LEN)
        .map(|byte| char::from(POST_ID_ALPHABET[usize::from(byte & 0x3f)]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_use_the_short_alphabet() {
        for _ in 0..64 {
            let id = generate_post_id();
            assert_eq!(id.len(), POST_ID_LEN);
            assert!(id.bytes().all(|b| POST_ID_ALPHABET.contains(&b)));
        }
    }

    #[test]
    fn ids_differ_between_calls() {
        let ids: std::collections::HashSet<String> = (0..32).map(|_| generate_post_id()).collect();
        assert!(ids.len() > 1);
    }
}
