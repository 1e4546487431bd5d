//! Deterministic identifier generation
//!
//! Playlist lines carry no stable id of their own, so one is derived from the
//! stream URI and display name. The same line always yields the same id, which
//! keeps overrides and exported files attached across re-parses.

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Generate a deterministic UUID from an ordered list of inputs.
///
/// Inputs are joined with `|` before hashing so `("ab", "c")` and
/// `("a", "bc")` do not collide.
pub fn generate_deterministic_uuid(inputs: &[&str]) -> Uuid {
    let mut hasher = Sha256::new();
    for (index, input) in inputs.iter().enumerate() {
        if index > 0 {
            hasher.update(b"|");
        }
        hasher.update(input.as_bytes());
    }
    let digest = hasher.finalize();

    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes)
}

/// Id for an entry parsed from playlist text
pub fn playlist_entry_id(stream_uri: &str, display_name: &str) -> String {
    generate_deterministic_uuid(&[stream_uri, display_name]).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_inputs_same_id() {
        let a = playlist_entry_id("http://example.com/1.ts", "News One HD");
        let b = playlist_entry_id("http://example.com/1.ts", "News One HD");
        assert_eq!(a, b);
        assert!(Uuid::parse_str(&a).is_ok());
    }

    #[test]
    fn test_different_inputs_different_ids() {
        let a = playlist_entry_id("http://example.com/1.ts", "News One HD");
        let b = playlist_entry_id("http://example.com/1.ts", "News One SD");
        let c = playlist_entry_id("http://example.com/2.ts", "News One HD");
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_separator_prevents_concatenation_collisions() {
        assert_ne!(
            generate_deterministic_uuid(&["ab", "c"]),
            generate_deterministic_uuid(&["a", "bc"])
        );
    }
}
