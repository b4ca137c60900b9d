//! SHA-256 checksum utility for cache-key derivation.

use sha2::{Digest, Sha256};

/// Compute a SHA256 checksum over several parts.
///
/// Each part is length-prefixed so `["ab", "c"]` and `["a", "bc"]` differ.
pub fn compute_checksum_parts<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update((part.len() as u64).to_le_bytes());
        hasher.update(part.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_parts_are_stable() {
        assert_eq!(compute_checksum_parts(["select 1"]), compute_checksum_parts(["select 1"]));
        assert_ne!(compute_checksum_parts(["select 1"]), compute_checksum_parts(["select 2"]));
    }

    #[test]
    fn test_checksum_parts_are_length_prefixed() {
        assert_ne!(
            compute_checksum_parts(["ab", "c"]),
            compute_checksum_parts(["a", "bc"])
        );
    }
}
