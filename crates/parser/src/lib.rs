pub mod asn;
pub mod fld;
pub mod stopwords;
pub mod version;

use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 of a string. Instance digests are derived from the
/// host exactly once and never change afterwards.
pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_stable() {
        assert_eq!(
            sha256_hex("mastodon.social"),
            sha256_hex("mastodon.social")
        );
        // Well-known vector: sha256 of the empty string.
        assert_eq!(
            sha256_hex(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
