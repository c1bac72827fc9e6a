//! SHA-256 helpers for artifact hashes and `.sha256` checksum sidecars

use sha2::{Digest, Sha256};

/// Compute the SHA-256 hash of a byte slice, returning a lowercase hex string.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Extract the hex hash from a checksum sidecar.
///
/// Sidecars may contain just the hash, or `hash  filename`.
pub fn parse_checksum_sidecar(content: &str) -> Option<String> {
    content
        .split_whitespace()
        .next()
        .filter(|hash| hash.chars().all(|c| c.is_ascii_hexdigit()))
        .map(str::to_ascii_lowercase)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_of_empty_input() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn sidecar_with_file_name() {
        let parsed = parse_checksum_sidecar("ABCDEF0123  core-1.0.jar\n");
        assert_eq!(parsed.as_deref(), Some("abcdef0123"));
    }

    #[test]
    fn sidecar_garbage_is_rejected() {
        assert_eq!(parse_checksum_sidecar("<html>not found</html>"), None);
        assert_eq!(parse_checksum_sidecar(""), None);
    }
}
