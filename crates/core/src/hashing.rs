//! Content-addressing utilities for the dedup store.
//!
//! Uploaded source video is addressed by the SHA-256 of its full byte
//! content; the storage path is derived from the digest so byte-identical
//! uploads always land on (and are found at) the same path.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

/// Compute a SHA-256 hex digest of the given bytes.
pub fn sha256_hex(data: &[u8]) -> String {
    let hash = Sha256::digest(data);
    format!("{hash:x}")
}

/// Derive the storage path for a content hash under `root`.
///
/// Uses a two-level fan-out (`ab/cd/abcd...`) so a large store never piles
/// every object into one directory.
pub fn content_path(root: &Path, hash: &str, extension: &str) -> PathBuf {
    debug_assert!(hash.len() >= 4, "content hash too short: {hash}");
    root.join(&hash[0..2])
        .join(&hash[2..4])
        .join(format!("{hash}.{extension}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_produces_known_digest() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn identical_bytes_hash_identically() {
        let data = b"full game recording";
        assert_eq!(sha256_hex(data), sha256_hex(data));
        assert_eq!(sha256_hex(data).len(), 64);
    }

    #[test]
    fn content_path_fans_out_on_digest_prefix() {
        let hash = sha256_hex(b"x");
        let path = content_path(Path::new("/var/lib/matchcut"), &hash, "mp4");
        let s = path.to_string_lossy();
        assert!(s.starts_with(&format!("/var/lib/matchcut/{}/{}/", &hash[0..2], &hash[2..4])));
        assert!(s.ends_with(&format!("{hash}.mp4")));
    }

    #[test]
    fn same_content_always_maps_to_same_path() {
        let root = Path::new("/store");
        let a = content_path(root, &sha256_hex(b"abc"), "mp4");
        let b = content_path(root, &sha256_hex(b"abc"), "mp4");
        assert_eq!(a, b);
    }
}
