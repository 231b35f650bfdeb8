//! Body digests for stored response snapshots.

use sha2::{Digest, Sha256};

/// Compute the SHA-256 digest of a response body, hex encoded.
pub fn compute_body_digest(body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body);
    hex::encode(hasher.finalize())
}
