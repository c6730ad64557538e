//! SHA-256 blob checksums in the `sha256:<hex>` wire format.

use sha2::{Digest, Sha256};

use crate::constants::CHECKSUM_PREFIX;

/// Lowercase hex SHA-256 digest of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Checksum string as carried by `blob_end`.
pub fn format_checksum(data: &[u8]) -> String {
    format!("{}{}", CHECKSUM_PREFIX, sha256_hex(data))
}

/// The digest portion of a checksum string. Strings without the
/// `sha256:` prefix are taken as a bare digest.
pub fn digest_part(checksum: &str) -> &str {
    checksum
        .trim()
        .strip_prefix(CHECKSUM_PREFIX)
        .unwrap_or_else(|| checksum.trim())
}

/// Case-insensitive comparison of a supplied checksum against a computed
/// hex digest.
pub fn digest_matches(checksum: &str, actual_hex: &str) -> bool {
    digest_part(checksum).eq_ignore_ascii_case(actual_hex)
}
