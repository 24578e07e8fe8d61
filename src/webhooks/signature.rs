//! `X-Hub-Signature-256` verification.
//!
//! GitHub signs every delivery with HMAC-SHA256 over the raw request body and
//! sends `sha256=<hex>`. Verification must run on the bytes as received; a
//! decoded-then-reencoded body does not produce the same digest.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the delivery signature.
pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

const SCHEME: &str = "sha256=";

/// Hex length of a SHA-256 digest.
const DIGEST_HEX_LEN: usize = 64;

fn keyed(secret: &[u8]) -> HmacSha256 {
    // HMAC hashes over-long keys and zero-pads short ones; no length is invalid.
    HmacSha256::new_from_slice(secret).expect("hmac accepts keys of every length")
}

/// The header value GitHub sends for `raw_body` signed with `secret`.
pub fn signature_header(raw_body: &[u8], secret: &[u8]) -> String {
    let digest = keyed(secret).chain_update(raw_body).finalize().into_bytes();
    format!("{}{}", SCHEME, hex::encode(digest))
}

/// Digest bytes of a header in canonical form: the `sha256=` scheme followed
/// by exactly 64 lowercase hex digits. Anything else maps to `None`, which
/// keeps every distinct header string tied to a distinct digest.
fn canonical_digest(header: &str) -> Option<Vec<u8>> {
    let digits = header.strip_prefix(SCHEME)?;
    let canonical = digits.len() == DIGEST_HEX_LEN
        && digits
            .bytes()
            .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
    if !canonical {
        return None;
    }
    hex::decode(digits).ok()
}

/// Checks `header` against the HMAC of `raw_body` under `secret`.
///
/// Never panics. An absent, non-canonical or mismatched header yields
/// `false`. The digest comparison is constant-time (`Mac::verify_slice`).
///
/// ```
/// use preview_app::webhooks::signature::{signature_header, verify};
///
/// let body = br#"{"action":"opened"}"#;
/// let header = signature_header(body, b"secret");
///
/// assert!(verify(body, Some(&header), b"secret"));
/// assert!(!verify(body, Some(&header), b"other"));
/// assert!(!verify(body, Some(&header.to_uppercase()), b"secret"));
/// assert!(!verify(body, None, b"secret"));
/// ```
pub fn verify(raw_body: &[u8], header: Option<&str>, secret: &[u8]) -> bool {
    let Some(provided) = header.and_then(canonical_digest) else {
        return false;
    };
    keyed(secret)
        .chain_update(raw_body)
        .verify_slice(&provided)
        .is_ok()
}
