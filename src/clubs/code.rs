use chrono::{DateTime, Utc};
use ring::digest;

/// Length of a club invite code: 5 digest bytes = 40 bits = 8 base32 chars.
pub const CODE_LEN: usize = 8;

const DIGEST_BYTES: usize = 5;
const BASE32_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// Derive an invite code from the club's creation instant.
///
/// SHA-256 over the nanosecond timestamp, first 5 bytes, RFC 4648 base32
/// without padding. `attempt` salts the input when a previous code collided.
pub fn generate_code(created_at: DateTime<Utc>, attempt: u32) -> String {
    let nanos = created_at
        .timestamp_nanos_opt()
        .unwrap_or_else(|| created_at.timestamp_micros());
    let payload = if attempt == 0 {
        nanos.to_string()
    } else {
        format!("{nanos}:{attempt}")
    };

    let hash = digest::digest(&digest::SHA256, payload.as_bytes());
    encode_base32(&hash.as_ref()[..DIGEST_BYTES])
}

/// Base32-encode exactly 5 bytes into 8 characters.
fn encode_base32(bytes: &[u8]) -> String {
    let bits = bytes
        .iter()
        .take(DIGEST_BYTES)
        .fold(0u64, |acc, b| (acc << 8) | u64::from(*b));

    (0..CODE_LEN)
        .map(|i| {
            let shift = 5 * (CODE_LEN - 1 - i);
            BASE32_ALPHABET[((bits >> shift) & 0x1f) as usize] as char
        })
        .collect()
}

/// Normalise a user-supplied code for lookup.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}
