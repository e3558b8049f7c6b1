//! Deterministic replacement transforms that need no external call.

use hmac::{Hmac, Mac};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Placeholder for the anonymize action: `[EMAIL_REDACTED]`,
/// `[MEDICAL_RECORD_NUMBER_REDACTED]`, ...
pub fn anonymize_token(pii_type: &str) -> String {
    let mut tag = String::with_capacity(pii_type.len());
    for c in pii_type.chars() {
        if c.is_alphanumeric() {
            tag.extend(c.to_uppercase());
        } else if !tag.is_empty() && !tag.ends_with('_') {
            tag.push('_');
        }
    }
    let tag = tag.trim_end_matches('_');
    if tag.is_empty() {
        "[REDACTED]".to_string()
    } else {
        format!("[{}_REDACTED]", tag)
    }
}

/// Keyed token for the encrypt action: `ENC:` and 16 hex digits.
pub fn encrypt_token(key: &[u8], pii_type: &str, original: &str) -> String {
    let digest = keyed_digest(key, pii_type, original);
    format!("ENC:{}", hex::encode(&digest[..8]))
}

/// Format-preserving rewrite: every ASCII letter and digit is replaced by a
/// pseudo-random one of the same class, everything else is kept.
pub fn rewrite(key: &[u8], pii_type: &str, original: &str) -> String {
    let mut rng = StdRng::from_seed(keyed_digest(key, pii_type, original));
    let rewritten: String = original
        .chars()
        .map(|c| match c {
            '0'..='9' => rng.gen_range(b'0'..=b'9') as char,
            'a'..='z' => rng.gen_range(b'a'..=b'z') as char,
            'A'..='Z' => rng.gen_range(b'A'..=b'Z') as char,
            _ => c,
        })
        .collect();

    if rewritten == original {
        rewritten.chars().map(shift_within_class).collect()
    } else {
        rewritten
    }
}

fn shift_within_class(c: char) -> char {
    match c {
        '9' => '0',
        'z' => 'a',
        'Z' => 'A',
        '0'..='8' | 'a'..='y' | 'A'..='Y' => (c as u8 + 1) as char,
        _ => c,
    }
}

fn keyed_digest(key: &[u8], pii_type: &str, original: &str) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(pii_type.as_bytes());
    mac.update(&[0x1f]);
    mac.update(original.as_bytes());

    let mut out = [0u8; 32];
    out.copy_from_slice(&mac.finalize().into_bytes());
    out
}

/// Shape of a value with the content removed: letters become `A`/`a`,
/// digits become `9`. Used when describing a value to an external service.
pub fn shape_of(original: &str) -> String {
    original
        .chars()
        .map(|c| {
            if c.is_ascii_digit() {
                '9'
            } else if c.is_uppercase() {
                'A'
            } else if c.is_alphabetic() {
                'a'
            } else {
                c
            }
        })
        .collect()
}
