use base64::{Engine as _, engine::general_purpose};
use rand::{rng, Rng};
use sha2::{Digest, Sha256};

use crate::common::config::DEFAULT_SECRET_CHARSET;

/// Shortest secret the broker will mint.
pub const MIN_SECRET_LENGTH: usize = 16;

const HASH_SCHEME: &str = "{SSHA256}";
const SALT_LEN: usize = 4;
const DIGEST_LEN: usize = 32;

#[derive(Debug, Clone)]
pub struct SecretPolicy {
    length: usize,
    charset: Vec<char>,
}

impl SecretPolicy {
    pub fn new(length: usize, charset: &str) -> Self {
        let mut charset: Vec<char> = charset.chars().collect();
        if charset.is_empty() {
            charset = DEFAULT_SECRET_CHARSET.chars().collect();
        }
        Self {
            length: length.max(MIN_SECRET_LENGTH),
            charset,
        }
    }

    pub fn generate(&self) -> String {
        let mut rng = rng();
        (0..self.length)
            .map(|_| self.charset[rng.random_range(0..self.charset.len())])
            .collect()
    }
}

impl Default for SecretPolicy {
    fn default() -> Self {
        Self::new(32, DEFAULT_SECRET_CHARSET)
    }
}

/// Salted SHA-256 in the directory's `{SSHA256}` format.
pub fn hash_secret(secret: &str) -> String {
    let salt: [u8; SALT_LEN] = rand::random();
    format!("{}{}", HASH_SCHEME, general_purpose::STANDARD.encode(salted_digest(secret, &salt)))
}

pub fn verify_secret(secret: &str, hash: &str) -> bool {
    let Some(encoded) = hash.strip_prefix(HASH_SCHEME) else {
        return false;
    };
    let Ok(decoded) = general_purpose::STANDARD.decode(encoded) else {
        return false;
    };
    if decoded.len() != DIGEST_LEN + SALT_LEN {
        return false;
    }
    let salt = &decoded[DIGEST_LEN..];
    salted_digest(secret, salt) == decoded
}

// digest || salt
fn salted_digest(secret: &str, salt: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.update(salt);
    let mut out = hasher.finalize().to_vec();
    out.extend_from_slice(salt);
    out
}
