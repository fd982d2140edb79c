//! Password digests and salts.
//!
//! Stored digests are `hex(SHA-256(salt || password))`: 64 lowercase hex
//! characters. Salts are 8 random bytes, hex-encoded to 16 characters. The
//! format is fixed by existing deployments, so no stretching is applied.

use sha2::{Digest, Sha256};

/// Salt byte length before hex encoding (8 bytes = 16 hex chars).
pub const SALT_BYTES: usize = 8;

/// Length of a hex-encoded salt.
pub const SALT_HEX_LEN: usize = SALT_BYTES * 2;

/// Length of a hex-encoded SHA-256 digest.
pub const DIGEST_HEX_LEN: usize = 64;

// Burn the same amount of work when no account matched.
const DUMMY_SALT: &str = "0000000000000000";
const DUMMY_DIGEST: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Hash a password with its salt. Salt is prefixed to the password.
pub fn hash_password(password: &str, salt: &str) -> String {
    let mut hash = Sha256::new();
    hash.update(salt.as_bytes());
    hash.update(password.as_bytes());
    hex::encode(hash.finalize())
}

/// Generate a fresh random salt (hex-encoded).
pub fn generate_salt() -> String {
    let bytes: [u8; SALT_BYTES] = rand::random();
    hex::encode(bytes)
}

/// Constant-time byte comparison to prevent timing attacks.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Hash and compare against a fixed digest, mirroring a real verification.
/// Always `false`: no password hashes to the all-zero digest in practice.
pub(crate) fn dummy_verify(password: &str) -> bool {
    let attempt = hash_password(password, DUMMY_SALT);
    constant_time_eq(DUMMY_DIGEST.as_bytes(), attempt.as_bytes())
}

/// Minimum-length rule applied by interactive callers before a password
/// reaches the credential store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordPolicy {
    pub min_len: usize,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self { min_len: 6 }
    }
}

impl PasswordPolicy {
    pub fn new(min_len: usize) -> Self {
        Self { min_len }
    }

    /// Length is counted in characters, not bytes.
    pub fn check(&self, password: &str) -> Result<(), super::CredentialError> {
        if password.chars().count() < self.min_len {
            return Err(super::CredentialError::WeakPassword {
                min_len: self.min_len,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_matches_known_vector() {
        // sha256("0011223344556677" + "1234")
        let expected = {
            let mut h = Sha256::new();
            h.update(b"00112233445566771234");
            hex::encode(h.finalize())
        };
        assert_eq!(hash_password("1234", "0011223344556677"), expected);
    }

    #[test]
    fn digest_is_fixed_length_lowercase_hex() {
        let digest = hash_password("any password", &generate_salt());
        assert_eq!(digest.len(), DIGEST_HEX_LEN);
        assert!(digest
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn password_hash_is_deterministic_with_same_salt() {
        for password in ["", "1234", "contraseña", "p@ss w0rd!"] {
            let salt = generate_salt();
            assert_eq!(hash_password(password, &salt), hash_password(password, &salt));
        }
    }

    #[test]
    fn dummy_verify_never_matches() {
        for password in ["", "1234", "admin"] {
            assert!(!dummy_verify(password));
        }
        assert_eq!(DUMMY_DIGEST.len(), DIGEST_HEX_LEN);
    }

    #[test]
    fn password_hash_differs_with_different_salt() {
        let h1 = hash_password("test_password", "aaaaaaaaaaaaaaaa");
        let h2 = hash_password("test_password", "bbbbbbbbbbbbbbbb");
        assert_ne!(h1, h2);
    }

    #[test]
    fn salt_is_sixteen_hex_chars() {
        let salt = generate_salt();
        assert_eq!(salt.len(), SALT_HEX_LEN);
        assert!(salt.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(generate_salt(), generate_salt());
    }

    #[test]
    fn constant_time_eq_works() {
        assert!(constant_time_eq(b"hello", b"hello"));
        assert!(!constant_time_eq(b"hello", b"world"));
        assert!(!constant_time_eq(b"short", b"longer"));
    }

    #[test]
    fn policy_counts_characters() {
        let policy = PasswordPolicy::new(4);
        assert!(policy.check("ñañá").is_ok());
        assert!(policy.check("abc").is_err());
        assert!(PasswordPolicy::default().check("12345").is_err());
        assert!(PasswordPolicy::default().check("123456").is_ok());
    }
}
