use std::fmt;

use constant_time_eq::constant_time_eq;
use rand::distr::Alphanumeric;
use rand::{Rng, RngCore};
use sha2::{Digest, Sha256};

use crate::error::{AuthError, Result};

/// Salt length in bytes before hex encoding (16 bytes = 32 hex chars).
pub const SALT_BYTES: usize = 16;

/// Length of passwords handed out by a reset.
pub const GENERATED_PASSWORD_LEN: usize = 10;

const HASH_HEX_LEN: usize = 64;

/// Fresh salt from the thread-local CSPRNG, hex encoded.
pub fn generate_salt() -> String {
    let mut salt = [0u8; SALT_BYTES];
    rand::rng().fill_bytes(&mut salt);
    hex::encode(salt)
}

/// `hex(sha256(password ‖ salt))`, where `salt` is the hex text as stored.
pub fn hash_password(password: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hasher.update(salt.as_bytes());
    hex::encode(hasher.finalize())
}

/// A stored password: the digest plus the salt that produced it.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    hash: String,
    salt: String,
}

impl Credential {
    /// Derive a credential for `password` under a freshly generated salt.
    pub fn derive(password: &str) -> Self {
        Self::with_salt(password, generate_salt())
    }

    pub fn with_salt(password: &str, salt: String) -> Self {
        Self {
            hash: hash_password(password, &salt),
            salt,
        }
    }

    /// Decode `"<hash_hex>:<salt_hex>"`. Anything else is corruption.
    pub fn parse(encoded: &str) -> Result<Self> {
        let (hash, salt) = encoded
            .split_once(':')
            .ok_or(AuthError::InvalidCredentialFormat)?;

        let is_hex = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_hexdigit());
        if hash.len() != HASH_HEX_LEN || !is_hex(hash) || !is_hex(salt) {
            return Err(AuthError::InvalidCredentialFormat);
        }

        Ok(Self {
            hash: hash.to_ascii_lowercase(),
            salt: salt.to_string(),
        })
    }

    /// Recompute the digest for `password` and compare in constant time.
    pub fn verify(&self, password: &str) -> bool {
        let attempt = hash_password(password, &self.salt);
        constant_time_eq(attempt.as_bytes(), self.hash.as_bytes())
    }

    pub fn salt(&self) -> &str {
        &self.salt
    }

    pub fn encode(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.hash, self.salt)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("hash", &"<redacted>")
            .field("salt", &self.salt)
            .finish()
    }
}

/// Plaintext produced by a password reset. It can be taken out once.
pub struct GeneratedPassword(String);

impl GeneratedPassword {
    pub fn generate() -> Self {
        let password = rand::rng()
            .sample_iter(Alphanumeric)
            .take(GENERATED_PASSWORD_LEN)
            .map(char::from)
            .collect();
        Self(password)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_plaintext(self) -> String {
        self.0
    }
}

impl fmt::Debug for GeneratedPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("GeneratedPassword(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_matches_known_vector() {
        // echo -n "pw123abcd" | sha256sum
        assert_eq!(
            hash_password("pw123", "abcd"),
            hex::encode(Sha256::digest(b"pw123abcd"))
        );
    }

    #[test]
    fn hash_is_deterministic_and_input_sensitive() {
        let salt = "00112233445566778899aabbccddeeff";
        assert_eq!(hash_password("secret", salt), hash_password("secret", salt));
        assert_ne!(hash_password("secret", salt), hash_password("secreT", salt));
        assert_ne!(
            hash_password("secret", salt),
            hash_password("secret", "00112233445566778899aabbccddeef0")
        );
    }

    #[test]
    fn no_collisions_across_short_ascii_inputs() {
        let salt = generate_salt();
        let mut seen = std::collections::HashSet::new();
        for len in 0..=64 {
            let password: String = (0..len).map(|i| (b'!' + (i % 90) as u8) as char).collect();
            assert!(seen.insert(hash_password(&password, &salt)));
        }
    }

    #[test]
    fn salts_are_fresh_hex() {
        let a = generate_salt();
        let b = generate_salt();
        assert_eq!(a.len(), SALT_BYTES * 2);
        assert!(a.bytes().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn encoded_credential_has_one_separator() {
        let encoded = Credential::derive("pw123").encode();
        let (hash, salt) = encoded.split_once(':').unwrap();
        assert_eq!(hash.len(), 64);
        assert_eq!(salt.len(), 32);
        assert!(!salt.contains(':'));
        assert!(encoded
            .bytes()
            .all(|c| c == b':' || (c.is_ascii_hexdigit() && !c.is_ascii_uppercase())));
    }

    #[test]
    fn parse_then_verify() {
        let credential = Credential::derive("pw123");
        assert_eq!(credential.encode(), credential.to_string());
        let parsed = Credential::parse(&credential.encode()).unwrap();
        assert_eq!(parsed, credential);
        assert!(parsed.verify("pw123"));
        assert!(!parsed.verify("pw124"));
        assert!(!parsed.verify(""));
    }

    #[test]
    fn parse_accepts_short_legacy_salts() {
        let legacy = format!("{}:{}", hash_password("pw", "a1b2c3d4e5f60718"), "a1b2c3d4e5f60718");
        assert!(Credential::parse(&legacy).unwrap().verify("pw"));
    }

    #[test]
    fn parse_rejects_malformed() {
        let hash = hash_password("pw", "ab");
        for bad in [
            hash.clone(),
            format!("{}:", hash),
            format!(":{}", "ab"),
            format!("{}:ab:cd", hash),
            format!("{}:zz", hash),
            "deadbeef:ab".to_string(),
        ] {
            assert!(
                matches!(Credential::parse(&bad), Err(AuthError::InvalidCredentialFormat)),
                "accepted {bad:?}"
            );
        }
    }

    #[test]
    fn generated_passwords_are_alphanumeric() {
        let password = GeneratedPassword::generate();
        assert_eq!(password.as_str().len(), GENERATED_PASSWORD_LEN);
        assert!(password.as_str().chars().all(|c| c.is_ascii_alphanumeric()));
        assert_eq!(format!("{:?}", password), "GeneratedPassword(<redacted>)");
    }
}
