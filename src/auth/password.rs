//! Password hashing and verification.

use argon2::{
    password_hash::{rand_core::OsRng, rand_core::RngCore, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};

use super::AuthError;

const REFERENCE_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
pub const REFERENCE_CODE_LEN: usize = 8;

/// Argon2 hashing parameters.
#[derive(Debug, Clone, Copy)]
pub struct Argon2Params {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Argon2Params {
    fn to_argon2(self) -> Result<Argon2<'static>, AuthError> {
        let params = Params::new(self.memory_kib, self.iterations, self.parallelism, None)
            .map_err(|e| AuthError::Hashing(format!("create argon2 params: {e}")))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

impl Default for Argon2Params {
    fn default() -> Self {
        Self {
            memory_kib: 19456, // 19 MB
            iterations: 2,
            parallelism: 1,
        }
    }
}

/// Hash a password with Argon2id and a fresh salt
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2Params::default()
        .to_argon2()?
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AuthError::Hashing(format!("hash password: {e}")))?;
    Ok(hash.to_string())
}

/// Verify a password against a stored PHC string.
///
/// Parameters are read from the hash itself.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    let parsed = PasswordHash::new(hash).map_err(|e| AuthError::Hashing(format!("parse hash: {e}")))?;
    Ok(Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok())
}

/// Therapist reference code; ambiguous glyphs (0/O, 1/I) are left out
pub fn generate_reference_code() -> String {
    (0..REFERENCE_CODE_LEN)
        .map(|_| {
            let idx = OsRng.next_u32() as usize % REFERENCE_CODE_ALPHABET.len();
            REFERENCE_CODE_ALPHABET[idx] as char
        })
        .collect()
}
