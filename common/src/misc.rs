use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use uuid::Uuid;

use crate::error::{AppError, Res};

/// Hashes a secret with argon2 and a random salt.
pub fn hash_str(value: &str) -> Res<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(value.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("Failed to hash secret: {}", e)))
}

pub fn verify_hash(value: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(value.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            log::error!("Stored hash could not be parsed: {}", e);
            false
        }
    }
}

/// Random per-credential secret.
pub fn generate_secret() -> String {
    Uuid::new_v4().simple().to_string()
}
