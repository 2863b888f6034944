/// Password hashing and verification using Argon2id
use crate::error::{AuraError, AuraResult};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

pub const MIN_PASSWORD_LENGTH: usize = 6;

pub fn validate_password(password: &str) -> AuraResult<()> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuraError::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }
    Ok(())
}

/// Hash a password into a PHC string
pub fn hash_password(password: &str) -> AuraResult<String> {
    let salt = SaltString::generate(&mut OsRng);

    let password_hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AuraError::Internal(format!("Password hashing failed: {}", e)))?
        .to_string();

    Ok(password_hash)
}

/// Check a password against a stored PHC string
pub fn verify_password(password: &str, password_hash: &str) -> AuraResult<bool> {
    let parsed_hash = PasswordHash::new(password_hash)
        .map_err(|e| AuraError::Internal(format!("Invalid password hash format: {}", e)))?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(AuraError::Internal(format!(
            "Password verification failed: {}",
            e
        ))),
    }
}
