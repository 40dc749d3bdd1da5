//! Account management: password hashing, registration and login checks.
//!
//! Passwords are hashed with Argon2id using the crate's default parameters and
//! a fresh random salt per hash. Hashes are stored as PHC strings.

use anyhow::Context;
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use thiserror::Error;
use tracing::info;

use crate::config::AdminConfig;
use crate::db::{Database, Role, User};
use crate::forms::{PasswordForm, RegisterForm, ValidationError};

#[derive(Debug, Error)]
pub enum RegisterError {
    #[error("Passwords do not match")]
    PasswordMismatch,
    #[error("Username already exists")]
    UsernameTaken,
    #[error("Email already registered")]
    EmailTaken,
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum PasswordChangeError {
    #[error("Current password is incorrect")]
    WrongPassword,
    #[error("Passwords do not match")]
    PasswordMismatch,
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?;
    Ok(hash.to_string())
}

/// Errors only when `hash` is not a valid PHC string
pub fn verify_password(password: &str, hash: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| anyhow::anyhow!("Invalid password hash format: {}", e))?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(anyhow::anyhow!("Password verification failed: {}", e)),
    }
}

/// Creates a regular account; returns the new user id
pub async fn register(db: &Database, form: &RegisterForm) -> Result<i64, RegisterError> {
    if form.password != form.confirm_password {
        return Err(RegisterError::PasswordMismatch);
    }
    form.validate()?;

    let username = form.username.trim();
    let email = form.email.trim();

    if db.get_user_by_username(username).await?.is_some() {
        return Err(RegisterError::UsernameTaken);
    }
    if db.get_user_by_email(email).await?.is_some() {
        return Err(RegisterError::EmailTaken);
    }

    let hash = hash_password(&form.password)?;
    let id = db.create_user(username, email, &hash, Role::User).await?;
    info!("Registered user '{}'", username);
    Ok(id)
}

/// Returns the user when the credentials match
pub async fn authenticate(
    db: &Database,
    username: &str,
    password: &str,
) -> anyhow::Result<Option<User>> {
    let Some(user) = db.get_user_by_username(username.trim()).await? else {
        return Ok(None);
    };

    if verify_password(password, &user.password_hash)? {
        Ok(Some(user))
    } else {
        Ok(None)
    }
}

/// Replaces the password after checking the current one
pub async fn change_password(
    db: &Database,
    user: &User,
    form: &PasswordForm,
) -> Result<(), PasswordChangeError> {
    form.validate()?;
    if form.new_password != form.confirm_password {
        return Err(PasswordChangeError::PasswordMismatch);
    }
    if !verify_password(&form.current_password, &user.password_hash)? {
        return Err(PasswordChangeError::WrongPassword);
    }

    let hash = hash_password(&form.new_password)?;
    db.update_password(user.id, &hash).await?;
    info!("User '{}' changed their password", user.username);
    Ok(())
}

/// Makes sure the configured admin account exists and has the admin role
pub async fn seed_admin(db: &Database, admin: &AdminConfig) -> anyhow::Result<()> {
    match db.get_user_by_username(&admin.username).await? {
        Some(user) if user.is_admin() => {}
        Some(user) => {
            db.set_user_role(user.id, Role::Admin).await?;
            info!("Promoted '{}' to admin", user.username);
        }
        None => {
            let hash = hash_password(&admin.password)?;
            db.create_user(&admin.username, &admin.email, &hash, Role::Admin)
                .await
                .context("Failed to create configured admin account")?;
            info!("Created admin account '{}'", admin.username);
        }
    }
    Ok(())
}
