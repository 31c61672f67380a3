use crate::error::{AppError, Result};
use crate::models::user::User;
use crate::repositories::user as user_repo;
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2, ParamsBuilder,
};
use deadpool_postgres::Pool;
use rand::{rngs::OsRng, RngCore};
use zeroize::Zeroize;

/// The memory cost for Argon2 in MB.
const ARGON2_MEMORY_MB: u32 = 19;
/// The number of iterations for Argon2.
const ARGON2_ITERATIONS: u32 = 3;
/// The parallelism factor for Argon2.
const ARGON2_PARALLELISM: u32 = 6;

/// Hashes a password using Argon2id.
///
/// # Arguments
///
/// * `password` - The password to hash.
///
/// # Returns
///
/// A `Result` containing the PHC-formatted hash.
fn hash_password(password: &str) -> Result<String> {
    let mut password_bytes = password.as_bytes().to_vec();

    let mut salt_bytes = [0u8; 16];
    OsRng.try_fill_bytes(&mut salt_bytes)
        .map_err(|e| AppError::Internal(format!("Failed to generate salt: {}", e)))?;

    let salt = SaltString::encode_b64(&salt_bytes)
        .map_err(|e| AppError::Internal(format!("Salt encoding error: {}", e)))?;

    let argon2 = Argon2::new(
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        ParamsBuilder::new()
            .m_cost(ARGON2_MEMORY_MB * 1024)
            .t_cost(ARGON2_ITERATIONS)
            .p_cost(ARGON2_PARALLELISM)
            .build()
            .map_err(|e| AppError::Internal(format!("Argon2 params: {}", e)))?,
    );

    let password_hash = argon2
        .hash_password(&password_bytes, &salt)
        .map_err(|e| AppError::Internal(format!("Argon2 hash error: {}", e)))?
        .to_string();

    password_bytes.zeroize();
    tracing::debug!("Password hashed successfully with Argon2");
    Ok(password_hash)
}

/// Verifies a password against a stored hash.
fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let mut password_bytes = password.as_bytes().to_vec();
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| AppError::Internal(format!("Hash parse error: {}", e)))?;
    let result = Argon2::default()
        .verify_password(&password_bytes, &parsed_hash)
        .is_ok();

    password_bytes.zeroize();
    Ok(result)
}

/// Registers a new user after checking that email and username are free.
///
/// # Arguments
///
/// * `db` - The database connection pool.
/// * `email` - The user's email, already normalized to lowercase.
/// * `username` - The user's username.
/// * `password` - The user's plaintext password.
///
/// # Returns
///
/// A `Result` containing the created `User`.
pub async fn register_user(
    db: &Pool,
    email: &str,
    username: &str,
    password: &str,
) -> Result<User> {
    tracing::debug!("🔐 Registering user: {}", username);

    if user_repo::find_by_email(db, email).await?.is_some() {
        return Err(AppError::Validation("Email already registered".to_string()));
    }

    if user_repo::username_exists(db, username).await? {
        return Err(AppError::Validation("Username already taken".to_string()));
    }

    let password_hash = hash_password(password)?;

    let user = match user_repo::create_user(db, email, username, &password_hash).await {
        Err(AppError::Conflict(_)) => {
            return Err(AppError::Validation(
                "Email or username already registered".to_string(),
            ));
        }
        other => other?,
    };

    tracing::info!("✅ User created with ID: {}", user.id);
    Ok(user)
}

/// Authenticates a user by email and password.
///
/// Unknown emails and wrong passwords fail with the same message.
pub async fn authenticate_user(db: &Pool, email: &str, password: &str) -> Result<User> {
    tracing::debug!("🔐 Authenticating: {}", email);

    let invalid = || AppError::Authentication("Invalid email or password".to_string());

    let user = user_repo::find_by_email(db, email)
        .await?
        .ok_or_else(invalid)?;

    if !verify_password(password, &user.password_hash)? {
        return Err(invalid());
    }

    tracing::info!("✅ User authenticated: {}", user.id);

    Ok(user)
}
