//! Auth identities: password accounts, one-time email tokens and
//! passwordless find-or-create.

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::{
    distr::{Alphanumeric, SampleString},
    RngCore,
};
use sqlx::SqlitePool;
use time::{Duration, OffsetDateTime};
use tracing::info;
use uuid::Uuid;

use crate::db::{self, Role, School};

use super::AuthError;

const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Identity {
    pub id: Uuid,
    pub email: String,
    pub password_hash: Option<String>,
    pub email_confirmed_at: Option<OffsetDateTime>,
    pub name: Option<String>,
    pub role: Option<Role>,
    pub school: Option<School>,
}

/// Extra fields recorded on the identity at sign-up.
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    pub name: Option<String>,
    pub role: Option<Role>,
    pub school: Option<School>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenPurpose {
    Verify,
    MagicLink,
}

impl TokenPurpose {
    fn as_str(&self) -> &'static str {
        match self {
            TokenPurpose::Verify => "verify",
            TokenPurpose::MagicLink => "magic_link",
        }
    }

    fn ttl(&self) -> Duration {
        match self {
            TokenPurpose::Verify => Duration::hours(24),
            TokenPurpose::MagicLink => Duration::hours(1),
        }
    }
}

const COLUMNS: &str = "id,email,password_hash,email_confirmed_at,name,role,school";

pub fn normalize_email(email: &str) -> Result<String, AuthError> {
    let email = email.trim().to_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !domain.contains('@')
                && !email.contains(char::is_whitespace)
        }
        None => false,
    };
    if valid { Ok(email) } else { Err(AuthError::InvalidEmail) }
}

pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let mut salt_bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut salt_bytes);
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| AuthError::Hash(e.to_string()))?;

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Hash(e.to_string()))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok())
        .unwrap_or(false)
}

pub async fn get(db_pool: &SqlitePool, id: Uuid) -> Result<Option<Identity>, sqlx::Error> {
    sqlx::query_as(&format!("SELECT {COLUMNS} FROM users WHERE id=?"))
        .bind(id)
        .fetch_optional(db_pool)
        .await
}

pub async fn find_by_email(db_pool: &SqlitePool, email: &str) -> Result<Option<Identity>, sqlx::Error> {
    sqlx::query_as(&format!("SELECT {COLUMNS} FROM users WHERE email=?"))
        .bind(email)
        .fetch_optional(db_pool)
        .await
}

async fn insert(
    db_pool: &SqlitePool,
    email: &str,
    password_hash: Option<String>,
    Metadata { name, role, school }: Metadata,
) -> Result<Identity, AuthError> {
    let identity = sqlx::query_as(&format!(
        r#"INSERT INTO users (id,email,password_hash,email_confirmed_at,name,role,school,created_at)
        VALUES (?,?,?,NULL,?,?,?,?) RETURNING {COLUMNS}"#
    ))
    .bind(Uuid::now_v7())
    .bind(email)
    .bind(password_hash)
    .bind(name)
    .bind(role)
    .bind(school)
    .bind(db::now()?)
    .fetch_one(db_pool)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => AuthError::AlreadyRegistered,
        e => AuthError::Database(e),
    })?;

    Ok(identity)
}

/// Creates an unverified password identity.
pub async fn sign_up(
    db_pool: &SqlitePool,
    email: &str,
    password: &str,
    metadata: Metadata,
) -> Result<Identity, AuthError> {
    let email = normalize_email(email)?;
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::WeakPassword);
    }

    let identity = insert(db_pool, &email, Some(hash_password(password)?), metadata).await?;
    info!(user_id = %identity.id, "identity created");
    Ok(identity)
}

/// Checks the password. Does not look at verification; callers gate on that.
pub async fn sign_in_with_password(
    db_pool: &SqlitePool,
    email: &str,
    password: &str,
) -> Result<Identity, AuthError> {
    let email = normalize_email(email).map_err(|_| AuthError::InvalidCredentials)?;
    let Some(identity) = find_by_email(db_pool, &email).await? else {
        return Err(AuthError::InvalidCredentials);
    };

    match &identity.password_hash {
        Some(hash) if verify_password(password, hash) => Ok(identity),
        _ => Err(AuthError::InvalidCredentials),
    }
}

/// Passwordless sign-in creates the identity on first use.
pub async fn find_or_create(
    db_pool: &SqlitePool,
    email: &str,
    metadata: Metadata,
) -> Result<Identity, AuthError> {
    let email = normalize_email(email)?;
    if let Some(identity) = find_by_email(db_pool, &email).await? {
        return Ok(identity);
    }

    match insert(db_pool, &email, None, metadata).await {
        // lost a race with a concurrent first sign-in
        Err(AuthError::AlreadyRegistered) => find_by_email(db_pool, &email)
            .await?
            .ok_or(AuthError::InvalidCredentials),
        result => result,
    }
}

pub async fn confirm_email(db_pool: &SqlitePool, id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE users SET email_confirmed_at=? WHERE id=? AND email_confirmed_at IS NULL")
        .bind(db::now()?)
        .bind(id)
        .execute(db_pool)
        .await?;
    Ok(())
}

pub async fn issue_token(
    db_pool: &SqlitePool,
    user_id: Uuid,
    purpose: TokenPurpose,
) -> Result<String, AuthError> {
    let token = Alphanumeric.sample_string(&mut rand::rng(), 40);
    sqlx::query("INSERT INTO auth_tokens (token,user_id,purpose,expires_at) VALUES (?,?,?,?)")
        .bind(&token)
        .bind(user_id)
        .bind(purpose.as_str())
        .bind(db::stamp(OffsetDateTime::now_utc() + purpose.ttl())?)
        .execute(db_pool)
        .await?;
    Ok(token)
}

/// Consumes a one-time token. A token is spent even when it turns out to be expired.
pub async fn redeem_token(
    db_pool: &SqlitePool,
    token: &str,
    purpose: TokenPurpose,
) -> Result<Identity, AuthError> {
    let redeemed: Option<(Uuid, OffsetDateTime)> = sqlx::query_as(
        "DELETE FROM auth_tokens WHERE token=? AND purpose=? RETURNING user_id,expires_at",
    )
    .bind(token)
    .bind(purpose.as_str())
    .fetch_optional(db_pool)
    .await?;

    match redeemed {
        Some((user_id, expires_at)) if expires_at > OffsetDateTime::now_utc() => {
            get(db_pool, user_id).await?.ok_or(AuthError::InvalidToken)
        }
        _ => Err(AuthError::InvalidToken),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emails_are_normalized() {
        assert_eq!(normalize_email("  Pat@Hockaday.ORG ").unwrap(), "pat@hockaday.org");
        for bad in ["", "pat", "@hockaday.org", "pat@hockaday", "pat@.org", "p at@x.org"] {
            assert!(
                matches!(normalize_email(bad), Err(AuthError::InvalidEmail)),
                "{bad:?} accepted"
            );
        }
    }

    #[test]
    fn password_hash_verifies_only_the_original() {
        let hash = hash_password("hunter22").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("hunter22", &hash));
        assert!(!verify_password("hunter23", &hash));
        assert!(!verify_password("hunter22", "not a hash"));
    }
}
