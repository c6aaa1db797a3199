mod clients;
mod lockin;
mod login;
mod logout;
mod magic;
mod page;
pub mod users;

use axum::{routing::{get, post}, Router};
use tower_sessions::Session;
use uuid::Uuid;

use crate::{session::USER_ID, AppState};

pub use clients::{ClientProvider, Clients};

/// Backend rejections, worded the way they are shown to the user.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid login credentials")]
    InvalidCredentials,
    #[error("User already registered")]
    AlreadyRegistered,
    #[error("Password should be at least 6 characters.")]
    WeakPassword,
    #[error("Unable to validate email address: invalid format")]
    InvalidEmail,
    #[error("Email link is invalid or has expired")]
    InvalidToken,
    #[error("Sign-in with {0} is not available.")]
    ProviderUnavailable(ClientProvider),
    #[error("Your {0} account has no verified email address.")]
    UnverifiedProviderEmail(ClientProvider),
    #[error("Password hashing failed: {0}")]
    Hash(String),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth", get(page::auth_page))
        .route("/auth/signin", post(page::sign_in))
        .route("/auth/signup", post(page::sign_up))
        .route("/auth/verify", get(magic::verify))
        .route("/auth/magic-link", post(magic::send_magic_link))
        .route("/auth/magic", get(magic::magic))
        .route("/auth/oauth/{provider}", get(login::login))
        .route("/auth/oauth/{provider}/callback", get(lockin::lockin))
        .route("/auth/signout", get(logout::logout))
}

/// Binds the identity to the session under a fresh session id.
pub(crate) async fn start_session(session: &Session, user_id: Uuid) -> Result<(), tower_sessions::session::Error> {
    session.cycle_id().await?;
    session.insert(USER_ID, user_id).await
}

/// Only same-site paths are accepted as return targets.
pub(crate) fn local_path(return_url: Option<String>) -> String {
    match return_url {
        Some(url) if url.starts_with('/') && !url.starts_with("//") && !url.starts_with("/\\") => url,
        _ => "/".to_owned(),
    }
}
