use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use sqlx::SqlitePool;
use time::OffsetDateTime;
use tower_sessions::Session;
use uuid::Uuid;

use crate::{
    db::{Role, School},
    AppError, AppState,
};

pub const USER_ID: &str = "user_id";
pub const CSRF_STATE: &str = "csrf_state";
pub const PKCE_VERIFIER: &str = "pkce_verifier";
pub const RETURN_URL: &str = "return_url";

/// The signed-in identity behind the current session, joined with its profile name.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SessionUser {
    pub id: Uuid,
    pub email: String,
    pub email_confirmed_at: Option<OffsetDateTime>,
    /// Identity metadata captured at sign-up.
    pub name: Option<String>,
    pub role: Option<Role>,
    pub school: Option<School>,
    pub profile_name: Option<String>,
}

impl SessionUser {
    pub fn is_verified(&self) -> bool {
        self.email_confirmed_at.is_some()
    }

    /// Name shown in the navigation bar.
    pub fn display_name(&self) -> &str {
        match self.profile_name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => &self.email,
        }
    }

    /// Name copied onto listings at post time.
    pub fn seller_name(&self) -> &str {
        match self.name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ if !self.email.is_empty() => &self.email,
            _ => "Unknown",
        }
    }
}

/// Resolves the session once per request. Pages take this instead of reading the
/// session themselves.
#[derive(Debug, Clone, Default)]
pub struct Viewer(pub Option<SessionUser>);

impl Viewer {
    pub fn user(&self) -> Option<&SessionUser> {
        self.0.as_ref()
    }

    pub fn id(&self) -> Option<Uuid> {
        self.0.as_ref().map(|user| user.id)
    }
}

pub async fn load_user(db_pool: &SqlitePool, user_id: Uuid) -> Result<Option<SessionUser>, sqlx::Error> {
    sqlx::query_as(
        r#"SELECT u.id, u.email, u.email_confirmed_at, u.name, u.role, u.school, p.name AS profile_name
        FROM users u LEFT JOIN profiles p ON p.id = u.id
        WHERE u.id = ?"#,
    )
    .bind(user_id)
    .fetch_optional(db_pool)
    .await
}

impl<S> FromRequestParts<S> for Viewer
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state)
            .await
            .map_err(|(_, msg)| AppError::from(msg))?;

        let Some(user_id) = session.get::<Uuid>(USER_ID).await? else {
            return Ok(Viewer(None));
        };

        let app_state = AppState::from_ref(state);
        let user = load_user(&app_state.db_pool, user_id).await?;
        if user.is_none() {
            // identity vanished underneath a live session
            session.remove::<Uuid>(USER_ID).await?;
        }
        Ok(Viewer(user))
    }
}
