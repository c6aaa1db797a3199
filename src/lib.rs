pub mod auth;
pub mod config;
pub mod db;
pub mod feed;
pub mod index;
pub mod listings;
pub mod mail;
pub mod messages;
pub mod nav;
pub mod profiles;
pub mod res;
pub mod session;
pub mod storage;

use std::sync::Arc;

use axum::{extract::FromRef, http::StatusCode, response::{IntoResponse, Response}, routing::get, Router};
use sqlx::SqlitePool;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tower_sessions::{cookie::SameSite, Expiry, MemoryStore, SessionManagerLayer};

use config::Config;
use feed::ChangeFeed;
use mail::Mailer;
use storage::ObjectStore;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub db_pool: SqlitePool,
    pub clients: auth::Clients,
    pub feed: ChangeFeed,
    pub storage: ObjectStore,
    pub mailer: Mailer,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(db_pool: SqlitePool, config: Config) -> anyhow::Result<Self> {
        let clients = auth::Clients::load(&config)?;
        let storage = ObjectStore::new(&config.storage_dir, &config.public_url);

        Ok(Self {
            db_pool,
            clients,
            feed: ChangeFeed::default(),
            storage,
            mailer: Mailer::default(),
            config: Arc::new(config),
        })
    }
}

/// All pages, the object store and the session layer over one process-wide store.
pub fn app(state: AppState) -> Router {
    let session_layer = SessionManagerLayer::new(MemoryStore::default())
        .with_secure(state.config.public_url.starts_with("https://"))
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::minutes(
            state.config.session_idle_minutes,
        )));
    let objects = ServeDir::new(state.storage.root());

    Router::new()
        .route("/", get(index::index))
        .merge(auth::router())
        .merge(listings::router())
        .merge(profiles::router())
        .merge(messages::router())
        .nest_service("/storage", objects)
        .with_state(state)
        .layer(session_layer)
        .layer(TraceLayer::new_for_http())
}

pub trait GetField {
    fn get_str_field(&self, field: &str) -> AppResult<String>;
}

impl GetField for serde_json::Value {
    fn get_str_field(&self, field: &str) -> AppResult<String> {
        Ok(
            self.get(field)
            .ok_or(format!("expected {field} in {self}"))?
            .as_str()
            .ok_or(format!("expected {field} in {self} to be string"))?
            .to_owned()
        )
    }
}

pub type AppResult<T> = Result<T, AppError>;
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::error!(error = ?self.0, "request failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Something went wrong: {}", self.0),
        )
            .into_response()
    }
}

impl From<String> for AppError {
    fn from(err: String) -> Self {
        Self(anyhow::Error::msg(err))
    }
}

impl From<&str> for AppError {
    fn from(err: &str) -> Self {
        Self(anyhow::Error::msg(err.to_owned()))
    }
}

macro_rules! apperr_impl {
    ($E:ty) => {
        impl From<$E> for AppError {
            fn from(err: $E) -> Self {
                Self(anyhow::Error::from(err))
            }
        }
    };
}

apperr_impl!(anyhow::Error);
apperr_impl!(serde_json::Error);
apperr_impl!(sqlx::Error);
apperr_impl!(tower_sessions::session::Error);
apperr_impl!(axum::Error);
apperr_impl!(axum::extract::multipart::MultipartError);
apperr_impl!(reqwest::Error);
apperr_impl!(oauth2::url::ParseError);
apperr_impl!(std::io::Error);
apperr_impl!(auth::AuthError);
apperr_impl!(storage::StorageError);

impl<E: core::error::Error + Send + Sync + 'static, R: oauth2::ErrorResponse + Send + Sync + 'static> From<oauth2::RequestTokenError<E, R>> for AppError {
    fn from(err: oauth2::RequestTokenError<E, R>) -> Self {
        Self(anyhow::Error::from(err))
    }
}
