use axum::{debug_handler, extract::Query, response::Redirect};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::info;
use uuid::Uuid;

use crate::{session::USER_ID, AppResult};

use super::local_path;

#[derive(Deserialize)]
pub(crate) struct LogoutQuery {
    pub(crate) return_url: Option<String>,
}

/// Drops the whole session from the store.
#[debug_handler]
pub(crate) async fn logout(
    Query(LogoutQuery { return_url }): Query<LogoutQuery>,
    session: Session
) -> AppResult<Redirect> {
    if let Some(user_id) = session.get::<Uuid>(USER_ID).await? {
        info!(%user_id, "signed out");
    }
    session.flush().await?;
    Ok(Redirect::to(&local_path(return_url)))
}
