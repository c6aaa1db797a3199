use axum::{debug_handler, extract::{Query, State}, response::{IntoResponse, Redirect, Response}, Form};
use serde::Deserialize;
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_sessions::Session;
use tracing::{info, warn};

use crate::{config::Config, mail::{Mail, Mailer}, session::Viewer, AppResult, AppState};

use super::{
    AuthError,
    page::{render, AuthView},
    start_session,
    users::{self, Identity, Metadata, TokenPurpose},
};

pub(crate) const MAGIC_LINK_SENT: &str = "Check your email for a magic link!";
pub(crate) const EMAIL_VERIFIED: &str = "Email verified. You can now sign in.";

#[derive(Deserialize)]
pub(crate) struct TokenQuery {
    #[serde(default)]
    token: String,
}

#[derive(Deserialize)]
pub(crate) struct MagicLinkForm {
    #[serde(default)]
    email: String,
}

/// Issues a one-time token for `identity` and mails the link that redeems it.
pub(crate) async fn send_link(
    db_pool: &SqlitePool,
    mailer: &Mailer,
    config: &Config,
    identity: &Identity,
    purpose: TokenPurpose,
) -> Result<(), AuthError> {
    let token = users::issue_token(db_pool, identity.id, purpose).await?;
    let (path, subject) = match purpose {
        TokenPurpose::Verify => ("/auth/verify", "Confirm your signup"),
        TokenPurpose::MagicLink => ("/auth/magic", "Your magic link"),
    };

    mailer.send(Mail {
        to: identity.email.clone(),
        subject: subject.to_owned(),
        link: format!("{}{path}?token={token}", config.public_url.trim_end_matches('/')),
    });
    Ok(())
}

#[debug_handler(state = AppState)]
pub(crate) async fn send_magic_link(
    State(db_pool): State<SqlitePool>,
    State(mailer): State<Mailer>,
    State(config): State<Arc<Config>>,
    viewer: Viewer,
    Form(MagicLinkForm { email }): Form<MagicLinkForm>,
) -> AppResult<Response> {
    let identity = match users::find_or_create(&db_pool, &email, Metadata::default()).await {
        Ok(identity) => identity,
        Err(e) => {
            warn!(error = %e, "magic link refused");
            return Ok(render(&viewer, AuthView::sign_in_error(email, e)));
        }
    };

    send_link(&db_pool, &mailer, &config, &identity, TokenPurpose::MagicLink).await?;
    info!(user_id = %identity.id, "magic link sent");

    Ok(render(&viewer, AuthView::sign_in_notice(String::new(), MAGIC_LINK_SENT)))
}

/// Redeems a magic link. Holding the link proves the address, so it also verifies it.
#[debug_handler(state = AppState)]
pub(crate) async fn magic(
    Query(TokenQuery { token }): Query<TokenQuery>,
    State(db_pool): State<SqlitePool>,
    viewer: Viewer,
    session: Session,
) -> AppResult<Response> {
    let identity = match users::redeem_token(&db_pool, &token, TokenPurpose::MagicLink).await {
        Ok(identity) => identity,
        Err(e) => return Ok(render(&viewer, AuthView::sign_in_error(String::new(), e))),
    };

    users::confirm_email(&db_pool, identity.id).await?;
    start_session(&session, identity.id).await?;
    info!(user_id = %identity.id, "signed in with magic link");

    Ok(Redirect::to("/").into_response())
}

#[debug_handler(state = AppState)]
pub(crate) async fn verify(
    Query(TokenQuery { token }): Query<TokenQuery>,
    State(db_pool): State<SqlitePool>,
    viewer: Viewer,
) -> AppResult<Response> {
    let identity = match users::redeem_token(&db_pool, &token, TokenPurpose::Verify).await {
        Ok(identity) => identity,
        Err(e) => return Ok(render(&viewer, AuthView::sign_in_error(String::new(), e))),
    };

    users::confirm_email(&db_pool, identity.id).await?;
    info!(user_id = %identity.id, "email verified");

    Ok(render(&viewer, AuthView::sign_in_notice(identity.email, EMAIL_VERIFIED)))
}
