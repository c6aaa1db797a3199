use axum::{debug_handler, extract::{Path, Query, State}, response::{IntoResponse, Redirect, Response}};
use oauth2::{AuthorizationCode, CsrfToken, PkceCodeVerifier, TokenResponse};
use serde::Deserialize;
use serde_json::Value;
use sqlx::SqlitePool;
use tower_sessions::Session;
use tracing::{info, warn};

use crate::{session::{Viewer, CSRF_STATE, PKCE_VERIFIER, RETURN_URL}, AppResult, AppState, GetField};

use super::{
    clients::ClientProvider,
    local_path,
    page::{render, AuthView},
    start_session, users, AuthError, Clients,
};

#[derive(Deserialize)]
pub struct LockinQuery {
    pub state: Option<String>,
    pub code: Option<String>,
}

#[derive(Deserialize)]
struct GithubEmail {
    email: String,
    primary: bool,
    verified: bool,
}

/// Email from the userinfo body, only when the provider marks it verified. GitHub's
/// profile email carries no such flag, so it is always looked up in the email list.
fn vouched_email(provider: ClientProvider, body: &Value) -> Option<String> {
    let email = body.get_str_field("email").ok()?;
    match provider {
        ClientProvider::Google => {
            (body.get("verified_email").and_then(Value::as_bool) == Some(true)).then_some(email)
        }
        ClientProvider::Github => None,
    }
}

/// Provider callback: checks CSRF state, trades the code for a token, resolves the
/// provider account's email to an identity and signs it in.
#[debug_handler(state = AppState)]
pub(crate) async fn lockin(
    Path(provider): Path<ClientProvider>,
    Query(LockinQuery { state, code }): Query<LockinQuery>,
    State(db_pool): State<SqlitePool>,
    State(clients): State<Clients>,
    viewer: Viewer,
    session: Session,
) -> AppResult<Response> {
    let state = CsrfToken::new(state.ok_or("OAuth: without state")?);
    let code = AuthorizationCode::new(code.ok_or("OAuth: without code")?);

    let Some(stored_state) = session.remove::<String>(CSRF_STATE).await? else {
        return Err("no csrf_state")?;
    };

    if state.secret().as_str() != stored_state.as_str() {
        return Err("csrf tokens don't match")?;
    }

    let Some(pkce_verifier) = session.remove::<String>(PKCE_VERIFIER).await? else {
        return Err("no pkce_verifier")?;
    };

    let client = match clients.get_client(provider) {
        Ok(client) => client,
        Err(e) => return Ok(render(&viewer, AuthView::sign_in_error(String::new(), e))),
    };
    let http_client = reqwest::ClientBuilder::new()
        .redirect(reqwest::redirect::Policy::none())
        .user_agent("goodneighbor")
        .build()?;
    let token_result = client
        .exchange_code(code)
        .set_pkce_verifier(PkceCodeVerifier::new(pkce_verifier))
        .request_async(&http_client)
        .await?;

    let access_token = token_result.access_token().secret();
    let body: Value = http_client.get(provider.userinfo_url())
        .bearer_auth(access_token)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    let email = match vouched_email(provider, &body) {
        Some(email) => Some(email),
        None if provider == ClientProvider::Github => {
            let emails: Vec<GithubEmail> = http_client.get("https://api.github.com/user/emails")
                .bearer_auth(access_token)
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
            emails
                .into_iter()
                .find(|e| e.primary && e.verified)
                .map(|e| e.email)
        }
        None => None,
    };
    let Some(email) = email else {
        warn!(%provider, "OAuth account without a verified email refused");
        return Ok(render(
            &viewer,
            AuthView::sign_in_error(String::new(), AuthError::UnverifiedProviderEmail(provider)),
        ));
    };
    let name = body.get_str_field("name").ok();

    let identity = users::find_or_create(
        &db_pool,
        &email,
        users::Metadata { name, ..Default::default() },
    ).await?;
    users::confirm_email(&db_pool, identity.id).await?;
    start_session(&session, identity.id).await?;

    info!(user_id = %identity.id, %provider, "signed in with OAuth");

    let return_url = session.remove::<String>(RETURN_URL).await?;
    Ok(Redirect::to(&local_path(return_url)).into_response())
}
