use axum::{debug_handler, extract::{Path, Query, State}, response::{IntoResponse, Redirect, Response}};
use oauth2::{CsrfToken, PkceCodeChallenge, Scope};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::warn;

use crate::{session::{Viewer, CSRF_STATE, PKCE_VERIFIER, RETURN_URL}, AppResult, AppState};

use super::{clients::ClientProvider, page::{render, AuthView}, Clients};

#[derive(Deserialize)]
pub(crate) struct LoginQuery {
    pub(crate) return_url: Option<String>,
}

/// Starts the provider's authorization code flow with PKCE.
#[debug_handler(state = AppState)]
pub(crate) async fn login(
    Path(provider): Path<ClientProvider>,
    Query(LoginQuery { return_url }): Query<LoginQuery>,
    State(clients): State<Clients>,
    viewer: Viewer,
    session: Session,
) -> AppResult<Response> {
    let client = match clients.get_client(provider) {
        Ok(client) => client,
        Err(e) => {
            warn!(%provider, error = %e, "OAuth sign-in refused");
            return Ok(render(&viewer, AuthView::sign_in_error(String::new(), e)));
        }
    };

    let (pkce_code_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

    let (authorize_url, csrf_state) = client.authorize_url(CsrfToken::new_random)
        .add_scopes(provider.scopes().iter().map(|scope| Scope::new(scope.to_string())))
        .set_pkce_challenge(pkce_code_challenge)
        .url();

    session.insert(CSRF_STATE, csrf_state.secret()).await?;
    session.insert(PKCE_VERIFIER, pkce_verifier.secret()).await?;
    if let Some(return_url) = return_url {
        session.insert(RETURN_URL, return_url).await?;
    }

    Ok(Redirect::to(authorize_url.as_str()).into_response())
}
