use std::sync::Arc;

use axum::{debug_handler, extract::{Query, State}, response::{IntoResponse, Redirect, Response}, Form};
use serde::Deserialize;
use sqlx::SqlitePool;
use tower_sessions::Session;
use tracing::{info, warn};

use crate::{
    config::Config,
    db::{profiles::{self, ProfileFields}, Role, School},
    include_res,
    mail::Mailer,
    res::{self, attr},
    session::{self, Viewer},
    AppResult, AppState,
};

use super::{magic::send_link, start_session, users::{self, Metadata, TokenPurpose}};

pub(crate) const REQUIRED: &str = "All fields are required.";
pub(crate) const VERIFY_FIRST: &str = "Please verify your email before signing in. Check your inbox.";
pub(crate) const VERIFICATION_SENT: &str = "Check your email to verify your account before signing in.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum Mode {
    #[default]
    SignIn,
    SignUp,
}

#[derive(Deserialize)]
pub(crate) struct AuthQuery {
    mode: Option<String>,
}

#[derive(Deserialize)]
pub(crate) struct SignInForm {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

#[derive(Deserialize, Default)]
pub(crate) struct SignUpForm {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    role: String,
    #[serde(default)]
    school: String,
}

/// What the auth card shows: the form for `mode` prefilled from `form`, plus at most
/// one error and one notice. After sign-up only the notice is shown.
#[derive(Default)]
pub(crate) struct AuthView {
    pub(crate) mode: Mode,
    pub(crate) form: SignUpForm,
    pub(crate) error: Option<String>,
    pub(crate) notice: Option<&'static str>,
    pub(crate) hide_form: bool,
}

impl AuthView {
    pub(crate) fn sign_in_error(email: String, error: impl ToString) -> Self {
        Self {
            form: SignUpForm { email, ..Default::default() },
            error: Some(error.to_string()),
            ..Default::default()
        }
    }

    pub(crate) fn sign_in_notice(email: String, notice: &'static str) -> Self {
        Self {
            form: SignUpForm { email, ..Default::default() },
            notice: Some(notice),
            ..Default::default()
        }
    }
}

pub(crate) fn render(viewer: &Viewer, view: AuthView) -> Response {
    let AuthView { mode, form, error, notice, hide_form } = view;

    let (heading, switch) = match mode {
        Mode::SignIn => (
            "Sign In to Good Neighbor",
            r#"Don't have an account? <a href="/auth?mode=signup">Sign Up</a>"#,
        ),
        Mode::SignUp => (
            "Sign Up for Good Neighbor",
            r#"Already have an account? <a href="/auth">Sign In</a>"#,
        ),
    };

    let body = match (hide_form, mode) {
        (true, _) => String::new(),
        (false, Mode::SignIn) => include_res!(str, "/pages/auth_signin.html")
            .replace("{email}", &attr(&form.email))
            .replace("{error}", &res::error(error.as_deref())),
        (false, Mode::SignUp) => {
            let role = form.role.parse::<Role>().unwrap_or_default();
            include_res!(str, "/pages/auth_signup.html")
                .replace("{role_options}", &res::options(Role::labels(), Some(role.as_str())))
                .replace("{school_options}", &res::options(School::labels(), Some(form.school.as_str())))
                .replace("{error}", &res::error(error.as_deref()))
                .replace("{name}", &attr(&form.name))
                .replace("{email}", &attr(&form.email))
        }
    };

    let card = include_res!(str, "/pages/auth.html")
        .replace("{heading}", heading)
        .replace("{switch}", switch)
        .replace("{notice}", &res::notice(notice))
        .replace("{body}", &body);

    res::page(heading, viewer, &card).into_response()
}

#[debug_handler(state = AppState)]
pub(crate) async fn auth_page(
    Query(AuthQuery { mode }): Query<AuthQuery>,
    viewer: Viewer,
) -> Response {
    let mode = match mode.as_deref() {
        Some("signup") => Mode::SignUp,
        _ => Mode::SignIn,
    };
    render(&viewer, AuthView { mode, ..Default::default() })
}

/// Password sign-in. An unverified identity keeps its session but stays on this page.
#[debug_handler(state = AppState)]
pub(crate) async fn sign_in(
    State(db_pool): State<SqlitePool>,
    viewer: Viewer,
    session: Session,
    Form(SignInForm { email, password }): Form<SignInForm>,
) -> AppResult<Response> {
    if email.trim().is_empty() || password.is_empty() {
        return Ok(render(&viewer, AuthView::sign_in_error(email, REQUIRED)));
    }

    let identity = match users::sign_in_with_password(&db_pool, &email, &password).await {
        Ok(identity) => identity,
        Err(e) => {
            warn!(error = %e, "password sign-in rejected");
            return Ok(render(&viewer, AuthView::sign_in_error(email, e)));
        }
    };

    start_session(&session, identity.id).await?;

    if identity.email_confirmed_at.is_none() {
        info!(user_id = %identity.id, "sign-in held until email is verified");
        let viewer = Viewer(session::load_user(&db_pool, identity.id).await?);
        return Ok(render(&viewer, AuthView::sign_in_error(email, VERIFY_FIRST)));
    }

    info!(user_id = %identity.id, "signed in with password");
    Ok(Redirect::to("/").into_response())
}

/// Password sign-up: creates the identity, upserts its profile and mails a verification link.
#[debug_handler(state = AppState)]
pub(crate) async fn sign_up(
    State(db_pool): State<SqlitePool>,
    State(mailer): State<Mailer>,
    State(config): State<Arc<Config>>,
    viewer: Viewer,
    Form(form): Form<SignUpForm>,
) -> AppResult<Response> {
    let retry = |form: SignUpForm, error: String| {
        render(&viewer, AuthView { mode: Mode::SignUp, form, error: Some(error), ..Default::default() })
    };

    let name = form.name.trim().to_owned();
    let (Ok(role), Ok(school)) = (form.role.parse::<Role>(), form.school.parse::<School>()) else {
        return Ok(retry(form, REQUIRED.to_owned()));
    };
    if name.is_empty() || form.email.trim().is_empty() || form.password.is_empty() {
        return Ok(retry(form, REQUIRED.to_owned()));
    }

    let metadata = Metadata {
        name: Some(name.clone()),
        role: Some(role),
        school: Some(school),
    };
    let identity = match users::sign_up(&db_pool, &form.email, &form.password, metadata).await {
        Ok(identity) => identity,
        Err(e) => {
            warn!(error = %e, "sign-up rejected");
            return Ok(retry(form, e.to_string()));
        }
    };

    if let Err(e) = profiles::upsert(
        &db_pool,
        identity.id,
        &identity.email,
        ProfileFields { name, role, school },
    ).await {
        warn!(user_id = %identity.id, error = ?e, "profile upsert after sign-up failed");
        return Ok(retry(form, e.to_string()));
    }

    send_link(&db_pool, &mailer, &config, &identity, TokenPurpose::Verify).await?;

    Ok(render(&viewer, AuthView {
        mode: Mode::SignUp,
        notice: Some(VERIFICATION_SENT),
        hide_form: true,
        ..Default::default()
    }))
}
