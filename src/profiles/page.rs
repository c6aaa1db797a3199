use axum::{debug_handler, extract::{Query, State}, response::{IntoResponse, Redirect, Response}, Form};
use serde::Deserialize;
use sqlx::SqlitePool;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tracing::{info, warn};

use crate::{
    db::{self, listings, profiles::{self, ProfileFields}, Listing, Profile, Role, School},
    feed::{ChangeFeed, Row},
    include_res,
    res::{self, attr, esc},
    session::{SessionUser, Viewer},
    AppResult, AppState,
};

const REQUIRED: &str = "All fields are required.";
const CHANGED_ELSEWHERE: &str = "Your profile was changed elsewhere. Reload and try again.";

#[derive(Deserialize)]
pub(crate) struct ProfileQuery {
    edit: Option<String>,
}

/// Edit form values. `version` is the `updated_at` the form was rendered from.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ProfileForm {
    #[serde(default)]
    name: String,
    #[serde(default)]
    role: String,
    #[serde(default)]
    school: String,
    #[serde(default)]
    version: String,
}

impl ProfileForm {
    fn from_profile(profile: &Profile) -> Result<Self, sqlx::Error> {
        Ok(Self {
            name: profile.name.clone(),
            role: profile.role.as_str().to_owned(),
            school: profile.school.as_str().to_owned(),
            version: db::stamp(profile.updated_at)?,
        })
    }
}

/// The viewer's profile, created from identity metadata the first time it is asked for.
async fn load_or_create(db_pool: &SqlitePool, user: &SessionUser) -> Result<Profile, sqlx::Error> {
    if let Some(profile) = profiles::get(db_pool, user.id).await? {
        return Ok(profile);
    }

    let fields = ProfileFields {
        name: user.name.clone().unwrap_or_default(),
        role: user.role.unwrap_or_default(),
        school: user.school.unwrap_or_default(),
    };
    let profile = profiles::upsert(db_pool, user.id, &user.email, fields).await?;
    info!(user_id = %user.id, "profile created on first view");
    Ok(profile)
}

fn or_not_set(value: &str) -> String {
    if value.is_empty() { "Not set".to_owned() } else { esc(value) }
}

fn render(viewer: &Viewer, profile: &Profile, edit: Option<(&ProfileForm, Option<&str>)>, own: &[Listing]) -> Response {
    let card = match edit {
        None => include_res!(str, "/pages/profile_view.html")
            .replace("{role}", profile.role.as_str())
            .replace("{school}", &esc(profile.school.as_str()))
            .replace("{name}", &or_not_set(&profile.name))
            .replace("{email}", &or_not_set(&profile.email)),
        Some((form, error)) => include_res!(str, "/pages/profile_edit.html")
            .replace("{role_options}", &res::options(Role::labels(), Some(form.role.as_str())))
            .replace("{school_options}", &res::options(School::labels(), Some(form.school.as_str())))
            .replace("{error}", &res::error(error))
            .replace("{version}", &attr(&form.version))
            .replace("{name}", &attr(&form.name)),
    };

    let listings = if own.is_empty() {
        include_res!(str, "/pages/profile_empty.html").to_owned()
    } else {
        crate::listings::grid(own)
    };

    let body = include_res!(str, "/pages/profile.html")
        .replace("{card}", &card)
        .replace("{listings}", &listings);

    res::page("My Profile", viewer, &body).into_response()
}

#[debug_handler(state = AppState)]
pub(crate) async fn profile(
    Query(ProfileQuery { edit }): Query<ProfileQuery>,
    State(db_pool): State<SqlitePool>,
    viewer: Viewer,
) -> AppResult<Response> {
    let Some(user) = viewer.user() else {
        return res::sorry(&viewer, "Please sign in to view your profile.");
    };

    let profile = load_or_create(&db_pool, user).await?;
    let own = listings::by_owner(&db_pool, user.id).await?;

    let editing = edit.is_some_and(|edit| edit != "0");
    if editing {
        let form = ProfileForm::from_profile(&profile)?;
        return Ok(render(&viewer, &profile, Some((&form, None)), &own));
    }
    Ok(render(&viewer, &profile, None, &own))
}

/// Saves the edit form, refusing it if the profile moved on since the form was rendered.
#[debug_handler(state = AppState)]
pub(crate) async fn save(
    State(db_pool): State<SqlitePool>,
    State(feed): State<ChangeFeed>,
    viewer: Viewer,
    Form(form): Form<ProfileForm>,
) -> AppResult<Response> {
    let Some(user) = viewer.user() else {
        return Ok(Redirect::to("/auth").into_response());
    };

    let profile = load_or_create(&db_pool, user).await?;
    let own = listings::by_owner(&db_pool, user.id).await?;
    let retry = |error: &str| render(&viewer, &profile, Some((&form, Some(error))), &own);

    let name = form.name.trim().to_owned();
    let fields = match (form.role.parse::<Role>(), form.school.parse::<School>()) {
        (Ok(role), Ok(school)) if !name.is_empty() => ProfileFields { name, role, school },
        _ => return Ok(retry(REQUIRED)),
    };
    let Ok(seen) = OffsetDateTime::parse(&form.version, &Rfc3339) else {
        return Ok(retry(CHANGED_ELSEWHERE));
    };

    match profiles::update(&db_pool, user.id, seen, fields).await {
        Ok(Some(updated)) => {
            info!(user_id = %user.id, "profile saved");
            feed.update(Row::Profile(updated));
            Ok(Redirect::to("/profile").into_response())
        }
        Ok(None) => {
            info!(user_id = %user.id, "stale profile edit refused");
            Ok(retry(CHANGED_ELSEWHERE))
        }
        Err(e) => {
            warn!(user_id = %user.id, error = ?e, "profile update failed");
            Ok(retry(&e.to_string()))
        }
    }
}
