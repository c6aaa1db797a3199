use axum::{debug_handler, extract::{Path, State}, response::{IntoResponse, Response}};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{db::listings, include_res, res::{self, esc}, session::Viewer, AppResult, AppState};

#[debug_handler(state = AppState)]
pub(crate) async fn detail(
    Path(id): Path<String>,
    State(db_pool): State<SqlitePool>,
    viewer: Viewer,
) -> AppResult<Response> {
    let listing = match id.parse::<Uuid>() {
        Ok(id) => listings::get(&db_pool, id).await?,
        Err(_) => None,
    };
    let Some(listing) = listing else {
        return res::sorry(&viewer, "Listing not found.");
    };

    let actions = match viewer.id() {
        Some(viewer_id) if viewer_id != listing.user_id => format!(
            r#"<a href="/messages/{}/{}"><button type="button">Message Seller</button></a>"#,
            listing.id, listing.user_id
        ),
        _ => String::new(),
    };
    let image = listing.image_url.as_deref().map(super::image).unwrap_or_default();

    let body = include_res!(str, "/pages/listing_detail.html")
        .replace("{price}", &res::price(listing.price))
        .replace("{category}", listing.category.as_str())
        .replace("{condition}", listing.condition.as_str())
        .replace("{school}", &esc(listing.school.as_str()))
        .replace("{image}", &image)
        .replace("{actions}", &actions)
        .replace("{title}", &esc(&listing.title))
        .replace("{description}", &esc(&listing.description))
        .replace("{seller}", &esc(&listing.seller_name));

    Ok(res::page(&listing.title, &viewer, &body).into_response())
}
