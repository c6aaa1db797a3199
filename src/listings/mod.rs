mod browse;
mod detail;
mod sell;
mod ws;

use axum::{extract::DefaultBodyLimit, routing::get, Router};

use crate::{db::Listing, include_res, res::{self, attr, esc}, AppState};

/// Upper bound for a sell form, image included.
const MAX_SELL_BODY: usize = 50 * 1024 * 1024;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/browse", get(browse::browse))
        .route("/browse/ws", get(ws::browse_ws))
        .route("/browse/{id}", get(detail::detail))
        .route(
            "/sell",
            get(sell::sell_page)
                .post(sell::sell)
                .layer(DefaultBodyLimit::max(MAX_SELL_BODY)),
        )
}

/// Summary card linking to the detail page.
pub(crate) fn card(listing: &Listing) -> String {
    include_res!(str, "/pages/listing_card.html")
        .replace("{id}", &listing.id.to_string())
        .replace("{price}", &res::price(listing.price))
        .replace("{category}", listing.category.as_str())
        .replace("{condition}", listing.condition.as_str())
        .replace("{school}", &esc(listing.school.as_str()))
        .replace("{title}", &esc(&listing.title))
        .replace("{description}", &esc(&listing.description))
        .replace("{seller}", &esc(&listing.seller_name))
}

/// Cards in a grid, or the empty-state line.
pub(crate) fn grid(listings: &[Listing]) -> String {
    if listings.is_empty() {
        return include_res!(str, "/pages/browse_empty.html").to_owned();
    }
    format!(
        r#"<div class="grid">{}</div>"#,
        listings.iter().map(card).collect::<String>()
    )
}

pub(crate) fn image(src: &str) -> String {
    include_res!(str, "/pages/listing_image.html").replace("{src}", &attr(src))
}
