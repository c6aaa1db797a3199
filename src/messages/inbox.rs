use std::collections::HashMap;

use axum::{debug_handler, extract::State, response::{IntoResponse, Response}};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{
    db::{listings, messages, profiles},
    include_res,
    res::{self, attr, esc},
    session::Viewer,
    AppResult, AppState,
};

use super::group_conversations;

/// Every conversation the viewer takes part in, most recent first.
#[debug_handler(state = AppState)]
pub(crate) async fn inbox(
    State(db_pool): State<SqlitePool>,
    viewer: Viewer,
) -> AppResult<Response> {
    let Some(user_id) = viewer.id() else {
        return res::sorry(&viewer, "Please sign in to view your messages.");
    };

    let mut conversations = group_conversations(messages::involving(&db_pool, user_id).await?, user_id);
    conversations.sort_by(|a, b| b.last_message.created_at.cmp(&a.last_message.created_at));

    let listing_ids: Vec<Uuid> = conversations.iter().map(|c| c.listing_id).collect();
    let counterpart_ids: Vec<Uuid> = conversations.iter().map(|c| c.counterpart_id).collect();

    let titles: HashMap<Uuid, String> = listings::get_many(&db_pool, &listing_ids)
        .await?
        .into_iter()
        .map(|listing| (listing.id, listing.title))
        .collect();
    let names: HashMap<Uuid, String> = profiles::get_many(&db_pool, &counterpart_ids)
        .await?
        .into_iter()
        .filter_map(|profile| {
            let name = if profile.name.is_empty() { profile.email } else { profile.name };
            (!name.is_empty()).then_some((profile.id, name))
        })
        .collect();

    let items = if conversations.is_empty() {
        include_res!(str, "/pages/messages_empty.html").to_owned()
    } else {
        conversations
            .iter()
            .map(|conversation| {
                let href = format!("/messages/{}/{}", conversation.listing_id, conversation.counterpart_id);
                include_res!(str, "/pages/conversation_item.html")
                    .replace("{href}", &attr(&href))
                    .replace(
                        "{listing_title}",
                        &esc(titles.get(&conversation.listing_id).map_or("Listing", String::as_str)),
                    )
                    .replace(
                        "{with}",
                        &esc(names.get(&conversation.counterpart_id).map_or("User", String::as_str)),
                    )
                    .replace("{last}", &esc(&conversation.last_message.content))
            })
            .collect()
    };

    let body = include_res!(str, "/pages/messages.html").replace("{conversations}", &items);
    Ok(res::page("My Messages", &viewer, &body).into_response())
}
