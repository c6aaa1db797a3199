use axum::{
    debug_handler,
    extract::{Path, State},
    response::{IntoResponse, Redirect, Response},
    Form,
};
use serde::Deserialize;
use sqlx::SqlitePool;
use tracing::warn;
use uuid::Uuid;

use crate::{
    db::{listings, messages::{self, NewMessage}, profiles, Listing},
    feed::ChangeFeed,
    include_res,
    res::{self, attr, esc},
    session::Viewer,
    AppResult, AppState,
};

use super::timeline::Timeline;

/// One side's view of a conversation: the viewer, the listing and the other party.
#[derive(Debug, Clone)]
pub(crate) struct Chat {
    pub(crate) viewer_id: Uuid,
    pub(crate) counterpart_id: Uuid,
    pub(crate) listing: Listing,
}

impl Chat {
    /// Resolves the path for the viewer, or the page to show instead.
    pub(crate) async fn open(
        db_pool: &SqlitePool,
        viewer: &Viewer,
        (listing_id, counterpart_id): (String, String),
    ) -> AppResult<Result<Chat, Response>> {
        let Some(viewer_id) = viewer.id() else {
            return Ok(Err(Redirect::to("/auth").into_response()));
        };

        let (Ok(listing_id), Ok(counterpart_id)) = (listing_id.parse::<Uuid>(), counterpart_id.parse::<Uuid>()) else {
            return res::sorry(viewer, "Conversation not found.").map(Err);
        };
        if counterpart_id == viewer_id {
            return res::sorry(viewer, "You cannot message yourself.").map(Err);
        }
        let Some(listing) = listings::get(db_pool, listing_id).await? else {
            return res::sorry(viewer, "Listing not found.").map(Err);
        };

        Ok(Ok(Chat { viewer_id, counterpart_id, listing }))
    }

    pub(crate) fn path(&self) -> String {
        format!("/messages/{}/{}", self.listing.id, self.counterpart_id)
    }

    pub(crate) fn draft(&self, content: &str) -> NewMessage {
        NewMessage {
            listing_id: self.listing.id,
            sender_id: self.viewer_id,
            receiver_id: self.counterpart_id,
            content: content.to_owned(),
        }
    }

    /// Counterpart's profile name or email; for the listing owner the name on the listing.
    async fn title(&self, db_pool: &SqlitePool) -> Result<String, sqlx::Error> {
        let profile = profiles::get(db_pool, self.counterpart_id).await?;
        let named = profile
            .map(|profile| if profile.name.is_empty() { profile.email } else { profile.name })
            .filter(|name| !name.is_empty());

        Ok(match named {
            Some(name) => name,
            None if self.counterpart_id == self.listing.user_id && !self.listing.seller_name.is_empty() => {
                self.listing.seller_name.clone()
            }
            None if self.counterpart_id == self.listing.user_id => "Seller".to_owned(),
            None => "User".to_owned(),
        })
    }

    async fn render(&self, db_pool: &SqlitePool, viewer: &Viewer, error: Option<&str>) -> AppResult<Response> {
        let history = messages::conversation(db_pool, self.listing.id, self.viewer_id, self.counterpart_id).await?;
        let timeline = Timeline::from_history(&history);
        let visible = timeline.visible();

        let log = if visible.is_empty() {
            include_res!(str, "/pages/chat_empty.html").to_owned()
        } else {
            visible
                .into_iter()
                .map(|entry| {
                    let side = if entry.sender_id == self.viewer_id { "mine" } else { "theirs" };
                    include_res!(str, "/pages/chat_bubble.html")
                        .replace("{side}", side)
                        .replace("{id}", &attr(&entry.id))
                        .replace("{content}", &esc(&entry.content))
                })
                .collect()
        };

        let title = self.title(db_pool).await?;
        let body = include_res!(str, "/pages/chat.html")
            .replace("{path}", &self.path())
            .replace("{listing_id}", &self.listing.id.to_string())
            .replace("{viewer_id}", &self.viewer_id.to_string())
            .replace("{error}", &esc(error.unwrap_or_default()))
            .replace("{listing_title}", &esc(&self.listing.title))
            .replace("{title}", &esc(&title))
            .replace("{log}", &log);

        Ok(res::page(&format!("Chat with {title}"), viewer, &body).into_response())
    }
}

#[derive(Deserialize)]
pub(crate) struct SendForm {
    #[serde(default)]
    content: String,
}

#[debug_handler(state = AppState)]
pub(crate) async fn chat_page(
    Path(path): Path<(String, String)>,
    State(db_pool): State<SqlitePool>,
    viewer: Viewer,
) -> AppResult<Response> {
    match Chat::open(&db_pool, &viewer, path).await? {
        Ok(chat) => chat.render(&db_pool, &viewer, None).await,
        Err(refused) => Ok(refused),
    }
}

/// Form fallback for browsers without scripts: send, then show the conversation again.
#[debug_handler(state = AppState)]
pub(crate) async fn send(
    Path(path): Path<(String, String)>,
    State(db_pool): State<SqlitePool>,
    State(feed): State<ChangeFeed>,
    viewer: Viewer,
    Form(SendForm { content }): Form<SendForm>,
) -> AppResult<Response> {
    let chat = match Chat::open(&db_pool, &viewer, path).await? {
        Ok(chat) => chat,
        Err(refused) => return Ok(refused),
    };

    let content = content.trim();
    if !content.is_empty() {
        if let Err(e) = messages::send(&db_pool, &feed, chat.draft(content)).await {
            warn!(user_id = %chat.viewer_id, error = ?e, "message send failed");
            return chat.render(&db_pool, &viewer, Some(&e.to_string())).await;
        }
    }

    Ok(Redirect::to(&chat.path()).into_response())
}
