mod chat;
pub mod conversations;
mod inbox;
pub mod timeline;
mod ws;

use axum::{routing::get, Router};

use crate::AppState;

pub use conversations::{group_conversations, Conversation};
pub use timeline::Timeline;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/messages", get(inbox::inbox))
        .route("/messages/{listing}/{counterpart}", get(chat::chat_page).post(chat::send))
        .route("/messages/{listing}/{counterpart}/ws", get(ws::chat_ws))
}
