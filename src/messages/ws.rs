use axum::{
    debug_handler,
    extract::{ws::{Message as WsMessage, WebSocket}, Path, State, WebSocketUpgrade},
    response::Response,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{debug, warn};

use crate::{
    db::{messages, Message},
    feed::{ChangeFeed, ChangeKind, Filter, Row, Table},
    session::Viewer,
    AppResult, AppState,
};

use super::{chat::Chat, timeline::Timeline};

#[derive(Debug, Deserialize)]
struct ClientFrame {
    client_id: String,
    content: String,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerFrame {
    Ack { client_id: String, message: Message },
    Failed { client_id: String, error: String },
    Message { message: Message },
}

#[debug_handler(state = AppState)]
pub(crate) async fn chat_ws(
    Path(path): Path<(String, String)>,
    State(db_pool): State<SqlitePool>,
    State(feed): State<ChangeFeed>,
    viewer: Viewer,
    ws: WebSocketUpgrade,
) -> AppResult<Response> {
    let chat = match Chat::open(&db_pool, &viewer, path).await? {
        Ok(chat) => chat,
        Err(refused) => return Ok(refused),
    };

    Ok(ws.on_upgrade(async move |socket| {
        if let Err(e) = relay(socket, db_pool, feed, chat).await {
            warn!(error = ?e.0, "chat socket ended with an error");
        }
    }))
}

async fn send_frame(socket: &mut WebSocket, frame: &ServerFrame) -> AppResult<()> {
    let text = serde_json::to_string(frame)?;
    socket.send(WsMessage::Text(text.into())).await?;
    Ok(())
}

/// Stores one send. The placeholder goes in first and is confirmed or reverted once
/// the insert returns.
async fn store(
    db_pool: &SqlitePool,
    feed: &ChangeFeed,
    chat: &Chat,
    timeline: &mut Timeline,
    ClientFrame { client_id, content }: ClientFrame,
) -> Option<ServerFrame> {
    let content = content.trim();
    if content.is_empty() {
        return None;
    }

    timeline.push_optimistic(&client_id, chat.viewer_id, content);
    Some(match messages::send(db_pool, feed, chat.draft(content)).await {
        Ok(message) => {
            timeline.confirm(&client_id, &message);
            ServerFrame::Ack { client_id, message }
        }
        Err(e) => {
            warn!(user_id = %chat.viewer_id, error = ?e, "message send failed");
            timeline.fail(&client_id);
            ServerFrame::Failed { client_id, error: e.to_string() }
        }
    })
}

/// Relays one conversation until either side goes away. The feed subscription is
/// taken before history is read so nothing falls in between.
async fn relay(mut socket: WebSocket, db_pool: SqlitePool, feed: ChangeFeed, chat: Chat) -> AppResult<()> {
    let mut inserts = feed.subscribe(
        Table::Messages,
        ChangeKind::Insert,
        Some(Filter::eq("listing_id", chat.listing.id)),
    );
    let history = messages::conversation(&db_pool, chat.listing.id, chat.viewer_id, chat.counterpart_id).await?;
    let mut timeline = Timeline::from_history(&history);
    debug!(user_id = %chat.viewer_id, listing_id = %chat.listing.id, "chat socket open");

    loop {
        tokio::select! {
            row = inserts.next() => match row {
                None => break,
                Some(Row::Message(message)) if message.is_between(chat.viewer_id, chat.counterpart_id) => {
                    if timeline.apply(&message) {
                        send_frame(&mut socket, &ServerFrame::Message { message }).await?;
                    }
                }
                Some(_) => {}
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(WsMessage::Text(text))) => {
                    let Ok(frame) = serde_json::from_str::<ClientFrame>(text.as_str()) else {
                        continue;
                    };
                    if let Some(reply) = store(&db_pool, &feed, &chat, &mut timeline, frame).await {
                        send_frame(&mut socket, &reply).await?;
                    }
                }
                Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    debug!(user_id = %chat.viewer_id, listing_id = %chat.listing.id, "chat socket closed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use time::OffsetDateTime;
    use uuid::Uuid;

    use super::*;

    #[test]
    fn frames_are_tagged_by_type() {
        let message = Message {
            id: Uuid::now_v7(),
            listing_id: Uuid::now_v7(),
            sender_id: Uuid::now_v7(),
            receiver_id: Uuid::now_v7(),
            content: "hi".to_owned(),
            created_at: OffsetDateTime::now_utc(),
        };

        let ack = serde_json::to_value(ServerFrame::Ack { client_id: "c1".to_owned(), message }).unwrap();
        assert_eq!(ack["type"], "ack");
        assert_eq!(ack["client_id"], "c1");
        assert_eq!(ack["message"]["content"], "hi");

        let failed = serde_json::to_value(ServerFrame::Failed {
            client_id: "c2".to_owned(),
            error: "database is locked".to_owned(),
        })
        .unwrap();
        assert_eq!(failed["type"], "failed");
        assert_eq!(failed["error"], "database is locked");
    }

    #[test]
    fn client_frame_reads_id_and_content() {
        let frame: ClientFrame = serde_json::from_str(r#"{"client_id":"c1","content":" hi "}"#).unwrap();
        assert_eq!(frame.client_id, "c1");
        assert_eq!(frame.content, " hi ");
    }
}
