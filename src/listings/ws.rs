use axum::{
    debug_handler,
    extract::{ws::{Message as WsMessage, WebSocket}, State, WebSocketUpgrade},
    response::Response,
};

use crate::{feed::{ChangeFeed, ChangeKind, Table}, AppState};

/// Pushes `refresh` to the browse page whenever a listing is posted.
#[debug_handler(state = AppState)]
pub(crate) async fn browse_ws(
    State(feed): State<ChangeFeed>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(async move |socket| refresh_on_insert(socket, feed).await)
}

async fn refresh_on_insert(mut socket: WebSocket, feed: ChangeFeed) {
    let mut inserts = feed.subscribe(Table::Listings, ChangeKind::Insert, None);

    loop {
        tokio::select! {
            row = inserts.next() => {
                if row.is_none() || socket.send(WsMessage::Text("refresh".into())).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => match incoming {
                Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
}
