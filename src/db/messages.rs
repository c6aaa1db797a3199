use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

use crate::feed::{ChangeFeed, Row};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Message {
    pub id: Uuid,
    pub listing_id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Message {
    /// Whichever side of the message is not `viewer`.
    pub fn counterpart(&self, viewer: Uuid) -> Uuid {
        if self.sender_id == viewer {
            self.receiver_id
        } else {
            self.sender_id
        }
    }

    /// True if the message was exchanged between `a` and `b`, in either direction.
    pub fn is_between(&self, a: Uuid, b: Uuid) -> bool {
        (self.sender_id == a && self.receiver_id == b) || (self.sender_id == b && self.receiver_id == a)
    }
}

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub listing_id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub content: String,
}

const COLUMNS: &str = "id,listing_id,sender_id,receiver_id,content,created_at";

/// Inserts the message and announces it on the change feed.
pub async fn send(
    db_pool: &SqlitePool,
    feed: &ChangeFeed,
    NewMessage { listing_id, sender_id, receiver_id, content }: NewMessage,
) -> Result<Message, sqlx::Error> {
    let message: Message = sqlx::query_as(&format!(
        "INSERT INTO messages ({COLUMNS}) VALUES (?,?,?,?,?,?) RETURNING {COLUMNS}"
    ))
    .bind(Uuid::now_v7())
    .bind(listing_id)
    .bind(sender_id)
    .bind(receiver_id)
    .bind(&content)
    .bind(super::now()?)
    .fetch_one(db_pool)
    .await?;

    info!(message_id = %message.id, listing_id = %listing_id, "message sent");
    feed.insert(Row::Message(message.clone()));

    Ok(message)
}

/// Every message the user sent or received, in no particular order.
pub async fn involving(db_pool: &SqlitePool, user_id: Uuid) -> Result<Vec<Message>, sqlx::Error> {
    sqlx::query_as(&format!(
        "SELECT {COLUMNS} FROM messages WHERE sender_id=? OR receiver_id=?"
    ))
    .bind(user_id)
    .bind(user_id)
    .fetch_all(db_pool)
    .await
}

/// One conversation: the messages about `listing_id` between `viewer` and `counterpart`,
/// oldest first.
pub async fn conversation(
    db_pool: &SqlitePool,
    listing_id: Uuid,
    viewer: Uuid,
    counterpart: Uuid,
) -> Result<Vec<Message>, sqlx::Error> {
    sqlx::query_as(&format!(
        r#"SELECT {COLUMNS} FROM messages
        WHERE listing_id=?
            AND ((sender_id=? AND receiver_id=?) OR (sender_id=? AND receiver_id=?))
        ORDER BY created_at ASC"#
    ))
    .bind(listing_id)
    .bind(viewer)
    .bind(counterpart)
    .bind(counterpart)
    .bind(viewer)
    .fetch_all(db_pool)
    .await
}
