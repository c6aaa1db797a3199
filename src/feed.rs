//! In-process change feed: row-level events per table, with optional
//! single-column equality filters on the subscriber side.

use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

use crate::db::{Listing, Message, Profile};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Listings,
    Messages,
    Profiles,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Row {
    Listing(Listing),
    Message(Message),
    Profile(Profile),
}

impl Row {
    pub fn table(&self) -> Table {
        match self {
            Row::Listing(_) => Table::Listings,
            Row::Message(_) => Table::Messages,
            Row::Profile(_) => Table::Profiles,
        }
    }

    /// Text value of a filterable column.
    pub fn column(&self, name: &str) -> Option<String> {
        match (self, name) {
            (Row::Listing(l), "id") => Some(l.id.to_string()),
            (Row::Listing(l), "user_id") => Some(l.user_id.to_string()),
            (Row::Listing(l), "category") => Some(l.category.to_string()),
            (Row::Listing(l), "school") => Some(l.school.to_string()),
            (Row::Message(m), "id") => Some(m.id.to_string()),
            (Row::Message(m), "listing_id") => Some(m.listing_id.to_string()),
            (Row::Message(m), "sender_id") => Some(m.sender_id.to_string()),
            (Row::Message(m), "receiver_id") => Some(m.receiver_id.to_string()),
            (Row::Profile(p), "id") => Some(p.id.to_string()),
            (Row::Profile(p), "school") => Some(p.school.to_string()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Change {
    pub kind: ChangeKind,
    pub row: Row,
}

/// `column = value`. Rows without the column never match.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    column: &'static str,
    value: String,
}

impl Filter {
    pub fn eq(column: &'static str, value: impl ToString) -> Self {
        Self {
            column,
            value: value.to_string(),
        }
    }

    fn matches(&self, row: &Row) -> bool {
        row.column(self.column).as_deref() == Some(self.value.as_str())
    }
}

#[derive(Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<Change>,
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(256)
    }
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        Self {
            tx: broadcast::channel(capacity).0,
        }
    }

    pub fn insert(&self, row: Row) {
        self.publish(Change {
            kind: ChangeKind::Insert,
            row,
        });
    }

    pub fn update(&self, row: Row) {
        self.publish(Change {
            kind: ChangeKind::Update,
            row,
        });
    }

    fn publish(&self, change: Change) {
        // no subscribers is not an error
        let _ = self.tx.send(change);
    }

    /// Starts receiving `kind` events on `table`. Events published before this call
    /// are not delivered. Dropping the subscription releases it.
    pub fn subscribe(&self, table: Table, kind: ChangeKind, filter: Option<Filter>) -> Subscription {
        debug!(?table, ?kind, ?filter, "change feed subscription opened");
        Subscription {
            rx: self.tx.subscribe(),
            table,
            kind,
            filter,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

pub struct Subscription {
    rx: broadcast::Receiver<Change>,
    table: Table,
    kind: ChangeKind,
    filter: Option<Filter>,
}

impl Subscription {
    fn accepts(&self, change: &Change) -> bool {
        change.kind == self.kind
            && change.row.table() == self.table
            && self.filter.as_ref().is_none_or(|filter| filter.matches(&change.row))
    }

    /// Next matching row, or `None` once the feed is gone.
    pub async fn next(&mut self) -> Option<Row> {
        loop {
            match self.rx.recv().await {
                Ok(change) if self.accepts(&change) => return Some(change.row),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(table = ?self.table, skipped, "change feed subscriber lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        debug!(table = ?self.table, "change feed subscription released");
    }
}

#[cfg(test)]
mod tests {
    use time::OffsetDateTime;
    use uuid::Uuid;

    use super::*;

    fn message(listing_id: Uuid) -> Message {
        Message {
            id: Uuid::now_v7(),
            listing_id,
            sender_id: Uuid::now_v7(),
            receiver_id: Uuid::now_v7(),
            content: "is this still available?".to_owned(),
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[tokio::test]
    async fn filtered_subscription_skips_other_rows() {
        let feed = ChangeFeed::default();
        let listing = Uuid::now_v7();
        let mut sub = feed.subscribe(
            Table::Messages,
            ChangeKind::Insert,
            Some(Filter::eq("listing_id", listing)),
        );

        feed.insert(Row::Message(message(Uuid::now_v7())));
        let wanted = message(listing);
        feed.update(Row::Message(wanted.clone()));
        feed.insert(Row::Message(wanted.clone()));

        assert_eq!(sub.next().await, Some(Row::Message(wanted)));
    }

    #[tokio::test]
    async fn dropping_subscription_releases_it() {
        let feed = ChangeFeed::default();
        assert_eq!(feed.subscriber_count(), 0);

        let sub = feed.subscribe(Table::Listings, ChangeKind::Insert, None);
        assert_eq!(feed.subscriber_count(), 1);

        drop(sub);
        assert_eq!(feed.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn closed_feed_ends_subscription() {
        let feed = ChangeFeed::default();
        let mut sub = feed.subscribe(Table::Listings, ChangeKind::Insert, None);
        drop(feed);
        assert_eq!(sub.next().await, None);
    }

    #[test]
    fn unknown_column_never_matches() {
        let row = Row::Message(message(Uuid::now_v7()));
        assert!(!Filter::eq("school", "The Hockaday School").matches(&row));
    }
}
