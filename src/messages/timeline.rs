//! What one chat view shows: confirmed messages plus the sends still in flight.
//! A pending send is keyed by the client's id until the stored row replaces it.

use std::collections::HashSet;

use time::OffsetDateTime;
use uuid::Uuid;

use crate::db::Message;

#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    /// Message id, or `optimistic-{client id}` while the send is pending.
    pub id: String,
    pub sender_id: Uuid,
    pub content: String,
    pub created_at: OffsetDateTime,
    pub optimistic: bool,
}

impl From<&Message> for Entry {
    fn from(message: &Message) -> Self {
        Self {
            id: message.id.to_string(),
            sender_id: message.sender_id,
            content: message.content.clone(),
            created_at: message.created_at,
            optimistic: false,
        }
    }
}

pub fn optimistic_id(client_id: &str) -> String {
    format!("optimistic-{client_id}")
}

#[derive(Debug, Default)]
pub struct Timeline {
    entries: Vec<Entry>,
}

impl Timeline {
    pub fn from_history(history: &[Message]) -> Self {
        Self {
            entries: history.iter().map(Entry::from).collect(),
        }
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.entries.iter().position(|entry| entry.id == id)
    }

    /// Appends a placeholder for a send that has not been stored yet.
    pub fn push_optimistic(&mut self, client_id: &str, sender_id: Uuid, content: &str) {
        self.entries.push(Entry {
            id: optimistic_id(client_id),
            sender_id,
            content: content.to_owned(),
            created_at: OffsetDateTime::now_utc(),
            optimistic: true,
        });
    }

    /// Swaps the placeholder for the stored row in place. If the row already came in
    /// through the feed the placeholder is just dropped.
    pub fn confirm(&mut self, client_id: &str, message: &Message) {
        let placeholder = self.position(&optimistic_id(client_id));
        let arrived = self.position(&message.id.to_string()).is_some();

        match (placeholder, arrived) {
            (Some(index), false) => self.entries[index] = Entry::from(message),
            (Some(index), true) => {
                self.entries.remove(index);
            }
            (None, false) => self.entries.push(Entry::from(message)),
            (None, true) => {}
        }
    }

    /// Drops the placeholder of a send that was refused.
    pub fn fail(&mut self, client_id: &str) -> Option<Entry> {
        let index = self.position(&optimistic_id(client_id))?;
        Some(self.entries.remove(index))
    }

    /// Admits a row from the change feed unless it is already shown.
    pub fn apply(&mut self, message: &Message) -> bool {
        if self.position(&message.id.to_string()).is_some() {
            return false;
        }
        self.entries.push(Entry::from(message));
        true
    }

    /// Entries in display order, one per id.
    pub fn visible(&self) -> Vec<&Entry> {
        let mut seen = HashSet::new();
        self.entries
            .iter()
            .filter(|entry| seen.insert(entry.id.as_str()))
            .collect()
    }
}
