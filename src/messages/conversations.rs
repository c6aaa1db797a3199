use std::collections::{hash_map::Entry, HashMap};

use uuid::Uuid;

use crate::db::Message;

/// Messages about one listing exchanged with one counterpart.
#[derive(Debug, Clone, PartialEq)]
pub struct Conversation {
    pub listing_id: Uuid,
    pub counterpart_id: Uuid,
    /// Greatest `created_at`; the first one seen wins ties.
    pub last_message: Message,
    pub messages: Vec<Message>,
}

/// Groups the viewer's messages by (listing, counterpart) in one pass.
/// The output is in no particular order.
pub fn group_conversations(messages: impl IntoIterator<Item = Message>, viewer: Uuid) -> Vec<Conversation> {
    let mut conversations: HashMap<(Uuid, Uuid), Conversation> = HashMap::new();

    for message in messages {
        let key = (message.listing_id, message.counterpart(viewer));
        match conversations.entry(key) {
            Entry::Occupied(mut entry) => {
                let conversation = entry.get_mut();
                if message.created_at > conversation.last_message.created_at {
                    conversation.last_message = message.clone();
                }
                conversation.messages.push(message);
            }
            Entry::Vacant(entry) => {
                entry.insert(Conversation {
                    listing_id: key.0,
                    counterpart_id: key.1,
                    last_message: message.clone(),
                    messages: vec![message],
                });
            }
        }
    }

    conversations.into_values().collect()
}
