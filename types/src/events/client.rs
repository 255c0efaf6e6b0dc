use crate::Item;

/// `conversation.item.create` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ConversationItemCreateEvent {
    /// The item to add to the conversation
    item: Item,
}

impl ConversationItemCreateEvent {
    pub fn new(item: Item) -> Self {
        Self { item }
    }
}

/// `response.create` event, asking for a response with the session's configuration
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ResponseCreateEvent {}

impl ResponseCreateEvent {
    pub fn new() -> Self {
        Self::default()
    }
}
