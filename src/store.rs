use std::collections::HashMap;

use crate::model::{Chat, Message};

/// Latest fetched snapshots plus the client-only provisional layer.
///
/// Fetched collections are only ever replaced whole. Provisional messages live
/// in their own map and are never written into the fetched collections.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    chats: Vec<Chat>,
    chats_loaded: bool,
    messages: HashMap<String, Vec<Message>>,
    provisional: HashMap<String, Vec<Message>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chats(&self) -> &[Chat] {
        &self.chats
    }

    /// False until the first chat list fetch succeeds.
    pub fn chats_loaded(&self) -> bool {
        self.chats_loaded
    }

    pub fn find_chat(&self, jid: &str) -> Option<&Chat> {
        self.chats.iter().find(|c| c.jid == jid)
    }

    pub fn replace_chats(&mut self, chats: Vec<Chat>) {
        self.chats = chats;
        self.chats_loaded = true;
    }

    /// Server-backed messages for a chat, `None` if never fetched.
    pub fn messages(&self, chat_jid: &str) -> Option<&[Message]> {
        self.messages.get(chat_jid).map(Vec::as_slice)
    }

    pub fn replace_messages(&mut self, chat_jid: &str, messages: Vec<Message>) {
        self.messages.insert(chat_jid.to_string(), messages);
    }

    pub fn provisional(&self, chat_jid: &str) -> &[Message] {
        self.provisional
            .get(chat_jid)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn push_provisional(&mut self, message: Message) {
        self.provisional
            .entry(message.chat_jid.clone())
            .or_default()
            .push(message);
    }

    /// Drops one provisional message. Returns whether it was present.
    pub fn remove_provisional(&mut self, chat_jid: &str, id: &str) -> bool {
        let Some(list) = self.provisional.get_mut(chat_jid) else {
            return false;
        };
        let before = list.len();
        list.retain(|m| m.id != id);
        let removed = list.len() != before;
        if list.is_empty() {
            self.provisional.remove(chat_jid);
        }
        removed
    }

    /// The thread as displayed: fetched messages in server order, then provisional
    /// messages in send order regardless of their timestamps.
    pub fn thread(&self, chat_jid: &str) -> Vec<&Message> {
        self.messages
            .get(chat_jid)
            .into_iter()
            .flatten()
            .chain(self.provisional(chat_jid))
            .collect()
    }
}
