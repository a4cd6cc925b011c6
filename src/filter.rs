use crate::model::Chat;

/// Chats whose name, jid or last message contain `query`, case-insensitively, in snapshot order.
///
/// Always run against the full snapshot, never a previous result.
pub fn filter_chats<'a>(chats: &'a [Chat], query: &str) -> Vec<&'a Chat> {
    let needle = query.to_lowercase();
    chats
        .iter()
        .filter(|chat| matches_query(chat, &needle))
        .collect()
}

/// `needle` must already be lowercased.
fn matches_query(chat: &Chat, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    chat.name.to_lowercase().contains(needle)
        || chat.jid.to_lowercase().contains(needle)
        || chat
            .last_message
            .as_deref()
            .is_some_and(|m| m.to_lowercase().contains(needle))
}
