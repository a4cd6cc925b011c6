use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::error::{Result, SyncError};
use crate::events::{ChatsTicket, FetchPurpose, MessagesTicket, SendTicket, SyncEvent};
use crate::model::{Chat, Message};
use crate::selection::Selection;
use crate::service::ChatService;
use crate::store::SnapshotStore;

/// What happened to a response when it was applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    /// Stored and belongs to the current view.
    Published,
    /// Stored for a chat that is not open.
    Stored,
    Discarded(DiscardReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// A newer request for the same resource was issued after this one.
    Superseded,
    /// The chat is no longer open and nothing else waits on the data.
    NotActive,
}

/// Owns every outbound request. Each fetch bumps a per-resource generation;
/// only the response carrying the latest generation is ever applied.
///
/// Requests run on spawned tasks and report back through the event channel.
/// Nothing is aborted: a superseded response is computed and then ignored.
pub struct FetchCoordinator {
    service: Arc<dyn ChatService>,
    events: mpsc::UnboundedSender<SyncEvent>,
    page_size: usize,
    chats_generation: u64,
    chats_settled: u64,
    message_generations: HashMap<String, u64>,
    messages_settled: HashMap<String, u64>,
}

impl FetchCoordinator {
    pub fn new(
        service: Arc<dyn ChatService>,
        events: mpsc::UnboundedSender<SyncEvent>,
        page_size: usize,
    ) -> Self {
        Self {
            service,
            events,
            page_size,
            chats_generation: 0,
            chats_settled: 0,
            message_generations: HashMap::new(),
            messages_settled: HashMap::new(),
        }
    }

    /// Latest issued generation for a chat's messages, 0 if never fetched.
    pub fn messages_generation(&self, chat_jid: &str) -> u64 {
        self.message_generations.get(chat_jid).copied().unwrap_or(0)
    }

    /// True while the newest chat list request has not come back.
    pub fn chats_loading(&self) -> bool {
        self.chats_settled < self.chats_generation
    }

    pub fn messages_loading(&self, chat_jid: &str) -> bool {
        let settled = self.messages_settled.get(chat_jid).copied().unwrap_or(0);
        settled < self.messages_generation(chat_jid)
    }

    /// Issues a new chat list generation without dispatching it.
    pub fn begin_chats(&mut self) -> ChatsTicket {
        self.chats_generation += 1;
        ChatsTicket {
            generation: self.chats_generation,
        }
    }

    /// Issues a new message generation for `chat_jid` without dispatching it.
    pub fn begin_messages(&mut self, chat_jid: &str, purpose: FetchPurpose) -> MessagesTicket {
        let generation = self
            .message_generations
            .entry(chat_jid.to_string())
            .or_insert(0);
        *generation += 1;
        MessagesTicket {
            chat_jid: chat_jid.to_string(),
            generation: *generation,
            purpose,
        }
    }

    pub fn refresh_chats(&mut self) -> ChatsTicket {
        let ticket = self.begin_chats();
        crate::debug_log!("refresh_chats: Issued generation {}", ticket.generation);

        let service = Arc::clone(&self.service);
        let events = self.events.clone();
        let limit = self.page_size;
        let event_ticket = ticket.clone();
        tokio::spawn(async move {
            let result = service.list_chats(limit).await;
            let _ = events.send(SyncEvent::ChatsLoaded {
                ticket: event_ticket,
                result,
            });
        });
        ticket
    }

    pub fn refresh_messages(&mut self, chat_jid: &str, purpose: FetchPurpose) -> MessagesTicket {
        let ticket = self.begin_messages(chat_jid, purpose);
        crate::debug_log!(
            "refresh_messages: Issued generation {} for {} ({:?})",
            ticket.generation,
            chat_jid,
            purpose
        );

        let service = Arc::clone(&self.service);
        let events = self.events.clone();
        let limit = self.page_size;
        let event_ticket = ticket.clone();
        tokio::spawn(async move {
            let result = service
                .list_messages(&event_ticket.chat_jid, limit)
                .await;
            let _ = events.send(SyncEvent::MessagesLoaded {
                ticket: event_ticket,
                result,
            });
        });
        ticket
    }

    /// Validates and dispatches a send. Rejected input never reaches the network.
    pub fn send_message(
        &self,
        chat_jid: Option<&str>,
        text: &str,
        provisional_id: &str,
    ) -> Result<SendTicket> {
        let (chat_jid, text) = validate_send(chat_jid, text)?;
        let ticket = SendTicket {
            chat_jid: chat_jid.to_string(),
            provisional_id: provisional_id.to_string(),
        };

        let service = Arc::clone(&self.service);
        let events = self.events.clone();
        let event_ticket = ticket.clone();
        let text = text.to_string();
        tokio::spawn(async move {
            let result = service.send_message(&event_ticket.chat_jid, &text).await;
            let _ = events.send(SyncEvent::SendFinished {
                ticket: event_ticket,
                result,
            });
        });
        Ok(ticket)
    }

    /// Applies a chat list response. Superseded responses are dropped whether
    /// they succeeded or failed; on failure the previous snapshot stays.
    pub fn apply_chats(
        &mut self,
        store: &mut SnapshotStore,
        ticket: &ChatsTicket,
        result: Result<Vec<Chat>>,
    ) -> Result<Applied> {
        if ticket.generation != self.chats_generation {
            crate::debug_log!(
                "apply_chats: Discarding generation {} (current {})",
                ticket.generation,
                self.chats_generation
            );
            return Ok(Applied::Discarded(DiscardReason::Superseded));
        }
        self.chats_settled = ticket.generation;

        let chats = result?;
        crate::debug_log!("apply_chats: Publishing {} chats", chats.len());
        store.replace_chats(chats);
        Ok(Applied::Published)
    }

    /// Applies a message response for one chat.
    ///
    /// Stale generations are dropped. A view fetch for a chat that is no longer
    /// open is dropped too; a reconcile fetch is stored without becoming the view.
    pub fn apply_messages(
        &mut self,
        store: &mut SnapshotStore,
        selection: &Selection,
        ticket: &MessagesTicket,
        result: Result<Vec<Message>>,
    ) -> Result<Applied> {
        let current = self.messages_generation(&ticket.chat_jid);
        if ticket.generation != current {
            crate::debug_log!(
                "apply_messages: Discarding generation {} for {} (current {})",
                ticket.generation,
                ticket.chat_jid,
                current
            );
            return Ok(Applied::Discarded(DiscardReason::Superseded));
        }

        let active = selection.is_active(&ticket.chat_jid);
        if !active && ticket.purpose == FetchPurpose::View {
            crate::debug_log!(
                "apply_messages: Discarding response for {}, chat no longer active",
                ticket.chat_jid
            );
            return Ok(Applied::Discarded(DiscardReason::NotActive));
        }
        self.messages_settled
            .insert(ticket.chat_jid.clone(), ticket.generation);

        let messages = match result {
            Ok(messages) => messages,
            Err(e) if !active => {
                crate::warn_log!(
                    "apply_messages: Background refresh for {} failed: {}",
                    ticket.chat_jid,
                    e
                );
                return Ok(Applied::Discarded(DiscardReason::NotActive));
            }
            Err(e) => return Err(e),
        };

        crate::debug_log!(
            "apply_messages: Storing {} messages for {}",
            messages.len(),
            ticket.chat_jid
        );
        store.replace_messages(&ticket.chat_jid, messages);
        if active {
            Ok(Applied::Published)
        } else {
            Ok(Applied::Stored)
        }
    }
}

/// Checks a send request and returns the chat and trimmed text to send.
pub fn validate_send<'a>(chat_jid: Option<&'a str>, text: &'a str) -> Result<(&'a str, &'a str)> {
    let chat_jid = chat_jid.ok_or(SyncError::NoActiveChat)?;
    let text = text.trim();
    if text.is_empty() {
        return Err(SyncError::Validation("message is empty".to_string()));
    }
    Ok((chat_jid, text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::fake::{Call, FakeService};

    fn chat(jid: &str) -> Chat {
        Chat {
            jid: jid.to_string(),
            name: jid.to_string(),
            is_group: false,
            last_message: None,
            last_message_time: None,
            last_is_from_me: false,
            media_type: None,
        }
    }

    fn message(id: &str, chat_jid: &str) -> Message {
        Message {
            id: id.to_string(),
            chat_jid: chat_jid.to_string(),
            sender: "123".to_string(),
            content: Some("hi".to_string()),
            timestamp: "2030-01-01T10:00:00Z".to_string(),
            is_from_me: false,
            media_type: None,
            filename: None,
        }
    }

    fn coordinator() -> (FetchCoordinator, mpsc::UnboundedReceiver<SyncEvent>) {
        let (service, _calls) = FakeService::new();
        let (tx, rx) = mpsc::unbounded_channel();
        (FetchCoordinator::new(Arc::new(service), tx, 100), rx)
    }

    #[test]
    fn test_stale_chat_response_never_overwrites() {
        let (mut coordinator, _rx) = coordinator();
        let mut store = SnapshotStore::new();

        let first = coordinator.begin_chats();
        let second = coordinator.begin_chats();

        let applied = coordinator
            .apply_chats(&mut store, &second, Ok(vec![chat("chat2")]))
            .unwrap();
        assert_eq!(applied, Applied::Published);

        let applied = coordinator
            .apply_chats(&mut store, &first, Ok(vec![chat("chat1")]))
            .unwrap();
        assert_eq!(applied, Applied::Discarded(DiscardReason::Superseded));
        assert_eq!(store.chats(), &[chat("chat2")]);
    }

    #[test]
    fn test_failed_refresh_keeps_previous_snapshot() {
        let (mut coordinator, _rx) = coordinator();
        let mut store = SnapshotStore::new();

        let ticket = coordinator.begin_chats();
        coordinator
            .apply_chats(&mut store, &ticket, Ok(vec![chat("a")]))
            .unwrap();

        let ticket = coordinator.begin_chats();
        assert!(coordinator.chats_loading());
        let err = coordinator
            .apply_chats(&mut store, &ticket, Err(SyncError::Transport("down".into())))
            .unwrap_err();
        assert_eq!(err, SyncError::Transport("down".into()));
        assert!(!coordinator.chats_loading());
        assert_eq!(store.chats(), &[chat("a")]);
    }

    #[test]
    fn test_stale_failure_is_silent() {
        let (mut coordinator, _rx) = coordinator();
        let mut store = SnapshotStore::new();
        let old = coordinator.begin_chats();
        let _new = coordinator.begin_chats();
        let applied = coordinator
            .apply_chats(&mut store, &old, Err(SyncError::Server("boom".into())))
            .unwrap();
        assert_eq!(applied, Applied::Discarded(DiscardReason::Superseded));
    }

    #[test]
    fn test_message_generations_are_per_chat() {
        let (mut coordinator, _rx) = coordinator();
        let a1 = coordinator.begin_messages("a", FetchPurpose::View);
        let b1 = coordinator.begin_messages("b", FetchPurpose::View);
        let a2 = coordinator.begin_messages("a", FetchPurpose::View);
        assert_eq!(a1.generation, 1);
        assert_eq!(b1.generation, 1);
        assert_eq!(a2.generation, 2);
        assert_eq!(coordinator.messages_generation("c"), 0);
    }

    #[test]
    fn test_view_response_for_inactive_chat_is_discarded() {
        let (mut coordinator, _rx) = coordinator();
        let mut store = SnapshotStore::new();
        let mut selection = Selection::new();

        selection.set("x");
        let ticket = coordinator.begin_messages("x", FetchPurpose::View);
        selection.set("y");

        let applied = coordinator
            .apply_messages(&mut store, &selection, &ticket, Ok(vec![message("1", "x")]))
            .unwrap();
        assert_eq!(applied, Applied::Discarded(DiscardReason::NotActive));
        assert!(store.messages("x").is_none());
    }

    #[test]
    fn test_reconcile_response_for_inactive_chat_is_stored() {
        let (mut coordinator, _rx) = coordinator();
        let mut store = SnapshotStore::new();
        let mut selection = Selection::new();

        selection.set("y");
        let ticket = coordinator.begin_messages("x", FetchPurpose::Reconcile);
        let applied = coordinator
            .apply_messages(&mut store, &selection, &ticket, Ok(vec![message("1", "x")]))
            .unwrap();
        assert_eq!(applied, Applied::Stored);
        assert_eq!(store.messages("x").unwrap().len(), 1);
    }

    #[test]
    fn test_active_message_failure_surfaces_error() {
        let (mut coordinator, _rx) = coordinator();
        let mut store = SnapshotStore::new();
        let mut selection = Selection::new();
        selection.set("x");

        let ticket = coordinator.begin_messages("x", FetchPurpose::View);
        let err = coordinator
            .apply_messages(&mut store, &selection, &ticket, Err(SyncError::Server("nope".into())))
            .unwrap_err();
        assert_eq!(err, SyncError::Server("nope".into()));
        assert!(!coordinator.messages_loading("x"));
    }

    #[test]
    fn test_validate_send() {
        assert_eq!(validate_send(None, "hi"), Err(SyncError::NoActiveChat));
        assert!(matches!(
            validate_send(Some("a"), "   \n\t"),
            Err(SyncError::Validation(_))
        ));
        assert_eq!(validate_send(Some("a"), "  hi  "), Ok(("a", "hi")));
    }

    #[tokio::test]
    async fn test_refresh_dispatches_and_reports_back() {
        let (service, mut calls) = FakeService::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut coordinator = FetchCoordinator::new(Arc::new(service), tx, 100);

        let ticket = coordinator.refresh_chats();
        let pending = calls.recv().await.unwrap();
        assert_eq!(pending.call, Call::Chats { limit: 100 });
        pending.reply_chats(Ok(vec![chat("a")]));

        match rx.recv().await.unwrap() {
            SyncEvent::ChatsLoaded { ticket: got, result } => {
                assert_eq!(got, ticket);
                assert_eq!(result.unwrap(), vec![chat("a")]);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_send_sends_trimmed_text() {
        let (service, mut calls) = FakeService::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let coordinator = FetchCoordinator::new(Arc::new(service), tx, 100);

        coordinator
            .send_message(Some("a"), "  hello  ", "temp-1-0")
            .unwrap();
        let pending = calls.recv().await.unwrap();
        assert_eq!(
            pending.call,
            Call::Send {
                chat_jid: "a".to_string(),
                text: "hello".to_string()
            }
        );
    }
}
