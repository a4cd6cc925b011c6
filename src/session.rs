use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::config::Config;
use crate::coordinator::{Applied, FetchCoordinator};
use crate::error::{Result, SyncError};
use crate::events::{FetchPurpose, SyncEvent};
use crate::filter::filter_chats;
use crate::model::{Chat, Message};
use crate::reconciler::SendReconciler;
use crate::selection::Selection;
use crate::service::ChatService;
use crate::store::SnapshotStore;

/// Tunables the session needs from [`Config`].
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub page_size: usize,
    pub reconcile_delay: Duration,
}

impl From<&Config> for SessionOptions {
    fn from(config: &Config) -> Self {
        Self {
            page_size: config.page_size,
            reconcile_delay: Duration::from_millis(config.reconcile_delay_ms),
        }
    }
}

/// All client-side state for one session.
///
/// Owned by the event loop and mutated only through `&mut self`, one event at a
/// time. Renderers read it through the accessor methods.
pub struct Session {
    store: SnapshotStore,
    selection: Selection,
    coordinator: FetchCoordinator,
    reconciler: SendReconciler,
    events: mpsc::UnboundedSender<SyncEvent>,
    query: String,
    chats_error: Option<SyncError>,
    messages_error: Option<SyncError>,
    notice: Option<String>,
}

impl Session {
    pub fn new(
        service: Arc<dyn ChatService>,
        events: mpsc::UnboundedSender<SyncEvent>,
        options: SessionOptions,
    ) -> Self {
        Self {
            store: SnapshotStore::new(),
            selection: Selection::new(),
            coordinator: FetchCoordinator::new(service, events.clone(), options.page_size),
            reconciler: SendReconciler::new(options.reconcile_delay),
            events,
            query: String::new(),
            chats_error: None,
            messages_error: None,
            notice: None,
        }
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn active_chat_jid(&self) -> Option<&str> {
        self.selection.active()
    }

    pub fn active_chat(&self) -> Option<&Chat> {
        self.active_chat_jid()
            .and_then(|jid| self.store.find_chat(jid))
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn set_query(&mut self, query: &str) {
        self.query = query.to_string();
    }

    /// The sidebar: current query applied to the full chat snapshot.
    pub fn visible_chats(&self) -> Vec<&Chat> {
        filter_chats(self.store.chats(), &self.query)
    }

    /// The open thread, provisional messages last. Empty with no chat open.
    pub fn active_thread(&self) -> Vec<&Message> {
        match self.active_chat_jid() {
            Some(jid) => self.store.thread(jid),
            None => Vec::new(),
        }
    }

    pub fn chats_loading(&self) -> bool {
        self.coordinator.chats_loading()
    }

    pub fn messages_loading(&self) -> bool {
        self.active_chat_jid()
            .is_some_and(|jid| self.coordinator.messages_loading(jid))
    }

    pub fn chats_error(&self) -> Option<&SyncError> {
        self.chats_error.as_ref()
    }

    pub fn messages_error(&self) -> Option<&SyncError> {
        self.messages_error.as_ref()
    }

    /// Alert-level message for the user, cleared once read.
    pub fn take_notice(&mut self) -> Option<String> {
        self.notice.take()
    }

    pub fn is_sending(&self) -> bool {
        self.reconciler.in_flight()
    }

    #[cfg(test)]
    pub fn send_state(&self, provisional_id: &str) -> Option<&crate::reconciler::SendState> {
        self.reconciler.state(provisional_id)
    }

    /// Opens a chat. Any message fetch still in flight for the previous chat
    /// will be discarded when it lands.
    pub fn select(&mut self, chat_jid: &str) {
        let previous = self.selection.set(chat_jid);
        if previous.as_deref() != Some(chat_jid) {
            crate::info_log!("select: {:?} -> {}", previous, chat_jid);
            self.messages_error = None;
        }
        self.coordinator
            .refresh_messages(chat_jid, FetchPurpose::View);
    }

    pub fn refresh_chats(&mut self) {
        self.coordinator.refresh_chats();
    }

    /// Refreshes the open chat's messages, if any.
    pub fn refresh_messages(&mut self) {
        if let Some(jid) = self.selection.active().map(str::to_string) {
            self.coordinator.refresh_messages(&jid, FetchPurpose::View);
        }
    }

    /// Chat list plus the open chat. Used by both the timer and manual refresh.
    pub fn refresh_all(&mut self) {
        self.refresh_chats();
        self.refresh_messages();
    }

    /// Sends `text` to the open chat. The provisional message is in the thread
    /// before this returns. Returns its id.
    ///
    /// Empty text or no open chat is rejected without touching the network.
    pub fn submit(&mut self, text: &str) -> Result<String> {
        let chat_jid = match self.selection.active() {
            Some(jid) => jid.to_string(),
            None => {
                self.notice = Some(SyncError::NoActiveChat.to_string());
                return Err(SyncError::NoActiveChat);
            }
        };
        let text = text.trim();
        if text.is_empty() {
            return Err(SyncError::Validation("message is empty".to_string()));
        }

        let now = Utc::now();
        let provisional_id = self.reconciler.next_id(now);
        let ticket = self
            .coordinator
            .send_message(Some(&chat_jid), text, &provisional_id)?;
        self.reconciler
            .stage(&mut self.store, &ticket.provisional_id, &chat_jid, text, now);
        crate::debug_log!("submit: Staged {} in {}", provisional_id, chat_jid);
        Ok(provisional_id)
    }

    /// Applies one event to the session. Never fails; errors become session state.
    pub fn apply(&mut self, event: SyncEvent) {
        match event {
            SyncEvent::ChatsLoaded { ticket, result } => {
                match self.coordinator.apply_chats(&mut self.store, &ticket, result) {
                    Ok(Applied::Published) => self.chats_error = None,
                    Ok(_) => {}
                    Err(e) => {
                        crate::warn_log!("apply: Failed to load chats: {}", e);
                        self.chats_error = Some(e);
                    }
                }
            }
            SyncEvent::MessagesLoaded { ticket, result } => {
                let applied = self.coordinator.apply_messages(
                    &mut self.store,
                    &self.selection,
                    &ticket,
                    result,
                );
                match applied {
                    Ok(Applied::Published) | Ok(Applied::Stored) => {
                        if self.selection.is_active(&ticket.chat_jid) {
                            self.messages_error = None;
                        }
                        self.reconciler.on_snapshot_stored(
                            &mut self.store,
                            &ticket.chat_jid,
                            ticket.generation,
                        );
                    }
                    Ok(Applied::Discarded(_)) => {}
                    Err(e) => {
                        crate::warn_log!(
                            "apply: Failed to load messages for {}: {}",
                            ticket.chat_jid,
                            e
                        );
                        self.messages_error = Some(e);
                    }
                }
            }
            SyncEvent::SendFinished { ticket, result } => {
                let generation = self.coordinator.messages_generation(&ticket.chat_jid);
                if let Ok(ack) = &result {
                    crate::debug_log!(
                        "apply: Send {} acknowledged: {}",
                        ticket.provisional_id,
                        ack.message.as_deref().unwrap_or("ok")
                    );
                }
                let outcome = result.map(|_| ());
                if let Err(e) = &outcome {
                    self.notice = Some(format!("Failed to send message: {}", e));
                }
                let due = self
                    .reconciler
                    .on_send_result(&ticket.provisional_id, outcome, generation);
                if due {
                    self.reconciler.schedule_reconcile(
                        &self.events,
                        &ticket.chat_jid,
                        &ticket.provisional_id,
                    );
                }
            }
            SyncEvent::ReconcileDue {
                chat_jid,
                provisional_id,
            } => {
                if self.reconciler.needs_refresh(&provisional_id) {
                    self.coordinator
                        .refresh_messages(&chat_jid, FetchPurpose::Reconcile);
                }
            }
            SyncEvent::Tick => self.refresh_all(),
        }
    }
}
