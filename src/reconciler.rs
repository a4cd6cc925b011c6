use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::error::SyncError;
use crate::events::SyncEvent;
use crate::model::{provisional_id, Message};
use crate::store::SnapshotStore;

/// Lifecycle of one outgoing message after the user submits it. A confirmed
/// send is no longer tracked; [`SendReconciler::on_snapshot_stored`]
/// reports it instead.
#[derive(Debug, Clone, PartialEq)]
pub enum SendState {
    /// Send request in flight.
    Sent,
    /// Server accepted it. A snapshot of the chat issued after `after_generation`
    /// can contain the server copy and confirms the send.
    Reconciling { after_generation: u64 },
    /// The send failed. The provisional copy stays until the next stored snapshot.
    Failed { error: SyncError },
}

#[derive(Debug, Clone)]
pub struct PendingSend {
    pub provisional_id: String,
    pub chat_jid: String,
    pub state: SendState,
    /// Whether the provisional copy is still in the store.
    pub shown: bool,
}

/// Optimistic send bookkeeping. Provisional messages live only in the store's
/// provisional layer; any stored snapshot of the chat replaces that layer, so the
/// server copy and the provisional copy never show together.
pub struct SendReconciler {
    sends: Vec<PendingSend>,
    next_seq: u64,
    delay: Duration,
}

impl SendReconciler {
    pub fn new(delay: Duration) -> Self {
        Self {
            sends: Vec::new(),
            next_seq: 0,
            delay,
        }
    }

    pub fn state(&self, provisional_id: &str) -> Option<&SendState> {
        self.find(provisional_id).map(|s| &s.state)
    }

    #[cfg(test)]
    pub fn tracked(&self) -> usize {
        self.sends.len()
    }

    /// True while any send request has not come back yet.
    pub fn in_flight(&self) -> bool {
        self.sends.iter().any(|s| s.state == SendState::Sent)
    }

    fn find(&self, provisional_id: &str) -> Option<&PendingSend> {
        self.sends.iter().find(|s| s.provisional_id == provisional_id)
    }

    fn find_mut(&mut self, provisional_id: &str) -> Option<&mut PendingSend> {
        self.sends
            .iter_mut()
            .find(|s| s.provisional_id == provisional_id)
    }

    /// Next provisional id. Ids are never reused within a session.
    pub fn next_id(&mut self, now: DateTime<Utc>) -> String {
        let id = provisional_id(now, self.next_seq);
        self.next_seq += 1;
        id
    }

    /// Shows the provisional message at the end of the chat's thread and starts tracking the send.
    pub fn stage(
        &mut self,
        store: &mut SnapshotStore,
        provisional_id: &str,
        chat_jid: &str,
        text: &str,
        now: DateTime<Utc>,
    ) {
        store.push_provisional(Message::provisional(
            provisional_id.to_string(),
            chat_jid,
            text,
            now,
        ));
        self.sends.push(PendingSend {
            provisional_id: provisional_id.to_string(),
            chat_jid: chat_jid.to_string(),
            state: SendState::Sent,
            shown: true,
        });
    }

    /// Records the server acknowledgment. `current_generation` is the chat's latest
    /// issued message generation at this moment. Returns true when a delayed refresh is due.
    pub fn on_send_result(
        &mut self,
        provisional_id: &str,
        result: Result<(), SyncError>,
        current_generation: u64,
    ) -> bool {
        let Some(send) = self.find_mut(provisional_id) else {
            crate::warn_log!("on_send_result: Unknown provisional id {}", provisional_id);
            return false;
        };
        let due = match result {
            Ok(()) => {
                send.state = SendState::Reconciling {
                    after_generation: current_generation,
                };
                true
            }
            Err(error) => {
                crate::warn_log!("on_send_result: Send {} failed: {}", provisional_id, error);
                send.state = SendState::Failed { error };
                false
            }
        };
        self.prune();
        due
    }

    /// Delivers `ReconcileDue` for the send after the configured delay. The
    /// refresh it triggers targets the chat the message was sent to.
    pub fn schedule_reconcile(
        &self,
        events: &mpsc::UnboundedSender<SyncEvent>,
        chat_jid: &str,
        provisional_id: &str,
    ) {
        let events = events.clone();
        let delay = self.delay;
        let chat_jid = chat_jid.to_string();
        let provisional_id = provisional_id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(SyncEvent::ReconcileDue {
                chat_jid,
                provisional_id,
            });
        });
    }

    /// Whether a reconcile timer still has work to do for this send.
    pub fn needs_refresh(&self, provisional_id: &str) -> bool {
        matches!(
            self.state(provisional_id),
            Some(SendState::Reconciling { .. })
        )
    }

    /// Called after a message snapshot with `generation` replaced `chat_jid`'s thread.
    ///
    /// Every provisional copy in the chat is dropped: the snapshot is authoritative.
    /// Sends acknowledged before `generation` was issued are confirmed and forgotten.
    /// Returns the confirmed ids.
    pub fn on_snapshot_stored(
        &mut self,
        store: &mut SnapshotStore,
        chat_jid: &str,
        generation: u64,
    ) -> Vec<String> {
        let mut confirmed = Vec::new();
        for send in self.sends.iter_mut().filter(|s| s.chat_jid == chat_jid) {
            if send.shown {
                store.remove_provisional(chat_jid, &send.provisional_id);
                send.shown = false;
            }
            if let SendState::Reconciling { after_generation } = send.state {
                if generation > after_generation {
                    confirmed.push(send.provisional_id.clone());
                }
            }
        }
        self.sends.retain(|s| !confirmed.contains(&s.provisional_id));
        self.prune();
        if !confirmed.is_empty() {
            crate::debug_log!(
                "on_snapshot_stored: Confirmed {} message(s) in {}",
                confirmed.len(),
                chat_jid
            );
        }
        confirmed
    }

    /// Forgets failed sends whose provisional copy is gone.
    fn prune(&mut self) {
        self.sends
            .retain(|s| s.shown || !matches!(s.state, SendState::Failed { .. }));
    }
}
