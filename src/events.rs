//! Events delivered to the session's event loop.
//!
//! Network completions, reconcile timers and scheduler ticks all arrive on one
//! unbounded channel and are applied one at a time with `&mut Session`.

use crate::error::Result;
use crate::model::{Chat, Message, SendAck};

/// Why a message fetch was issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPurpose {
    /// User selection, manual refresh or timer tick. Dropped if the chat is no longer open.
    View,
    /// Delayed refresh after a successful send. Stored even if the chat is no longer open.
    Reconcile,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatsTicket {
    pub generation: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessagesTicket {
    pub chat_jid: String,
    pub generation: u64,
    pub purpose: FetchPurpose,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendTicket {
    pub chat_jid: String,
    pub provisional_id: String,
}

#[derive(Debug)]
pub enum SyncEvent {
    ChatsLoaded {
        ticket: ChatsTicket,
        result: Result<Vec<Chat>>,
    },
    MessagesLoaded {
        ticket: MessagesTicket,
        result: Result<Vec<Message>>,
    },
    SendFinished {
        ticket: SendTicket,
        result: Result<SendAck>,
    },
    /// The post-send delay elapsed for a provisional message.
    ReconcileDue {
        chat_jid: String,
        provisional_id: String,
    },
    /// Periodic refresh from the scheduler.
    Tick,
}
