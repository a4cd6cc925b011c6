/// Which chat is open. `Session::select` is the only writer.
#[derive(Debug, Default, Clone)]
pub struct Selection {
    active_chat_jid: Option<String>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> Option<&str> {
        self.active_chat_jid.as_deref()
    }

    pub fn is_active(&self, chat_jid: &str) -> bool {
        self.active() == Some(chat_jid)
    }

    /// Sets the active chat and returns the previously active one.
    pub(crate) fn set(&mut self, chat_jid: &str) -> Option<String> {
        self.active_chat_jid.replace(chat_jid.to_string())
    }
}
