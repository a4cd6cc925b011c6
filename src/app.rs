use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use crate::config::Config;
use crate::error::SyncError;
use crate::events::SyncEvent;
use crate::scheduler::{SyncScheduler, VisibilityFlag};
use crate::service::ChatService;
use crate::session::{Session, SessionOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    ChatList,
    Search,
    Input,
}

pub struct App {
    pub config: Config,
    pub session: Session,
    pub visibility: VisibilityFlag,
    events_rx: mpsc::UnboundedReceiver<SyncEvent>,
    pub focus: Focus,
    pub cursor: usize,
    pub input_buffer: String,
    pub status_message: Option<String>,
    pub status_expire: Option<Instant>,
    pub needs_redraw: bool,
}

impl App {
    /// Builds the session, starts the poll timer and issues the startup chat load.
    pub fn new(config: Config, service: Arc<dyn ChatService>) -> Result<Self> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let mut session = Session::new(service, events_tx.clone(), SessionOptions::from(&config));

        let visibility = VisibilityFlag::new(true);
        SyncScheduler::new(
            Duration::from_secs(config.poll_interval_secs),
            Arc::new(visibility.clone()),
        )
        .spawn(events_tx);

        session.refresh_chats();

        Ok(Self {
            config,
            session,
            visibility,
            events_rx,
            focus: Focus::ChatList,
            cursor: 0,
            input_buffer: String::new(),
            status_message: None,
            status_expire: None,
            needs_redraw: true,
        })
    }

    pub fn notify(&mut self, message: &str) {
        self.notify_with_duration(message, 4);
    }

    pub fn notify_with_duration(&mut self, message: &str, duration_secs: u64) {
        self.status_message = Some(message.to_string());
        self.status_expire = Some(Instant::now() + Duration::from_secs(duration_secs));
        self.needs_redraw = true;
    }

    pub fn expire_status(&mut self) {
        if let Some(expire) = self.status_expire {
            if Instant::now() >= expire {
                self.status_message = None;
                self.status_expire = None;
                self.needs_redraw = true;
            }
        }
    }

    /// Applies every event that has arrived since the last call. Returns whether anything changed.
    pub fn process_sync_events(&mut self) -> bool {
        let mut changed = false;
        while let Ok(event) = self.events_rx.try_recv() {
            self.session.apply(event);
            changed = true;
        }
        if changed {
            self.clamp_cursor();
            if let Some(notice) = self.session.take_notice() {
                self.notify_with_duration(&notice, 6);
            }
        }
        changed
    }

    pub fn set_visible(&mut self, visible: bool) {
        crate::debug_log!("set_visible: {}", visible);
        self.visibility.set(visible);
    }

    fn clamp_cursor(&mut self) {
        let len = self.session.visible_chats().len();
        if len == 0 {
            self.cursor = 0;
        } else if self.cursor >= len {
            self.cursor = len - 1;
        }
    }

    /// Handles a key press. Returns false when the app should quit.
    pub fn handle_key(&mut self, key: KeyEvent) -> bool {
        self.needs_redraw = true;
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Char('q') if ctrl => return false,
            KeyCode::Char('r') if ctrl => {
                self.session.refresh_all();
                self.notify_with_duration("Refreshing...", 2);
            }
            KeyCode::Tab => self.cycle_focus(),
            KeyCode::Esc => self.handle_esc(),
            KeyCode::Up => self.move_cursor(-1),
            KeyCode::Down => self.move_cursor(1),
            KeyCode::Enter => self.handle_enter(),
            KeyCode::Backspace => self.handle_backspace(),
            KeyCode::Char('/') if self.focus == Focus::ChatList => {
                self.focus = Focus::Search;
            }
            KeyCode::Char(c) if !ctrl => self.handle_char(c),
            _ => {}
        }
        true
    }

    pub fn cycle_focus(&mut self) {
        self.focus = match self.focus {
            Focus::ChatList | Focus::Search => Focus::Input,
            Focus::Input => Focus::ChatList,
        };
    }

    fn handle_esc(&mut self) {
        if self.focus == Focus::Search {
            self.session.set_query("");
            self.clamp_cursor();
        }
        self.focus = Focus::ChatList;
    }

    fn move_cursor(&mut self, delta: isize) {
        if self.focus == Focus::Input {
            return;
        }
        let len = self.session.visible_chats().len();
        if len == 0 {
            return;
        }
        let next = self.cursor as isize + delta;
        self.cursor = next.clamp(0, len as isize - 1) as usize;
    }

    fn handle_enter(&mut self) {
        match self.focus {
            Focus::ChatList | Focus::Search => self.open_chat_at_cursor(),
            Focus::Input => self.submit_input(),
        }
    }

    pub fn open_chat_at_cursor(&mut self) {
        let jid = self
            .session
            .visible_chats()
            .get(self.cursor)
            .map(|c| c.jid.clone());
        if let Some(jid) = jid {
            self.session.select(&jid);
            self.focus = Focus::Input;
        }
    }

    /// Input stays locked while a send is in flight.
    pub fn submit_input(&mut self) {
        if self.session.is_sending() {
            return;
        }
        match self.session.submit(&self.input_buffer) {
            Ok(_) => self.input_buffer.clear(),
            Err(SyncError::Validation(_)) => {}
            Err(e) => {
                let notice = self.session.take_notice().unwrap_or_else(|| e.to_string());
                self.notify(&notice);
            }
        }
    }

    fn handle_char(&mut self, c: char) {
        match self.focus {
            Focus::Search => {
                let mut query = self.session.query().to_string();
                query.push(c);
                self.session.set_query(&query);
                self.cursor = 0;
            }
            Focus::Input if !self.session.is_sending() => self.input_buffer.push(c),
            _ => {}
        }
    }

    fn handle_backspace(&mut self) {
        match self.focus {
            Focus::Search => {
                let mut query = self.session.query().to_string();
                query.pop();
                self.session.set_query(&query);
                self.clamp_cursor();
            }
            Focus::Input if !self.session.is_sending() => {
                self.input_buffer.pop();
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Chat;
    use crate::service::fake::{Call, FakeService, PendingCall};
    use crossterm::event::KeyEventKind;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new_with_kind(code, KeyModifiers::NONE, KeyEventKind::Press)
    }

    fn chat(jid: &str, name: &str) -> Chat {
        Chat {
            jid: jid.to_string(),
            name: name.to_string(),
            is_group: false,
            last_message: None,
            last_message_time: None,
            last_is_from_me: false,
            media_type: None,
        }
    }

    async fn loaded_app() -> (App, mpsc::UnboundedReceiver<PendingCall>) {
        let (service, mut calls) = FakeService::new();
        let mut app = App::new(Config::default(), Arc::new(service)).unwrap();
        let startup = calls.recv().await.unwrap();
        assert_eq!(startup.call, Call::Chats { limit: 100 });
        startup.reply_chats(Ok(vec![chat("a", "Alice"), chat("b", "Bob")]));
        while !app.process_sync_events() {
            tokio::task::yield_now().await;
        }
        (app, calls)
    }

    #[tokio::test]
    async fn test_search_then_open() {
        let (mut app, mut calls) = loaded_app().await;
        app.handle_key(key(KeyCode::Char('/')));
        assert_eq!(app.focus, Focus::Search);
        for c in "bo".chars() {
            app.handle_key(key(KeyCode::Char(c)));
        }
        assert_eq!(app.session.visible_chats().len(), 1);

        app.handle_key(key(KeyCode::Enter));
        assert_eq!(app.session.active_chat_jid(), Some("b"));
        assert_eq!(app.focus, Focus::Input);
        assert_eq!(
            calls.recv().await.unwrap().call,
            Call::Messages {
                chat_jid: "b".to_string(),
                limit: 100
            }
        );
    }

    #[tokio::test]
    async fn test_typing_and_sending_clears_input() {
        let (mut app, mut calls) = loaded_app().await;
        app.handle_key(key(KeyCode::Enter));
        let _load = calls.recv().await.unwrap();

        for c in "hi".chars() {
            app.handle_key(key(KeyCode::Char(c)));
        }
        app.handle_key(key(KeyCode::Enter));
        assert!(app.input_buffer.is_empty());
        assert_eq!(
            app.session.active_thread().last().unwrap().content.as_deref(),
            Some("hi")
        );

        // Locked until the send comes back.
        app.handle_key(key(KeyCode::Char('x')));
        assert!(app.input_buffer.is_empty());
    }

    #[tokio::test]
    async fn test_send_without_chat_shows_notice() {
        let (mut app, _calls) = loaded_app().await;
        app.focus = Focus::Input;
        app.input_buffer = "hello".to_string();
        app.handle_key(key(KeyCode::Enter));
        assert_eq!(app.status_message.as_deref(), Some("Please select a chat first"));
        assert_eq!(app.input_buffer, "hello");
    }

    #[tokio::test]
    async fn test_ctrl_q_quits() {
        let (mut app, _calls) = loaded_app().await;
        let quit = KeyEvent::new_with_kind(KeyCode::Char('q'), KeyModifiers::CONTROL, KeyEventKind::Press);
        assert!(!app.handle_key(quit));
        assert!(app.handle_key(key(KeyCode::Down)));
        assert_eq!(app.cursor, 1);
        app.handle_key(key(KeyCode::Down));
        assert_eq!(app.cursor, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_refresh_keeps_poll_schedule() {
        let (mut app, mut calls) = loaded_app().await;

        tokio::time::sleep(Duration::from_secs(10)).await;
        let refresh = KeyEvent::new_with_kind(KeyCode::Char('r'), KeyModifiers::CONTROL, KeyEventKind::Press);
        app.handle_key(refresh);
        let manual = calls.recv().await.unwrap();
        assert_eq!(manual.call, Call::Chats { limit: 100 });
        manual.reply_chats(Ok(vec![chat("a", "Alice")]));
        while !app.process_sync_events() {
            tokio::task::yield_now().await;
        }

        // The timer still fires 30 s after startup, not 30 s after the manual refresh.
        tokio::time::sleep(Duration::from_secs(19)).await;
        app.process_sync_events();
        tokio::task::yield_now().await;
        assert!(calls.try_recv().is_err());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(app.process_sync_events());
        assert_eq!(calls.recv().await.unwrap().call, Call::Chats { limit: 100 });
    }
}
