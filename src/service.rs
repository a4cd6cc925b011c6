use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::Config;
use crate::error::{Result, SyncError};
use crate::model::{Chat, Message, SendAck};

/// The remote chat service. Every call either yields its payload or a tagged [`SyncError`].
#[async_trait]
pub trait ChatService: Send + Sync {
    /// Chats ordered most-recently-active first, as the server sorts them.
    async fn list_chats(&self, limit: usize) -> Result<Vec<Chat>>;

    /// Messages of one chat, oldest first.
    async fn list_messages(&self, chat_jid: &str, limit: usize) -> Result<Vec<Message>>;

    async fn send_message(&self, chat_jid: &str, text: &str) -> Result<SendAck>;
}

/// `{success: bool, ...payload | error}` wrapper every endpoint answers with.
#[derive(Debug, Deserialize)]
struct Envelope {
    success: bool,
    #[serde(default)]
    chats: Option<Vec<Chat>>,
    #[serde(default)]
    messages: Option<Vec<Message>>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl Envelope {
    fn parse(body: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(body)
    }

    /// Turns a `success: false` envelope into [`SyncError::Server`].
    fn into_success(self) -> Result<Self> {
        if self.success {
            return Ok(self);
        }
        let reason = self
            .error
            .or(self.message)
            .unwrap_or_else(|| "unknown error".to_string());
        Err(SyncError::Server(reason))
    }
}

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    recipient: &'a str,
    message: &'a str,
}

/// HTTP implementation against the web interface's `/api` routes.
#[derive(Clone)]
pub struct HttpChatService {
    base_url: String,
    client: reqwest::Client,
}

impl HttpChatService {
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            base_url: config.server_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn read_envelope(&self, response: reqwest::Response) -> Result<Envelope> {
        let status = response.status();
        let body = response.text().await?;
        decode(status, &body)
    }
}

/// Decodes a response body. Error envelopes arrive with 4xx/5xx statuses too, so
/// the status only matters when the body is not an envelope.
fn decode(status: StatusCode, body: &str) -> Result<Envelope> {
    match Envelope::parse(body) {
        Ok(envelope) => envelope.into_success(),
        Err(_) if !status.is_success() => {
            crate::warn_log!("decode: HTTP {} with non-JSON body", status);
            Err(SyncError::Transport(format!("HTTP {}", status)))
        }
        Err(e) => {
            crate::warn_log!("decode: Failed to decode response: {}", e);
            Err(SyncError::Transport(format!("Invalid response: {}", e)))
        }
    }
}

#[async_trait]
impl ChatService for HttpChatService {
    async fn list_chats(&self, limit: usize) -> Result<Vec<Chat>> {
        crate::debug_log!("list_chats: Requesting up to {} chats", limit);
        let response = self
            .client
            .get(self.url("/api/chats"))
            .query(&[("limit", limit)])
            .send()
            .await?;
        let envelope = self.read_envelope(response).await?;
        Ok(envelope.chats.unwrap_or_default())
    }

    async fn list_messages(&self, chat_jid: &str, limit: usize) -> Result<Vec<Message>> {
        crate::debug_log!("list_messages: Requesting up to {} messages for {}", limit, chat_jid);
        let path = format!("/api/messages/{}", urlencoding::encode(chat_jid));
        let response = self
            .client
            .get(self.url(&path))
            .query(&[("limit", limit)])
            .send()
            .await?;
        let envelope = self.read_envelope(response).await?;
        Ok(envelope.messages.unwrap_or_default())
    }

    async fn send_message(&self, chat_jid: &str, text: &str) -> Result<SendAck> {
        crate::debug_log!("send_message: Sending {} chars to {}", text.len(), chat_jid);
        let response = self
            .client
            .post(self.url("/api/send"))
            .json(&SendRequest {
                recipient: chat_jid,
                message: text,
            })
            .send()
            .await?;
        let envelope = self.read_envelope(response).await?;
        Ok(SendAck {
            message: envelope.message,
        })
    }
}

/// In-memory service whose calls stay pending until the test answers them,
/// so responses can be resolved in any order.
#[cfg(test)]
pub mod fake {
    use super::*;
    use tokio::sync::{mpsc, oneshot};

    #[derive(Debug, Clone, PartialEq)]
    pub enum Call {
        Chats { limit: usize },
        Messages { chat_jid: String, limit: usize },
        Send { chat_jid: String, text: String },
    }

    enum Reply {
        Chats(Result<Vec<Chat>>),
        Messages(Result<Vec<Message>>),
        Send(Result<SendAck>),
    }

    pub struct PendingCall {
        pub call: Call,
        reply: oneshot::Sender<Reply>,
    }

    impl PendingCall {
        pub fn reply_chats(self, result: Result<Vec<Chat>>) {
            let _ = self.reply.send(Reply::Chats(result));
        }

        pub fn reply_messages(self, result: Result<Vec<Message>>) {
            let _ = self.reply.send(Reply::Messages(result));
        }

        pub fn reply_send(self, result: Result<SendAck>) {
            let _ = self.reply.send(Reply::Send(result));
        }
    }

    pub struct FakeService {
        calls: mpsc::UnboundedSender<PendingCall>,
    }

    impl FakeService {
        pub fn new() -> (Self, mpsc::UnboundedReceiver<PendingCall>) {
            let (calls, rx) = mpsc::unbounded_channel();
            (Self { calls }, rx)
        }

        async fn call(&self, call: Call) -> Option<Reply> {
            let (reply, rx) = oneshot::channel();
            self.calls.send(PendingCall { call, reply }).ok()?;
            rx.await.ok()
        }
    }

    fn dropped() -> SyncError {
        SyncError::Transport("call dropped".to_string())
    }

    #[async_trait]
    impl ChatService for FakeService {
        async fn list_chats(&self, limit: usize) -> Result<Vec<Chat>> {
            match self.call(Call::Chats { limit }).await {
                Some(Reply::Chats(result)) => result,
                _ => Err(dropped()),
            }
        }

        async fn list_messages(&self, chat_jid: &str, limit: usize) -> Result<Vec<Message>> {
            let call = Call::Messages {
                chat_jid: chat_jid.to_string(),
                limit,
            };
            match self.call(call).await {
                Some(Reply::Messages(result)) => result,
                _ => Err(dropped()),
            }
        }

        async fn send_message(&self, chat_jid: &str, text: &str) -> Result<SendAck> {
            let call = Call::Send {
                chat_jid: chat_jid.to_string(),
                text: text.to_string(),
            };
            match self.call(call).await {
                Some(Reply::Send(result)) => result,
                _ => Err(dropped()),
            }
        }
    }
}
