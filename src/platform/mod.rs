pub mod chunk;
pub mod client;
pub mod discord;
pub mod gateway;
pub mod jid;
pub mod typing;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;

/// A message forwarded to the bridge from any platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    /// Message ID on the originating platform
    pub id: String,
    /// Bridge JID of the conversation
    pub chat_jid: String,
    pub sender: String,
    pub sender_name: String,
    pub content: String,
    /// ISO-8601 timestamp
    pub timestamp: String,
    /// Sent by the bridge's own account
    pub is_from_me: bool,
    pub is_bot_message: bool,
}

/// Conversation metadata, reported for every inbound message so the
/// bridge can discover chats it has not registered yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMetadata {
    pub chat_jid: String,
    pub timestamp: String,
    pub name: Option<String>,
    /// Platform tag (e.g., "discord")
    pub channel: String,
    pub is_group: bool,
}

/// A conversation the bridge actively serves
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RegisteredGroup {
    pub name: String,
    pub folder: String,
    #[serde(default)]
    pub trigger: Option<String>,
}

pub type OnInboundMessage = Arc<dyn Fn(&str, InboundEvent) + Send + Sync>;
pub type OnChatMetadata = Arc<dyn Fn(ChatMetadata) + Send + Sync>;
pub type RegisteredGroups = Arc<dyn Fn() -> HashMap<String, RegisteredGroup> + Send + Sync>;

/// What the bridge router sees of a platform adapter.
#[async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> &str;

    async fn connect(&self) -> Result<()>;

    async fn disconnect(&self);

    fn is_connected(&self) -> bool;

    /// Whether this adapter is responsible for `jid`.
    fn owns_jid(&self, jid: &str) -> bool;

    async fn send_message(&self, jid: &str, text: &str) -> Result<()>;

    /// Best-effort; never fails.
    async fn set_typing(&self, jid: &str, is_typing: bool);
}

/// Pick the adapter that owns `jid`.
pub fn find_channel<'a>(channels: &'a [Arc<dyn Channel>], jid: &str) -> Option<&'a Arc<dyn Channel>> {
    channels.iter().find(|c| c.owns_jid(jid))
}
