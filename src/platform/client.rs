//! Narrow view of the Discord gateway client.
//!
//! The adapter only needs to log in, receive events, look up a channel and
//! talk to it. Keeping that behind two traits lets the adapter run against
//! an in-memory fake in tests.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// A message notification as delivered by the gateway, already flattened
/// into plain values.
#[derive(Debug, Clone, Default)]
pub struct PlatformMessage {
    pub channel_id: String,
    pub message_id: String,
    pub author_id: String,
    /// Account handle (`username`)
    pub author_name: String,
    /// Platform-wide display name
    pub author_global_name: Option<String>,
    /// Guild-specific nickname
    pub member_nick: Option<String>,
    pub author_is_bot: bool,
    pub content: String,
    /// RFC 3339 timestamp
    pub timestamp: String,
    pub guild_name: Option<String>,
    pub channel_name: Option<String>,
    /// Whether the message came from a guild channel rather than a DM
    pub is_group: bool,
}

impl PlatformMessage {
    /// Best-effort sender name: guild nickname, then display name, then
    /// handle. Empty strings count as absent.
    pub fn display_name(&self) -> &str {
        [
            self.member_nick.as_deref(),
            self.author_global_name.as_deref(),
        ]
        .into_iter()
        .flatten()
        .find(|name| !name.is_empty())
        .unwrap_or(self.author_name.as_str())
    }

    /// `"<guild> #<channel>"` for guild channels whose names are known.
    pub fn conversation_name(&self) -> Option<String> {
        if !self.is_group {
            return None;
        }
        match (self.guild_name.as_deref(), self.channel_name.as_deref()) {
            (Some(guild), Some(channel)) => Some(format!("{} #{}", guild, channel)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum PlatformEvent {
    /// The gateway session is established.
    Ready { user_tag: String },
    /// The client hit an error after login.
    Error(String),
    Message(PlatformMessage),
}

/// A channel handle fetched from the client.
#[async_trait]
pub trait Conversation: Send + Sync {
    /// Whether messages and typing signals can be sent here.
    fn is_text_based(&self) -> bool;

    async fn send(&self, text: &str) -> Result<()>;

    async fn send_typing(&self) -> Result<()>;
}

#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// Authenticate and start delivering events on `events`.
    ///
    /// Returns once login is accepted; readiness is reported later as
    /// `PlatformEvent::Ready`.
    async fn login(&self, events: mpsc::UnboundedSender<PlatformEvent>) -> Result<()>;

    /// Look up a channel by its native id. `Ok(None)` if it does not exist.
    async fn fetch_conversation(&self, channel_id: &str)
        -> Result<Option<Arc<dyn Conversation>>>;

    async fn shutdown(&self) -> Result<()>;
}

#[cfg(test)]
pub mod fake {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    use anyhow::bail;

    use super::*;

    /// Records everything sent to it.
    #[derive(Default)]
    pub struct FakeConversation {
        pub text_based: bool,
        pub fail_typing: bool,
        pub sent: Mutex<Vec<String>>,
        pub typing_calls: AtomicUsize,
    }

    impl FakeConversation {
        pub fn text() -> Arc<Self> {
            Arc::new(Self {
                text_based: true,
                ..Default::default()
            })
        }

        pub fn voice() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn failing_typing() -> Arc<Self> {
            Arc::new(Self {
                text_based: true,
                fail_typing: true,
                ..Default::default()
            })
        }

        pub fn sent(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }

        pub fn typing_count(&self) -> usize {
            self.typing_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Conversation for FakeConversation {
        fn is_text_based(&self) -> bool {
            self.text_based
        }

        async fn send(&self, text: &str) -> Result<()> {
            self.sent.lock().unwrap().push(text.to_string());
            Ok(())
        }

        async fn send_typing(&self) -> Result<()> {
            self.typing_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_typing {
                bail!("Missing Access");
            }
            Ok(())
        }
    }

    /// In-memory client. Emits `Ready` on login unless told otherwise.
    #[derive(Default)]
    pub struct FakeClient {
        pub conversations: Mutex<HashMap<String, Arc<FakeConversation>>>,
        pub events: Mutex<Option<mpsc::UnboundedSender<PlatformEvent>>>,
        pub login_error: Option<String>,
        pub hold_ready: bool,
        pub login_calls: AtomicUsize,
        pub fetch_calls: AtomicUsize,
        pub shutdown_calls: AtomicUsize,
        pub shut_down: AtomicBool,
    }

    impl FakeClient {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_conversation(self, channel_id: &str, conv: Arc<FakeConversation>) -> Self {
            self.conversations
                .lock()
                .unwrap()
                .insert(channel_id.to_string(), conv);
            self
        }

        /// Push an event as if the gateway had delivered it.
        pub fn emit(&self, event: PlatformEvent) {
            if let Some(tx) = self.events.lock().unwrap().as_ref() {
                let _ = tx.send(event);
            }
        }

        /// Drop the event sender, ending the stream.
        pub fn close(&self) {
            self.events.lock().unwrap().take();
        }

        pub fn fetch_count(&self) -> usize {
            self.fetch_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PlatformClient for FakeClient {
        async fn login(&self, events: mpsc::UnboundedSender<PlatformEvent>) -> Result<()> {
            self.login_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(err) = &self.login_error {
                bail!("{}", err);
            }
            if !self.hold_ready {
                let _ = events.send(PlatformEvent::Ready {
                    user_tag: "bridge#0001".to_string(),
                });
            }
            *self.events.lock().unwrap() = Some(events);
            Ok(())
        }

        async fn fetch_conversation(
            &self,
            channel_id: &str,
        ) -> Result<Option<Arc<dyn Conversation>>> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            let conv = self.conversations.lock().unwrap().get(channel_id).cloned();
            Ok(conv.map(|c| c as Arc<dyn Conversation>))
        }

        async fn shutdown(&self) -> Result<()> {
            self.shutdown_calls.fetch_add(1, Ordering::SeqCst);
            self.shut_down.store(true, Ordering::SeqCst);
            self.close();
            Ok(())
        }
    }
}
