//! Discord adapter for the chat bridge.
//!
//! Turns gateway events into `ChatMetadata`/`InboundEvent` callbacks and
//! delivers outbound text in Discord-sized chunks.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::ChannelError;
use crate::platform::chunk::{split_message, DISCORD_MAX_MESSAGE_LEN};
use crate::platform::client::{PlatformClient, PlatformEvent, PlatformMessage};
use crate::platform::jid::{owns_jid, to_channel_id, to_jid};
use crate::platform::typing::{TypingKeepAlive, TYPING_REFRESH_INTERVAL};
use crate::platform::{
    Channel, ChatMetadata, InboundEvent, OnChatMetadata, OnInboundMessage, RegisteredGroups,
};

/// Platform tag reported in chat metadata.
const CHANNEL_NAME: &str = "discord";

/// Callbacks and knobs supplied by the bridge.
pub struct ChannelOpts {
    pub on_message: OnInboundMessage,
    pub on_chat_metadata: OnChatMetadata,
    pub registered_groups: RegisteredGroups,
    pub typing_interval: Duration,
}

impl ChannelOpts {
    pub fn new(
        on_message: OnInboundMessage,
        on_chat_metadata: OnChatMetadata,
        registered_groups: RegisteredGroups,
    ) -> Self {
        Self {
            on_message,
            on_chat_metadata,
            registered_groups,
            typing_interval: TYPING_REFRESH_INTERVAL,
        }
    }

    pub fn with_typing_interval(mut self, interval: Duration) -> Self {
        self.typing_interval = interval;
        self
    }
}

/// Filters and normalizes gateway messages before handing them to the bridge.
struct InboundHandler {
    on_message: OnInboundMessage,
    on_chat_metadata: OnChatMetadata,
    registered_groups: RegisteredGroups,
}

impl InboundHandler {
    fn handle(&self, msg: &PlatformMessage) -> Result<()> {
        if msg.author_is_bot {
            return Ok(());
        }
        if msg.channel_id.is_empty() {
            bail!("Discord message {} has no channel id", msg.message_id);
        }

        let chat_jid = to_jid(&msg.channel_id);

        // Always reported, registered or not
        (self.on_chat_metadata)(ChatMetadata {
            chat_jid: chat_jid.clone(),
            timestamp: msg.timestamp.clone(),
            name: msg.conversation_name(),
            channel: CHANNEL_NAME.to_string(),
            is_group: msg.is_group,
        });

        if !(self.registered_groups)().contains_key(&chat_jid) {
            debug!("Message from unregistered Discord channel: {}", chat_jid);
            return Ok(());
        }

        if msg.content.is_empty() {
            return Ok(());
        }

        let sender_name = msg.display_name().to_string();
        info!(
            "Discord message stored in {} from {} ({})",
            chat_jid, sender_name, msg.author_id
        );

        (self.on_message)(
            &chat_jid,
            InboundEvent {
                id: msg.message_id.clone(),
                chat_jid: chat_jid.clone(),
                sender: msg.author_id.clone(),
                sender_name,
                content: msg.content.clone(),
                timestamp: msg.timestamp.clone(),
                is_from_me: false,
                is_bot_message: false,
            },
        );

        Ok(())
    }
}

/// Discord adapter.
pub struct DiscordChannel {
    client: Arc<dyn PlatformClient>,
    inbound: Arc<InboundHandler>,
    typing: TypingKeepAlive,
    connected: Arc<AtomicBool>,
    /// Serializes `connect` so concurrent callers log in once
    connect_lock: Mutex<()>,
    event_task: Mutex<Option<JoinHandle<()>>>,
}

impl DiscordChannel {
    pub fn new(client: Arc<dyn PlatformClient>, opts: ChannelOpts) -> Self {
        let typing = TypingKeepAlive::new(Arc::clone(&client), opts.typing_interval);
        Self {
            client,
            inbound: Arc::new(InboundHandler {
                on_message: opts.on_message,
                on_chat_metadata: opts.on_chat_metadata,
                registered_groups: opts.registered_groups,
            }),
            typing,
            connected: Arc::new(AtomicBool::new(false)),
            connect_lock: Mutex::new(()),
            event_task: Mutex::new(None),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

/// Drains gateway events until the client drops its sender.
async fn run_events(
    mut events: mpsc::UnboundedReceiver<PlatformEvent>,
    inbound: Arc<InboundHandler>,
    connected: Arc<AtomicBool>,
    mut ready: Option<oneshot::Sender<()>>,
) {
    while let Some(event) = events.recv().await {
        match event {
            PlatformEvent::Ready { user_tag } => {
                info!("Discord bot connected as {}", user_tag);
                connected.store(true, Ordering::SeqCst);
                if let Some(tx) = ready.take() {
                    let _ = tx.send(());
                }
            }
            PlatformEvent::Error(e) => error!("Discord client error: {}", e),
            PlatformEvent::Message(msg) => {
                // A panicking bridge callback must not take the loop down with it
                match panic::catch_unwind(AssertUnwindSafe(|| inbound.handle(&msg))) {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => error!("Error handling Discord message: {:#}", e),
                    Err(payload) => error!(
                        "Panic while handling Discord message {}: {}",
                        msg.message_id,
                        panic_message(payload.as_ref())
                    ),
                }
            }
        }
    }

    connected.store(false, Ordering::SeqCst);
    debug!("Discord event stream closed");
}

#[async_trait]
impl Channel for DiscordChannel {
    fn name(&self) -> &str {
        CHANNEL_NAME
    }

    async fn connect(&self) -> Result<()> {
        let _connecting = self.connect_lock.lock().await;
        if self.is_connected() {
            return Ok(());
        }

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = oneshot::channel();
        let task = tokio::spawn(run_events(
            events_rx,
            Arc::clone(&self.inbound),
            Arc::clone(&self.connected),
            Some(ready_tx),
        ));

        if let Err(e) = self.client.login(events_tx).await {
            task.abort();
            return Err(e.context("Discord login failed"));
        }

        if let Some(previous) = self.event_task.lock().await.replace(task) {
            previous.abort();
        }

        ready_rx.await.map_err(|_| ChannelError::ClientClosed)?;
        Ok(())
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.typing.stop_all().await;

        let Some(task) = self.event_task.lock().await.take() else {
            return;
        };
        task.abort();
        if let Err(e) = self.client.shutdown().await {
            warn!("Discord client shutdown failed: {:#}", e);
        }
        info!("Discord bot stopped");
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn owns_jid(&self, jid: &str) -> bool {
        owns_jid(jid)
    }

    async fn send_message(&self, jid: &str, text: &str) -> Result<()> {
        if !self.is_connected() {
            return Err(ChannelError::NotConnected.into());
        }

        let channel_id = to_channel_id(jid)?;
        let conv = self
            .client
            .fetch_conversation(channel_id)
            .await
            .with_context(|| format!("Failed to fetch Discord channel {}", channel_id))?
            .ok_or_else(|| ChannelError::NotFound {
                channel_id: channel_id.to_string(),
            })?;

        if !conv.is_text_based() {
            return Err(ChannelError::NotTextChannel {
                channel_id: channel_id.to_string(),
            }
            .into());
        }

        // Sequential so multi-chunk replies arrive in order
        let chunks = split_message(text, DISCORD_MAX_MESSAGE_LEN);
        for chunk in &chunks {
            conv.send(chunk)
                .await
                .with_context(|| format!("Failed to send message to Discord channel {}", channel_id))?;
        }

        info!(
            "Discord message sent to {} ({} chars, {} chunk(s))",
            jid,
            text.chars().count(),
            chunks.len()
        );
        Ok(())
    }

    async fn set_typing(&self, jid: &str, is_typing: bool) {
        let channel_id = match to_channel_id(jid) {
            Ok(id) => id,
            Err(e) => {
                debug!("Ignoring typing request: {}", e);
                return;
            }
        };

        if !is_typing {
            self.typing.stop(channel_id).await;
            return;
        }
        if !self.is_connected() {
            debug!("Discord not connected, skipping typing for {}", jid);
            return;
        }
        self.typing.start(channel_id).await;
    }
}
