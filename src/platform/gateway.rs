//! Live Discord client backed by serenity.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serenity::all::{
    Channel as DiscordChannelKind, ChannelId, ChannelType, Context as SerenityContext,
    EventHandler, GatewayIntents, Http, Message, Ready, ShardManager, Timestamp,
};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::platform::client::{Conversation, PlatformClient, PlatformEvent, PlatformMessage};

/// Guild text, DMs and message content.
fn intents() -> GatewayIntents {
    GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT
        | GatewayIntents::DIRECT_MESSAGES
}

/// `PlatformClient` over a serenity gateway connection.
pub struct SerenityClient {
    token: String,
    http: Arc<Http>,
    shard_manager: Mutex<Option<Arc<ShardManager>>>,
    runner: Mutex<Option<JoinHandle<()>>>,
}

impl SerenityClient {
    pub fn new(token: &str) -> Self {
        Self {
            token: token.to_string(),
            http: Arc::new(Http::new(token)),
            shard_manager: Mutex::new(None),
            runner: Mutex::new(None),
        }
    }
}

/// Forwards serenity callbacks onto the adapter's event channel.
struct Handler {
    events: mpsc::UnboundedSender<PlatformEvent>,
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, _ctx: SerenityContext, ready: Ready) {
        let _ = self.events.send(PlatformEvent::Ready {
            user_tag: ready.user.tag(),
        });
    }

    async fn message(&self, ctx: SerenityContext, msg: Message) {
        let flattened = flatten_message(&ctx, &msg).await;
        let _ = self.events.send(PlatformEvent::Message(flattened));
    }
}

async fn flatten_message(ctx: &SerenityContext, msg: &Message) -> PlatformMessage {
    let (guild_name, channel_name) = match msg.guild_id {
        Some(guild_id) => {
            let guild_name = ctx.cache.guild(guild_id).map(|g| g.name.clone());
            let channel_name = match msg.channel_id.to_channel(ctx).await {
                Ok(channel) => channel.guild().map(|c| c.name),
                Err(e) => {
                    debug!("Could not resolve Discord channel {}: {}", msg.channel_id, e);
                    None
                }
            };
            (guild_name, channel_name)
        }
        None => (None, None),
    };

    PlatformMessage {
        channel_id: msg.channel_id.to_string(),
        message_id: msg.id.to_string(),
        author_id: msg.author.id.to_string(),
        author_name: msg.author.name.clone(),
        author_global_name: msg.author.global_name.clone(),
        member_nick: msg.member.as_ref().and_then(|m| m.nick.clone()),
        author_is_bot: msg.author.bot,
        content: msg.content.clone(),
        timestamp: to_rfc3339(&msg.timestamp),
        guild_name,
        channel_name,
        is_group: msg.guild_id.is_some(),
    }
}

/// Millisecond RFC 3339, so messages within one second still order.
fn to_rfc3339(ts: &Timestamp) -> String {
    normalize_rfc3339(&ts.to_string(), ts.unix_timestamp())
}

fn normalize_rfc3339(raw: &str, fallback_secs: i64) -> String {
    let parsed = chrono::DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .ok()
        .or_else(|| chrono::DateTime::from_timestamp(fallback_secs, 0))
        .unwrap_or_default();
    parsed.to_rfc3339_opts(chrono::SecondsFormat::Millis, false)
}

/// Snowflakes are non-zero u64s; anything else cannot name a channel.
fn parse_channel_id(channel_id: &str) -> Option<ChannelId> {
    match channel_id.parse::<u64>() {
        Ok(id) if id != 0 => Some(ChannelId::new(id)),
        _ => None,
    }
}

fn is_text_kind(kind: ChannelType) -> bool {
    matches!(
        kind,
        ChannelType::Text
            | ChannelType::News
            | ChannelType::Voice
            | ChannelType::PublicThread
            | ChannelType::PrivateThread
            | ChannelType::NewsThread
    )
}

struct SerenityConversation {
    http: Arc<Http>,
    channel_id: ChannelId,
    text_based: bool,
}

#[async_trait]
impl Conversation for SerenityConversation {
    fn is_text_based(&self) -> bool {
        self.text_based
    }

    async fn send(&self, text: &str) -> Result<()> {
        self.channel_id
            .say(&*self.http, text)
            .await
            .with_context(|| format!("Discord rejected message for channel {}", self.channel_id))?;
        Ok(())
    }

    async fn send_typing(&self) -> Result<()> {
        self.http
            .broadcast_typing(self.channel_id)
            .await
            .with_context(|| format!("Discord rejected typing for channel {}", self.channel_id))?;
        Ok(())
    }
}

#[async_trait]
impl PlatformClient for SerenityClient {
    async fn login(&self, events: mpsc::UnboundedSender<PlatformEvent>) -> Result<()> {
        // A previous session's shards would otherwise keep running untracked
        self.shutdown().await?;

        // Bad tokens fail here rather than inside the gateway task
        let me = self
            .http
            .get_current_user()
            .await
            .context("Failed to authenticate with Discord")?;

        let mut client = serenity::Client::builder(self.token.as_str(), intents())
            .event_handler(Handler {
                events: events.clone(),
            })
            .await
            .context("Failed to build Discord client")?;

        *self.shard_manager.lock().await = Some(Arc::clone(&client.shard_manager));

        let runner = tokio::spawn(async move {
            if let Err(e) = client.start().await {
                let _ = events.send(PlatformEvent::Error(e.to_string()));
            }
        });
        *self.runner.lock().await = Some(runner);

        info!("Discord login accepted for {}", me.name);
        Ok(())
    }

    async fn fetch_conversation(
        &self,
        channel_id: &str,
    ) -> Result<Option<Arc<dyn Conversation>>> {
        let Some(id) = parse_channel_id(channel_id) else {
            return Ok(None);
        };

        let channel = id
            .to_channel(&*self.http)
            .await
            .with_context(|| format!("Failed to fetch Discord channel {}", channel_id))?;
        let text_based = match channel {
            DiscordChannelKind::Guild(guild_channel) => is_text_kind(guild_channel.kind),
            DiscordChannelKind::Private(_) => true,
            _ => false,
        };

        Ok(Some(Arc::new(SerenityConversation {
            http: Arc::clone(&self.http),
            channel_id: id,
            text_based,
        })))
    }

    async fn shutdown(&self) -> Result<()> {
        if let Some(manager) = self.shard_manager.lock().await.take() {
            manager.shutdown_all().await;
        }
        if let Some(runner) = self.runner.lock().await.take() {
            runner.abort();
        }
        Ok(())
    }
}
