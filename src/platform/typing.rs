use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

use crate::platform::client::PlatformClient;

/// Discord clears the typing indicator after roughly 10 seconds, so it is
/// re-sent a little before that.
pub const TYPING_REFRESH_INTERVAL: Duration = Duration::from_secs(8);

/// Keeps "typing..." visible in a channel until told to stop.
///
/// One refresh task per channel id. Signal failures are logged at debug
/// level and otherwise ignored.
pub struct TypingKeepAlive {
    client: Arc<dyn PlatformClient>,
    interval: Duration,
    sessions: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl TypingKeepAlive {
    pub fn new(client: Arc<dyn PlatformClient>, interval: Duration) -> Self {
        Self {
            client,
            interval,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Signal typing now and keep refreshing it. No-op if already active.
    pub async fn start(&self, channel_id: &str) {
        {
            let mut sessions = self.sessions.lock().await;
            if sessions.contains_key(channel_id) {
                debug!("Typing already active for channel {}", channel_id);
                return;
            }

            let client = Arc::clone(&self.client);
            let id = channel_id.to_string();
            let period = self.interval;
            // Anchored when typing is armed, not when the task first runs
            let first = Instant::now() + period;
            let handle = tokio::spawn(async move {
                let mut ticker = tokio::time::interval_at(first, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    ticker.tick().await;
                    signal_typing(client.as_ref(), &id).await;
                }
            });
            sessions.insert(channel_id.to_string(), handle);
        }

        signal_typing(self.client.as_ref(), channel_id).await;
    }

    /// Cancel the refresh task for one channel. In-flight signals may still land.
    pub async fn stop(&self, channel_id: &str) {
        if let Some(handle) = self.sessions.lock().await.remove(channel_id) {
            handle.abort();
        }
    }

    /// Cancel every refresh task.
    pub async fn stop_all(&self) {
        let mut sessions = self.sessions.lock().await;
        for (_, handle) in sessions.drain() {
            handle.abort();
        }
    }

    pub async fn is_active(&self, channel_id: &str) -> bool {
        self.sessions.lock().await.contains_key(channel_id)
    }

    pub async fn active_count(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

impl Drop for TypingKeepAlive {
    fn drop(&mut self) {
        for (_, handle) in self.sessions.get_mut().drain() {
            handle.abort();
        }
    }
}

/// Fetches the channel fresh on every call; a cached handle can go stale.
async fn signal_typing(client: &dyn PlatformClient, channel_id: &str) {
    match client.fetch_conversation(channel_id).await {
        Ok(Some(conv)) if conv.is_text_based() => {
            if let Err(e) = conv.send_typing().await {
                debug!("Typing signal failed for channel {}: {:#}", channel_id, e);
            }
        }
        Ok(Some(_)) => debug!("Channel {} is not text-based, skipping typing", channel_id),
        Ok(None) => debug!("Channel {} not found, skipping typing", channel_id),
        Err(e) => debug!("Failed to fetch channel {} for typing: {:#}", channel_id, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::client::fake::{FakeClient, FakeConversation};

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    async fn tick(times: u32) {
        for _ in 0..times {
            tokio::time::advance(TYPING_REFRESH_INTERVAL).await;
            settle().await;
        }
    }

    fn keep_alive(client: FakeClient) -> TypingKeepAlive {
        TypingKeepAlive::new(Arc::new(client), TYPING_REFRESH_INTERVAL)
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_signals_immediately_then_on_interval() {
        let conv = FakeConversation::text();
        let typing = keep_alive(FakeClient::new().with_conversation("100", conv.clone()));

        typing.start("100").await;
        assert_eq!(conv.typing_count(), 1);

        tick(1).await;
        assert_eq!(conv.typing_count(), 2);

        tick(2).await;
        assert_eq!(conv.typing_count(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_refresh_lands_one_interval_after_start() {
        let conv = FakeConversation::text();
        let typing = keep_alive(FakeClient::new().with_conversation("100", conv.clone()));

        // Refresh task has not been polled yet when the clock moves
        typing.start("100").await;
        tokio::time::advance(TYPING_REFRESH_INTERVAL - Duration::from_millis(1)).await;
        settle().await;
        assert_eq!(conv.typing_count(), 1);

        tokio::time::advance(Duration::from_millis(1)).await;
        settle().await;
        assert_eq!(conv.typing_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_halts_signals() {
        let conv = FakeConversation::text();
        let typing = keep_alive(FakeClient::new().with_conversation("100", conv.clone()));

        typing.start("100").await;
        typing.stop("100").await;
        assert!(!typing.is_active("100").await);

        tick(3).await;
        assert_eq!(conv.typing_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_twice_keeps_single_session() {
        let conv = FakeConversation::text();
        let typing = keep_alive(FakeClient::new().with_conversation("100", conv.clone()));

        typing.start("100").await;
        typing.start("100").await;
        assert_eq!(typing.active_count().await, 1);
        assert_eq!(conv.typing_count(), 1);

        tick(1).await;
        assert_eq!(conv.typing_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_all_clears_every_session() {
        let a = FakeConversation::text();
        let b = FakeConversation::text();
        let c = FakeConversation::text();
        let typing = keep_alive(
            FakeClient::new()
                .with_conversation("1", a.clone())
                .with_conversation("2", b.clone())
                .with_conversation("3", c.clone()),
        );

        for id in ["1", "2", "3"] {
            typing.start(id).await;
        }
        assert_eq!(typing.active_count().await, 3);

        typing.stop_all().await;
        assert_eq!(typing.active_count().await, 0);

        tick(2).await;
        for conv in [&a, &b, &c] {
            assert_eq!(conv.typing_count(), 1);
        }

        // Safe to repeat with nothing active
        typing.stop_all().await;
        typing.stop("1").await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_do_not_end_session() {
        let conv = FakeConversation::failing_typing();
        let typing = keep_alive(FakeClient::new().with_conversation("100", conv.clone()));

        typing.start("100").await;
        tick(2).await;
        assert_eq!(conv.typing_count(), 3);
        assert!(typing.is_active("100").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refetches_channel_each_tick() {
        let client = Arc::new(FakeClient::new().with_conversation("100", FakeConversation::text()));
        let typing = TypingKeepAlive::new(client.clone(), TYPING_REFRESH_INTERVAL);

        typing.start("100").await;
        tick(2).await;
        assert_eq!(client.fetch_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_or_voice_channel_is_ignored() {
        let voice = FakeConversation::voice();
        let typing = keep_alive(FakeClient::new().with_conversation("200", voice.clone()));

        typing.start("missing").await;
        typing.start("200").await;
        tick(1).await;
        assert_eq!(voice.typing_count(), 0);
        assert_eq!(typing.active_count().await, 2);
    }
}
