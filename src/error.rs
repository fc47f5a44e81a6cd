use thiserror::Error;

/// Failures a bridge caller may want to tell apart.
///
/// Returned wrapped in `anyhow::Error`; recover with `downcast_ref`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChannelError {
    #[error("Discord channel not found: {channel_id}")]
    NotFound { channel_id: String },

    #[error("Discord channel {channel_id} is not a text channel")]
    NotTextChannel { channel_id: String },

    #[error("JID is not owned by the Discord channel: {jid}")]
    NotOwned { jid: String },

    #[error("Discord channel is not connected")]
    NotConnected,

    #[error("Discord client closed before becoming ready")]
    ClientClosed,
}
